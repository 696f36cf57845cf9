//! Column-level access to a `DataFrame` as [`CellValue`]s.
//!
//! Cleaning stages read a column into a `Vec<CellValue>`, decide per row and
//! write the whole column back. Writing preserves integral dtypes where the
//! new values allow it so counts and sequence numbers stay integers.

use claims_model::CellValue;
use polars::prelude::*;

use crate::polars::any_to_cell;

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Names from `required` that are absent from `df`, in the given order.
pub fn missing_columns<'a>(
    df: &DataFrame,
    required: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    required
        .into_iter()
        .filter(|name| !has_column(df, name))
        .map(str::to_string)
        .collect()
}

/// Reads every row of `name` as a [`CellValue`].
pub fn column_cells(df: &DataFrame, name: &str) -> PolarsResult<Vec<CellValue>> {
    let column = df.column(name)?;
    let mut cells = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        cells.push(any_to_cell(column.get(idx).unwrap_or(AnyValue::Null)));
    }
    Ok(cells)
}

/// Replaces (or appends) column `name` with `cells`.
///
/// All-numeric cells produce a `Float64` column, cast back to the previous
/// integer dtype when every value is integral. Anything else produces a
/// `String` column.
pub fn write_cells(df: &mut DataFrame, name: &str, cells: &[CellValue]) -> PolarsResult<()> {
    let previous = df.column(name).ok().map(|c| c.dtype().clone());
    let column = cells_to_column(name, cells, previous.as_ref())?;
    df.with_column(column)?;
    Ok(())
}

fn cells_to_column(
    name: &str,
    cells: &[CellValue],
    previous: Option<&DataType>,
) -> PolarsResult<Column> {
    if cells.iter().all(CellValue::is_missing) {
        let dtype = previous.cloned().unwrap_or(DataType::Float64);
        return Ok(Column::full_null(name.into(), cells.len(), &dtype));
    }

    let numeric = cells
        .iter()
        .all(|c| c.is_missing() || matches!(c, CellValue::Number(_)));
    if !numeric {
        let values: Vec<Option<String>> = cells.iter().map(CellValue::as_text).collect();
        return Ok(Column::new(name.into(), values));
    }

    let values: Vec<Option<f64>> = cells.iter().map(CellValue::as_f64).collect();
    let column = Column::new(name.into(), values.clone());
    let integral = values.iter().flatten().all(|v| v.fract() == 0.0);
    match previous {
        Some(dtype) if dtype.is_integer() && integral => column.cast(dtype),
        _ => Ok(column),
    }
}

/// Keeps the rows whose flag in `keep` is true.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> PolarsResult<DataFrame> {
    let mask = BooleanChunked::new("keep".into(), keep);
    df.filter(&mask)
}
