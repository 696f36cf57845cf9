use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::error::{IngestError, Result};

/// Delimiter and decimal-mark locale of a CSV export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub separator: u8,
    pub decimal_comma: bool,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self::comma()
    }
}

impl CsvFormat {
    /// `,`-delimited with `.` decimals.
    pub fn comma() -> Self {
        Self {
            separator: b',',
            decimal_comma: false,
        }
    }

    /// `;`-delimited with `,` decimals.
    pub fn semicolon() -> Self {
        Self {
            separator: b';',
            decimal_comma: true,
        }
    }
}

/// Reads a CSV file into a Polars DataFrame.
///
/// With a decimal-comma locale, text columns that still hold comma decimals
/// (columns inferred as text because some cells are corrupt) have those cells
/// rewritten with a `.` so later numeric coercion succeeds.
pub fn read_csv_frame(path: &Path, format: &CsvFormat) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let parse_options = CsvParseOptions::default()
        .with_separator(format.separator)
        .with_decimal_comma(format.decimal_comma);
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if df.width() == 0 {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    }
    if format.decimal_comma {
        normalize_decimal_commas(&mut df)?;
    }
    debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "read csv"
    );
    Ok(df)
}

/// Writes `df` as CSV with a header row.
pub fn write_csv_frame(path: &Path, df: &mut DataFrame, format: &CsvFormat) -> Result<()> {
    let mut file = File::create(path).map_err(|source| IngestError::FileCreate {
        path: path.to_path_buf(),
        source,
    })?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(format.separator)
        .with_decimal_comma(format.decimal_comma)
        .finish(df)
        .map_err(|e| IngestError::CsvWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    debug!(path = %path.display(), rows = df.height(), "wrote csv");
    Ok(())
}

fn normalize_decimal_commas(df: &mut DataFrame) -> Result<()> {
    for name in df.get_column_names_owned() {
        let column = df.column(name.as_str())?;
        if column.dtype() != &DataType::String {
            continue;
        }
        let mut changed = false;
        let values: Vec<Option<String>> = column
            .str()?
            .into_iter()
            .map(|value| {
                value.map(|raw| match swap_decimal_comma(raw) {
                    Some(swapped) => {
                        changed = true;
                        swapped
                    }
                    None => raw.to_string(),
                })
            })
            .collect();
        if changed {
            df.with_column(Column::new(name, values))?;
        }
    }
    Ok(())
}

/// `"0,6"` → `"0.6"`; anything that is not a single-comma number is left alone.
fn swap_decimal_comma(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.contains('.') || trimmed.matches(',').count() != 1 {
        return None;
    }
    let swapped = trimmed.replace(',', ".");
    swapped.parse::<f64>().ok().map(|_| swapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_only_numeric_commas() {
        assert_eq!(swap_decimal_comma(" 0,6 "), Some("0.6".to_string()));
        assert_eq!(swap_decimal_comma("-12,5"), Some("-12.5".to_string()));
        assert_eq!(swap_decimal_comma("Helionis, Cluster"), None);
        assert_eq!(swap_decimal_comma("1,000,5"), None);
        assert_eq!(swap_decimal_comma("0.6"), None);
    }
}
