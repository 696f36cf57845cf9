//! Polars `AnyValue` to [`CellValue`] conversion.

use claims_model::CellValue;
use polars::prelude::AnyValue;

/// Converts an `AnyValue` to a [`CellValue`].
///
/// Numeric dtypes become `Number` (NaN becomes `Missing`), strings become
/// `Text` with blanks mapped to `Missing`. Text is not parsed here: a
/// numeric-looking string in a text column stays text until a rule coerces it.
pub fn any_to_cell(value: AnyValue<'_>) -> CellValue {
    let number = match value {
        AnyValue::Null => return CellValue::Missing,
        AnyValue::String(s) => return CellValue::text(s),
        AnyValue::StringOwned(s) => return CellValue::text(s.to_string()),
        AnyValue::Float64(v) => v,
        AnyValue::Float32(v) => f64::from(v),
        AnyValue::Int8(v) => f64::from(v),
        AnyValue::Int16(v) => f64::from(v),
        AnyValue::Int32(v) => f64::from(v),
        AnyValue::UInt8(v) => f64::from(v),
        AnyValue::UInt16(v) => f64::from(v),
        AnyValue::UInt32(v) => f64::from(v),
        AnyValue::Int64(v) => v as f64,
        AnyValue::UInt64(v) => v as f64,
        other => return CellValue::Text(other.to_string()),
    };
    CellValue::number(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(any_to_cell(AnyValue::Int64(3)), CellValue::Number(3.0));
        assert_eq!(any_to_cell(AnyValue::UInt8(7)), CellValue::Number(7.0));
        assert_eq!(any_to_cell(AnyValue::Float64(-0.25)), CellValue::Number(-0.25));
        assert_eq!(any_to_cell(AnyValue::Float64(f64::NAN)), CellValue::Missing);
    }

    #[test]
    fn test_text_stays_text() {
        assert_eq!(any_to_cell(AnyValue::Null), CellValue::Missing);
        assert_eq!(any_to_cell(AnyValue::String("  ")), CellValue::Missing);
        assert_eq!(
            any_to_cell(AnyValue::String("0.6")),
            CellValue::Text("0.6".to_string())
        );
        assert_eq!(
            any_to_cell(AnyValue::Boolean(true)),
            CellValue::Text("true".to_string())
        );
    }
}
