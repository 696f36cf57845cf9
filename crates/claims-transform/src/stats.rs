//! Column statistics with deterministic tie-breaks.

use claims_model::CellValue;

/// Most frequent value; ties go to the smallest under [`CellValue::total_cmp`].
///
/// Numbers and numeric text count as the same value.
pub fn mode(values: &[CellValue]) -> Option<CellValue> {
    let mut sorted: Vec<CellValue> = values
        .iter()
        .filter(|cell| !cell.is_missing())
        .map(canonical)
        .collect();
    sorted.sort_by(CellValue::total_cmp);

    let mut best: Option<(CellValue, usize)> = None;
    let mut idx = 0;
    while idx < sorted.len() {
        let mut end = idx + 1;
        while end < sorted.len() && sorted[end].loosely_eq(&sorted[idx]) {
            end += 1;
        }
        let run = end - idx;
        if best.as_ref().is_none_or(|(_, count)| run > *count) {
            best = Some((sorted[idx].clone(), run));
        }
        idx = end;
    }
    best.map(|(value, _)| value)
}

/// Median of the numeric values, averaging the middle pair for even counts.
pub fn median(values: &[CellValue]) -> Option<CellValue> {
    let mut numbers: Vec<f64> = values.iter().filter_map(CellValue::as_f64).collect();
    if numbers.is_empty() {
        return None;
    }
    numbers.sort_by(f64::total_cmp);
    let mid = numbers.len() / 2;
    let value = if numbers.len() % 2 == 0 {
        (numbers[mid - 1] + numbers[mid]) / 2.0
    } else {
        numbers[mid]
    };
    Some(CellValue::number(value))
}

pub fn mean(values: &[CellValue]) -> Option<CellValue> {
    let numbers: Vec<f64> = values.iter().filter_map(CellValue::as_f64).collect();
    if numbers.is_empty() {
        return None;
    }
    let total: f64 = numbers.iter().sum();
    Some(CellValue::number(total / numbers.len() as f64))
}

/// Numeric text becomes a number so `"3"` and `3.0` tally together.
fn canonical(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::Text(text) => match cell.as_f64() {
            Some(value) => CellValue::number(value),
            None => CellValue::Text(text.trim().to_string()),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<CellValue> {
        values.iter().copied().map(CellValue::number).collect()
    }

    #[test]
    fn mode_prefers_smallest_on_ties() {
        assert_eq!(mode(&nums(&[3.0, 1.0, 3.0, 1.0, 2.0])), Some(CellValue::Number(1.0)));
        assert_eq!(mode(&nums(&[5.0, 4.0, 5.0])), Some(CellValue::Number(5.0)));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn mode_counts_numeric_text_as_numbers() {
        let cells = vec![
            CellValue::Text("2".to_string()),
            CellValue::Number(2.0),
            CellValue::Number(1.0),
        ];
        assert_eq!(mode(&cells), Some(CellValue::Number(2.0)));
    }

    #[test]
    fn median_and_mean() {
        assert_eq!(median(&nums(&[4.0, 1.0, 3.0, 2.0])), Some(CellValue::Number(2.5)));
        assert_eq!(median(&nums(&[9.0, 1.0, 5.0])), Some(CellValue::Number(5.0)));
        assert_eq!(mean(&nums(&[1.0, 2.0, 6.0])), Some(CellValue::Number(3.0)));
        assert_eq!(mean(&[CellValue::Missing]), None);
    }
}
