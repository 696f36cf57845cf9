use claims_model::{CellValue, DomainValue, NUMERIC_EPSILON, RuleSpec};
use regex::Regex;

/// A rule ready to evaluate.
#[derive(Debug, Clone)]
pub enum CompiledRule {
    NotNull,
    Range { lo: Option<f64>, hi: Option<f64> },
    Isin { numbers: Vec<f64>, texts: Vec<String> },
    Pattern(Regex),
}

impl CompiledRule {
    /// Compile a declared rule; the error string says why it is malformed.
    pub fn compile(spec: &RuleSpec) -> Result<Self, String> {
        match spec {
            RuleSpec::NotNull => Ok(Self::NotNull),
            RuleSpec::Range { lo, hi } => {
                if let (Some(lo), Some(hi)) = (lo, hi)
                    && lo > hi
                {
                    return Err(format!("range lower bound {lo} exceeds upper bound {hi}"));
                }
                if lo.is_some_and(f64::is_nan) || hi.is_some_and(f64::is_nan) {
                    return Err("range bound is NaN".to_string());
                }
                Ok(Self::Range { lo: *lo, hi: *hi })
            }
            RuleSpec::Isin { values } => {
                if values.is_empty() {
                    return Err("isin rule has no allowed values".to_string());
                }
                let mut numbers = Vec::new();
                let mut texts = Vec::new();
                for value in values {
                    match value {
                        DomainValue::Number(v) => numbers.push(*v),
                        DomainValue::Text(s) => texts.push(s.trim().to_string()),
                    }
                }
                Ok(Self::Isin { numbers, texts })
            }
            RuleSpec::Pattern { regex } => Regex::new(&format!("^(?:{regex})$"))
                .map(Self::Pattern)
                .map_err(|e| format!("invalid pattern: {e}")),
        }
    }

    /// True when the rule coerces values to numbers before checking.
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Range { .. } => true,
            Self::Isin { numbers, texts } => !numbers.is_empty() && texts.is_empty(),
            _ => false,
        }
    }

    pub fn accepts(&self, value: &CellValue) -> bool {
        if value.is_missing() {
            return false;
        }
        match self {
            Self::NotNull => true,
            Self::Range { lo, hi } => match value.as_f64() {
                Some(v) if v.is_nan() => false,
                Some(v) => lo.is_none_or(|lo| v >= lo) && hi.is_none_or(|hi| v <= hi),
                None => false,
            },
            Self::Isin { numbers, texts } => {
                if let CellValue::Text(s) = value
                    && texts.iter().any(|t| t == s.trim())
                {
                    return true;
                }
                match value.as_f64() {
                    Some(v) => numbers.iter().any(|n| (n - v).abs() <= NUMERIC_EPSILON),
                    None => false,
                }
            }
            Self::Pattern(regex) => value
                .as_text()
                .is_some_and(|text| regex.is_match(text.trim())),
        }
    }

    pub fn upper_bound(&self) -> Option<f64> {
        match self {
            Self::Range { hi, .. } => *hi,
            Self::Isin { numbers, .. } => numbers.iter().copied().reduce(f64::max),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(spec: RuleSpec) -> CompiledRule {
        CompiledRule::compile(&spec).expect("compiles")
    }

    #[test]
    fn range_is_inclusive_and_coerces() {
        let rule = compile(RuleSpec::Range {
            lo: Some(0.0),
            hi: Some(1.0),
        });
        assert!(rule.accepts(&CellValue::Number(0.0)));
        assert!(rule.accepts(&CellValue::Number(1.0)));
        assert!(rule.accepts(&CellValue::Text(" 0.6 ".to_string())));
        assert!(!rule.accepts(&CellValue::Number(-1.3)));
        assert!(!rule.accepts(&CellValue::Text("n/a".to_string())));
        assert!(!rule.accepts(&CellValue::Missing));
    }

    #[test]
    fn open_range_bounds() {
        let rule = compile(RuleSpec::Range {
            lo: Some(0.0),
            hi: None,
        });
        assert!(rule.accepts(&CellValue::Number(1e12)));
        assert!(!rule.accepts(&CellValue::Number(-0.5)));
        assert_eq!(rule.upper_bound(), None);
    }

    #[test]
    fn isin_matches_numbers_and_text() {
        let rule = compile(RuleSpec::Isin {
            values: vec![DomainValue::Number(1.0), DomainValue::Number(2.0)],
        });
        assert!(rule.accepts(&CellValue::Text("2".to_string())));
        assert!(rule.accepts(&CellValue::Number(2.0)));
        assert!(!rule.accepts(&CellValue::Number(2.5)));
        assert!(rule.is_numeric());

        let rule = compile(RuleSpec::Isin {
            values: vec![DomainValue::Text("Zeta".to_string())],
        });
        assert!(rule.accepts(&CellValue::Text(" Zeta".to_string())));
        assert!(!rule.accepts(&CellValue::Text("zeta".to_string())));
    }

    #[test]
    fn pattern_is_a_full_match() {
        let rule = compile(RuleSpec::Pattern {
            regex: "[A-Z][0-9]".to_string(),
        });
        assert!(rule.accepts(&CellValue::Text("G3".to_string())));
        assert!(!rule.accepts(&CellValue::Text("G33".to_string())));
        assert!(!rule.accepts(&CellValue::Text("xG3".to_string())));
    }

    #[test]
    fn malformed_rules_do_not_compile() {
        assert!(CompiledRule::compile(&RuleSpec::Pattern {
            regex: "[A-Z".to_string()
        })
        .is_err());
        assert!(CompiledRule::compile(&RuleSpec::Range {
            lo: Some(2.0),
            hi: Some(1.0)
        })
        .is_err());
        assert!(CompiledRule::compile(&RuleSpec::Isin { values: vec![] }).is_err());
    }
}
