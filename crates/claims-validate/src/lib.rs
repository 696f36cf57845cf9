//! Field validation.
//!
//! One [`FieldValidator`] is compiled per schema and answers "is this value
//! valid for this column" for every column of both tables. Rules come from
//! configuration; a rule that does not compile is reported once and its
//! column is left unvalidated.
//!
//! [`validate_table`] applies the validator to a whole frame and produces the
//! post-pipeline validity report.

mod error;
mod report;
mod rule;
mod validator;

pub use error::{Result, ValidateError};
pub use report::{Issue, TableReport, validate_table};
pub use rule::CompiledRule;
pub use validator::FieldValidator;
