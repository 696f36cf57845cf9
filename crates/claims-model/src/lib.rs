//! Data model for policy/claim reconciliation.
//!
//! - **cell**: dynamically typed cell values read from either table
//! - **schema**: line-of-business schema (rules, shared columns, recovery keys)
//! - **audit**: the structured decision log every stage writes to
//! - **error**: shared error type

pub mod audit;
pub mod cell;
pub mod error;
pub mod schema;

pub use audit::{AuditEntry, AuditLog, Decision, Stage};
pub use cell::{CellValue, NUMERIC_EPSILON, format_number};
pub use error::{ModelError, Result};
pub use schema::{
    AmountCap, ColumnSpec, DomainValue, FillMethod, IdentifierSpec, KeyColumns, LineSchema,
    MagnitudeMode, PlaceholderSpec, RecoverySpec, RuleSpec, SourcePriority, TableKind, TableScope,
    DEFAULT_MAX_ITERATIONS, DEFAULT_SUFFIX_PATTERN,
};
