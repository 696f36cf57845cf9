//! Error types for the cleaning stages.

use claims_ingest::IngestError;
use claims_model::TableKind;
use claims_validate::ValidateError;
use thiserror::Error;

/// Structural failures. Data-quality problems are audit entries, not errors.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A key column the stages cannot work without is absent.
    #[error("{table} table has no '{column}' column")]
    MissingKeyColumn { table: TableKind, column: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for TransformError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
