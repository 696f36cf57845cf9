use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("no rule declared for column '{column}'")]
    UnknownColumn { column: String },

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for ValidateError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidateError>;
