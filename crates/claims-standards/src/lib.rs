//! Line-of-business schemas.
//!
//! Schemas live as TOML files under `schemas/` at the workspace root (or the
//! directory named by `CLAIMS_SCHEMAS_DIR`). Each file deserializes into a
//! [`LineSchema`]; [`SchemaRegistry`] loads a whole directory and
//! [`lint_schema`] reports structural misconfiguration that the pipeline
//! tolerates but an operator should fix.
//!
//! [`LineSchema`]: claims_model::LineSchema

pub mod error;
pub mod lint;
pub mod loader;
pub mod registry;

pub use error::{Result, SchemaError};
pub use lint::{SchemaWarning, lint_schema};
pub use loader::{SCHEMAS_ENV_VAR, default_schemas_root, load_schema, load_schema_file};
pub use registry::SchemaRegistry;
