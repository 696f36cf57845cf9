use std::fs;
use std::path::{Path, PathBuf};

use claims_model::LineSchema;
use tracing::debug;

use crate::error::{Result, SchemaError};

pub const SCHEMAS_ENV_VAR: &str = "CLAIMS_SCHEMAS_DIR";

/// Get the default schemas directory.
///
/// Checks the `CLAIMS_SCHEMAS_DIR` environment variable first, then falls
/// back to the `schemas/` directory at the workspace root.
pub fn default_schemas_root() -> PathBuf {
    if let Ok(root) = std::env::var(SCHEMAS_ENV_VAR) {
        return PathBuf::from(root);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../schemas")
}

/// Load `<root>/<name>.toml`.
pub fn load_schema(root: &Path, name: &str) -> Result<LineSchema> {
    let path = root.join(format!("{name}.toml"));
    if !path.is_file() {
        return Err(SchemaError::NotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        });
    }
    load_schema_file(&path)
}

/// Parse a single schema file.
pub fn load_schema_file(path: &Path) -> Result<LineSchema> {
    let text = fs::read_to_string(path).map_err(|e| SchemaError::io(path, e))?;
    let schema: LineSchema = toml::from_str(&text).map_err(|source| SchemaError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        schema = %schema.name,
        columns = schema.columns.len(),
        path = %path.display(),
        "loaded schema"
    );
    Ok(schema)
}
