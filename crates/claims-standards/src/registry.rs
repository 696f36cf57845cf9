use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use claims_model::LineSchema;
use tracing::info;

use crate::error::{Result, SchemaError};
use crate::loader::{default_schemas_root, load_schema_file};

/// All schemas found in one directory, keyed by schema name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    root: PathBuf,
    schemas: BTreeMap<String, LineSchema>,
}

impl SchemaRegistry {
    /// Load every `*.toml` file in `root`, in file-name order.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let entries = fs::read_dir(root).map_err(|e| SchemaError::io(root, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SchemaError::io(root, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut schemas = BTreeMap::new();
        for path in paths {
            let schema = load_schema_file(&path)?;
            if schemas.contains_key(&schema.name) {
                return Err(SchemaError::Duplicate {
                    name: schema.name,
                    path,
                });
            }
            schemas.insert(schema.name.clone(), schema);
        }
        info!(root = %root.display(), count = schemas.len(), "loaded schema registry");
        Ok(Self {
            root: root.to_path_buf(),
            schemas,
        })
    }

    pub fn load_default() -> Result<Self> {
        Self::load_dir(&default_schemas_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Result<&LineSchema> {
        self.schemas.get(name).ok_or_else(|| SchemaError::NotFound {
            name: name.to_string(),
            root: self.root.clone(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
