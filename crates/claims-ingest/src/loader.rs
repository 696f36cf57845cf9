use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;

use crate::csv::{CsvFormat, read_csv_frame};
use crate::error::Result;

/// Source of named tables.
///
/// Names are logical (`"cargo_freq"`, `"cargo_sev"`); how a name maps to
/// storage is up to the implementation.
pub trait TableLoader {
    fn load(&self, name: &str) -> Result<DataFrame>;
}

/// Loads `<root>/<name>.csv`.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    root: PathBuf,
    format: CsvFormat,
}

impl CsvLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            format: CsvFormat::default(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: CsvFormat) -> Self {
        self.format = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }
}

impl TableLoader for CsvLoader {
    fn load(&self, name: &str) -> Result<DataFrame> {
        read_csv_frame(&self.path_for(name), &self.format)
    }
}

impl<L: TableLoader + ?Sized> TableLoader for &L {
    fn load(&self, name: &str) -> Result<DataFrame> {
        (**self).load(name)
    }
}
