//! Table ingestion.
//!
//! The cleaning pipeline never touches the filesystem. It is handed
//! `DataFrame`s by a [`TableLoader`], which the caller picks:
//!
//! - [`CsvLoader`]: `<root>/<name>.csv` with a configurable [`CsvFormat`]
//!   (semicolon-delimited, decimal-comma exports are the common case)
//! - [`CachedLoader`]: wraps any loader and keeps each table after first load

mod cache;
mod csv;
mod error;
mod loader;

pub use cache::CachedLoader;
pub use csv::{CsvFormat, read_csv_frame, write_csv_frame};
pub use error::{IngestError, Result};
pub use loader::{CsvLoader, TableLoader};
