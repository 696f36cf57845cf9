//! Shared utilities for the claims crates.
//!
//! The `AnyValue` conversion and the column read/write helpers every
//! cleaning stage uses to move between a `DataFrame` and [`CellValue`]s.
//!
//! [`CellValue`]: claims_model::CellValue

pub mod frame;
pub mod polars;

pub use frame::{column_cells, filter_rows, has_column, missing_columns, write_cells};
pub use polars::any_to_cell;
