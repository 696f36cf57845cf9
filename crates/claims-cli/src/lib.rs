//! Library components of the `claims-clean` binary.

pub mod logging;
pub mod output;
