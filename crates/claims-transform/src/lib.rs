//! Cleaning stages for linked policy and claim tables.
//!
//! This crate provides the correction and reconciliation logic:
//!
//! - **text**: whitespace and corruption-suffix cleaning, numeric coercion
//! - **identifier**: truncation, sequential recovery and validation of
//!   fixed-format identifiers
//! - **magnitude**: sign and ×10 scale repair, discrete mode fallback
//! - **sequence**: claim sequence numbers and policy claim counts
//! - **recovery**: composite-key recovery of missing policy keys, placeholders
//! - **reconcile**: internal and cross-table reconciliation of shared columns
//! - **impute**: group → global → constant residual imputation
//! - **merge**: amount cap, amount filter and the policy-level merge
//! - **pipeline**: the driver that runs all of the above in order

pub mod error;
pub mod frame;
pub mod identifier;
pub mod impute;
pub mod magnitude;
pub mod merge;
pub mod pipeline;
pub mod reconcile;
pub mod recovery;
pub mod sequence;
mod stats;
pub mod text;

pub use error::{Result, TransformError};
pub use frame::ClaimsFrame;
pub use pipeline::{CleaningPipeline, PipelineOptions, PipelineOutput, PipelineReport};
