//! Utilities for building, running and connecting Ptolemy models.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

pub mod bridge;
#[cfg(feature = "runner")]
pub mod runner;
mod timeout;

pub use timeout::Timeout;
