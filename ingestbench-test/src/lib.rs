//! Test utilities for the ingestbench crates.
//!
//! See the modules for all available utilities.

pub mod tracing;
