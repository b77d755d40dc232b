//! The compute-function payload of the ingestion benchmark.
//!
//! This builds on top of [`ingestbench_service`]. A single invocation generates a payload for the
//! configured workload, uploads it, and prints one structured record of what it measured.

pub mod cli;
pub mod config;
pub mod events;
pub mod handler;
pub mod metrics;
pub mod observability;
