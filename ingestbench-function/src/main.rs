//! The `ingestbench` binary, running one benchmark invocation per call.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    ingestbench_function::cli::execute()
}
