use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &["ingestbench", "ingestbench_service", "ingestbench_function"];

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// ingestbench crates. Calling it more than once is fine.
///
/// # Example
///
/// ```
/// ingestbench_test::tracing::init();
/// ```
pub fn init() {
    let mut env_filter = EnvFilter::new("ERROR");

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}=TRACE").parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
