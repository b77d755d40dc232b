use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber, writing to stderr.
pub fn init_tracing(logging: &Logging) {
    let (level, env_filter) = parse_rust_log(logging.level);

    let format = match logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Pretty => layer.compact().with_ansi(true).without_time().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Simplified | LogFormat::Auto => layer.with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .init();
}

/// Determines the log level and the per-crate filter.
///
/// A `RUST_LOG` that parses as a plain level overrides `default_level`. Any other `RUST_LOG` is
/// used literally as the filter.
pub fn parse_rust_log(default_level: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default_level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        aws_config=WARN,\
        aws_smithy_runtime=WARN,\
        ingestbench=TRACE,\
        ingestbench_function=TRACE,\
        ingestbench_service=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rust_log_sets_level() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "warn");

            let (level, filter) = parse_rust_log(LevelFilter::INFO);
            assert_eq!(level, LevelFilter::WARN);
            assert!(
                filter
                    .to_string()
                    .to_lowercase()
                    .contains("ingestbench_service=trace")
            );

            Ok(())
        });
    }

    #[test]
    fn directive_rust_log_is_used_literally() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "ingestbench_service=debug");

            let (level, filter) = parse_rust_log(LevelFilter::INFO);
            assert_eq!(level, LevelFilter::TRACE);
            assert_eq!(
                filter.to_string().to_lowercase(),
                "ingestbench_service=debug"
            );

            Ok(())
        });
    }
}
