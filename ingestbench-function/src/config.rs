//! Configuration for the benchmark function.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `IB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `IB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `IB__WORKLOAD=batch` selects the multipart workload
//! - `IB__OUTPUT_BUCKET=ingest-results` sets the destination bucket
//! - `IB__STORAGE__TYPE=memory` runs against the in-memory backend
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! workload: batch
//! output_bucket: ingest-results
//!
//! storage:
//!   type: memory
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use figment::providers::{Env, Format, Serialized, Yaml};
use ingestbench_service::backend::S3BackendConfig;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "IB__";

/// Accepted values of [`Config::batch_events`].
pub const BATCH_EVENTS_CHOICES: [usize; 3] = [1, 10, 100];

/// Accepted values of [`Config::multipart_mb`].
pub const MULTIPART_MB_CHOICES: [u64; 3] = [8, 32, 64];

/// The upload pattern a single invocation performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    /// Many small JSON events aggregated into one object and stored with a single put.
    Events,
    /// One large generated object streamed through a multipart upload.
    Batch,
}

impl Workload {
    /// The name of the workload as used in object keys and records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Amazon S3 or an S3-compatible service (type `"s3"`).
    ///
    /// Credentials are resolved by the AWS SDK from the environment, a profile, or the execution
    /// role of the function.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: s3
    ///   endpoint: http://localhost:9000
    ///   path_style: true
    /// ```
    S3 {
        /// Region of the bucket.
        ///
        /// Defaults to the region of the runtime context, see
        /// [`RuntimeContext`](crate::handler::RuntimeContext).
        region: Option<String>,

        /// Custom endpoint URL for S3-compatible services.
        endpoint: Option<String>,

        /// Address buckets as a path segment instead of a subdomain.
        ///
        /// Most S3-compatible services running locally require this.
        #[serde(default)]
        path_style: bool,
    },

    /// In-process storage that discards all objects on exit (type `"memory"`).
    ///
    /// Useful to measure the generation and buffering overhead without network I/O.
    Memory,
}

impl Storage {
    /// Converts S3 settings into backend settings, using `default_region` if no region is set.
    ///
    /// Returns `None` for the in-memory backend.
    pub fn s3_config(&self, default_region: &str) -> Option<S3BackendConfig> {
        match self {
            Self::S3 {
                region,
                endpoint,
                path_style,
            } => Some(S3BackendConfig {
                region: Some(region.as_deref().unwrap_or(default_region).to_owned()),
                endpoint: endpoint.clone(),
                path_style: *path_style,
            }),
            Self::Memory => None,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Compact output with colors.
    ///
    /// ```text
    ///  INFO ingestbench_function::handler: Uploaded object workload=batch
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2026-10-18T12:10:32.139Z  INFO ingestbench_function::handler: Uploaded object workload=batch
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2026-10-18T12:11:08.729716Z","level":"INFO","message":"Uploaded object","workload":"batch","target":"ingestbench_function::handler"}
    /// ```
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they never mix with the invocation record on stdout.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. A plain level in
    /// `RUST_LOG` takes precedence over this setting.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `IB__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `IB__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Settings of one benchmark function variant.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// The workload to run.
    ///
    /// # Default
    ///
    /// `events`
    pub workload: Workload,

    /// Bucket receiving all uploaded objects. Required.
    ///
    /// # Environment Variable
    ///
    /// `IB__OUTPUT_BUCKET`
    pub output_bucket: String,

    /// Memory size of the function variant in MB.
    ///
    /// This is only reported in the invocation record, it does not limit anything.
    ///
    /// # Default
    ///
    /// `1024`
    pub memory_mb: u32,

    /// Reserved concurrency of the function variant, reported in the invocation record.
    ///
    /// Reported as `0` when unset.
    pub reserved_concurrency: Option<u32>,

    /// Number of events aggregated into one object by the `events` workload.
    ///
    /// Must be one of 1, 10 or 100.
    ///
    /// # Default
    ///
    /// `1`
    pub batch_events: usize,

    /// Encoded size of each generated event in bytes.
    ///
    /// # Default
    ///
    /// `1024`
    pub event_bytes: usize,

    /// Part size of the `batch` workload in MB.
    ///
    /// Must be one of 8, 32 or 64.
    ///
    /// # Default
    ///
    /// `8`
    pub multipart_mb: u64,

    /// Size of the object generated by the `batch` workload in MB. Fractions are allowed.
    ///
    /// # Default
    ///
    /// `100`
    pub object_mb: f64,

    /// Prefix prepended to every object key, e.g. `experiments/`.
    pub name_prefix: String,

    /// Maximum duration of a multipart upload, e.g. `10m`.
    ///
    /// When exceeded, the upload is aborted. There is no deadline if unset.
    #[serde(default, with = "humantime_serde")]
    pub upload_deadline: Option<Duration>,

    /// Time allowed for aborting a failed multipart upload.
    ///
    /// # Default
    ///
    /// `5s`
    #[serde(with = "humantime_serde")]
    pub abort_grace: Duration,

    /// The storage backend receiving uploads.
    ///
    /// # Default
    ///
    /// S3 in the region of the runtime context.
    pub storage: Storage,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workload: Workload::Events,
            output_bucket: String::new(),
            memory_mb: 1024,
            reserved_concurrency: None,
            batch_events: 1,
            event_bytes: 1024,
            multipart_mb: 8,
            object_mb: 100.0,
            name_prefix: String::new(),
            upload_deadline: None,
            abort_grace: Duration::from_secs(5),
            storage: Storage::S3 {
                region: None,
                endpoint: None,
                path_style: false,
            },
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `IB__`)
    ///
    /// The result is not validated, see [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Checks the settings that cannot be expressed in their types.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.output_bucket.is_empty(),
            "output_bucket is required (set IB__OUTPUT_BUCKET)"
        );
        ensure!(
            self.object_mb.is_finite() && self.object_mb >= 0.0,
            "object_mb must be a non-negative number, got {}",
            self.object_mb
        );

        // Sizes are only checked for the workload that reads them.
        match self.workload {
            Workload::Events => ensure!(
                BATCH_EVENTS_CHOICES.contains(&self.batch_events),
                "batch_events must be one of {BATCH_EVENTS_CHOICES:?}, got {}",
                self.batch_events
            ),
            Workload::Batch => {
                ensure!(
                    MULTIPART_MB_CHOICES.contains(&self.multipart_mb),
                    "multipart_mb must be one of {MULTIPART_MB_CHOICES:?}, got {}",
                    self.multipart_mb
                );
                ensure!(
                    self.object_mb > 0.0,
                    "object_mb must be positive for the batch workload"
                );
            }
        }

        Ok(())
    }
}
