//! The entry point of one benchmark invocation.
//!
//! [`Handler::invoke`] runs the configured workload against the storage backend, measures it, and
//! emits exactly one [`InvocationMetrics`] record, whether the workload succeeded or not.

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use ingestbench_service::backend::{InMemoryBackend, ObjectTarget, S3Backend, SharedBackend};
use ingestbench_service::generator::LargeObject;
use ingestbench_service::multipart::MultipartUploader;
use ingestbench_service::size::{MIB, PartSize};
use ingestbench_service::stats::MultipartStats;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, Storage, Workload};
use crate::events::{aggregate_events, make_events};
use crate::metrics::{InvocationMetrics, now_ms};

/// Region used when the environment names none.
const DEFAULT_REGION: &str = "us-east-1";

/// Function name used outside of a function runtime.
const LOCAL_FUNCTION_NAME: &str = "local";

/// Content type of the objects written by the `events` workload.
const EVENTS_CONTENT_TYPE: &str = "application/json";

const RUN_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const RUN_ID_SUFFIX_LEN: usize = 6;

/// Where the function is running, as reported by its environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeContext {
    /// The region of the function.
    pub region: String,
    /// The name of the deployed function variant.
    pub function_name: String,
}

impl RuntimeContext {
    /// Reads the context from the standard function runtime variables.
    ///
    /// The region is taken from `AWS_REGION`, then `AWS_DEFAULT_REGION`, then defaults to
    /// `us-east-1`. The function name is taken from `AWS_LAMBDA_FUNCTION_NAME` and defaults to
    /// `local`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Self {
            region: lookup("AWS_REGION")
                .or_else(|| lookup("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            function_name: lookup("AWS_LAMBDA_FUNCTION_NAME")
                .unwrap_or_else(|| LOCAL_FUNCTION_NAME.to_owned()),
        }
    }
}

/// Creates the backend selected by `storage`.
pub async fn build_backend(storage: &Storage, region: &str) -> SharedBackend {
    match storage.s3_config(region) {
        Some(s3_config) => Arc::new(S3Backend::new(&s3_config).await),
        None => Arc::new(InMemoryBackend::new()),
    }
}

/// Creates a run id of the form `run_{unix_millis}_{suffix}`.
pub fn generate_run_id(unix_millis: u64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..RUN_ID_SUFFIX_LEN)
        .map(|_| char::from(RUN_ID_ALPHABET[rng.random_range(0..RUN_ID_ALPHABET.len())]))
        .collect();

    format!("run_{unix_millis}_{suffix}")
}

/// Creates a unique object key of the form `{prefix}{workload}/{run_id}/{millis}-{uuid}.jsonl`.
pub fn object_key(
    name_prefix: &str,
    workload: Workload,
    run_id: &str,
    unix_millis: u64,
) -> String {
    let unique = Uuid::new_v4().simple();
    format!("{name_prefix}{workload}/{run_id}/{unix_millis}-{unique}.jsonl")
}

/// The reply to a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvocationResponse {
    /// Always `true`, failures are returned as errors.
    pub ok: bool,
    /// The run the invocation belonged to.
    pub run_id: String,
    /// Duration of the invocation.
    pub latency_ms: u64,
    /// Key of the uploaded object.
    pub s3_key: String,
    /// Size of the uploaded object.
    pub object_bytes: u64,
    /// Number of events in the object, for the `events` workload.
    pub events_generated: usize,
    /// Number of uploaded parts, for the `batch` workload.
    pub multipart_parts: usize,
}

/// The expected shape of a `batch` upload, computed without uploading anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadPlan {
    /// Size of the generated object.
    pub object_size: ByteSize,
    /// Size of every part but the last.
    pub part_size: ByteSize,
    /// Size of the generated object in bytes.
    pub total_bytes: u64,
    /// Number of parts the object will be uploaded in.
    pub total_parts: u64,
    /// Size of the last part in bytes.
    pub last_part_bytes: u64,
}

/// Computes the [`UploadPlan`] of the configured `batch` workload.
pub fn plan(config: &Config) -> Result<UploadPlan> {
    let part_size = part_size(config)?;
    let object = LargeObject::from_megabytes(config.object_mb);
    let stats = MultipartStats::new(object.total_bytes(), part_size);

    Ok(UploadPlan {
        object_size: ByteSize::b(stats.total_bytes),
        part_size: ByteSize::b(stats.part_size_bytes),
        total_bytes: stats.total_bytes,
        total_parts: stats.total_parts,
        last_part_bytes: stats.last_part_bytes,
    })
}

fn part_size(config: &Config) -> Result<PartSize> {
    PartSize::new(config.multipart_mb.saturating_mul(MIB)).context("invalid multipart_mb")
}

/// Runs workloads of one function variant.
#[derive(Debug)]
pub struct Handler {
    config: Config,
    context: RuntimeContext,
    backend: SharedBackend,
    created_ms: u64,
    warm: AtomicBool,
}

impl Handler {
    /// Creates a handler uploading to `backend`.
    pub fn new(config: Config, context: RuntimeContext, backend: SharedBackend) -> Self {
        Self {
            config,
            context,
            backend,
            created_ms: now_ms(),
            warm: AtomicBool::new(false),
        }
    }

    /// Creates a handler uploading to the backend selected in the configuration.
    pub async fn from_config(config: Config, context: RuntimeContext) -> Self {
        let backend = build_backend(&config.storage, &context.region).await;
        Self::new(config, context, backend)
    }

    /// Runs the workload and prints its record to stdout.
    ///
    /// If no `run_id` is given, a new one is generated. The record is printed before a failure is
    /// returned.
    pub async fn invoke(&self, run_id: Option<String>) -> Result<InvocationResponse> {
        let (metrics, result) = self.run(run_id).await;
        metrics.emit()?;
        result
    }

    /// Runs the workload and returns its record alongside the result.
    pub async fn run(
        &self,
        run_id: Option<String>,
    ) -> (InvocationMetrics, Result<InvocationResponse>) {
        let ts_start_ms = now_ms();
        let config = &self.config;

        // Only the first invocation of a handler is cold. Its init time is the gap since creation.
        let is_cold_start = !self.warm.swap(true, Ordering::Relaxed);
        let cold_start_ms = if is_cold_start {
            ts_start_ms.saturating_sub(self.created_ms)
        } else {
            0
        };

        let run_id = run_id
            .filter(|run_id| !run_id.is_empty())
            .unwrap_or_else(|| generate_run_id(ts_start_ms));
        let key = object_key(&config.name_prefix, config.workload, &run_id, now_ms());
        let target = ObjectTarget::new(&config.output_bucket, &key);

        let mut metrics = InvocationMetrics {
            ts_start_ms,
            workload: config.workload.to_string(),
            run_id: run_id.clone(),
            function_name: self.context.function_name.clone(),
            region: self.context.region.clone(),
            memory_mb: config.memory_mb,
            reserved_concurrency: config.reserved_concurrency.unwrap_or(0),
            s3_bucket: config.output_bucket.clone(),
            s3_key: key,
            is_cold_start,
            cold_start_ms,
            ..Default::default()
        };

        tracing::info!(
            workload = %config.workload,
            %run_id,
            backend = self.backend.name(),
            "Starting invocation"
        );

        let result = match config.workload {
            Workload::Events => self.run_events(&target, &mut metrics).await,
            Workload::Batch => self.run_batch(&target, &mut metrics).await,
        };
        metrics.finish(now_ms());

        match result {
            Ok(()) => {
                tracing::info!(
                    latency_ms = metrics.latency_ms,
                    object_size = %ByteSize::b(metrics.object_bytes),
                    key = %metrics.s3_key,
                    "Invocation finished"
                );
                let response = InvocationResponse {
                    ok: true,
                    run_id,
                    latency_ms: metrics.latency_ms,
                    s3_key: metrics.s3_key.clone(),
                    object_bytes: metrics.object_bytes,
                    events_generated: metrics.events_generated,
                    multipart_parts: metrics.multipart_parts,
                };
                (metrics, Ok(response))
            }
            Err(error) => {
                tracing::error!(
                    error = AsRef::<dyn std::error::Error>::as_ref(&error),
                    latency_ms = metrics.latency_ms,
                    "Invocation failed"
                );
                metrics.fail(&error);
                (metrics, Err(error))
            }
        }
    }

    async fn run_events(
        &self,
        target: &ObjectTarget,
        metrics: &mut InvocationMetrics,
    ) -> Result<()> {
        let batch_events = self.config.batch_events;
        let events =
            make_events(batch_events, self.config.event_bytes).context("failed to build events")?;
        let body = aggregate_events(&events, batch_events);

        metrics.events_generated = events.len();
        metrics.object_bytes = body.len() as u64;

        self.backend
            .put_object(target, EVENTS_CONTENT_TYPE, body)
            .await
            .context("failed to upload events")?;

        Ok(())
    }

    async fn run_batch(
        &self,
        target: &ObjectTarget,
        metrics: &mut InvocationMetrics,
    ) -> Result<()> {
        let part_size = part_size(&self.config)?;
        let object = LargeObject::from_megabytes(self.config.object_mb);
        let planned = MultipartStats::new(object.total_bytes(), part_size);

        tracing::debug!(
            object_size = %ByteSize::b(planned.total_bytes),
            part_size = %ByteSize::b(planned.part_size_bytes),
            planned_parts = planned.total_parts,
            last_part_size = %ByteSize::b(planned.last_part_bytes),
            "Planned multipart upload"
        );

        let mut uploader = MultipartUploader::new(self.backend.clone(), part_size)
            .with_abort_grace(self.config.abort_grace);
        if let Some(deadline) = self.config.upload_deadline {
            uploader = uploader.with_deadline(deadline);
        }

        let outcome = uploader
            .upload(target, object.into_stream())
            .await
            .context("multipart upload failed")?;

        if outcome.part_count as u64 != planned.total_parts {
            tracing::warn!(
                planned_parts = planned.total_parts,
                uploaded_parts = outcome.part_count,
                "Uploaded part count differs from plan"
            );
        }

        metrics.object_bytes = planned.total_bytes;
        metrics.multipart_part_mb = self.config.multipart_mb;
        metrics.multipart_parts = outcome.part_count;

        Ok(())
    }
}
