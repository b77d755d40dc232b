//! The structured record emitted once per invocation.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Timings, settings and results of one invocation.
///
/// Printed as a single JSON line to stdout, where the experiment driver collects it. On failure
/// all counters are zero, the key is empty and `error` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InvocationMetrics {
    /// Start of the invocation.
    pub ts_start_ms: u64,
    /// End of the invocation, after the upload finished or failed.
    pub ts_end_ms: u64,
    /// `ts_end_ms - ts_start_ms`.
    pub latency_ms: u64,
    /// Name of the workload that ran.
    pub workload: String,
    /// Identifier grouping invocations of one experiment run.
    pub run_id: String,
    /// Name of the function variant.
    pub function_name: String,
    /// Region the function runs in.
    pub region: String,
    /// Configured memory size of the function variant.
    pub memory_mb: u32,
    /// Configured reserved concurrency, `0` if unset.
    pub reserved_concurrency: u32,
    /// Number of events generated by the `events` workload.
    pub events_generated: usize,
    /// Size of the uploaded object.
    pub object_bytes: u64,
    /// Part size of the `batch` workload in MB.
    pub multipart_part_mb: u64,
    /// Number of parts uploaded by the `batch` workload.
    pub multipart_parts: usize,
    /// Destination bucket.
    pub s3_bucket: String,
    /// Key of the uploaded object, empty on failure.
    pub s3_key: String,
    /// Whether this was the first invocation of the handler.
    pub is_cold_start: bool,
    /// Time between creating the handler and its first invocation, `0` when warm.
    pub cold_start_ms: u64,
    /// The failure of the invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationMetrics {
    /// Sets the end timestamp and derives the latency from it.
    pub fn finish(&mut self, ts_end_ms: u64) {
        self.ts_end_ms = ts_end_ms;
        self.latency_ms = ts_end_ms.saturating_sub(self.ts_start_ms);
    }

    /// Clears the workload results and records `error`.
    pub fn fail(&mut self, error: &anyhow::Error) {
        self.events_generated = 0;
        self.object_bytes = 0;
        self.multipart_part_mb = 0;
        self.multipart_parts = 0;
        self.s3_key.clear();
        self.error = Some(format!("{error:#}"));
    }

    /// Writes the record as one JSON line.
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        serde_json::to_writer(&mut writer, self).context("failed to serialize invocation record")?;
        writer
            .write_all(b"\n")
            .context("failed to write invocation record")?;
        Ok(())
    }

    /// Prints the record to stdout.
    pub fn emit(&self) -> Result<()> {
        self.write_to(std::io::stdout().lock())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn record() -> InvocationMetrics {
        InvocationMetrics {
            ts_start_ms: 1_000,
            workload: "batch".into(),
            run_id: "run_1_abcdef".into(),
            object_bytes: 9 * 1024 * 1024,
            multipart_part_mb: 8,
            multipart_parts: 2,
            s3_bucket: "results".into(),
            s3_key: "batch/run_1_abcdef/1-0.jsonl".into(),
            ..Default::default()
        }
    }

    #[test]
    fn writes_one_json_line() {
        let mut record = record();
        record.finish(1_250);

        let mut output = Vec::new();
        record.write_to(&mut output).unwrap();

        assert_eq!(output.iter().filter(|byte| **byte == b'\n').count(), 1);
        assert!(output.ends_with(b"\n"));

        let value: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["latency_ms"], 250);
        assert_eq!(value["multipart_parts"], 2);
        assert_eq!(value["is_cold_start"], false);
        assert_eq!(value["cold_start_ms"], 0);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_clears_results() {
        let mut record = record();
        record.fail(&anyhow::anyhow!("upload failed").context("batch workload"));

        assert_eq!(record.object_bytes, 0);
        assert_eq!(record.multipart_parts, 0);
        assert_eq!(record.multipart_part_mb, 0);
        assert_eq!(record.s3_key, "");
        assert_eq!(record.s3_bucket, "results");
        assert_eq!(
            record.error.as_deref(),
            Some("batch workload: upload failed")
        );
    }

    #[test]
    fn latency_never_underflows() {
        let mut record = record();
        record.finish(500);
        assert_eq!(record.latency_ms, 0);
    }
}
