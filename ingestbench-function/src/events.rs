//! Small JSON events for the `events` workload.

use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

/// Value of the `source` field of every generated event.
pub const EVENT_SOURCE: &str = "ingestbench";

/// Length of the random `event_id`.
const EVENT_ID_LEN: usize = 16;

#[derive(Debug, Serialize)]
struct Event<'a> {
    timestamp: &'a str,
    event_id: &'a str,
    source: &'static str,
    data: &'a str,
}

/// Builds one compact JSON event whose encoded length is exactly `event_bytes`.
///
/// The `data` field is padded with `x` to reach the size. If the remaining fields alone are
/// already longer than `event_bytes`, the event is returned with empty `data`.
pub fn make_event_payload(event_bytes: usize) -> serde_json::Result<Bytes> {
    let timestamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
    let event_id: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(EVENT_ID_LEN)
        .map(char::from)
        .collect();

    let mut event = Event {
        timestamp: &timestamp,
        event_id: &event_id,
        source: EVENT_SOURCE,
        data: "",
    };

    let minimal = serde_json::to_vec(&event)?;
    let Some(padding) = event_bytes.checked_sub(minimal.len()).filter(|len| *len > 0) else {
        return Ok(minimal.into());
    };

    // `x` needs no escaping, so every padding byte adds exactly one encoded byte.
    let data = "x".repeat(padding);
    event.data = &data;
    Ok(serde_json::to_vec(&event)?.into())
}

/// Generates `count` events of `event_bytes` each.
pub fn make_events(count: usize, event_bytes: usize) -> serde_json::Result<Vec<Bytes>> {
    (0..count).map(|_| make_event_payload(event_bytes)).collect()
}

/// Joins the first `batch_events` events into one newline-delimited JSON body.
///
/// Uses all events if fewer are available. There is no trailing newline.
pub fn aggregate_events(events: &[Bytes], batch_events: usize) -> Bytes {
    let selected = &events[..batch_events.min(events.len())];

    let len = selected.iter().map(Bytes::len).sum::<usize>() + selected.len().saturating_sub(1);
    let mut body = BytesMut::with_capacity(len);
    for (index, event) in selected.iter().enumerate() {
        if index > 0 {
            body.put_u8(b'\n');
        }
        body.put_slice(event);
    }

    body.freeze()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn event_has_exact_size() {
        for size in [128, 200, 1024, 4096, 100_000] {
            let event = make_event_payload(size).unwrap();
            assert_eq!(event.len(), size);
        }
    }

    #[test]
    fn event_is_valid_json() {
        let event = make_event_payload(512).unwrap();
        let value: Value = serde_json::from_slice(&event).unwrap();

        assert_eq!(value["source"], EVENT_SOURCE);
        let event_id = value["event_id"].as_str().unwrap();
        assert_eq!(event_id.len(), EVENT_ID_LEN);
        assert!(event_id.chars().all(|c| c.is_ascii_alphanumeric()));

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(humantime::parse_rfc3339(timestamp).is_ok());

        let data = value["data"].as_str().unwrap();
        assert!(!data.is_empty());
        assert!(data.chars().all(|c| c == 'x'));
    }

    #[test]
    fn tiny_event_is_minimal() {
        let event = make_event_payload(10).unwrap();
        let value: Value = serde_json::from_slice(&event).unwrap();

        assert!(event.len() > 10);
        assert_eq!(value["data"], "");
    }

    #[test]
    fn event_ids_differ() {
        let first: Value = serde_json::from_slice(&make_event_payload(256).unwrap()).unwrap();
        let second: Value = serde_json::from_slice(&make_event_payload(256).unwrap()).unwrap();
        assert_ne!(first["event_id"], second["event_id"]);
    }

    #[test]
    fn aggregates_requested_events() {
        let events = make_events(10, 256).unwrap();

        let body = aggregate_events(&events, 3);
        let lines: Vec<_> = body.split(|byte| *byte == b'\n').collect();

        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.len() == 256));
        assert_eq!(body.len(), 3 * 256 + 2);
    }

    #[test]
    fn aggregates_fewer_events_than_requested() {
        let events = make_events(2, 128).unwrap();

        let body = aggregate_events(&events, 100);
        assert_eq!(body.split(|byte| *byte == b'\n').count(), 2);
        assert!(!body.ends_with(b"\n"));
    }

    #[test]
    fn aggregating_nothing_is_empty() {
        assert!(aggregate_events(&[], 10).is_empty());
        assert!(aggregate_events(&make_events(3, 128).unwrap(), 0).is_empty());
    }
}
