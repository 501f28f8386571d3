//! Narrow structured logging capability handed to the embedded engine.
//!
//! The engine never depends on a logging library directly. It records
//! ordered key/value pairs through a [`LogSink`] injected at construction.

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    /// Records one event. The `msg` key, if present, is the event message.
    fn record(&self, fields: &[(&str, String)]);
}

/// Forwards records to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, fields: &[(&str, String)]) {
        if fields.is_empty() {
            return;
        }
        let (msg, rest) = split_message(fields);
        tracing::info!(target: "tsdb", fields = %rest, "{}", msg);
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl LogSink for DiscardSink {
    fn record(&self, _fields: &[(&str, String)]) {}
}

/// Separates the `msg` field from the remaining pairs, rendered as `k=v`.
fn split_message(fields: &[(&str, String)]) -> (String, String) {
    let mut msg = String::new();
    let mut rest = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        if *key == "msg" {
            msg = value.clone();
        } else {
            rest.push(format!("{}={}", key, value));
        }
    }
    (msg, rest.join(" "))
}
