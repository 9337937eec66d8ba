//! Funnel telemetry: local event log plus a best-effort analytics forward.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::TelemetryEvent;
use crate::store::{BoundedStore, EVENT_CAPACITY, EVENT_STORE_KEY};

/// External analytics collaborator (tag manager, beacon endpoint, ...).
pub trait AnalyticsBridge {
    fn forward(&self, event: &str, params: &Map<String, Value>) -> Result<()>;
}

/// Forwards events as `tracing` records on the `lead_pipeline::analytics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBridge;

impl AnalyticsBridge for TracingBridge {
    fn forward(&self, event: &str, params: &Map<String, Value>) -> Result<()> {
        let params = Value::Object(params.clone());
        tracing::info!(
            target: "lead_pipeline::analytics",
            event,
            params = %params,
            "analytics event"
        );
        Ok(())
    }
}

/// Bridge that is never configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBridge;

impl AnalyticsBridge for NoopBridge {
    fn forward(&self, _event: &str, _params: &Map<String, Value>) -> Result<()> {
        Ok(())
    }
}

/// How far a tracked event got.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    pub event: TelemetryEvent,
    pub forwarded: bool,
    pub stored: bool,
}

/// Build an event map from `key => value` pairs.
#[macro_export]
macro_rules! event_params {
    () => { ::serde_json::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = ::serde_json::Map::new();
        $( params.insert(($key).to_string(), ::serde_json::json!($value)); )+
        params
    }};
}

/// Record `name` locally and forward it. Neither step can fail the caller:
/// both outcomes are reported, the event is stored even if forwarding failed.
pub fn track_event(
    store: &mut BoundedStore,
    bridge: &dyn AnalyticsBridge,
    name: &str,
    params: Map<String, Value>,
    now: DateTime<Utc>,
) -> TrackOutcome {
    let name = if name.trim().is_empty() { "event" } else { name };
    let mut params = params;
    params.remove("event");
    params.remove("ts");

    let event = TelemetryEvent {
        event: name.to_string(),
        ts: now,
        params,
    };

    let forwarded = match bridge.forward(&event.event, &event.params) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(event = %event.event, error = %err, "analytics forward failed");
            false
        }
    };

    let stored = match store.append(EVENT_STORE_KEY, event.clone(), EVENT_CAPACITY) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(event = %event.event, error = %err, "event not stored");
            false
        }
    };

    TrackOutcome {
        event,
        forwarded,
        stored,
    }
}

/// Stored events, oldest first.
pub fn load_events(store: &BoundedStore) -> Vec<TelemetryEvent> {
    store.read_list(EVENT_STORE_KEY)
}

/// Bridge error helper for implementors.
pub fn bridge_error(message: impl Into<String>) -> Error {
    Error::Bridge(message.into())
}
