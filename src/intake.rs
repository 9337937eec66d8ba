//! Form-submission guards and the outbound notification seam.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Channel, EnrichedLead, Lead, LeadPayload};
use crate::store::BoundedStore;

/// Sends the lead somewhere a human will see it (email, chat webhook).
pub trait LeadDispatcher {
    /// `Ok(true)` when sent, `Ok(false)` when no transport is configured.
    fn dispatch(&self, lead: &EnrichedLead) -> Result<bool>;
}

/// Dispatcher with no transport; every lead stays pending.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl LeadDispatcher for NoopDispatcher {
    fn dispatch(&self, _lead: &EnrichedLead) -> Result<bool> {
        Ok(false)
    }
}

pub fn dispatch_error(message: impl Into<String>) -> Error {
    Error::Dispatch(message.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    /// No transport configured; the lead is kept locally only.
    Pending,
    Failed(String),
    /// Channel does not notify anyone on submit.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Saved { lead: Lead, dispatch: DispatchStatus },
    CoolingDown { retry_after_secs: u64 },
    /// Honeypot tripped; looks like success to the sender, nothing kept.
    Discarded,
}

/// Submission rules per site.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakePolicy {
    pub contact_cooldown_ms: u64,
    pub analysis_cooldown_ms: u64,
    pub booking_cooldown_ms: u64,
    pub honeypot_fields: Vec<String>,
    pub contact_service_label: String,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            contact_cooldown_ms: 10_000,
            analysis_cooldown_ms: 12_000,
            booking_cooldown_ms: 12_000,
            honeypot_fields: vec!["website".to_string()],
            contact_service_label: "Contact form".to_string(),
        }
    }
}

impl IntakePolicy {
    pub fn cooldown(&self, channel: Channel) -> Duration {
        let ms = match channel {
            Channel::Contact => self.contact_cooldown_ms,
            Channel::Analysis => self.analysis_cooldown_ms,
            Channel::Booking => self.booking_cooldown_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn is_honeypot_triggered(&self, payload: &LeadPayload) -> bool {
        self.honeypot_fields.iter().any(|field| {
            payload
                .get(field)
                .is_some_and(|value| !value.trim().is_empty())
        })
    }

    /// Fill in the placeholders the contact form always carries. Honeypot
    /// fields are dropped so they never reach the ledger.
    pub fn prepare_payload(&self, payload: &LeadPayload, channel: Channel) -> LeadPayload {
        let mut prepared: LeadPayload = payload
            .iter()
            .filter(|(key, _)| !self.honeypot_fields.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if channel == Channel::Contact {
            let note = prepared
                .get("message")
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| "-".to_string());
            fill_blank(&mut prepared, "service", &self.contact_service_label);
            fill_blank(&mut prepared, "selectedDate", "-");
            fill_blank(&mut prepared, "selectedTime", "-");
            fill_blank(&mut prepared, "note", &note);
            fill_blank(&mut prepared, "phone", "-");
            fill_blank(&mut prepared, "company", "-");
        }

        prepared
    }
}

fn fill_blank(payload: &mut LeadPayload, key: &str, default: &str) {
    let entry = payload.entry(key.to_string()).or_default();
    if entry.trim().is_empty() {
        *entry = default.to_string();
    }
}

pub fn cooldown_key(channel: Channel) -> String {
    format!("submitCooldown:{channel}")
}

/// Time left before `channel` accepts another submission. Zero when no stamp
/// exists or it cannot be read.
pub fn cooldown_left(
    store: &BoundedStore,
    channel: Channel,
    wait: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let last: i64 = store.read(&cooldown_key(channel), 0);
    if last <= 0 {
        return Duration::ZERO;
    }
    let wait_ms = i64::try_from(wait.as_millis()).unwrap_or(i64::MAX);
    let elapsed = now.timestamp_millis() - last;
    if elapsed >= wait_ms {
        Duration::ZERO
    } else {
        let left = (wait_ms - elapsed).min(wait_ms);
        Duration::from_millis(left.max(0) as u64)
    }
}

pub fn mark_cooldown(store: &mut BoundedStore, channel: Channel, now: DateTime<Utc>) {
    if let Err(err) = store.write(&cooldown_key(channel), &now.timestamp_millis()) {
        tracing::debug!(%channel, error = %err, "cooldown stamp not stored");
    }
}

/// Whole seconds to tell the sender, rounded up.
pub fn retry_after_secs(left: Duration) -> u64 {
    left.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn payload(pairs: &[(&str, &str)]) -> LeadPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn cooldown_counts_down_from_last_submit() {
        let mut store = BoundedStore::in_memory();
        let now = Utc::now();
        let wait = Duration::from_secs(10);
        assert_eq!(cooldown_left(&store, Channel::Contact, wait, now), Duration::ZERO);

        mark_cooldown(&mut store, Channel::Contact, now);
        let later = now + ChronoDuration::milliseconds(4_500);
        let left = cooldown_left(&store, Channel::Contact, wait, later);
        assert_eq!(left, Duration::from_millis(5_500));
        assert_eq!(retry_after_secs(left), 6);

        let done = now + ChronoDuration::seconds(10);
        assert_eq!(cooldown_left(&store, Channel::Contact, wait, done), Duration::ZERO);
        assert_eq!(cooldown_left(&store, Channel::Booking, wait, later), Duration::ZERO);
    }

    #[test]
    fn corrupt_cooldown_stamp_is_ignored() {
        let store = BoundedStore::new(
            crate::store::MemorySurface::new().with_item("submitCooldown:contact", "soon"),
        );
        let left = cooldown_left(&store, Channel::Contact, Duration::from_secs(10), Utc::now());
        assert_eq!(left, Duration::ZERO);
    }

    #[test]
    fn honeypot_only_trips_on_filled_trap() {
        let policy = IntakePolicy::default();
        assert!(!policy.is_honeypot_triggered(&payload(&[("name", "Ada")])));
        assert!(!policy.is_honeypot_triggered(&payload(&[("website", "  ")])));
        assert!(policy.is_honeypot_triggered(&payload(&[("website", "http://spam")])));
    }

    #[test]
    fn contact_placeholders_are_filled() {
        let policy = IntakePolicy::default();
        let prepared = policy.prepare_payload(
            &payload(&[("name", "Ada"), ("message", "Hello"), ("website", "")]),
            Channel::Contact,
        );
        assert_eq!(prepared["service"], "Contact form");
        assert_eq!(prepared["selectedDate"], "-");
        assert_eq!(prepared["note"], "Hello");
        assert_eq!(prepared["phone"], "-");
        assert_eq!(prepared["company"], "-");
        assert!(!prepared.contains_key("website"));
    }

    #[test]
    fn other_channels_keep_payload_shape() {
        let policy = IntakePolicy::default();
        let prepared = policy.prepare_payload(&payload(&[("goal", "SEO")]), Channel::Analysis);
        assert_eq!(prepared, payload(&[("goal", "SEO")]));
    }
}
