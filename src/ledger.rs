//! Append-only lead ledger and its change signal.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{EnrichedLead, Lead};
use crate::store::{BoundedStore, LEAD_CAPACITY, LEAD_STORE_KEY};

/// What changed in the pipeline, for listeners that redraw dashboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineChange {
    LeadSaved { id: String },
    Reset,
}

type Listener = Box<dyn Fn(&PipelineChange)>;

/// Fan-out of [`PipelineChange`] signals to registered listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&PipelineChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&self, change: PipelineChange) {
        tracing::trace!(?change, listeners = self.listeners.len(), "pipeline updated");
        for listener in &self.listeners {
            listener(&change);
        }
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `lead_<epoch-ms>_<6 base36 chars>`. Unique enough for one browser's
/// ledger, not globally.
pub fn generate_lead_id(now: DateTime<Utc>) -> String {
    let mut entropy = Uuid::new_v4().as_u128();
    let suffix: String = (0..6)
        .map(|_| {
            let digit = (entropy % 36) as usize;
            entropy /= 36;
            BASE36[digit] as char
        })
        .collect();
    format!("lead_{}_{}", now.timestamp_millis(), suffix)
}

/// Assign identity, append to the ledger and notify listeners.
///
/// The returned lead carries its generated fields even when storage is
/// unavailable; in that case nothing is persisted and no change is emitted.
pub fn save_lead(
    store: &mut BoundedStore,
    notifier: &Notifier,
    lead: EnrichedLead,
    now: DateTime<Utc>,
) -> Lead {
    let row = Lead {
        id: generate_lead_id(now),
        created_at: now,
        channel: lead.channel,
        ops: lead.ops,
        attribution: lead.attribution,
        fields: lead.fields,
    };

    match store.append(LEAD_STORE_KEY, row.clone(), LEAD_CAPACITY) {
        Ok(retained) => {
            tracing::info!(
                id = %row.id,
                channel = %row.channel,
                score = row.ops.score,
                stage = row.ops.stage.as_str(),
                retained,
                "lead saved"
            );
            notifier.emit(PipelineChange::LeadSaved { id: row.id.clone() });
        }
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "lead not persisted");
        }
    }

    row
}

/// All stored leads, oldest first.
pub fn load_leads(store: &BoundedStore) -> Vec<Lead> {
    store.read_list(LEAD_STORE_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttributionRecord, Channel, LeadPayload, NextActionType, OpsDecision, Priority, Stage,
    };
    use crate::store::MemorySurface;
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn enriched(name: &str) -> EnrichedLead {
        let mut fields = LeadPayload::new();
        fields.insert("name".to_string(), name.to_string());
        EnrichedLead {
            channel: Channel::Contact,
            ops: OpsDecision {
                score: 30,
                stage: Stage::Nurture,
                priority: Priority::Low,
                next_action_at: Utc::now(),
                next_action_type: NextActionType::NurtureSequence,
                owner: "Owner".to_string(),
            },
            attribution: AttributionRecord::default(),
            fields,
        }
    }

    #[test]
    fn id_has_timestamp_and_suffix() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let id = generate_lead_id(now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "lead");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn save_assigns_identity_and_notifies() {
        let mut store = BoundedStore::in_memory();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = Notifier::new();
        let sink = Rc::clone(&seen);
        notifier.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        let now = Utc::now();
        let lead = save_lead(&mut store, &notifier, enriched("Ada"), now);
        assert_eq!(lead.created_at, now);
        assert_eq!(load_leads(&store), vec![lead.clone()]);
        assert_eq!(
            seen.borrow().as_slice(),
            &[PipelineChange::LeadSaved { id: lead.id }]
        );
    }

    #[test]
    fn ledger_keeps_newest_four_hundred() {
        let mut store = BoundedStore::in_memory();
        let notifier = Notifier::new();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for n in 0..405 {
            save_lead(
                &mut store,
                &notifier,
                enriched(&format!("lead-{n}")),
                start + Duration::seconds(n),
            );
        }

        let leads = load_leads(&store);
        assert_eq!(leads.len(), LEAD_CAPACITY);
        assert_eq!(leads[0].fields["name"], "lead-5");
        assert_eq!(leads[399].fields["name"], "lead-404");
        assert!(leads.iter().all(|l| l.fields["name"] != "lead-4"));
    }

    #[test]
    fn unavailable_storage_still_returns_lead_without_notifying() {
        let mut store = BoundedStore::new(MemorySurface::unavailable());
        let seen = Rc::new(RefCell::new(0));
        let mut notifier = Notifier::new();
        let sink = Rc::clone(&seen);
        notifier.subscribe(move |_| *sink.borrow_mut() += 1);

        let lead = save_lead(&mut store, &notifier, enriched("Ada"), Utc::now());
        assert!(lead.id.starts_with("lead_"));
        assert_eq!(*seen.borrow(), 0);
    }
}
