use chrono::{DateTime, Utc};

use crate::attribution::get_attribution;
use crate::context::SessionContext;
use crate::decision::compute_lead_ops;
use crate::models::{Channel, EnrichedLead, Lead, LeadPayload};
use crate::store::BoundedStore;

/// Combine form input with the ops decision and the visitor's attribution.
///
/// Typed fields shadow same-named form input: ops and attribution values win,
/// and `type` is always the channel. Reads the store, never writes it.
pub fn enrich_lead_payload(
    store: &BoundedStore,
    session: &SessionContext,
    payload: &LeadPayload,
    channel: Channel,
    now: DateTime<Utc>,
) -> EnrichedLead {
    let ops = compute_lead_ops(payload, channel, session.brand_name.as_deref(), now);
    let attribution = get_attribution(store, &session.page);
    let fields = payload
        .iter()
        .filter(|(key, _)| !Lead::is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    EnrichedLead {
        channel,
        ops,
        attribution,
        fields,
    }
}
