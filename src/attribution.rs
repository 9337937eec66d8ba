//! First/last-touch acquisition tracking.
//!
//! The stored record is a sticky merge: a capture only overwrites fields for
//! which it has a non-empty value, and `first_seen_at` is written once.

use chrono::{DateTime, Utc};

use crate::context::PageContext;
use crate::models::AttributionRecord;
use crate::store::{BoundedStore, ATTRIBUTION_CAPACITY, ATTRIBUTION_STORE_KEY};

/// Candidate values observable on the current page.
pub fn attribution_patch(page: &PageContext, now: DateTime<Utc>) -> AttributionRecord {
    AttributionRecord {
        utm_source: page.query_param("utm_source"),
        utm_medium: page.query_param("utm_medium"),
        utm_campaign: page.query_param("utm_campaign"),
        utm_content: page.query_param("utm_content"),
        utm_term: page.query_param("utm_term"),
        gclid: page.query_param("gclid"),
        fbclid: page.query_param("fbclid"),
        referrer: page.referrer.clone(),
        landing_page: page.landing_page(),
        locale: page.locale.clone(),
        timezone: page.timezone.clone(),
        device: Some(page.device()),
        first_seen_at: None,
        last_seen_at: Some(now),
    }
}

fn keep_non_empty(target: &mut String, incoming: String) {
    if !incoming.is_empty() {
        *target = incoming;
    }
}

/// Merge `patch` over `current`, never erasing a stored value with an empty one.
pub fn merge_attribution(current: AttributionRecord, patch: AttributionRecord) -> AttributionRecord {
    let mut merged = current;
    keep_non_empty(&mut merged.utm_source, patch.utm_source);
    keep_non_empty(&mut merged.utm_medium, patch.utm_medium);
    keep_non_empty(&mut merged.utm_campaign, patch.utm_campaign);
    keep_non_empty(&mut merged.utm_content, patch.utm_content);
    keep_non_empty(&mut merged.utm_term, patch.utm_term);
    keep_non_empty(&mut merged.gclid, patch.gclid);
    keep_non_empty(&mut merged.fbclid, patch.fbclid);
    keep_non_empty(&mut merged.referrer, patch.referrer);
    keep_non_empty(&mut merged.landing_page, patch.landing_page);
    keep_non_empty(&mut merged.locale, patch.locale);
    keep_non_empty(&mut merged.timezone, patch.timezone);
    if patch.device.is_some() {
        merged.device = patch.device;
    }
    if patch.last_seen_at.is_some() {
        merged.last_seen_at = patch.last_seen_at;
    }
    if merged.first_seen_at.is_none() {
        merged.first_seen_at = patch.first_seen_at.or(patch.last_seen_at);
    }
    merged
}

/// The stored singleton, if one exists and decodes.
pub fn stored_attribution(store: &BoundedStore) -> Option<AttributionRecord> {
    store
        .read_list::<AttributionRecord>(ATTRIBUTION_STORE_KEY)
        .into_iter()
        .next()
}

/// Record this page load's acquisition context into the singleton slot.
/// Returns the merged record, whether or not it could be persisted.
pub fn capture_attribution(
    store: &mut BoundedStore,
    page: &PageContext,
    now: DateTime<Utc>,
) -> AttributionRecord {
    let current = stored_attribution(store).unwrap_or_default();
    let merged = merge_attribution(current, attribution_patch(page, now));

    if let Err(err) = store.append(ATTRIBUTION_STORE_KEY, merged.clone(), ATTRIBUTION_CAPACITY) {
        tracing::warn!(error = %err, "attribution not persisted");
    } else {
        tracing::debug!(
            utm_source = %merged.utm_source,
            landing_page = %merged.landing_page,
            "attribution captured"
        );
    }
    merged
}

/// Stored attribution laid over what the current page can tell us, so callers
/// always see path, locale, timezone and device even before any capture.
pub fn get_attribution(store: &BoundedStore, page: &PageContext) -> AttributionRecord {
    let fallback = AttributionRecord {
        landing_page: page.landing_page(),
        locale: page.locale.clone(),
        timezone: page.timezone.clone(),
        device: Some(page.device()),
        ..AttributionRecord::default()
    };

    match stored_attribution(store) {
        Some(stored) => merge_attribution(fallback, stored),
        None => fallback,
    }
}
