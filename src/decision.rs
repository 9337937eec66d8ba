use chrono::{DateTime, Duration, Utc};

use crate::models::{Channel, LeadPayload, NextActionType, OpsDecision, Priority, Stage};
use crate::scoring::score_lead;

pub const HOT_THRESHOLD: u8 = 80;
pub const QUALIFIED_THRESHOLD: u8 = 60;

/// Owner name used when no brand is configured.
pub const FALLBACK_OWNER: &str = "Owner";

pub fn stage_for_score(score: u8) -> Stage {
    if score >= HOT_THRESHOLD {
        Stage::Hot
    } else if score >= QUALIFIED_THRESHOLD {
        Stage::Qualified
    } else {
        Stage::Nurture
    }
}

pub fn priority_for_stage(stage: Stage) -> Priority {
    match stage {
        Stage::Hot => Priority::High,
        Stage::Qualified => Priority::Medium,
        Stage::Nurture => Priority::Low,
    }
}

pub fn followup_hours(channel: Channel, stage: Stage) -> i64 {
    match (channel, stage) {
        (Channel::Booking, _) => 6,
        (_, Stage::Hot) => 8,
        (_, Stage::Qualified) => 24,
        (_, Stage::Nurture) => 72,
    }
}

pub fn next_action_type(channel: Channel, stage: Stage) -> NextActionType {
    match (channel, stage) {
        (Channel::Booking, _) => NextActionType::BookingConfirmation,
        (_, Stage::Hot) => NextActionType::SameDayDiscovery,
        (_, Stage::Qualified) => NextActionType::ScopeFollowup,
        (_, Stage::Nurture) => NextActionType::NurtureSequence,
    }
}

/// A score the form controller already put on the payload, if it is a usable
/// number. Non-numeric and empty values fall through to the scoring engine.
pub fn preset_score(payload: &LeadPayload) -> Option<u8> {
    let value = payload.get("score")?.trim().parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 100.0) as u8)
}

/// Stage, priority and next scheduled touch for a lead.
pub fn compute_lead_ops(
    payload: &LeadPayload,
    channel: Channel,
    owner: Option<&str>,
    now: DateTime<Utc>,
) -> OpsDecision {
    let score = preset_score(payload).unwrap_or_else(|| score_lead(payload, channel));
    let stage = stage_for_score(score);

    OpsDecision {
        score,
        stage,
        priority: priority_for_stage(stage),
        next_action_at: now + Duration::hours(followup_hours(channel, stage)),
        next_action_type: next_action_type(channel, stage),
        owner: owner
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_OWNER)
            .to_string(),
    }
}
