use crate::fold::fold_lead_value;
use crate::models::{Channel, LeadPayload};

const BASE_SCORE: i32 = 18;

/// Budget tiers, highest first: (range threshold, budget threshold, bonus).
const BUDGET_TIERS: [(u64, u64, i32); 3] = [
    (750_000, 80_000, 26),
    (300_000, 40_000, 18),
    (100_000, 20_000, 10),
];

const TIMELINE_TIERS: [(&str, i32); 3] = [("0-30", 16), ("31-60", 11), ("61-90", 7)];

const SENIOR_ROLE_TOKENS: [&str; 6] = [
    "kurucu", "founder", "ortak", "partner", "c-level", "executive",
];
const MANAGER_ROLE_TOKENS: [&str; 2] = ["yonetici", "manager"];
const HIGH_URGENCY_TOKENS: [&str; 2] = ["yuksek", "high"];
const MEDIUM_URGENCY_TOKENS: [&str; 2] = ["orta", "medium"];

pub fn channel_bonus(channel: Channel) -> i32 {
    match channel {
        Channel::Booking => 24,
        Channel::Analysis => 16,
        Channel::Contact => 0,
    }
}

/// Largest positive number in a budget answer such as "300.000 - 750.000 TL"
/// or "1M+". Tokens without digits are ignored; oversized ones saturate.
pub fn extract_budget_max(value: &str) -> u64 {
    value
        .split(['-', '\u{2013}', '\u{2014}', '+'])
        .filter_map(|part| {
            let digits: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return None;
            }
            // Only overflow can fail on a pure digit string.
            Some(digits.parse::<u64>().unwrap_or(u64::MAX))
        })
        .filter(|amount| *amount > 0)
        .max()
        .unwrap_or(0)
}

pub fn budget_bonus(budget_range: &str, budget: &str) -> i32 {
    let range_max = extract_budget_max(budget_range);
    let budget_max = extract_budget_max(budget);

    BUDGET_TIERS
        .iter()
        .find(|(range_min, budget_min, _)| range_max >= *range_min || budget_max >= *budget_min)
        .map(|(_, _, bonus)| *bonus)
        .unwrap_or(0)
}

pub fn timeline_bonus(folded: &str) -> i32 {
    TIMELINE_TIERS
        .iter()
        .find(|(token, _)| folded.contains(token))
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0)
}

pub fn decision_role_bonus(folded: &str) -> i32 {
    if contains_any(folded, &SENIOR_ROLE_TOKENS) {
        16
    } else if contains_any(folded, &MANAGER_ROLE_TOKENS) {
        10
    } else {
        0
    }
}

pub fn urgency_bonus(folded: &str) -> i32 {
    if contains_any(folded, &HIGH_URGENCY_TOKENS) {
        10
    } else if contains_any(folded, &MEDIUM_URGENCY_TOKENS) {
        6
    } else {
        0
    }
}

/// Deterministic 0..=100 lead score. Reads the payload defensively: any
/// field may be absent or hold free text in either site language.
pub fn score_lead(payload: &LeadPayload, channel: Channel) -> u8 {
    let raw = |key: &str| payload.get(key).map(String::as_str).unwrap_or("");
    let folded = |key: &str| fold_lead_value(raw(key));

    let mut score = BASE_SCORE + channel_bonus(channel);
    score += budget_bonus(raw("budget_range"), raw("budget"));
    score += timeline_bonus(&folded("timeline_pref"));
    score += decision_role_bonus(&folded("decision_role"));
    score += urgency_bonus(&folded("urgency"));

    if !raw("company").trim().is_empty() {
        score += 6;
    }
    if !raw("phone").trim().is_empty() {
        score += 5;
    }

    score.clamp(0, 100) as u8
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
