use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Raw form fields as handed over by the form controller.
pub type LeadPayload = BTreeMap<String, String>;

/// Funnel entry point that produced a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Contact,
    Booking,
    Analysis,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Contact => "contact",
            Channel::Booking => "booking",
            Channel::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contact" => Ok(Channel::Contact),
            "booking" => Ok(Channel::Booking),
            "analysis" => Ok(Channel::Analysis),
            other => Err(Error::InvalidInput(format!("unknown channel: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Nurture,
    Qualified,
    Hot,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Nurture => "nurture",
            Stage::Qualified => "qualified",
            Stage::Hot => "hot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextActionType {
    BookingConfirmation,
    SameDayDiscovery,
    ScopeFollowup,
    NurtureSequence,
}

impl NextActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextActionType::BookingConfirmation => "booking_confirmation",
            NextActionType::SameDayDiscovery => "same_day_discovery",
            NextActionType::ScopeFollowup => "scope_followup",
            NextActionType::NurtureSequence => "nurture_sequence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Mobile,
    Tablet,
    Desktop,
}

impl Device {
    /// Viewport breakpoints used by the site's layout.
    pub fn from_viewport_width(width: u32) -> Self {
        match width {
            0..=767 => Device::Mobile,
            768..=1199 => Device::Tablet,
            _ => Device::Desktop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
            Device::Desktop => "desktop",
        }
    }
}

/// Acquisition context for one browser. Empty strings mean "not captured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionRecord {
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
    pub gclid: String,
    pub fbclid: String,
    pub referrer: String,
    pub landing_page: String,
    pub locale: String,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl AttributionRecord {
    pub const FIELDS: [&'static str; 14] = [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_content",
        "utm_term",
        "gclid",
        "fbclid",
        "referrer",
        "landing_page",
        "locale",
        "timezone",
        "device",
        "first_seen_at",
        "last_seen_at",
    ];

    /// Field value rendered as text, empty when unset.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "utm_source" => self.utm_source.clone(),
            "utm_medium" => self.utm_medium.clone(),
            "utm_campaign" => self.utm_campaign.clone(),
            "utm_content" => self.utm_content.clone(),
            "utm_term" => self.utm_term.clone(),
            "gclid" => self.gclid.clone(),
            "fbclid" => self.fbclid.clone(),
            "referrer" => self.referrer.clone(),
            "landing_page" => self.landing_page.clone(),
            "locale" => self.locale.clone(),
            "timezone" => self.timezone.clone(),
            "device" => self.device.map(|d| d.as_str().to_string()).unwrap_or_default(),
            "first_seen_at" => self.first_seen_at.map(format_timestamp).unwrap_or_default(),
            "last_seen_at" => self.last_seen_at.map(format_timestamp).unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }
}

/// Derived follow-up plan for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsDecision {
    pub score: u8,
    pub stage: Stage,
    pub priority: Priority,
    pub next_action_at: DateTime<Utc>,
    pub next_action_type: NextActionType,
    pub owner: String,
}

/// A persisted lead. Never mutated after it lands in the ledger.
///
/// Field order matters for deserialization: the flattened attribution claims
/// its keys before `fields` collects whatever form input remains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub channel: Channel,
    #[serde(flatten)]
    pub ops: OpsDecision,
    #[serde(flatten)]
    pub attribution: AttributionRecord,
    #[serde(flatten)]
    pub fields: LeadPayload,
}

/// A lead that has been enriched but not yet assigned identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedLead {
    pub channel: Channel,
    pub ops: OpsDecision,
    pub attribution: AttributionRecord,
    pub fields: LeadPayload,
}

impl Lead {
    /// Keys owned by typed fields; form input under these names is shadowed.
    pub fn is_reserved_key(key: &str) -> bool {
        matches!(
            key,
            "id" | "createdAt"
                | "type"
                | "score"
                | "stage"
                | "priority"
                | "nextActionAt"
                | "nextActionType"
                | "owner"
        ) || AttributionRecord::FIELDS.contains(&key)
    }

    /// Any lead field rendered as text, `None` when the lead has no such field.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "createdAt" => Some(format_timestamp(self.created_at)),
            "type" => Some(self.channel.as_str().to_string()),
            "score" => Some(self.ops.score.to_string()),
            "stage" => Some(self.ops.stage.as_str().to_string()),
            "priority" => Some(self.ops.priority.as_str().to_string()),
            "nextActionAt" => Some(format_timestamp(self.ops.next_action_at)),
            "nextActionType" => Some(self.ops.next_action_type.as_str().to_string()),
            "owner" => Some(self.ops.owner.clone()),
            _ => self
                .attribution
                .field(name)
                .or_else(|| self.fields.get(name).cloned()),
        }
    }

    pub fn display_name(&self) -> &str {
        ["name", "email"]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .unwrap_or("-")
    }
}

/// One tracked funnel interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineKpis {
    pub lead_count: usize,
    pub qualified_count: usize,
    pub booking_count: usize,
    pub qualification_rate: u32,
}

/// ISO-8601 with millisecond precision, matching browser `toISOString`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn device_breakpoints() {
        assert_eq!(Device::from_viewport_width(375), Device::Mobile);
        assert_eq!(Device::from_viewport_width(767), Device::Mobile);
        assert_eq!(Device::from_viewport_width(768), Device::Tablet);
        assert_eq!(Device::from_viewport_width(1199), Device::Tablet);
        assert_eq!(Device::from_viewport_width(1440), Device::Desktop);
    }

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("Booking".parse::<Channel>().unwrap(), Channel::Booking);
        assert!("webinar".parse::<Channel>().is_err());
    }

    #[test]
    fn lead_json_uses_flat_browser_shape() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let mut fields = LeadPayload::new();
        fields.insert("name".to_string(), "Deniz".to_string());
        let lead = Lead {
            id: "lead_1_abc".to_string(),
            created_at: now,
            channel: Channel::Booking,
            ops: OpsDecision {
                score: 42,
                stage: Stage::Nurture,
                priority: Priority::Low,
                next_action_at: now,
                next_action_type: NextActionType::BookingConfirmation,
                owner: "Studio".to_string(),
            },
            attribution: AttributionRecord {
                utm_source: "google".to_string(),
                device: Some(Device::Mobile),
                ..AttributionRecord::default()
            },
            fields,
        };

        let value = serde_json::to_value(&lead).unwrap();
        assert_eq!(value["type"], "booking");
        assert_eq!(value["nextActionType"], "booking_confirmation");
        assert_eq!(value["utm_source"], "google");
        assert_eq!(value["device"], "mobile");
        assert_eq!(value["name"], "Deniz");

        let back: Lead = serde_json::from_value(value).unwrap();
        assert_eq!(back, lead);
        assert!(!back.fields.contains_key("utm_source"));
    }

    #[test]
    fn display_name_prefers_name_then_email() {
        let now = Utc::now();
        let mut lead = Lead {
            id: "x".to_string(),
            created_at: now,
            channel: Channel::Contact,
            ops: OpsDecision {
                score: 10,
                stage: Stage::Nurture,
                priority: Priority::Low,
                next_action_at: now,
                next_action_type: NextActionType::NurtureSequence,
                owner: "Owner".to_string(),
            },
            attribution: AttributionRecord::default(),
            fields: LeadPayload::new(),
        };
        assert_eq!(lead.display_name(), "-");
        lead.fields.insert("email".to_string(), "a@b.co".to_string());
        assert_eq!(lead.display_name(), "a@b.co");
        lead.fields.insert("name".to_string(), "Ada".to_string());
        assert_eq!(lead.display_name(), "Ada");
    }
}
