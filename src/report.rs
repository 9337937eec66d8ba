use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::context::Lang;
use crate::decision::QUALIFIED_THRESHOLD;
use crate::error::{Error, Result};
use crate::ledger::{Notifier, PipelineChange};
use crate::models::{Channel, Lead, NextActionType, PipelineKpis, Stage};
use crate::store::{BoundedStore, ATTRIBUTION_STORE_KEY, EVENT_STORE_KEY, LEAD_STORE_KEY};
use crate::telemetry::{track_event, AnalyticsBridge};

pub const DEFAULT_RECENT_LIMIT: usize = 8;

pub const EXPORT_COLUMNS: [&str; 33] = [
    "createdAt",
    "type",
    "stage",
    "priority",
    "owner",
    "name",
    "email",
    "phone",
    "company",
    "service",
    "score",
    "selectedDate",
    "selectedTime",
    "budget_range",
    "timeline_pref",
    "decision_role",
    "urgency",
    "nextActionType",
    "nextActionAt",
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

pub fn compute_kpis(leads: &[Lead]) -> PipelineKpis {
    let qualified_count = leads
        .iter()
        .filter(|lead| lead.ops.score >= QUALIFIED_THRESHOLD)
        .count();
    let booking_count = leads
        .iter()
        .filter(|lead| lead.channel == Channel::Booking)
        .count();
    let qualification_rate = if leads.is_empty() {
        0
    } else {
        (qualified_count as f64 / leads.len() as f64 * 100.0).round() as u32
    };

    PipelineKpis {
        lead_count: leads.len(),
        qualified_count,
        booking_count,
        qualification_rate,
    }
}

/// Newest `limit` leads, newest first.
pub fn list_recent(leads: &[Lead], limit: usize) -> Vec<Lead> {
    let mut recent = leads.to_vec();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(limit);
    recent
}

/// CSV of every lead in ledger order, or `None` when there is nothing to export.
///
/// The header row is bare; every data cell is quoted. Rows are joined by
/// `\n` with no newline after the last one.
pub fn export_csv(leads: &[Lead]) -> Result<Option<String>> {
    if leads.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for lead in leads {
        writer.write_record(
            EXPORT_COLUMNS
                .iter()
                .map(|column| lead.field(column).unwrap_or_default()),
        )?;
    }

    let body = writer
        .into_inner()
        .map_err(|err| Error::Io(std::io::Error::new(err.error().kind(), err.to_string())))?;
    let body = String::from_utf8(body).map_err(|err| Error::InvalidInput(err.to_string()))?;

    let mut output = EXPORT_COLUMNS.join(",");
    output.push('\n');
    output.push_str(body.trim_end_matches('\n'));
    Ok(Some(output))
}

fn channel_label(channel: Channel, lang: Lang) -> &'static str {
    match (channel, lang) {
        (Channel::Booking, Lang::En) => "Booking",
        (Channel::Booking, Lang::Tr) => "Rezervasyon",
        (Channel::Analysis, Lang::En) => "Analysis",
        (Channel::Analysis, Lang::Tr) => "Analiz",
        (Channel::Contact, Lang::En) => "Contact",
        (Channel::Contact, Lang::Tr) => "İletişim",
    }
}

fn stage_label(stage: Stage, lang: Lang) -> &'static str {
    match (stage, lang) {
        (Stage::Hot, Lang::En) => "Hot",
        (Stage::Hot, Lang::Tr) => "Sıcak",
        (Stage::Qualified, Lang::En) => "Qualified",
        (Stage::Qualified, Lang::Tr) => "Nitelikli",
        (Stage::Nurture, Lang::En) => "Nurture",
        (Stage::Nurture, Lang::Tr) => "Takip",
    }
}

fn next_action_label(action: NextActionType, lang: Lang) -> &'static str {
    match (action, lang) {
        (NextActionType::BookingConfirmation, Lang::En) => "Booking confirmation",
        (NextActionType::BookingConfirmation, Lang::Tr) => "Rezervasyon teyidi",
        (NextActionType::SameDayDiscovery, Lang::En) => "Same-day discovery call",
        (NextActionType::SameDayDiscovery, Lang::Tr) => "Ayni gun kesif gorusmesi",
        (NextActionType::ScopeFollowup, Lang::En) => "Scope follow-up",
        (NextActionType::ScopeFollowup, Lang::Tr) => "Kapsam takip gorusmesi",
        (NextActionType::NurtureSequence, Lang::En) => "Nurture sequence",
        (NextActionType::NurtureSequence, Lang::Tr) => "Nurture takip akisi",
    }
}

/// `67%` in English, `%67` in Turkish.
pub fn rate_label(rate: u32, lang: Lang) -> String {
    match lang {
        Lang::En => format!("{rate}%"),
        Lang::Tr => format!("%{rate}"),
    }
}

fn date_label(ts: DateTime<Utc>, lang: Lang) -> String {
    match lang {
        Lang::En => ts.format("%m/%d/%Y").to_string(),
        Lang::Tr => ts.format("%d.%m.%Y").to_string(),
    }
}

/// Markdown table of the most recent leads.
pub fn render_recent_table(leads: &[Lead], lang: Lang, limit: usize) -> String {
    let mut output = String::new();

    if leads.is_empty() {
        let empty = match lang {
            Lang::En => "No lead records yet.",
            Lang::Tr => "Henüz lead kaydı yok.",
        };
        let _ = writeln!(output, "{empty}");
        return output;
    }

    let header = match lang {
        Lang::En => "| Date | Channel | Name | Score | Stage | Next action |",
        Lang::Tr => "| Tarih | Kanal | İsim | Skor | Aşama | Sonraki adım |",
    };
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "|---|---|---|---|---|---|");

    for lead in list_recent(leads, limit) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} / {} |",
            date_label(lead.created_at, lang),
            channel_label(lead.channel, lang),
            lead.display_name().replace('|', "/"),
            lead.ops.score,
            stage_label(lead.ops.stage, lang),
            date_label(lead.ops.next_action_at, lang),
            next_action_label(lead.ops.next_action_type, lang),
        );
    }

    output
}

/// Pipeline summary: KPIs followed by the recent-leads table.
pub fn build_report(leads: &[Lead], lang: Lang) -> String {
    let kpis = compute_kpis(leads);
    let mut output = String::new();

    let (leads_label, qualified_label, bookings_label, rate_name, recent_label) = match lang {
        Lang::En => ("Leads", "Qualified", "Bookings", "Qualification rate", "Recent Leads"),
        Lang::Tr => ("Lead", "Nitelikli", "Rezervasyon", "Nitelik oranı", "Son Leadler"),
    };

    let _ = writeln!(output, "# Lead Pipeline");
    let _ = writeln!(output);
    let _ = writeln!(output, "- {leads_label}: {}", kpis.lead_count);
    let _ = writeln!(output, "- {qualified_label}: {}", kpis.qualified_count);
    let _ = writeln!(output, "- {bookings_label}: {}", kpis.booking_count);
    let _ = writeln!(
        output,
        "- {rate_name}: {}",
        rate_label(kpis.qualification_rate, lang)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## {recent_label}");
    output.push_str(&render_recent_table(leads, lang, DEFAULT_RECENT_LIMIT));

    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Everything was cleared; `storage_ok` is false if any key failed to clear.
    Cleared { storage_ok: bool },
    /// Caller did not confirm; nothing was touched.
    Declined,
}

/// Wipe leads, telemetry and attribution. Irreversible.
///
/// The `pipeline_clear` event is tracked after the wipe so it survives it.
pub fn reset_all(
    store: &mut BoundedStore,
    bridge: &dyn AnalyticsBridge,
    notifier: &Notifier,
    confirmed: bool,
    now: DateTime<Utc>,
) -> ResetOutcome {
    if !confirmed {
        tracing::info!("pipeline reset declined");
        return ResetOutcome::Declined;
    }

    let mut storage_ok = true;
    for key in [LEAD_STORE_KEY, EVENT_STORE_KEY, ATTRIBUTION_STORE_KEY] {
        if let Err(err) = store.clear(key) {
            tracing::warn!(key, error = %err, "failed to clear store key");
            storage_ok = false;
        }
    }

    track_event(store, bridge, "pipeline_clear", serde_json::Map::new(), now);
    notifier.emit(PipelineChange::Reset);
    tracing::info!(storage_ok, "pipeline reset");

    ResetOutcome::Cleared { storage_ok }
}
