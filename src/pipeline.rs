//! One handle over the store, its collaborators and the submission flow.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Map;

use crate::attribution::{capture_attribution, get_attribution};
use crate::config::Config;
use crate::context::{PageContext, SessionContext};
use crate::enrich::enrich_lead_payload;
use crate::error::Result;
use crate::intake::{
    cooldown_left, mark_cooldown, retry_after_secs, DispatchStatus, IntakePolicy, LeadDispatcher,
    NoopDispatcher, SubmitOutcome,
};
use crate::ledger::{load_leads, save_lead, Notifier, PipelineChange};
use crate::models::{
    AttributionRecord, Channel, EnrichedLead, Lead, LeadPayload, PipelineKpis, TelemetryEvent,
};
use crate::report::{self, ResetOutcome};
use crate::store::{BoundedStore, FileSurface};
use crate::telemetry::{load_events, track_event, AnalyticsBridge, TrackOutcome, TracingBridge};

pub struct Pipeline {
    store: BoundedStore,
    bridge: Box<dyn AnalyticsBridge>,
    dispatcher: Box<dyn LeadDispatcher>,
    notifier: Notifier,
    policy: IntakePolicy,
    export_file_name: String,
}

impl Pipeline {
    pub fn new(store: BoundedStore) -> Self {
        Self {
            store,
            bridge: Box::new(TracingBridge),
            dispatcher: Box::new(NoopDispatcher),
            notifier: Notifier::new(),
            policy: IntakePolicy::default(),
            export_file_name: "crm-leads.csv".to_string(),
        }
    }

    /// File-backed pipeline rooted at `data_dir`, with policy from `config`.
    pub fn open(config: &Config, data_dir: &Path) -> Self {
        tracing::debug!(data_dir = %data_dir.display(), "opening pipeline store");
        Self::new(BoundedStore::new(FileSurface::new(data_dir)))
            .with_policy(config.intake.clone())
            .with_export_file_name(config.export.file_name.clone())
    }

    pub fn with_bridge(mut self, bridge: impl AnalyticsBridge + 'static) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: impl LeadDispatcher + 'static) -> Self {
        self.dispatcher = Box::new(dispatcher);
        self
    }

    pub fn with_policy(mut self, policy: IntakePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_export_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.export_file_name = file_name.into();
        self
    }

    pub fn subscribe(&mut self, listener: impl Fn(&PipelineChange) + 'static) {
        self.notifier.subscribe(listener);
    }

    pub fn store(&self) -> &BoundedStore {
        &self.store
    }

    pub fn track(&mut self, name: &str, params: Map<String, serde_json::Value>) -> TrackOutcome {
        track_event(&mut self.store, self.bridge.as_ref(), name, params, Utc::now())
    }

    /// Page-load bookkeeping: capture attribution, then record the session.
    pub fn start_session(&mut self, page: &PageContext) -> AttributionRecord {
        capture_attribution(&mut self.store, page, Utc::now());
        let attribution = get_attribution(&self.store, page);
        let path = if page.path.is_empty() { "/" } else { page.path.as_str() };
        self.track(
            "session_start",
            crate::event_params!(
                "path" => path,
                "utm_source" => attribution.utm_source.as_str(),
                "utm_campaign" => attribution.utm_campaign.as_str(),
                "referrer" => attribution.referrer.as_str(),
            ),
        );
        attribution
    }

    pub fn attribution(&self, page: &PageContext) -> AttributionRecord {
        get_attribution(&self.store, page)
    }

    pub fn enrich(
        &self,
        session: &SessionContext,
        payload: &LeadPayload,
        channel: Channel,
    ) -> EnrichedLead {
        enrich_lead_payload(&self.store, session, payload, channel, Utc::now())
    }

    pub fn save(&mut self, lead: EnrichedLead) -> Lead {
        save_lead(&mut self.store, &self.notifier, lead, Utc::now())
    }

    /// Full form submission: guards, enrichment, dispatch, persistence and
    /// the funnel events around them. Persistence never waits on dispatch.
    pub fn submit(
        &mut self,
        session: &SessionContext,
        payload: &LeadPayload,
        channel: Channel,
    ) -> SubmitOutcome {
        if self.policy.is_honeypot_triggered(payload) {
            tracing::info!(%channel, "honeypot triggered, submission discarded");
            return SubmitOutcome::Discarded;
        }

        let now = Utc::now();
        let left = cooldown_left(&self.store, channel, self.policy.cooldown(channel), now);
        if !left.is_zero() {
            let retry_after_secs = retry_after_secs(left);
            tracing::info!(%channel, retry_after_secs, "submission inside cooldown");
            return SubmitOutcome::CoolingDown { retry_after_secs };
        }
        mark_cooldown(&mut self.store, channel, now);

        let prepared = self.policy.prepare_payload(payload, channel);
        let enriched = enrich_lead_payload(&self.store, session, &prepared, channel, now);
        self.track(&format!("{channel}_submit"), submit_params(&enriched));

        let dispatch = match channel {
            Channel::Analysis => DispatchStatus::NotApplicable,
            Channel::Contact | Channel::Booking => match self.dispatcher.dispatch(&enriched) {
                Ok(true) => DispatchStatus::Sent,
                Ok(false) => DispatchStatus::Pending,
                Err(err) => {
                    tracing::warn!(%channel, error = %err, "lead dispatch failed");
                    DispatchStatus::Failed(err.to_string())
                }
            },
        };

        let lead = save_lead(&mut self.store, &self.notifier, enriched, now);

        match &dispatch {
            DispatchStatus::Failed(reason) => {
                self.track(
                    &format!("{channel}_failed"),
                    crate::event_params!("reason" => reason.as_str()),
                );
            }
            _ => {
                self.track(
                    &format!("{channel}_success"),
                    crate::event_params!(
                        "score" => lead.ops.score,
                        "qualified" => lead.ops.score >= crate::decision::QUALIFIED_THRESHOLD,
                    ),
                );
            }
        }

        SubmitOutcome::Saved { lead, dispatch }
    }

    pub fn leads(&self) -> Vec<Lead> {
        load_leads(&self.store)
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        load_events(&self.store)
    }

    pub fn kpis(&self) -> PipelineKpis {
        report::compute_kpis(&self.leads())
    }

    pub fn recent(&self, limit: usize) -> Vec<Lead> {
        report::list_recent(&self.leads(), limit)
    }

    /// Write the CSV export into `dir`. `Ok(None)` when the ledger is empty.
    pub fn export_to(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        let leads = self.leads();
        let Some(csv) = report::export_csv(&leads)? else {
            tracing::info!("no leads to export");
            return Ok(None);
        };

        let path = dir.join(&self.export_file_name);
        std::fs::write(&path, csv)?;
        self.track("crm_export", crate::event_params!("count" => leads.len()));
        tracing::info!(path = %path.display(), count = leads.len(), "leads exported");
        Ok(Some(path))
    }

    pub fn reset(&mut self, confirmed: bool) -> ResetOutcome {
        report::reset_all(
            &mut self.store,
            self.bridge.as_ref(),
            &self.notifier,
            confirmed,
            Utc::now(),
        )
    }
}

/// `<channel>_submit` params: score and campaign, plus the answers each
/// form cares about.
fn submit_params(lead: &EnrichedLead) -> Map<String, serde_json::Value> {
    let field = |key: &str| lead.fields.get(key).map(String::as_str).unwrap_or("");
    let mut params = match lead.channel {
        Channel::Booking => crate::event_params!(
            "service" => field("service"),
            "budget_range" => field("budget_range"),
            "timeline_pref" => field("timeline_pref"),
        ),
        Channel::Analysis => crate::event_params!(
            "goal" => field("goal"),
            "budget" => field("budget"),
        ),
        Channel::Contact => Map::new(),
    };
    params.extend(crate::event_params!(
        "score" => lead.ops.score,
        "utm_source" => lead.attribution.utm_source.as_str(),
        "utm_campaign" => lead.attribution.utm_campaign.as_str(),
    ));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::dispatch_error;
    use crate::models::NextActionType;
    use crate::store::MemorySurface;
    use crate::telemetry::NoopBridge;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct BrokenMailer;

    impl LeadDispatcher for BrokenMailer {
        fn dispatch(&self, _lead: &EnrichedLead) -> Result<bool> {
            Err(dispatch_error("smtp timeout"))
        }
    }

    struct Mailer;

    impl LeadDispatcher for Mailer {
        fn dispatch(&self, _lead: &EnrichedLead) -> Result<bool> {
            Ok(true)
        }
    }

    fn payload(pairs: &[(&str, &str)]) -> LeadPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn event_names(pipeline: &Pipeline) -> Vec<String> {
        pipeline.events().into_iter().map(|e| e.event).collect()
    }

    #[test]
    fn booking_submit_saves_and_tracks_funnel() {
        let mut pipeline = Pipeline::new(BoundedStore::in_memory())
            .with_bridge(NoopBridge)
            .with_dispatcher(Mailer);
        let session = SessionContext::new(PageContext::from_url("/?utm_source=google"));
        pipeline.start_session(&session.page);

        let outcome = pipeline.submit(&session, &payload(&[("name", "Ada")]), Channel::Booking);
        let SubmitOutcome::Saved { lead, dispatch } = outcome else {
            panic!("expected saved lead");
        };
        assert_eq!(dispatch, DispatchStatus::Sent);
        assert_eq!(lead.ops.next_action_type, NextActionType::BookingConfirmation);
        assert_eq!(lead.attribution.utm_source, "google");
        assert_eq!(pipeline.leads(), vec![lead]);
        assert_eq!(
            event_names(&pipeline),
            vec!["session_start", "booking_submit", "booking_success"]
        );
    }

    #[test]
    fn submit_event_carries_form_answers_per_channel() {
        let mut pipeline = Pipeline::new(BoundedStore::in_memory())
            .with_bridge(NoopBridge)
            .with_policy(IntakePolicy {
                analysis_cooldown_ms: 0,
                booking_cooldown_ms: 0,
                ..IntakePolicy::default()
            });
        let session = SessionContext::default();

        pipeline.submit(
            &session,
            &payload(&[
                ("service", "Branding"),
                ("budget_range", "100000-300000"),
                ("timeline_pref", "0-30"),
            ]),
            Channel::Booking,
        );
        pipeline.submit(
            &session,
            &payload(&[("goal", "Yeni site"), ("budget", "85000")]),
            Channel::Analysis,
        );

        let events = pipeline.events();
        let booking = events.iter().find(|e| e.event == "booking_submit").unwrap();
        assert_eq!(booking.params["service"], "Branding");
        assert_eq!(booking.params["budget_range"], "100000-300000");
        assert_eq!(booking.params["timeline_pref"], "0-30");
        assert!(booking.params.contains_key("score"));

        let analysis = events.iter().find(|e| e.event == "analysis_submit").unwrap();
        assert_eq!(analysis.params["goal"], "Yeni site");
        assert_eq!(analysis.params["budget"], "85000");
        assert_eq!(analysis.params["utm_source"], "");
        assert!(!analysis.params.contains_key("budget_range"));
    }

    #[test]
    fn dispatch_failure_still_persists_lead() {
        let mut pipeline = Pipeline::new(BoundedStore::in_memory())
            .with_bridge(NoopBridge)
            .with_dispatcher(BrokenMailer);
        let session = SessionContext::default();

        let p = payload(&[("email", "a@b.co")]);
        let outcome = pipeline.submit(&session, &p, Channel::Contact);
        assert!(matches!(
            outcome,
            SubmitOutcome::Saved { dispatch: DispatchStatus::Failed(_), .. }
        ));
        assert_eq!(pipeline.leads().len(), 1);
        assert_eq!(event_names(&pipeline), vec!["contact_submit", "contact_failed"]);
    }

    #[test]
    fn second_submit_inside_cooldown_is_rejected() {
        let mut pipeline = Pipeline::new(BoundedStore::in_memory()).with_bridge(NoopBridge);
        let session = SessionContext::default();
        let p = payload(&[("goal", "SEO")]);

        assert!(matches!(
            pipeline.submit(&session, &p, Channel::Analysis),
            SubmitOutcome::Saved { dispatch: DispatchStatus::NotApplicable, .. }
        ));
        assert!(matches!(
            pipeline.submit(&session, &p, Channel::Analysis),
            SubmitOutcome::CoolingDown { retry_after_secs } if retry_after_secs > 0 && retry_after_secs <= 12
        ));
        assert_eq!(pipeline.leads().len(), 1);
    }

    #[test]
    fn honeypot_submit_keeps_nothing() {
        let mut pipeline = Pipeline::new(BoundedStore::in_memory()).with_bridge(NoopBridge);
        let outcome = pipeline.submit(
            &SessionContext::default(),
            &payload(&[("website", "spam.example")]),
            Channel::Contact,
        );
        assert_eq!(outcome, SubmitOutcome::Discarded);
        assert!(pipeline.leads().is_empty());
        assert!(pipeline.events().is_empty());
    }

    #[test]
    fn submit_works_with_storage_disabled() {
        let mut pipeline =
            Pipeline::new(BoundedStore::new(MemorySurface::unavailable())).with_bridge(NoopBridge);
        let outcome = pipeline.submit(
            &SessionContext::default(),
            &payload(&[("name", "Ada")]),
            Channel::Booking,
        );
        assert!(matches!(
            outcome,
            SubmitOutcome::Saved { dispatch: DispatchStatus::Pending, .. }
        ));
        assert!(pipeline.leads().is_empty());
    }

    #[test]
    fn listeners_see_saves_and_resets() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = Pipeline::new(BoundedStore::in_memory()).with_bridge(NoopBridge);
        let sink = Rc::clone(&seen);
        pipeline.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        let session = SessionContext::default();
        let enriched = pipeline.enrich(&session, &LeadPayload::new(), Channel::Contact);
        let lead = pipeline.save(enriched);
        pipeline.reset(true);

        assert_eq!(
            seen.borrow().as_slice(),
            &[PipelineChange::LeadSaved { id: lead.id }, PipelineChange::Reset]
        );
    }

    #[test]
    fn export_writes_file_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(BoundedStore::in_memory()).with_bridge(NoopBridge);
        assert!(pipeline.export_to(dir.path()).unwrap().is_none());
        assert!(pipeline.events().is_empty());

        let session = SessionContext::default();
        let enriched = pipeline.enrich(&session, &LeadPayload::new(), Channel::Contact);
        pipeline.save(enriched);
        let path = pipeline.export_to(dir.path()).unwrap().unwrap();
        assert!(path.ends_with("crm-leads.csv"));
        assert_eq!(event_names(&pipeline), vec!["crm_export"]);
    }
}
