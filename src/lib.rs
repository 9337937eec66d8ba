//! # lead-pipeline
//!
//! Turns raw lead-form submissions into scored, prioritized leads kept in a
//! capacity-bounded local store, alongside visitor attribution and funnel
//! telemetry, with KPI, recent-lead and CSV views over the ledger.
//!
//! ```rust,no_run
//! use lead_pipeline::{BoundedStore, Channel, LeadPayload, PageContext, Pipeline, SessionContext};
//!
//! let mut pipeline = Pipeline::new(BoundedStore::in_memory());
//! let session = SessionContext::new(PageContext::from_url("/?utm_source=google"));
//! pipeline.start_session(&session.page);
//!
//! let mut payload = LeadPayload::new();
//! payload.insert("name".into(), "Ada".into());
//! pipeline.submit(&session, &payload, Channel::Booking);
//! println!("{:?}", pipeline.kpis());
//! ```

pub use config::Config;
pub use context::{Lang, PageContext, SessionContext};
pub use error::{Error, Result, StoreError};
pub use models::*;
pub use pipeline::Pipeline;
pub use store::{BoundedStore, FileSurface, KeyValueSurface, MemorySurface};

pub mod attribution;
pub mod config;
pub mod context;
pub mod decision;
pub mod enrich;
pub mod error;
pub mod fold;
pub mod intake;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod store;
pub mod telemetry;
