use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use lead_pipeline::decision::compute_lead_ops;
use lead_pipeline::intake::{DispatchStatus, SubmitOutcome};
use lead_pipeline::models::format_timestamp;
use lead_pipeline::report::{self, ResetOutcome, DEFAULT_RECENT_LIMIT};
use lead_pipeline::{logging, Channel, Config, Lang, LeadPayload, PageContext, Pipeline, SessionContext};

#[derive(Parser)]
#[command(name = "lead-pipeline")]
#[command(about = "Lead scoring, attribution and pipeline reporting for a studio site", long_about = None)]
struct Cli {
    /// Config file (defaults to the XDG config location)
    #[arg(long, global = true, env = "LEAD_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the persisted store
    #[arg(long, global = true, env = "LEAD_PIPELINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PageArgs {
    /// Page URL or path including its query string
    #[arg(long, default_value = "/")]
    url: String,
    #[arg(long, default_value = "")]
    referrer: String,
    #[arg(long, default_value = "")]
    locale: String,
    #[arg(long, default_value = "")]
    timezone: String,
    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,
}

impl PageArgs {
    fn page(&self) -> PageContext {
        PageContext::from_url(&self.url)
            .with_referrer(self.referrer.clone())
            .with_locale(self.locale.clone())
            .with_timezone(self.timezone.clone())
            .with_viewport_width(self.viewport_width)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a page load: capture attribution and track session_start
    Session {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show the visitor's attribution as seen from a page
    Attribution {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Score a payload without saving it
    Score {
        #[arg(long = "type", default_value = "contact")]
        channel: Channel,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Submit a lead form
    Submit {
        #[arg(long = "type", default_value = "contact")]
        channel: Channel,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Print pipeline KPIs
    Kpis,
    /// List the most recent leads
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        #[arg(long, default_value = "tr")]
        lang: Lang,
    },
    /// Write a markdown pipeline report
    Report {
        #[arg(long, default_value = "pipeline.md")]
        out: PathBuf,
        #[arg(long, default_value = "tr")]
        lang: Lang,
    },
    /// Export every lead as CSV
    Export {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Show recent funnel events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Clear leads, events and attribution
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "e" | "evet"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(&config.logging);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir());
    let mut pipeline = Pipeline::open(&config, &data_dir);
    let brand = config.brand.name.clone();

    match cli.command {
        Commands::Session { page } => {
            let attribution = pipeline.start_session(&page.page());
            println!(
                "Session recorded (source: {}, campaign: {}).",
                empty_dash(&attribution.utm_source),
                empty_dash(&attribution.utm_campaign)
            );
        }
        Commands::Attribution { page } => {
            let attribution = pipeline.attribution(&page.page());
            println!("{}", serde_json::to_string_pretty(&attribution)?);
        }
        Commands::Score { channel, fields } => {
            let payload: LeadPayload = fields.into_iter().collect();
            let ops = compute_lead_ops(&payload, channel, brand.as_deref(), Utc::now());
            println!(
                "score {} | stage {} | priority {} | next {} at {} | owner {}",
                ops.score,
                ops.stage.as_str(),
                ops.priority.as_str(),
                ops.next_action_type.as_str(),
                format_timestamp(ops.next_action_at),
                ops.owner
            );
        }
        Commands::Submit {
            channel,
            fields,
            page,
        } => {
            let payload: LeadPayload = fields.into_iter().collect();
            let mut session = SessionContext::new(page.page());
            session.brand_name = brand;

            match pipeline.submit(&session, &payload, channel) {
                SubmitOutcome::Saved { lead, dispatch } => {
                    println!(
                        "Saved {} ({}) score {} stage {}.",
                        lead.id,
                        lead.channel,
                        lead.ops.score,
                        lead.ops.stage.as_str()
                    );
                    match dispatch {
                        DispatchStatus::Sent => println!("Notification sent."),
                        DispatchStatus::Pending => {
                            println!("No notification transport configured; lead kept locally.")
                        }
                        DispatchStatus::Failed(reason) => {
                            println!("Notification failed ({reason}); lead kept locally.")
                        }
                        DispatchStatus::NotApplicable => {}
                    }
                }
                SubmitOutcome::CoolingDown { retry_after_secs } => {
                    println!("Please wait {retry_after_secs}s before submitting again.");
                }
                SubmitOutcome::Discarded => println!("Submission received."),
            }
        }
        Commands::Kpis => {
            let kpis = pipeline.kpis();
            println!("Leads: {}", kpis.lead_count);
            println!("Qualified: {}", kpis.qualified_count);
            println!("Bookings: {}", kpis.booking_count);
            println!(
                "Qualification rate: {}",
                report::rate_label(kpis.qualification_rate, Lang::En)
            );
        }
        Commands::Recent { limit, lang } => {
            print!("{}", report::render_recent_table(&pipeline.leads(), lang, limit));
        }
        Commands::Report { out, lang } => {
            let output = report::build_report(&pipeline.leads(), lang);
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out_dir } => match pipeline.export_to(&out_dir)? {
            Some(path) => println!("Exported leads to {}.", path.display()),
            None => println!("No leads to export."),
        },
        Commands::Events { limit } => {
            let events = pipeline.events();
            if events.is_empty() {
                println!("No events recorded.");
                return Ok(());
            }
            for event in events.iter().rev().take(limit) {
                println!(
                    "{} {} {}",
                    format_timestamp(event.ts),
                    event.event,
                    serde_json::Value::Object(event.params.clone())
                );
            }
        }
        Commands::Reset { yes } => {
            let confirmed = yes || confirm("Clear all panel data?")?;
            match pipeline.reset(confirmed) {
                ResetOutcome::Cleared { storage_ok: true } => println!("Pipeline data cleared."),
                ResetOutcome::Cleared { storage_ok: false } => {
                    println!("Pipeline reset attempted; some data could not be cleared.")
                }
                ResetOutcome::Declined => println!("Nothing cleared."),
            }
        }
    }

    Ok(())
}

fn empty_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
