mod config;
mod fields;
mod forms;
mod graph;
mod mail;
mod parsing;
mod pdf_fill;
mod pipeline;
mod poller;
mod sheet;
mod smartsheet;
mod store;

use config::Config;
use graph::{FormSource, GraphClient};
use mail::SmtpMailer;
use parsing::BodyType;
use pdf_fill::AcroFormFiller;
use poller::{PollSettings, Poller};
use smartsheet::SmartsheetClient;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use store::TicketStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CONFIG_ENV: &str = "PURPLEDOC_CONFIG";
const DEFAULT_CONFIG: &str = ".config/purpledoc.toml";

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("parse") => parse_file(&args[1..]),
        Some("once") => {
            let mut poller = build_poller(args.get(1))?;
            let summary = poller.run_cycle().await;
            info!(?summary, "Single cycle finished");
            log_counts(poller.store())
        }
        Some("run") | None => {
            build_poller(args.get(1))?.run().await;
            Ok(())
        }
        Some(other) => Err(format!("unknown command '{other}' (expected run, once or parse)").into()),
    }
}

/// `parse <file> [html]`: print what the parser makes of a saved message body.
fn parse_file(args: &[String]) -> Result<(), BoxError> {
    let Some(path) = args.first() else {
        return Err("usage: purpledoc parse <file> [html]".into());
    };
    let body_type = match args.get(1).map(String::as_str) {
        Some("html") => BodyType::Html,
        _ => BodyType::Text,
    };

    let raw = fs::read_to_string(path)?;
    let cleaned = parsing::clean_body(&raw, body_type);
    let parsed = parsing::parse_ticket(&cleaned, "Unknown");
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn config_path(arg: Option<&String>) -> PathBuf {
    arg.cloned()
        .or_else(|| env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
        .into()
}

fn build_poller(arg: Option<&String>) -> Result<Poller, BoxError> {
    let path = config_path(arg);
    let cfg = Config::load(&path)?;
    info!(config = %path.display(), "Configuration loaded");

    if let Some(parent) = PathBuf::from(&cfg.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let store = TicketStore::new(&cfg.db_path)?;

    let forms = cfg.forms.as_ref().map(|f| {
        info!(file = %f.filename, worksheet = %f.worksheet, "Online form processing enabled");
        Box::new(GraphClient::new(&cfg.graph, Some(f))) as Box<dyn FormSource>
    });

    let settings = PollSettings {
        template: PathBuf::from(&cfg.pdf_template),
        output_dir: PathBuf::from(&cfg.output_dir),
        default_tech: cfg.default_tech_name.clone(),
        interval: Duration::from_secs(cfg.poll_interval_secs),
    };

    Ok(Poller::new(
        Box::new(GraphClient::new(&cfg.graph, None)),
        Box::new(SmartsheetClient::new(&cfg.smartsheet)),
        forms,
        Box::new(SmtpMailer::new(&cfg.smtp)?),
        Box::new(AcroFormFiller),
        store,
        settings,
    ))
}

fn log_counts(store: &TicketStore) -> Result<(), BoxError> {
    let (cached_rows, messages, form_rows) = store.get_counts()?;
    info!(
        cached_rows,
        messages_processed = messages,
        form_rows_processed = form_rows,
        "Database statistics"
    );
    Ok(())
}
