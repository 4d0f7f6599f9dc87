use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rustbfcache::{
    BackForwardCache, BodyConsumer, CacheConfig, CookieChangeKind, DisabledReason, Feature,
    HistoryNavigation, NavigateAway, NavigationCounters, Origin, PageSnapshot, RecordingObserver,
    RecordingRenderer, RequestDescriptor, RequestId, ServiceWorkerEvent, TracingObserver,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bfcache-sim")]
#[command(about = "Replay navigation scenarios against the back/forward cache")]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario file and print one JSON line per step
    Run { scenario: PathBuf },
    /// Print the effective configuration
    Config,
    /// List every not-restored reason name
    Reasons,
}

#[derive(Deserialize)]
struct Scenario {
    pages: HashMap<String, PageSnapshot>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    NavigateAway {
        page: String,
        #[serde(default)]
        replace: bool,
    },
    HistoryNavigate {
        page: String,
        #[serde(default = "default_history_length")]
        history_length: u32,
        #[serde(default)]
        history_index: u32,
    },
    FeatureStarted { page: String, feature: Feature },
    FeatureStopped { page: String, feature: Feature },
    Disable { page: String, reason: DisabledReason },
    CookieChanged { url: String, kind: CookieChangeKind },
    ExecuteJavascript { page: String },
    ServiceWorker { page: String, event: ServiceWorkerEvent },
    Request {
        page: String,
        name: String,
        #[serde(default = "default_consumer")]
        consumer: BodyConsumer,
    },
    Body { request: String, bytes: u64 },
    Redirect { request: String },
    Complete { request: String },
    ProcessGone { page: String },
    Advance { ms: u64 },
}

fn default_history_length() -> u32 {
    2
}

fn default_consumer() -> BodyConsumer {
    BodyConsumer::Resource
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CacheConfig::default(),
    };

    match cli.command {
        Command::Run { scenario } => run_scenario(config, &scenario).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Reasons => {
            for reason in rustbfcache::NotRestoredReason::ALL {
                println!("{:<55} {:?}", reason.as_str(), reason.category());
            }
            Ok(())
        }
    }
}

async fn run_scenario(config: CacheConfig, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).context("invalid scenario")?;

    let renderer = Arc::new(RecordingRenderer::new());
    let recorder = Arc::new(RecordingObserver::new());
    let cache = BackForwardCache::with_observers(
        config,
        renderer.clone(),
        vec![recorder.clone(), Arc::new(TracingObserver)],
    )?;

    let pages = scenario.pages;
    let mut requests: HashMap<String, RequestId> = HashMap::new();

    for (index, step) in scenario.steps.into_iter().enumerate() {
        let result = match step {
            Step::NavigateAway { page, replace } => {
                let snapshot = lookup(&pages, &page)?.clone();
                let request = if replace {
                    NavigateAway::replace(snapshot)
                } else {
                    NavigateAway::new(snapshot)
                };
                let outcome = cache.navigate_away(request).await?;
                json!({ "stored": outcome.is_stored(), "reasons": outcome.reasons() })
            }
            Step::HistoryNavigate {
                page,
                history_length,
                history_index,
            } => {
                let snapshot = lookup(&pages, &page)?;
                let navigation = HistoryNavigation::new(
                    snapshot.identity(),
                    NavigationCounters::now(history_length, history_index),
                );
                let outcome = cache.history_navigate(navigation).await?;
                json!({
                    "restored": outcome.is_restored(),
                    "reasons": outcome.reasons(),
                    "page_visible": outcome.tree().map(|t| t.to_page_visible()),
                })
            }
            Step::FeatureStarted { page, feature } => {
                cache.feature_started(lookup(&pages, &page)?.root.id, feature).await?;
                json!({ "ok": true })
            }
            Step::FeatureStopped { page, feature } => {
                cache.feature_stopped(lookup(&pages, &page)?.root.id, feature).await?;
                json!({ "ok": true })
            }
            Step::Disable { page, reason } => {
                cache.disable_for_frame(lookup(&pages, &page)?.root.id, reason).await?;
                json!({ "ok": true })
            }
            Step::CookieChanged { url, kind } => {
                cache.cookie_changed(&Origin::from_url(&url), kind).await?;
                json!({ "ok": true })
            }
            Step::ExecuteJavascript { page } => {
                let disposition = cache.execute_javascript(lookup(&pages, &page)?.page).await?;
                json!({ "disposition": format!("{:?}", disposition) })
            }
            Step::ServiceWorker { page, event } => {
                let evicted = cache.service_worker_event(lookup(&pages, &page)?.page, event).await?;
                json!({ "evicted": evicted })
            }
            Step::Request {
                page,
                name,
                consumer,
            } => {
                let snapshot = lookup(&pages, &page)?;
                let request = RequestDescriptor::new(
                    snapshot.page,
                    snapshot.root.id,
                    snapshot.process(),
                    format!("{}#{}", snapshot.url(), name),
                )
                .consumed_by(consumer);
                requests.insert(name, request.id);
                cache.request_started(request).await?;
                json!({ "ok": true })
            }
            Step::Body { request, bytes } => {
                cache.body_received(request_id(&requests, &request)?, bytes).await?;
                json!({ "ok": true })
            }
            Step::Redirect { request } => {
                let decision = cache.redirect_received(request_id(&requests, &request)?).await?;
                json!({ "decision": format!("{:?}", decision) })
            }
            Step::Complete { request } => {
                cache.request_completed(request_id(&requests, &request)?).await?;
                json!({ "ok": true })
            }
            Step::ProcessGone { page } => {
                let evicted = cache.renderer_process_gone(lookup(&pages, &page)?.process()).await?;
                json!({ "evicted": evicted })
            }
            Step::Advance { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                json!({ "ok": true })
            }
        };
        println!("{}", json!({ "step": index, "result": result }));
    }

    println!(
        "{}",
        json!({
            "stored": cache.stored_pages().await,
            "stats": cache.stats(),
            "outcomes": recorder.records(),
        })
    );
    Ok(())
}

fn lookup<'a>(pages: &'a HashMap<String, PageSnapshot>, name: &str) -> Result<&'a PageSnapshot> {
    pages
        .get(name)
        .ok_or_else(|| anyhow!("scenario has no page named '{}'", name))
}

fn request_id(requests: &HashMap<String, RequestId>, name: &str) -> Result<RequestId> {
    requests
        .get(name)
        .copied()
        .ok_or_else(|| anyhow!("request '{}' was never started", name))
}
