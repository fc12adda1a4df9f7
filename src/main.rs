//! funnelgate - main entry point
//!
//! Runs the ingress and registers funnels declared on the command line. The
//! public tunnels themselves are established by an external provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use funnelgate::router::PROGRAM_NAME;
use funnelgate::{
    spawn_dispatcher, EventObserver, FunnelDescriptor, FunnelDirectory, IngressConfig,
    IngressServer, NotificationSink, ProxyEvent, MOUNT_PREFIX,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// funnelgate - expose local HTTP services behind one ingress port
#[derive(Parser, Debug)]
#[command(name = "funnelgate")]
#[command(version)]
#[command(about = "Multiplex funnels behind one ingress port and capture their traffic")]
struct Args {
    /// Host the ingress binds to
    #[arg(long, env = "FUNNELGATE_HTTP_HOST", default_value = "localhost")]
    host: String,

    /// Ingress port
    #[arg(long, env = "FUNNELGATE_HTTP_PORT", default_value = "4141")]
    port: u16,

    /// Exchanges kept per funnel
    #[arg(long, env = "FUNNELGATE_CAPTURE_LIMIT", default_value = "100")]
    capture_limit: usize,

    /// Truncate captured bodies to this many bytes (forwarded bodies are untouched)
    #[arg(long, env = "FUNNELGATE_CAPTURE_BODY_LIMIT")]
    capture_body_limit: Option<usize>,

    /// Register a funnel: ID=LOCAL_URL or ID=LOCAL_URL@PUBLIC_URL (repeatable)
    #[arg(long = "funnel", value_parser = parse_funnel)]
    funnels: Vec<FunnelDescriptor>,

    /// Log level or filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "FUNNELGATE_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn parse_funnel(value: &str) -> std::result::Result<FunnelDescriptor, String> {
    let (id, targets) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=LOCAL_URL[@PUBLIC_URL], got {:?}", value))?;
    if id.is_empty() {
        return Err("funnel id must not be empty".to_string());
    }
    let (local, public) = split_public_target(targets);
    Ok(FunnelDescriptor::new(id, local, public))
}

/// Split `LOCAL_URL@PUBLIC_URL`, leaving userinfo in the local URL alone
fn split_public_target(targets: &str) -> (&str, &str) {
    match targets.rsplit_once('@') {
        Some((local, public)) if !local.is_empty() && is_web_url(public) => (local, public),
        _ => (targets, ""),
    }
}

fn is_web_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Logs a summary line per notification
///
/// Events only carry the funnel id, so the line describes the funnel's newest
/// record at dispatch time. Under concurrent traffic one record can be logged
/// twice while another is skipped; the record id tells them apart.
struct LogObserver {
    directory: Arc<FunnelDirectory>,
}

#[async_trait]
impl EventObserver for LogObserver {
    async fn on_event(&self, event: ProxyEvent) {
        let Ok(funnel) = self.directory.get(&event.funnel_id) else {
            return;
        };
        let Some(record) = funnel.captures.head() else {
            return;
        };

        info!(
            "[{}] {} {} {} -> {} ({})",
            funnel.descriptor.name(),
            record.id,
            record.method(),
            record.path(),
            record.status(),
            record.rounded_duration()
        );
        match serde_json::to_string(&record) {
            Ok(json) => debug!("{}", json),
            Err(e) => warn!("Could not serialize capture {}: {}", record.id, e),
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    match &args.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting {} v{}", PROGRAM_NAME, env!("CARGO_PKG_VERSION"));

    let config = IngressConfig {
        host: args.host.clone(),
        port: args.port,
        capture_limit: args.capture_limit,
        capture_body_limit: args.capture_body_limit,
        ..IngressConfig::default()
    };

    let directory = Arc::new(FunnelDirectory::with_capture_limit(config.capture_limit));
    let (sink, events) = NotificationSink::new(config.event_buffer);
    let _dispatcher = spawn_dispatcher(
        events,
        Arc::new(LogObserver {
            directory: directory.clone(),
        }),
    );

    let server = Arc::new(IngressServer::new(config.clone(), directory.clone(), sink));
    let _ingress = server.start().context("cannot start ingress")?;

    for descriptor in args.funnels {
        info!(
            "Funnel {} -> {} at http://{}{}{}/",
            descriptor.id(),
            descriptor.local_target(),
            config.bind_addr(),
            MOUNT_PREFIX,
            descriptor.id()
        );
        directory.add(descriptor);
    }

    tokio::signal::ctrl_c().await?;

    let closed = directory.clear();
    match closed.len() {
        0 => {}
        1 => info!("Closing tunnel"),
        n => info!("Closing {} tunnels", n),
    }

    Ok(())
}
