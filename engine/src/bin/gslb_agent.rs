//! GSLB Agent - Standalone Binary
//!
//! Reconciles geo and weighted DNS record sets from a state file, probing
//! every gateway address and pruning the ones that keep failing.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gslb_engine::health::{
    HttpHealthChecker, Monitor, ProbeReconciler, ProbeStatusStore, RequestQueue, StatusNotifier,
};
use gslb_engine::{GslbAgent, RecordAction, StateFile};

/// Minimum time between reconcile passes
const MIN_RECONCILE_INTERVAL: u64 = 5;

/// GSLB Agent - geo and weighted DNS with health-driven pruning
#[derive(Parser, Debug)]
#[command(name = "gslb-agent", version, about)]
struct Args {
    /// JSON state file with managed zones, policies and gateways
    #[arg(long, env = "GSLB_STATE_FILE")]
    state_file: PathBuf,

    /// Minimum gap between health checks leaving the queue, in milliseconds
    #[arg(long, default_value = "1000", env = "GSLB_THROTTLE_MS")]
    throttle_ms: u64,

    /// Per-check HTTP timeout in seconds
    #[arg(long, default_value = "5", env = "GSLB_CHECK_TIMEOUT_SECS")]
    check_timeout: u64,

    /// Reconcile interval in seconds
    #[arg(long, default_value = "60", env = "GSLB_RECONCILE_INTERVAL")]
    interval: u64,

    /// Run one reconcile pass and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Log what would be written without writing it
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Write record sets here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    info!(
        state_file = %args.state_file.display(),
        interval = args.interval,
        throttle_ms = args.throttle_ms,
        "Starting GSLB Agent"
    );

    let store = Arc::new(ProbeStatusStore::new());

    // A single pass has no running queue or monitor, so it manages no probes
    if args.once {
        let mut agent = GslbAgent::new(store);
        return run_reconcile(&mut agent, &args);
    }

    let checker = HttpHealthChecker::new(Duration::from_secs(args.check_timeout))
        .context("Failed to create health checker")?;
    let queue = Arc::new(RequestQueue::new(
        "health-checks",
        Duration::from_millis(args.throttle_ms),
        Arc::new(checker),
    ));
    let monitor = Arc::new(Monitor::new());
    let notifier = Arc::new(StatusNotifier::new(Arc::clone(&store)));

    let reconciler = ProbeReconciler::new(
        Arc::clone(&monitor),
        Arc::clone(&store),
        Arc::clone(&queue),
        notifier,
    );
    let mut agent = GslbAgent::new(store).with_probe_reconciler(reconciler);

    let cancel = CancellationToken::new();
    let queue_task = tokio::spawn(Arc::clone(&queue).run(cancel.clone()));
    let monitor_task = {
        let monitor = Arc::clone(&monitor);
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    let mut ticker = interval(Duration::from_secs(args.interval.max(MIN_RECONCILE_INTERVAL)));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_reconcile(&mut agent, &args) {
                    error!(error = %e, "Reconcile cycle failed");
                }
            }
        }
    }

    cancel.cancel();
    if let Err(e) = queue_task.await {
        warn!(error = %e, "Request queue exited abnormally");
    }
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "Probe monitor exited abnormally");
    }

    Ok(())
}

/// Run a single reconcile cycle
fn run_reconcile(agent: &mut GslbAgent, args: &Args) -> Result<()> {
    info!("Starting reconcile cycle");

    let state = StateFile::load(&args.state_file)?;
    let results = agent.reconcile(&state);

    let mut created = 0;
    let mut updated = 0;
    let mut unchanged = 0;
    let mut deleted = 0;
    let mut errors = 0;

    for result in &results {
        match result.action {
            RecordAction::Created => created += 1,
            RecordAction::Updated => updated += 1,
            RecordAction::Unchanged => unchanged += 1,
            RecordAction::Deleted => deleted += 1,
            RecordAction::Error => {
                errors += 1;
                error!(
                    record = %result.record_name,
                    error = ?result.error,
                    "Failed to reconcile DNS records"
                );
            }
        }
    }

    info!(
        created = created,
        updated = updated,
        unchanged = unchanged,
        deleted = deleted,
        errors = errors,
        "Reconcile cycle complete"
    );

    if created + updated + deleted == 0 {
        return Ok(());
    }

    let rendered = serde_json::to_string_pretty(agent.records())
        .context("Failed to serialize record sets")?;

    if args.dry_run {
        info!("DRY RUN - would write {} record sets", agent.records().len());
        return Ok(());
    }

    write_records(args.output.as_deref(), &rendered)
}

fn write_records(output: Option<&Path>, rendered: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write record sets to {}", path.display())),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}
