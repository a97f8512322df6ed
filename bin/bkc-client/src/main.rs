//! BKC Client
//!
//! Command-line host for the BKC core: builds the routed client from
//! configuration, loads the initial view, runs the tap safety net and,
//! optionally, drives a burst of taps through the aggregator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bkc_api::BkcClient;
use bkc_common::{Category, FeedbackHub, Identity, IdentityHint, Severity, View};
use bkc_config::{ClientConfig, ExplicitOverrides};
use bkc_router::{AffinityStore, FileAffinityStore, SessionAffinityStore};
use bkc_tap::{SyncLifecycle, TapOutcome};

/// BKC command-line client
#[derive(Parser, Debug)]
#[command(name = "bkc-client")]
#[command(about = "BKC client - multi-pool API routing and batched tapping")]
struct Args {
    /// TOML file with injected node defaults and tuning
    #[arg(long, env = "BKC_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Single API endpoint; replaces every other general node source
    #[arg(long, env = "BKC_API")]
    api: Option<String>,

    /// Comma-separated general nodes
    #[arg(long, env = "BKC_NODES")]
    nodes: Option<String>,

    #[arg(long, env = "BKC_NODES_FULL")]
    nodes_full: Option<String>,

    #[arg(long, env = "BKC_NODES_TAP")]
    nodes_tap: Option<String>,

    #[arg(long, env = "BKC_NODES_MARKET")]
    nodes_market: Option<String>,

    #[arg(long, env = "BKC_NODES_BANK")]
    nodes_bank: Option<String>,

    #[arg(long, env = "BKC_NODES_ADMIN")]
    nodes_admin: Option<String>,

    /// Origin the client is served from (same-origin fallback)
    #[arg(long, env = "BKC_ORIGIN")]
    origin: Option<String>,

    /// Tap safety-net interval in milliseconds, clamped to [200, 10000]
    #[arg(long, env = "BKC_TAP_SYNC_MS")]
    tap_sync_ms: Option<String>,

    /// Initial view: tap, wallet, market, deposit, chain
    #[arg(long, env = "BKC_TAB")]
    tab: Option<String>,

    /// Opaque identity token sent with every mutating call
    #[arg(long, env = "BKC_INIT_DATA", default_value = "", hide_env_values = true)]
    init_data: String,

    /// Host user id; spreads sticky node selection deterministically
    #[arg(long, env = "BKC_USER_ID")]
    user_id: Option<i64>,

    /// Persist node affinity to this file so it survives restarts
    #[arg(long, env = "BKC_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Session the affinity file belongs to (random when omitted)
    #[arg(long, env = "BKC_SESSION_ID")]
    session_id: Option<String>,

    /// Number of taps to drive through the aggregator after startup
    #[arg(long, env = "BKC_DEMO_TAPS", default_value = "0")]
    taps: u64,

    /// Delay between driven taps in milliseconds
    #[arg(long, env = "BKC_DEMO_TAP_DELAY_MS", default_value = "5")]
    tap_delay_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "BKC_LOG_JSON", default_value = "false")]
    log_json: bool,
}

impl Args {
    fn overrides(&self) -> ExplicitOverrides {
        let per_category: BTreeMap<Category, String> = [
            (Category::General, &self.nodes_full),
            (Category::HighFrequency, &self.nodes_tap),
            (Category::Marketplace, &self.nodes_market),
            (Category::Ledger, &self.nodes_bank),
            (Category::Administrative, &self.nodes_admin),
        ]
        .into_iter()
        .filter_map(|(category, raw)| raw.clone().map(|raw| (category, raw)))
        .collect();

        ExplicitOverrides {
            api: self.api.clone(),
            nodes: self.nodes.clone(),
            per_category,
            origin: self.origin.clone(),
            tap_sync_ms: self.tap_sync_ms.clone(),
            tab: self.tab.clone(),
        }
    }

    fn affinity_store(&self) -> Arc<dyn AffinityStore> {
        match &self.session_file {
            Some(path) => {
                let session_id = self
                    .session_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                info!(path = %path.display(), session_id = %session_id, "Using file-backed session affinity");
                Arc::new(FileAffinityStore::open(path, session_id))
            }
            None => Arc::new(SessionAffinityStore::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting BKC client");

    // 1. Configuration
    let config = ClientConfig::load(args.config.as_deref(), args.overrides())
        .context("Failed to load client configuration")?;

    // 2. Identity and session affinity
    let identity = Identity::new(
        args.init_data.clone(),
        args.user_id.and_then(IdentityHint::from_user_id),
    );
    if identity.init_data.is_empty() {
        warn!("No identity token configured; mutating calls will be rejected");
    }
    let store = args.affinity_store();

    // 3. Client and tap engine
    let client = BkcClient::from_config(&config, store, identity)
        .context("Failed to build BKC client")?;
    spawn_feedback_logger(client.feedback());

    // 4. Initial view
    load_view(&client, config.initial_view).await;

    // 5. Tap safety net
    let taps = client.taps().clone();
    taps.set_engine_enabled(true);
    let lifecycle = SyncLifecycle::start(taps.clone());

    if args.taps > 0 {
        let delay = Duration::from_millis(args.tap_delay_ms);
        let burst = args.taps;
        let taps = taps.clone();
        tokio::spawn(async move {
            let mut accepted = 0u64;
            for _ in 0..burst {
                match taps.tap() {
                    TapOutcome::Accepted { .. } => accepted += 1,
                    TapOutcome::Rejected(reason) => {
                        info!(reason = ?reason, accepted, "Tap burst stopped");
                        break;
                    }
                }
                tokio::time::sleep(delay).await;
            }
            info!(accepted, requested = burst, "Tap burst finished");
        });
    }

    info!("BKC client running. Press Ctrl+C to exit.");
    shutdown_signal().await;
    info!("Shutdown signal received");

    let outcome = lifecycle.shutdown().await;
    let counters = taps.counters();
    info!(
        final_flush = ?outcome,
        energy = counters.energy,
        session_taps = counters.session_taps,
        last_node = ?client.executor().last_address(),
        "BKC client shutdown complete"
    );

    Ok(())
}

/// Load the account and whatever the initial view shows. Failures are
/// reported through the feedback hub and do not stop the client.
async fn load_view(client: &BkcClient, view: View) {
    info!(view = ?view, "Loading initial view");

    if let Ok(health) = client.health().await {
        info!(service = %health.service, db_ok = health.db_ok, "Backend reachable");
    }

    match client.load_state().await {
        Ok(state) => info!(
            user_id = state.user_id,
            balance = state.balance,
            energy = state.energy,
            energy_max = state.energy_max,
            "Account loaded"
        ),
        Err(e) => warn!(error = %e, "Account state unavailable"),
    }

    match view {
        View::Tap | View::Deposit => {}
        View::Wallet => {
            if let Ok(loans) = client.my_loans(20).await {
                info!(loans = loans.items.len(), "Loans loaded");
            }
        }
        View::Market => {
            if let Ok(nfts) = client.list_nfts().await {
                info!(nfts = nfts.items.len(), "NFT catalogue loaded");
            }
            if let Ok(listings) = client.list_listings("active", 50).await {
                info!(listings = listings.items.len(), "Listings loaded");
            }
        }
        View::Chain => {
            if let Ok(chain) = client.blockchain().await {
                info!(chain = %chain, "Chain stats loaded");
            }
        }
    }
}

fn spawn_feedback_logger(feedback: &FeedbackHub) {
    let mut notifications = feedback.subscribe_notifications();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => match notification.severity {
                    Severity::Good | Severity::Info => info!(message = %notification.message, "Notification"),
                    Severity::Bad => error!(message = %notification.message, "Notification"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
