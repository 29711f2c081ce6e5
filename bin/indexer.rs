//! # DAO Activity Indexer
//!
//! Long-running service that ingests DAO activity from every configured
//! source into Postgres:
//!
//! - One WebSocket listener per governor, staking contract and AMM pair
//! - A poll scheduler over the HTTP sources (Snapshot, Tally, Safe, agents)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin indexer
//! ```
//!
//! Press Ctrl+C to stop gracefully.

use anyhow::{Context, Result};
use dao_pulse_sdk::{
    chain_listener::{ChainListener, TargetKind},
    database,
    retry::RetryPolicy,
    scheduler::PollScheduler,
    settings::{ContractTarget, Settings},
    sources::{
        agents::AgentInfoDriver, safe::SafeDriver, snapshot::SnapshotDriver, tally::TallyDriver,
        SourceDriver,
    },
};
use ethers::types::Address;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

fn spawn_listeners(
    targets: &[ContractTarget],
    kind: TargetKind,
    ws_url: &str,
    db: &database::DbPool,
    shutdown: &watch::Receiver<bool>,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<()> {
    for target in targets {
        let address = Address::from_str(&target.address)
            .with_context(|| format!("invalid contract address: {}", target.address))?;
        let listener = ChainListener::new(
            ws_url.to_string(),
            address,
            target.name.clone(),
            kind,
            db.clone(),
        );
        handles.push(tokio::spawn(listener.run(shutdown.clone())));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    println!("🚀 Starting DAO Activity Indexer");
    println!("═══════════════════════════════════════════════════════════════════\n");

    let settings = Settings::new().context("failed to load Config.toml")?;
    println!("✅ Settings loaded");

    // connect() also runs the schema initialization.
    let db = database::connect().await?;
    println!("✅ Database connected and initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    spawn_listeners(
        &settings.targets.governors,
        TargetKind::Governor,
        &settings.rpc.ws_url,
        &db,
        &shutdown_rx,
        &mut handles,
    )?;
    spawn_listeners(
        &settings.targets.staking_contracts,
        TargetKind::Staking,
        &settings.rpc.ws_url,
        &db,
        &shutdown_rx,
        &mut handles,
    )?;
    spawn_listeners(
        &settings.targets.lp_pairs,
        TargetKind::Pair,
        &settings.rpc.ws_url,
        &db,
        &shutdown_rx,
        &mut handles,
    )?;
    println!(
        "✅ Chain listeners spawned ({} governors, {} staking, {} pairs)",
        settings.targets.governors.len(),
        settings.targets.staking_contracts.len(),
        settings.targets.lp_pairs.len()
    );

    let http_timeout = Duration::from_secs(settings.poll.http_timeout_seconds);
    let mut drivers: Vec<Arc<dyn SourceDriver>> = Vec::new();
    if !settings.sources.snapshot_spaces.is_empty() {
        drivers.push(Arc::new(SnapshotDriver::new(
            settings.sources.snapshot_spaces.clone(),
            http_timeout,
        )?));
    }
    if !settings.sources.tally_orgs.is_empty() {
        let api_key = env::var("TALLY_API_KEY").ok().filter(|k| !k.trim().is_empty());
        drivers.push(Arc::new(TallyDriver::new(
            settings.sources.tally_orgs.clone(),
            api_key,
            http_timeout,
        )?));
    }
    if !settings.sources.safes.is_empty() {
        drivers.push(Arc::new(SafeDriver::new(
            settings.sources.safe_tx_base.clone(),
            settings.sources.safes.clone(),
            http_timeout,
        )?));
    }
    if !settings.agents.tracked.is_empty() {
        drivers.push(Arc::new(AgentInfoDriver::new(settings.agents.tracked.clone())));
    }
    println!("✅ Poll drivers configured ({} sources)", drivers.len());

    let scheduler = PollScheduler::new(
        db.clone(),
        drivers,
        RetryPolicy::new(
            settings.poll.max_attempts,
            Duration::from_millis(settings.poll.retry_base_ms),
            Duration::from_millis(settings.poll.retry_max_ms),
        ),
        Duration::from_secs(settings.poll.interval_seconds),
        settings.poll.fan_out,
    );
    handles.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));
    println!("✅ Poll scheduler started\n");

    println!("📡 Indexing. Press Ctrl+C to stop.");
    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;

    println!("\n🛑 Shutdown signal received, stopping tasks...");
    let _ = shutdown_tx.send(true);

    // Bounded grace period so a wedged connection cannot block exit.
    for handle in handles {
        if timeout(Duration::from_secs(10), handle).await.is_err() {
            eprintln!("⚠️ Task did not stop within grace period, continuing shutdown");
        }
    }

    println!("✅ Indexer stopped");
    Ok(())
}
