//! # Chain Listener
//!
//! One long-lived task per subscribed contract (governor, staking pool or
//! AMM pair). Each task subscribes to the contract's log stream over
//! WebSocket, normalizes every log and writes it through the store adapter
//! synchronously before taking the next log, so per-contract event order is
//! preserved and a slow store write is the only back-pressure needed.
//!
//! ## Failure handling
//!
//! - One malformed log is logged and skipped; the subscription stays up.
//! - One failed store write is logged and skipped likewise.
//! - A dropped transport reconnects forever with exponential backoff (1 s
//!   doubling to a 60 s cap, reset after a healthy session). Logs missed
//!   while disconnected are not replayed.

use crate::database::{self, DbPool};
use crate::entities::{Ingest, LpKind, StakingKind};
use crate::normalizer;
use anyhow::{Context, Result};
use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};
use futures_util::StreamExt;
use log::{info, warn};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Event bindings (explicit structs so field order matches the ABI exactly)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, EthEvent)]
#[ethevent(
    name = "ProposalCreated",
    abi = "ProposalCreated(uint256,address,address[],uint256[],string[],bytes[],uint256,uint256,string)"
)]
pub struct ProposalCreatedEvent {
    pub id: U256,
    pub proposer: Address,
    pub targets: Vec<Address>,
    pub values: Vec<U256>,
    pub signatures: Vec<String>,
    pub calldatas: Vec<Bytes>,
    pub start_block: U256,
    pub end_block: U256,
    pub description: String,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "VoteCast", abi = "VoteCast(address,uint256,uint8,uint256,string)")]
pub struct VoteCastEvent {
    #[ethevent(indexed)]
    pub voter: Address,
    pub proposal_id: U256,
    pub support: u8,
    pub weight: U256,
    pub reason: String,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Staked", abi = "Staked(address,uint256,uint256)")]
pub struct StakedEvent {
    #[ethevent(indexed)]
    pub user: Address,
    pub amount: U256,
    pub duration: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Unstaked", abi = "Unstaked(address,uint256)")]
pub struct UnstakedEvent {
    #[ethevent(indexed)]
    pub user: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Claimed", abi = "Claimed(address,uint256)")]
pub struct ClaimedEvent {
    #[ethevent(indexed)]
    pub user: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(
    name = "Swap",
    abi = "Swap(address,uint256,uint256,uint256,uint256,address)"
)]
pub struct SwapEvent {
    #[ethevent(indexed)]
    pub sender: Address,
    pub amount0_in: U256,
    pub amount1_in: U256,
    pub amount0_out: U256,
    pub amount1_out: U256,
    #[ethevent(indexed)]
    pub to: Address,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Mint", abi = "Mint(address,uint256,uint256)")]
pub struct MintEvent {
    #[ethevent(indexed)]
    pub sender: Address,
    pub amount0: U256,
    pub amount1: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "Burn", abi = "Burn(address,uint256,uint256,address)")]
pub struct BurnEvent {
    #[ethevent(indexed)]
    pub sender: Address,
    pub amount0: U256,
    pub amount1: U256,
    #[ethevent(indexed)]
    pub to: Address,
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Which event family a subscribed contract emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Governor,
    Staking,
    Pair,
}

/// Session state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Disconnected,
    Subscribing,
    Listening,
    Reconnecting,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Subscribing => "subscribing",
            ListenerState::Listening => "listening",
            ListenerState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

enum SessionEnd {
    Shutdown,
    StreamClosed,
}

pub struct ChainListener {
    ws_url: String,
    address: Address,
    name: String,
    kind: TargetKind,
    db: DbPool,
}

impl ChainListener {
    pub fn new(ws_url: String, address: Address, name: String, kind: TargetKind, db: DbPool) -> Self {
        Self {
            ws_url,
            address,
            name,
            kind,
            db,
        }
    }

    /// Subscribe-and-process loop with unbounded reconnection. Returns only
    /// on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = RECONNECT_BASE;
        info!("🔌 [{}] {}", self.name, ListenerState::Disconnected);
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("🛑 [{}] unsubscribed, listener stopping", self.name);
                    return;
                }
                Ok(SessionEnd::StreamClosed) => {
                    warn!("⚠️ [{}] log stream ended", self.name);
                    // The subscription was healthy, so start backoff over.
                    backoff = RECONNECT_BASE;
                }
                Err(e) => {
                    warn!("❌ [{}] session failed: {:#}", self.name, e);
                }
            }
            info!(
                "🔄 [{}] {}, next attempt in {:?}",
                self.name,
                ListenerState::Reconnecting,
                backoff
            );
            tokio::select! {
                _ = sleep(backoff) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    }

    async fn session(&self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        info!("🔌 [{}] {} {}", self.name, ListenerState::Subscribing, self.ws_url);
        let provider = timeout(CONNECT_TIMEOUT, Provider::<Ws>::connect(&self.ws_url))
            .await
            .context("WebSocket connect timed out")?
            .context("WebSocket connect failed")?;

        let filter = Filter::new().address(self.address);
        let mut stream = provider
            .subscribe_logs(&filter)
            .await
            .context("log subscription failed")?;
        info!("📡 [{}] {} on {:#x}", self.name, ListenerState::Listening, self.address);

        loop {
            tokio::select! {
                maybe_log = stream.next() => match maybe_log {
                    Some(log) => self.handle_log(log).await,
                    None => return Ok(SessionEnd::StreamClosed),
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = stream.unsubscribe().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Normalize and persist one log. Never fails the session: a malformed
    /// log or a failed store write is logged and the listener moves on.
    async fn handle_log(&self, log: Log) {
        let Some(topic0) = log.topics.first().copied() else {
            return;
        };
        let tx_hash = log.transaction_hash;
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };

        let decoded = match self.kind {
            TargetKind::Governor => decode_governor_log(self.address, &self.name, topic0, &raw, tx_hash),
            TargetKind::Staking => decode_staking_log(self.address, topic0, &raw, tx_hash),
            TargetKind::Pair => decode_pair_log(self.address, topic0, &raw, tx_hash),
        };

        match decoded {
            Ok(Some(record)) => {
                if let Err(e) = database::ingest(&self.db, &record).await {
                    warn!(
                        "⚠️ [{}] store write failed for {} {}: {:#}",
                        self.name,
                        record.kind(),
                        record.identity(),
                        e
                    );
                }
            }
            // An event this listener does not track (e.g. pair Sync).
            Ok(None) => {}
            Err(e) => warn!("⚠️ [{}] dropping malformed log: {:#}", self.name, e),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind log decoding (free functions so they are testable without a
// provider or a store)
// ---------------------------------------------------------------------------

pub(crate) fn decode_governor_log(
    governor: Address,
    org: &str,
    topic0: H256,
    raw: &RawLog,
    tx_hash: Option<H256>,
) -> Result<Option<Ingest>> {
    if topic0 == ProposalCreatedEvent::signature() {
        let ev = ProposalCreatedEvent::decode_log(raw).context("ProposalCreated decode")?;
        Ok(Some(Ingest::Proposal(normalizer::onchain_proposal(
            governor,
            org,
            ev.id,
            &ev.description,
        ))))
    } else if topic0 == VoteCastEvent::signature() {
        let ev = VoteCastEvent::decode_log(raw).context("VoteCast decode")?;
        let vote =
            normalizer::vote_cast(governor, ev.voter, ev.proposal_id, ev.support, ev.weight, tx_hash)?;
        Ok(Some(Ingest::Vote(vote)))
    } else {
        Ok(None)
    }
}

pub(crate) fn decode_staking_log(
    contract: Address,
    topic0: H256,
    raw: &RawLog,
    tx_hash: Option<H256>,
) -> Result<Option<Ingest>> {
    let event = if topic0 == StakedEvent::signature() {
        let ev = StakedEvent::decode_log(raw).context("Staked decode")?;
        normalizer::staking_event(
            contract,
            StakingKind::Staked,
            ev.user,
            ev.amount,
            Some(ev.duration),
            tx_hash,
        )?
    } else if topic0 == UnstakedEvent::signature() {
        let ev = UnstakedEvent::decode_log(raw).context("Unstaked decode")?;
        normalizer::staking_event(contract, StakingKind::Unstaked, ev.user, ev.amount, None, tx_hash)?
    } else if topic0 == ClaimedEvent::signature() {
        let ev = ClaimedEvent::decode_log(raw).context("Claimed decode")?;
        normalizer::staking_event(contract, StakingKind::Claimed, ev.user, ev.amount, None, tx_hash)?
    } else {
        return Ok(None);
    };
    Ok(Some(Ingest::Staking(event)))
}

pub(crate) fn decode_pair_log(
    pair: Address,
    topic0: H256,
    raw: &RawLog,
    tx_hash: Option<H256>,
) -> Result<Option<Ingest>> {
    let event = if topic0 == SwapEvent::signature() {
        let ev = SwapEvent::decode_log(raw).context("Swap decode")?;
        normalizer::lp_swap(
            pair,
            ev.sender,
            ev.amount0_in,
            ev.amount1_in,
            ev.amount0_out,
            ev.amount1_out,
            ev.to,
            tx_hash,
        )?
    } else if topic0 == MintEvent::signature() {
        let ev = MintEvent::decode_log(raw).context("Mint decode")?;
        normalizer::lp_liquidity(pair, LpKind::Mint, ev.sender, ev.amount0, ev.amount1, None, tx_hash)?
    } else if topic0 == BurnEvent::signature() {
        let ev = BurnEvent::decode_log(raw).context("Burn decode")?;
        normalizer::lp_liquidity(
            pair,
            LpKind::Burn,
            ev.sender,
            ev.amount0,
            ev.amount1,
            Some(ev.to),
            tx_hash,
        )?
    } else {
        return Ok(None);
    };
    Ok(Some(Ingest::Lp(event)))
}
