//! # Canonical Entities
//!
//! Typed representations of every activity signal the pipeline ingests,
//! plus the derived (never persisted) feed/recommendation output shapes.
//!
//! Each persisted entity carries a natural identity key used for idempotent
//! upserts (see `database`):
//!
//! - `Proposal`: `(source, id)`, mutable, last write wins
//! - `Vote`: `(proposal_id, voter, tx_hash)`, append-only
//! - `TreasuryTx` / `StakingEvent` / `LpEvent`: `tx_hash`, append-only
//! - `SocialPost`: `(project, platform, url)`, append-only with best-effort dedupe
//!
//! Addresses and uint256 amounts are kept as lowercase hex / decimal strings;
//! amounts are only parsed to floats inside the ranking engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A governance item from an on-chain governor or an off-chain voting venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Source-qualified identifier (e.g. a Snapshot hash, or `onchain:<governor>:<id>`)
    pub id: String,
    /// Origin of the record: `snapshot`, `tally` or `onchain`
    pub source: String,
    pub org: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub link: Option<String>,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    /// Assigned by the store on first insert; populated on the read path
    pub created_at: Option<DateTime<Utc>>,
}

/// A single cast vote on a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: String,
    pub voter: String,
    /// Raw voting weight as a decimal string (uint256 range)
    pub weight: String,
    pub direction: String,
    pub tx_hash: String,
    pub ts: DateTime<Utc>,
}

/// An executed treasury (multisig safe) transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryTx {
    pub safe_address: String,
    pub tx_hash: String,
    pub to_address: String,
    pub method: Option<String>,
    pub value: Option<String>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingKind {
    Staked,
    Unstaked,
    Claimed,
}

impl StakingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakingKind::Staked => "Staked",
            StakingKind::Unstaked => "Unstaked",
            StakingKind::Claimed => "Claimed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Staked" => Some(StakingKind::Staked),
            "Unstaked" => Some(StakingKind::Unstaked),
            "Claimed" => Some(StakingKind::Claimed),
            _ => None,
        }
    }
}

/// A staking contract event (stake, unstake or reward claim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingEvent {
    pub contract_address: String,
    pub kind: StakingKind,
    pub user_address: String,
    /// Amount in base units as a decimal string
    pub amount: String,
    /// Lock duration in seconds, only present on `Staked`
    pub duration: Option<i64>,
    pub tx_hash: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpKind {
    Swap,
    Mint,
    Burn,
}

impl LpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LpKind::Swap => "swap",
            LpKind::Mint => "mint",
            LpKind::Burn => "burn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "swap" => Some(LpKind::Swap),
            "mint" => Some(LpKind::Mint),
            "burn" => Some(LpKind::Burn),
            _ => None,
        }
    }
}

/// An AMM pair event. For swaps, `amount0` holds the folded input amounts
/// and `amount1` the folded output amounts (see `normalizer::lp_swap`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpEvent {
    pub pair_address: String,
    pub kind: LpKind,
    pub amount0: String,
    pub amount1: String,
    pub sender: String,
    pub receiver: Option<String>,
    pub tx_hash: String,
    pub ts: DateTime<Utc>,
}

/// A social mention of a tracked project.
///
/// `url` doubles as the dedupe key; sources without a stable URL get a
/// synthetic one assigned during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub project: String,
    pub platform: String,
    pub title: String,
    pub url: String,
    pub ts: DateTime<Utc>,
}

/// A normalized record ready for idempotent persistence, tagged by entity type
/// so drivers and listeners can hand heterogeneous batches to a single sink.
#[derive(Debug, Clone)]
pub enum Ingest {
    Proposal(Proposal),
    Vote(Vote),
    Treasury(TreasuryTx),
    Staking(StakingEvent),
    Lp(LpEvent),
    Social(SocialPost),
}

impl Ingest {
    /// Entity type label for log context.
    pub fn kind(&self) -> &'static str {
        match self {
            Ingest::Proposal(_) => "proposal",
            Ingest::Vote(_) => "vote",
            Ingest::Treasury(_) => "treasury_tx",
            Ingest::Staking(_) => "staking_event",
            Ingest::Lp(_) => "lp_event",
            Ingest::Social(_) => "social_post",
        }
    }

    /// Natural identity key of the record, for log context.
    pub fn identity(&self) -> String {
        match self {
            Ingest::Proposal(p) => format!("{}:{}", p.source, p.id),
            Ingest::Vote(v) => format!("{}:{}:{}", v.proposal_id, v.voter, v.tx_hash),
            Ingest::Treasury(t) => t.tx_hash.clone(),
            Ingest::Staking(s) => s.tx_hash.clone(),
            Ingest::Lp(l) => l.tx_hash.clone(),
            Ingest::Social(s) => format!("{}:{}:{}", s.project, s.platform, s.url),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived output shapes (computed per request, never stored)
// ---------------------------------------------------------------------------

/// One entry of the merged, time-ordered activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub kind: &'static str,
    pub title: String,
    pub link: Option<String>,
    pub ts: DateTime<Utc>,
    pub source: String,
    pub tags: Vec<String>,
}

/// A governance recommendation entry with its computed heat in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceRec {
    pub org: String,
    pub title: String,
    pub link: Option<String>,
    pub ends_at: Option<DateTime<Utc>>,
    pub heat: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StakeRank {
    pub contract: String,
    pub score: f64,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolRank {
    pub pair: String,
    pub volume: f64,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRank {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub governance: Vec<GovernanceRec>,
    pub staking: Vec<StakeRank>,
    pub pools: Vec<PoolRank>,
    pub agents: Vec<AgentRank>,
}

/// The composite read-only artifact consumed by the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub updated_at: DateTime<Utc>,
    pub recommendations: Recommendations,
    pub items: Vec<FeedItem>,
}
