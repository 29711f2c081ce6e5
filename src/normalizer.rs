//! # Event Normalizer
//!
//! Pure conversion from source-specific records (GraphQL responses, REST
//! payloads, decoded chain logs) into canonical entities.
//!
//! Contract: a missing identity field (proposal id, transaction hash) yields
//! a [`NormalizeError`] and the caller drops that one record; every other
//! absent field falls back to a documented default (empty string for text,
//! `None` for optional timestamps). Free-text bodies are truncated to
//! [`MAX_BODY_CHARS`] to bound storage and downstream summarization cost.

use crate::entities::{LpEvent, LpKind, Proposal, SocialPost, StakingEvent, StakingKind, TreasuryTx, Vote};
use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, H256, U256};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Upper bound on stored free-text bodies, in characters.
pub const MAX_BODY_CHARS: usize = 16_000;

/// Cap applied to titles derived from the first line of an on-chain
/// proposal description.
pub const MAX_ONCHAIN_TITLE_CHARS: usize = 140;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("record is missing required identity field `{0}`")]
    MissingIdentity(&'static str),
}

/// Truncate free text to [`MAX_BODY_CHARS`], char-boundary safe.
pub fn truncate_body(s: &str) -> String {
    s.chars().take(MAX_BODY_CHARS).collect()
}

fn addr_hex(a: Address) -> String {
    format!("{:#x}", a)
}

fn tx_hex(h: H256) -> String {
    format!("{:#x}", h)
}

// ---------------------------------------------------------------------------
// Off-chain raw records (Option-typed so malformed payloads surface here,
// uniformly, instead of as serde failures that would abort the whole batch)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSpaceRaw {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotProposalRaw {
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    /// Unix seconds
    pub start: Option<i64>,
    /// Unix seconds
    pub end: Option<i64>,
    pub link: Option<String>,
    pub space: Option<SnapshotSpaceRaw>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TallyProposalRaw {
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafeTxRaw {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "methodName")]
    pub method_name: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "executionDate")]
    pub execution_date: Option<DateTime<Utc>>,
}

/// Normalize a Snapshot GraphQL proposal node.
pub fn snapshot_proposal(raw: &SnapshotProposalRaw) -> Result<Proposal, NormalizeError> {
    let id = raw
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingIdentity("id"))?;
    Ok(Proposal {
        id,
        source: "snapshot".to_string(),
        org: raw
            .space
            .as_ref()
            .and_then(|s| s.id.clone())
            .unwrap_or_default(),
        title: raw.title.clone().unwrap_or_default(),
        body: truncate_body(raw.body.as_deref().unwrap_or("")),
        status: raw.state.clone().unwrap_or_default(),
        link: raw.link.clone(),
        start_ts: raw.start.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        end_ts: raw.end.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        created_at: None,
    })
}

/// Normalize a Tally proposal node. The org display name comes from the
/// per-source configuration, not from the payload.
pub fn tally_proposal(raw: &TallyProposalRaw, org: &str) -> Result<Proposal, NormalizeError> {
    let id = raw
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingIdentity("id"))?;
    Ok(Proposal {
        id,
        source: "tally".to_string(),
        org: org.to_string(),
        title: raw.title.clone().unwrap_or_default(),
        body: truncate_body(raw.body.as_deref().unwrap_or("")),
        status: raw.status.clone().unwrap_or_default(),
        link: raw.link.clone(),
        start_ts: None,
        end_ts: None,
        created_at: None,
    })
}

/// Normalize a Safe transaction-service record for one safe.
pub fn safe_tx(raw: &SafeTxRaw, safe_address: &str) -> Result<TreasuryTx, NormalizeError> {
    let tx_hash = raw
        .transaction_hash
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingIdentity("tx_hash"))?;
    Ok(TreasuryTx {
        safe_address: safe_address.to_ascii_lowercase(),
        tx_hash: tx_hash.to_ascii_lowercase(),
        to_address: raw.to.clone().unwrap_or_default().to_ascii_lowercase(),
        method: raw.method_name.clone(),
        value: raw.value.clone(),
        ts: raw.execution_date.unwrap_or_else(Utc::now),
    })
}

// ---------------------------------------------------------------------------
// On-chain log records
// ---------------------------------------------------------------------------

/// Build a proposal from a governor `ProposalCreated` log. The title is the
/// first line of the description capped at [`MAX_ONCHAIN_TITLE_CHARS`].
pub fn onchain_proposal(governor: Address, org: &str, proposal_id: U256, description: &str) -> Proposal {
    let title: String = description
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(MAX_ONCHAIN_TITLE_CHARS)
        .collect();
    Proposal {
        id: format!("onchain:{}:{}", addr_hex(governor), proposal_id),
        source: "onchain".to_string(),
        org: org.to_string(),
        title,
        body: truncate_body(description),
        status: "active".to_string(),
        link: None,
        start_ts: None,
        end_ts: None,
        created_at: None,
    }
}

/// Build a vote from a governor `VoteCast` log.
pub fn vote_cast(
    governor: Address,
    voter: Address,
    proposal_id: U256,
    support: u8,
    weight: U256,
    tx_hash: Option<H256>,
) -> Result<Vote, NormalizeError> {
    let tx = tx_hash.ok_or(NormalizeError::MissingIdentity("tx_hash"))?;
    Ok(Vote {
        proposal_id: format!("onchain:{}:{}", addr_hex(governor), proposal_id),
        voter: addr_hex(voter),
        weight: weight.to_string(),
        direction: support.to_string(),
        tx_hash: tx_hex(tx),
        ts: Utc::now(),
    })
}

/// Build a staking event from a `Staked`/`Unstaked`/`Claimed` log.
pub fn staking_event(
    contract: Address,
    kind: StakingKind,
    user: Address,
    amount: U256,
    duration: Option<U256>,
    tx_hash: Option<H256>,
) -> Result<StakingEvent, NormalizeError> {
    let tx = tx_hash.ok_or(NormalizeError::MissingIdentity("tx_hash"))?;
    Ok(StakingEvent {
        contract_address: addr_hex(contract),
        kind,
        user_address: addr_hex(user),
        amount: amount.to_string(),
        duration: duration.map(|d| d.min(U256::from(i64::MAX as u64)).low_u64() as i64),
        tx_hash: tx_hex(tx),
        ts: Utc::now(),
    })
}

/// Build a swap event from an AMM pair `Swap` log. Input amounts are folded
/// into `amount0` and output amounts into `amount1`.
#[allow(clippy::too_many_arguments)]
pub fn lp_swap(
    pair: Address,
    sender: Address,
    amount0_in: U256,
    amount1_in: U256,
    amount0_out: U256,
    amount1_out: U256,
    to: Address,
    tx_hash: Option<H256>,
) -> Result<LpEvent, NormalizeError> {
    let tx = tx_hash.ok_or(NormalizeError::MissingIdentity("tx_hash"))?;
    Ok(LpEvent {
        pair_address: addr_hex(pair),
        kind: LpKind::Swap,
        amount0: amount0_in.saturating_add(amount1_in).to_string(),
        amount1: amount0_out.saturating_add(amount1_out).to_string(),
        sender: addr_hex(sender),
        receiver: Some(addr_hex(to)),
        tx_hash: tx_hex(tx),
        ts: Utc::now(),
    })
}

/// Build a mint or burn event from an AMM pair log.
pub fn lp_liquidity(
    pair: Address,
    kind: LpKind,
    sender: Address,
    amount0: U256,
    amount1: U256,
    to: Option<Address>,
    tx_hash: Option<H256>,
) -> Result<LpEvent, NormalizeError> {
    let tx = tx_hash.ok_or(NormalizeError::MissingIdentity("tx_hash"))?;
    Ok(LpEvent {
        pair_address: addr_hex(pair),
        kind,
        amount0: amount0.to_string(),
        amount1: amount1.to_string(),
        sender: addr_hex(sender),
        receiver: to.map(addr_hex),
        tx_hash: tx_hex(tx),
        ts: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Social posts
// ---------------------------------------------------------------------------

/// Build a social post. Sources without a stable URL get a synthetic dedupe
/// key derived from the title so `(project, platform, url)` stays a total key.
pub fn social_post(
    project: &str,
    platform: &str,
    title: &str,
    url: Option<&str>,
    ts: DateTime<Utc>,
) -> SocialPost {
    let url = match url.filter(|u| !u.is_empty()) {
        Some(u) => u.to_string(),
        None => synthetic_social_url(project, platform, title),
    };
    SocialPost {
        project: project.to_string(),
        platform: platform.to_string(),
        title: title.to_string(),
        url,
        ts,
    }
}

fn synthetic_social_url(project: &str, platform: &str, title: &str) -> String {
    let mut hasher = DefaultHasher::new();
    title.hash(&mut hasher);
    format!(
        "synthetic:{}:{}:{}",
        project,
        platform,
        hex::encode(hasher.finish().to_be_bytes())
    )
}
