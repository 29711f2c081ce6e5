//! # Poll Source Drivers
//!
//! One driver per pull-based upstream. The `SourceDriver` trait is the
//! integration seam for the poll scheduler: a driver turns one invocation
//! into a batch of normalized records, capped at a bounded page size so
//! cycle latency stays predictable.
//!
//! Drivers never deduplicate across overlapping poll windows; correctness
//! relies entirely on the store adapter's idempotent upserts.

use crate::entities::Ingest;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Off-chain proposal feed from Snapshot's GraphQL hub
pub mod snapshot;
/// Off-chain proposal feed from the Tally API
pub mod tally;
/// Treasury moves from the Safe transaction service
pub mod safe;
/// Placeholder social signal for tracked agent projects
pub mod agents;

/// Upstream fetch failure. The scheduler decides the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// A pull-based activity source producing one normalized batch per invocation.
#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch one bounded batch. Safe to re-run with overlapping time windows.
    async fn fetch_batch(&self) -> Result<Vec<Ingest>, FetchError>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
