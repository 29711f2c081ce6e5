//! Snapshot proposal driver: polls active proposals for the configured
//! spaces from the public GraphQL hub.

use crate::entities::Ingest;
use crate::normalizer::{self, SnapshotProposalRaw};
use crate::sources::{http_client, FetchError, SourceDriver};
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SNAPSHOT_URL: &str = "https://hub.snapshot.org/graphql";

/// Bounded page size per cycle.
const PAGE_SIZE: usize = 50;

const PROPOSALS_QUERY: &str = r#"
query Proposals($spaces: [String!], $first: Int!) {
  proposals(first: $first, where: { space_in: $spaces, state: "active" }, orderBy: "created", orderDirection: desc) {
    id title body state start end link space { id name }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ProposalsData>,
}

#[derive(Debug, Deserialize)]
struct ProposalsData {
    proposals: Option<Vec<SnapshotProposalRaw>>,
}

pub struct SnapshotDriver {
    client: reqwest::Client,
    spaces: Vec<String>,
}

impl SnapshotDriver {
    pub fn new(spaces: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            spaces,
        })
    }
}

#[async_trait]
impl SourceDriver for SnapshotDriver {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn fetch_batch(&self) -> Result<Vec<Ingest>, FetchError> {
        let resp = self
            .client
            .post(SNAPSHOT_URL)
            .json(&json!({
                "query": PROPOSALS_QUERY,
                "variables": { "spaces": self.spaces, "first": PAGE_SIZE },
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }
        let payload: GraphQlResponse = resp.json().await?;
        let raws = payload
            .data
            .and_then(|d| d.proposals)
            .ok_or_else(|| FetchError::Malformed("missing data.proposals".to_string()))?;

        // A single malformed record never aborts the batch.
        let mut batch = Vec::with_capacity(raws.len());
        for raw in &raws {
            match normalizer::snapshot_proposal(raw) {
                Ok(p) => batch.push(Ingest::Proposal(p)),
                Err(e) => warn!("[snapshot] dropping record: {}", e),
            }
        }
        Ok(batch)
    }
}
