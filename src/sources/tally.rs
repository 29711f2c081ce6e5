//! Tally proposal driver: polls the latest proposals per configured
//! organization. Without an API key the driver yields an empty batch.
//!
//! Unlike the single-request drivers, a non-2xx here is scoped to one
//! organization: that org is skipped for the cycle and the rest still
//! poll. Only a transport failure fails the whole batch.

use crate::entities::Ingest;
use crate::normalizer::{self, TallyProposalRaw};
use crate::settings::TallyOrg;
use crate::sources::{http_client, FetchError, SourceDriver};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const TALLY_URL: &str = "https://api.tally.xyz/query";

/// Bounded page size per organization per cycle.
const PAGE_SIZE: usize = 50;

const PROPOSALS_QUERY: &str = r#"
query Proposals($input: ProposalsInput!) {
  proposals(input: $input) { nodes { id title body status link } }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ProposalsData>,
}

#[derive(Debug, Deserialize)]
struct ProposalsData {
    proposals: Option<ProposalNodes>,
}

#[derive(Debug, Deserialize)]
struct ProposalNodes {
    nodes: Option<Vec<TallyProposalRaw>>,
}

pub struct TallyDriver {
    client: reqwest::Client,
    orgs: Vec<TallyOrg>,
    api_key: Option<String>,
}

impl TallyDriver {
    pub fn new(orgs: Vec<TallyOrg>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            orgs,
            api_key,
        })
    }
}

#[async_trait]
impl SourceDriver for TallyDriver {
    fn name(&self) -> &'static str {
        "tally"
    }

    async fn fetch_batch(&self) -> Result<Vec<Ingest>, FetchError> {
        let Some(api_key) = &self.api_key else {
            debug!("[tally] no API key configured, skipping");
            return Ok(Vec::new());
        };

        let mut batch = Vec::new();
        for org in &self.orgs {
            let variables = json!({
                "input": {
                    "pagination": { "limit": PAGE_SIZE },
                    "filter": { "organizationId": { "eq": org.org_id } },
                    "sort": { "field": "CREATED_AT", "order": "DESC" },
                }
            });
            let resp = self
                .client
                .post(TALLY_URL)
                .header("Api-Key", api_key)
                .json(&json!({ "query": PROPOSALS_QUERY, "variables": variables }))
                .send()
                .await?;
            if !resp.status().is_success() {
                // One degraded org does not block the others.
                warn!(
                    "[tally] org {} returned status {}, skipping",
                    org.name,
                    resp.status()
                );
                continue;
            }
            let payload: GraphQlResponse = resp.json().await?;
            let nodes = payload
                .data
                .and_then(|d| d.proposals)
                .and_then(|p| p.nodes)
                .unwrap_or_default();
            for raw in &nodes {
                match normalizer::tally_proposal(raw, &org.name) {
                    Ok(p) => batch.push(Ingest::Proposal(p)),
                    Err(e) => warn!("[tally] dropping record from {}: {}", org.name, e),
                }
            }
        }
        Ok(batch)
    }
}
