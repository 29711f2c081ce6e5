//! Safe treasury driver: polls executed multisig transactions per configured
//! safe from a Safe transaction service.

use crate::entities::Ingest;
use crate::normalizer::{self, SafeTxRaw};
use crate::settings::SafeTarget;
use crate::sources::{http_client, FetchError, SourceDriver};
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use std::time::Duration;

/// Bounded page size per safe per cycle.
const PAGE_SIZE: usize = 20;

#[derive(Debug, Deserialize)]
struct SafeTxPage {
    results: Option<Vec<SafeTxRaw>>,
}

pub struct SafeDriver {
    client: reqwest::Client,
    base_url: String,
    safes: Vec<SafeTarget>,
}

impl SafeDriver {
    pub fn new(base_url: String, safes: Vec<SafeTarget>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            safes,
        })
    }
}

#[async_trait]
impl SourceDriver for SafeDriver {
    fn name(&self) -> &'static str {
        "safe"
    }

    async fn fetch_batch(&self) -> Result<Vec<Ingest>, FetchError> {
        let mut batch = Vec::new();
        for safe in &self.safes {
            let url = format!(
                "{}/api/v1/safes/{}/multisig-transactions/?executed=true&ordering=-executionDate&limit={}",
                self.base_url, safe.address, PAGE_SIZE
            );
            let resp = self.client.get(&url).send().await?;
            if !resp.status().is_success() {
                warn!(
                    "[safe] {} returned status {}, skipping",
                    safe.address,
                    resp.status()
                );
                continue;
            }
            let page: SafeTxPage = resp.json().await?;
            for raw in page.results.unwrap_or_default().iter() {
                match normalizer::safe_tx(raw, &safe.address) {
                    Ok(tx) => batch.push(Ingest::Treasury(tx)),
                    Err(e) => warn!("[safe] dropping record from {}: {}", safe.address, e),
                }
            }
        }
        Ok(batch)
    }
}
