//! Placeholder social driver: emits one `info` post per tracked agent
//! project so the trending surface stays populated until real social
//! ingestors (RSS, forums) are wired up.

use crate::entities::Ingest;
use crate::normalizer;
use crate::sources::{FetchError, SourceDriver};
use async_trait::async_trait;
use chrono::Utc;

pub struct AgentInfoDriver {
    projects: Vec<String>,
}

impl AgentInfoDriver {
    pub fn new(projects: Vec<String>) -> Self {
        Self { projects }
    }
}

#[async_trait]
impl SourceDriver for AgentInfoDriver {
    fn name(&self) -> &'static str {
        "agents"
    }

    async fn fetch_batch(&self) -> Result<Vec<Ingest>, FetchError> {
        let now = Utc::now();
        Ok(self
            .projects
            .iter()
            .map(|name| {
                // Stable title means a stable synthetic key, so re-delivery
                // every cycle is a store-level no-op.
                let title = format!("{} — updates", name);
                Ingest::Social(normalizer::social_post(name, "info", &title, None, now))
            })
            .collect())
    }
}
