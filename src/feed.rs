//! # Aggregation & Ranking Engine
//!
//! Stateless per request: `FeedService` reads bounded recent windows from the
//! store and assembles a `FeedResponse` with pure ranking functions. Degraded
//! upstream sources show up here as stale or missing rows, never as an error.
//!
//! Ranking model:
//! - recency decays exponentially with a 48 h half-life;
//! - governance heat blends recency (60%) with vote volume (40%, saturating
//!   at 20 votes);
//! - staking rank is event count plus a whole-token stake bonus;
//! - pool rank is raw token volume over the LP window;
//! - trending agents is a social-mention count that falls back to the first
//!   tracked projects so the rail is never empty.

use crate::database::{self, DbPool};
use crate::entities::{
    AgentRank, FeedItem, FeedResponse, GovernanceRec, LpEvent, PoolRank, Proposal, Recommendations,
    SocialPost, StakeRank, StakingEvent, StakingKind, TreasuryTx, Vote,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

const HALF_LIFE_HOURS: f64 = 48.0;
const VOTE_SATURATION: f64 = 20.0;
const WEI_PER_TOKEN: f64 = 1e18;

const TOP_GOVERNANCE: usize = 5;
const TOP_STAKING: usize = 3;
const TOP_POOLS: usize = 3;
const TOP_AGENTS: usize = 5;
const AGENT_FALLBACK: usize = 3;
const PERSONAL_PROMOTIONS: usize = 3;

// Read windows, matching the write-side retention expectations.
const PROPOSAL_LIMIT: i64 = 100;
const VOTE_HOURS: i64 = 72;
const STAKING_HOURS: i64 = 72;
const STAKING_LIMIT: i64 = 200;
const LP_HOURS: i64 = 24;
const LP_LIMIT: i64 = 400;
const TREASURY_HOURS: i64 = 72;
const TREASURY_LIMIT: i64 = 100;
const SOCIAL_HOURS: i64 = 48;
const SOCIAL_LIMIT: i64 = 100;

// Per-type caps applied before the merged feed is sorted and truncated.
const ITEMS_PROPOSALS: usize = 50;
const ITEMS_TREASURY: usize = 30;
const ITEMS_STAKING: usize = 50;
const ITEMS_LP: usize = 50;
const ITEMS_SOCIAL: usize = 30;
const ITEMS_TOTAL: usize = 120;

/// Exponential recency score in `[0, 1]`. Future timestamps clamp to 1.
pub fn score_recency(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_ms = (now - ts).num_milliseconds().max(0) as f64;
    let half_life_ms = HALF_LIFE_HOURS * 3600.0 * 1000.0;
    (-std::f64::consts::LN_2 * age_ms / half_life_ms).exp()
}

fn heat_basis(p: &Proposal, now: DateTime<Utc>) -> DateTime<Utc> {
    p.end_ts.or(p.created_at).unwrap_or(now)
}

/// Governance recommendations: heat-ranked proposals, top 5.
pub fn governance_heat(
    proposals: &[Proposal],
    votes: &[Vote],
    now: DateTime<Utc>,
) -> Vec<GovernanceRec> {
    let mut vote_counts: HashMap<&str, usize> = HashMap::new();
    for v in votes {
        *vote_counts.entry(v.proposal_id.as_str()).or_default() += 1;
    }

    let mut scored: Vec<(f64, DateTime<Utc>, GovernanceRec)> = proposals
        .iter()
        .map(|p| {
            let basis = heat_basis(p, now);
            let count = *vote_counts.get(p.id.as_str()).unwrap_or(&0) as f64;
            let heat =
                0.6 * score_recency(basis, now) + 0.4 * (count / VOTE_SATURATION).min(1.0);
            (
                heat,
                basis,
                GovernanceRec {
                    org: p.org.clone(),
                    title: p.title.clone(),
                    link: p.link.clone(),
                    ends_at: p.end_ts,
                    heat,
                },
            )
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
    });
    scored
        .into_iter()
        .take(TOP_GOVERNANCE)
        .map(|(_, _, rec)| rec)
        .collect()
}

/// Staking contract ranks: event count plus a whole-token stake bonus, top 3.
pub fn staking_ranks(events: &[StakingEvent]) -> Vec<StakeRank> {
    let mut per_contract: HashMap<&str, (usize, f64, DateTime<Utc>)> = HashMap::new();
    for ev in events {
        let entry = per_contract
            .entry(ev.contract_address.as_str())
            .or_insert((0, 0.0, ev.ts));
        entry.0 += 1;
        if ev.kind == StakingKind::Staked {
            entry.1 += ev.amount.parse::<f64>().unwrap_or(0.0);
        }
        if ev.ts > entry.2 {
            entry.2 = ev.ts;
        }
    }

    let mut ranks: Vec<StakeRank> = per_contract
        .into_iter()
        .map(|(contract, (count, staked, last))| StakeRank {
            contract: contract.to_string(),
            score: count as f64 + 0.001 * (staked / WEI_PER_TOKEN),
            last,
        })
        .collect();
    ranks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranks.truncate(TOP_STAKING);
    ranks
}

/// Pool ranks by raw token volume over the LP window, top 3.
pub fn pool_ranks(events: &[LpEvent]) -> Vec<PoolRank> {
    let mut per_pair: HashMap<&str, (f64, DateTime<Utc>)> = HashMap::new();
    for ev in events {
        let entry = per_pair
            .entry(ev.pair_address.as_str())
            .or_insert((0.0, ev.ts));
        entry.0 += ev.amount0.parse::<f64>().unwrap_or(0.0).abs()
            + ev.amount1.parse::<f64>().unwrap_or(0.0).abs();
        if ev.ts > entry.1 {
            entry.1 = ev.ts;
        }
    }

    let mut ranks: Vec<PoolRank> = per_pair
        .into_iter()
        .map(|(pair, (volume, last))| PoolRank {
            pair: pair.to_string(),
            volume,
            last,
        })
        .collect();
    ranks.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap_or(std::cmp::Ordering::Equal));
    ranks.truncate(TOP_POOLS);
    ranks
}

/// Trending agents: social-mention count per tracked project, top 5. With no
/// recent mentions at all, the first tracked projects are shown with count 0.
pub fn agent_ranks(posts: &[SocialPost], tracked: &[String]) -> Vec<AgentRank> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for post in posts {
        if tracked.iter().any(|t| t == &post.project) {
            *counts.entry(post.project.as_str()).or_default() += 1;
        }
    }

    if counts.is_empty() {
        return tracked
            .iter()
            .take(AGENT_FALLBACK)
            .map(|name| AgentRank {
                name: name.clone(),
                count: 0,
            })
            .collect();
    }

    let mut ranks: Vec<AgentRank> = counts
        .into_iter()
        .map(|(name, count)| AgentRank {
            name: name.to_string(),
            count,
        })
        .collect();
    ranks.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranks.truncate(TOP_AGENTS);
    ranks
}

/// Promote proposals the viewer voted on (at most 3) to the front at heat 1.0,
/// deduped by title against the default list, total capped at 5.
pub fn personalize(
    default_recs: Vec<GovernanceRec>,
    proposals: &[Proposal],
    votes: &[Vote],
    viewer: &str,
) -> Vec<GovernanceRec> {
    let voted_ids: HashSet<&str> = votes
        .iter()
        .filter(|v| v.voter.eq_ignore_ascii_case(viewer))
        .map(|v| v.proposal_id.as_str())
        .collect();
    if voted_ids.is_empty() {
        return default_recs;
    }

    let mine: Vec<GovernanceRec> = proposals
        .iter()
        .filter(|p| voted_ids.contains(p.id.as_str()))
        .take(PERSONAL_PROMOTIONS)
        .map(|p| GovernanceRec {
            org: p.org.clone(),
            title: p.title.clone(),
            link: p.link.clone(),
            ends_at: p.end_ts,
            heat: 1.0,
        })
        .collect();

    let mut seen: HashSet<String> = mine.iter().map(|r| r.title.clone()).collect();
    let mut merged = mine;
    for rec in default_recs {
        if merged.len() >= TOP_GOVERNANCE {
            break;
        }
        if seen.insert(rec.title.clone()) {
            merged.push(rec);
        }
    }
    merged.truncate(TOP_GOVERNANCE);
    merged
}

// Addresses come straight from upstream payloads, so truncate on char
// boundaries rather than byte indices.
fn short_addr(addr: &str) -> String {
    let head: String = addr.chars().take(10).collect();
    if head.len() < addr.len() {
        format!("{}…", head)
    } else {
        addr.to_string()
    }
}

/// Merge all entity types into one time-ordered feed with per-type caps.
pub fn build_items(
    proposals: &[Proposal],
    treasury: &[TreasuryTx],
    staking: &[StakingEvent],
    lp: &[LpEvent],
    social: &[SocialPost],
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = Vec::new();

    items.extend(proposals.iter().take(ITEMS_PROPOSALS).map(|p| FeedItem {
        kind: "proposal",
        title: p.title.clone(),
        link: p.link.clone(),
        ts: p.created_at.or(p.end_ts).unwrap_or(now),
        source: p.source.clone(),
        tags: vec![p.org.clone()],
    }));

    items.extend(treasury.iter().take(ITEMS_TREASURY).map(|tx| FeedItem {
        kind: "treasury",
        title: format!(
            "Treasury {} → {}",
            tx.method.as_deref().unwrap_or("transfer"),
            short_addr(&tx.to_address)
        ),
        link: Some(format!("https://etherscan.io/tx/{}", tx.tx_hash)),
        ts: tx.ts,
        source: "safe".to_string(),
        tags: vec![tx.safe_address.clone()],
    }));

    items.extend(staking.iter().take(ITEMS_STAKING).map(|ev| FeedItem {
        kind: "staking",
        title: format!("{} by {}", ev.kind.as_str(), short_addr(&ev.user_address)),
        link: None,
        ts: ev.ts,
        source: "onchain".to_string(),
        tags: vec![ev.contract_address.clone()],
    }));

    items.extend(lp.iter().take(ITEMS_LP).map(|ev| FeedItem {
        kind: "liquidity",
        title: format!("{} on {}", ev.kind.as_str(), short_addr(&ev.pair_address)),
        link: None,
        ts: ev.ts,
        source: "onchain".to_string(),
        tags: vec![ev.pair_address.clone()],
    }));

    items.extend(social.iter().take(ITEMS_SOCIAL).map(|post| FeedItem {
        kind: "social",
        title: post.title.clone(),
        // Synthetic keys are dedupe handles, not destinations.
        link: (!post.url.starts_with("synthetic:")).then(|| post.url.clone()),
        ts: post.ts,
        source: post.platform.clone(),
        tags: vec![post.project.clone()],
    }));

    items.sort_by(|a, b| b.ts.cmp(&a.ts));
    items.truncate(ITEMS_TOTAL);
    items
}

/// Reads the store and assembles the composite feed artifact.
pub struct FeedService {
    db: DbPool,
    orgs: Vec<String>,
    tracked_agents: Vec<String>,
}

impl FeedService {
    pub fn new(db: DbPool, orgs: Vec<String>, tracked_agents: Vec<String>) -> Self {
        Self {
            db,
            orgs,
            tracked_agents,
        }
    }

    pub async fn build_feed(&self, viewer: Option<&str>) -> Result<FeedResponse> {
        let (proposals, votes, staking, lp, treasury, social) = tokio::try_join!(
            database::recent_proposals(&self.db, &self.orgs, PROPOSAL_LIMIT),
            database::recent_votes(&self.db, VOTE_HOURS),
            database::recent_staking_events(&self.db, STAKING_HOURS, STAKING_LIMIT),
            database::recent_lp_events(&self.db, LP_HOURS, LP_LIMIT),
            database::recent_treasury_txs(&self.db, TREASURY_HOURS, TREASURY_LIMIT),
            database::recent_social_posts(&self.db, SOCIAL_HOURS, SOCIAL_LIMIT),
        )?;

        let now = Utc::now();
        let mut governance = governance_heat(&proposals, &votes, now);
        if let Some(viewer) = viewer {
            governance = personalize(governance, &proposals, &votes, viewer);
        }

        Ok(FeedResponse {
            updated_at: now,
            recommendations: Recommendations {
                governance,
                staking: staking_ranks(&staking),
                pools: pool_ranks(&lp),
                agents: agent_ranks(&social, &self.tracked_agents),
            },
            items: build_items(&proposals, &treasury, &staking, &lp, &social, now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::LpKind;
    use chrono::Duration;

    fn proposal(id: &str, title: &str, created_hours_ago: i64) -> Proposal {
        let now = Utc::now();
        Proposal {
            id: id.to_string(),
            source: "snapshot".to_string(),
            org: "Test DAO".to_string(),
            title: title.to_string(),
            body: String::new(),
            status: "active".to_string(),
            link: None,
            start_ts: None,
            end_ts: None,
            created_at: Some(now - Duration::hours(created_hours_ago)),
        }
    }

    fn vote(proposal_id: &str, voter: &str) -> Vote {
        Vote {
            proposal_id: proposal_id.to_string(),
            voter: voter.to_string(),
            weight: "1".to_string(),
            direction: "1".to_string(),
            tx_hash: format!("0x{}{}", proposal_id, voter),
            ts: Utc::now(),
        }
    }

    #[test]
    fn test_recency_is_bounded_and_monotonic() {
        let now = Utc::now();
        let fresh = score_recency(now - Duration::hours(1), now);
        let old = score_recency(now - Duration::hours(100), now);
        assert!(fresh > old);
        assert!((0.0..=1.0).contains(&fresh));
        assert!((0.0..=1.0).contains(&old));
        // Future stamps clamp instead of exceeding 1.
        assert_eq!(score_recency(now + Duration::hours(5), now), 1.0);
    }

    #[test]
    fn test_half_life_is_48_hours() {
        let now = Utc::now();
        let halved = score_recency(now - Duration::hours(48), now);
        assert!((halved - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_heat_stays_in_unit_interval_under_heavy_voting() {
        let now = Utc::now();
        let p = proposal("p1", "Big one", 0);
        let votes: Vec<Vote> = (0..500).map(|i| vote("p1", &format!("0x{:040x}", i))).collect();
        let recs = governance_heat(&[p], &votes, now);
        assert_eq!(recs.len(), 1);
        assert!((0.0..=1.0).contains(&recs[0].heat));
    }

    #[test]
    fn test_vote_volume_breaks_recency_ties() {
        let now = Utc::now();
        let proposals = vec![proposal("quiet", "Quiet", 2), proposal("loud", "Loud", 2)];
        let votes: Vec<Vote> = (0..10).map(|i| vote("loud", &format!("0x{:040x}", i))).collect();
        let recs = governance_heat(&proposals, &votes, now);
        assert_eq!(recs[0].title, "Loud");
    }

    #[test]
    fn test_agent_fallback_is_never_empty() {
        let tracked = vec![
            "Bittensor".to_string(),
            "Fetch.ai".to_string(),
            "Autonolas".to_string(),
            "Morpheus".to_string(),
        ];
        let ranks = agent_ranks(&[], &tracked);
        assert_eq!(ranks.len(), 3);
        assert!(ranks.iter().all(|r| r.count == 0));
        assert_eq!(ranks[0].name, "Bittensor");
    }

    #[test]
    fn test_agent_counts_ignore_untracked_projects() {
        let tracked = vec!["Bittensor".to_string()];
        let posts = vec![
            SocialPost {
                project: "Bittensor".to_string(),
                platform: "info".to_string(),
                title: "a".to_string(),
                url: "u1".to_string(),
                ts: Utc::now(),
            },
            SocialPost {
                project: "Unknown".to_string(),
                platform: "info".to_string(),
                title: "b".to_string(),
                url: "u2".to_string(),
                ts: Utc::now(),
            },
        ];
        let ranks = agent_ranks(&posts, &tracked);
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks[0].count, 1);
    }

    #[test]
    fn test_personalization_promotes_and_dedupes() {
        let now = Utc::now();
        // Six hot proposals so the viewer's two never make the default top 5.
        let mut proposals: Vec<Proposal> =
            (0..6).map(|i| proposal(&format!("hot{}", i), &format!("Hot {}", i), 0)).collect();
        proposals.push(proposal("mine1", "Mine 1", 400));
        proposals.push(proposal("mine2", "Mine 2", 400));

        let viewer = "0xAbCd000000000000000000000000000000000001";
        let votes = vec![vote("mine1", &viewer.to_lowercase()), vote("mine2", &viewer.to_lowercase())];

        let default_recs = governance_heat(&proposals, &votes, now);
        assert!(default_recs.iter().all(|r| !r.title.starts_with("Mine")));

        // Case-insensitive voter match.
        let personalized = personalize(default_recs, &proposals, &votes, viewer);
        assert_eq!(personalized.len(), 5);
        assert_eq!(personalized[0].title, "Mine 1");
        assert_eq!(personalized[1].title, "Mine 2");
        assert_eq!(personalized[0].heat, 1.0);
        let titles: HashSet<&str> = personalized.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles.len(), 5);
    }

    #[test]
    fn test_staking_rank_counts_events_and_weights_stake() {
        let now = Utc::now();
        let events = vec![
            StakingEvent {
                contract_address: "0xaaa".to_string(),
                kind: StakingKind::Staked,
                user_address: "0x1".to_string(),
                amount: "2000000000000000000000".to_string(), // 2000 tokens
                duration: Some(3600),
                tx_hash: "0xt1".to_string(),
                ts: now,
            },
            StakingEvent {
                contract_address: "0xbbb".to_string(),
                kind: StakingKind::Claimed,
                user_address: "0x2".to_string(),
                amount: "1".to_string(),
                duration: None,
                tx_hash: "0xt2".to_string(),
                ts: now,
            },
        ];
        let ranks = staking_ranks(&events);
        assert_eq!(ranks.len(), 2);
        assert_eq!(ranks[0].contract, "0xaaa");
        // 1 event + 0.001 * 2000 tokens
        assert!((ranks[0].score - 3.0).abs() < 1e-9);
        assert!((ranks[1].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pool_rank_sums_both_legs_and_keeps_top_3() {
        let now = Utc::now();
        let mk = |pair: &str, a0: &str, a1: &str, tx: &str| LpEvent {
            pair_address: pair.to_string(),
            kind: LpKind::Swap,
            amount0: a0.to_string(),
            amount1: a1.to_string(),
            sender: "0x1".to_string(),
            receiver: None,
            tx_hash: tx.to_string(),
            ts: now,
        };
        let events = vec![
            mk("0xp1", "100", "50", "0xt1"),
            mk("0xp2", "10", "5", "0xt2"),
            mk("0xp3", "1", "1", "0xt3"),
            mk("0xp4", "1000", "0", "0xt4"),
        ];
        let ranks = pool_ranks(&events);
        assert_eq!(ranks.len(), 3);
        assert_eq!(ranks[0].pair, "0xp4");
        assert!((ranks[0].volume - 1000.0).abs() < 1e-9);
        assert_eq!(ranks[1].pair, "0xp1");
    }

    #[test]
    fn test_feed_items_are_time_ordered_and_capped() {
        let now = Utc::now();
        let proposals: Vec<Proposal> =
            (0..60).map(|i| proposal(&format!("p{}", i), &format!("P {}", i), i)).collect();
        let treasury: Vec<TreasuryTx> = (0..40)
            .map(|i| TreasuryTx {
                safe_address: "0xsafe".to_string(),
                tx_hash: format!("0xhash{}", i),
                to_address: "0x000000000000000000000000000000000000dead".to_string(),
                method: Some("execTransaction".to_string()),
                value: None,
                ts: now - Duration::minutes(i),
            })
            .collect();

        let items = build_items(&proposals, &treasury, &[], &[], &[], now);
        // 50 proposals + 30 treasury, both under the 120 total cap.
        assert_eq!(items.len(), 80);
        for pair in items.windows(2) {
            assert!(pair[0].ts >= pair[1].ts);
        }
        let treasury_item = items.iter().find(|i| i.kind == "treasury").unwrap();
        assert_eq!(
            treasury_item.link.as_deref(),
            Some("https://etherscan.io/tx/0xhash0")
        );
    }

    #[test]
    fn test_multibyte_addresses_truncate_on_char_boundaries() {
        // A multibyte char straddling the truncation point must not panic.
        let odd = "0x1234567→89";
        let short = short_addr(odd);
        assert!(short.starts_with("0x1234567"));

        let now = Utc::now();
        let treasury = vec![TreasuryTx {
            safe_address: "0xsafe".to_string(),
            tx_hash: "0xhash".to_string(),
            to_address: odd.to_string(),
            method: None,
            value: None,
            ts: now,
        }];
        let items = build_items(&[], &treasury, &[], &[], &[], now);
        assert_eq!(items.len(), 1);
        assert!(items[0].title.contains("0x1234567"));

        // Short addresses pass through untouched.
        assert_eq!(short_addr("0xabc"), "0xabc");
    }

    #[test]
    fn test_synthetic_social_urls_do_not_become_links() {
        let now = Utc::now();
        let posts = vec![SocialPost {
            project: "Bittensor".to_string(),
            platform: "info".to_string(),
            title: "Bittensor — updates".to_string(),
            url: "synthetic:Bittensor:info:abcdef".to_string(),
            ts: now,
        }];
        let items = build_items(&[], &[], &[], &[], &posts, now);
        assert_eq!(items.len(), 1);
        assert!(items[0].link.is_none());
        assert_eq!(items[0].source, "info");
    }
}
