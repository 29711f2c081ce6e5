//! # PostgreSQL Store Adapter
//!
//! Idempotent persistence for every canonical entity plus the bounded-window
//! read path used by the ranking engine.
//!
//! ## Write contract
//!
//! Every write is a single-statement `INSERT ... ON CONFLICT`, never a
//! read-then-write. Append-only entities use `DO NOTHING` (re-delivery is a
//! no-op), proposals use `DO UPDATE` (latest ingested status/title wins). Any
//! other store failure propagates to the caller, which decides whether to
//! retry or drop the record.

use crate::entities::{
    Ingest, LpEvent, LpKind, Proposal, SocialPost, StakingEvent, StakingKind, TreasuryTx, Vote,
};
use anyhow::{Context, Result};
use log::{info, warn};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};
use std::env;
use std::time::Duration;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name.
pub const SCHEMA: &str = "dao_pulse";

/// Connect to the database with bounded retry, then initialize the schema.
///
/// This is the only operation in the crate treated as fatal: if the store is
/// unreachable after all attempts the error surfaces to the invoking process.
pub async fn connect() -> Result<DbPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                info!(
                    "✅ Connected to database (attempt {}/{})",
                    attempt, max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(pool);
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        // Backoff with cap: 400ms, 800ms, ... ~12.8s
        let delay_ms = (1u64 << attempt.min(6)) * 200;
        warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt, max_attempts, delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

/// Create the schema and tables on first run. Guarded by an advisory lock so
/// concurrent instances do not race the DDL.
pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x44414F50554C53; // "DAOPULS"

    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(&mut *conn)
        .await?;

    let result = create_tables(&mut conn).await;

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(&mut *conn)
        .await?;

    result
}

async fn create_tables(conn: &mut sqlx::pool::PoolConnection<Postgres>) -> Result<()> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(&mut **conn)
        .await?;

    let ddl = [
        format!(
            "CREATE TABLE IF NOT EXISTS {}.proposals (
                id TEXT NOT NULL,
                source TEXT NOT NULL,
                org TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                link TEXT,
                start_ts TIMESTAMPTZ,
                end_ts TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (source, id)
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.votes (
                proposal_id TEXT NOT NULL,
                voter TEXT NOT NULL,
                weight TEXT NOT NULL DEFAULT '0',
                direction TEXT NOT NULL DEFAULT '',
                tx_hash TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (proposal_id, voter, tx_hash)
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.safe_txs (
                tx_hash TEXT PRIMARY KEY,
                safe_address TEXT NOT NULL,
                to_address TEXT NOT NULL DEFAULT '',
                method TEXT,
                value TEXT,
                ts TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.staking_events (
                tx_hash TEXT PRIMARY KEY,
                contract_address TEXT NOT NULL,
                kind TEXT NOT NULL,
                user_address TEXT NOT NULL,
                amount TEXT NOT NULL DEFAULT '0',
                duration BIGINT,
                ts TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.lp_events (
                tx_hash TEXT PRIMARY KEY,
                pair_address TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount0 TEXT NOT NULL DEFAULT '0',
                amount1 TEXT NOT NULL DEFAULT '0',
                sender TEXT NOT NULL DEFAULT '',
                receiver TEXT,
                ts TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.social_posts (
                project TEXT NOT NULL,
                platform TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (project, platform, url)
            )",
            SCHEMA
        ),
    ];
    for stmt in &ddl {
        sqlx::query(stmt).execute(&mut **conn).await?;
    }

    info!("✅ Schema `{}` ready", SCHEMA);
    Ok(())
}

// ---------------------------------------------------------------------------
// Write path (idempotent upserts)
// ---------------------------------------------------------------------------

/// Dispatch one normalized record to its entity-specific upsert.
pub async fn ingest(pool: &DbPool, record: &Ingest) -> Result<()> {
    match record {
        Ingest::Proposal(p) => upsert_proposal(pool, p).await,
        Ingest::Vote(v) => insert_vote(pool, v).await,
        Ingest::Treasury(t) => insert_treasury_tx(pool, t).await,
        Ingest::Staking(s) => insert_staking_event(pool, s).await,
        Ingest::Lp(l) => insert_lp_event(pool, l).await,
        Ingest::Social(s) => insert_social_post(pool, s).await,
    }
}

/// Insert or update a proposal. Re-ingestion overwrites the mutable fields
/// (title/body/status/link); `created_at` keeps its first-insert value.
pub async fn upsert_proposal(pool: &DbPool, p: &Proposal) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.proposals (id, source, org, title, body, status, link, start_ts, end_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (source, id) DO UPDATE SET
            title = EXCLUDED.title,
            body = EXCLUDED.body,
            status = EXCLUDED.status,
            link = EXCLUDED.link",
        SCHEMA
    ))
    .bind(&p.id)
    .bind(&p.source)
    .bind(&p.org)
    .bind(&p.title)
    .bind(&p.body)
    .bind(&p.status)
    .bind(&p.link)
    .bind(p.start_ts)
    .bind(p.end_ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_vote(pool: &DbPool, v: &Vote) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.votes (proposal_id, voter, weight, direction, tx_hash, ts)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (proposal_id, voter, tx_hash) DO NOTHING",
        SCHEMA
    ))
    .bind(&v.proposal_id)
    .bind(&v.voter)
    .bind(&v.weight)
    .bind(&v.direction)
    .bind(&v.tx_hash)
    .bind(v.ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_treasury_tx(pool: &DbPool, t: &TreasuryTx) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.safe_txs (tx_hash, safe_address, to_address, method, value, ts)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (tx_hash) DO NOTHING",
        SCHEMA
    ))
    .bind(&t.tx_hash)
    .bind(&t.safe_address)
    .bind(&t.to_address)
    .bind(&t.method)
    .bind(&t.value)
    .bind(t.ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_staking_event(pool: &DbPool, s: &StakingEvent) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.staking_events (tx_hash, contract_address, kind, user_address, amount, duration, ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (tx_hash) DO NOTHING",
        SCHEMA
    ))
    .bind(&s.tx_hash)
    .bind(&s.contract_address)
    .bind(s.kind.as_str())
    .bind(&s.user_address)
    .bind(&s.amount)
    .bind(s.duration)
    .bind(s.ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_lp_event(pool: &DbPool, l: &LpEvent) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.lp_events (tx_hash, pair_address, kind, amount0, amount1, sender, receiver, ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (tx_hash) DO NOTHING",
        SCHEMA
    ))
    .bind(&l.tx_hash)
    .bind(&l.pair_address)
    .bind(l.kind.as_str())
    .bind(&l.amount0)
    .bind(&l.amount1)
    .bind(&l.sender)
    .bind(&l.receiver)
    .bind(l.ts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_social_post(pool: &DbPool, s: &SocialPost) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {}.social_posts (project, platform, title, url, ts)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (project, platform, url) DO NOTHING",
        SCHEMA
    ))
    .bind(&s.project)
    .bind(&s.platform)
    .bind(&s.title)
    .bind(&s.url)
    .bind(s.ts)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read path (bounded windows, ordered by timestamp)
// ---------------------------------------------------------------------------

/// Latest proposals for the configured orgs, newest first.
pub async fn recent_proposals(pool: &DbPool, orgs: &[String], limit: i64) -> Result<Vec<Proposal>> {
    let rows = sqlx::query(&format!(
        "SELECT id, source, org, title, body, status, link, start_ts, end_ts, created_at
         FROM {}.proposals
         WHERE org = ANY($1)
         ORDER BY created_at DESC
         LIMIT $2",
        SCHEMA
    ))
    .bind(orgs.to_vec())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Proposal {
                id: row.try_get("id")?,
                source: row.try_get("source")?,
                org: row.try_get("org")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                status: row.try_get("status")?,
                link: row.try_get("link")?,
                start_ts: row.try_get("start_ts")?,
                end_ts: row.try_get("end_ts")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// Votes cast within the last `hours` hours.
pub async fn recent_votes(pool: &DbPool, hours: i64) -> Result<Vec<Vote>> {
    let rows = sqlx::query(&format!(
        "SELECT proposal_id, voter, weight, direction, tx_hash, ts
         FROM {}.votes
         WHERE ts > NOW() - INTERVAL '{} hours'",
        SCHEMA, hours
    ))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Vote {
                proposal_id: row.try_get("proposal_id")?,
                voter: row.try_get("voter")?,
                weight: row.try_get("weight")?,
                direction: row.try_get("direction")?,
                tx_hash: row.try_get("tx_hash")?,
                ts: row.try_get("ts")?,
            })
        })
        .collect()
}

pub async fn recent_staking_events(
    pool: &DbPool,
    hours: i64,
    limit: i64,
) -> Result<Vec<StakingEvent>> {
    let rows = sqlx::query(&format!(
        "SELECT tx_hash, contract_address, kind, user_address, amount, duration, ts
         FROM {}.staking_events
         WHERE ts > NOW() - INTERVAL '{} hours'
         ORDER BY ts DESC
         LIMIT $1",
        SCHEMA, hours
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in &rows {
        let kind_str: String = row.try_get("kind")?;
        // Unknown kind would mean a foreign writer touched the table; skip it.
        let Some(kind) = StakingKind::parse(&kind_str) else {
            warn!("skipping staking event with unknown kind `{}`", kind_str);
            continue;
        };
        events.push(StakingEvent {
            tx_hash: row.try_get("tx_hash")?,
            contract_address: row.try_get("contract_address")?,
            kind,
            user_address: row.try_get("user_address")?,
            amount: row.try_get("amount")?,
            duration: row.try_get("duration")?,
            ts: row.try_get("ts")?,
        });
    }
    Ok(events)
}

pub async fn recent_lp_events(pool: &DbPool, hours: i64, limit: i64) -> Result<Vec<LpEvent>> {
    let rows = sqlx::query(&format!(
        "SELECT tx_hash, pair_address, kind, amount0, amount1, sender, receiver, ts
         FROM {}.lp_events
         WHERE ts > NOW() - INTERVAL '{} hours'
         ORDER BY ts DESC
         LIMIT $1",
        SCHEMA, hours
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in &rows {
        let kind_str: String = row.try_get("kind")?;
        let Some(kind) = LpKind::parse(&kind_str) else {
            warn!("skipping LP event with unknown kind `{}`", kind_str);
            continue;
        };
        events.push(LpEvent {
            tx_hash: row.try_get("tx_hash")?,
            pair_address: row.try_get("pair_address")?,
            kind,
            amount0: row.try_get("amount0")?,
            amount1: row.try_get("amount1")?,
            sender: row.try_get("sender")?,
            receiver: row.try_get("receiver")?,
            ts: row.try_get("ts")?,
        });
    }
    Ok(events)
}

pub async fn recent_treasury_txs(pool: &DbPool, hours: i64, limit: i64) -> Result<Vec<TreasuryTx>> {
    let rows = sqlx::query(&format!(
        "SELECT tx_hash, safe_address, to_address, method, value, ts
         FROM {}.safe_txs
         WHERE ts > NOW() - INTERVAL '{} hours'
         ORDER BY ts DESC
         LIMIT $1",
        SCHEMA, hours
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TreasuryTx {
                tx_hash: row.try_get("tx_hash")?,
                safe_address: row.try_get("safe_address")?,
                to_address: row.try_get("to_address")?,
                method: row.try_get("method")?,
                value: row.try_get("value")?,
                ts: row.try_get("ts")?,
            })
        })
        .collect()
}

pub async fn recent_social_posts(pool: &DbPool, hours: i64, limit: i64) -> Result<Vec<SocialPost>> {
    let rows = sqlx::query(&format!(
        "SELECT project, platform, title, url, ts
         FROM {}.social_posts
         WHERE ts > NOW() - INTERVAL '{} hours'
         ORDER BY ts DESC
         LIMIT $1",
        SCHEMA, hours
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SocialPost {
                project: row.try_get("project")?,
                platform: row.try_get("platform")?,
                title: row.try_get("title")?,
                url: row.try_get("url")?,
                ts: row.try_get("ts")?,
            })
        })
        .collect()
}
