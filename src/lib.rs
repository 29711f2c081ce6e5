//! # DAO Pulse SDK
//!
//! A Rust library for ingesting and aggregating DAO activity across on-chain
//! and off-chain venues into a single ranked activity feed. The SDK provides
//! the ingestion layer (event subscriptions, source polling, idempotent
//! persistence) and the read layer (recency-weighted recommendations plus a
//! merged time-ordered feed).
//!
//! ## Overview
//!
//! The pipeline has three stages:
//!
//! - **Ingestion**: WebSocket log listeners per subscribed contract and a
//!   fixed-cadence poll scheduler over HTTP sources (Snapshot, Tally, Safe).
//! - **Normalization & Storage**: every raw record is normalized into a
//!   canonical entity and written through single-statement `ON CONFLICT`
//!   upserts, so re-delivery from any source is a no-op.
//! - **Aggregation**: a stateless feed service reads bounded recent windows
//!   and computes governance heat, staking/pool ranks, trending agents and
//!   the merged feed per request.
//!
//! Ingestion never blocks on aggregation and a degraded source degrades only
//! its own slice of the data.

// Core Types
/// Canonical entities and derived feed output shapes
pub mod entities;
/// Raw-record normalization into canonical entities
pub mod normalizer;

// Ingestion Layer
/// WebSocket log listeners with capped-backoff reconnection
pub mod chain_listener;
/// Fixed-cadence polling over all configured source drivers
pub mod scheduler;
/// HTTP source drivers (Snapshot, Tally, Safe, tracked agents)
pub mod sources;
/// Shared retry policy with exponential backoff and jitter
pub mod retry;

// Storage Layer
/// Postgres store: idempotent upserts and bounded-window reads
pub mod database;

// Read Layer
/// Ranking functions and the feed assembly service
pub mod feed;

// Configuration
/// Config.toml + environment override settings
pub mod settings;

pub use chain_listener::{ChainListener, TargetKind};
pub use database::DbPool;
pub use entities::{FeedResponse, Ingest};
pub use feed::FeedService;
pub use retry::RetryPolicy;
pub use scheduler::PollScheduler;
pub use settings::Settings;
