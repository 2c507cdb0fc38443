//! Lead Compliance API Library
//!
//! Pre-validates and accepts insurance leads: state allow-lists, 30-day
//! duplicate suppression, a pluggable set of compliance checkers (DNC lists,
//! TCPA litigator list, phone validation, TrustedForm), dialer forwarding
//! and CSV batch tooling.
//!
//! # Modules
//!
//! - `api`: HTTP-facing re-exports.
//! - `core`: Domain-layer re-exports.
//! - `integrations`: External service re-exports.
//! - `admission`: Bounded admission pool and chunked processing.
//! - `auth`: API key validation.
//! - `batch`: CSV batch compliance.
//! - `bulk_claim`: TrustedForm bulk certificate claiming.
//! - `checkers`: Compliance checker implementations.
//! - `circuit_breaker`: Circuit breaker for dialer forwarding.
//! - `config`: Configuration management.
//! - `csv_records`: CSV parsing, header aliasing and export.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres store.
//! - `dialer_client`: Internal dialer and Pitch BPO forwarding.
//! - `duplicate`: Duplicate lead lookup.
//! - `engine`: Compliance engine (fan-out over checkers).
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `memory_store`: In-memory store for tests and offline tools.
//! - `models`: Core data models.
//! - `normalize`: Phone, email and postal normalization.
//! - `postback_handler`: Policy status postbacks.
//! - `pre_ping`: Pre-ping decision.
//! - `rejection_log`: Background rejection logger.
//! - `retry`: Retry with exponential backoff.
//! - `routing_cache`: list_id -> vertical cache.
//! - `store`: Storage traits.

pub mod api;
pub mod core;
pub mod integrations;

pub mod admission;
pub mod auth;
pub mod batch;
pub mod bulk_claim;
pub mod checkers;
pub mod circuit_breaker;
pub mod config;
pub mod csv_records;
pub mod db;
pub mod db_storage;
pub mod dialer_client;
pub mod duplicate;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod normalize;
pub mod postback_handler;
pub mod pre_ping;
pub mod rejection_log;
pub mod retry;
pub mod routing_cache;
pub mod store;
