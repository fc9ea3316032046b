//! Attribution Ledger
//!
//! A deterministic, append-only, hash-chained ledger for attributing value
//! movement across a multi-tenant card-room platform: settlements, time
//! fees, adjustments, and bonuses, with invariant checking, revenue
//! reporting, and a risk-insight layer over already-aggregated rollups.
//!
//! Callers own concurrency: the store is a plain struct, wrapped externally
//! in a mutex or rwlock by the binary that embeds it.

pub mod boundary;
pub mod checksum;
pub mod config;
pub mod ids;
pub mod invariants;
pub mod recorder;
pub mod revenue;
pub mod risk;
pub mod store;
pub mod view;
