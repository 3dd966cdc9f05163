//! Killboard archive
//!
//! Keeps a local, deduplicated archive of killmails for a roster of tracked
//! characters, enriches each record in resumable stages, and renders board
//! view models from it.
//!
//! - `fetcher` - paced, retrying access to zKillboard and ESI
//! - `store` - append-only `history.json`
//! - `pipeline` - the five enrichment stages
//! - `names` - persistent id -> name caches
//! - `aggregator` - board views
//! - `sync` - one full update run

pub mod aggregator;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod migrate;
pub mod model;
pub mod names;
pub mod pipeline;
pub mod roster;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use error::{KillboardError, Result};
