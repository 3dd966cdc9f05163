//! Run configuration from environment variables
//!
//! Every value has a default so a bare checkout works against the public
//! zKillboard and ESI endpoints. `.env` is loaded by the binary before
//! `ArchiveConfig::from_env` runs.

use crate::error::{KillboardError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Politeness delays applied by the fetcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    /// Minimum gap between two requests (skipped after a cache hit)
    pub request_delay: Duration,

    /// Fixed wait before the single retry of a failed request
    pub retry_backoff: Duration,
}

impl Pacing {
    /// No waiting at all. Used by offline runs and tests.
    pub fn immediate() -> Self {
        Self {
            request_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(1_000),
            retry_backoff: Duration::from_millis(10_000),
        }
    }
}

/// File locations of the archive and its inputs.
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    /// Directory holding history.json and the five name caches
    pub data_dir: PathBuf,

    /// Roster file: `{ "Name": character_id, ... }`
    pub roster: PathBuf,

    /// JSON array of alliance ids for the targets board
    pub target_alliances: PathBuf,

    /// JSON array of ship type ids excluded from the targets board
    pub banned_ship_types: PathBuf,

    /// Where board bundles are written for the presentation layer
    pub board_output_dir: PathBuf,

    /// SQLite file backing the HTTP response cache
    pub http_cache: PathBuf,
}

impl ArchivePaths {
    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub paths: ArchivePaths,

    /// zKillboard API root, without trailing slash
    pub zkill_base_url: String,

    /// ESI API root, without trailing slash
    pub esi_base_url: String,

    pub pacing: Pacing,

    /// Freshness of cached responses lacking a Cache-Control max-age
    pub http_cache_ttl: Duration,

    pub user_agent: String,

    /// Display name of the overall board
    pub board_name: String,
}

impl ArchiveConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `KILLBOARD_DATA_DIR` (default: out/data)
    /// - `KILLBOARD_ROSTER` (default: data/characters.json)
    /// - `KILLBOARD_TARGET_ALLIANCES` (default: data/target_alliances.json)
    /// - `KILLBOARD_BANNED_SHIPS` (default: data/banned_ships.json)
    /// - `KILLBOARD_BOARD_DIR` (default: out/boards)
    /// - `KILLBOARD_HTTP_CACHE` (default: .web_cache/responses.db)
    /// - `ZKILL_BASE_URL` (default: https://zkillboard.com/api)
    /// - `ESI_BASE_URL` (default: https://esi.evetech.net/latest)
    /// - `REQUEST_DELAY_MS` (default: 1000)
    /// - `RETRY_BACKOFF_MS` (default: 10000)
    /// - `HTTP_CACHE_TTL_SECS` (default: 3600)
    /// - `KILLBOARD_USER_AGENT` (default: killboard/<version>)
    /// - `BOARD_NAME` (default: Polyhedra)
    pub fn from_env() -> Result<Self> {
        let paths = ArchivePaths {
            data_dir: env_path("KILLBOARD_DATA_DIR", "out/data"),
            roster: env_path("KILLBOARD_ROSTER", "data/characters.json"),
            target_alliances: env_path("KILLBOARD_TARGET_ALLIANCES", "data/target_alliances.json"),
            banned_ship_types: env_path("KILLBOARD_BANNED_SHIPS", "data/banned_ships.json"),
            board_output_dir: env_path("KILLBOARD_BOARD_DIR", "out/boards"),
            http_cache: env_path("KILLBOARD_HTTP_CACHE", ".web_cache/responses.db"),
        };

        let pacing = Pacing {
            request_delay: Duration::from_millis(env_parse("REQUEST_DELAY_MS", 1_000u64)?),
            retry_backoff: Duration::from_millis(env_parse("RETRY_BACKOFF_MS", 10_000u64)?),
        };

        Ok(Self {
            paths,
            zkill_base_url: env_url("ZKILL_BASE_URL", "https://zkillboard.com/api")?,
            esi_base_url: env_url("ESI_BASE_URL", "https://esi.evetech.net/latest")?,
            pacing,
            http_cache_ttl: Duration::from_secs(env_parse("HTTP_CACHE_TTL_SECS", 3_600u64)?),
            user_agent: env::var("KILLBOARD_USER_AGENT")
                .unwrap_or_else(|_| format!("killboard/{}", env!("CARGO_PKG_VERSION"))),
            board_name: env::var("BOARD_NAME").unwrap_or_else(|_| "Polyhedra".to_string()),
        })
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| KillboardError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_url(key: &str, default: &str) -> Result<String> {
    let url = env::var(key).unwrap_or_else(|_| default.to_string());

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(KillboardError::Config(format!(
            "{} must start with http:// or https://",
            key
        )));
    }

    Ok(url.trim_end_matches('/').to_string())
}
