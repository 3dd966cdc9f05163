//! Killboard - archive update and board rendering
//!
//! Usage:
//!   killboard [sync|boards]
//!
//! Modes:
//!   sync   - fetch new killmails for the roster, enrich the archive, then
//!            write board bundles (default)
//!   boards - only re-render board bundles from the archive, no network
//!
//! Environment variables: see `ArchiveConfig::from_env`.

use dotenv::dotenv;
use killboard::config::ArchiveConfig;
use killboard::fetcher::{Endpoints, Fetcher, HttpTransport, ResponseCache};
use killboard::roster::Roster;
use killboard::sync::{run_sync, write_boards};
use log::{error, info, warn};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sync,
    Boards,
}

fn parse_mode() -> Result<Mode, String> {
    match env::args().nth(1).as_deref() {
        None | Some("sync") => Ok(Mode::Sync),
        Some("boards") => Ok(Mode::Boards),
        Some(other) => Err(format!("unknown mode '{}' (expected sync or boards)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mode = parse_mode()?;
    let config = ArchiveConfig::from_env()?;

    info!("🚀 Killboard ({:?})", mode);
    info!("   ├─ Archive: {}", config.paths.data_dir.display());
    info!("   ├─ Roster: {}", config.paths.roster.display());
    info!("   └─ Boards: {}", config.paths.board_output_dir.display());

    let roster = Roster::load(&config.paths.roster)?;

    if mode == Mode::Sync {
        let cache = ResponseCache::open(&config.paths.http_cache)?;
        let purged = cache.purge_expired(chrono::Utc::now().timestamp())?;
        if purged > 0 {
            info!("🧹 Purged {} expired cached responses", purged);
        }

        let transport = HttpTransport::new(&config.user_agent, Some(cache), config.http_cache_ttl)?;
        let endpoints = Endpoints::new(&config.zkill_base_url, &config.esi_base_url);
        let mut fetcher = Fetcher::new(transport, endpoints, config.pacing);

        match run_sync(&config, &roster, &mut fetcher).await {
            Ok(report) => report.log_summary(),
            Err(e) => {
                error!("❌ Sync aborted, archive left unchanged: {}", e);
                return Err(e.into());
            }
        }
    }

    if roster.is_empty() {
        warn!("⚠️  Roster is empty, boards will only show the archive as-is");
    }
    write_boards(&config, &roster)?;

    info!("✅ Done");
    Ok(())
}
