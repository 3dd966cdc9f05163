//! One archive update: listings, detail hydration, enrichment, persistence
//!
//! Nothing is written back until every step has succeeded. A run that aborts
//! leaves `history.json` and the name caches exactly as they were, apart from
//! creating them empty on the very first run.

use crate::aggregator::Board;
use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::fetcher::{FetchStats, Fetcher, Transport};
use crate::model::KillRecord;
use crate::names::{NameCaches, NameCategory, NameResolver};
use crate::pipeline::{EnrichmentPipeline, PipelineReport};
use crate::roster::{FilterSets, Roster};
use crate::store::{write_json_atomic, HistoryStore};
use std::path::PathBuf;

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub listing_pages: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub details_hydrated: usize,
    pub pipeline: PipelineReport,
    pub name_lookups: usize,
    pub fetch: FetchStats,
    pub archive_size: usize,
}

impl SyncReport {
    pub fn log_summary(&self) {
        log::info!("✅ Sync complete");
        log::info!("   ├─ Listing pages: {}", self.listing_pages);
        log::info!(
            "   ├─ New killmails: {} ({} already archived)",
            self.appended,
            self.duplicates
        );
        log::info!("   ├─ Details hydrated: {}", self.details_hydrated);
        log::info!(
            "   ├─ Enriched: prune {}, classify {}, names {}, values {}, places {}",
            self.pipeline.pruned,
            self.pipeline.classified,
            self.pipeline.attributed,
            self.pipeline.formatted,
            self.pipeline.placed
        );
        log::info!("   ├─ Name lookups: {}", self.name_lookups);
        log::info!(
            "   ├─ Requests: {} ({} from cache, {} retries)",
            self.fetch.requests,
            self.fetch.cache_hits,
            self.fetch.retries
        );
        log::info!("   └─ Archive size: {} killmails", self.archive_size);
    }
}

/// Update the archive for every roster member.
///
/// Arguments:
/// - `config`: archive locations
/// - `roster`: tracked characters; also seeds the character name cache
/// - `fetcher`: upstream access, shared by listings, details and names
pub async fn run_sync<T: Transport>(
    config: &ArchiveConfig,
    roster: &Roster,
    fetcher: &mut Fetcher<T>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    let mut store = HistoryStore::load(&config.paths.history_file())?;
    let caches = NameCaches::load(&config.paths.data_dir)?;

    for (name, character_id) in roster.iter() {
        let listing = fetcher.endpoints().character_listing(character_id);
        log::info!("👤 Updating {} ({})", name, character_id);

        let pages = fetcher.fetch_all_pages(&listing).await?;
        report.listing_pages += pages.len();

        let incoming = pages
            .into_iter()
            .flatten()
            .map(KillRecord::from_raw)
            .collect::<Result<Vec<_>>>()?;

        let outcome = store.merge(incoming);
        report.appended += outcome.appended;
        report.duplicates += outcome.duplicates;
        log::debug!(
            "   └─ {} new, {} duplicates for {}",
            outcome.appended,
            outcome.duplicates,
            name
        );
    }

    report.details_hydrated = hydrate_details(&mut store, fetcher).await?;

    let mut resolver = NameResolver::new(caches, &mut *fetcher);
    resolver.seed(NameCategory::Character, roster.iter());

    report.pipeline = EnrichmentPipeline::new(roster, &mut resolver)
        .run(store.records_mut())
        .await?;
    report.name_lookups = resolver.lookups_issued();
    let (caches, _) = resolver.into_parts();

    store.persist()?;
    caches.persist()?;
    log::info!("💾 Saved archive and name caches to {}", config.paths.data_dir.display());

    report.fetch = fetcher.stats();
    report.archive_size = store.len();
    Ok(report)
}

/// Merge the ESI breakdown into every record that only has listing data.
async fn hydrate_details<T: Transport>(store: &mut HistoryStore, fetcher: &mut Fetcher<T>) -> Result<usize> {
    let pending: Vec<(usize, u64, String)> = store
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_hydrated())
        .map(|(idx, r)| (idx, r.killmail_id, r.zkb.hash.clone()))
        .collect();

    if pending.is_empty() {
        return Ok(0);
    }
    log::info!("🔎 Hydrating {} killmails", pending.len());

    for (idx, killmail_id, hash) in &pending {
        let detail = fetcher.fetch_detail(*killmail_id, hash).await?;
        store.records_mut()[*idx].apply_detail(detail)?;
    }

    Ok(pending.len())
}

/// Render every board bundle from the persisted archive.
///
/// Writes `index.json` (overall), `<character_id>.json` per roster member
/// and `targets.json` into the board output directory. Returns the files
/// written.
pub fn write_boards(config: &ArchiveConfig, roster: &Roster) -> Result<Vec<PathBuf>> {
    let store = HistoryStore::load(&config.paths.history_file())?;
    let filters = FilterSets::load(&config.paths.target_alliances, &config.paths.banned_ship_types)?;
    let out_dir = &config.paths.board_output_dir;
    let mut written = Vec::new();

    let overall = Board::overall(store.records(), roster, &config.board_name);
    let path = out_dir.join("index.json");
    write_json_atomic(&path, &overall.bundle())?;
    written.push(path);

    for (_, character_id) in roster.iter() {
        let board = Board::for_member(store.records(), roster, character_id)?;
        let path = out_dir.join(format!("{}.json", character_id));
        write_json_atomic(&path, &board.bundle())?;
        written.push(path);
    }

    let targets = Board::targets(
        store.records(),
        roster,
        &filters,
        &format!("{} Targets", config.board_name),
    );
    let path = out_dir.join("targets.json");
    write_json_atomic(&path, &targets.bundle())?;
    written.push(path);

    log::info!("📊 Wrote {} boards to {}", written.len(), out_dir.display());
    Ok(written)
}
