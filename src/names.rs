//! Identifier -> display name resolution backed by persistent caches
//!
//! One cache per category, each a JSON object `{ "<id>": "<name>" }` in the
//! archive directory. Caches only grow. They are loaded at the start of a
//! run, filled on cache misses, and written back once after a successful
//! run.

use crate::error::Result;
use crate::store::write_json_atomic;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameCategory {
    ShipType,
    SolarSystem,
    Character,
    Corporation,
    Alliance,
}

impl NameCategory {
    pub const ALL: [NameCategory; 5] = [
        NameCategory::ShipType,
        NameCategory::SolarSystem,
        NameCategory::Character,
        NameCategory::Corporation,
        NameCategory::Alliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NameCategory::ShipType => "ship type",
            NameCategory::SolarSystem => "solar system",
            NameCategory::Character => "character",
            NameCategory::Corporation => "corporation",
            NameCategory::Alliance => "alliance",
        }
    }

    /// Cache file name inside the archive directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            NameCategory::ShipType => "ship_lookup.json",
            NameCategory::SolarSystem => "solarsystem_lookup.json",
            NameCategory::Character => "character_lookup.json",
            NameCategory::Corporation => "corporation_lookup.json",
            NameCategory::Alliance => "alliance_lookup.json",
        }
    }

    fn index(&self) -> usize {
        match self {
            NameCategory::ShipType => 0,
            NameCategory::SolarSystem => 1,
            NameCategory::Character => 2,
            NameCategory::Corporation => 3,
            NameCategory::Alliance => 4,
        }
    }
}

/// Monotonically growing id -> name map for one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameCache {
    entries: BTreeMap<u64, String>,
}

impl NameCache {
    /// Load a cache file, creating it as `{}` when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            write_json_atomic(path, &BTreeMap::<u64, String>::new())?;
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)?;
        let entries: BTreeMap<u64, String> = serde_json::from_str(&json)?;
        Ok(Self { entries })
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.entries)
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    /// Record a name. Existing entries are kept.
    pub fn insert(&mut self, id: u64, name: String) {
        self.entries.entry(id).or_insert(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The five category caches and the directory they live in.
#[derive(Debug, Clone)]
pub struct NameCaches {
    dir: PathBuf,
    caches: [NameCache; 5],
}

impl NameCaches {
    pub fn load(dir: &Path) -> Result<Self> {
        let mut caches: [NameCache; 5] = Default::default();
        for category in NameCategory::ALL {
            caches[category.index()] = NameCache::load(&dir.join(category.file_name()))?;
        }

        let total: usize = caches.iter().map(NameCache::len).sum();
        log::info!("📇 Loaded {} cached names from {}", total, dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            caches,
        })
    }

    /// Empty caches that persist into `dir`.
    pub fn empty(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            caches: Default::default(),
        }
    }

    /// Rewrite every cache file wholesale.
    pub fn persist(&self) -> Result<()> {
        for category in NameCategory::ALL {
            self.get(category).persist(&self.dir.join(category.file_name()))?;
        }
        Ok(())
    }

    pub fn get(&self, category: NameCategory) -> &NameCache {
        &self.caches[category.index()]
    }

    pub fn get_mut(&mut self, category: NameCategory) -> &mut NameCache {
        &mut self.caches[category.index()]
    }
}

/// Upstream name lookup for a single identifier.
#[async_trait]
pub trait NameLookup: Send {
    async fn lookup_name(&mut self, category: NameCategory, id: u64) -> Result<String>;
}

#[async_trait]
impl<L: NameLookup + ?Sized> NameLookup for &mut L {
    async fn lookup_name(&mut self, category: NameCategory, id: u64) -> Result<String> {
        (**self).lookup_name(category, id).await
    }
}

/// Cache-first name resolution.
///
/// A miss issues exactly one upstream lookup; the answer is cached for the
/// rest of the run and persisted with the caches. Lookup failures propagate.
pub struct NameResolver<L> {
    caches: NameCaches,
    lookup: L,
    lookups_issued: usize,
}

impl<L: NameLookup> NameResolver<L> {
    pub fn new(caches: NameCaches, lookup: L) -> Self {
        Self {
            caches,
            lookup,
            lookups_issued: 0,
        }
    }

    pub async fn resolve(&mut self, category: NameCategory, id: u64) -> Result<String> {
        if let Some(name) = self.caches.get(category).get(id) {
            return Ok(name.to_string());
        }

        log::debug!("Resolving {} {} upstream", category.as_str(), id);
        let name = self.lookup.lookup_name(category, id).await?;
        self.lookups_issued += 1;
        self.caches.get_mut(category).insert(id, name.clone());
        Ok(name)
    }

    /// Resolve an optional id; `None` stays `None` without a lookup.
    pub async fn resolve_opt(&mut self, category: NameCategory, id: Option<u64>) -> Result<Option<String>> {
        match id {
            Some(id) => self.resolve(category, id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Pre-populate a category with names known locally.
    pub fn seed<'a, I>(&mut self, category: NameCategory, entries: I)
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let cache = self.caches.get_mut(category);
        for (name, id) in entries {
            cache.insert(id, name.to_string());
        }
    }

    /// Upstream lookups issued since construction.
    pub fn lookups_issued(&self) -> usize {
        self.lookups_issued
    }

    pub fn caches(&self) -> &NameCaches {
        &self.caches
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn into_parts(self) -> (NameCaches, L) {
        (self.caches, self.lookup)
    }
}
