//! Tracked roster and the static filter sets used by the boards

use crate::error::{KillboardError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Bijective display name <-> character id mapping.
///
/// Loaded once per run from a JSON object `{ "Name": character_id, ... }`.
/// A missing file is fatal, and so is an id that appears under two names.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_name: BTreeMap<String, u64>,
    by_id: HashMap<u64, String>,
}

impl Roster {
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut roster = Roster::default();

        for (name, id) in pairs {
            let name = name.into();
            if let Some(existing) = roster.by_id.get(&id) {
                return Err(KillboardError::Config(format!(
                    "roster id {} is listed as both '{}' and '{}'",
                    id, existing, name
                )));
            }
            if roster.by_name.contains_key(&name) {
                return Err(KillboardError::Config(format!(
                    "roster name '{}' is listed twice",
                    name
                )));
            }
            roster.by_id.insert(id, name.clone());
            roster.by_name.insert(name, id);
        }

        Ok(roster)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            KillboardError::Config(format!("cannot read roster {}: {}", path.display(), e))
        })?;
        let pairs: BTreeMap<String, u64> = serde_json::from_str(&json).map_err(|e| {
            KillboardError::Config(format!("roster {} is not a name -> id map: {}", path.display(), e))
        })?;

        let roster = Self::from_pairs(pairs)?;
        log::info!("👥 Loaded roster of {} characters from {}", roster.len(), path.display());
        Ok(roster)
    }

    pub fn id_of(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: u64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// True when the optional id belongs to a roster member.
    pub fn is_member(&self, id: Option<u64>) -> bool {
        id.map_or(false, |id| self.contains_id(id))
    }

    /// Members sorted by display name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Static id sets used only by the targets board.
#[derive(Debug, Clone, Default)]
pub struct FilterSets {
    pub target_alliances: HashSet<u64>,
    pub banned_ship_types: HashSet<u64>,
}

impl FilterSets {
    /// Load both sets. A missing file yields an empty set; a file that is not
    /// a JSON array of ids is a configuration error.
    pub fn load(target_alliances: &Path, banned_ship_types: &Path) -> Result<Self> {
        Ok(Self {
            target_alliances: load_id_set(target_alliances)?,
            banned_ship_types: load_id_set(banned_ship_types)?,
        })
    }
}

fn load_id_set(path: &Path) -> Result<HashSet<u64>> {
    if !path.exists() {
        log::warn!("⚠️  Filter set {} not found, using an empty set", path.display());
        return Ok(HashSet::new());
    }

    let json = fs::read_to_string(path)?;
    let ids: Vec<u64> = serde_json::from_str(&json).map_err(|e| {
        KillboardError::Config(format!("{} is not a JSON array of ids: {}", path.display(), e))
    })?;

    Ok(ids.into_iter().collect())
}
