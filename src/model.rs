//! Killmail records in the canonical archive schema
//!
//! Field names follow ESI (snake_case, numeric ids). Upstream data arrives in
//! two steps: the zKillboard listing carries only `killmail_id` and `zkb`, and
//! the ESI detail call fills in time, location, victim and attackers. The
//! `derived` block is owned by the enrichment pipeline.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Row category of a killmail relative to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Kill,
    Loss,
    FriendlyFire,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Kill => "kill",
            Category::Loss => "loss",
            Category::FriendlyFire => "friendly-fire",
        }
    }
}

/// zKillboard metadata attached to every listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zkb {
    pub hash: String,

    #[serde(rename = "totalValue")]
    pub total_value: f64,

    #[serde(rename = "locationID", default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<u64>,

    #[serde(rename = "fittedValue", default, skip_serializing_if = "Option::is_none")]
    pub fitted_value: Option<f64>,

    #[serde(rename = "droppedValue", default, skip_serializing_if = "Option::is_none")]
    pub dropped_value: Option<f64>,

    #[serde(rename = "destroyedValue", default, skip_serializing_if = "Option::is_none")]
    pub destroyed_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solo: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awox: Option<bool>,
}

impl Zkb {
    pub fn new(hash: impl Into<String>, total_value: f64) -> Self {
        Self {
            hash: hash.into(),
            total_value,
            location_id: None,
            fitted_value: None,
            dropped_value: None,
            destroyed_value: None,
            points: None,
            npc: None,
            solo: None,
            awox: None,
        }
    }
}

/// Resolved display names for one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityNames {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corporation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corporation_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<u64>,

    pub ship_type_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_taken: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<EntityNames>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attacker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corporation_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_type_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_type_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_done: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_status: Option<f64>,

    pub final_blow: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<EntityNames>,
}

/// Fields computed by the enrichment pipeline. Each `Some` is a stage marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    /// Attacker count before pruning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub involved: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_blow: Option<Attacker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Roster members among the attackers, by display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster_involved: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster_involved_html: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_value: Option<String>,

    /// Minutes since midnight (UTC) of the kill
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute_of_day: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_system_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillRecord {
    pub killmail_id: u64,

    pub zkb: Zkb,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killmail_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_system_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moon_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub war_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim: Option<Victim>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attackers: Option<Vec<Attacker>>,

    #[serde(default)]
    pub derived: Derived,
}

/// ESI killmail breakdown as returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KillDetail {
    pub killmail_id: u64,
    pub killmail_time: DateTime<Utc>,
    pub solar_system_id: u64,
    #[serde(default)]
    pub moon_id: Option<u64>,
    #[serde(default)]
    pub war_id: Option<u64>,
    pub victim: Victim,
    pub attackers: Vec<Attacker>,
}

impl KillRecord {
    /// A bare listing entry, before detail hydration.
    pub fn from_listing(killmail_id: u64, zkb: Zkb) -> Self {
        Self {
            killmail_id,
            zkb,
            killmail_time: None,
            solar_system_id: None,
            moon_id: None,
            war_id: None,
            victim: None,
            attackers: None,
            derived: Derived::default(),
        }
    }

    /// Parse one raw listing entry, rejecting shapes that don't fit.
    pub fn from_raw(raw: serde_json::Value) -> crate::Result<Self> {
        let id_hint = raw.get("killmail_id").cloned();
        serde_json::from_value(raw).map_err(|e| {
            crate::KillboardError::malformed(format!(
                "listing entry {} does not parse: {}",
                id_hint.map(|v| v.to_string()).unwrap_or_else(|| "<no id>".to_string()),
                e
            ))
        })
    }

    /// True once the ESI breakdown has been merged in.
    pub fn is_hydrated(&self) -> bool {
        self.attackers.is_some()
    }

    /// Merge an ESI breakdown into this record.
    pub fn apply_detail(&mut self, detail: KillDetail) -> crate::Result<()> {
        if detail.killmail_id != self.killmail_id {
            return Err(crate::KillboardError::malformed(format!(
                "detail for killmail {} returned id {}",
                self.killmail_id, detail.killmail_id
            )));
        }

        self.killmail_time = Some(detail.killmail_time);
        self.solar_system_id = Some(detail.solar_system_id);
        self.moon_id = detail.moon_id;
        self.war_id = detail.war_id;
        self.victim = Some(detail.victim);
        self.attackers = Some(detail.attackers);
        Ok(())
    }

    pub fn category(&self) -> Option<Category> {
        self.derived.category
    }

    pub fn victim_character_id(&self) -> Option<u64> {
        self.victim.as_ref().and_then(|v| v.character_id)
    }

    /// Minutes since midnight of the kill timestamp.
    pub fn minute_of_day(&self) -> Option<u32> {
        self.killmail_time.map(|t| t.hour() * 60 + t.minute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_entry_parses() {
        let raw = json!({
            "killmail_id": 81000001,
            "zkb": {
                "locationID": 40000001,
                "hash": "abc123",
                "fittedValue": 10.5,
                "totalValue": 25000000.0,
                "points": 1,
                "npc": false,
                "solo": true,
                "awox": false,
                "labels": ["pvp"]
            }
        });

        let record = KillRecord::from_raw(raw).unwrap();
        assert_eq!(record.killmail_id, 81000001);
        assert_eq!(record.zkb.hash, "abc123");
        assert_eq!(record.zkb.total_value, 25_000_000.0);
        assert_eq!(record.zkb.location_id, Some(40000001));
        assert!(!record.is_hydrated());
        assert_eq!(record.derived, Derived::default());
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let missing_hash = json!({ "killmail_id": 1, "zkb": { "totalValue": 1.0 } });
        assert!(matches!(
            KillRecord::from_raw(missing_hash),
            Err(crate::KillboardError::Malformed(_))
        ));

        let string_id = json!({ "killmail_id": "1", "zkb": { "hash": "h", "totalValue": 1.0 } });
        assert!(KillRecord::from_raw(string_id).is_err());
    }

    #[test]
    fn test_apply_detail() {
        let mut record = KillRecord::from_raw(json!({
            "killmail_id": 5,
            "zkb": { "hash": "h", "totalValue": 1.0 }
        }))
        .unwrap();

        let detail: KillDetail = serde_json::from_value(json!({
            "killmail_id": 5,
            "killmail_time": "2016-10-15T21:43:11Z",
            "solar_system_id": 30002022,
            "moon_id": 40000002,
            "victim": {
                "character_id": 90000001,
                "corporation_id": 98000001,
                "damage_taken": 3000,
                "ship_type_id": 603,
                "position": { "x": 1.0, "y": 2.0, "z": 3.0 }
            },
            "attackers": [
                { "character_id": 90000002, "damage_done": 3000, "final_blow": true, "security_status": -1.5 }
            ]
        }))
        .unwrap();

        record.apply_detail(detail).unwrap();
        assert!(record.is_hydrated());
        assert_eq!(record.solar_system_id, Some(30002022));
        assert_eq!(record.victim_character_id(), Some(90000001));
        assert_eq!(record.minute_of_day(), Some(21 * 60 + 43));
    }

    #[test]
    fn test_detail_for_other_killmail_rejected() {
        let mut record = KillRecord::from_listing(5, Zkb::new("h", 1.0));

        let detail: KillDetail = serde_json::from_value(json!({
            "killmail_id": 6,
            "killmail_time": "2016-10-15T21:43:11Z",
            "solar_system_id": 1,
            "victim": { "ship_type_id": 603 },
            "attackers": []
        }))
        .unwrap();

        assert!(record.apply_detail(detail).is_err());
        assert!(!record.is_hydrated());
    }

    #[test]
    fn test_category_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&Category::FriendlyFire).unwrap(), "\"friendly-fire\"");
        assert_eq!(Category::Loss.as_str(), "loss");
    }
}
