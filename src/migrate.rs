//! One-time conversion of legacy archive records
//!
//! Older archives were written from the zKillboard v1 payload: camelCase keys
//! (`killID`, `killTime`, `solarSystemID`), names inline on every participant
//! (`characterName`), `finalBlow: 1`, ids of `0` meaning "none", and pipeline
//! tags such as `row_type: "row-kill"` or `formatted_price`. Records in that
//! shape are rewritten into the canonical schema while the history store
//! loads; the next persist writes canonical records only.

use crate::error::{KillboardError, Result};
use crate::model::{Attacker, Category, Derived, EntityNames, KillRecord, Victim, Zkb};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// Keys that only ever appear in legacy records.
const LEGACY_MARKERS: &[&str] = &[
    "killID",
    "killTime",
    "solarSystemID",
    "row_type",
    "our_characters",
    "formatted_price",
    "solarSystemName",
];

const LEGACY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn is_legacy(raw: &Value) -> bool {
    raw.as_object()
        .map_or(false, |obj| LEGACY_MARKERS.iter().any(|key| obj.contains_key(*key)))
}

/// Parse one stored record, migrating it first when it is in legacy shape.
///
/// Returns the record and whether a migration happened.
pub fn canonicalize(raw: Value) -> Result<(KillRecord, bool)> {
    if is_legacy(&raw) {
        return migrate_legacy(raw).map(|record| (record, true));
    }

    let record = serde_json::from_value(raw)
        .map_err(|e| KillboardError::malformed(format!("archived record does not parse: {}", e)))?;
    Ok((record, false))
}

fn migrate_legacy(raw: Value) -> Result<KillRecord> {
    let obj = match raw {
        Value::Object(obj) => obj,
        other => {
            return Err(KillboardError::malformed(format!(
                "archived record is not an object: {}",
                other
            )))
        }
    };

    let killmail_id = id_field(&obj, &["killmail_id", "killID"])?
        .ok_or_else(|| KillboardError::malformed("legacy record without killID"))?;

    let zkb: Zkb = match obj.get("zkb") {
        Some(zkb) => serde_json::from_value(zkb.clone()).map_err(|e| {
            KillboardError::malformed(format!("legacy record {} has bad zkb: {}", killmail_id, e))
        })?,
        None => {
            return Err(KillboardError::malformed(format!(
                "legacy record {} has no zkb block",
                killmail_id
            )))
        }
    };

    let killmail_time = legacy_time(&obj, killmail_id)?;

    let victim = match field(&obj, &["victim"]) {
        Some(Value::Object(v)) => Some(migrate_victim(v, killmail_id)?),
        Some(_) => return Err(shape_error(killmail_id, "victim")),
        None => None,
    };

    let attackers = match field(&obj, &["attackers"]) {
        Some(Value::Array(list)) => Some(
            list.iter()
                .map(|a| match a {
                    Value::Object(a) => migrate_attacker(a, killmail_id),
                    _ => Err(shape_error(killmail_id, "attackers")),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => return Err(shape_error(killmail_id, "attackers")),
        None => None,
    };

    let final_blow = match field(&obj, &["final_blow"]) {
        Some(Value::Object(a)) => Some(migrate_attacker(a, killmail_id)?),
        Some(_) => return Err(shape_error(killmail_id, "final_blow")),
        None => None,
    };

    let category = match obj.get("row_type").and_then(Value::as_str) {
        Some("row-kill") => Some(Category::Kill),
        Some("row-loss") => Some(Category::Loss),
        Some("row-friendlyfire") => Some(Category::FriendlyFire),
        Some(other) => {
            return Err(KillboardError::malformed(format!(
                "legacy record {} has unknown row_type '{}'",
                killmail_id, other
            )))
        }
        None => None,
    };

    let roster_involved = match obj.get("our_characters") {
        Some(Value::Array(names)) => Some(
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>(),
        ),
        _ => None,
    };

    let derived = Derived {
        involved: obj
            .get("involved")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
        final_blow,
        category,
        roster_involved_html: roster_involved
            .as_ref()
            .map(|_| text_field(&obj, "our_involved_html").unwrap_or_default()),
        roster_involved,
        formatted_value: text_field(&obj, "formatted_price"),
        minute_of_day: None,
        solar_system_name: text_field(&obj, "solarSystemName"),
    };

    Ok(KillRecord {
        killmail_id,
        zkb,
        killmail_time,
        solar_system_id: id_field(&obj, &["solar_system_id", "solarSystemID"])?,
        moon_id: id_field(&obj, &["moon_id", "moonID"])?,
        war_id: id_field(&obj, &["war_id", "warID"])?,
        victim,
        attackers,
        derived,
    })
}

fn migrate_victim(v: &Map<String, Value>, killmail_id: u64) -> Result<Victim> {
    let ship_type_id = id_field(v, &["ship_type_id", "shipTypeID"])?
        .ok_or_else(|| shape_error(killmail_id, "victim.shipTypeID"))?;

    Ok(Victim {
        character_id: id_field(v, &["character_id", "characterID"])?,
        corporation_id: id_field(v, &["corporation_id", "corporationID"])?,
        alliance_id: id_field(v, &["alliance_id", "allianceID"])?,
        faction_id: id_field(v, &["faction_id", "factionID"])?,
        ship_type_id,
        damage_taken: id_field(v, &["damage_taken", "damageTaken"])?,
        // archived records were already pruned for display
        items: None,
        position: None,
        names: participant_names(v),
        ship_type_name: text_field(v, "shipTypeName"),
    })
}

fn migrate_attacker(a: &Map<String, Value>, killmail_id: u64) -> Result<Attacker> {
    let final_blow = match field(a, &["final_blow", "finalBlow"]) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        None => false,
        Some(_) => return Err(shape_error(killmail_id, "attacker.finalBlow")),
    };

    Ok(Attacker {
        character_id: id_field(a, &["character_id", "characterID"])?,
        corporation_id: id_field(a, &["corporation_id", "corporationID"])?,
        alliance_id: id_field(a, &["alliance_id", "allianceID"])?,
        faction_id: id_field(a, &["faction_id", "factionID"])?,
        ship_type_id: id_field(a, &["ship_type_id", "shipTypeID"])?,
        weapon_type_id: id_field(a, &["weapon_type_id", "weaponTypeID"])?,
        damage_done: id_field(a, &["damage_done", "damageDone"])?,
        security_status: field(a, &["security_status", "securityStatus"]).and_then(Value::as_f64),
        final_blow,
        names: participant_names(a),
    })
}

/// Inline legacy names, or None when the participant carried none.
fn participant_names(obj: &Map<String, Value>) -> Option<EntityNames> {
    let names = EntityNames {
        character: text_field(obj, "characterName"),
        corporation: text_field(obj, "corporationName"),
        alliance: text_field(obj, "allianceName"),
    };

    if names == EntityNames::default() {
        None
    } else {
        Some(names)
    }
}

fn legacy_time(obj: &Map<String, Value>, killmail_id: u64) -> Result<Option<DateTime<Utc>>> {
    if let Some(raw) = obj.get("killmail_time").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| shape_error(killmail_id, "killmail_time"));
    }

    match obj.get("killTime").and_then(Value::as_str) {
        Some(raw) => NaiveDateTime::parse_from_str(raw, LEGACY_TIME_FORMAT)
            .map(|t| Some(t.and_utc()))
            .map_err(|_| shape_error(killmail_id, "killTime")),
        None => Ok(None),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// Numeric id under any of `keys`. Legacy payloads use 0 for "none" and
/// occasionally quote ids.
fn id_field(obj: &Map<String, Value>, keys: &[&str]) -> Result<Option<u64>> {
    let id = match field(obj, keys) {
        None => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        Some(_) => None,
    };

    match id {
        Some(0) => Ok(None),
        Some(id) => Ok(Some(id)),
        None => Err(KillboardError::malformed(format!(
            "legacy field {} is not a numeric id",
            keys[0]
        ))),
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn shape_error(killmail_id: u64, what: &str) -> KillboardError {
    KillboardError::malformed(format!("legacy record {} has malformed {}", killmail_id, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    fn legacy_record() -> Value {
        json!({
            "killID": 55000001,
            "solarSystemID": 30002022,
            "killTime": "2016-10-15 21:43:11",
            "moonID": 0,
            "victim": {
                "shipTypeID": 603,
                "characterID": 90000001,
                "characterName": "Alice Alpha",
                "corporationID": 98000001,
                "corporationName": "Alpha Corp",
                "allianceID": 0,
                "allianceName": "",
                "damageTaken": 2750,
                "shipTypeName": "Merlin",
                "items": [{ "typeID": 2048 }]
            },
            "attackers": [
                {
                    "characterID": 91000001,
                    "characterName": "Hostile",
                    "corporationID": 98000009,
                    "corporationName": "Hostile Corp",
                    "allianceID": 99000009,
                    "allianceName": "Hostile Alliance",
                    "securityStatus": -2.1,
                    "damageDone": 2750,
                    "finalBlow": 1,
                    "shipTypeID": 587,
                    "weaponTypeID": 2881
                }
            ],
            "zkb": { "locationID": 40000001, "hash": "cafe", "totalValue": 12500000.5, "points": 3 },
            "involved": 1,
            "row_type": "row-loss",
            "our_characters": [],
            "our_involved_html": "",
            "formatted_price": "12.5m",
            "solarSystemName": "Jita"
        })
    }

    #[test]
    fn test_legacy_detection() {
        assert!(is_legacy(&legacy_record()));
        assert!(!is_legacy(&json!({ "killmail_id": 1, "zkb": { "hash": "h", "totalValue": 1.0 } })));
        assert!(!is_legacy(&json!([1, 2])));
    }

    #[test]
    fn test_migrate_legacy_record() {
        let (record, migrated) = canonicalize(legacy_record()).unwrap();
        assert!(migrated);

        assert_eq!(record.killmail_id, 55000001);
        assert_eq!(record.solar_system_id, Some(30002022));
        assert_eq!(record.moon_id, None);
        assert_eq!(record.killmail_time.unwrap().hour(), 21);

        let victim = record.victim.as_ref().unwrap();
        assert_eq!(victim.character_id, Some(90000001));
        assert_eq!(victim.alliance_id, None);
        assert_eq!(victim.ship_type_name.as_deref(), Some("Merlin"));
        assert!(victim.items.is_none());
        let names = victim.names.as_ref().unwrap();
        assert_eq!(names.character.as_deref(), Some("Alice Alpha"));
        assert_eq!(names.alliance, None);

        let attackers = record.attackers.as_ref().unwrap();
        assert!(attackers[0].final_blow);
        assert_eq!(attackers[0].weapon_type_id, Some(2881));

        assert_eq!(record.derived.category, Some(Category::Loss));
        assert_eq!(record.derived.involved, Some(1));
        assert_eq!(record.derived.roster_involved, Some(vec![]));
        assert_eq!(record.derived.roster_involved_html.as_deref(), Some(""));
        assert_eq!(record.derived.formatted_value.as_deref(), Some("12.5m"));
        assert_eq!(record.derived.solar_system_name.as_deref(), Some("Jita"));
        assert_eq!(record.derived.minute_of_day, None);
    }

    #[test]
    fn test_canonical_record_passes_through() {
        let raw = json!({
            "killmail_id": 7,
            "zkb": { "hash": "h", "totalValue": 1.0 },
            "derived": { "category": "kill" }
        });

        let (record, migrated) = canonicalize(raw).unwrap();
        assert!(!migrated);
        assert_eq!(record.derived.category, Some(Category::Kill));
    }

    #[test]
    fn test_unknown_row_type_rejected() {
        let mut raw = legacy_record();
        raw["row_type"] = json!("row-mystery");
        assert!(matches!(canonicalize(raw), Err(KillboardError::Malformed(_))));
    }
}
