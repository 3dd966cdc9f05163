//! Shared fixtures for unit tests

use crate::error::Result;
use crate::fetcher::{Response, Transport};
use crate::model::{Attacker, KillRecord, Victim, Zkb};
use crate::names::{NameCategory, NameLookup};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Transport answering from per-URL queues of canned responses.
///
/// Queued responses are consumed in order; the last one for a URL repeats.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: HashMap<String, VecDeque<Response>>,
    pub calls: Vec<String>,
    pub confirmed: Vec<String>,
}

impl ScriptedTransport {
    pub fn raw(&mut self, url: &str, status: u16, body: &[u8]) {
        self.push(url, Response {
            status,
            body: body.to_vec(),
            from_cache: false,
        });
    }

    pub fn json(&mut self, url: &str, value: Value) {
        self.push(url, Response {
            status: 200,
            body: value.to_string().into_bytes(),
            from_cache: false,
        });
    }

    pub fn cached_json(&mut self, url: &str, value: Value) {
        self.push(url, Response {
            status: 200,
            body: value.to_string().into_bytes(),
            from_cache: true,
        });
    }

    fn push(&mut self, url: &str, response: Response) {
        self.responses.entry(url.to_string()).or_default().push_back(response);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&mut self, url: &str) -> Result<Response> {
        self.calls.push(url.to_string());

        let queue = match self.responses.get_mut(url) {
            Some(queue) if !queue.is_empty() => queue,
            _ => {
                return Ok(Response {
                    status: 404,
                    body: Vec::new(),
                    from_cache: false,
                })
            }
        };

        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue[0].clone())
        }
    }

    fn confirm(&mut self, url: &str) -> Result<()> {
        self.confirmed.push(url.to_string());
        Ok(())
    }
}

pub fn attacker(character_id: Option<u64>, final_blow: bool) -> Attacker {
    Attacker {
        character_id,
        corporation_id: character_id.map(|id| id + 1_000_000),
        alliance_id: None,
        faction_id: None,
        ship_type_id: Some(587),
        weapon_type_id: Some(2881),
        damage_done: Some(100),
        security_status: Some(-1.0),
        final_blow,
        names: None,
    }
}

/// A hydrated record with the given victim and attackers.
pub fn hydrated_record(
    killmail_id: u64,
    time: &str,
    victim_id: Option<u64>,
    attackers: Vec<Attacker>,
    value: f64,
) -> KillRecord {
    let mut record = KillRecord::from_listing(killmail_id, Zkb::new(format!("h{}", killmail_id), value));
    record.killmail_time = Some(
        DateTime::parse_from_rfc3339(time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|e| panic!("bad test time {}: {}", time, e)),
    );
    record.solar_system_id = Some(30000142);
    record.moon_id = Some(40000001);
    record.victim = Some(Victim {
        character_id: victim_id,
        corporation_id: victim_id.map(|id| id + 1_000_000),
        alliance_id: Some(99000001),
        faction_id: None,
        ship_type_id: 603,
        damage_taken: Some(100),
        items: Some(serde_json::json!([{ "item_type_id": 1 }])),
        position: Some(serde_json::json!({ "x": 1.0, "y": 2.0, "z": 3.0 })),
        names: None,
        ship_type_name: None,
    });
    record.attackers = Some(attackers);
    record
}

/// Name lookup that invents a name for every id and records each call.
#[derive(Default)]
pub struct CountingLookup {
    pub calls: Vec<(NameCategory, u64)>,
}

#[async_trait]
impl NameLookup for CountingLookup {
    async fn lookup_name(&mut self, category: NameCategory, id: u64) -> Result<String> {
        self.calls.push((category, id));
        Ok(format!("{} #{}", category.as_str(), id))
    }
}
