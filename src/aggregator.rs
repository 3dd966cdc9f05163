//! Board views over an enriched archive
//!
//! A `Board` is a filtered slice of the history plus the roster context it is
//! shown with. Its `bundle()` is the view model handed to the presentation
//! layer: category counts, abbreviated ISK sums and the day-grouped history.

use crate::error::{KillboardError, Result};
use crate::model::{Category, KillRecord};
use crate::pipeline::abbreviate;
use crate::roster::{FilterSets, Roster};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Records of one UTC calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DayGroup<'a> {
    /// `YYYY-MM-DD`
    pub day: NaiveDate,
    /// Display label, e.g. "October 15, 2016"
    pub label: String,
    pub records: Vec<&'a KillRecord>,
}

/// Group records matching `predicate` by calendar day.
///
/// Days are returned newest first. Within a day records are ordered by minute
/// of day, latest first; records sharing a minute keep reverse insertion
/// order, so the most recently archived comes first.
pub fn grouped_by_day<'a, P>(records: &'a [KillRecord], predicate: P) -> Vec<DayGroup<'a>>
where
    P: Fn(&KillRecord) -> bool,
{
    let mut days: BTreeMap<NaiveDate, Vec<&'a KillRecord>> = BTreeMap::new();

    for record in records.iter().rev().filter(|r| predicate(r)) {
        match record.killmail_time {
            Some(time) => days.entry(time.date_naive()).or_default().push(record),
            None => log::warn!(
                "⚠️  Killmail {} has no timestamp, left out of history",
                record.killmail_id
            ),
        }
    }

    days.into_iter()
        .rev()
        .map(|(day, mut records)| {
            // stable: ties keep reverse insertion order
            records.sort_by_key(|r| std::cmp::Reverse(sort_minute(r)));
            DayGroup {
                day,
                label: day.format("%B %-d, %Y").to_string(),
                records,
            }
        })
        .collect()
}

fn sort_minute(record: &KillRecord) -> u32 {
    record
        .derived
        .minute_of_day
        .or_else(|| record.minute_of_day())
        .unwrap_or(0)
}

/// One board variant: the records it shows and how it is labelled.
#[derive(Debug, Clone)]
pub struct Board<'a> {
    records: Vec<KillRecord>,
    roster: &'a Roster,
    board_name: String,
    character_count: usize,
}

impl<'a> Board<'a> {
    /// Every archived record, labelled with the configured board name.
    pub fn overall(records: &[KillRecord], roster: &'a Roster, board_name: &str) -> Self {
        Self {
            records: records.to_vec(),
            roster,
            board_name: board_name.to_string(),
            character_count: roster.len(),
        }
    }

    /// Records where `member_id` is the victim or among the roster attackers.
    pub fn for_member(records: &[KillRecord], roster: &'a Roster, member_id: u64) -> Result<Self> {
        let name = roster.name_of(member_id).ok_or_else(|| {
            KillboardError::Config(format!("character {} is not on the roster", member_id))
        })?;

        let records = records
            .iter()
            .filter(|r| {
                r.victim_character_id() == Some(member_id)
                    || r.derived
                        .roster_involved
                        .as_ref()
                        .map_or(false, |names| names.iter().any(|n| n == name))
            })
            .cloned()
            .collect();

        Ok(Self {
            records,
            roster,
            board_name: name.to_string(),
            character_count: 1,
        })
    }

    /// Records whose victim flies for a target alliance in a ship type that
    /// isn't banned from the board.
    pub fn targets(
        records: &[KillRecord],
        roster: &'a Roster,
        filters: &FilterSets,
        board_name: &str,
    ) -> Self {
        let records = records
            .iter()
            .filter(|r| match r.victim.as_ref() {
                Some(victim) => {
                    victim
                        .alliance_id
                        .map_or(false, |id| filters.target_alliances.contains(&id))
                        && !filters.banned_ship_types.contains(&victim.ship_type_id)
                }
                None => false,
            })
            .cloned()
            .collect();

        Self {
            records,
            roster,
            board_name: board_name.to_string(),
            character_count: roster.len(),
        }
    }

    pub fn records(&self) -> &[KillRecord] {
        &self.records
    }

    pub fn count_by_category(&self, category: Category) -> usize {
        self.records
            .iter()
            .filter(|r| r.category() == Some(category))
            .count()
    }

    /// Abbreviated ISK total of `category` records. Friendly fire counts
    /// towards both kills and losses.
    pub fn sum_value(&self, category: Category) -> String {
        let total: f64 = self
            .records
            .iter()
            .filter(|r| matches!(r.category(), Some(c) if c == category || c == Category::FriendlyFire))
            .map(|r| r.zkb.total_value)
            .sum();
        abbreviate(total)
    }

    pub fn history(&self) -> Vec<DayGroup<'_>> {
        grouped_by_day(&self.records, |_| true)
    }

    pub fn bundle(&self) -> BoardBundle<'_> {
        BoardBundle {
            kills: self.count_by_category(Category::Kill),
            losses: self.count_by_category(Category::Loss),
            history: self.history(),
            characters: self.roster.iter().collect(),
            money_lost: self.sum_value(Category::Loss),
            money_killed: self.sum_value(Category::Kill),
            friendly_fire: self.count_by_category(Category::FriendlyFire),
            character_count: self.character_count,
            board_name: self.board_name.clone(),
        }
    }
}

/// View model for one board.
#[derive(Debug, Clone, Serialize)]
pub struct BoardBundle<'a> {
    pub kills: usize,
    pub losses: usize,
    pub history: Vec<DayGroup<'a>>,
    /// Roster as (name, character id), sorted by name
    pub characters: Vec<(&'a str, u64)>,
    pub money_lost: String,
    pub money_killed: String,
    pub friendly_fire: usize,
    pub character_count: usize,
    pub board_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{attacker, hydrated_record};

    const ALICE: u64 = 90000001;
    const BOB: u64 = 90000002;

    fn roster() -> Roster {
        Roster::from_pairs([("Alice Alpha", ALICE), ("Bob Beta", BOB)]).unwrap()
    }

    fn tagged(id: u64, time: &str, victim: Option<u64>, category: Category, value: f64, involved: &[&str]) -> KillRecord {
        let mut record = hydrated_record(id, time, victim, vec![attacker(None, true)], value);
        record.derived.category = Some(category);
        record.derived.minute_of_day = record.minute_of_day();
        record.derived.roster_involved = Some(involved.iter().map(|s| s.to_string()).collect());
        record
    }

    fn archive() -> Vec<KillRecord> {
        vec![
            tagged(1, "2016-10-15T01:40:00Z", Some(7), Category::Kill, 1_000_000.0, &["Alice Alpha"]),
            tagged(2, "2016-10-15T08:20:00Z", Some(BOB), Category::Loss, 500_000.0, &[]),
            tagged(3, "2016-10-16T02:00:00Z", Some(BOB), Category::FriendlyFire, 250_000.0, &["Alice Alpha"]),
            tagged(4, "2016-10-15T01:40:00Z", Some(8), Category::Kill, 2_000_000.0, &["Bob Beta"]),
        ]
    }

    #[test]
    fn test_grouped_by_day_ordering() {
        let records = archive();
        let groups = grouped_by_day(&records, |_| true);

        let days: Vec<String> = groups.iter().map(|g| g.day.to_string()).collect();
        assert_eq!(days, vec!["2016-10-16", "2016-10-15"]);
        assert_eq!(groups[1].label, "October 15, 2016");

        // minute 500 before minute 100; the 100 tie lists the later insert first
        let ids: Vec<u64> = groups[1].records.iter().map(|r| r.killmail_id).collect();
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[test]
    fn test_grouped_by_day_predicate_and_missing_time() {
        let mut records = archive();
        records.push(KillRecord::from_listing(5, crate::model::Zkb::new("h5", 1.0)));

        let groups = grouped_by_day(&records, |r| r.category() == Some(Category::Kill));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].records.len(), 2);
    }

    #[test]
    fn test_counts_and_sums() {
        let records = archive();
        let roster = roster();
        let board = Board::overall(&records, &roster, "Polyhedra");

        assert_eq!(board.count_by_category(Category::Kill), 2);
        assert_eq!(board.count_by_category(Category::Loss), 1);
        assert_eq!(board.count_by_category(Category::FriendlyFire), 1);
        assert_eq!(board.sum_value(Category::Kill), "3.25m");
        assert_eq!(board.sum_value(Category::Loss), "750k");

        let bundle = board.bundle();
        assert_eq!(bundle.character_count, 2);
        assert_eq!(bundle.characters, vec![("Alice Alpha", ALICE), ("Bob Beta", BOB)]);
        assert_eq!(bundle.board_name, "Polyhedra");
    }

    #[test]
    fn test_member_board_filter() {
        let records = archive();
        let roster = roster();

        let alice = Board::for_member(&records, &roster, ALICE).unwrap();
        let ids: Vec<u64> = alice.records().iter().map(|r| r.killmail_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(alice.bundle().board_name, "Alice Alpha");
        assert_eq!(alice.bundle().character_count, 1);

        let bob = Board::for_member(&records, &roster, BOB).unwrap();
        let ids: Vec<u64> = bob.records().iter().map(|r| r.killmail_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        assert!(Board::for_member(&records, &roster, 1).is_err());
    }

    #[test]
    fn test_targets_board() {
        let mut records = archive();
        records[1].victim.as_mut().unwrap().alliance_id = Some(99000002);
        records[3].victim.as_mut().unwrap().ship_type_id = 670;

        let roster = roster();
        let filters = FilterSets {
            target_alliances: [99000001].into_iter().collect(),
            banned_ship_types: [670].into_iter().collect(),
        };

        let board = Board::targets(&records, &roster, &filters, "Targets");
        let ids: Vec<u64> = board.records().iter().map(|r| r.killmail_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
