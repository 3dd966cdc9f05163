//! Enrichment pipeline
//!
//! Five stages run in a fixed order over the whole store:
//!
//! 1. `Prune` - drop fields the boards never show, count attackers, keep only
//!    the final blow and roster attackers
//! 2. `Classify` - kill, loss or friendly-fire
//! 3. `AttributeNames` - character/corporation/alliance names for the victim
//!    and kept attackers, plus the involved-roster list
//! 4. `FormatValues` - abbreviated ISK value and minute-of-day sort key
//! 5. `ResolvePlaces` - victim ship type and solar system names
//!
//! Every stage has an explicit "already applied" predicate (`Stage::is_applied`)
//! checked before any mutation, so a record is never touched twice by the
//! same stage. Re-running over an enriched store is a no-op that makes no
//! upstream calls, and a run interrupted halfway resumes where it stopped.

pub mod format;

use crate::error::{KillboardError, Result};
use crate::model::{Category, EntityNames, KillRecord};
use crate::names::{NameCategory, NameLookup, NameResolver};
use crate::roster::Roster;

pub use format::abbreviate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prune,
    Classify,
    AttributeNames,
    FormatValues,
    ResolvePlaces,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::Prune,
        Stage::Classify,
        Stage::AttributeNames,
        Stage::FormatValues,
        Stage::ResolvePlaces,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Prune => "prune",
            Stage::Classify => "classify",
            Stage::AttributeNames => "attribute-names",
            Stage::FormatValues => "format-values",
            Stage::ResolvePlaces => "resolve-places",
        }
    }

    /// True when this stage's output is already present on the record.
    pub fn is_applied(&self, record: &KillRecord) -> bool {
        let derived = &record.derived;
        match self {
            Stage::Prune => derived.involved.is_some(),
            Stage::Classify => derived.category.is_some(),
            Stage::AttributeNames => {
                derived.roster_involved.is_some()
                    && record.victim.as_ref().map_or(false, |v| v.names.is_some())
            }
            Stage::FormatValues => derived.formatted_value.is_some() && derived.minute_of_day.is_some(),
            Stage::ResolvePlaces => {
                derived.solar_system_name.is_some()
                    && record
                        .victim
                        .as_ref()
                        .map_or(false, |v| v.ship_type_name.is_some())
            }
        }
    }
}

/// Records updated per stage in one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub pruned: usize,
    pub classified: usize,
    pub attributed: usize,
    pub formatted: usize,
    pub placed: usize,
}

impl PipelineReport {
    pub fn total(&self) -> usize {
        self.pruned + self.classified + self.attributed + self.formatted + self.placed
    }

    fn record(&mut self, stage: Stage, updated: usize) {
        match stage {
            Stage::Prune => self.pruned = updated,
            Stage::Classify => self.classified = updated,
            Stage::AttributeNames => self.attributed = updated,
            Stage::FormatValues => self.formatted = updated,
            Stage::ResolvePlaces => self.placed = updated,
        }
    }
}

pub struct EnrichmentPipeline<'a, L> {
    roster: &'a Roster,
    resolver: &'a mut NameResolver<L>,
}

impl<'a, L: NameLookup> EnrichmentPipeline<'a, L> {
    pub fn new(roster: &'a Roster, resolver: &'a mut NameResolver<L>) -> Self {
        Self { roster, resolver }
    }

    /// Run every stage over `records`, in order.
    ///
    /// Errors abort the run; records already updated keep their markers so
    /// the next run resumes after them.
    pub async fn run(&mut self, records: &mut [KillRecord]) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        for stage in Stage::ORDER {
            let mut updated = 0;

            for record in records.iter_mut() {
                if stage.is_applied(record) {
                    continue;
                }
                self.apply(stage, record).await?;
                updated += 1;
            }

            if updated > 0 {
                log::info!("🏷️  Stage {}: {} records updated", stage.name(), updated);
            } else {
                log::debug!("Stage {}: nothing to do", stage.name());
            }
            report.record(stage, updated);
        }

        Ok(report)
    }

    async fn apply(&mut self, stage: Stage, record: &mut KillRecord) -> Result<()> {
        match stage {
            Stage::Prune => prune(record, self.roster),
            Stage::Classify => classify(record, self.roster),
            Stage::AttributeNames => self.attribute_names(record).await,
            Stage::FormatValues => format_values(record),
            Stage::ResolvePlaces => self.resolve_places(record).await,
        }
    }

    async fn attribute_names(&mut self, record: &mut KillRecord) -> Result<()> {
        let killmail_id = record.killmail_id;
        let (victim, attackers) = match (record.victim.as_mut(), record.attackers.as_mut()) {
            (Some(victim), Some(attackers)) => (victim, attackers),
            _ => return Err(not_hydrated(killmail_id)),
        };

        let names = self
            .entity_names(victim.character_id, victim.corporation_id, victim.alliance_id)
            .await?;
        victim.names = Some(names);

        let mut involved = Vec::new();
        for attacker in attackers.iter_mut() {
            let names = self
                .entity_names(attacker.character_id, attacker.corporation_id, attacker.alliance_id)
                .await?;
            attacker.names = Some(names);

            if let Some(name) = attacker.character_id.and_then(|id| self.roster.name_of(id)) {
                involved.push(name.to_string());
            }
        }

        if let Some(final_blow) = record.derived.final_blow.as_mut() {
            let names = self
                .entity_names(final_blow.character_id, final_blow.corporation_id, final_blow.alliance_id)
                .await?;
            final_blow.names = Some(names);
        }

        record.derived.roster_involved_html = Some(involved.join("<BR>"));
        record.derived.roster_involved = Some(involved);
        Ok(())
    }

    async fn resolve_places(&mut self, record: &mut KillRecord) -> Result<()> {
        let killmail_id = record.killmail_id;
        let system_id = record.solar_system_id.ok_or_else(|| not_hydrated(killmail_id))?;
        let victim = record.victim.as_mut().ok_or_else(|| not_hydrated(killmail_id))?;

        if victim.ship_type_name.is_none() {
            let name = self
                .resolver
                .resolve(NameCategory::ShipType, victim.ship_type_id)
                .await?;
            victim.ship_type_name = Some(name);
        }

        if record.derived.solar_system_name.is_none() {
            let name = self.resolver.resolve(NameCategory::SolarSystem, system_id).await?;
            record.derived.solar_system_name = Some(name);
        }

        Ok(())
    }

    async fn entity_names(
        &mut self,
        character: Option<u64>,
        corporation: Option<u64>,
        alliance: Option<u64>,
    ) -> Result<EntityNames> {
        Ok(EntityNames {
            character: self.resolver.resolve_opt(NameCategory::Character, character).await?,
            corporation: self.resolver.resolve_opt(NameCategory::Corporation, corporation).await?,
            alliance: self.resolver.resolve_opt(NameCategory::Alliance, alliance).await?,
        })
    }
}

fn prune(record: &mut KillRecord, roster: &Roster) -> Result<()> {
    if record.victim.is_none() {
        return Err(not_hydrated(record.killmail_id));
    }
    let attackers = record
        .attackers
        .take()
        .ok_or_else(|| not_hydrated(record.killmail_id))?;

    record.moon_id = None;
    record.zkb.points = None;
    record.zkb.awox = None;
    if let Some(victim) = record.victim.as_mut() {
        victim.position = None;
        victim.items = None;
    }

    record.derived.involved = Some(attackers.len());

    let mut kept = Vec::new();
    for mut attacker in attackers {
        if !attacker.final_blow && !roster.is_member(attacker.character_id) {
            continue;
        }
        attacker.damage_done = None;
        attacker.security_status = None;
        if attacker.final_blow {
            record.derived.final_blow = Some(attacker.clone());
        }
        kept.push(attacker);
    }

    record.attackers = Some(kept);
    Ok(())
}

fn classify(record: &mut KillRecord, roster: &Roster) -> Result<()> {
    let (victim, attackers) = match (record.victim.as_ref(), record.attackers.as_ref()) {
        (Some(victim), Some(attackers)) => (victim, attackers),
        _ => return Err(not_hydrated(record.killmail_id)),
    };

    let category = if roster.is_member(victim.character_id) {
        if attackers.iter().any(|a| roster.is_member(a.character_id)) {
            Category::FriendlyFire
        } else {
            Category::Loss
        }
    } else {
        Category::Kill
    };

    record.derived.category = Some(category);
    Ok(())
}

fn format_values(record: &mut KillRecord) -> Result<()> {
    let minute_of_day = record.minute_of_day().ok_or_else(|| {
        KillboardError::malformed(format!("killmail {} has no timestamp", record.killmail_id))
    })?;

    if record.derived.formatted_value.is_none() {
        record.derived.formatted_value = Some(abbreviate(record.zkb.total_value));
    }
    if record.derived.minute_of_day.is_none() {
        record.derived.minute_of_day = Some(minute_of_day);
    }
    Ok(())
}

fn not_hydrated(killmail_id: u64) -> KillboardError {
    KillboardError::malformed(format!(
        "killmail {} has no victim/attacker breakdown",
        killmail_id
    ))
}
