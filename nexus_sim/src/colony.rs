// The session aggregate and its command surface.
//
// `ColonyState` is everything one cooperative session owns: the ledger, the
// grid, open challenges, the construction queue, era and prestige standing,
// and the tick accumulators. It is plain data; the catalog and config are
// passed into every operation so sessions share one immutable content set.
//
// **Critical constraint: single mutator.** All commands and the tick run on
// the session's owning thread. Each command validates and mutates inside
// one call, so a successful validation can never be invalidated before its
// own mutation applies.

use crate::catalog::{BuildingDef, Catalog};
use crate::challenge::{
    self, Challenge, ChallengeBook, Verdict, build_cost, demolish_cost, demolish_refund,
    spam_tax, upgrade_cost,
};
use crate::config::GameConfig;
use crate::grid::{GridMap, PlaceError};
use crate::modifiers::ModifierSet;
use crate::note::{ColonyNote, NoteKind};
use crate::progression::{EraError, can_unlock_next_era};
use crate::resources::ResourceBag;
use crate::types::{BuildingTypeId, Cell, ChallengeId, ChallengeKind, EraId, InstanceId, PlayerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a command was refused.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown building type {0}")]
    UnknownBuilding(BuildingTypeId),
    #[error("unknown building instance {0}")]
    UnknownInstance(InstanceId),
    #[error("unknown challenge {0}")]
    UnknownChallenge(ChallengeId),
    #[error("{0} is locked until the {1} era")]
    EraLocked(BuildingTypeId, EraId),
    #[error("colony already holds the maximum of {max}")]
    MaxCountReached { max: usize },
    #[error("not enough resources (need {need:?})")]
    NotEnoughResources { need: ResourceBag },
    #[error(transparent)]
    Placement(#[from] PlaceError),
    #[error("the colony has collapsed")]
    Collapsed,
}

/// What a player asks a challenge to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeRequest {
    Build {
        building_type: BuildingTypeId,
        /// Preferred origin; the completion step falls back to a scan if
        /// the cell is taken by then.
        placement: Option<Cell>,
    },
    Upgrade { instance: InstanceId },
    Demolish { instance: InstanceId },
}

impl ChallengeRequest {
    pub fn kind(&self) -> ChallengeKind {
        match self {
            ChallengeRequest::Build { .. } => ChallengeKind::Build,
            ChallengeRequest::Upgrade { .. } => ChallengeKind::Upgrade,
            ChallengeRequest::Demolish { .. } => ChallengeKind::Demolish,
        }
    }
}

/// Receipt returned when a challenge opens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeTicket {
    pub id: ChallengeId,
    pub kind: ChallengeKind,
    pub difficulty: u32,
    pub need: f64,
    pub expires_at_tick: u64,
    pub cost: ResourceBag,
}

/// Receipt returned when an era unlocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EraTicket {
    pub era: EraId,
    pub prestige_level: u32,
    pub skill_points_granted: u32,
    pub shards_granted: u64,
}

/// A passed build challenge waiting out its construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingBuild {
    pub building_type: BuildingTypeId,
    pub owner: PlayerId,
    pub placement: Option<Cell>,
    pub ready_at_secs: f64,
    pub cost_paid: ResourceBag,
}

/// All state owned by one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColonyState {
    /// Ticks advanced since the session was created. Never resets, so
    /// challenge expiry ticks stay comparable across era resets.
    pub tick: u64,
    /// Simulated seconds since the last fresh start (resets with the era).
    pub session_age_secs: f64,
    pub resources: ResourceBag,
    pub grid: GridMap,
    pub era: EraId,
    pub prestige_level: u32,
    /// Session difficulty, monotonically non-decreasing up to the cap.
    pub difficulty: f64,
    pub challenges: ChallengeBook,
    pub construction: Vec<PendingBuild>,
    /// Seconds of accumulated famine since food last ran out.
    pub starvation_secs: f64,
    /// Fractional population growth waiting to become a whole colonist.
    pub growth_carry: f64,
    pub collapsed: bool,
    next_instance_id: u64,
    #[serde(skip)]
    notes: Vec<ColonyNote>,
}

impl ColonyState {
    pub fn new(config: &GameConfig, catalog: &Catalog) -> Self {
        Self {
            tick: 0,
            session_age_secs: 0.0,
            resources: config.starting_resources,
            grid: GridMap::new(config.grid_width, config.grid_height),
            // An empty progression leaves the sentinel id; every era gate
            // then refuses, rather than panicking on a hollow catalog.
            era: catalog
                .first_era()
                .map(|e| e.id.clone())
                .unwrap_or_else(|| EraId::new("")),
            prestige_level: 0,
            difficulty: 1.0,
            challenges: ChallengeBook::default(),
            construction: Vec::new(),
            starvation_secs: 0.0,
            growth_carry: 0.0,
            collapsed: false,
            next_instance_id: 0,
            notes: Vec::new(),
        }
    }

    pub(crate) fn mint_instance_id(&mut self) -> InstanceId {
        self.next_instance_id += 1;
        InstanceId(self.next_instance_id)
    }

    pub(crate) fn push_note(&mut self, kind: NoteKind) {
        self.notes.push(ColonyNote {
            tick: self.tick,
            kind,
        });
    }

    /// Drain the event feed accumulated by commands and ticks since the
    /// last drain.
    pub fn drain_notes(&mut self) -> Vec<ColonyNote> {
        std::mem::take(&mut self.notes)
    }

    fn definition<'a>(
        &self,
        catalog: &'a Catalog,
        type_id: &BuildingTypeId,
    ) -> Result<&'a BuildingDef, CommandError> {
        catalog
            .building(type_id)
            .ok_or_else(|| CommandError::UnknownBuilding(type_id.clone()))
    }

    fn check_era_and_count(
        &self,
        catalog: &Catalog,
        def: &BuildingDef,
    ) -> Result<(), CommandError> {
        if !catalog.era_allows(&self.era, &def.min_era) {
            return Err(CommandError::EraLocked(
                def.id.clone(),
                def.min_era.clone(),
            ));
        }
        if let Some(max) = def.max_count {
            // Standing instances plus everything already committed toward
            // one: open build challenges and queued constructions.
            let standing = self.grid.count_of(&def.id);
            let open = self
                .challenges
                .open
                .values()
                .filter(|c| c.kind == ChallengeKind::Build && c.building_type == def.id)
                .count();
            let queued = self
                .construction
                .iter()
                .filter(|p| p.building_type == def.id)
                .count();
            if standing + open + queued >= max {
                return Err(CommandError::MaxCountReached { max });
            }
        }
        Ok(())
    }

    fn charge(&mut self, cost: &ResourceBag) -> Result<(), CommandError> {
        if !self.resources.can_afford(cost) {
            return Err(CommandError::NotEnoughResources { need: *cost });
        }
        self.resources.spend(cost);
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), CommandError> {
        if self.collapsed {
            Err(CommandError::Collapsed)
        } else {
            Ok(())
        }
    }

    /// Completed research-producing buildings, for era thresholds.
    pub fn lab_count(&self, catalog: &Catalog) -> usize {
        self.grid
            .instances
            .values()
            .filter(|i| {
                catalog
                    .building(&i.type_id)
                    .is_some_and(|d| d.production.research > 0.0)
            })
            .count()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Place a building immediately at base cost, no challenge involved.
    /// Validation and payment are one atomic step.
    pub fn place_building(
        &mut self,
        catalog: &Catalog,
        modifiers: &ModifierSet,
        type_id: &BuildingTypeId,
        origin: Cell,
        player: &PlayerId,
    ) -> Result<InstanceId, CommandError> {
        self.ensure_live()?;
        let def = self.definition(catalog, type_id)?.clone();
        self.check_era_and_count(catalog, &def)?;
        self.grid.can_place(origin, &def)?;
        let cost = build_cost(&def, modifiers, 1.0);
        self.charge(&cost)?;
        let id = self.mint_instance_id();
        let tick = self.tick;
        // can_place just approved this origin and nothing ran in between.
        self.grid
            .place(id, origin, &def, player.clone(), tick)
            .map_err(CommandError::Placement)?;
        self.push_note(NoteKind::BuildingPlaced {
            instance: id,
            building_type: def.id.clone(),
        });
        Ok(id)
    }

    /// Reset a building's condition to full. Repairs are free; wear only
    /// ever comes from crisis systems layered on top of the core sim.
    pub fn repair_building(&mut self, id: InstanceId) -> Result<(), CommandError> {
        self.ensure_live()?;
        let inst = self
            .grid
            .get_mut(id)
            .ok_or(CommandError::UnknownInstance(id))?;
        inst.condition = 100.0;
        self.push_note(NoteKind::BuildingRepaired { instance: id });
        Ok(())
    }

    /// Open a challenge. The cost (spam tax included) is charged now; the
    /// effect waits for a passing `resolve_challenge`.
    pub fn start_challenge(
        &mut self,
        catalog: &Catalog,
        config: &GameConfig,
        modifiers: &ModifierSet,
        player: &PlayerId,
        request: ChallengeRequest,
    ) -> Result<ChallengeTicket, CommandError> {
        self.ensure_live()?;
        let tuning = &config.challenge;
        let kind = request.kind();
        let (def, target, placement) = match &request {
            ChallengeRequest::Build {
                building_type,
                placement,
            } => {
                let def = self.definition(catalog, building_type)?.clone();
                self.check_era_and_count(catalog, &def)?;
                if let Some(origin) = placement {
                    self.grid.can_place(*origin, &def)?;
                }
                (def, None, *placement)
            }
            ChallengeRequest::Upgrade { instance } => {
                let inst = self
                    .grid
                    .get(*instance)
                    .ok_or(CommandError::UnknownInstance(*instance))?;
                let def = self.definition(catalog, &inst.type_id.clone())?.clone();
                (def, Some(*instance), None)
            }
            ChallengeRequest::Demolish { instance } => {
                let inst = self
                    .grid
                    .get(*instance)
                    .ok_or(CommandError::UnknownInstance(*instance))?;
                let def = self.definition(catalog, &inst.type_id.clone())?.clone();
                (def, Some(*instance), None)
            }
        };
        let spam = self.challenges.spam_level(&def.id);
        let tax = spam_tax(tuning, spam, modifiers.spam_tax_scale);
        let cost = match kind {
            ChallengeKind::Build => build_cost(&def, modifiers, tax),
            ChallengeKind::Upgrade => {
                let level = target
                    .and_then(|id| self.grid.get(id))
                    .map_or(1, |i| i.level);
                upgrade_cost(tuning, &def, level, modifiers, tax)
            }
            ChallengeKind::Demolish => {
                let level = target
                    .and_then(|id| self.grid.get(id))
                    .map_or(1, |i| i.level);
                demolish_cost(tuning, &def, level, tax)
            }
        };
        self.charge(&cost)?;
        let difficulty = challenge::challenge_difficulty(self.difficulty, spam, kind);
        let need = challenge::required_score(tuning, difficulty);
        let id = self.challenges.mint_id();
        let ticket = ChallengeTicket {
            id,
            kind,
            difficulty,
            need,
            expires_at_tick: self.tick + tuning.expiry_ticks,
            cost,
        };
        self.challenges.insert(Challenge {
            id,
            kind,
            building_type: def.id,
            target,
            placement,
            initiator: player.clone(),
            difficulty,
            need,
            created_tick: self.tick,
            expires_at_tick: ticket.expires_at_tick,
            cost_paid: cost,
        });
        Ok(ticket)
    }

    /// Submit a score for an open challenge.
    ///
    /// A passing score applies the challenge's effect. A failing score
    /// burns the paid cost and dents stability. A resolve that arrives
    /// after the expiry tick never passes, whatever the score; the cost
    /// stays forfeited, exactly as the sweep treats it.
    pub fn resolve_challenge(
        &mut self,
        catalog: &Catalog,
        config: &GameConfig,
        modifiers: &ModifierSet,
        id: ChallengeId,
        score: f64,
    ) -> Result<Verdict, CommandError> {
        self.ensure_live()?;
        let challenge = self
            .challenges
            .take(id)
            .ok_or(CommandError::UnknownChallenge(id))?;
        let tuning = &config.challenge;
        if self.tick > challenge.expires_at_tick {
            self.push_note(NoteKind::ChallengeExpired {
                challenge: id,
                kind: challenge.kind,
            });
            return Ok(Verdict {
                id,
                kind: challenge.kind,
                passed: false,
                need: challenge.need,
                score,
                expired: true,
            });
        }
        let passed = score >= challenge.need;
        if passed {
            self.apply_challenge_effect(catalog, config, modifiers, &challenge);
        } else {
            let penalty =
                f64::from(challenge.difficulty) * tuning.fail_stability_per_difficulty;
            self.resources.stability = (self.resources.stability - penalty).max(0.0);
        }
        self.push_note(NoteKind::ChallengeResolved {
            challenge: id,
            kind: challenge.kind,
            passed,
        });
        Ok(Verdict {
            id,
            kind: challenge.kind,
            passed,
            need: challenge.need,
            score,
            expired: false,
        })
    }

    fn apply_challenge_effect(
        &mut self,
        catalog: &Catalog,
        config: &GameConfig,
        modifiers: &ModifierSet,
        challenge: &Challenge,
    ) {
        match challenge.kind {
            ChallengeKind::Build => {
                let build_time = catalog
                    .building(&challenge.building_type)
                    .map_or(0.0, |d| d.build_time_secs)
                    * modifiers.build_time_scale;
                let ready_at_secs = self.session_age_secs + build_time;
                self.construction.push(PendingBuild {
                    building_type: challenge.building_type.clone(),
                    owner: challenge.initiator.clone(),
                    placement: challenge.placement,
                    ready_at_secs,
                    cost_paid: challenge.cost_paid,
                });
                self.push_note(NoteKind::ConstructionStarted {
                    building_type: challenge.building_type.clone(),
                    ready_at_secs,
                });
            }
            ChallengeKind::Upgrade => {
                if let Some(target) = challenge.target
                    && let Some(inst) = self.grid.get_mut(target)
                {
                    inst.level += 1;
                    let level = inst.level;
                    self.push_note(NoteKind::BuildingUpgraded {
                        instance: target,
                        level,
                    });
                }
            }
            ChallengeKind::Demolish => {
                if let Some(target) = challenge.target
                    && let Some(removed) = self.grid.remove(target)
                {
                    if let Some(def) = catalog.building(&removed.type_id) {
                        let refund = demolish_refund(&config.challenge, def, removed.level);
                        self.resources.refund(&refund);
                    }
                    self.push_note(NoteKind::BuildingDemolished {
                        instance: target,
                        building_type: removed.type_id,
                    });
                }
            }
        }
    }

    pub(crate) fn refund_fraction(&mut self, paid: &ResourceBag, fraction: f64) {
        let refund = paid.scaled(fraction).floored();
        if !refund.is_zero() {
            self.resources.refund(&refund);
        }
    }

    /// Advance to the next era. Charges the buy-in, then performs the soft
    /// reset: fresh grid and ledger, challenges and queue dropped, era and
    /// prestige advanced. Returns the grants the initiating player earns.
    pub fn unlock_next_era(
        &mut self,
        catalog: &Catalog,
        config: &GameConfig,
    ) -> Result<EraTicket, EraError> {
        if self.collapsed {
            return Err(EraError::Collapsed);
        }
        let next = can_unlock_next_era(
            catalog,
            &self.era,
            &self.resources,
            self.lab_count(catalog),
        )?;
        let era = next.id.clone();
        let buy_in = ResourceBag {
            energy: next.unlock.energy,
            food: next.unlock.food,
            research: next.unlock.research,
            ..ResourceBag::ZERO
        }
        .scaled(config.prestige.era_buy_in_fraction)
        .ceiled();
        self.resources.spend(&buy_in);
        self.resources.clamp_after_tick();

        let depth = catalog.era_index(&era).unwrap_or(0) as u64;
        self.prestige_level += 1;
        self.era = era.clone();
        self.resources = config.starting_resources;
        self.grid = GridMap::new(config.grid_width, config.grid_height);
        self.challenges.clear();
        self.construction.clear();
        self.starvation_secs = 0.0;
        self.growth_carry = 0.0;
        self.session_age_secs = 0.0;
        let prestige_level = self.prestige_level;
        self.push_note(NoteKind::EraUnlocked {
            era: era.clone(),
            prestige_level,
        });
        Ok(EraTicket {
            era,
            prestige_level,
            skill_points_granted: config.prestige.skill_points_per_era,
            shards_granted: depth * config.prestige.shards_per_era_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick;

    struct Fixture {
        catalog: Catalog,
        config: GameConfig,
        modifiers: ModifierSet,
        state: ColonyState,
    }

    fn fixture() -> Fixture {
        let catalog = Catalog::default();
        let config = GameConfig::default();
        let state = ColonyState::new(&config, &catalog);
        Fixture {
            catalog,
            config,
            modifiers: ModifierSet::default(),
            state,
        }
    }

    impl Fixture {
        fn place(&mut self, type_id: &str, origin: Cell) -> Result<InstanceId, CommandError> {
            self.state.place_building(
                &self.catalog,
                &self.modifiers,
                &type_id.into(),
                origin,
                &"p1".into(),
            )
        }

        fn start(&mut self, request: ChallengeRequest) -> Result<ChallengeTicket, CommandError> {
            self.state.start_challenge(
                &self.catalog,
                &self.config,
                &self.modifiers,
                &"p1".into(),
                request,
            )
        }

        fn resolve(&mut self, id: ChallengeId, score: f64) -> Verdict {
            self.state
                .resolve_challenge(&self.catalog, &self.config, &self.modifiers, id, score)
                .unwrap()
        }

        fn tick(&mut self, dt: f64) {
            tick::advance(
                &mut self.state,
                &self.catalog,
                &self.config,
                &self.modifiers,
                dt,
            );
        }
    }

    #[test]
    fn place_building_charges_base_cost() {
        let mut f = fixture();
        let id = f.place("farm", Cell::new(0, 0)).unwrap();
        assert_eq!(f.state.resources.energy, 120.0);
        assert_eq!(f.state.grid.get(id).unwrap().level, 1);
        f.state.grid.validate().unwrap();
    }

    #[test]
    fn hollow_catalog_yields_a_locked_colony() {
        let catalog = Catalog {
            buildings: std::collections::BTreeMap::new(),
            eras: Vec::new(),
            skills: std::collections::BTreeMap::new(),
        };
        let config = GameConfig::default();
        let mut state = ColonyState::new(&config, &catalog);
        let err = state
            .place_building(
                &catalog,
                &ModifierSet::default(),
                &"farm".into(),
                Cell::new(0, 0),
                &"p1".into(),
            )
            .unwrap_err();
        assert_eq!(err, CommandError::UnknownBuilding("farm".into()));
    }

    #[test]
    fn repair_resets_condition() {
        let mut f = fixture();
        let id = f.place("farm", Cell::new(0, 0)).unwrap();
        assert_eq!(f.state.grid.get(id).unwrap().condition, 100.0);
        f.state.grid.get_mut(id).unwrap().condition = 40.0;
        f.state.repair_building(id).unwrap();
        assert_eq!(f.state.grid.get(id).unwrap().condition, 100.0);
        assert_eq!(
            f.state.repair_building(InstanceId(999)).unwrap_err(),
            CommandError::UnknownInstance(InstanceId(999))
        );
    }

    #[test]
    fn failed_placement_charges_nothing() {
        let mut f = fixture();
        let before = f.state.resources;
        // Row 4 is blocked terrain on the default grid.
        let err = f.place("farm", Cell::new(0, 4)).unwrap_err();
        assert_eq!(err, CommandError::Placement(PlaceError::OnBlockedCell));
        assert_eq!(f.state.resources, before);
        assert!(f.state.grid.instances.is_empty());
    }

    #[test]
    fn unaffordable_placement_charges_nothing() {
        let mut f = fixture();
        f.state.resources.energy = 5.0;
        let before = f.state.resources;
        let err = f.place("farm", Cell::new(0, 0)).unwrap_err();
        assert!(matches!(err, CommandError::NotEnoughResources { .. }));
        assert_eq!(f.state.resources, before);
    }

    #[test]
    fn era_locked_building_is_refused() {
        let mut f = fixture();
        f.state.resources = ResourceBag {
            energy: 1e5,
            food: 1e5,
            research: 1e5,
            population: 100.0,
            stability: 100.0,
        };
        let err = f.place("fusion_plant", Cell::new(0, 0)).unwrap_err();
        assert_eq!(
            err,
            CommandError::EraLocked("fusion_plant".into(), "fusion".into())
        );
    }

    #[test]
    fn max_count_includes_queued_and_open() {
        let mut f = fixture();
        f.state.resources.energy = 1e6;
        f.state.resources.food = 1e6;
        // research_lab max_count is 5. Two standing, two queued, one open
        // challenge: the sixth request must bounce.
        f.place("research_lab", Cell::new(0, 0)).unwrap();
        f.place("research_lab", Cell::new(3, 0)).unwrap();
        for _ in 0..2 {
            let ticket = f
                .start(ChallengeRequest::Build {
                    building_type: "research_lab".into(),
                    placement: None,
                })
                .unwrap();
            f.resolve(ticket.id, ticket.need + 1.0);
        }
        f.start(ChallengeRequest::Build {
            building_type: "research_lab".into(),
            placement: None,
        })
        .unwrap();
        let err = f
            .start(ChallengeRequest::Build {
                building_type: "research_lab".into(),
                placement: None,
            })
            .unwrap_err();
        assert_eq!(err, CommandError::MaxCountReached { max: 5 });
    }

    #[test]
    fn passed_build_challenge_queues_then_completes() {
        let mut f = fixture();
        let ticket = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: Some(Cell::new(0, 0)),
            })
            .unwrap();
        assert_eq!(f.state.resources.energy, 120.0, "cost charged up front");
        let verdict = f.resolve(ticket.id, ticket.need);
        assert!(verdict.passed, "score equal to need passes");
        assert_eq!(f.state.construction.len(), 1);
        assert!(f.state.grid.instances.is_empty());
        // farm build time is 15s at base speed.
        f.tick(14.0);
        assert!(f.state.grid.instances.is_empty());
        f.tick(2.0);
        assert_eq!(f.state.grid.instances.len(), 1);
        let inst = f.state.grid.instances.values().next().unwrap();
        assert_eq!(inst.origin, Cell::new(0, 0));
        assert!(f.state.construction.is_empty());
    }

    #[test]
    fn completed_build_falls_back_when_cell_taken() {
        let mut f = fixture();
        let ticket = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: Some(Cell::new(0, 0)),
            })
            .unwrap();
        f.resolve(ticket.id, ticket.need + 1.0);
        // Steal the requested origin before construction finishes.
        f.place("generator", Cell::new(0, 0)).unwrap();
        f.tick(20.0);
        assert_eq!(f.state.grid.count_of(&"farm".into()), 1);
        let farm = f
            .state
            .grid
            .instances
            .values()
            .find(|i| i.type_id == "farm".into())
            .unwrap();
        assert_ne!(farm.origin, Cell::new(0, 0));
        f.state.grid.validate().unwrap();
    }

    #[test]
    fn failed_challenge_burns_cost_and_dents_stability() {
        let mut f = fixture();
        let ticket = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap();
        let verdict = f.resolve(ticket.id, ticket.need - 0.1);
        assert!(!verdict.passed);
        assert_eq!(f.state.resources.energy, 120.0, "no refund on failure");
        let expected = 100.0
            - f64::from(ticket.difficulty) * f.config.challenge.fail_stability_per_difficulty;
        assert_eq!(f.state.resources.stability, expected);
        assert!(f.state.construction.is_empty());
    }

    #[test]
    fn expired_challenge_never_passes() {
        let mut f = fixture();
        let ticket = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap();
        // Push the session tick past the deadline without sweeping: the
        // resolve itself must notice.
        f.state.tick = ticket.expires_at_tick + 1;
        let energy_before = f.state.resources.energy;
        let verdict = f.resolve(ticket.id, ticket.need + 1000.0);
        assert!(verdict.expired);
        assert!(!verdict.passed);
        assert!(f.state.construction.is_empty());
        // The paid cost stays forfeited; expiry is not a refund path.
        assert_eq!(f.state.resources.energy, energy_before);
    }

    #[test]
    fn expiry_sweep_forfeits_and_removes() {
        let mut f = fixture();
        let ticket = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap();
        let energy_after_charge = f.state.resources.energy;
        for _ in 0..=f.config.challenge.expiry_ticks {
            f.tick(1.0);
        }
        assert!(f.state.challenges.get(ticket.id).is_none());
        // No energy came back from the sweep (no other energy flows here).
        assert_eq!(f.state.resources.energy, energy_after_charge);
        let err = f
            .state
            .resolve_challenge(
                &f.catalog,
                &f.config,
                &f.modifiers,
                ticket.id,
                ticket.need + 1.0,
            )
            .unwrap_err();
        assert_eq!(err, CommandError::UnknownChallenge(ticket.id));
    }

    #[test]
    fn repeated_challenges_pay_spam_tax() {
        let mut f = fixture();
        f.state.resources.energy = 1e6;
        let first = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap();
        let second = f
            .start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap();
        assert!(second.cost.energy > first.cost.energy);
        assert!(second.difficulty >= first.difficulty);
    }

    #[test]
    fn upgrade_challenge_raises_level() {
        let mut f = fixture();
        let id = f.place("farm", Cell::new(0, 0)).unwrap();
        let ticket = f.start(ChallengeRequest::Upgrade { instance: id }).unwrap();
        assert_eq!(ticket.kind, ChallengeKind::Upgrade);
        f.resolve(ticket.id, ticket.need + 1.0);
        assert_eq!(f.state.grid.get(id).unwrap().level, 2);
    }

    #[test]
    fn demolish_challenge_removes_and_refunds() {
        let mut f = fixture();
        let id = f.place("farm", Cell::new(0, 0)).unwrap();
        let energy_before = f.state.resources.energy;
        let ticket = f
            .start(ChallengeRequest::Demolish { instance: id })
            .unwrap();
        f.resolve(ticket.id, ticket.need + 1.0);
        assert!(f.state.grid.get(id).is_none());
        // Fee paid, then half the base cost refunded.
        let expected = energy_before - ticket.cost.energy + 15.0;
        assert_eq!(f.state.resources.energy, expected);
    }

    #[test]
    fn challenge_on_unknown_instance_is_refused() {
        let mut f = fixture();
        let err = f
            .start(ChallengeRequest::Upgrade {
                instance: InstanceId(99),
            })
            .unwrap_err();
        assert_eq!(err, CommandError::UnknownInstance(InstanceId(99)));
    }

    #[test]
    fn era_unlock_soft_resets_the_session() {
        let mut f = fixture();
        f.place("research_lab", Cell::new(0, 0)).unwrap();
        f.state.resources = ResourceBag {
            energy: 300.0,
            food: 250.0,
            population: 45.0,
            research: 10.0,
            stability: 80.0,
        };
        let ticket = f.state.unlock_next_era(&f.catalog, &f.config).unwrap();
        assert_eq!(ticket.era, "industrial".into());
        assert_eq!(ticket.prestige_level, 1);
        assert_eq!(ticket.shards_granted, 10);
        assert_eq!(f.state.era, "industrial".into());
        // Fresh start: map cleared, ledger back to the starting bag.
        assert!(f.state.grid.instances.is_empty());
        assert_eq!(f.state.resources, f.config.starting_resources);
        assert_eq!(f.state.session_age_secs, 0.0);
    }

    #[test]
    fn era_unlock_requires_thresholds() {
        let mut f = fixture();
        let err = f.state.unlock_next_era(&f.catalog, &f.config).unwrap_err();
        assert!(matches!(err, EraError::NeedPopulation { .. }));
        assert_eq!(f.state.era, "proto".into());
        assert_eq!(f.state.prestige_level, 0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut f = fixture();
        f.place("farm", Cell::new(0, 0)).unwrap();
        f.start(ChallengeRequest::Build {
            building_type: "generator".into(),
            placement: Some(Cell::new(6, 0)),
        })
        .unwrap();
        f.tick(5.0);
        f.tick(5.0);

        let json = serde_json::to_string(&f.state).unwrap();
        let restored: ColonyState = serde_json::from_str(&json).unwrap();
        // A parked session must revive exactly where it stopped.
        assert_eq!(restored.tick, f.state.tick);
        assert_eq!(restored.session_age_secs, f.state.session_age_secs);
        assert_eq!(restored.resources, f.state.resources);
        assert_eq!(restored.era, f.state.era);
        assert_eq!(restored.difficulty, f.state.difficulty);
        assert_eq!(restored.grid.blocked, f.state.grid.blocked);
        assert_eq!(restored.grid.instances.len(), 1);
        assert_eq!(restored.challenges.open.len(), 1);
        let (a, b) = (
            restored.challenges.open.values().next().unwrap(),
            f.state.challenges.open.values().next().unwrap(),
        );
        assert_eq!(a, b);
        // A fresh id minted after the revival must not collide.
        let next = restored.clone().mint_instance_id();
        assert_eq!(next, f.state.clone().mint_instance_id());
    }

    #[test]
    fn collapsed_colony_refuses_commands() {
        let mut f = fixture();
        f.state.collapsed = true;
        assert_eq!(
            f.place("farm", Cell::new(0, 0)).unwrap_err(),
            CommandError::Collapsed
        );
        assert_eq!(
            f.start(ChallengeRequest::Build {
                building_type: "farm".into(),
                placement: None,
            })
            .unwrap_err(),
            CommandError::Collapsed
        );
    }
}
