// The economy tick.
//
// `advance` integrates one step of simulated time into a `ColonyState`. It
// never fails: commands validate, the tick only applies. All rates are per
// second and scaled by dt, so two 0.5s steps land within float noise of one
// 1.0s step. Discrete events (casualties, whole-colonist growth, the
// difficulty latch) use accumulators so their timing is a function of total
// elapsed time, not of how that time was sliced.
//
// Step order:
//   1. ambient stability decay
//   2. building production and maintenance
//   3. food consumption
//   4. shortages (blackout drain, rate-limited starvation)
//   5. population growth with fractional carry
//   6. difficulty update (monotone, capped)
//   7. construction completion, challenge expiry sweep
//   8. clamp and floors, collapse check

use crate::catalog::Catalog;
use crate::colony::{ColonyState, PendingBuild};
use crate::config::GameConfig;
use crate::modifiers::ModifierSet;
use crate::note::{CollapseReason, ColonyNote, NoteKind};
use crate::resources::ResourceBag;

/// Advance the colony by `dt` seconds. Non-finite or non-positive dt falls
/// back to the nominal tick length. Returns the notes this step emitted.
pub fn advance(
    state: &mut ColonyState,
    catalog: &Catalog,
    config: &GameConfig,
    modifiers: &ModifierSet,
    dt: f64,
) -> Vec<ColonyNote> {
    if state.collapsed {
        return Vec::new();
    }
    let dt = if dt.is_finite() && dt > 0.0 {
        dt
    } else {
        config.default_tick_secs
    };
    state.tick += 1;
    state.session_age_secs += dt;
    let tuning = &config.tick;

    // 1. Ambient decay.
    state.resources.stability -= tuning.stability_decay_per_sec * dt;

    // 2. Production and maintenance per standing building.
    let mut produced = ResourceBag::ZERO;
    let mut upkeep = ResourceBag::ZERO;
    let mut stability_delta = 0.0;
    for inst in state.grid.instances.values() {
        let Some(def) = catalog.building(&inst.type_id) else {
            continue;
        };
        let level = f64::from(inst.level - 1);
        let prod_mult = 1.0 + level * tuning.level_production_step;
        let maint_mult = 1.0 + level * tuning.level_maintenance_step;
        produced.add_scaled(&def.production, prod_mult);
        upkeep.add_scaled(&def.maintenance, maint_mult);
        stability_delta += def.stability_per_sec;
    }
    produced.energy *= modifiers.energy_production;
    produced.food *= modifiers.food_production;
    produced.research *= modifiers.research_production;
    produced.population *= modifiers.population_growth;
    state
        .resources
        .add_scaled(&produced, modifiers.production_all * dt);
    state
        .resources
        .add_scaled(&upkeep, -(modifiers.maintenance_cost * dt));
    state.resources.stability += stability_delta * dt;

    // 3. Colonists eat.
    state.resources.food -=
        state.resources.population * tuning.food_per_person_per_sec * dt;

    // 4. Shortages. Only a deficit counts; sitting at exactly zero with
    // nothing flowing is not a blackout or a famine.
    if state.resources.energy < 0.0 {
        state.resources.energy = 0.0;
        state.resources.stability -= tuning.blackout_stability_drain_per_sec * dt;
        state.push_note(NoteKind::Blackout);
    }
    if state.resources.food < 0.0 {
        state.resources.food = 0.0;
        state.starvation_secs += dt;
        while state.starvation_secs >= tuning.starvation_interval_secs {
            state.starvation_secs -= tuning.starvation_interval_secs;
            let pop = state.resources.population;
            if pop <= tuning.starvation_population_floor {
                break;
            }
            let deaths = (pop * tuning.starvation_death_fraction).floor().max(1.0);
            state.resources.population =
                (pop - deaths).max(tuning.starvation_population_floor);
            state.resources.stability -= tuning.starvation_stability_penalty;
            state.push_note(NoteKind::StarvationDeaths {
                deaths: deaths as u64,
            });
        }
    } else {
        state.starvation_secs = 0.0;
    }

    // 5. Growth. Fractional gains accumulate; only whole colonists join.
    if state.resources.food > tuning.growth_food_threshold
        && state.resources.stability > tuning.growth_stability_threshold
        && state.resources.population >= 1.0
    {
        state.growth_carry += state.resources.population
            * tuning.growth_rate_per_sec
            * modifiers.population_growth
            * dt;
        let whole = state.growth_carry.floor();
        if whole >= 1.0 {
            state.growth_carry -= whole;
            state.resources.population += whole;
        }
    }

    // 6. Difficulty: era depth plus a session-age ramp plus a one-time
    // step once the colony is large. Latched so it never goes back down.
    let era_depth = catalog.era_index(&state.era).unwrap_or(0) as f64;
    let ramp = tuning.difficulty_ramp_bonus
        * (state.session_age_secs / tuning.difficulty_ramp_secs).min(1.0);
    let size_step = if state.grid.instances.len() >= tuning.difficulty_building_threshold {
        tuning.difficulty_building_step
    } else {
        0.0
    };
    let computed = (1.0 + era_depth + ramp + size_step).min(tuning.difficulty_cap);
    state.difficulty = state.difficulty.max(computed);

    // 7a. Finished constructions try their requested origin, then any free
    // one. If the grid is full, part of the cost comes back.
    let due: Vec<PendingBuild> = {
        let age = state.session_age_secs;
        let (ready, waiting) = std::mem::take(&mut state.construction)
            .into_iter()
            .partition(|p| p.ready_at_secs <= age);
        state.construction = waiting;
        ready
    };
    for pending in due {
        complete_build(state, catalog, config, pending);
    }

    // 7b. Expiry sweep and spam pressure decay.
    state
        .challenges
        .decay_pressure(dt, config.challenge.spam_decay_secs);
    // Expired challenges fail outright; the cost stays forfeited.
    for expired in state.challenges.expire_sweep(state.tick) {
        state.push_note(NoteKind::ChallengeExpired {
            challenge: expired.id,
            kind: expired.kind,
        });
    }

    // 8. Normalize and check for collapse.
    state.resources.clamp_after_tick();
    state
        .resources
        .apply_floors(modifiers.min_stability, modifiers.min_food);
    check_collapse(state, config);

    state.drain_notes()
}

fn complete_build(
    state: &mut ColonyState,
    catalog: &Catalog,
    config: &GameConfig,
    pending: PendingBuild,
) {
    let Some(def) = catalog.building(&pending.building_type) else {
        return;
    };
    let def = def.clone();
    let origin = pending
        .placement
        .filter(|&cell| state.grid.can_place(cell, &def).is_ok())
        .or_else(|| state.grid.find_buildable_cell(&def));
    match origin {
        Some(origin) => {
            let id = state.mint_instance_id();
            let tick = state.tick;
            if state
                .grid
                .place(id, origin, &def, pending.owner.clone(), tick)
                .is_ok()
            {
                state.push_note(NoteKind::BuildingCompleted {
                    instance: id,
                    building_type: def.id.clone(),
                });
            }
        }
        None => {
            state.refund_fraction(&pending.cost_paid, config.challenge.refund_fraction);
            state.push_note(NoteKind::ConstructionRefunded {
                building_type: def.id.clone(),
            });
        }
    }
}

fn check_collapse(state: &mut ColonyState, config: &GameConfig) {
    let tuning = &config.tick;
    let reason = if state.resources.population < tuning.collapse_population {
        Some(CollapseReason::PopulationLost)
    } else if state.resources.stability < tuning.collapse_stability
        && state.session_age_secs > tuning.collapse_grace_secs
    {
        Some(CollapseReason::StabilityLost)
    } else {
        None
    };
    if let Some(reason) = reason {
        state.collapsed = true;
        state.push_note(NoteKind::Collapsed { reason });
    }
}
