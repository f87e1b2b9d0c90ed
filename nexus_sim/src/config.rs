// Data-driven game configuration.
//
// All tunable simulation parameters live here in `GameConfig`. The sim never
// uses magic numbers — it reads from the config. This enables balance
// iteration without touching the tick loop, and in multiplayer every client
// renders against the same authoritative numbers.
//
// Tuning is grouped into nested sub-structs: `TickTuning` (economy rates and
// shortage handling), `ChallengeTuning` (scoring, spam tax, costs),
// `PrestigeTuning` (era rewards), and a per-`Role` map of modifier bundles.
// Building, era, and skill definitions are data too, but they live in the
// `Catalog` (see `catalog.rs`) because they are keyed collections rather
// than scalars.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Every replica of a session must use identical configs
// for identical results.

use crate::resources::ResourceBag;
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Tick tuning — economy rates and shortage handling
// ---------------------------------------------------------------------------

/// Per-second rates and thresholds for the economy tick. A nominal tick is
/// `default_tick_secs` long, but every rate here is already per second so
/// the loop integrates over whatever dt it is handed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TickTuning {
    /// Ambient stability decay, before building impacts.
    pub stability_decay_per_sec: f64,
    /// Extra production per building level: `1 + (level - 1) * this`.
    pub level_production_step: f64,
    /// Extra maintenance per building level: `1 + (level - 1) * this`.
    pub level_maintenance_step: f64,
    /// Food eaten per colonist per second.
    pub food_per_person_per_sec: f64,
    /// Extra stability drain per second while energy is at zero (blackout).
    pub blackout_stability_drain_per_sec: f64,
    /// Seconds of accumulated starvation before a casualty event fires.
    pub starvation_interval_secs: f64,
    /// Fraction of the population lost per casualty event (at least one).
    pub starvation_death_fraction: f64,
    /// Stability lost per casualty event.
    pub starvation_stability_penalty: f64,
    /// Casualty events never push population below this floor.
    pub starvation_population_floor: f64,
    /// Population growth per colonist per second when food and stability
    /// are above their thresholds.
    pub growth_rate_per_sec: f64,
    /// Food stock required before the population grows.
    pub growth_food_threshold: f64,
    /// Stability required before the population grows.
    pub growth_stability_threshold: f64,
    /// Seconds of session age over which difficulty ramps by `ramp_bonus`.
    pub difficulty_ramp_secs: f64,
    /// Total difficulty added across the full ramp.
    pub difficulty_ramp_bonus: f64,
    /// Placed-building count past which difficulty takes a one-time step.
    pub difficulty_building_threshold: usize,
    /// Size of that one-time step.
    pub difficulty_building_step: f64,
    /// Difficulty never exceeds this cap.
    pub difficulty_cap: f64,
    /// The colony is lost when population falls below this.
    pub collapse_population: f64,
    /// The colony is lost when stability sits below this after the grace
    /// period.
    pub collapse_stability: f64,
    /// Seconds of session age before the stability collapse check arms.
    pub collapse_grace_secs: f64,
}

// ---------------------------------------------------------------------------
// Challenge tuning — scoring, spam tax, derived costs
// ---------------------------------------------------------------------------

/// Parameters for the challenge state machine that gates construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeTuning {
    /// Ticks a challenge stays open before the expiry sweep removes it.
    pub expiry_ticks: u64,
    /// Score needed at difficulty zero.
    pub base_need: f64,
    /// Extra score needed per point of difficulty.
    pub need_per_difficulty: f64,
    /// Cost multiplier added per repeated same-type challenge (spam tax).
    pub spam_tax_step: f64,
    /// Seconds for one point of same-type pressure to decay.
    pub spam_decay_secs: f64,
    /// The spam tax multiplier never exceeds this.
    pub spam_tax_cap: f64,
    /// Stability lost per point of difficulty when a challenge fails.
    pub fail_stability_per_difficulty: f64,
    /// Fraction of the paid cost returned when a queued build finds no
    /// space on the map. Expired challenges refund nothing.
    pub refund_fraction: f64,
    /// Upgrade cost as a multiple of base cost: `1 + (level - 1) * step`.
    /// Applies to every component except research.
    pub upgrade_cost_step: f64,
    /// The research component's step on the same curve. Smaller, so
    /// research-priced buildings do not price themselves out late game.
    pub upgrade_research_step: f64,
    /// Demolition fee as a fraction of base cost at level 1.
    pub demolish_cost_base_fraction: f64,
    /// Extra demolition fee fraction per level above 1.
    pub demolish_cost_level_step: f64,
    /// Fraction of cumulative invested cost returned on demolition.
    pub demolish_refund_fraction: f64,
}

// ---------------------------------------------------------------------------
// Prestige tuning — era rewards
// ---------------------------------------------------------------------------

/// Rewards granted when a session unlocks its next era.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrestigeTuning {
    /// Production multiplier gained per prestige level: `1 + level * this`.
    pub multiplier_per_level: f64,
    /// The prestige production multiplier never exceeds this.
    pub multiplier_cap: f64,
    /// Shards granted per index of the era just reached.
    pub shards_per_era_depth: u64,
    /// Skill points granted to the unlocking player per era.
    pub skill_points_per_era: u32,
    /// Fraction of each era threshold charged as the unlock buy-in.
    pub era_buy_in_fraction: f64,
}

// ---------------------------------------------------------------------------
// Role data — per-role modifier bundles
// ---------------------------------------------------------------------------

/// The modifier contribution of one player role. Multiplier fields default
/// to 1.0 (no effect), floors to 0.0.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleData {
    pub build_cost_mult: f64,
    pub energy_production_mult: f64,
    pub food_production_mult: f64,
    pub research_production_mult: f64,
    pub production_all_mult: f64,
    pub maintenance_mult: f64,
    pub population_growth_mult: f64,
    pub min_stability_floor: f64,
}

impl Default for RoleData {
    fn default() -> Self {
        Self {
            build_cost_mult: 1.0,
            energy_production_mult: 1.0,
            food_production_mult: 1.0,
            research_production_mult: 1.0,
            production_all_mult: 1.0,
            maintenance_mult: 1.0,
            population_growth_mult: 1.0,
            min_stability_floor: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root of all tunable parameters. `GameConfig::default()` is the shipped
/// balance; sessions may deserialize overrides from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Grid width in cells.
    pub grid_width: i32,
    /// Grid height in cells.
    pub grid_height: i32,
    /// Ledger state a fresh colony starts with.
    pub starting_resources: ResourceBag,
    /// Nominal tick length; also the dt substituted for invalid inputs.
    pub default_tick_secs: f64,
    pub tick: TickTuning,
    pub challenge: ChallengeTuning,
    pub prestige: PrestigeTuning,
    /// Modifier bundle per role. Roles absent from the map contribute
    /// nothing.
    pub roles: BTreeMap<Role, RoleData>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Engineer,
            RoleData {
                build_cost_mult: 0.85,
                energy_production_mult: 1.2,
                maintenance_mult: 0.75,
                ..RoleData::default()
            },
        );
        roles.insert(
            Role::Researcher,
            RoleData {
                research_production_mult: 2.0,
                population_growth_mult: 1.15,
                ..RoleData::default()
            },
        );
        roles.insert(
            Role::Logistician,
            RoleData {
                production_all_mult: 1.25,
                food_production_mult: 1.3,
                ..RoleData::default()
            },
        );
        roles.insert(
            Role::Diplomat,
            RoleData {
                population_growth_mult: 1.4,
                min_stability_floor: 20.0,
                ..RoleData::default()
            },
        );
        Self {
            grid_width: 12,
            grid_height: 8,
            starting_resources: ResourceBag {
                energy: 150.0,
                food: 150.0,
                population: 15.0,
                research: 0.0,
                stability: 100.0,
            },
            default_tick_secs: 5.0,
            tick: TickTuning {
                stability_decay_per_sec: 0.1,
                level_production_step: 0.15,
                level_maintenance_step: 0.12,
                food_per_person_per_sec: 0.1,
                blackout_stability_drain_per_sec: 0.4,
                starvation_interval_secs: 30.0,
                starvation_death_fraction: 0.05,
                starvation_stability_penalty: 15.0,
                starvation_population_floor: 1.0,
                growth_rate_per_sec: 0.004,
                growth_food_threshold: 50.0,
                growth_stability_threshold: 40.0,
                difficulty_ramp_secs: 3600.0,
                difficulty_ramp_bonus: 3.0,
                difficulty_building_threshold: 30,
                difficulty_building_step: 1.0,
                difficulty_cap: 10.0,
                collapse_population: 2.0,
                collapse_stability: 5.0,
                collapse_grace_secs: 120.0,
            },
            challenge: ChallengeTuning {
                expiry_ticks: 8,
                base_need: 4.0,
                need_per_difficulty: 2.4,
                spam_tax_step: 0.12,
                spam_decay_secs: 60.0,
                spam_tax_cap: 3.0,
                fail_stability_per_difficulty: 1.5,
                refund_fraction: 0.5,
                upgrade_cost_step: 0.35,
                upgrade_research_step: 0.15,
                demolish_cost_base_fraction: 0.25,
                demolish_cost_level_step: 0.08,
                demolish_refund_fraction: 0.5,
            },
            prestige: PrestigeTuning {
                multiplier_per_level: 0.06,
                multiplier_cap: 2.5,
                shards_per_era_depth: 10,
                skill_points_per_era: 3,
                era_buy_in_fraction: 0.5,
            },
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serialization_roundtrip() {
        let config = GameConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: GameConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.grid_width, config.grid_width);
        assert_eq!(
            restored.tick.starvation_interval_secs,
            config.tick.starvation_interval_secs
        );
        assert_eq!(restored.roles.len(), config.roles.len());
    }

    #[test]
    fn every_role_has_a_bundle() {
        let config = GameConfig::default();
        for role in Role::ALL {
            assert!(config.roles.contains_key(&role), "missing bundle: {role:?}");
        }
    }

    #[test]
    fn spam_tax_cap_above_one_step() {
        let c = GameConfig::default().challenge;
        assert!(c.spam_tax_cap > 1.0 + c.spam_tax_step);
    }
}
