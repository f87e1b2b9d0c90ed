// Modifier aggregation.
//
// Every source of economy modification (player roles on the roster, the
// union of unlocked skills, the session's prestige level, the current era
// bonus) is folded into one flat `ModifierSet` that the tick loop and the
// command layer read. Aggregation is pure: same inputs, same output, no
// ordering sensitivity.
//
// Combination rule: multiplier fields multiply together, floor fields take
// the maximum. Multipliers are never summed, so two +15% sources give
// 1.3225x rather than 1.30x, and a cost reducer composes with a cost raiser
// instead of cancelling it by accident.

use crate::catalog::{Catalog, EffectOp, ModifierKey, SkillDef};
use crate::config::GameConfig;
use crate::types::{EraId, Role, SkillId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The flattened modifier state for one session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub production_all: f64,
    pub energy_production: f64,
    pub food_production: f64,
    pub research_production: f64,
    pub population_growth: f64,
    pub maintenance_cost: f64,
    pub build_cost: f64,
    pub spam_tax_scale: f64,
    pub build_time_scale: f64,
    pub min_stability: f64,
    pub min_food: f64,
}

impl Default for ModifierSet {
    fn default() -> Self {
        Self {
            production_all: 1.0,
            energy_production: 1.0,
            food_production: 1.0,
            research_production: 1.0,
            population_growth: 1.0,
            maintenance_cost: 1.0,
            build_cost: 1.0,
            spam_tax_scale: 1.0,
            build_time_scale: 1.0,
            min_stability: 0.0,
            min_food: 0.0,
        }
    }
}

impl ModifierSet {
    fn field_mut(&mut self, key: ModifierKey) -> &mut f64 {
        match key {
            ModifierKey::ProductionAll => &mut self.production_all,
            ModifierKey::EnergyProduction => &mut self.energy_production,
            ModifierKey::FoodProduction => &mut self.food_production,
            ModifierKey::ResearchProduction => &mut self.research_production,
            ModifierKey::PopulationGrowth => &mut self.population_growth,
            ModifierKey::MaintenanceCost => &mut self.maintenance_cost,
            ModifierKey::BuildCost => &mut self.build_cost,
            ModifierKey::SpamTaxScale => &mut self.spam_tax_scale,
            ModifierKey::BuildTimeScale => &mut self.build_time_scale,
            ModifierKey::MinStability => &mut self.min_stability,
            ModifierKey::MinFood => &mut self.min_food,
        }
    }

    fn apply_skill(&mut self, skill: &SkillDef) {
        for effect in &skill.effects {
            let field = self.field_mut(effect.key);
            match effect.op {
                EffectOp::Multiply => *field *= effect.value,
                EffectOp::Add => *field += effect.value,
                EffectOp::SetMinimum => *field = field.max(effect.value),
            }
        }
    }

    fn apply_role(&mut self, config: &GameConfig, role: Role) {
        let Some(data) = config.roles.get(&role) else {
            return;
        };
        self.build_cost *= data.build_cost_mult;
        self.energy_production *= data.energy_production_mult;
        self.food_production *= data.food_production_mult;
        self.research_production *= data.research_production_mult;
        self.production_all *= data.production_all_mult;
        self.maintenance_cost *= data.maintenance_mult;
        self.population_growth *= data.population_growth_mult;
        self.min_stability = self.min_stability.max(data.min_stability_floor);
    }
}

/// The prestige production multiplier for a level: `1 + level * per_level`,
/// capped.
pub fn prestige_multiplier(config: &GameConfig, level: u32) -> f64 {
    (1.0 + f64::from(level) * config.prestige.multiplier_per_level)
        .min(config.prestige.multiplier_cap)
}

/// Fold every modifier source into one set.
///
/// `roles` is the roster (one entry per connected player; duplicates are
/// intentional, two engineers stack). `skills` is deduplicated here: a
/// skill owned by several players applies once.
pub fn aggregate<'a>(
    config: &GameConfig,
    catalog: &Catalog,
    roles: impl IntoIterator<Item = Role>,
    skills: impl IntoIterator<Item = &'a SkillId>,
    prestige_level: u32,
    era: &EraId,
) -> ModifierSet {
    let mut set = ModifierSet::default();
    for role in roles {
        set.apply_role(config, role);
    }
    let unique: BTreeSet<&SkillId> = skills.into_iter().collect();
    for id in unique {
        if let Some(skill) = catalog.skill(id) {
            set.apply_skill(skill);
        }
    }
    set.production_all *= prestige_multiplier(config, prestige_level);
    if let Some(idx) = catalog.era_index(era) {
        set.production_all *= catalog.eras[idx].production_bonus;
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_setup() -> (GameConfig, Catalog) {
        (GameConfig::default(), Catalog::default())
    }

    #[test]
    fn identity_when_no_sources() {
        let (config, catalog) = base_setup();
        let set = aggregate(&config, &catalog, [], [], 0, &"proto".into());
        assert_eq!(set, ModifierSet::default());
    }

    #[test]
    fn multipliers_multiply_not_sum() {
        let (config, catalog) = base_setup();
        // Two logisticians: production_all 1.25 * 1.25, not 1.5.
        let set = aggregate(
            &config,
            &catalog,
            [Role::Logistician, Role::Logistician],
            [],
            0,
            &"proto".into(),
        );
        assert!((set.production_all - 1.5625).abs() < 1e-9);
    }

    #[test]
    fn floors_take_maximum() {
        let (config, catalog) = base_setup();
        let civic: SkillId = "civic_trust".into();
        // Diplomat floor 20 beats the civic_trust floor 15.
        let set = aggregate(
            &config,
            &catalog,
            [Role::Diplomat],
            [&civic],
            0,
            &"proto".into(),
        );
        assert_eq!(set.min_stability, 20.0);
    }

    #[test]
    fn duplicate_skills_apply_once() {
        let (config, catalog) = base_setup();
        let skill: SkillId = "efficiency_1".into();
        let set = aggregate(
            &config,
            &catalog,
            [],
            [&skill, &skill],
            0,
            &"proto".into(),
        );
        assert!((set.production_all - 1.15).abs() < 1e-9);
    }

    #[test]
    fn prestige_multiplier_caps() {
        let config = GameConfig::default();
        assert_eq!(prestige_multiplier(&config, 0), 1.0);
        assert!((prestige_multiplier(&config, 3) - 1.18).abs() < 1e-9);
        assert_eq!(prestige_multiplier(&config, 1000), 2.5);
    }

    #[test]
    fn order_does_not_matter() {
        let (config, catalog) = base_setup();
        let a: SkillId = "efficiency_1".into();
        let b: SkillId = "automation".into();
        let forward = aggregate(
            &config,
            &catalog,
            [Role::Engineer, Role::Diplomat],
            [&a, &b],
            2,
            &"industrial".into(),
        );
        let reverse = aggregate(
            &config,
            &catalog,
            [Role::Diplomat, Role::Engineer],
            [&b, &a],
            2,
            &"industrial".into(),
        );
        assert_eq!(forward, reverse);
    }
}
