// Static content definitions: buildings, eras, skills.
//
// The `Catalog` is immutable data shared by every session (the server wraps
// it in an `Arc`). `Catalog::default()` is the shipped content set; like
// `GameConfig` it can be deserialized from JSON for content iteration.
//
// Eras are an ordered list: a session is always at exactly one index and
// can only advance to the next. Buildings carry the era they become
// available in. Skills form a DAG via `requires` edges and express their
// gameplay effect as `SkillEffect` entries interpreted by `modifiers.rs`.

use crate::resources::ResourceBag;
use crate::types::{BuildingTypeId, EraId, SkillId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// Rectangular footprint of a building in grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub w: i32,
    pub h: i32,
}

/// One constructible building type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildingDef {
    pub id: BuildingTypeId,
    pub name: String,
    /// First era this building may be placed in.
    pub min_era: EraId,
    pub footprint: Footprint,
    /// Base cost at level 1, before modifiers and spam tax.
    pub cost: ResourceBag,
    /// Output per second at level 1.
    pub production: ResourceBag,
    /// Upkeep per second at level 1. Charged whether or not upkeep can be
    /// fully paid; the ledger clamps at zero afterwards.
    pub maintenance: ResourceBag,
    /// Stability contribution per second (negative for noisy industry).
    pub stability_per_sec: f64,
    /// Construction time in seconds at base build speed.
    pub build_time_secs: f64,
    /// Most instances of this type a colony may hold at once.
    pub max_count: Option<usize>,
}

// ---------------------------------------------------------------------------
// Eras
// ---------------------------------------------------------------------------

/// Resource thresholds a colony must hold to unlock an era. Zero fields are
/// not checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraThresholds {
    pub population: f64,
    pub food: f64,
    pub energy: f64,
    pub research: f64,
    pub stability: f64,
    /// Research labs that must be standing (completed, any level).
    pub labs: usize,
}

/// One entry in the ordered era progression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EraDef {
    pub id: EraId,
    pub name: String,
    /// Requirements to advance *into* this era. Ignored for index 0.
    pub unlock: EraThresholds,
    /// Flat production multiplier while the session is in this era.
    pub production_bonus: f64,
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Which aggregate modifier field a skill effect touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKey {
    ProductionAll,
    EnergyProduction,
    FoodProduction,
    ResearchProduction,
    PopulationGrowth,
    MaintenanceCost,
    BuildCost,
    SpamTaxScale,
    BuildTimeScale,
    MinStability,
    MinFood,
}

/// How the effect combines into the aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOp {
    /// Multiply the field by `value`.
    Multiply,
    /// Add `value` to the field.
    Add,
    /// Raise the field's floor to at least `value`.
    SetMinimum,
}

/// A single modifier contribution of an unlocked skill.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    pub key: ModifierKey,
    pub op: EffectOp,
    pub value: f64,
}

/// One node of the skill tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: SkillId,
    pub name: String,
    /// Skill points to unlock.
    pub cost: u32,
    /// Every listed skill must be unlocked first.
    pub requires: Vec<SkillId>,
    pub effects: Vec<SkillEffect>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The full content set. Lookup is by stable string key; eras keep their
/// order in a `Vec`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub buildings: BTreeMap<BuildingTypeId, BuildingDef>,
    pub eras: Vec<EraDef>,
    pub skills: BTreeMap<SkillId, SkillDef>,
}

impl Catalog {
    pub fn building(&self, id: &BuildingTypeId) -> Option<&BuildingDef> {
        self.buildings.get(id)
    }

    pub fn skill(&self, id: &SkillId) -> Option<&SkillDef> {
        self.skills.get(id)
    }

    /// Position of an era in the progression, or `None` for unknown ids.
    pub fn era_index(&self, id: &EraId) -> Option<usize> {
        self.eras.iter().position(|e| &e.id == id)
    }

    /// The era after `current`, if the progression has one.
    pub fn next_era(&self, current: &EraId) -> Option<&EraDef> {
        let idx = self.era_index(current)?;
        self.eras.get(idx + 1)
    }

    /// Whether a building available from `min_era` may be placed while the
    /// session is in `current`.
    pub fn era_allows(&self, current: &EraId, min_era: &EraId) -> bool {
        match (self.era_index(current), self.era_index(min_era)) {
            (Some(cur), Some(min)) => cur >= min,
            _ => false,
        }
    }

    /// The opening era, or `None` for a catalog with no progression.
    pub fn first_era(&self) -> Option<&EraDef> {
        self.eras.first()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let mut buildings = BTreeMap::new();
        let mut add = |def: BuildingDef| {
            buildings.insert(def.id.clone(), def);
        };
        add(BuildingDef {
            id: "generator".into(),
            name: "Generator".to_owned(),
            min_era: "proto".into(),
            footprint: Footprint { w: 2, h: 2 },
            cost: ResourceBag {
                food: 50.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag {
                energy: 2.0,
                ..ResourceBag::ZERO
            },
            maintenance: ResourceBag {
                food: 0.4,
                ..ResourceBag::ZERO
            },
            stability_per_sec: -0.2,
            build_time_secs: 15.0,
            max_count: Some(20),
        });
        add(BuildingDef {
            id: "farm".into(),
            name: "Hydro Farm".to_owned(),
            min_era: "proto".into(),
            footprint: Footprint { w: 2, h: 2 },
            cost: ResourceBag {
                energy: 30.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag {
                food: 1.6,
                ..ResourceBag::ZERO
            },
            maintenance: ResourceBag {
                energy: 0.2,
                ..ResourceBag::ZERO
            },
            stability_per_sec: 0.0,
            build_time_secs: 15.0,
            max_count: Some(15),
        });
        add(BuildingDef {
            id: "habitat".into(),
            name: "Habitat Block".to_owned(),
            min_era: "proto".into(),
            footprint: Footprint { w: 2, h: 2 },
            cost: ResourceBag {
                energy: 40.0,
                food: 60.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag {
                population: 1.0,
                ..ResourceBag::ZERO
            },
            maintenance: ResourceBag {
                energy: 0.4,
                food: 0.6,
                ..ResourceBag::ZERO
            },
            stability_per_sec: -0.4,
            build_time_secs: 25.0,
            max_count: Some(12),
        });
        add(BuildingDef {
            id: "research_lab".into(),
            name: "Research Lab".to_owned(),
            min_era: "proto".into(),
            footprint: Footprint { w: 2, h: 1 },
            cost: ResourceBag {
                energy: 80.0,
                food: 40.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag {
                research: 0.4,
                ..ResourceBag::ZERO
            },
            maintenance: ResourceBag {
                energy: 1.0,
                food: 0.4,
                ..ResourceBag::ZERO
            },
            stability_per_sec: 0.2,
            build_time_secs: 40.0,
            max_count: Some(5),
        });
        add(BuildingDef {
            id: "stabilizer".into(),
            name: "Civic Stabilizer".to_owned(),
            min_era: "proto".into(),
            footprint: Footprint { w: 1, h: 1 },
            cost: ResourceBag {
                energy: 60.0,
                food: 50.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag::ZERO,
            maintenance: ResourceBag {
                energy: 0.6,
                food: 0.4,
                ..ResourceBag::ZERO
            },
            stability_per_sec: 1.6,
            build_time_secs: 30.0,
            max_count: Some(8),
        });
        add(BuildingDef {
            id: "fusion_plant".into(),
            name: "Fusion Plant".to_owned(),
            min_era: "fusion".into(),
            footprint: Footprint { w: 3, h: 2 },
            cost: ResourceBag {
                energy: 200.0,
                food: 100.0,
                research: 50.0,
                ..ResourceBag::ZERO
            },
            production: ResourceBag {
                energy: 9.0,
                ..ResourceBag::ZERO
            },
            maintenance: ResourceBag {
                food: 1.0,
                ..ResourceBag::ZERO
            },
            stability_per_sec: -0.6,
            build_time_secs: 60.0,
            max_count: Some(4),
        });

        let eras = vec![
            EraDef {
                id: "proto".into(),
                name: "Proto Colony".to_owned(),
                unlock: EraThresholds::default(),
                production_bonus: 1.0,
            },
            EraDef {
                id: "industrial".into(),
                name: "Industrial Expansion".to_owned(),
                unlock: EraThresholds {
                    population: 40.0,
                    food: 200.0,
                    energy: 250.0,
                    labs: 1,
                    ..EraThresholds::default()
                },
                production_bonus: 1.05,
            },
            EraDef {
                id: "fusion".into(),
                name: "Fusion Age".to_owned(),
                unlock: EraThresholds {
                    population: 80.0,
                    research: 120.0,
                    stability: 60.0,
                    labs: 2,
                    ..EraThresholds::default()
                },
                production_bonus: 1.1,
            },
            EraDef {
                id: "orbital".into(),
                name: "Orbital Reach".to_owned(),
                unlock: EraThresholds {
                    population: 150.0,
                    energy: 800.0,
                    research: 300.0,
                    stability: 70.0,
                    ..EraThresholds::default()
                },
                production_bonus: 1.15,
            },
        ];

        let mut skills = BTreeMap::new();
        let mut add_skill = |def: SkillDef| {
            skills.insert(def.id.clone(), def);
        };
        let effect = |key, op, value| SkillEffect { key, op, value };
        add_skill(SkillDef {
            id: "efficiency_1".into(),
            name: "Process Efficiency".to_owned(),
            cost: 3,
            requires: vec![],
            effects: vec![effect(
                ModifierKey::ProductionAll,
                EffectOp::Multiply,
                1.15,
            )],
        });
        add_skill(SkillDef {
            id: "solar_arrays".into(),
            name: "Solar Arrays".to_owned(),
            cost: 4,
            requires: vec!["efficiency_1".into()],
            effects: vec![effect(
                ModifierKey::EnergyProduction,
                EffectOp::Multiply,
                1.25,
            )],
        });
        add_skill(SkillDef {
            id: "hydroponics".into(),
            name: "Hydroponic Cascades".to_owned(),
            cost: 5,
            requires: vec!["efficiency_1".into()],
            effects: vec![
                effect(ModifierKey::FoodProduction, EffectOp::Multiply, 1.3),
                effect(ModifierKey::MaintenanceCost, EffectOp::Multiply, 0.9),
            ],
        });
        add_skill(SkillDef {
            id: "automation".into(),
            name: "Full Automation".to_owned(),
            cost: 8,
            requires: vec!["efficiency_1".into(), "solar_arrays".into()],
            effects: vec![
                effect(ModifierKey::MaintenanceCost, EffectOp::Multiply, 0.7),
                effect(ModifierKey::ProductionAll, EffectOp::Multiply, 1.2),
            ],
        });
        add_skill(SkillDef {
            id: "logistics_network".into(),
            name: "Logistics Network".to_owned(),
            cost: 4,
            requires: vec![],
            effects: vec![effect(ModifierKey::SpamTaxScale, EffectOp::Multiply, 0.5)],
        });
        add_skill(SkillDef {
            id: "prefab_construction".into(),
            name: "Prefab Construction".to_owned(),
            cost: 5,
            requires: vec!["logistics_network".into()],
            effects: vec![effect(
                ModifierKey::BuildTimeScale,
                EffectOp::Multiply,
                0.7,
            )],
        });
        add_skill(SkillDef {
            id: "family_planning".into(),
            name: "Family Planning".to_owned(),
            cost: 4,
            requires: vec![],
            effects: vec![effect(
                ModifierKey::PopulationGrowth,
                EffectOp::Multiply,
                1.2,
            )],
        });
        add_skill(SkillDef {
            id: "emergency_rations".into(),
            name: "Emergency Rations".to_owned(),
            cost: 6,
            requires: vec!["hydroponics".into()],
            effects: vec![effect(ModifierKey::MinFood, EffectOp::SetMinimum, 10.0)],
        });
        add_skill(SkillDef {
            id: "civic_trust".into(),
            name: "Civic Trust".to_owned(),
            cost: 6,
            requires: vec!["family_planning".into()],
            effects: vec![effect(
                ModifierKey::MinStability,
                EffectOp::SetMinimum,
                15.0,
            )],
        });

        Self {
            buildings,
            eras,
            skills,
        }
    }
}
