// Player progression: skill points, the skill tree, prestige counters.
//
// `PlayerProgress` is account state, not session state. It survives across
// sessions; the server persists it in the snapshot store keyed by player
// id. Era advancement itself mutates the session (see `colony.rs`), but the
// requirement check and the skill tree live here because they are pure
// against catalog data.

use crate::catalog::{Catalog, EraDef, SkillDef};
use crate::resources::ResourceBag;
use crate::types::SkillId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Cross-session state for one player account.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProgress {
    pub skill_points: u32,
    pub skills: BTreeSet<SkillId>,
    pub prestige_level: u32,
    pub prestige_shards: u64,
    pub lifetime: LifetimeStats,
}

/// Odometer counters, display only.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeStats {
    pub buildings_placed: u64,
    pub buildings_upgraded: u64,
    pub buildings_demolished: u64,
    pub challenges_passed: u64,
    pub challenges_failed: u64,
    pub eras_unlocked: u64,
}

// ---------------------------------------------------------------------------
// Skill tree
// ---------------------------------------------------------------------------

/// Why a skill unlock was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkillError {
    #[error("unknown skill")]
    UnknownSkill,
    #[error("skill already unlocked")]
    AlreadyUnlocked,
    #[error("need {need} skill points, have {have}")]
    NotEnoughPoints { need: u32, have: u32 },
    #[error("missing prerequisite {missing}")]
    MissingPrerequisite { missing: SkillId },
}

impl PlayerProgress {
    /// Validate an unlock without committing.
    pub fn can_unlock_skill<'a>(
        &self,
        catalog: &'a Catalog,
        id: &SkillId,
    ) -> Result<&'a SkillDef, SkillError> {
        let def = catalog.skill(id).ok_or(SkillError::UnknownSkill)?;
        if self.skills.contains(id) {
            return Err(SkillError::AlreadyUnlocked);
        }
        for req in &def.requires {
            if !self.skills.contains(req) {
                return Err(SkillError::MissingPrerequisite {
                    missing: req.clone(),
                });
            }
        }
        if self.skill_points < def.cost {
            return Err(SkillError::NotEnoughPoints {
                need: def.cost,
                have: self.skill_points,
            });
        }
        Ok(def)
    }

    /// Unlock a skill, deducting its point cost. Returns the points left.
    pub fn unlock_skill(&mut self, catalog: &Catalog, id: &SkillId) -> Result<u32, SkillError> {
        let cost = self.can_unlock_skill(catalog, id)?.cost;
        self.skill_points -= cost;
        self.skills.insert(id.clone());
        Ok(self.skill_points)
    }
}

// ---------------------------------------------------------------------------
// Era advancement requirements
// ---------------------------------------------------------------------------

/// Why an era advance was refused.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EraError {
    #[error("already at the final era")]
    AtFinalEra,
    #[error("the colony has collapsed")]
    Collapsed,
    #[error("need {need} population, have {have:.0}")]
    NeedPopulation { need: f64, have: f64 },
    #[error("need {need} food, have {have:.0}")]
    NeedFood { need: f64, have: f64 },
    #[error("need {need} energy, have {have:.0}")]
    NeedEnergy { need: f64, have: f64 },
    #[error("need {need} research, have {have:.0}")]
    NeedResearch { need: f64, have: f64 },
    #[error("need {need} stability, have {have:.0}")]
    NeedStability { need: f64, have: f64 },
    #[error("need {need} research labs, have {have}")]
    NeedLabs { need: usize, have: usize },
}

/// Check whether a ledger and lab count satisfy the next era's thresholds.
/// Returns the era that would be entered. The first unmet requirement is
/// reported, in a fixed order so clients can rely on it.
pub fn can_unlock_next_era<'a>(
    catalog: &'a Catalog,
    current: &crate::types::EraId,
    resources: &ResourceBag,
    lab_count: usize,
) -> Result<&'a EraDef, EraError> {
    let next = catalog.next_era(current).ok_or(EraError::AtFinalEra)?;
    let need = &next.unlock;
    if resources.population < need.population {
        return Err(EraError::NeedPopulation {
            need: need.population,
            have: resources.population,
        });
    }
    if resources.food < need.food {
        return Err(EraError::NeedFood {
            need: need.food,
            have: resources.food,
        });
    }
    if resources.energy < need.energy {
        return Err(EraError::NeedEnergy {
            need: need.energy,
            have: resources.energy,
        });
    }
    if resources.research < need.research {
        return Err(EraError::NeedResearch {
            need: need.research,
            have: resources.research,
        });
    }
    if resources.stability < need.stability {
        return Err(EraError::NeedStability {
            need: need.stability,
            have: resources.stability,
        });
    }
    if lab_count < need.labs {
        return Err(EraError::NeedLabs {
            need: need.labs,
            have: lab_count,
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::default()
    }

    #[test]
    fn skill_unlock_walks_the_tree() {
        let catalog = catalog();
        let mut progress = PlayerProgress {
            skill_points: 10,
            ..PlayerProgress::default()
        };
        let solar: SkillId = "solar_arrays".into();
        assert_eq!(
            progress.can_unlock_skill(&catalog, &solar),
            Err(SkillError::MissingPrerequisite {
                missing: "efficiency_1".into()
            })
        );
        let left = progress.unlock_skill(&catalog, &"efficiency_1".into()).unwrap();
        assert_eq!(left, 7);
        progress.unlock_skill(&catalog, &solar).unwrap();
        assert_eq!(progress.skill_points, 3);
        assert_eq!(
            progress.unlock_skill(&catalog, &solar),
            Err(SkillError::AlreadyUnlocked)
        );
    }

    #[test]
    fn skill_unlock_checks_points_after_prerequisites() {
        let catalog = catalog();
        let mut progress = PlayerProgress {
            skill_points: 3,
            ..PlayerProgress::default()
        };
        progress.unlock_skill(&catalog, &"efficiency_1".into()).unwrap();
        assert_eq!(
            progress.unlock_skill(&catalog, &"solar_arrays".into()),
            Err(SkillError::NotEnoughPoints { need: 4, have: 0 })
        );
        assert_eq!(
            progress.unlock_skill(&catalog, &"no_such".into()),
            Err(SkillError::UnknownSkill)
        );
    }

    #[test]
    fn era_check_reports_first_unmet_requirement() {
        let catalog = catalog();
        let proto = "proto".into();
        let mut resources = ResourceBag {
            energy: 250.0,
            food: 200.0,
            population: 40.0,
            research: 0.0,
            stability: 50.0,
        };
        // Thresholds met but no lab standing.
        assert_eq!(
            can_unlock_next_era(&catalog, &proto, &resources, 0),
            Err(EraError::NeedLabs { need: 1, have: 0 })
        );
        let next = can_unlock_next_era(&catalog, &proto, &resources, 1).unwrap();
        assert_eq!(next.id, "industrial".into());
        resources.population = 39.0;
        assert_eq!(
            can_unlock_next_era(&catalog, &proto, &resources, 1),
            Err(EraError::NeedPopulation {
                need: 40.0,
                have: 39.0
            })
        );
    }

    #[test]
    fn final_era_has_no_successor() {
        let catalog = catalog();
        let last = catalog.eras.last().unwrap().id.clone();
        let rich = ResourceBag {
            energy: 1e6,
            food: 1e6,
            population: 1e6,
            research: 1e6,
            stability: 100.0,
        };
        assert_eq!(
            can_unlock_next_era(&catalog, &last, &rich, 99),
            Err(EraError::AtFinalEra)
        );
    }
}
