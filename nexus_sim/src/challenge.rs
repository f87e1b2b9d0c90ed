// The challenge state machine that gates construction.
//
// Every build, upgrade, or demolition starts as an open `Challenge` with a
// difficulty, a score requirement, and an expiry tick. The cost is charged
// up front; resolving with a passing score applies the effect, resolving
// with a failing score burns the cost and dents stability, and expiry is
// just another failure: the cost stays forfeited.
//
// Pure cost and scoring arithmetic lives here as free functions so the
// command layer in `colony.rs` stays readable and tests can pin the curves
// directly. The `ChallengeBook` owns the open set plus the per-type spam
// pressure that taxes repeated same-type challenges.

use crate::catalog::BuildingDef;
use crate::config::ChallengeTuning;
use crate::modifiers::ModifierSet;
use crate::resources::ResourceBag;
use crate::types::{BuildingTypeId, Cell, ChallengeId, ChallengeKind, InstanceId, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An open challenge awaiting a score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub kind: ChallengeKind,
    pub building_type: BuildingTypeId,
    /// The building an upgrade or demolition targets.
    pub target: Option<InstanceId>,
    /// Requested build origin, if the initiator picked one.
    pub placement: Option<Cell>,
    pub initiator: PlayerId,
    pub difficulty: u32,
    /// Score required to pass, fixed at creation.
    pub need: f64,
    pub created_tick: u64,
    /// The expiry sweep removes the challenge once the session tick passes
    /// this.
    pub expires_at_tick: u64,
    /// What was charged at creation. Forfeited on failure or expiry;
    /// carried into the construction queue on a passed build.
    pub cost_paid: ResourceBag,
}

/// Outcome of resolving a challenge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub id: ChallengeId,
    pub kind: ChallengeKind,
    pub passed: bool,
    pub need: f64,
    pub score: f64,
    /// Set when the resolve arrived after the expiry tick. Such attempts
    /// never pass regardless of score.
    pub expired: bool,
}

// ---------------------------------------------------------------------------
// Cost and scoring curves
// ---------------------------------------------------------------------------

/// Difficulty of a new challenge: session difficulty, plus same-type spam
/// pressure, plus a kind surcharge, clamped to `[1, 10]`.
pub fn challenge_difficulty(session_difficulty: f64, spam_level: u32, kind: ChallengeKind) -> u32 {
    let kind_bonus: i64 = match kind {
        ChallengeKind::Build => 0,
        ChallengeKind::Upgrade => 1,
        ChallengeKind::Demolish => 2,
    };
    (session_difficulty.floor() as i64 + i64::from(spam_level) + kind_bonus).clamp(1, 10) as u32
}

/// Score a challenge of this difficulty must reach.
pub fn required_score(tuning: &ChallengeTuning, difficulty: u32) -> f64 {
    tuning.base_need + f64::from(difficulty) * tuning.need_per_difficulty
}

/// Spam tax multiplier for a given pressure level. Skills can scale the
/// tax down; the cap applies after scaling.
pub fn spam_tax(tuning: &ChallengeTuning, spam_level: u32, scale: f64) -> f64 {
    (1.0 + f64::from(spam_level) * tuning.spam_tax_step * scale).min(tuning.spam_tax_cap)
}

/// Cost to start a build challenge (also the direct-place cost when the
/// tax is 1.0). Ceiled so fractional multipliers always round against the
/// buyer.
pub fn build_cost(def: &BuildingDef, modifiers: &ModifierSet, tax: f64) -> ResourceBag {
    def.cost.scaled(modifiers.build_cost * tax).ceiled()
}

/// Base cost of the upgrade from `level` to `level + 1`, before modifiers
/// and tax. Energy and food follow the steep curve; research climbs on the
/// gentler one so lab-heavy buildings stay upgradeable late game.
fn upgrade_base(tuning: &ChallengeTuning, def: &BuildingDef, level: u32) -> ResourceBag {
    let mut bag = def
        .cost
        .scaled(1.0 + f64::from(level) * tuning.upgrade_cost_step);
    bag.research = def.cost.research * (1.0 + f64::from(level) * tuning.upgrade_research_step);
    bag
}

/// Cost to upgrade from `level` to `level + 1`.
pub fn upgrade_cost(
    tuning: &ChallengeTuning,
    def: &BuildingDef,
    level: u32,
    modifiers: &ModifierSet,
    tax: f64,
) -> ResourceBag {
    upgrade_base(tuning, def, level)
        .scaled(modifiers.build_cost * tax)
        .ceiled()
}

/// Demolition fee for a building at `level`.
pub fn demolish_cost(
    tuning: &ChallengeTuning,
    def: &BuildingDef,
    level: u32,
    tax: f64,
) -> ResourceBag {
    let fraction = tuning.demolish_cost_base_fraction
        + f64::from(level.saturating_sub(1)) * tuning.demolish_cost_level_step;
    def.cost.scaled(fraction * tax).ceiled()
}

/// Refund granted when a building at `level` is demolished: a fraction of
/// everything invested (base cost plus each upgrade step), floored.
pub fn demolish_refund(tuning: &ChallengeTuning, def: &BuildingDef, level: u32) -> ResourceBag {
    let mut invested = def.cost;
    for l in 1..level {
        invested.refund(&upgrade_base(tuning, def, l));
    }
    invested
        .scaled(tuning.demolish_refund_fraction)
        .floored()
}

// ---------------------------------------------------------------------------
// The open-challenge book
// ---------------------------------------------------------------------------

/// Open challenges plus per-type spam pressure.
///
/// Pressure is a float so it can decay continuously with dt; the integer
/// spam level used by the tax and difficulty curves is its floor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChallengeBook {
    pub open: BTreeMap<ChallengeId, Challenge>,
    pressure: BTreeMap<BuildingTypeId, f64>,
    next_id: u64,
}

impl ChallengeBook {
    pub fn mint_id(&mut self) -> ChallengeId {
        self.next_id += 1;
        ChallengeId(self.next_id)
    }

    pub fn spam_level(&self, type_id: &BuildingTypeId) -> u32 {
        self.pressure
            .get(type_id)
            .map_or(0, |p| p.floor().max(0.0) as u32)
    }

    /// Record an accepted challenge, bumping its type's pressure.
    pub fn insert(&mut self, challenge: Challenge) {
        *self
            .pressure
            .entry(challenge.building_type.clone())
            .or_insert(0.0) += 1.0;
        self.open.insert(challenge.id, challenge);
    }

    pub fn take(&mut self, id: ChallengeId) -> Option<Challenge> {
        self.open.remove(&id)
    }

    pub fn get(&self, id: ChallengeId) -> Option<&Challenge> {
        self.open.get(&id)
    }

    /// Decay spam pressure by elapsed time. Entries that reach zero are
    /// dropped so the map stays small.
    pub fn decay_pressure(&mut self, dt_secs: f64, decay_secs: f64) {
        if decay_secs <= 0.0 {
            return;
        }
        let step = dt_secs / decay_secs;
        self.pressure.retain(|_, p| {
            *p -= step;
            *p > 0.0
        });
    }

    /// Remove and return every challenge whose expiry tick has passed.
    pub fn expire_sweep(&mut self, current_tick: u64) -> Vec<Challenge> {
        let expired: Vec<ChallengeId> = self
            .open
            .values()
            .filter(|c| current_tick > c.expires_at_tick)
            .map(|c| c.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.open.remove(&id))
            .collect()
    }

    /// Drop all open challenges without refunds. Used by the era soft
    /// reset.
    pub fn clear(&mut self) {
        self.open.clear();
        self.pressure.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::GameConfig;

    fn tuning() -> ChallengeTuning {
        GameConfig::default().challenge
    }

    fn farm() -> BuildingDef {
        Catalog::default().building(&"farm".into()).unwrap().clone()
    }

    #[test]
    fn difficulty_clamps_to_band() {
        assert_eq!(
            challenge_difficulty(0.0, 0, ChallengeKind::Build),
            1,
            "floor"
        );
        assert_eq!(challenge_difficulty(1.0, 0, ChallengeKind::Build), 1);
        assert_eq!(challenge_difficulty(1.0, 2, ChallengeKind::Demolish), 5);
        assert_eq!(challenge_difficulty(10.0, 9, ChallengeKind::Demolish), 10);
    }

    #[test]
    fn spam_tax_caps() {
        let t = tuning();
        assert_eq!(spam_tax(&t, 0, 1.0), 1.0);
        assert!((spam_tax(&t, 3, 1.0) - 1.36).abs() < 1e-9);
        assert_eq!(spam_tax(&t, 100, 1.0), t.spam_tax_cap);
        // A half-scale skill halves the per-level step.
        assert!((spam_tax(&t, 3, 0.5) - 1.18).abs() < 1e-9);
    }

    #[test]
    fn upgrade_cost_grows_with_level() {
        let t = tuning();
        let def = farm();
        let m = ModifierSet::default();
        let l1 = upgrade_cost(&t, &def, 1, &m, 1.0);
        let l3 = upgrade_cost(&t, &def, 3, &m, 1.0);
        assert!(l3.energy > l1.energy);
        // level 1 -> 2 costs base * 1.35, ceiled.
        assert_eq!(l1.energy, (30.0f64 * 1.35).ceil());
    }

    #[test]
    fn upgrade_research_cost_climbs_gently() {
        let t = tuning();
        let def = Catalog::default()
            .building(&"fusion_plant".into())
            .unwrap()
            .clone();
        let m = ModifierSet::default();
        let l3 = upgrade_cost(&t, &def, 3, &m, 1.0);
        // Energy and food take the full step, research the reduced one.
        assert_eq!(l3.energy, (200.0f64 * (1.0 + 3.0 * 0.35)).ceil());
        assert_eq!(l3.food, (100.0f64 * (1.0 + 3.0 * 0.35)).ceil());
        assert_eq!(l3.research, (50.0f64 * (1.0 + 3.0 * 0.15)).ceil());
        // The curve still climbs strictly.
        let l4 = upgrade_cost(&t, &def, 4, &m, 1.0);
        assert!(l4.research > l3.research);
    }

    #[test]
    fn demolish_refund_stays_below_invested() {
        let t = tuning();
        let def = farm();
        for level in 1..=5u32 {
            let mut invested = def.cost;
            for l in 1..level {
                invested.refund(&upgrade_cost(
                    &t,
                    &def,
                    l,
                    &ModifierSet::default(),
                    1.0,
                ));
            }
            let refund = demolish_refund(&t, &def, level);
            assert!(
                refund.energy <= invested.energy,
                "refund exceeds invested at level {level}"
            );
        }
    }

    #[test]
    fn pressure_decays_to_zero() {
        let mut book = ChallengeBook::default();
        let id = book.mint_id();
        book.insert(Challenge {
            id,
            kind: ChallengeKind::Build,
            building_type: "farm".into(),
            target: None,
            placement: None,
            initiator: "p1".into(),
            difficulty: 1,
            need: 6.4,
            created_tick: 0,
            expires_at_tick: 8,
            cost_paid: ResourceBag::ZERO,
        });
        assert_eq!(book.spam_level(&"farm".into()), 1);
        book.decay_pressure(30.0, 60.0);
        assert_eq!(book.spam_level(&"farm".into()), 0);
        book.decay_pressure(31.0, 60.0);
        assert_eq!(book.spam_level(&"farm".into()), 0);
        assert!(book.open.contains_key(&id));
    }

    #[test]
    fn expire_sweep_takes_only_past_deadline() {
        let mut book = ChallengeBook::default();
        for expires in [5u64, 10, 15] {
            let id = book.mint_id();
            book.insert(Challenge {
                id,
                kind: ChallengeKind::Build,
                building_type: "farm".into(),
                target: None,
                placement: None,
                initiator: "p1".into(),
                difficulty: 1,
                need: 6.4,
                created_tick: 0,
                expires_at_tick: expires,
                cost_paid: ResourceBag::ZERO,
            });
        }
        assert!(book.expire_sweep(5).is_empty(), "deadline tick still live");
        let swept = book.expire_sweep(11);
        assert_eq!(swept.len(), 2);
        assert_eq!(book.open.len(), 1);
    }
}
