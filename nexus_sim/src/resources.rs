// The colony's shared resource ledger.
//
// All five tracked quantities live in one `ResourceBag` so that costs,
// production rates, maintenance rates, and the ledger itself share a single
// arithmetic vocabulary. Rates are expressed per second of simulated time
// and integrated with `add_scaled`.

use serde::{Deserialize, Serialize};

/// A bundle of the five colony resources.
///
/// Depending on context this is a ledger (current stock), a cost, or a
/// per-second rate. `stability` is special: as a ledger field it is clamped
/// to `[0, 100]` at the end of every tick, and building definitions carry
/// their stability contribution separately (see `BuildingDef`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceBag {
    pub energy: f64,
    pub food: f64,
    pub population: f64,
    pub research: f64,
    pub stability: f64,
}

impl ResourceBag {
    pub const ZERO: ResourceBag = ResourceBag {
        energy: 0.0,
        food: 0.0,
        population: 0.0,
        research: 0.0,
        stability: 0.0,
    };

    /// Add `rate * factor` to each field. The workhorse of the tick loop:
    /// `factor` is either a dt in seconds or a signed multiplier.
    pub fn add_scaled(&mut self, rate: &ResourceBag, factor: f64) {
        self.energy += rate.energy * factor;
        self.food += rate.food * factor;
        self.population += rate.population * factor;
        self.research += rate.research * factor;
        self.stability += rate.stability * factor;
    }

    /// A copy with every field multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> ResourceBag {
        let mut out = *self;
        out.energy *= factor;
        out.food *= factor;
        out.population *= factor;
        out.research *= factor;
        out.stability *= factor;
        out
    }

    /// A copy with every field rounded up. Charged costs are ceiled so that
    /// multipliers slightly above 1.0 never round back down to the base cost.
    pub fn ceiled(&self) -> ResourceBag {
        ResourceBag {
            energy: self.energy.ceil(),
            food: self.food.ceil(),
            population: self.population.ceil(),
            research: self.research.ceil(),
            stability: self.stability.ceil(),
        }
    }

    /// A copy with every field rounded down. Refunds are floored so a
    /// charge-then-refund cycle can never mint resources.
    pub fn floored(&self) -> ResourceBag {
        ResourceBag {
            energy: self.energy.floor(),
            food: self.food.floor(),
            population: self.population.floor(),
            research: self.research.floor(),
            stability: self.stability.floor(),
        }
    }

    /// Whether the ledger can pay `cost` without any field going negative.
    pub fn can_afford(&self, cost: &ResourceBag) -> bool {
        self.energy >= cost.energy
            && self.food >= cost.food
            && self.population >= cost.population
            && self.research >= cost.research
            && self.stability >= cost.stability
    }

    /// Deduct `cost` from the ledger. Callers must check `can_afford` first;
    /// the command layer treats check-then-spend as one atomic step.
    pub fn spend(&mut self, cost: &ResourceBag) {
        self.add_scaled(cost, -1.0);
    }

    /// Credit `amount` back to the ledger.
    pub fn refund(&mut self, amount: &ResourceBag) {
        self.add_scaled(amount, 1.0);
    }

    /// End-of-tick normalization: no field below zero, stability capped
    /// at 100.
    pub fn clamp_after_tick(&mut self) {
        self.energy = self.energy.max(0.0);
        self.food = self.food.max(0.0);
        self.population = self.population.max(0.0);
        self.research = self.research.max(0.0);
        self.stability = self.stability.clamp(0.0, 100.0);
    }

    /// Raise fields onto floors granted by skills or roles. Applied after
    /// clamping so a floor survives the tick's own drains.
    pub fn apply_floors(&mut self, min_stability: f64, min_food: f64) {
        self.stability = self.stability.max(min_stability);
        self.food = self.food.max(min_food);
    }

    /// True when every field is zero. Used to skip no-op refunds.
    pub fn is_zero(&self) -> bool {
        *self == ResourceBag::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(energy: f64, food: f64) -> ResourceBag {
        ResourceBag {
            energy,
            food,
            ..ResourceBag::ZERO
        }
    }

    #[test]
    fn add_scaled_integrates_rates() {
        let mut ledger = bag(100.0, 50.0);
        let rate = bag(2.0, -0.5);
        ledger.add_scaled(&rate, 10.0);
        assert_eq!(ledger.energy, 120.0);
        assert_eq!(ledger.food, 45.0);
    }

    #[test]
    fn can_afford_requires_every_field() {
        let ledger = bag(100.0, 10.0);
        assert!(ledger.can_afford(&bag(100.0, 10.0)));
        assert!(!ledger.can_afford(&bag(100.0, 10.1)));
        assert!(!ledger.can_afford(&bag(100.1, 0.0)));
    }

    #[test]
    fn ceil_charge_floor_refund_never_mints() {
        let cost = bag(10.0, 0.0).scaled(1.07).ceiled();
        assert_eq!(cost.energy, 11.0);
        let refund = cost.scaled(0.5).floored();
        assert_eq!(refund.energy, 5.0);
        assert!(refund.energy <= cost.energy * 0.5);
    }

    #[test]
    fn clamp_after_tick_bounds_stability() {
        let mut ledger = ResourceBag {
            energy: -3.0,
            food: 0.0,
            population: 2.0,
            research: 1.0,
            stability: 140.0,
        };
        ledger.clamp_after_tick();
        assert_eq!(ledger.energy, 0.0);
        assert_eq!(ledger.stability, 100.0);
        ledger.stability = -5.0;
        ledger.clamp_after_tick();
        assert_eq!(ledger.stability, 0.0);
    }

    #[test]
    fn floors_lift_but_never_lower() {
        let mut ledger = bag(0.0, 3.0);
        ledger.stability = 40.0;
        ledger.apply_floors(15.0, 10.0);
        assert_eq!(ledger.stability, 40.0);
        assert_eq!(ledger.food, 10.0);
    }
}
