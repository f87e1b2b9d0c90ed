// Core types shared across the simulation.
//
// Defines grid coordinates (`Cell`), entity identifiers, player roles, and
// challenge kinds. All types derive `Serialize` and `Deserialize` for
// snapshots and multiplayer state transfer.
//
// **Critical constraint: determinism.** Entity IDs are minted from
// per-session monotonic counters held in `ColonyState`. Do not use UUID
// libraries or OS entropy.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position on the 2D colony grid. The origin is the north-west corner;
/// x grows east, y grows south.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Compact entity IDs — per-session monotonic counters
// ---------------------------------------------------------------------------

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

counter_id!(/// Unique identifier for a placed building instance.
InstanceId);
counter_id!(/// Unique identifier for an open challenge.
ChallengeId);

// ---------------------------------------------------------------------------
// String-keyed IDs — stable catalog and account keys
// ---------------------------------------------------------------------------

macro_rules! keyed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

keyed_id!(/// Opaque account key for a player, stable across sessions.
PlayerId);
keyed_id!(/// Catalog key for a building type (e.g. `"farm"`).
BuildingTypeId);
keyed_id!(/// Catalog key for an era (e.g. `"industrial"`).
EraId);
keyed_id!(/// Catalog key for a skill tree node.
SkillId);

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// The role a player picked when joining a session. Each role contributes a
/// fixed bundle of modifiers while its holder is on the roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Engineer,
    Researcher,
    Logistician,
    Diplomat,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Engineer,
        Role::Researcher,
        Role::Logistician,
        Role::Diplomat,
    ];
}

/// What a challenge, once passed, will do to the colony.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Build,
    Upgrade,
    Demolish,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeKind::Build => "build",
            ChallengeKind::Upgrade => "upgrade",
            ChallengeKind::Demolish => "demolish",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_ordering() {
        // Cells key BTree maps and sets, so a total order is required.
        let a = Cell::new(0, 0);
        let b = Cell::new(1, 0);
        assert!(a < b);
    }

    #[test]
    fn keyed_id_serializes_transparent() {
        let id = BuildingTypeId::from("farm");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"farm\"");
        let restored: BuildingTypeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn challenge_kind_snake_case_wire_form() {
        let json = serde_json::to_string(&ChallengeKind::Demolish).unwrap();
        assert_eq!(json, "\"demolish\"");
    }

    #[test]
    fn counter_id_display() {
        assert_eq!(InstanceId(7).to_string(), "InstanceId(7)");
    }
}
