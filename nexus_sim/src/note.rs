// Colony notes: the human-readable event feed.
//
// Ticks and commands emit notes describing what just happened. The session
// layer drains them after each mutation and fans them out to clients; the
// sim itself never reads them back.

use crate::types::{BuildingTypeId, ChallengeId, ChallengeKind, EraId, InstanceId, SkillId};
use serde::{Deserialize, Serialize};

/// One entry in a session's event feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColonyNote {
    /// Session tick the note was emitted on.
    pub tick: u64,
    pub kind: NoteKind,
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NoteKind {
    BuildingPlaced {
        instance: InstanceId,
        building_type: BuildingTypeId,
    },
    ConstructionStarted {
        building_type: BuildingTypeId,
        ready_at_secs: f64,
    },
    BuildingCompleted {
        instance: InstanceId,
        building_type: BuildingTypeId,
    },
    /// A finished build could not be placed anywhere; part of the cost came
    /// back.
    ConstructionRefunded {
        building_type: BuildingTypeId,
    },
    BuildingUpgraded {
        instance: InstanceId,
        level: u32,
    },
    BuildingRepaired {
        instance: InstanceId,
    },
    BuildingDemolished {
        instance: InstanceId,
        building_type: BuildingTypeId,
    },
    ChallengeResolved {
        challenge: ChallengeId,
        kind: ChallengeKind,
        passed: bool,
    },
    ChallengeExpired {
        challenge: ChallengeId,
        kind: ChallengeKind,
    },
    StarvationDeaths {
        deaths: u64,
    },
    /// Energy hit zero this tick; stability is draining faster.
    Blackout,
    EraUnlocked {
        era: EraId,
        prestige_level: u32,
    },
    SkillUnlocked {
        skill: SkillId,
    },
    /// The colony is lost; the session stops simulating.
    Collapsed {
        reason: CollapseReason,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseReason {
    PopulationLost,
    StabilityLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_tag_by_event_on_the_wire() {
        let note = ColonyNote {
            tick: 3,
            kind: NoteKind::Blackout,
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["tick"], 3);
        assert_eq!(json["kind"]["event"], "blackout");
    }

    #[test]
    fn challenge_notes_carry_their_kind() {
        let kind = NoteKind::ChallengeExpired {
            challenge: ChallengeId(7),
            kind: ChallengeKind::Build,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["event"], "challenge_expired");
        assert_eq!(json["kind"], "build");
        let back: NoteKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }
}
