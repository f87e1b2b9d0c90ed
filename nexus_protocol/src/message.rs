// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by game clients to the session server.
// - `ServerMessage`: sent by the session server to game clients.
//
// Unlike a dumb relay, the server is authoritative: it inspects every
// command, runs it through the sim, and fans out the results. Command
// payloads therefore use real sim types (`ChallengeRequest`, `SkillId`,
// receipts) rather than opaque bytes, and this crate depends on
// `nexus_sim`. Snapshots stay as a JSON string so the wire shape does not
// chase every sim struct change.

use nexus_sim::colony::{ChallengeRequest, ChallengeTicket, EraTicket};
use nexus_sim::challenge::Verdict;
use nexus_sim::note::ColonyNote;
use nexus_sim::types::{BuildingTypeId, Cell, ChallengeId, InstanceId, PlayerId, Role, SkillId};
use serde::{Deserialize, Serialize};

use crate::types::ClientId;

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join a session (handshake). `session_code: None` creates a new
    /// session; the server replies with its code in `Welcome`.
    Hello {
        protocol_version: u32,
        player_name: String,
        /// Stable account key; progress is stored against it.
        player_key: PlayerId,
        role: Role,
        session_code: Option<String>,
    },
    /// Place a building immediately at base cost.
    PlaceBuilding {
        building_type: BuildingTypeId,
        origin: Cell,
    },
    /// Open a build/upgrade/demolish challenge.
    StartChallenge { request: ChallengeRequest },
    /// Submit a score for an open challenge.
    ResolveChallenge { challenge: ChallengeId, score: f64 },
    /// Advance the session to the next era.
    UnlockEra,
    /// Spend skill points on a skill tree node.
    UnlockSkill { skill: SkillId },
    /// Ask for a full state snapshot out of band.
    RequestState,
    /// Chat message.
    Chat { text: String },
    /// Player is leaving gracefully.
    Goodbye,
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome {
        client_id: ClientId,
        session_code: String,
        players: Vec<PlayerInfo>,
        /// Full `ColonyState` snapshot as JSON.
        state_json: String,
    },
    /// Handshake rejected; the connection closes after this.
    Rejected { reason: String },
    /// A command was accepted; here is its receipt.
    CommandOk { result: CommandResult },
    /// A command was refused; the session is unchanged.
    CommandFailed { reason: String },
    /// Periodic authoritative snapshot after each tick.
    StateUpdate {
        tick: u64,
        /// Full `ColonyState` snapshot as JSON.
        state_json: String,
    },
    /// Event feed entries since the last update.
    Notes { notes: Vec<ColonyNote> },
    /// A player connected to this session.
    PlayerJoined { player: PlayerInfo },
    /// A player disconnected from this session.
    PlayerLeft { client_id: ClientId, name: String },
    /// Chat from another player.
    ChatBroadcast { from: ClientId, name: String, text: String },
}

/// Receipts for accepted commands, mirroring the sim's return values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Placed { instance: InstanceId },
    ChallengeOpened { ticket: ChallengeTicket },
    ChallengeResolved { verdict: Verdict },
    EraUnlocked { ticket: EraTicket },
    SkillUnlocked { skill: SkillId, points_left: u32 },
}

/// Public identity of a connected player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub client_id: ClientId,
    pub player_key: PlayerId,
    pub name: String,
    pub role: Role,
}
