// nexus_protocol — wire protocol for session server communication.
//
// This crate defines the message types, framing, and serialization used by
// the session server (`nexus_server`) and game clients to communicate over
// TCP. It is shared between both sides.
//
// Module overview:
// - `types.rs`:    `ClientId` and the protocol version constant.
// - `message.rs`:  Client-to-server and server-to-client message enums,
//                  plus supporting structs (`CommandResult`, `PlayerInfo`).
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Matches the sim's existing serde_json usage.
//   Binary framing can be swapped in later if bandwidth matters.
// - **Typed command payloads.** The server is authoritative and must
//   inspect every command, so messages carry real `nexus_sim` types instead
//   of opaque bytes. Snapshots remain a JSON string so the wire enum is
//   insulated from sim struct churn.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientMessage, CommandResult, PlayerInfo, ServerMessage};
pub use types::{ClientId, PROTOCOL_VERSION};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use nexus_sim::colony::ChallengeRequest;
    use nexus_sim::note::{ColonyNote, NoteKind};
    use nexus_sim::types::{Cell, ChallengeId, InstanceId, Role};

    use super::*;

    /// Serialize a ClientMessage to JSON, frame it, read it back, deserialize.
    fn client_roundtrip(msg: &ClientMessage) {
        let json = serde_json::to_vec(msg).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: ClientMessage = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(&recovered, msg);
    }

    /// Serialize a ServerMessage to JSON, frame it, read it back, deserialize.
    fn server_roundtrip(msg: &ServerMessage) {
        let json = serde_json::to_vec(msg).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: ServerMessage = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_hello() {
        client_roundtrip(&ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: "Vega".into(),
            player_key: "acct-7f3a".into(),
            role: Role::Engineer,
            session_code: Some("amber-relay-42".into()),
        });
    }

    #[test]
    fn roundtrip_hello_creates_session() {
        client_roundtrip(&ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: "Vega".into(),
            player_key: "acct-7f3a".into(),
            role: Role::Diplomat,
            session_code: None,
        });
    }

    #[test]
    fn roundtrip_place_building() {
        client_roundtrip(&ClientMessage::PlaceBuilding {
            building_type: "farm".into(),
            origin: Cell::new(3, 1),
        });
    }

    #[test]
    fn roundtrip_start_challenge() {
        client_roundtrip(&ClientMessage::StartChallenge {
            request: ChallengeRequest::Build {
                building_type: "generator".into(),
                placement: Some(Cell::new(0, 0)),
            },
        });
        client_roundtrip(&ClientMessage::StartChallenge {
            request: ChallengeRequest::Demolish {
                instance: InstanceId(9),
            },
        });
    }

    #[test]
    fn roundtrip_resolve_challenge() {
        client_roundtrip(&ClientMessage::ResolveChallenge {
            challenge: ChallengeId(4),
            score: 11.5,
        });
    }

    #[test]
    fn roundtrip_unlock_messages() {
        client_roundtrip(&ClientMessage::UnlockEra);
        client_roundtrip(&ClientMessage::UnlockSkill {
            skill: "hydroponics".into(),
        });
    }

    #[test]
    fn roundtrip_goodbye() {
        client_roundtrip(&ClientMessage::Goodbye);
    }

    #[test]
    fn roundtrip_welcome() {
        server_roundtrip(&ServerMessage::Welcome {
            client_id: ClientId(1),
            session_code: "amber-relay-42".into(),
            players: vec![PlayerInfo {
                client_id: ClientId(0),
                player_key: "acct-11".into(),
                name: "Host".into(),
                role: Role::Logistician,
            }],
            state_json: r#"{"tick":0}"#.into(),
        });
    }

    #[test]
    fn roundtrip_rejected() {
        server_roundtrip(&ServerMessage::Rejected {
            reason: "protocol version mismatch".into(),
        });
    }

    #[test]
    fn roundtrip_command_ok() {
        server_roundtrip(&ServerMessage::CommandOk {
            result: CommandResult::Placed {
                instance: InstanceId(3),
            },
        });
        server_roundtrip(&ServerMessage::CommandOk {
            result: CommandResult::SkillUnlocked {
                skill: "efficiency_1".into(),
                points_left: 2,
            },
        });
    }

    #[test]
    fn roundtrip_command_failed() {
        server_roundtrip(&ServerMessage::CommandFailed {
            reason: "footprint overlaps an existing building".into(),
        });
    }

    #[test]
    fn roundtrip_state_update() {
        server_roundtrip(&ServerMessage::StateUpdate {
            tick: 120,
            state_json: r#"{"tick":120}"#.into(),
        });
    }

    #[test]
    fn roundtrip_notes() {
        server_roundtrip(&ServerMessage::Notes {
            notes: vec![ColonyNote {
                tick: 7,
                kind: NoteKind::Blackout,
            }],
        });
    }

    #[test]
    fn roundtrip_player_joined_and_left() {
        server_roundtrip(&ServerMessage::PlayerJoined {
            player: PlayerInfo {
                client_id: ClientId(2),
                player_key: "acct-9".into(),
                name: "Newcomer".into(),
                role: Role::Researcher,
            },
        });
        server_roundtrip(&ServerMessage::PlayerLeft {
            client_id: ClientId(2),
            name: "Newcomer".into(),
        });
    }

    #[test]
    fn roundtrip_chat() {
        client_roundtrip(&ClientMessage::Chat {
            text: "need a second lab before the era push".into(),
        });
        server_roundtrip(&ServerMessage::ChatBroadcast {
            from: ClientId(0),
            name: "Host".into(),
            text: "on it".into(),
        });
    }
}
