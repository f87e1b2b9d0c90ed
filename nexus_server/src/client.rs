// TCP client for connecting to a colony server.
//
// Provides a non-blocking interface for a frontend (or integration test) to
// talk to the server. Architecture:
// - `connect()` performs TCP connect + Hello handshake on the calling thread,
//   then spawns a background reader thread.
// - The reader thread calls `read_message()` in a loop, deserializes
//   `ServerMessage`, and pushes into an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// This separation ensures the caller never blocks on network I/O. The
// reader thread handles the blocking reads, and the writer flushes
// synchronously (acceptable for the small messages we send).

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use nexus_protocol::framing::{read_message, write_message};
use nexus_protocol::message::{ClientMessage, PlayerInfo, ServerMessage};
use nexus_protocol::types::{ClientId, PROTOCOL_VERSION};
use nexus_sim::colony::ChallengeRequest;
use nexus_sim::types::{BuildingTypeId, Cell, ChallengeId, PlayerId, Role, SkillId};

/// Information returned by a successful `connect()` handshake.
#[derive(Debug)]
pub struct WelcomeInfo {
    pub client_id: ClientId,
    pub session_code: String,
    pub players: Vec<PlayerInfo>,
    /// Full `ColonyState` snapshot as JSON.
    pub state_json: String,
}

/// TCP client for colony server communication.
#[derive(Debug)]
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    pub client_id: ClientId,
}

impl NetClient {
    /// Connect to a colony server, perform the Hello handshake, and spawn a
    /// reader thread. Returns the client and welcome info on success.
    pub fn connect(
        addr: &str,
        player_name: &str,
        player_key: PlayerId,
        role: Role,
        session_code: Option<String>,
    ) -> Result<(Self, WelcomeInfo), String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect failed: {e}"))?;

        // Set a read timeout for the handshake.
        stream
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .ok();

        let reader_stream = stream
            .try_clone()
            .map_err(|e| format!("clone failed: {e}"))?;
        let mut writer = BufWriter::new(stream);

        let hello = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: player_name.into(),
            player_key,
            role,
            session_code,
        };
        send_msg(&mut writer, &hello).map_err(|e| format!("send Hello failed: {e}"))?;

        // Read Welcome or Rejected.
        let mut reader = BufReader::new(reader_stream);
        let response_bytes =
            read_message(&mut reader).map_err(|e| format!("read Welcome failed: {e}"))?;
        let response: ServerMessage = serde_json::from_slice(&response_bytes)
            .map_err(|e| format!("parse Welcome failed: {e}"))?;

        let welcome_info = match response {
            ServerMessage::Welcome {
                client_id,
                session_code,
                players,
                state_json,
            } => WelcomeInfo {
                client_id,
                session_code,
                players,
                state_json,
            },
            ServerMessage::Rejected { reason } => {
                return Err(format!("rejected: {reason}"));
            }
            other => {
                return Err(format!("unexpected response: {other:?}"));
            }
        };

        // Clear read timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        // Spawn reader thread.
        let (tx, rx) = mpsc::channel();
        let client_id = welcome_info.client_id;
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
                client_id,
            },
            welcome_info,
        ))
    }

    /// Place a building immediately at base cost.
    pub fn place_building(
        &mut self,
        building_type: BuildingTypeId,
        origin: Cell,
    ) -> Result<(), String> {
        self.send(&ClientMessage::PlaceBuilding {
            building_type,
            origin,
        })
    }

    /// Open a build/upgrade/demolish challenge.
    pub fn start_challenge(&mut self, request: ChallengeRequest) -> Result<(), String> {
        self.send(&ClientMessage::StartChallenge { request })
    }

    /// Submit a score for an open challenge.
    pub fn resolve_challenge(&mut self, challenge: ChallengeId, score: f64) -> Result<(), String> {
        self.send(&ClientMessage::ResolveChallenge { challenge, score })
    }

    /// Ask the server to advance the session to the next era.
    pub fn unlock_era(&mut self) -> Result<(), String> {
        self.send(&ClientMessage::UnlockEra)
    }

    /// Spend skill points on a skill tree node.
    pub fn unlock_skill(&mut self, skill: SkillId) -> Result<(), String> {
        self.send(&ClientMessage::UnlockSkill { skill })
    }

    /// Ask for a full state snapshot out of band.
    pub fn request_state(&mut self) -> Result<(), String> {
        self.send(&ClientMessage::RequestState)
    }

    /// Send a chat message.
    pub fn send_chat(&mut self, text: &str) -> Result<(), String> {
        self.send(&ClientMessage::Chat { text: text.into() })
    }

    /// Send Goodbye and close the connection.
    pub fn disconnect(&mut self) {
        let _ = send_msg(&mut self.writer, &ClientMessage::Goodbye);
    }

    /// Send an arbitrary client message.
    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), String> {
        send_msg(&mut self.writer, msg).map_err(|e| format!("send failed: {e}"))
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Block until the next server message arrives, up to `timeout`.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<ServerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

/// Serialize a `ClientMessage` to JSON and write with length-delimited framing.
fn send_msg(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) -> Result<(), String> {
    let json = serde_json::to_vec(msg).map_err(|e| e.to_string())?;
    write_message(writer, &json).map_err(|e| e.to_string())
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Caller dropped the receiver
                }
            }
            Err(_) => break, // Malformed message
        }
    }
}
