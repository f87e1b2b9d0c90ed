// Session state for the colony server.
//
// `Session` is the central data structure that `server.rs` drives: one
// cooperative colony, its connected members, their cached progress, and the
// aggregated modifier set. All mutation happens through methods called from
// the server's single-threaded main loop — no internal locking.
//
// Key responsibilities:
// - Member management: add/remove members, broadcast join/leave, keep the
//   roster's `PlayerProgress` cached while they are connected.
// - Command dispatch: translate protocol messages into sim commands, send
//   the receipt to the issuer, fan the resulting notes out to everyone.
// - Ticking: measure real elapsed time between ticks and feed it to the sim
//   as dt, then broadcast the authoritative state.
// - Modifier aggregation: recompute the session `ModifierSet` whenever the
//   roster, a skill, the era, or prestige changes.
//
// Writing to client streams: `Session` holds cloned `TcpStream` write
// halves wrapped in `BufWriter`. Write errors on a single client are logged
// but do not crash the server — the reader thread for that client will
// detect the broken pipe and send a `Disconnected` event.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufWriter;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nexus_protocol::framing::write_message;
use nexus_protocol::message::{ClientMessage, CommandResult, PlayerInfo, ServerMessage};
use nexus_protocol::types::ClientId;
use nexus_sim::catalog::Catalog;
use nexus_sim::colony::{ChallengeRequest, ColonyState};
use nexus_sim::config::GameConfig;
use nexus_sim::modifiers::{self, ModifierSet};
use nexus_sim::progression::PlayerProgress;
use nexus_sim::tick;
use nexus_sim::types::{BuildingTypeId, Cell, ChallengeId, ChallengeKind, PlayerId, Role, SkillId};

struct Member {
    player_key: PlayerId,
    name: String,
    role: Role,
    writer: BufWriter<TcpStream>,
}

/// One running colony and its connected members.
pub struct Session {
    pub code: String,
    pub colony: ColonyState,
    members: BTreeMap<ClientId, Member>,
    /// Progress cache for connected accounts; flushed to the store by the
    /// server when marked dirty.
    progress: BTreeMap<PlayerId, PlayerProgress>,
    modifiers: ModifierSet,
    catalog: Arc<Catalog>,
    config: Arc<GameConfig>,
    max_members: usize,
    tick_interval: Duration,
    last_tick_at: Instant,
    next_tick_at: Instant,
}

impl Session {
    pub fn new(
        code: String,
        catalog: Arc<Catalog>,
        config: Arc<GameConfig>,
        max_members: usize,
    ) -> Self {
        let colony = ColonyState::new(&config, &catalog);
        Self::resume(code, colony, catalog, config, max_members)
    }

    /// Wrap an existing colony (fresh or restored from a snapshot).
    pub fn resume(
        code: String,
        colony: ColonyState,
        catalog: Arc<Catalog>,
        config: Arc<GameConfig>,
        max_members: usize,
    ) -> Self {
        let tick_interval = Duration::from_secs_f64(config.default_tick_secs);
        let now = Instant::now();
        let mut session = Self {
            code,
            colony,
            members: BTreeMap::new(),
            progress: BTreeMap::new(),
            modifiers: ModifierSet::default(),
            catalog,
            config,
            max_members,
            tick_interval,
            last_tick_at: now,
            next_tick_at: now + tick_interval,
        };
        session.recompute_modifiers();
        session
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_collapsed(&self) -> bool {
        self.colony.collapsed
    }

    pub fn next_tick_at(&self) -> Instant {
        self.next_tick_at
    }

    /// Cached progress for a connected account.
    pub fn progress_of(&self, player_key: &PlayerId) -> Option<&PlayerProgress> {
        self.progress.get(player_key)
    }

    pub fn member_list(&self) -> Vec<PlayerInfo> {
        self.members
            .iter()
            .map(|(cid, m)| PlayerInfo {
                client_id: *cid,
                player_key: m.player_key.clone(),
                name: m.name.clone(),
                role: m.role,
            })
            .collect()
    }

    fn state_json(&self) -> String {
        serde_json::to_string(&self.colony).unwrap_or_else(|e| {
            warn!("session {}: snapshot serialization failed: {e}", self.code);
            String::from("{}")
        })
    }

    /// Serialized colony for the persistence layer.
    pub fn snapshot_json(&self) -> String {
        self.state_json()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add a member. Broadcasts `PlayerJoined` to the existing roster, then
    /// sends `Welcome` (with a full snapshot) to the newcomer.
    pub fn add_member(
        &mut self,
        client_id: ClientId,
        player_key: PlayerId,
        name: String,
        role: Role,
        progress: PlayerProgress,
        stream: TcpStream,
    ) -> Result<(), String> {
        if self.members.len() >= self.max_members {
            return Err("session is full".into());
        }
        let joined = ServerMessage::PlayerJoined {
            player: PlayerInfo {
                client_id,
                player_key: player_key.clone(),
                name: name.clone(),
                role,
            },
        };
        self.broadcast(&joined);

        self.progress.insert(player_key.clone(), progress);
        self.members.insert(
            client_id,
            Member {
                player_key,
                name,
                role,
                writer: BufWriter::new(stream),
            },
        );
        self.recompute_modifiers();

        let welcome = ServerMessage::Welcome {
            client_id,
            session_code: self.code.clone(),
            players: self.member_list(),
            state_json: self.state_json(),
        };
        self.send_to(client_id, &welcome);
        Ok(())
    }

    /// Remove a member, broadcast their departure, and hand their progress
    /// back so the caller can persist it.
    pub fn remove_member(&mut self, client_id: ClientId) -> Option<(PlayerId, PlayerProgress)> {
        let member = self.members.remove(&client_id)?;
        let msg = ServerMessage::PlayerLeft {
            client_id,
            name: member.name,
        };
        self.broadcast(&msg);
        self.recompute_modifiers();
        // Another connection may share the account; keep its cache then.
        let still_here = self
            .members
            .values()
            .any(|m| m.player_key == member.player_key);
        let progress = if still_here {
            self.progress.get(&member.player_key).cloned()?
        } else {
            self.progress.remove(&member.player_key)?
        };
        Some((member.player_key, progress))
    }

    /// Fold roster roles, the union of cached skills, prestige, and era
    /// into the session modifier set.
    fn recompute_modifiers(&mut self) {
        let roles: Vec<Role> = self.members.values().map(|m| m.role).collect();
        let skills: BTreeSet<&SkillId> = self
            .progress
            .values()
            .flat_map(|p| p.skills.iter())
            .collect();
        self.modifiers = modifiers::aggregate(
            &self.config,
            &self.catalog,
            roles,
            skills,
            self.colony.prestige_level,
            &self.colony.era,
        );
    }

    // -----------------------------------------------------------------------
    // Command dispatch
    // -----------------------------------------------------------------------

    /// Dispatch one protocol message from a connected member. Returns the
    /// account whose persisted progress changed, if any.
    pub fn handle_message(
        &mut self,
        client_id: ClientId,
        message: ClientMessage,
    ) -> Option<PlayerId> {
        let member = self.members.get(&client_id)?;
        let player_key = member.player_key.clone();
        let mut progress_dirty = None;
        match message {
            ClientMessage::PlaceBuilding {
                building_type,
                origin,
            } => {
                if self.place_building(client_id, &player_key, &building_type, origin) {
                    progress_dirty = Some(player_key);
                }
            }
            ClientMessage::StartChallenge { request } => {
                self.start_challenge(client_id, &player_key, request);
            }
            ClientMessage::ResolveChallenge { challenge, score } => {
                if self.resolve_challenge(client_id, &player_key, challenge, score) {
                    progress_dirty = Some(player_key);
                }
            }
            ClientMessage::UnlockEra => {
                if self.unlock_era(client_id, &player_key) {
                    progress_dirty = Some(player_key);
                }
            }
            ClientMessage::UnlockSkill { skill } => {
                if self.unlock_skill(client_id, &player_key, &skill) {
                    progress_dirty = Some(player_key);
                }
            }
            ClientMessage::RequestState => {
                let msg = ServerMessage::StateUpdate {
                    tick: self.colony.tick,
                    state_json: self.state_json(),
                };
                self.send_to(client_id, &msg);
            }
            ClientMessage::Chat { text } => {
                let name = self
                    .members
                    .get(&client_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                self.broadcast(&ServerMessage::ChatBroadcast {
                    from: client_id,
                    name,
                    text,
                });
            }
            ClientMessage::Hello { .. } | ClientMessage::Goodbye => {
                // Hello is handled during connection setup, Goodbye in the
                // reader loop.
            }
        }
        progress_dirty
    }

    fn place_building(
        &mut self,
        client_id: ClientId,
        player_key: &PlayerId,
        building_type: &BuildingTypeId,
        origin: Cell,
    ) -> bool {
        let result = self.colony.place_building(
            &self.catalog,
            &self.modifiers,
            building_type,
            origin,
            player_key,
        );
        match result {
            Ok(instance) => {
                let mut dirty = false;
                if let Some(p) = self.progress.get_mut(player_key) {
                    p.lifetime.buildings_placed += 1;
                    dirty = true;
                }
                self.send_to(
                    client_id,
                    &ServerMessage::CommandOk {
                        result: CommandResult::Placed { instance },
                    },
                );
                self.flush_notes();
                dirty
            }
            Err(e) => {
                self.reject(client_id, &e.to_string());
                false
            }
        }
    }

    fn start_challenge(
        &mut self,
        client_id: ClientId,
        player_key: &PlayerId,
        request: ChallengeRequest,
    ) {
        let result = self.colony.start_challenge(
            &self.catalog,
            &self.config,
            &self.modifiers,
            player_key,
            request,
        );
        match result {
            Ok(ticket) => {
                self.send_to(
                    client_id,
                    &ServerMessage::CommandOk {
                        result: CommandResult::ChallengeOpened { ticket },
                    },
                );
            }
            Err(e) => self.reject(client_id, &e.to_string()),
        }
    }

    fn resolve_challenge(
        &mut self,
        client_id: ClientId,
        player_key: &PlayerId,
        challenge: ChallengeId,
        score: f64,
    ) -> bool {
        let result = self.colony.resolve_challenge(
            &self.catalog,
            &self.config,
            &self.modifiers,
            challenge,
            score,
        );
        match result {
            Ok(verdict) => {
                let mut dirty = false;
                if let Some(p) = self.progress.get_mut(player_key) {
                    if verdict.passed {
                        p.lifetime.challenges_passed += 1;
                        match verdict.kind {
                            ChallengeKind::Upgrade => p.lifetime.buildings_upgraded += 1,
                            ChallengeKind::Demolish => p.lifetime.buildings_demolished += 1,
                            ChallengeKind::Build => {}
                        }
                    } else {
                        p.lifetime.challenges_failed += 1;
                    }
                    dirty = true;
                }
                self.send_to(
                    client_id,
                    &ServerMessage::CommandOk {
                        result: CommandResult::ChallengeResolved { verdict },
                    },
                );
                self.flush_notes();
                dirty
            }
            Err(e) => {
                self.reject(client_id, &e.to_string());
                false
            }
        }
    }

    fn unlock_era(&mut self, client_id: ClientId, player_key: &PlayerId) -> bool {
        match self.colony.unlock_next_era(&self.catalog, &self.config) {
            Ok(ticket) => {
                if let Some(p) = self.progress.get_mut(player_key) {
                    p.skill_points += ticket.skill_points_granted;
                    p.prestige_shards += ticket.shards_granted;
                    p.prestige_level = p.prestige_level.max(ticket.prestige_level);
                    p.lifetime.eras_unlocked += 1;
                }
                info!(
                    "session {}: era {} unlocked by {player_key}",
                    self.code, ticket.era
                );
                // Era and prestige both feed the modifier set.
                self.recompute_modifiers();
                self.send_to(
                    client_id,
                    &ServerMessage::CommandOk {
                        result: CommandResult::EraUnlocked { ticket },
                    },
                );
                self.flush_notes();
                // The soft reset invalidates every client's view.
                let update = ServerMessage::StateUpdate {
                    tick: self.colony.tick,
                    state_json: self.state_json(),
                };
                self.broadcast(&update);
                true
            }
            Err(e) => {
                self.reject(client_id, &e.to_string());
                false
            }
        }
    }

    fn unlock_skill(
        &mut self,
        client_id: ClientId,
        player_key: &PlayerId,
        skill: &SkillId,
    ) -> bool {
        let Some(progress) = self.progress.get_mut(player_key) else {
            return false;
        };
        match progress.unlock_skill(&self.catalog, skill) {
            Ok(points_left) => {
                self.recompute_modifiers();
                self.send_to(
                    client_id,
                    &ServerMessage::CommandOk {
                        result: CommandResult::SkillUnlocked {
                            skill: skill.clone(),
                            points_left,
                        },
                    },
                );
                true
            }
            Err(e) => {
                self.reject(client_id, &e.to_string());
                false
            }
        }
    }

    fn reject(&mut self, client_id: ClientId, reason: &str) {
        debug!("session {}: command refused: {reason}", self.code);
        self.send_to(
            client_id,
            &ServerMessage::CommandFailed {
                reason: reason.to_owned(),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Run one tick if the deadline has passed. dt is the real time since
    /// the previous tick, so a delayed wakeup integrates the full gap
    /// instead of losing it.
    pub fn tick_if_due(&mut self, now: Instant) {
        if now < self.next_tick_at {
            return;
        }
        let dt = now.duration_since(self.last_tick_at).as_secs_f64();
        self.last_tick_at = now;
        self.next_tick_at = now + self.tick_interval;
        if self.colony.collapsed {
            return;
        }
        let notes = tick::advance(
            &mut self.colony,
            &self.catalog,
            &self.config,
            &self.modifiers,
            dt,
        );
        if !notes.is_empty() {
            self.broadcast(&ServerMessage::Notes { notes });
        }
        let update = ServerMessage::StateUpdate {
            tick: self.colony.tick,
            state_json: self.state_json(),
        };
        self.broadcast(&update);
    }

    /// Broadcast notes emitted by a command outside the tick path.
    fn flush_notes(&mut self) {
        let notes = self.colony.drain_notes();
        if !notes.is_empty() {
            self.broadcast(&ServerMessage::Notes { notes });
        }
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Send a message to a specific member. Write errors are logged and
    /// otherwise ignored (the reader thread will detect the broken pipe).
    fn send_to(&mut self, client_id: ClientId, msg: &ServerMessage) {
        if let Some(member) = self.members.get_mut(&client_id)
            && let Err(e) = send_message(&mut member.writer, msg)
        {
            debug!("session {}: write to {client_id:?} failed: {e}", self.code);
        }
    }

    /// Broadcast a message to all connected members.
    fn broadcast(&mut self, msg: &ServerMessage) {
        let ids: Vec<ClientId> = self.members.keys().copied().collect();
        for id in ids {
            self.send_to(id, msg);
        }
    }
}

/// Serialize a `ServerMessage` to JSON and write it with length-delimited
/// framing.
fn send_message(
    writer: &mut BufWriter<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_vec(msg)?;
    write_message(writer, &json)?;
    Ok(())
}
