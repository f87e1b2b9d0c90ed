// TCP server and main event loop for the colony host.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `framing::read_message()` in a
//   loop, deserialize `ClientMessage`, and send `InternalEvent::MessageFrom`
//   to the main thread. On error/EOF, send `InternalEvent::Disconnected`.
// - **Main thread**: owns every `Session` plus the snapshot store, receives
//   events from the channel, and dispatches them. Uses `recv_timeout` with
//   the earliest pending tick deadline as the timeout — when the timeout
//   fires, every session whose deadline has passed runs a tick. This gives
//   us a simple multi-session timer without a separate timer thread.
//
// The main thread is the only writer to client TCP streams (via
// `Session::broadcast`/`send_to`). Reader threads only read from streams.
// This avoids concurrent read/write on the same `TcpStream`, which is safe
// on most platforms but fragile.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `ServerHandle::stop`) and breaks out of the event loop.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nexus_protocol::framing::{read_message, write_message};
use nexus_protocol::message::{ClientMessage, ServerMessage};
use nexus_protocol::types::{ClientId, PROTOCOL_VERSION};
use nexus_sim::catalog::Catalog;
use nexus_sim::colony::ColonyState;
use nexus_sim::config::GameConfig;
use nexus_sim::progression::PlayerProgress;
use nexus_sim::types::PlayerId;

use crate::session::Session;
use crate::store::{MemoryStore, SnapshotStore, progress_key, session_key};

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    MessageFrom {
        client_id: ClientId,
        message: ClientMessage,
    },
    Disconnected {
        client_id: ClientId,
    },
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a colony server.
pub struct ServerConfig {
    pub port: u16,
    pub max_players_per_session: usize,
    /// How long an idle session snapshot survives in the store before it
    /// can no longer be rejoined.
    pub snapshot_ttl: Duration,
    /// Simulation tuning shared by every session on this host.
    pub game: GameConfig,
    /// Content set shared by every session on this host.
    pub catalog: Catalog,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7001,
            max_players_per_session: 4,
            snapshot_ttl: Duration::from_secs(60 * 60),
            game: GameConfig::default(),
            catalog: Catalog::default(),
        }
    }
}

/// Start the colony server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_server(config: ServerConfig) -> std::io::Result<(ServerHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_server(listener, config, keep_running_clone);
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Everything the main thread owns.
struct ServerState {
    config: ServerConfig,
    catalog: Arc<Catalog>,
    game: Arc<GameConfig>,
    sessions: BTreeMap<String, Session>,
    /// Which session each connected client belongs to.
    client_index: BTreeMap<ClientId, String>,
    store: MemoryStore,
    next_client_id: u32,
    next_session_code: u32,
}

impl ServerState {
    fn new(config: ServerConfig) -> Self {
        let catalog = Arc::new(config.catalog.clone());
        let game = Arc::new(config.game.clone());
        Self {
            config,
            catalog,
            game,
            sessions: BTreeMap::new(),
            client_index: BTreeMap::new(),
            store: MemoryStore::new(),
            next_client_id: 0,
            next_session_code: 1,
        }
    }

    fn mint_client_id(&mut self) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        id
    }

    fn mint_session_code(&mut self) -> String {
        let code = format!("colony-{:04}", self.next_session_code);
        self.next_session_code += 1;
        code
    }

    /// Earliest tick deadline across live sessions, if any.
    fn next_deadline(&self) -> Option<Instant> {
        self.sessions.values().map(Session::next_tick_at).min()
    }

    /// Run ticks for every session whose deadline has passed, then retire
    /// sessions that are both collapsed and empty.
    fn tick_all_due(&mut self, now: Instant) {
        for session in self.sessions.values_mut() {
            session.tick_if_due(now);
        }
        let retired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.is_collapsed() && s.member_count() == 0)
            .map(|s| s.code.clone())
            .collect();
        for code in retired {
            info!("retiring collapsed session {code}");
            self.sessions.remove(&code);
            self.store.delete(&session_key(&code));
        }
        self.store.sweep();
    }
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(listener: TcpListener, config: ServerConfig, keep_running: Arc<AtomicBool>) {
    let mut state = ServerState::new(config);

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });

    let idle_wait = Duration::from_secs_f64(state.game.default_tick_secs);

    // Main event loop.
    while keep_running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let timeout = match state.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => idle_wait,
        };
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                handle_event(&mut state, event, &tx, &keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut state, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        state.tick_all_due(Instant::now());
    }
}

/// Dispatch a single event.
fn handle_event(
    state: &mut ServerState,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(state, stream, tx, keep_running);
        }
        InternalEvent::MessageFrom { client_id, message } => {
            handle_message(state, client_id, message);
        }
        InternalEvent::Disconnected { client_id } => {
            remove_client(state, client_id);
        }
    }
}

/// Route a client message to its session and persist any progress change.
fn handle_message(state: &mut ServerState, client_id: ClientId, message: ClientMessage) {
    let Some(code) = state.client_index.get(&client_id).cloned() else {
        debug!("message from unknown client {client_id:?}");
        return;
    };
    let Some(session) = state.sessions.get_mut(&code) else {
        return;
    };
    if let Some(player_key) = session.handle_message(client_id, message)
        && let Some(progress) = session.progress_of(&player_key)
    {
        persist_progress(&mut state.store, &player_key, progress);
    }
}

/// Detach a client from its session. When the last member leaves, the
/// session is parked: its snapshot goes to the store (with a TTL) and the
/// live session is dropped, to be revived on the next Hello with its code.
fn remove_client(state: &mut ServerState, client_id: ClientId) {
    let Some(code) = state.client_index.remove(&client_id) else {
        return;
    };
    let Some(session) = state.sessions.get_mut(&code) else {
        return;
    };
    if let Some((player_key, progress)) = session.remove_member(client_id) {
        persist_progress(&mut state.store, &player_key, &progress);
    }
    if session.member_count() == 0 {
        let snapshot = (!session.is_collapsed()).then(|| session.snapshot_json());
        state.sessions.remove(&code);
        match snapshot {
            Some(json) => {
                info!("parking empty session {code}");
                state
                    .store
                    .put(&session_key(&code), json, Some(state.config.snapshot_ttl));
            }
            None => {
                info!("dropping collapsed session {code}");
                state.store.delete(&session_key(&code));
            }
        }
    }
}

fn persist_progress(store: &mut MemoryStore, player_key: &PlayerId, progress: &PlayerProgress) {
    match serde_json::to_string(progress) {
        Ok(json) => store.put(&progress_key(player_key.as_str()), json, None),
        Err(e) => warn!("progress for {player_key} not persisted: {e}"),
    }
}

fn load_progress(store: &mut MemoryStore, player_key: &PlayerId) -> PlayerProgress {
    store
        .get(&progress_key(player_key.as_str()))
        .and_then(|json| {
            serde_json::from_str(&json)
                .map_err(|e| warn!("stored progress for {player_key} unreadable: {e}"))
                .ok()
        })
        .unwrap_or_default()
}

/// Find or build the session a Hello asked for. `None` means the code was
/// given but is neither live nor parked.
fn session_for_hello(state: &mut ServerState, session_code: Option<String>) -> Option<String> {
    match session_code {
        None => {
            let code = state.mint_session_code();
            let session = Session::new(
                code.clone(),
                state.catalog.clone(),
                state.game.clone(),
                state.config.max_players_per_session,
            );
            info!("created session {code}");
            state.sessions.insert(code.clone(), session);
            Some(code)
        }
        Some(code) => {
            if state.sessions.contains_key(&code) {
                return Some(code);
            }
            // Revive a parked session from its stored snapshot.
            let json = state.store.get(&session_key(&code))?;
            let colony: ColonyState = match serde_json::from_str(&json) {
                Ok(c) => c,
                Err(e) => {
                    warn!("snapshot for session {code} unreadable: {e}");
                    return None;
                }
            };
            info!("reviving session {code} at tick {}", colony.tick);
            let session = Session::resume(
                code.clone(),
                colony,
                state.catalog.clone(),
                state.game.clone(),
                state.config.max_players_per_session,
            );
            state.sessions.insert(code.clone(), session);
            Some(code)
        }
    }
}

/// Handle a new TCP connection: read the Hello handshake, attach the client
/// to its session, and spawn a reader thread.
fn handle_new_connection(
    state: &mut ServerState,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    // Set a read timeout so the handshake doesn't block forever.
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let hello_bytes = match read_message(&mut reader) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };

    let hello: ClientMessage = match serde_json::from_slice(&hello_bytes) {
        Ok(msg) => msg,
        Err(_) => return,
    };

    let ClientMessage::Hello {
        protocol_version,
        player_name,
        player_key,
        role,
        session_code,
    } = hello
    else {
        // Expected Hello as the first message — drop the connection.
        return;
    };

    if protocol_version != PROTOCOL_VERSION {
        reject(
            stream,
            &format!("protocol version {protocol_version} not supported (want {PROTOCOL_VERSION})"),
        );
        return;
    }

    let Some(code) = session_for_hello(state, session_code) else {
        reject(stream, "unknown session code");
        return;
    };

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    let client_id = state.mint_client_id();
    let progress = load_progress(&mut state.store, &player_key);
    let Some(session) = state.sessions.get_mut(&code) else {
        return;
    };
    match session.add_member(
        client_id,
        player_key,
        player_name,
        role,
        progress,
        write_stream,
    ) {
        Ok(()) => {
            info!("client {client_id:?} joined session {code}");
            state.client_index.insert(client_id, code);

            // Clear read timeout for the long-lived reader loop.
            stream.set_read_timeout(None).ok();

            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(reader, client_id, tx_reader, keep_running_reader);
            });
        }
        Err(reason) => reject(stream, &reason),
    }
}

/// Send a Rejected message and close the connection.
fn reject(stream: TcpStream, reason: &str) {
    let rejected = ServerMessage::Rejected {
        reason: reason.to_owned(),
    };
    if let Ok(json) = serde_json::to_vec(&rejected) {
        let mut writer = std::io::BufWriter::new(stream);
        let _ = write_message(&mut writer, &json);
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    client_id: ClientId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<ClientMessage>(&bytes) {
                Ok(ClientMessage::Goodbye) => {
                    let _ = tx.send(InternalEvent::Disconnected { client_id });
                    break;
                }
                Ok(message) => {
                    let _ = tx.send(InternalEvent::MessageFrom { client_id, message });
                }
                Err(_) => {
                    // Malformed message — disconnect.
                    let _ = tx.send(InternalEvent::Disconnected { client_id });
                    break;
                }
            },
            Err(_) => {
                // Read error or EOF — disconnect.
                let _ = tx.send(InternalEvent::Disconnected { client_id });
                break;
            }
        }
    }
}
