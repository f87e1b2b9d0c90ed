// nexus_server — authoritative multiplayer host for Nexus Colony.
//
// This crate runs the simulation on behalf of every connected client. It
// accepts TCP connections, validates each command against the shared
// `nexus_sim` state, ticks every session on a real-time cadence, and
// broadcasts the resulting state. Clients never run the sim; the server's
// word is final.
//
// Module overview:
// - `session.rs`:  Per-colony state — member roster, cached player progress,
//                  aggregated modifiers, command dispatch, and ticking. The
//                  core data structure that `server.rs` drives.
// - `server.rs`:   TCP listener, reader threads (one per client), and the
//                  main event loop. Uses `std::net` with a thread-per-reader
//                  architecture and an `mpsc` channel to funnel events into
//                  the single-threaded session map.
// - `store.rs`:    TTL-aware key-value store for player progress and parked
//                  session snapshots.
// - `client.rs`:   TCP client with a non-blocking `poll()` interface, used
//                  by frontends and integration tests.
//
// Dependencies: `nexus_sim` (simulation), `nexus_protocol` (shared message
// types and framing).
//
// The server can run as a standalone binary (`main.rs`, installed as
// `nexusd`) or be embedded in a host process via the library API
// (`start_server`).

pub mod client;
pub mod server;
pub mod session;
pub mod store;

pub use client::NetClient;
pub use server::{ServerConfig, ServerHandle, start_server};
