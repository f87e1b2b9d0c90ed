// nexus_sim — pure Rust simulation library.
//
// This crate contains all authoritative game logic for Nexus Colony: the
// shared resource economy, the build grid, the challenge state machine,
// era and skill progression, and the per-session tick loop. It has zero
// network dependencies and can be tested and run headless.
//
// Module overview:
// - `colony.rs`:      Top-level ColonyState and the command surface.
// - `tick.rs`:        The economy tick — production, shortages, growth, sweeps.
// - `resources.rs`:   ResourceBag — ledger, cost, and rate arithmetic.
// - `grid.rs`:        Finite 2D build grid with blocked terrain and footprints.
// - `challenge.rs`:   Challenge book, spam pressure, cost and scoring curves.
// - `modifiers.rs`:   Folding roles, skills, prestige, and era into one ModifierSet.
// - `progression.rs`: PlayerProgress, the skill tree, era requirements.
// - `catalog.rs`:     Building / era / skill definitions (shared content set).
// - `config.rs`:      GameConfig — all tunable parameters.
// - `note.rs`:        ColonyNote — the event feed sessions fan out to clients.
// - `types.rs`:       Cells, entity IDs, roles, challenge kinds.
//
// The companion crate `nexus_server` wraps this library behind a TCP
// protocol. That boundary is enforced at the compiler level — this crate
// cannot depend on sockets, wall-clock time, or client behavior.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, command | dt) -> (new_state, notes)`. There is no randomness at
// all; ids come from per-session counters and placement fallback is an
// ordered scan. No `HashMap` iteration order leaks into state. Use
// `BTreeMap` for ordered collections.

pub mod catalog;
pub mod challenge;
pub mod colony;
pub mod config;
pub mod grid;
pub mod modifiers;
pub mod note;
pub mod progression;
pub mod resources;
pub mod tick;
pub mod types;
