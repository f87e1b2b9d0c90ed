// Core ID types for the multiplayer protocol.
//
// `ClientId` is a server-assigned connection identifier, distinct from the
// sim's `PlayerId` account key: the same account can reconnect and receive a
// new `ClientId` while keeping its progress.

use serde::{Deserialize, Serialize};

/// Server-assigned connection ID (compact u32, not an account key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

/// Bumped on any incompatible wire change; checked at handshake.
pub const PROTOCOL_VERSION: u32 = 1;
