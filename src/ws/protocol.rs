//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::PublicState;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join a session
    JoinSession {
        /// Specific session to join or create, otherwise any with room
        #[serde(default)]
        session_id: Option<Uuid>,
    },

    /// One gameplay command: left, right, rotate, rotate_ccw, soft, hard, hold
    Action { action: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current session
    LeaveSession,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// Confirmation of session join
    SessionJoined {
        session_id: Uuid,
        player_id: Uuid,
        /// Seed of the shared piece sequence
        seed: u64,
        /// Everyone in the session, in join order
        players: Vec<Uuid>,
        server_time: u64,
    },

    PlayerJoined { player_id: Uuid },

    /// Player left the session, or was refused entry
    PlayerLeft { player_id: Uuid, reason: String },

    /// Session state (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        players: Vec<PublicState>,
        /// Events that occurred since last snapshot
        events: Vec<GameEvent>,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Game events (clears, attacks, top-outs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    LinesCleared {
        player_id: Uuid,
        lines: u32,
        attack: u32,
    },

    /// Attack left over after cancelling own pending garbage
    AttackSent { player_id: Uuid, amount: u32 },

    /// Garbage queued against `player_id`
    GarbageQueued {
        player_id: Uuid,
        from: Uuid,
        amount: u32,
    },

    GarbageInserted { player_id: Uuid, rows: u32 },

    ToppedOut { player_id: Uuid },
}
