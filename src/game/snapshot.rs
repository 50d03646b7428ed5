//! Public state extraction and snapshot cadence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::{GameEvent, ServerMsg};

use super::board::Grid;
use super::piece::{ActivePiece, Matrix, ShapeId};

/// Number of upcoming pieces shown to clients
pub const PREVIEW_LEN: usize = 3;

/// Falling piece as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePieceView {
    pub shape: ShapeId,
    pub matrix: Matrix,
    pub x: i32,
    pub y: i32,
    pub rotation: u8,
}

impl From<&ActivePiece> for ActivePieceView {
    fn from(piece: &ActivePiece) -> Self {
        Self {
            shape: piece.shape,
            matrix: piece.matrix.clone(),
            x: piece.x,
            y: piece.y,
            rotation: piece.rotation.index(),
        }
    }
}

/// Everything a client may know about one match instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    pub player_id: Uuid,
    pub grid: Grid,
    /// `None` once the instance has topped out
    pub active: Option<ActivePieceView>,
    pub hold: Option<ShapeId>,
    pub next: Vec<ShapeId>,
    pub alive: bool,
    pub score: u64,
    pub combo: i32,
    pub back_to_back: bool,
    pub garbage_pending: u32,
    pub lines_cleared: u32,
    pub pieces_locked: u32,
    /// Attack sent after cancellation
    pub attack_sent: u32,
    pub garbage_received: u32,
}

/// Decides which ticks produce a broadcast
pub struct SnapshotBuilder {
    ticks_since_snapshot: u32,
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Send on the next check regardless of cadence
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, tick: u64, players: Vec<PublicState>, events: Vec<GameEvent>) -> ServerMsg {
        ServerMsg::Snapshot {
            tick,
            players,
            events,
        }
    }
}
