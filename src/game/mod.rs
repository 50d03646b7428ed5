//! Game simulation modules

pub mod board;
pub mod garbage;
pub mod instance;
pub mod piece;
pub mod randomizer;
pub mod scoring;
pub mod session;
pub mod snapshot;

pub use instance::{InstanceEvent, MatchInstance};
pub use session::{
    AttackRouting, GameSession, Session, SessionConfig, SessionError, SessionHandle,
    SessionRegistry,
};
pub use snapshot::PublicState;

use std::str::FromStr;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

/// One player command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    Rotate,
    RotateCcw,
    Soft,
    Hard,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Action::Left),
            "right" => Ok(Action::Right),
            "rotate" => Ok(Action::Rotate),
            "rotate_ccw" => Ok(Action::RotateCcw),
            "soft" => Ok(Action::Soft),
            "hard" => Ok(Action::Hard),
            "hold" => Ok(Action::Hold),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Messages accepted by a running session task
#[derive(Debug)]
pub enum SessionCommand {
    Input(PlayerInput),
    /// Read one instance's public state
    Query {
        player_id: Uuid,
        reply: oneshot::Sender<Option<PublicState>>,
    },
}
