//! Session state and authoritative tick loop
//!
//! A session is a set of match instances that exchange garbage. `Session` is
//! the synchronous instance registry; `GameSession` is the task that owns one
//! and drives it from a fixed-rate interval and an input channel.

use dashmap::DashMap;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::util::time::{
    tick_duration, unix_millis, MonotonicClock, DEFAULT_GRAVITY_INTERVAL_MS, DEFAULT_TICK_RATE,
};
use crate::ws::protocol::{ClientMsg, GameEvent, ServerMsg};

use super::instance::{InstanceEvent, MatchInstance};
use super::snapshot::{PublicState, SnapshotBuilder};
use super::{Action, PlayerInput, SessionCommand};

/// A session with nobody in it shuts down after this long
const EMPTY_SESSION_GRACE_MS: u64 = 5_000;

/// How an outgoing attack is shared between living opponents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackRouting {
    /// Divide the attack; leftover lines go to the earliest joiners
    #[default]
    Split,
    /// Every opponent receives the whole attack
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown attack routing: {0}")]
pub struct UnknownRouting(pub String);

impl FromStr for AttackRouting {
    type Err = UnknownRouting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(AttackRouting::Split),
            "full" => Ok(AttackRouting::Full),
            other => Err(UnknownRouting(other.to_string())),
        }
    }
}

/// Per-session simulation settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_rate: u32,
    pub gravity_interval_ms: u64,
    pub snapshot_every_ticks: u32,
    pub max_players: usize,
    pub attack_routing: AttackRouting,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            gravity_interval_ms: DEFAULT_GRAVITY_INTERVAL_MS,
            snapshot_every_ticks: 1,
            max_players: 8,
            attack_routing: AttackRouting::Split,
        }
    }
}

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session is full")]
    Full,

    #[error("Player already in session")]
    AlreadyJoined,

    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Stable code for wire error messages
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Full => "session_full",
            SessionError::AlreadyJoined => "already_joined",
            SessionError::Closed => "session_closed",
        }
    }
}

/// Registry of the live instances in one session
pub struct Session {
    pub id: Uuid,
    pub seed: u64,
    pub tick: u64,
    config: SessionConfig,
    instances: HashMap<Uuid, MatchInstance>,
    /// Join order, used for snapshots and attack routing
    order: Vec<Uuid>,
    events: Vec<GameEvent>,
}

impl Session {
    pub fn new(id: Uuid, seed: u64, config: SessionConfig) -> Self {
        Self {
            id,
            seed,
            tick: 0,
            config,
            instances: HashMap::new(),
            order: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn player_ids(&self) -> Vec<Uuid> {
        self.order.clone()
    }

    pub fn alive_count(&self) -> usize {
        self.instances.values().filter(|i| i.is_alive()).count()
    }

    pub fn create_instance(
        &mut self,
        player_id: Uuid,
        now_ms: u64,
    ) -> Result<&MatchInstance, SessionError> {
        if self.instances.contains_key(&player_id) {
            return Err(SessionError::AlreadyJoined);
        }
        if self.instances.len() >= self.config.max_players {
            return Err(SessionError::Full);
        }

        let instance = MatchInstance::new(
            player_id,
            self.seed,
            self.config.gravity_interval_ms,
            now_ms,
        );
        self.order.push(player_id);
        Ok(self.instances.entry(player_id).or_insert(instance))
    }

    pub fn remove_instance(&mut self, player_id: Uuid) -> Option<MatchInstance> {
        let removed = self.instances.remove(&player_id);
        if removed.is_some() {
            self.order.retain(|id| *id != player_id);
        }
        removed
    }

    /// Apply a command; unknown or terminal players are ignored
    pub fn apply_command(&mut self, player_id: Uuid, action: Action) {
        let Some(instance) = self.instances.get_mut(&player_id) else {
            debug!(session_id = %self.id, player_id = %player_id, "Command for unknown player");
            return;
        };
        instance.apply_command(action);
        self.flush_events(player_id);
    }

    pub fn snapshot(&self, player_id: Uuid) -> Option<PublicState> {
        self.instances.get(&player_id).map(|i| i.snapshot())
    }

    /// Public state of every instance, in join order
    pub fn snapshots(&self) -> Vec<PublicState> {
        self.order
            .iter()
            .filter_map(|id| self.instances.get(id))
            .map(|i| i.snapshot())
            .collect()
    }

    /// Gravity pass over every alive instance. Returns how many dropped.
    ///
    /// A panic inside one instance is contained: that instance goes terminal
    /// and the rest of the pass continues.
    pub fn tick(&mut self, now_ms: u64) -> usize {
        self.tick += 1;
        let mut dropped = 0;

        for idx in 0..self.order.len() {
            let player_id = self.order[idx];
            let Some(instance) = self.instances.get_mut(&player_id) else {
                continue;
            };
            if !instance.is_alive() {
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| instance.gravity(now_ms))) {
                Ok(true) => dropped += 1,
                Ok(false) => {}
                Err(_) => {
                    error!(
                        session_id = %self.id,
                        player_id = %player_id,
                        "Instance panicked during gravity, marking terminal"
                    );
                    instance.force_terminal();
                }
            }
            self.flush_events(player_id);
        }

        dropped
    }

    /// Events produced since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn flush_events(&mut self, player_id: Uuid) {
        let Some(instance) = self.instances.get_mut(&player_id) else {
            return;
        };
        for event in instance.drain_events() {
            match event {
                InstanceEvent::LinesCleared { lines, attack } => {
                    self.events.push(GameEvent::LinesCleared {
                        player_id,
                        lines,
                        attack,
                    });
                }
                InstanceEvent::AttackSent { amount } => {
                    self.events.push(GameEvent::AttackSent { player_id, amount });
                    self.route_attack(player_id, amount);
                }
                InstanceEvent::GarbageInserted { rows } => {
                    self.events
                        .push(GameEvent::GarbageInserted { player_id, rows });
                }
                InstanceEvent::ToppedOut => {
                    info!(session_id = %self.id, player_id = %player_id, "Player topped out");
                    self.events.push(GameEvent::ToppedOut { player_id });
                }
            }
        }
    }

    fn route_attack(&mut self, source: Uuid, amount: u32) {
        let targets: Vec<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|id| *id != source)
            .filter(|id| self.instances.get(id).is_some_and(|i| i.is_alive()))
            .collect();
        if targets.is_empty() || amount == 0 {
            return;
        }

        let n = targets.len() as u32;
        for (i, target) in targets.into_iter().enumerate() {
            let share = match self.config.attack_routing {
                AttackRouting::Full => amount,
                AttackRouting::Split => amount / n + u32::from((i as u32) < amount % n),
            };
            if share == 0 {
                continue;
            }
            if let Some(instance) = self.instances.get_mut(&target) {
                instance.receive_garbage(share);
                self.events.push(GameEvent::GarbageQueued {
                    player_id: target,
                    from: source,
                    amount: share,
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn instance_mut(&mut self, player_id: Uuid) -> Option<&mut MatchInstance> {
        self.instances.get_mut(&player_id)
    }
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionCommand>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// Registry of all active sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions
            .iter()
            .map(|s| s.value().player_count())
            .sum()
    }

    /// Session ids with their player counts
    pub fn list(&self) -> Vec<(Uuid, usize)> {
        self.sessions
            .iter()
            .map(|s| (*s.key(), s.value().player_count()))
            .collect()
    }

    /// Find a session with available slots
    pub fn find_available(&self) -> Option<SessionHandle> {
        self.sessions
            .iter()
            .find(|s| s.value().player_count() < self.config.max_players)
            .map(|s| s.value().clone())
    }

    /// Resolve the session a player should join: the requested one (created
    /// on demand), else any session with room, else a fresh one.
    pub fn join(self: &Arc<Self>, requested: Option<Uuid>) -> Result<SessionHandle, SessionError> {
        if let Some(id) = requested {
            if let Some(handle) = self.get(&id) {
                if handle.player_count() >= self.config.max_players {
                    return Err(SessionError::Full);
                }
                if handle.input_tx.is_closed() {
                    return Err(SessionError::Closed);
                }
                return Ok(handle);
            }
            return Ok(self.spawn_session(id));
        }

        match self.find_available() {
            Some(handle) => Ok(handle),
            None => Ok(self.spawn_session(Uuid::new_v4())),
        }
    }

    fn spawn_session(self: &Arc<Self>, id: Uuid) -> SessionHandle {
        let entry = self.sessions.entry(id).or_insert_with(|| {
            let (session, handle) = GameSession::new(id, rand::random::<u64>(), self.config.clone());
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                session.run().await;
                registry.remove(&id);
                info!(session_id = %id, "Session removed from registry");
            });
            info!(session_id = %id, "Created new session");
            handle
        });
        entry.value().clone()
    }
}

/// The authoritative session task
pub struct GameSession {
    session: Session,
    input_rx: mpsc::Receiver<SessionCommand>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
    clock: MonotonicClock,
    empty_since_ms: Option<u64>,
    /// Set once the input channel is closed for shutdown
    closing: bool,
}

impl GameSession {
    pub fn new(id: Uuid, seed: u64, config: SessionConfig) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id,
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
        };

        let game_session = Self {
            snapshot_builder: SnapshotBuilder::new(config.snapshot_every_ticks),
            session: Session::new(id, seed, config),
            input_rx,
            snapshot_tx,
            player_count,
            clock: MonotonicClock::new(),
            empty_since_ms: Some(0),
            closing: false,
        };

        (game_session, handle)
    }

    /// Run until the session has been empty for the grace period, applying
    /// commands as they arrive and gravity on each tick. A session nobody
    /// joins shuts down the same way.
    pub async fn run(mut self) {
        info!(session_id = %self.session.id, "Session started");

        let mut tick_interval = interval(tick_duration(self.session.config().tick_rate));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.run_tick();
                    if self.idle_expired() && self.shut_down_if_idle() {
                        info!(session_id = %self.session.id, "Session empty, shutting down");
                        break;
                    }
                }
                command = self.input_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(session_id = %self.session.id, "Input channel closed");
                        break;
                    }
                },
            }
        }

        info!(session_id = %self.session.id, tick = self.session.tick, "Session ended");
    }

    fn run_tick(&mut self) {
        let now = self.clock.now_ms();
        self.session.tick(now);

        if self.snapshot_builder.should_send() {
            let players = self.session.snapshots();
            let events = self.session.take_events();
            let snapshot = self.snapshot_builder.build(self.session.tick, players, events);
            // No receivers is fine; nobody is watching yet
            let _ = self.snapshot_tx.send(snapshot);
        }
    }

    fn idle_expired(&mut self) -> bool {
        if !self.session.is_empty() {
            self.empty_since_ms = None;
            return false;
        }
        let now = self.clock.now_ms();
        let since = *self.empty_since_ms.get_or_insert(now);
        now.saturating_sub(since) >= EMPTY_SESSION_GRACE_MS
    }

    /// Handle commands that raced the grace period. Returns false if one of
    /// them brought a player in.
    fn shut_down_if_idle(&mut self) -> bool {
        while let Ok(command) = self.input_rx.try_recv() {
            self.handle_command(command);
        }
        if !self.session.is_empty() {
            self.empty_since_ms = None;
            return false;
        }

        // Anything sent before the close is still answered; joins are refused
        self.closing = true;
        self.input_rx.close();
        while let Ok(command) = self.input_rx.try_recv() {
            self.handle_command(command);
        }
        true
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Input(input) => self.handle_input(input),
            SessionCommand::Query { player_id, reply } => {
                let _ = reply.send(self.session.snapshot(player_id));
            }
        }
    }

    fn handle_input(&mut self, input: PlayerInput) {
        let player_id = input.player_id;
        match input.msg {
            ClientMsg::JoinSession { .. } => self.handle_join(player_id),
            ClientMsg::Action { action } => match action.parse::<Action>() {
                Ok(action) => self.session.apply_command(player_id, action),
                Err(e) => {
                    debug!(
                        player_id = %player_id,
                        error = %e,
                        queued_ms = unix_millis().saturating_sub(input.received_at),
                        "Ignoring unknown action"
                    );
                }
            },
            ClientMsg::LeaveSession => self.handle_leave(player_id),
            ClientMsg::Ping { .. } => {}
        }
    }

    fn handle_join(&mut self, player_id: Uuid) {
        let now = self.clock.now_ms();
        let created = if self.closing {
            Err(SessionError::Closed)
        } else {
            self.session.create_instance(player_id, now).map(|_| ())
        };
        if let Err(e) = created {
            warn!(
                session_id = %self.session.id,
                player_id = %player_id,
                error = %e,
                "Join rejected"
            );
            let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
                player_id,
                reason: e.code().to_string(),
            });
            return;
        }

        self.player_count.store(self.session.len(), Ordering::Relaxed);

        let _ = self.snapshot_tx.send(ServerMsg::PlayerJoined { player_id });
        let _ = self.snapshot_tx.send(ServerMsg::SessionJoined {
            session_id: self.session.id,
            player_id,
            seed: self.session.seed,
            players: self.session.player_ids(),
            server_time: unix_millis(),
        });
        self.snapshot_builder.force_next();

        info!(
            session_id = %self.session.id,
            player_id = %player_id,
            player_count = self.session.len(),
            "Player joined session"
        );
    }

    fn handle_leave(&mut self, player_id: Uuid) {
        if self.session.remove_instance(player_id).is_none() {
            return;
        }
        self.player_count.store(self.session.len(), Ordering::Relaxed);

        let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
            player_id,
            reason: "left".to_string(),
        });

        info!(
            session_id = %self.session.id,
            player_id = %player_id,
            alive = self.session.alive_count(),
            "Player left session"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn session_with(routing: AttackRouting, players: usize) -> (Session, Vec<Uuid>) {
        let config = SessionConfig {
            attack_routing: routing,
            ..SessionConfig::default()
        };
        let mut session = Session::new(Uuid::new_v4(), 11, config);
        let ids: Vec<Uuid> = (0..players).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            session.create_instance(*id, 0).unwrap();
        }
        (session, ids)
    }

    fn pending(session: &Session, id: Uuid) -> u32 {
        session.instances[&id].garbage_pending()
    }

    #[test]
    fn create_is_unique_and_capped() {
        let config = SessionConfig {
            max_players: 2,
            ..SessionConfig::default()
        };
        let mut session = Session::new(Uuid::new_v4(), 1, config);
        let a = Uuid::new_v4();
        session.create_instance(a, 0).unwrap();
        assert_eq!(
            session.create_instance(a, 0).err(),
            Some(SessionError::AlreadyJoined)
        );
        session.create_instance(Uuid::new_v4(), 0).unwrap();
        assert_eq!(
            session.create_instance(Uuid::new_v4(), 0).err(),
            Some(SessionError::Full)
        );
    }

    #[test]
    fn split_routing_divides_among_living_opponents() {
        let (mut session, ids) = session_with(AttackRouting::Split, 4);
        session.instance_mut(ids[3]).unwrap().force_terminal();

        session.route_attack(ids[0], 5);

        assert_eq!(pending(&session, ids[0]), 0);
        assert_eq!(pending(&session, ids[1]), 3);
        assert_eq!(pending(&session, ids[2]), 2);
        assert_eq!(pending(&session, ids[3]), 0);
    }

    #[test]
    fn split_routing_skips_zero_shares() {
        let (mut session, ids) = session_with(AttackRouting::Split, 3);
        session.route_attack(ids[2], 1);
        assert_eq!(pending(&session, ids[0]), 1);
        assert_eq!(pending(&session, ids[1]), 0);
        let queued = session
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, GameEvent::GarbageQueued { .. }))
            .count();
        assert_eq!(queued, 1);
    }

    #[test]
    fn full_routing_sends_everything_to_each() {
        let (mut session, ids) = session_with(AttackRouting::Full, 3);
        session.route_attack(ids[1], 4);
        assert_eq!(pending(&session, ids[0]), 4);
        assert_eq!(pending(&session, ids[1]), 0);
        assert_eq!(pending(&session, ids[2]), 4);
    }

    #[test]
    fn commands_for_unknown_players_are_ignored() {
        let (mut session, ids) = session_with(AttackRouting::Split, 1);
        let before = session.snapshots();
        session.apply_command(Uuid::new_v4(), Action::Hard);
        assert_eq!(session.snapshots(), before);
        assert!(session.snapshot(ids[0]).is_some());
        assert!(session.snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn top_out_is_reported_and_stays_queryable() {
        let (mut session, ids) = session_with(AttackRouting::Split, 2);
        session.instance_mut(ids[0]).unwrap().force_terminal();
        session.flush_events(ids[0]);

        assert_eq!(
            session.take_events(),
            vec![GameEvent::ToppedOut { player_id: ids[0] }]
        );
        assert_eq!(session.alive_count(), 1);
        let state = session.snapshot(ids[0]).unwrap();
        assert!(!state.alive);

        // terminal instances sit out gravity
        assert_eq!(session.tick(10_000), 1);
    }

    #[test]
    fn tick_applies_gravity_to_everyone_on_schedule() {
        let (mut session, ids) = session_with(AttackRouting::Split, 3);
        assert_eq!(session.tick(100), 0);
        assert_eq!(session.tick(500), 3);
        assert_eq!(session.tick(600), 0);
        for state in session.snapshots() {
            assert_eq!(state.active.unwrap().y, -1);
        }
        session.remove_instance(ids[1]);
        assert_eq!(session.tick(1000), 2);
        assert_eq!(session.snapshots().len(), 2);
    }

    #[test]
    fn snapshots_follow_join_order() {
        let (session, ids) = session_with(AttackRouting::Split, 3);
        let order: Vec<Uuid> = session.snapshots().iter().map(|s| s.player_id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn shared_seed_gives_same_pieces() {
        let (session, ids) = session_with(AttackRouting::Split, 2);
        let a = session.snapshot(ids[0]).unwrap();
        let b = session.snapshot(ids[1]).unwrap();
        assert_eq!(a.next, b.next);
        assert_eq!(a.active, b.active);
    }

    #[test]
    fn parses_routing() {
        assert_eq!("split".parse(), Ok(AttackRouting::Split));
        assert_eq!(" FULL ".parse(), Ok(AttackRouting::Full));
        assert!("duel".parse::<AttackRouting>().is_err());
    }

    fn join(player_id: Uuid) -> SessionCommand {
        SessionCommand::Input(PlayerInput {
            player_id,
            msg: ClientMsg::JoinSession { session_id: None },
            received_at: 0,
        })
    }

    async fn query(handle: &SessionHandle, player_id: Uuid) -> Option<PublicState> {
        let (reply, rx) = oneshot::channel();
        handle
            .input_tx
            .send(SessionCommand::Query { player_id, reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    #[tokio::test(start_paused = true)]
    async fn session_task_runs_gravity_and_broadcasts() {
        let (session, handle) = GameSession::new(Uuid::new_v4(), 5, SessionConfig::default());
        let mut rx = handle.snapshot_tx.subscribe();
        let task = tokio::spawn(session.run());

        let player = Uuid::new_v4();
        handle.input_tx.send(join(player)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;

        let state = query(&handle, player).await.unwrap();
        assert!(state.alive);
        assert_eq!(state.active.unwrap().y, -1);
        assert_eq!(handle.player_count(), 1);

        let mut joined = false;
        let mut snapshots = 0;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMsg::SessionJoined { player_id, .. } => joined |= player_id == player,
                ServerMsg::Snapshot { players, .. } if !players.is_empty() => snapshots += 1,
                _ => {}
            }
        }
        assert!(joined);
        assert!(snapshots > 0);

        handle
            .input_tx
            .send(SessionCommand::Input(PlayerInput {
                player_id: player,
                msg: ClientMsg::LeaveSession,
                received_at: 0,
            }))
            .await
            .unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(10), task).await;
        assert!(finished.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_apply_between_ticks() {
        let (session, handle) = GameSession::new(Uuid::new_v4(), 5, SessionConfig::default());
        let task = tokio::spawn(session.run());
        let player = Uuid::new_v4();
        handle.input_tx.send(join(player)).await.unwrap();

        let before = query(&handle, player).await.unwrap().active.unwrap();
        handle
            .input_tx
            .send(SessionCommand::Input(PlayerInput {
                player_id: player,
                msg: ClientMsg::Action {
                    action: "left".to_string(),
                },
                received_at: 0,
            }))
            .await
            .unwrap();
        handle
            .input_tx
            .send(SessionCommand::Input(PlayerInput {
                player_id: player,
                msg: ClientMsg::Action {
                    action: "moonwalk".to_string(),
                },
                received_at: 0,
            }))
            .await
            .unwrap();
        let after = query(&handle, player).await.unwrap().active.unwrap();

        assert_eq!(after.x, before.x - 1);
        task.abort();
    }

    #[test]
    fn panicking_instance_goes_terminal_alone() {
        let (mut session, ids) = session_with(AttackRouting::Split, 3);
        session.instance_mut(ids[1]).unwrap().panic_on_gravity = true;

        assert_eq!(session.tick(500), 2);

        let states = session.snapshots();
        assert!(states[0].alive);
        assert!(!states[1].alive);
        assert!(states[2].alive);
        assert_eq!(states[0].active.as_ref().unwrap().y, -1);
        assert_eq!(states[2].active.as_ref().unwrap().y, -1);
        assert_eq!(
            session.take_events(),
            vec![GameEvent::ToppedOut { player_id: ids[1] }]
        );

        // later ticks skip the faulted instance
        assert_eq!(session.tick(1000), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn join_queued_at_idle_deadline_is_not_lost() {
        for _ in 0..20 {
            let (session, handle) = GameSession::new(Uuid::new_v4(), 5, SessionConfig::default());
            let mut rx = handle.snapshot_tx.subscribe();
            tokio::time::advance(Duration::from_secs(6)).await;

            let player = Uuid::new_v4();
            handle.input_tx.send(join(player)).await.unwrap();
            let task = tokio::spawn(session.run());
            tokio::time::sleep(Duration::from_millis(50)).await;

            let mut joined = false;
            while let Ok(msg) = rx.try_recv() {
                if let ServerMsg::SessionJoined { player_id, .. } = msg {
                    joined |= player_id == player;
                }
            }
            assert!(joined);
            assert!(!task.is_finished());
            assert!(query(&handle, player).await.is_some());
            task.abort();
        }
    }

    #[tokio::test]
    async fn closing_session_refuses_joins() {
        let (mut session, handle) = GameSession::new(Uuid::new_v4(), 5, SessionConfig::default());
        let mut rx = handle.snapshot_tx.subscribe();
        let player = Uuid::new_v4();
        handle.input_tx.send(join(player)).await.unwrap();

        assert!(!session.shut_down_if_idle());
        assert_eq!(session.session.len(), 1);

        session.handle_leave(player);
        assert!(session.shut_down_if_idle());
        assert!(handle.input_tx.is_closed());

        session.handle_join(Uuid::new_v4());
        assert!(session.session.is_empty());

        let mut reasons = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMsg::PlayerLeft { reason, .. } = msg {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, vec!["left".to_string(), "session_closed".to_string()]);
    }

    #[tokio::test]
    async fn registry_reuses_sessions_with_room() {
        let registry = Arc::new(SessionRegistry::new(SessionConfig::default()));
        let first = tokio_test::assert_ok!(registry.join(None));
        let again = tokio_test::assert_ok!(registry.join(None));
        assert_eq!(first.id, again.id);
        assert_eq!(registry.active_sessions(), 1);

        let named = Uuid::new_v4();
        let handle = tokio_test::assert_ok!(registry.join(Some(named)));
        assert_eq!(handle.id, named);
        assert_eq!(registry.active_sessions(), 2);
        assert!(registry.list().iter().any(|(id, _)| *id == named));
    }
}
