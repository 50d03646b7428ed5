//! Match instance - one player's authoritative board
//!
//! Owns the grid, piece queue, active piece and garbage counter. All
//! mutation goes through `apply_command`, `gravity` and `receive_garbage`;
//! each returns immediately and records domain events that the owning
//! session drains with `drain_events`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use super::board::{Grid, COLS};
use super::garbage::{attack_for_clear, GarbageQueue};
use super::piece::{kick_offsets, rotated_matrix, ActivePiece, ShapeId};
use super::randomizer::PieceQueue;
use super::scoring::{combo_bonus, line_clear_points, HARD_DROP_POINTS, SOFT_DROP_POINTS};
use super::snapshot::{ActivePieceView, PublicState, PREVIEW_LEN};
use super::Action;

/// Something that happened inside one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEvent {
    /// A lock cleared rows; `attack` is before cancellation
    LinesCleared { lines: u32, attack: u32 },
    /// Attack left over after cancellation, to be routed to siblings
    AttackSent { amount: u32 },
    /// Pending garbage was pushed into the grid
    GarbageInserted { rows: u32 },
    ToppedOut,
}

/// Authoritative state for one player
#[derive(Debug, Clone)]
pub struct MatchInstance {
    id: Uuid,
    grid: Grid,
    queue: PieceQueue,
    hold: Option<ShapeId>,
    can_hold: bool,
    active: ActivePiece,
    score: u64,
    combo: i32,
    back_to_back: bool,
    garbage: GarbageQueue,
    alive: bool,
    gravity_interval_ms: u64,
    last_gravity_ms: u64,
    hole_rng: ChaCha8Rng,
    lines_cleared: u32,
    pieces_locked: u32,
    attack_sent: u32,
    garbage_received: u32,
    events: Vec<InstanceEvent>,
    #[cfg(test)]
    pub(crate) panic_on_gravity: bool,
}

impl MatchInstance {
    /// Create an instance whose gravity clock starts at `now_ms`.
    ///
    /// Instances sharing a seed see the same piece sequence; garbage holes
    /// additionally depend on the player id.
    pub fn new(id: Uuid, seed: u64, gravity_interval_ms: u64, now_ms: u64) -> Self {
        let mut queue = PieceQueue::new(seed);
        let first = queue.next_shape();
        let (hi, lo) = id.as_u64_pair();
        Self {
            id,
            grid: Grid::new(),
            queue,
            hold: None,
            can_hold: true,
            active: ActivePiece::spawn(first),
            score: 0,
            combo: -1,
            back_to_back: false,
            garbage: GarbageQueue::new(),
            alive: true,
            gravity_interval_ms,
            last_gravity_ms: now_ms,
            hole_rng: ChaCha8Rng::seed_from_u64(seed ^ hi ^ lo),
            lines_cleared: 0,
            pieces_locked: 0,
            attack_sent: 0,
            garbage_received: 0,
            events: Vec::new(),
            #[cfg(test)]
            panic_on_gravity: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn garbage_pending(&self) -> u32 {
        self.garbage.pending()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn active(&self) -> &ActivePiece {
        &self.active
    }

    pub fn combo(&self) -> i32 {
        self.combo
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    /// Apply one player command. Ignored once terminal.
    pub fn apply_command(&mut self, action: Action) {
        if !self.alive {
            return;
        }
        match action {
            Action::Left => {
                self.shift(-1);
            }
            Action::Right => {
                self.shift(1);
            }
            Action::Rotate => {
                self.rotate(1);
            }
            Action::RotateCcw => {
                self.rotate(-1);
            }
            Action::Soft => {
                if !self.soft_drop() {
                    self.score += SOFT_DROP_POINTS as u64;
                }
            }
            Action::Hard => self.hard_drop(),
            Action::Hold => self.hold(),
        }
    }

    /// Drop one row if a full gravity interval has elapsed since the last
    /// drop. Returns whether a gravity step ran.
    pub fn gravity(&mut self, now_ms: u64) -> bool {
        if !self.alive {
            return false;
        }
        if now_ms.saturating_sub(self.last_gravity_ms) < self.gravity_interval_ms {
            return false;
        }
        self.last_gravity_ms = now_ms;
        #[cfg(test)]
        {
            if self.panic_on_gravity {
                panic!("gravity fault injected");
            }
        }
        self.soft_drop();
        true
    }

    /// Queue damage sent by a sibling
    pub fn receive_garbage(&mut self, amount: u32) {
        if self.alive {
            self.garbage.receive(amount);
            self.garbage_received += amount;
        }
    }

    /// Take the events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Mark terminal after an unrecoverable fault
    pub(crate) fn force_terminal(&mut self) {
        if self.alive {
            self.top_out();
        }
    }

    pub fn snapshot(&self) -> PublicState {
        PublicState {
            player_id: self.id,
            grid: self.grid.clone(),
            active: self.alive.then(|| ActivePieceView::from(&self.active)),
            hold: self.hold,
            next: self.queue.preview(PREVIEW_LEN),
            alive: self.alive,
            score: self.score,
            combo: self.combo,
            back_to_back: self.back_to_back,
            garbage_pending: self.garbage.pending(),
            lines_cleared: self.lines_cleared,
            pieces_locked: self.pieces_locked,
            attack_sent: self.attack_sent,
            garbage_received: self.garbage_received,
        }
    }

    fn top_out(&mut self) {
        self.alive = false;
        self.events.push(InstanceEvent::ToppedOut);
    }

    fn place(&mut self, shape: ShapeId) {
        self.active = ActivePiece::spawn(shape);
        if self.collides_at(self.active.x, self.active.y) {
            self.top_out();
        }
    }

    fn spawn(&mut self) {
        let shape = self.queue.next_shape();
        self.place(shape);
        self.can_hold = true;
    }

    fn collides_at(&self, x: i32, y: i32) -> bool {
        self.grid.collides(&self.active.matrix, x, y)
    }

    fn shift(&mut self, dir: i32) -> bool {
        let x = self.active.x + dir;
        if self.collides_at(x, self.active.y) {
            return false;
        }
        self.active.x = x;
        true
    }

    fn rotate(&mut self, dir: i8) -> bool {
        let piece = &self.active;
        let to = piece.rotation.turn(dir);
        let matrix = rotated_matrix(piece.shape, to);

        let kick = kick_offsets(piece.shape, piece.rotation, to)
            .iter()
            .map(|&(dx, dy)| (piece.x + dx, piece.y + dy))
            .find(|&(x, y)| !self.grid.collides(&matrix, x, y));

        let Some((x, y)) = kick else {
            return false;
        };
        self.active.matrix = matrix;
        self.active.rotation = to;
        self.active.x = x;
        self.active.y = y;
        true
    }

    /// Returns whether the piece locked
    fn soft_drop(&mut self) -> bool {
        if self.collides_at(self.active.x, self.active.y + 1) {
            self.lock();
            return true;
        }
        self.active.y += 1;
        false
    }

    fn hard_drop(&mut self) {
        let mut rows = 0u64;
        while !self.collides_at(self.active.x, self.active.y + 1) {
            self.active.y += 1;
            rows += 1;
        }
        self.score += rows * HARD_DROP_POINTS as u64;
        self.lock();
    }

    fn hold(&mut self) {
        if !self.can_hold {
            return;
        }
        match self.hold.replace(self.active.shape) {
            Some(held) => self.place(held),
            None => self.spawn(),
        }
        self.can_hold = false;
    }

    fn lock(&mut self) {
        let value = self.active.shape.cell_value();
        let mut above_ceiling = false;
        let cells: Vec<(i32, i32)> = self.active.cells().collect();
        for (col, row) in cells {
            if row < 0 {
                above_ceiling = true;
            } else {
                self.grid.set(col, row, value);
            }
        }
        self.pieces_locked += 1;

        if above_ceiling {
            self.top_out();
            return;
        }

        let lines = self.grid.clear_full_rows();
        if lines > 0 {
            self.resolve_clear(lines);
        } else {
            self.combo = -1;
            self.insert_pending_garbage();
        }

        self.spawn();
    }

    fn resolve_clear(&mut self, lines: u32) {
        self.combo += 1;
        self.lines_cleared += lines;

        let quad = lines >= 4;
        self.score += line_clear_points(lines, self.back_to_back && quad) as u64;
        self.score += combo_bonus(self.combo) as u64;
        self.back_to_back = quad;

        let attack = attack_for_clear(lines, self.combo);
        self.events.push(InstanceEvent::LinesCleared { lines, attack });

        let outgoing = self.garbage.cancel(attack);
        if outgoing > 0 {
            self.attack_sent += outgoing;
            self.events.push(InstanceEvent::AttackSent { amount: outgoing });
        }
    }

    fn insert_pending_garbage(&mut self) {
        let rows = self.garbage.take_for_lock();
        for _ in 0..rows {
            let hole = self.hole_rng.gen_range(0..COLS);
            self.grid.push_garbage_row(hole);
        }
        if rows > 0 {
            self.events.push(InstanceEvent::GarbageInserted { rows });
        }
    }
}
