//! Garbage economy - attack values, cancellation and pending damage

use serde::{Deserialize, Serialize};

/// Most garbage rows a single non-clearing lock may insert
pub const MAX_GARBAGE_PER_LOCK: u32 = 8;

/// Attack value of a clearing lock.
///
/// `combo` is the chain counter after this lock was counted, so the first
/// clear of a chain passes 0.
pub fn attack_for_clear(lines: u32, combo: i32) -> u32 {
    if lines == 0 {
        return 0;
    }
    let base = if lines >= 4 { 4 } else { lines - 1 };
    let combo_bonus = if combo > 0 { (combo / 2) as u32 } else { 0 };
    base + combo_bonus
}

/// Incoming damage waiting to be cancelled or inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GarbageQueue {
    pending: u32,
}

impl GarbageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Damage relayed from a sibling. No upper bound.
    pub fn receive(&mut self, amount: u32) {
        self.pending = self.pending.saturating_add(amount);
    }

    /// Offset an outgoing attack against pending damage.
    /// Returns what is left to send.
    pub fn cancel(&mut self, attack: u32) -> u32 {
        let cancelled = self.pending.min(attack);
        self.pending -= cancelled;
        attack - cancelled
    }

    /// Rows to insert on a non-clearing lock, capped per lock
    pub fn take_for_lock(&mut self) -> u32 {
        let rows = self.pending.min(MAX_GARBAGE_PER_LOCK);
        self.pending -= rows;
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_table_first_clear() {
        assert_eq!(attack_for_clear(1, 0), 0);
        assert_eq!(attack_for_clear(2, 0), 1);
        assert_eq!(attack_for_clear(3, 0), 2);
        assert_eq!(attack_for_clear(4, 0), 4);
    }

    #[test]
    fn combo_adds_half_chain_length() {
        assert_eq!(attack_for_clear(1, 1), 0);
        assert_eq!(attack_for_clear(1, 2), 1);
        assert_eq!(attack_for_clear(2, 3), 2);
        assert_eq!(attack_for_clear(4, 6), 7);
    }

    #[test]
    fn cancellation_absorbs_whole_attack() {
        let mut queue = GarbageQueue::new();
        queue.receive(5);
        assert_eq!(queue.cancel(3), 0);
        assert_eq!(queue.pending(), 2);
    }

    #[test]
    fn cancellation_passes_remainder() {
        let mut queue = GarbageQueue::new();
        queue.receive(1);
        assert_eq!(queue.cancel(3), 2);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn lock_takes_at_most_cap() {
        let mut queue = GarbageQueue::new();
        queue.receive(20);
        assert_eq!(queue.take_for_lock(), 8);
        assert_eq!(queue.pending(), 12);
        queue.take_for_lock();
        assert_eq!(queue.take_for_lock(), 4);
        assert_eq!(queue.take_for_lock(), 0);
    }
}
