//! 7-bag piece randomizer and upcoming-piece queue

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::piece::ShapeId;

/// Minimum number of upcoming pieces kept in the queue
pub const QUEUE_LEN: usize = 4;

/// Bag randomizer: every cycle of seven pulls yields each shape exactly once
#[derive(Debug, Clone)]
pub struct BagRandomizer {
    bag: [ShapeId; 7],
    remaining: usize,
    rng: ChaCha8Rng,
}

impl BagRandomizer {
    pub fn new(seed: u64) -> Self {
        Self {
            bag: ShapeId::ALL,
            remaining: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn refill(&mut self) {
        self.bag = ShapeId::ALL;
        // Fisher-Yates
        for i in (1..self.bag.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            self.bag.swap(i, j);
        }
        self.remaining = self.bag.len();
    }

    /// Take the next shape, refilling the bag when it runs dry
    pub fn pull(&mut self) -> ShapeId {
        if self.remaining == 0 {
            self.refill();
        }
        self.remaining -= 1;
        self.bag[self.remaining]
    }
}

impl Iterator for BagRandomizer {
    type Item = ShapeId;

    fn next(&mut self) -> Option<ShapeId> {
        Some(self.pull())
    }
}

/// Upcoming pieces, topped up from the bag
#[derive(Debug, Clone)]
pub struct PieceQueue {
    randomizer: BagRandomizer,
    upcoming: VecDeque<ShapeId>,
}

impl PieceQueue {
    pub fn new(seed: u64) -> Self {
        let mut queue = Self {
            randomizer: BagRandomizer::new(seed),
            upcoming: VecDeque::with_capacity(QUEUE_LEN + 1),
        };
        queue.top_up();
        queue
    }

    fn top_up(&mut self) {
        while self.upcoming.len() < QUEUE_LEN {
            let shape = self.randomizer.pull();
            self.upcoming.push_back(shape);
        }
    }

    /// Dequeue the next shape and refill
    pub fn next_shape(&mut self) -> ShapeId {
        let shape = match self.upcoming.pop_front() {
            Some(shape) => shape,
            None => self.randomizer.pull(),
        };
        self.top_up();
        shape
    }

    /// The first `n` upcoming shapes
    pub fn preview(&self, n: usize) -> Vec<ShapeId> {
        self.upcoming.iter().take(n).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.upcoming.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn each_bag_holds_all_seven() {
        let mut bag = BagRandomizer::new(42);
        for _ in 0..50 {
            let cycle: HashSet<ShapeId> = (0..7).map(|_| bag.pull()).collect();
            assert_eq!(cycle.len(), 7);
        }
    }

    #[test]
    fn bag_shrinks_then_refills() {
        let mut bag = BagRandomizer::new(7);
        assert_eq!(bag.remaining, 0);
        let first = bag.pull();
        assert_eq!(bag.remaining, 6);
        assert!(!bag.bag[..bag.remaining].contains(&first));
        for _ in 0..6 {
            bag.pull();
        }
        assert_eq!(bag.remaining, 0);
        bag.pull();
        assert_eq!(bag.remaining, 6);
    }

    #[test]
    fn same_seed_same_sequence() {
        let a: Vec<ShapeId> = BagRandomizer::new(99).take(28).collect();
        let b: Vec<ShapeId> = BagRandomizer::new(99).take(28).collect();
        let c: Vec<ShapeId> = BagRandomizer::new(100).take(28).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn queue_stays_topped_up() {
        let mut queue = PieceQueue::new(1);
        assert_eq!(queue.len(), QUEUE_LEN);
        let preview = queue.preview(3);
        let next = queue.next_shape();
        assert_eq!(next, preview[0]);
        assert_eq!(queue.len(), QUEUE_LEN);
        assert_eq!(queue.preview(2), preview[1..].to_vec());
    }
}
