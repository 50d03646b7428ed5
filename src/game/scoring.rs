//! Client-visible score
//!
//! Score never feeds back into attack; it is display state only.

/// Points for clearing 0..=4 rows at once
pub const LINE_SCORES: [u32; 5] = [0, 100, 300, 500, 800];
/// Per-step bonus while a combo chain is running
pub const COMBO_BASE: u32 = 50;
/// Per-row points for a player soft drop
pub const SOFT_DROP_POINTS: u32 = 1;
/// Per-row points for a hard drop
pub const HARD_DROP_POINTS: u32 = 2;

const B2B_NUMERATOR: u32 = 3;
const B2B_DENOMINATOR: u32 = 2;

/// Points for a clearing lock. A quad that follows a quad earns 3/2.
pub fn line_clear_points(lines: u32, back_to_back: bool) -> u32 {
    let base = LINE_SCORES[lines.min(4) as usize];
    if back_to_back && lines >= 4 {
        base * B2B_NUMERATOR / B2B_DENOMINATOR
    } else {
        base
    }
}

pub fn combo_bonus(combo: i32) -> u32 {
    if combo <= 0 {
        return 0;
    }
    COMBO_BASE * combo as u32
}
