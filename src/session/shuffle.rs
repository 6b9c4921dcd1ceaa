use rand::seq::SliceRandom;
use rand::Rng;

use crate::db::models::{Question, OPTION_COUNT};

/// Uniform draw without replacement: full Fisher-Yates shuffle, then truncate.
pub(crate) fn draw_questions<R: Rng + ?Sized>(
    bank: &[Question],
    count: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut drawn = bank.to_vec();
    drawn.shuffle(rng);
    drawn.truncate(count);
    drawn
}

/// Display order of the options: `order[display] == original index`.
pub(crate) fn option_order<R: Rng + ?Sized>(rng: &mut R) -> [u8; OPTION_COUNT] {
    let mut order = [0u8, 1, 2, 3];
    order.shuffle(rng);
    order
}
