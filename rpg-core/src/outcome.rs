use std::cmp::Ordering;

use rand::Rng;

pub const MAX_ROLL: u32 = 100;

/// Result of a duel from the point of view of one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    pub fn from_scores(own: u32, other: u32) -> Self {
        match own.cmp(&other) {
            Ordering::Greater => Outcome::Win,
            Ordering::Less => Outcome::Loss,
            Ordering::Equal => Outcome::Draw,
        }
    }

    pub fn invert(self) -> Self {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
        }
    }
}

pub fn roll_scores(rng: &mut impl Rng) -> (u32, u32) {
    (
        rng.random_range(0..=MAX_ROLL),
        rng.random_range(0..=MAX_ROLL),
    )
}
