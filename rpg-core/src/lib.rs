mod cooldown;
mod elo;
mod outcome;

pub use cooldown::{LOSS_COOLDOWN, cooldown_end, remaining_cooldown};
pub use elo::{DEFAULT_ELO, EloBounds};
pub use outcome::{MAX_ROLL, Outcome, roll_scores};
