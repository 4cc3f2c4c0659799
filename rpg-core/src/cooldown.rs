use chrono::{DateTime, Duration, Utc};

/// How long a character has to wait after losing before dueling again.
pub const LOSS_COOLDOWN: Duration = Duration::minutes(60);

pub fn cooldown_end(last_loss: DateTime<Utc>) -> DateTime<Utc> {
    last_loss + LOSS_COOLDOWN
}

pub fn remaining_cooldown(last_loss: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let end = cooldown_end(last_loss);
    if end > now { Some(end - now) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_cooldown() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let recent = now - Duration::minutes(15);
        assert_eq!(remaining_cooldown(recent, now), Some(Duration::minutes(45)));

        let exactly = now - LOSS_COOLDOWN;
        assert_eq!(remaining_cooldown(exactly, now), None);

        assert_eq!(remaining_cooldown(DateTime::UNIX_EPOCH, now), None);
    }
}
