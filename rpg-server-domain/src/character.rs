use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use log::info;
use rpg_core::{DEFAULT_ELO, EloBounds, Outcome, cooldown_end, remaining_cooldown};

use crate::{
    ServiceError, ServiceResult,
    fight::{MessageId, RpgFight, validate_message_id},
};

pub type UserId = String;

const MAX_LEADERBOARD_SIZE: u32 = 100;

/// Duel record and rating of a single user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpgCharacter {
    pub user_id: UserId,
    pub losses: i64,
    pub wins: i64,
    pub draws: i64,
    pub last_loss: DateTime<Utc>,
    pub elo_rank: i64,
    pub peak_elo: i64,
    pub floor_elo: i64,
}

impl RpgCharacter {
    /// A character holding the column defaults of a freshly inserted row.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            losses: 0,
            wins: 0,
            draws: 0,
            last_loss: DateTime::UNIX_EPOCH,
            elo_rank: DEFAULT_ELO,
            peak_elo: DEFAULT_ELO,
            floor_elo: DEFAULT_ELO,
        }
    }

    pub fn elo_bounds(&self) -> EloBounds {
        EloBounds {
            rating: self.elo_rank,
            peak: self.peak_elo,
            floor: self.floor_elo,
        }
    }

    pub fn total_duels(&self) -> i64 {
        self.wins + self.losses + self.draws
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterStats {
    pub user_id: UserId,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub total_duels: i64,
    pub elo: EloBounds,
}

impl CharacterStats {
    pub fn scoresheet(&self) -> String {
        format!("{}-{}-{}", self.wins, self.losses, self.draws)
    }
}

impl From<&RpgCharacter> for CharacterStats {
    fn from(character: &RpgCharacter) -> Self {
        Self {
            user_id: character.user_id.clone(),
            wins: character.wins,
            losses: character.losses,
            draws: character.draws,
            total_duels: character.total_duels(),
            elo: character.elo_bounds(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelReport {
    pub challenger: UserId,
    pub accepter: UserId,
    pub challenger_score: u32,
    pub accepter_score: u32,
    /// Seen from the challenger's side.
    pub outcome: Outcome,
}

impl DuelReport {
    pub fn describe(&self) -> String {
        let result = match self.winner() {
            Some(winner) => format!("{} has won!", winner),
            None => "It's a draw!".to_string(),
        };
        format!(
            "{} has rolled a {} and {} has rolled a {}. {}",
            self.accepter, self.accepter_score, self.challenger, self.challenger_score, result
        )
    }

    pub fn winner(&self) -> Option<&UserId> {
        match self.outcome {
            Outcome::Win => Some(&self.challenger),
            Outcome::Loss => Some(&self.accepter),
            Outcome::Draw => None,
        }
    }

    pub fn loser(&self) -> Option<&UserId> {
        match self.outcome {
            Outcome::Win => Some(&self.accepter),
            Outcome::Loss => Some(&self.challenger),
            Outcome::Draw => None,
        }
    }
}

/// Message a duel was announced in. Without a log the duel description is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelMessage {
    pub message_id: MessageId,
    pub log: Option<String>,
}

pub fn cooldown_error(user_id: &str, last_loss: DateTime<Utc>) -> ServiceError {
    ServiceError::NotPossible(format!(
        "{} has recently lost a duel, try again after {}",
        user_id,
        cooldown_end(last_loss).timestamp()
    ))
}

pub type ArcCharacterRepository = Arc<Box<dyn CharacterRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait CharacterRepository {
    async fn create_character(&self, character: &RpgCharacter) -> ServiceResult<()>;
    async fn create_default_character(&self, user_id: &str) -> ServiceResult<RpgCharacter>;
    async fn get_character(&self, user_id: &str) -> ServiceResult<Option<RpgCharacter>>;
    async fn get_or_create_character(&self, user_id: &str) -> ServiceResult<RpgCharacter>;
    async fn record_win(&self, winner: &str, loser: &str, at: DateTime<Utc>)
    -> ServiceResult<()>;
    async fn record_draw(&self, first: &str, second: &str) -> ServiceResult<()>;
    /// Applies the duel to both characters and stores the fight, all or nothing.
    ///
    /// Fails with `NotPossible` if either participant lost within the cooldown
    /// before `at`, and with `Conflict` if the fight's message id is taken.
    async fn record_duel(
        &self,
        report: &DuelReport,
        at: DateTime<Utc>,
        fight: Option<&RpgFight>,
    ) -> ServiceResult<()>;
    async fn set_rating(&self, user_id: &str, rating: i64) -> ServiceResult<RpgCharacter>;
    async fn get_leaderboard(&self, limit: u32) -> ServiceResult<Vec<RpgCharacter>>;
}

pub type ArcCharacterService = Arc<Box<dyn CharacterService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait CharacterService {
    async fn get_character(&self, user_id: &str) -> ServiceResult<RpgCharacter>;
    async fn get_stats(&self, user_id: &str) -> ServiceResult<CharacterStats>;
    async fn get_remaining_cooldown(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<chrono::Duration>>;
    async fn ensure_outside_cooldown(&self, user_id: &str, now: DateTime<Utc>)
    -> ServiceResult<()>;
    async fn record_duel(
        &self,
        challenger: &str,
        accepter: &str,
        challenger_score: u32,
        accepter_score: u32,
        message: Option<DuelMessage>,
        now: DateTime<Utc>,
    ) -> ServiceResult<DuelReport>;
    async fn set_rating(&self, user_id: &str, rating: i64) -> ServiceResult<RpgCharacter>;
    async fn get_leaderboard(&self, limit: u32) -> ServiceResult<Vec<RpgCharacter>>;
}

pub struct CharacterServiceImpl {
    character_repository: ArcCharacterRepository,
}

impl CharacterServiceImpl {
    pub fn new(character_repository: ArcCharacterRepository) -> Self {
        Self {
            character_repository,
        }
    }
}

#[async_trait::async_trait]
impl CharacterService for CharacterServiceImpl {
    async fn get_character(&self, user_id: &str) -> ServiceResult<RpgCharacter> {
        match self.character_repository.get_character(user_id).await? {
            Some(character) => Ok(character),
            None => ServiceError::not_found(format!("No character for user {}", user_id)),
        }
    }

    async fn get_stats(&self, user_id: &str) -> ServiceResult<CharacterStats> {
        let character = match self.character_repository.get_character(user_id).await? {
            Some(character) if character.total_duels() > 0 => character,
            _ => return ServiceError::not_found(format!("{} has never dueled before", user_id)),
        };
        Ok(CharacterStats::from(&character))
    }

    async fn get_remaining_cooldown(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<chrono::Duration>> {
        let character = self.character_repository.get_character(user_id).await?;
        Ok(character.and_then(|c| remaining_cooldown(c.last_loss, now)))
    }

    async fn ensure_outside_cooldown(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let character = self
            .character_repository
            .get_or_create_character(user_id)
            .await?;
        if remaining_cooldown(character.last_loss, now).is_some() {
            return Err(cooldown_error(user_id, character.last_loss));
        }
        Ok(())
    }

    async fn record_duel(
        &self,
        challenger: &str,
        accepter: &str,
        challenger_score: u32,
        accepter_score: u32,
        message: Option<DuelMessage>,
        now: DateTime<Utc>,
    ) -> ServiceResult<DuelReport> {
        if challenger.is_empty() || accepter.is_empty() {
            return ServiceError::bad_request("User ids must not be empty");
        }
        if challenger == accepter {
            return ServiceError::bad_request("You cannot join your own duel");
        }
        let report = DuelReport {
            challenger: challenger.to_string(),
            accepter: accepter.to_string(),
            challenger_score,
            accepter_score,
            outcome: Outcome::from_scores(challenger_score, accepter_score),
        };

        let fight = match message {
            Some(message) => {
                validate_message_id(&message.message_id)?;
                Some(RpgFight {
                    log: message.log.unwrap_or_else(|| report.describe()),
                    message_id: message.message_id,
                })
            }
            None => None,
        };

        // Cooldowns are checked inside the write so concurrent duels cannot both pass.
        self.character_repository
            .record_duel(&report, now, fight.as_ref())
            .await?;

        match report.winner() {
            Some(winner) => info!("Duel between {} and {}: {} won", challenger, accepter, winner),
            None => info!("Duel between {} and {} ended in a draw", challenger, accepter),
        }

        Ok(report)
    }

    async fn set_rating(&self, user_id: &str, rating: i64) -> ServiceResult<RpgCharacter> {
        if rating < 0 {
            return ServiceError::bad_request("Rating must not be negative");
        }
        let character = self.character_repository.set_rating(user_id, rating).await?;
        info!(
            "Rating of {} set to {} (peak {}, floor {})",
            user_id, character.elo_rank, character.peak_elo, character.floor_elo
        );
        Ok(character)
    }

    async fn get_leaderboard(&self, limit: u32) -> ServiceResult<Vec<RpgCharacter>> {
        let limit = limit.clamp(1, MAX_LEADERBOARD_SIZE);
        self.character_repository.get_leaderboard(limit).await
    }
}

/// In-memory repository with the same conflict and upsert rules as the database.
#[derive(Clone, Default)]
pub struct MockCharacterRepository {
    pub characters: Arc<Mutex<HashMap<UserId, RpgCharacter>>>,
    /// Shared with a `MockFightRepository` to observe fights stored by duels.
    pub fights: Arc<Mutex<HashMap<MessageId, RpgFight>>>,
}

#[allow(unused)]
impl MockCharacterRepository {
    pub fn get(&self, user_id: &str) -> Option<RpgCharacter> {
        self.characters.lock().unwrap().get(user_id).cloned()
    }

    pub fn insert(&self, character: RpgCharacter) {
        self.characters
            .lock()
            .unwrap()
            .insert(character.user_id.clone(), character);
    }
}

#[async_trait::async_trait]
impl CharacterRepository for MockCharacterRepository {
    async fn create_character(&self, character: &RpgCharacter) -> ServiceResult<()> {
        let mut characters = self.characters.lock().unwrap();
        if characters.contains_key(&character.user_id) {
            return Err(ServiceError::Conflict(character.user_id.clone()));
        }
        characters.insert(character.user_id.clone(), character.clone());
        Ok(())
    }

    async fn create_default_character(&self, user_id: &str) -> ServiceResult<RpgCharacter> {
        let character = RpgCharacter::new(user_id);
        self.create_character(&character).await?;
        Ok(character)
    }

    async fn get_character(&self, user_id: &str) -> ServiceResult<Option<RpgCharacter>> {
        Ok(self.get(user_id))
    }

    async fn get_or_create_character(&self, user_id: &str) -> ServiceResult<RpgCharacter> {
        let mut characters = self.characters.lock().unwrap();
        Ok(characters
            .entry(user_id.to_string())
            .or_insert_with(|| RpgCharacter::new(user_id))
            .clone())
    }

    async fn record_win(
        &self,
        winner: &str,
        loser: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut characters = self.characters.lock().unwrap();
        characters
            .entry(winner.to_string())
            .or_insert_with(|| RpgCharacter::new(winner))
            .wins += 1;
        let loser = characters
            .entry(loser.to_string())
            .or_insert_with(|| RpgCharacter::new(loser));
        loser.losses += 1;
        loser.last_loss = at;
        Ok(())
    }

    async fn record_draw(&self, first: &str, second: &str) -> ServiceResult<()> {
        let mut characters = self.characters.lock().unwrap();
        for user_id in [first, second] {
            characters
                .entry(user_id.to_string())
                .or_insert_with(|| RpgCharacter::new(user_id))
                .draws += 1;
        }
        Ok(())
    }

    async fn record_duel(
        &self,
        report: &DuelReport,
        at: DateTime<Utc>,
        fight: Option<&RpgFight>,
    ) -> ServiceResult<()> {
        let mut characters = self.characters.lock().unwrap();
        let mut fights = self.fights.lock().unwrap();

        for user_id in [&report.challenger, &report.accepter] {
            if let Some(character) = characters.get(user_id) {
                if remaining_cooldown(character.last_loss, at).is_some() {
                    return Err(cooldown_error(user_id, character.last_loss));
                }
            }
        }
        if let Some(fight) = fight {
            if fights.contains_key(&fight.message_id) {
                return Err(ServiceError::Conflict(fight.message_id.clone()));
            }
            fights.insert(fight.message_id.clone(), fight.clone());
        }

        for (user_id, outcome) in [
            (&report.challenger, report.outcome),
            (&report.accepter, report.outcome.invert()),
        ] {
            let character = characters
                .entry(user_id.clone())
                .or_insert_with(|| RpgCharacter::new(user_id.as_str()));
            match outcome {
                Outcome::Win => character.wins += 1,
                Outcome::Loss => {
                    character.losses += 1;
                    character.last_loss = at;
                }
                Outcome::Draw => character.draws += 1,
            }
        }
        Ok(())
    }

    async fn set_rating(&self, user_id: &str, rating: i64) -> ServiceResult<RpgCharacter> {
        let mut characters = self.characters.lock().unwrap();
        let Some(character) = characters.get_mut(user_id) else {
            return ServiceError::not_found(format!("No character for user {}", user_id));
        };
        let mut bounds = character.elo_bounds();
        bounds.apply(rating);
        character.elo_rank = bounds.rating;
        character.peak_elo = bounds.peak;
        character.floor_elo = bounds.floor;
        Ok(character.clone())
    }

    async fn get_leaderboard(&self, limit: u32) -> ServiceResult<Vec<RpgCharacter>> {
        let mut characters: Vec<RpgCharacter> =
            self.characters.lock().unwrap().values().cloned().collect();
        characters.sort_by(|a, b| {
            b.elo_rank
                .cmp(&a.elo_rank)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        characters.truncate(limit as usize);
        Ok(characters)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rpg_core::LOSS_COOLDOWN;

    use super::*;

    fn service() -> (MockCharacterRepository, CharacterServiceImpl) {
        let repo = MockCharacterRepository::default();
        let service = CharacterServiceImpl::new(Arc::new(Box::new(repo.clone())));
        (repo, service)
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_describe_duel() {
        let report = DuelReport {
            challenger: "alice".to_string(),
            accepter: "bob".to_string(),
            challenger_score: 71,
            accepter_score: 12,
            outcome: Outcome::Win,
        };
        assert_eq!(
            report.describe(),
            "bob has rolled a 12 and alice has rolled a 71. alice has won!"
        );

        let draw = DuelReport {
            accepter_score: 71,
            outcome: Outcome::Draw,
            ..report
        };
        assert_eq!(
            draw.describe(),
            "bob has rolled a 71 and alice has rolled a 71. It's a draw!"
        );
    }

    #[tokio::test]
    async fn test_record_duel_win() {
        let (repo, service) = service();

        let report = service
            .record_duel("alice", "bob", 80, 20, None, now())
            .await
            .expect("Failed to record duel");

        assert_eq!(report.outcome, Outcome::Win);
        assert_eq!(report.winner().map(String::as_str), Some("alice"));

        let alice = repo.get("alice").unwrap();
        let bob = repo.get("bob").unwrap();
        assert_eq!((alice.wins, alice.losses, alice.draws), (1, 0, 0));
        assert_eq!((bob.wins, bob.losses, bob.draws), (0, 1, 0));
        assert_eq!(bob.last_loss, now());
        assert_eq!(alice.last_loss, DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_record_duel_draw() {
        let (repo, service) = service();

        let report = service
            .record_duel("alice", "bob", 42, 42, None, now())
            .await
            .expect("Failed to record duel");

        assert_eq!(report.outcome, Outcome::Draw);
        assert!(report.winner().is_none());
        assert_eq!(repo.get("alice").unwrap().draws, 1);
        assert_eq!(repo.get("bob").unwrap().draws, 1);
    }

    #[tokio::test]
    async fn test_duel_stores_fight_log() {
        let (repo, service) = service();

        let report = service
            .record_duel(
                "alice",
                "bob",
                30,
                70,
                Some(DuelMessage {
                    message_id: "m1".to_string(),
                    log: None,
                }),
                now(),
            )
            .await
            .expect("Failed to record duel");

        let fights = repo.fights.lock().unwrap();
        assert_eq!(fights["m1"].log, report.describe());
        assert_eq!(
            fights["m1"].log,
            "bob has rolled a 70 and alice has rolled a 30. bob has won!"
        );
    }

    #[tokio::test]
    async fn test_duel_with_taken_message_id_changes_nothing() {
        let (repo, service) = service();
        repo.fights.lock().unwrap().insert(
            "m1".to_string(),
            RpgFight {
                message_id: "m1".to_string(),
                log: "earlier fight".to_string(),
            },
        );

        for _ in 0..2 {
            let result = service
                .record_duel(
                    "alice",
                    "bob",
                    50,
                    50,
                    Some(DuelMessage {
                        message_id: "m1".to_string(),
                        log: None,
                    }),
                    now(),
                )
                .await;
            assert!(matches!(result, Err(ServiceError::Conflict(_))));
        }

        assert!(repo.get("alice").is_none());
        assert!(repo.get("bob").is_none());
        assert_eq!(repo.fights.lock().unwrap()["m1"].log, "earlier fight");
    }

    #[tokio::test]
    async fn test_duel_with_blank_message_id_is_rejected() {
        let (repo, service) = service();

        let result = service
            .record_duel(
                "alice",
                "bob",
                10,
                20,
                Some(DuelMessage {
                    message_id: " ".to_string(),
                    log: Some("log".to_string()),
                }),
                now(),
            )
            .await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert!(repo.get("bob").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_duels_respect_cooldown() {
        let (repo, service) = service();

        let (first, second) = tokio::join!(
            service.record_duel("alice", "bob", 90, 10, None, now()),
            service.record_duel("carol", "bob", 90, 10, None, now()),
        );

        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        assert!(
            matches!(first, Err(ServiceError::NotPossible(_)))
                || matches!(second, Err(ServiceError::NotPossible(_)))
        );
        assert_eq!(repo.get("bob").unwrap().losses, 1);
    }

    #[tokio::test]
    async fn test_self_duel_is_rejected() {
        let (repo, service) = service();

        let result = service.record_duel("alice", "alice", 10, 5, None, now()).await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert!(repo.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_loser_is_on_cooldown() {
        let (repo, service) = service();

        service
            .record_duel("alice", "bob", 1, 99, None, now())
            .await
            .expect("Failed to record duel");

        let soon = now() + Duration::minutes(10);
        let result = service.record_duel("alice", "carol", 50, 10, None, soon).await;
        assert!(matches!(result, Err(ServiceError::NotPossible(_))));
        assert_eq!(repo.get("alice").unwrap().losses, 1);
        assert!(repo.get("carol").is_none());

        assert_eq!(
            service.get_remaining_cooldown("alice", soon).await.unwrap(),
            Some(LOSS_COOLDOWN - Duration::minutes(10))
        );

        let later = now() + LOSS_COOLDOWN;
        service
            .record_duel("alice", "carol", 50, 10, None, later)
            .await
            .expect("Cooldown should have expired");
        assert_eq!(repo.get("alice").unwrap().wins, 1);
    }

    #[tokio::test]
    async fn test_ensure_outside_cooldown_creates_character() {
        let (repo, service) = service();

        service
            .ensure_outside_cooldown("dave", now())
            .await
            .expect("A new character has no cooldown");
        assert_eq!(repo.get("dave"), Some(RpgCharacter::new("dave")));

        let mut character = RpgCharacter::new("erin");
        character.last_loss = now() - Duration::minutes(59);
        repo.insert(character);
        assert!(matches!(
            service.ensure_outside_cooldown("erin", now()).await,
            Err(ServiceError::NotPossible(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_require_a_duel() {
        let (repo, service) = service();
        repo.insert(RpgCharacter::new("alice"));

        assert!(matches!(
            service.get_stats("alice").await,
            Err(ServiceError::NotFound(_))
        ));

        service
            .record_duel("alice", "bob", 60, 40, None, now())
            .await
            .unwrap();
        service
            .record_duel("alice", "carol", 40, 40, None, now())
            .await
            .unwrap();

        let stats = service.get_stats("alice").await.unwrap();
        assert_eq!(stats.scoresheet(), "1-0-1");
        assert_eq!(stats.total_duels, 2);
        assert_eq!(stats.elo, EloBounds::default());
    }

    #[tokio::test]
    async fn test_set_rating_keeps_bounds() {
        let (repo, service) = service();
        repo.insert(RpgCharacter::new("alice"));

        service.set_rating("alice", 1100).await.unwrap();
        let character = service.set_rating("alice", 950).await.unwrap();

        assert_eq!(character.elo_rank, 950);
        assert_eq!(character.peak_elo, 1100);
        assert_eq!(character.floor_elo, 950);
        assert!(character.elo_bounds().is_consistent());

        assert!(matches!(
            service.set_rating("alice", -1).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            service.set_rating("nobody", 1000).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_leaderboard_limit_is_clamped() {
        let (repo, service) = service();
        for (name, elo) in [("a", 1200), ("b", 900), ("c", 1200)] {
            let mut character = RpgCharacter::new(name);
            character.elo_rank = elo;
            repo.insert(character);
        }

        let top = service.get_leaderboard(0).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, "a");

        let all: Vec<String> = service
            .get_leaderboard(10_000)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.user_id)
            .collect();
        assert_eq!(all, vec!["a", "c", "b"]);
    }
}
