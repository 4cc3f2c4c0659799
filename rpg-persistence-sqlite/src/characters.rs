use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::debug;
use rpg_core::{LOSS_COOLDOWN, Outcome};
use rpg_server_domain::{
    ServiceError, ServiceResult,
    character::{CharacterRepository, DuelReport, RpgCharacter, UserId, cooldown_error},
    fight::RpgFight,
};
use sqlx::{Pool, Row, Sqlite, SqliteConnection, sqlite::SqliteRow};

use crate::map_db_error;

const CHARACTER_COLUMNS: &str =
    "user_id, losses, wins, draws, last_loss, elo_rank, peak_elo, floor_elo";

/// `last_loss` is stored as nanoseconds since the epoch.
fn to_stored_nanos(at: DateTime<Utc>) -> ServiceResult<i64> {
    match at.timestamp_nanos_opt() {
        Some(nanos) => Ok(nanos),
        None => ServiceError::bad_request(format!("Time {} cannot be stored", at)),
    }
}

pub struct SqliteCharacterRepository {
    pool: Pool<Sqlite>,
    character_cache: Arc<moka::sync::Cache<UserId, RpgCharacter>>,
    /// Bumped after every committed write, before its cache invalidation.
    write_generation: AtomicU64,
}

impl SqliteCharacterRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let character_cache = Arc::new(
            moka::sync::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),
        );
        Self {
            pool,
            character_cache,
            write_generation: AtomicU64::new(0),
        }
    }

    fn character_from_row(row: &SqliteRow) -> ServiceResult<RpgCharacter> {
        let get_i64 = |column: &str| row.try_get::<i64, _>(column).map_err(map_db_error);
        Ok(RpgCharacter {
            user_id: row.try_get("user_id").map_err(map_db_error)?,
            losses: get_i64("losses")?,
            wins: get_i64("wins")?,
            draws: get_i64("draws")?,
            last_loss: DateTime::from_timestamp_nanos(get_i64("last_loss")?),
            elo_rank: get_i64("elo_rank")?,
            peak_elo: get_i64("peak_elo")?,
            floor_elo: get_i64("floor_elo")?,
        })
    }

    async fn fetch_character(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> ServiceResult<Option<RpgCharacter>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM RPGCharacter WHERE user_id = ?",
            CHARACTER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(Self::character_from_row).transpose()
    }

    async fn fetch_existing_character(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> ServiceResult<RpgCharacter> {
        match Self::fetch_character(conn, user_id).await? {
            Some(character) => Ok(character),
            None => ServiceError::not_found(format!("No character for user {}", user_id)),
        }
    }

    /// Applies one side of a duel unless the character is still on cooldown at `cutoff`.
    async fn apply_outcome(
        conn: &mut SqliteConnection,
        user_id: &str,
        outcome: Outcome,
        at_nanos: i64,
        cutoff_nanos: i64,
    ) -> ServiceResult<()> {
        let query = match outcome {
            Outcome::Win => sqlx::query(
                "UPDATE RPGCharacter SET wins = wins + 1 WHERE user_id = ? AND last_loss <= ?",
            )
            .bind(user_id)
            .bind(cutoff_nanos),
            Outcome::Loss => sqlx::query(
                "UPDATE RPGCharacter SET losses = losses + 1, last_loss = ? WHERE user_id = ? AND last_loss <= ?",
            )
            .bind(at_nanos)
            .bind(user_id)
            .bind(cutoff_nanos),
            Outcome::Draw => sqlx::query(
                "UPDATE RPGCharacter SET draws = draws + 1 WHERE user_id = ? AND last_loss <= ?",
            )
            .bind(user_id)
            .bind(cutoff_nanos),
        };
        let result = query.execute(&mut *conn).await.map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            let character = Self::fetch_existing_character(conn, user_id).await?;
            return Err(cooldown_error(user_id, character.last_loss));
        }
        Ok(())
    }

    fn invalidate(&self, user_ids: &[&str]) {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        for user_id in user_ids {
            self.character_cache.invalidate(*user_id);
        }
    }

    /// Caches a row read while the write generation was `generation`.
    fn cache_read(&self, generation: u64, character: &RpgCharacter) {
        self.character_cache
            .insert(character.user_id.clone(), character.clone());
        if self.write_generation.load(Ordering::SeqCst) != generation {
            self.character_cache.invalidate(&character.user_id);
        }
    }
}

#[async_trait::async_trait]
impl CharacterRepository for SqliteCharacterRepository {
    async fn create_character(&self, character: &RpgCharacter) -> ServiceResult<()> {
        sqlx::query(&format!(
            "INSERT INTO RPGCharacter ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            CHARACTER_COLUMNS
        ))
        .bind(&character.user_id)
        .bind(character.losses)
        .bind(character.wins)
        .bind(character.draws)
        .bind(to_stored_nanos(character.last_loss)?)
        .bind(character.elo_rank)
        .bind(character.peak_elo)
        .bind(character.floor_elo)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        debug!("Created character {}", character.user_id);
        self.invalidate(&[character.user_id.as_str()]);
        Ok(())
    }

    async fn create_default_character(&self, user_id: &str) -> ServiceResult<RpgCharacter> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        sqlx::query("INSERT INTO RPGCharacter (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
        let character = Self::fetch_existing_character(&mut conn, user_id).await?;

        debug!("Created character {} with defaults", user_id);
        self.invalidate(&[user_id]);
        Ok(character)
    }

    async fn get_character(&self, user_id: &str) -> ServiceResult<Option<RpgCharacter>> {
        if let Some(cached) = self.character_cache.get(user_id) {
            return Ok(Some(cached));
        }
        let generation = self.write_generation.load(Ordering::SeqCst);
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        let character = Self::fetch_character(&mut conn, user_id).await?;
        if let Some(character) = &character {
            self.cache_read(generation, character);
        }
        Ok(character)
    }

    async fn get_or_create_character(&self, user_id: &str) -> ServiceResult<RpgCharacter> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        sqlx::query("INSERT OR IGNORE INTO RPGCharacter (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
        Self::fetch_existing_character(&mut conn, user_id).await
    }

    async fn record_win(
        &self,
        winner: &str,
        loser: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let at_nanos = to_stored_nanos(at)?;
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO RPGCharacter (user_id, wins) VALUES (?, 1)
            ON CONFLICT(user_id) DO UPDATE SET wins = wins + 1",
        )
        .bind(winner)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
        sqlx::query(
            "INSERT INTO RPGCharacter (user_id, losses, last_loss) VALUES (?, 1, ?)
            ON CONFLICT(user_id) DO UPDATE SET losses = losses + 1, last_loss = excluded.last_loss",
        )
        .bind(loser)
        .bind(at_nanos)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)?;

        debug!("Recorded win of {} over {}", winner, loser);
        self.invalidate(&[winner, loser]);
        Ok(())
    }

    async fn record_draw(&self, first: &str, second: &str) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for user_id in [first, second] {
            sqlx::query(
                "INSERT INTO RPGCharacter (user_id, draws) VALUES (?, 1)
                ON CONFLICT(user_id) DO UPDATE SET draws = draws + 1",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)?;

        debug!("Recorded draw between {} and {}", first, second);
        self.invalidate(&[first, second]);
        Ok(())
    }

    async fn record_duel(
        &self,
        report: &DuelReport,
        at: DateTime<Utc>,
        fight: Option<&RpgFight>,
    ) -> ServiceResult<()> {
        let at_nanos = to_stored_nanos(at)?;
        let cutoff_nanos = at
            .checked_sub_signed(LOSS_COOLDOWN)
            .and_then(|cutoff| cutoff.timestamp_nanos_opt())
            .unwrap_or(i64::MIN);

        // Dropping the transaction on any error rolls back every statement below.
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for user_id in [&report.challenger, &report.accepter] {
            sqlx::query("INSERT OR IGNORE INTO RPGCharacter (user_id) VALUES (?)")
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        Self::apply_outcome(
            &mut tx,
            &report.challenger,
            report.outcome,
            at_nanos,
            cutoff_nanos,
        )
        .await?;
        Self::apply_outcome(
            &mut tx,
            &report.accepter,
            report.outcome.invert(),
            at_nanos,
            cutoff_nanos,
        )
        .await?;
        if let Some(fight) = fight {
            sqlx::query("INSERT INTO RPGFight (message_id, log) VALUES (?, ?)")
                .bind(&fight.message_id)
                .bind(&fight.log)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)?;

        debug!(
            "Recorded duel between {} and {} ({})",
            report.challenger,
            report.accepter,
            report.outcome.as_str()
        );
        self.invalidate(&[report.challenger.as_str(), report.accepter.as_str()]);
        Ok(())
    }

    async fn set_rating(&self, user_id: &str, rating: i64) -> ServiceResult<RpgCharacter> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let result = sqlx::query(
            "UPDATE RPGCharacter SET elo_rank = ?, peak_elo = MAX(peak_elo, ?), floor_elo = MIN(floor_elo, ?) WHERE user_id = ?",
        )
        .bind(rating)
        .bind(rating)
        .bind(rating)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found(format!("No character for user {}", user_id));
        }
        let character = Self::fetch_existing_character(&mut tx, user_id).await?;
        tx.commit().await.map_err(map_db_error)?;

        self.invalidate(&[user_id]);
        Ok(character)
    }

    async fn get_leaderboard(&self, limit: u32) -> ServiceResult<Vec<RpgCharacter>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM RPGCharacter ORDER BY elo_rank DESC, user_id ASC LIMIT ?",
            CHARACTER_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(Self::character_from_row).collect()
    }
}
