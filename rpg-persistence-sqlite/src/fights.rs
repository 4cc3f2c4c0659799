use log::debug;
use rpg_server_domain::{
    ServiceResult,
    fight::{FightRepository, RpgFight},
};
use sqlx::{Pool, Sqlite};

use crate::map_db_error;

pub struct SqliteFightRepository {
    pool: Pool<Sqlite>,
}

impl SqliteFightRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FightRepository for SqliteFightRepository {
    async fn create_fight(&self, fight: &RpgFight) -> ServiceResult<()> {
        sqlx::query("INSERT INTO RPGFight (message_id, log) VALUES (?, ?)")
            .bind(&fight.message_id)
            .bind(&fight.log)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        debug!("Created fight {}", fight.message_id);
        Ok(())
    }

    async fn get_fight(&self, message_id: &str) -> ServiceResult<Option<RpgFight>> {
        let fight: Option<(String, String)> =
            sqlx::query_as("SELECT message_id, log FROM RPGFight WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
        Ok(fight.map(|(message_id, log)| RpgFight { message_id, log }))
    }

    async fn delete_fight(&self, message_id: &str) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM RPGFight WHERE message_id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use rpg_server_domain::ServiceError;

    use super::*;
    use crate::migrated_memory_pool;

    #[tokio::test]
    async fn test_fight_round_trip() {
        let repo = SqliteFightRepository::new(migrated_memory_pool().await);
        let fight = RpgFight {
            message_id: "1122334455".to_string(),
            log: "{\"rounds\":[[80,20]],\"winner\":\"alice\"}".to_string(),
        };

        repo.create_fight(&fight).await.unwrap();

        assert_eq!(repo.get_fight("1122334455").await.unwrap(), Some(fight));
        assert_eq!(repo.get_fight("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_message_id_conflicts() {
        let repo = SqliteFightRepository::new(migrated_memory_pool().await);
        let fight = RpgFight {
            message_id: "1".to_string(),
            log: "first".to_string(),
        };
        repo.create_fight(&fight).await.unwrap();

        let duplicate = RpgFight {
            message_id: "1".to_string(),
            log: "second".to_string(),
        };
        assert!(matches!(
            repo.create_fight(&duplicate).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(repo.get_fight("1").await.unwrap(), Some(fight));
    }

    #[tokio::test]
    async fn test_delete_fight() {
        let repo = SqliteFightRepository::new(migrated_memory_pool().await);
        repo.create_fight(&RpgFight {
            message_id: "1".to_string(),
            log: String::new(),
        })
        .await
        .unwrap();

        assert!(repo.delete_fight("1").await.unwrap());
        assert!(!repo.delete_fight("1").await.unwrap());
        assert_eq!(repo.get_fight("1").await.unwrap(), None);
    }
}
