use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::info;

use crate::{ServiceError, ServiceResult};

pub type MessageId = String;

/// Log of a fight, keyed by the message that announced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpgFight {
    pub message_id: MessageId,
    pub log: String,
}

pub fn validate_message_id(message_id: &str) -> ServiceResult<()> {
    if message_id.trim().is_empty() {
        return ServiceError::bad_request("Message id must not be empty");
    }
    Ok(())
}

pub type ArcFightRepository = Arc<Box<dyn FightRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait FightRepository {
    async fn create_fight(&self, fight: &RpgFight) -> ServiceResult<()>;
    async fn get_fight(&self, message_id: &str) -> ServiceResult<Option<RpgFight>>;
    async fn delete_fight(&self, message_id: &str) -> ServiceResult<bool>;
}

pub type ArcFightService = Arc<Box<dyn FightService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait FightService {
    async fn record_fight(&self, message_id: &str, log: String) -> ServiceResult<RpgFight>;
    async fn get_fight(&self, message_id: &str) -> ServiceResult<RpgFight>;
    async fn delete_fight(&self, message_id: &str) -> ServiceResult<()>;
}

pub struct FightServiceImpl {
    fight_repository: ArcFightRepository,
}

impl FightServiceImpl {
    pub fn new(fight_repository: ArcFightRepository) -> Self {
        Self { fight_repository }
    }
}

#[async_trait::async_trait]
impl FightService for FightServiceImpl {
    async fn record_fight(&self, message_id: &str, log: String) -> ServiceResult<RpgFight> {
        validate_message_id(message_id)?;
        let fight = RpgFight {
            message_id: message_id.to_string(),
            log,
        };
        self.fight_repository.create_fight(&fight).await?;
        info!("Stored fight log for message {}", message_id);
        Ok(fight)
    }

    async fn get_fight(&self, message_id: &str) -> ServiceResult<RpgFight> {
        match self.fight_repository.get_fight(message_id).await? {
            Some(fight) => Ok(fight),
            None => ServiceError::not_found(format!("No fight for message {}", message_id)),
        }
    }

    async fn delete_fight(&self, message_id: &str) -> ServiceResult<()> {
        if !self.fight_repository.delete_fight(message_id).await? {
            return ServiceError::not_found(format!("No fight for message {}", message_id));
        }
        info!("Deleted fight log for message {}", message_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockFightRepository {
    pub fights: Arc<Mutex<HashMap<MessageId, RpgFight>>>,
}

#[async_trait::async_trait]
impl FightRepository for MockFightRepository {
    async fn create_fight(&self, fight: &RpgFight) -> ServiceResult<()> {
        let mut fights = self.fights.lock().unwrap();
        if fights.contains_key(&fight.message_id) {
            return Err(ServiceError::Conflict(fight.message_id.clone()));
        }
        fights.insert(fight.message_id.clone(), fight.clone());
        Ok(())
    }

    async fn get_fight(&self, message_id: &str) -> ServiceResult<Option<RpgFight>> {
        Ok(self.fights.lock().unwrap().get(message_id).cloned())
    }

    async fn delete_fight(&self, message_id: &str) -> ServiceResult<bool> {
        Ok(self.fights.lock().unwrap().remove(message_id).is_some())
    }
}
