use std::sync::Arc;

use crate::{
    character::{ArcCharacterRepository, ArcCharacterService, CharacterServiceImpl},
    fight::{ArcFightRepository, ArcFightService, FightServiceImpl},
};

#[derive(Clone)]
pub struct AppState {
    pub character_service: ArcCharacterService,
    pub fight_service: ArcFightService,
}

pub fn construct_app(
    character_repository: ArcCharacterRepository,
    fight_repository: ArcFightRepository,
) -> AppState {
    let character_service: ArcCharacterService =
        Arc::new(Box::new(CharacterServiceImpl::new(character_repository)));
    let fight_service: ArcFightService =
        Arc::new(Box::new(FightServiceImpl::new(fight_repository)));

    AppState {
        character_service,
        fight_service,
    }
}
