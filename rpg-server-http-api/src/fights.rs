use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rpg_server_domain::{app::AppState, fight::RpgFight};

use crate::ApiError;

#[derive(serde::Serialize, serde::Deserialize)]
pub struct JsonFight {
    message_id: String,
    log: String,
}

impl From<RpgFight> for JsonFight {
    fn from(fight: RpgFight) -> Self {
        Self {
            message_id: fight.message_id,
            log: fight.log,
        }
    }
}

pub async fn record_fight(
    State(app): State<AppState>,
    Json(request): Json<JsonFight>,
) -> Result<(StatusCode, Json<JsonFight>), ApiError> {
    let fight = app
        .fight_service
        .record_fight(&request.message_id, request.log)
        .await?;
    Ok((StatusCode::CREATED, Json(fight.into())))
}

pub async fn get_fight(
    Path(message_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<JsonFight>, ApiError> {
    let fight = app.fight_service.get_fight(&message_id).await?;
    Ok(Json(fight.into()))
}

pub async fn delete_fight(
    Path(message_id): Path<String>,
    State(app): State<AppState>,
) -> Result<StatusCode, ApiError> {
    app.fight_service.delete_fight(&message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
