use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use rpg_server_domain::{
    app::AppState,
    character::{CharacterStats, RpgCharacter},
};

use crate::ApiError;

const DEFAULT_LEADERBOARD_SIZE: u32 = 10;

#[derive(serde::Serialize, Clone)]
pub struct JsonCharacterResponse {
    user_id: String,
    wins: i64,
    losses: i64,
    draws: i64,
    last_loss: i64,
    elo_rank: i64,
    peak_elo: i64,
    floor_elo: i64,
}

impl From<RpgCharacter> for JsonCharacterResponse {
    fn from(character: RpgCharacter) -> Self {
        Self {
            user_id: character.user_id,
            wins: character.wins,
            losses: character.losses,
            draws: character.draws,
            last_loss: character.last_loss.timestamp(),
            elo_rank: character.elo_rank,
            peak_elo: character.peak_elo,
            floor_elo: character.floor_elo,
        }
    }
}

#[derive(serde::Serialize)]
pub struct JsonStatsResponse {
    user_id: String,
    scoresheet: String,
    wins: i64,
    losses: i64,
    draws: i64,
    total_duels: i64,
    elo_rank: i64,
    peak_elo: i64,
    floor_elo: i64,
}

impl From<CharacterStats> for JsonStatsResponse {
    fn from(stats: CharacterStats) -> Self {
        Self {
            scoresheet: stats.scoresheet(),
            user_id: stats.user_id,
            wins: stats.wins,
            losses: stats.losses,
            draws: stats.draws,
            total_duels: stats.total_duels,
            elo_rank: stats.elo.rating,
            peak_elo: stats.elo.peak,
            floor_elo: stats.elo.floor,
        }
    }
}

#[derive(serde::Serialize)]
pub struct JsonCooldownResponse {
    user_id: String,
    on_cooldown: bool,
    remaining_secs: Option<i64>,
    until: Option<i64>,
}

#[derive(serde::Deserialize)]
pub struct JsonSetRatingRequest {
    elo_rank: i64,
}

#[derive(serde::Deserialize)]
pub struct JsonLeaderboardQuery {
    limit: Option<u32>,
}

pub async fn get_character(
    Path(user_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<JsonCharacterResponse>, ApiError> {
    let character = app.character_service.get_character(&user_id).await?;
    Ok(Json(character.into()))
}

pub async fn get_stats(
    Path(user_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<JsonStatsResponse>, ApiError> {
    let stats = app.character_service.get_stats(&user_id).await?;
    Ok(Json(stats.into()))
}

pub async fn get_cooldown(
    Path(user_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<JsonCooldownResponse>, ApiError> {
    let now = Utc::now();
    let remaining = app
        .character_service
        .get_remaining_cooldown(&user_id, now)
        .await?;
    let response = JsonCooldownResponse {
        on_cooldown: remaining.is_some(),
        remaining_secs: remaining.map(|d| d.num_seconds()),
        until: remaining.map(|d| (now + d).timestamp()),
        user_id,
    };
    Ok(Json(response))
}

pub async fn set_rating(
    Path(user_id): Path<String>,
    State(app): State<AppState>,
    Json(request): Json<JsonSetRatingRequest>,
) -> Result<Json<JsonCharacterResponse>, ApiError> {
    let character = app
        .character_service
        .set_rating(&user_id, request.elo_rank)
        .await?;
    Ok(Json(character.into()))
}

pub async fn get_leaderboard(
    State(app): State<AppState>,
    Query(query): Query<JsonLeaderboardQuery>,
) -> Result<Json<Vec<JsonCharacterResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let characters = app.character_service.get_leaderboard(limit).await?;
    Ok(Json(characters.into_iter().map(Into::into).collect()))
}
