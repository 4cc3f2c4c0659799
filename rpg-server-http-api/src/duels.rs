use axum::{Json, extract::State};
use chrono::Utc;
use rpg_core::{MAX_ROLL, roll_scores};
use rpg_server_domain::{
    ServiceError,
    app::AppState,
    character::{DuelMessage, DuelReport},
};

use crate::ApiError;

#[derive(serde::Deserialize)]
pub struct JsonDuelRequest {
    challenger: String,
    accepter: String,
    challenger_score: Option<u32>,
    accepter_score: Option<u32>,
    message_id: Option<String>,
    log: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct JsonDuelResponse {
    challenger: String,
    accepter: String,
    challenger_score: u32,
    accepter_score: u32,
    outcome: &'static str,
    winner: Option<String>,
    message_id: Option<String>,
}

impl JsonDuelResponse {
    fn new(report: DuelReport, message_id: Option<String>) -> Self {
        Self {
            winner: report.winner().cloned(),
            outcome: report.outcome.as_str(),
            challenger_score: report.challenger_score,
            accepter_score: report.accepter_score,
            challenger: report.challenger,
            accepter: report.accepter,
            message_id,
        }
    }
}

/// Records a duel and, when a message id is given, its fight log in the same write.
pub async fn record_duel(
    State(app): State<AppState>,
    Json(request): Json<JsonDuelRequest>,
) -> Result<Json<JsonDuelResponse>, ApiError> {
    let (rolled_challenger, rolled_accepter) = roll_scores(&mut rand::rng());
    let challenger_score = request.challenger_score.unwrap_or(rolled_challenger);
    let accepter_score = request.accepter_score.unwrap_or(rolled_accepter);
    if challenger_score > MAX_ROLL || accepter_score > MAX_ROLL {
        return Err(ServiceError::BadRequest(format!("Scores must be at most {}", MAX_ROLL)).into());
    }

    let message = match (request.message_id.clone(), request.log) {
        (Some(message_id), log) => Some(DuelMessage { message_id, log }),
        (None, Some(_)) => {
            return Err(
                ServiceError::BadRequest("A fight log needs a message id".to_string()).into(),
            );
        }
        (None, None) => None,
    };

    let report = app
        .character_service
        .record_duel(
            &request.challenger,
            &request.accepter,
            challenger_score,
            accepter_score,
            message,
            Utc::now(),
        )
        .await?;

    Ok(Json(JsonDuelResponse::new(report, request.message_id)))
}
