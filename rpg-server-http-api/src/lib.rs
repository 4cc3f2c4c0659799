use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use log::{error, info};
use rpg_server_domain::{ServiceError, app::AppState};

mod characters;
mod duels;
mod fights;

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/characters/{user_id}", get(characters::get_character))
        .route("/characters/{user_id}/stats", get(characters::get_stats))
        .route(
            "/characters/{user_id}/cooldown",
            get(characters::get_cooldown),
        )
        .route("/characters/{user_id}/rating", put(characters::set_rating))
        .route("/leaderboard", get(characters::get_leaderboard))
        .route("/duels", post(duels::record_duel))
        .route("/fights", post(fights::record_fight))
        .route(
            "/fights/{message_id}",
            get(fights::get_fight).delete(fights::delete_fight),
        )
        .with_state(app)
}

pub async fn run(
    app: AppState,
    port: u16,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    info!("API server listening on port {}", port);
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("HTTP API shut down gracefully");
    Ok(())
}

#[derive(Debug)]
pub struct ApiError(ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg) = match self.0 {
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServiceError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServiceError::NotPossible(msg) => (StatusCode::BAD_REQUEST, msg),
            ServiceError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ServiceError::ConstraintViolation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ServiceError::Internal(msg) => {
                error!("Internal error while handling request: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        let body = serde_json::json!({ "error": msg });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        ApiError(value)
    }
}
