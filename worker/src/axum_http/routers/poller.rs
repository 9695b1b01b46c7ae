use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::post,
};
use crates::application::usecases::reminder_poller::{CycleReport, ReminderPoller};

use crate::axum_http::error_responses::AppError;

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/poller/run" \
//     -H "Authorization: Bearer $INTERNAL_POLLER_TOKEN"

#[derive(Clone)]
pub struct PollerRouteState {
    poller: Arc<ReminderPoller>,
    internal_token: Option<String>,
}

pub fn routes(poller: Arc<ReminderPoller>, internal_token: Option<String>) -> Router {
    Router::new()
        .route("/run", post(run_poll_cycle))
        .with_state(PollerRouteState {
            poller,
            internal_token,
        })
}

/// Runs one cycle on demand, sharing the in-flight guard with the background loop.
pub async fn run_poll_cycle(
    State(state): State<PollerRouteState>,
    headers: HeaderMap,
) -> Result<Json<CycleReport>, AppError> {
    let expected_token = state.internal_token.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("poller token is not configured".to_string())
    })?;

    authorize_bearer(&headers, expected_token)?;

    // The cycle runs to completion even if this request is dropped.
    let poller = Arc::clone(&state.poller);
    let report = tokio::spawn(async move { poller.run_cycle().await })
        .await
        .map_err(|err| AppError::Internal(anyhow::anyhow!("poll cycle task failed: {err}")))??;
    if report.skipped {
        return Err(AppError::Conflict(
            "a poll cycle is already running".to_string(),
        ));
    }

    Ok(Json(report))
}

fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
