use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use crates::{
    application::usecases::schedule_reminder::{
        ReminderSchedulingUseCase, ScheduleOutcome, ScheduleReminderParams,
    },
    domain::{
        entities::reminders::ReminderEntity,
        value_objects::enums::reminder_statuses::ReminderStatus,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::axum_http::error_responses::AppError;

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/api/v1/reminders" \
//     -H "Content-Type: application/json" \
//     -d '{"recipient":"a@x.com","payload":{"name":"Round 1","start_time":"2030-01-01T10:00:00Z"}}'

pub fn routes(usecase: Arc<ReminderSchedulingUseCase>) -> Router {
    Router::new()
        .route("/", post(schedule_reminder))
        .route("/send-now", post(send_now))
        .route("/send-test", post(send_test))
        .route("/:reminder_id", get(get_reminder))
        .with_state(usecase)
}

#[derive(Debug, Deserialize)]
pub struct ScheduleReminderRequest {
    pub recipient: Option<String>,
    pub payload: Option<Value>,
    pub lead_time_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleReminderResponse {
    pub immediate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SendNowRequest {
    pub recipient: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SendTestRequest {
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeliveredResponse {
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
pub struct ReminderView {
    pub id: Uuid,
    pub recipient: String,
    pub status: ReminderStatus,
    pub payload: Value,
    pub fire_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReminderEntity> for ReminderView {
    fn from(reminder: ReminderEntity) -> Self {
        Self {
            status: reminder.status(),
            id: reminder.id,
            recipient: reminder.recipient,
            payload: reminder.payload,
            fire_at: reminder.fire_at,
            next_attempt_at: reminder.next_attempt_at,
            delivered_at: reminder.delivered_at,
            attempt_count: reminder.attempt_count,
            last_error: reminder.last_error,
            dead_lettered_at: reminder.dead_lettered_at,
            created_at: reminder.created_at,
        }
    }
}

fn require_payload(payload: Option<Value>) -> Result<Value, AppError> {
    match payload {
        Some(payload) if payload.is_object() => Ok(payload),
        Some(_) => Err(AppError::BadRequest("payload must be an object".to_string())),
        None => Err(AppError::BadRequest("payload is required".to_string())),
    }
}

pub async fn schedule_reminder(
    State(usecase): State<Arc<ReminderSchedulingUseCase>>,
    Json(request): Json<ScheduleReminderRequest>,
) -> Result<Json<ScheduleReminderResponse>, AppError> {
    let payload = require_payload(request.payload)?;
    let lead_time = match request.lead_time_minutes {
        Some(minutes) => Some(Duration::try_minutes(minutes).ok_or_else(|| {
            AppError::BadRequest("lead_time_minutes is out of range".to_string())
        })?),
        None => None,
    };
    let params = ScheduleReminderParams {
        recipient: request.recipient.unwrap_or_default(),
        payload,
        lead_time,
    };

    let response = match usecase.schedule(params).await? {
        ScheduleOutcome::Immediate => ScheduleReminderResponse {
            immediate: true,
            fire_at: None,
            reminder_id: None,
        },
        ScheduleOutcome::Scheduled {
            reminder_id,
            fire_at,
        } => ScheduleReminderResponse {
            immediate: false,
            fire_at: Some(fire_at),
            reminder_id: Some(reminder_id),
        },
    };

    Ok(Json(response))
}

pub async fn send_now(
    State(usecase): State<Arc<ReminderSchedulingUseCase>>,
    Json(request): Json<SendNowRequest>,
) -> Result<Json<DeliveredResponse>, AppError> {
    let payload = require_payload(request.payload)?;
    usecase
        .send_now(request.recipient.as_deref().unwrap_or_default(), &payload)
        .await?;

    Ok(Json(DeliveredResponse { delivered: true }))
}

pub async fn send_test(
    State(usecase): State<Arc<ReminderSchedulingUseCase>>,
    Json(request): Json<SendTestRequest>,
) -> Result<Json<DeliveredResponse>, AppError> {
    usecase
        .send_test(request.recipient.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(DeliveredResponse { delivered: true }))
}

pub async fn get_reminder(
    State(usecase): State<Arc<ReminderSchedulingUseCase>>,
    Path(reminder_id): Path<String>,
) -> Result<Json<ReminderView>, AppError> {
    let reminder_id = Uuid::parse_str(&reminder_id)
        .map_err(|_| AppError::BadRequest("reminder id must be a UUID".to_string()))?;

    usecase
        .find_reminder(reminder_id)
        .await?
        .map(|reminder| Json(ReminderView::from(reminder)))
        .ok_or_else(|| AppError::NotFound(format!("reminder {reminder_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use crates::{
        application::usecases::{
            dispatch_reminder::ReminderDispatcher, render_reminder::ContestMessageRenderer,
        },
        domain::repositories::mail_transport::MockMailTransport,
        infra::db::repositories::reminders_in_memory::InMemoryReminderRepository,
    };
    use serde_json::json;
    use tower::util::ServiceExt;

    fn router(fail: bool) -> (Router, Arc<InMemoryReminderRepository>) {
        let mut transport = MockMailTransport::new();
        transport.expect_transport_name().return_const("mock");
        transport.expect_send().returning(move |_| {
            Box::pin(async move {
                if fail {
                    Err(anyhow::anyhow!("mail relay rejected message: 550"))
                } else {
                    Ok(())
                }
            })
        });

        let repository = Arc::new(InMemoryReminderRepository::new());
        let dispatcher = Arc::new(ReminderDispatcher::new(
            Arc::new(transport),
            Arc::new(ContestMessageRenderer),
            std::time::Duration::from_secs(5),
        ));
        let usecase = Arc::new(ReminderSchedulingUseCase::new(
            repository.clone(),
            dispatcher,
            Duration::minutes(10),
        ));

        (routes(usecase), repository)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn future_event_is_stored_and_can_be_looked_up() {
        let (router, repository) = router(false);
        let starts_at = Utc::now() + Duration::days(2);

        let response = router
            .clone()
            .oneshot(post_json(
                "/",
                json!({
                    "recipient": "a@x.com",
                    "payload": { "name": "Round 1", "start_time": starts_at.to_rfc3339() }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["immediate"], false);
        let reminder_id = body["reminder_id"].as_str().unwrap().to_string();
        assert_eq!(repository.all().await.len(), 1);

        let lookup = router
            .oneshot(
                Request::builder()
                    .uri(format!("/{reminder_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(lookup.status(), StatusCode::OK);

        let view = json_body(lookup).await;
        assert_eq!(view["status"], "pending");
        assert_eq!(view["attempt_count"], 0);
        assert_eq!(view["recipient"], "a@x.com");
    }

    #[tokio::test]
    async fn past_event_is_sent_immediately() {
        let (router, repository) = router(false);
        let starts_at = Utc::now() + Duration::minutes(5);

        let response = router
            .oneshot(post_json(
                "/",
                json!({
                    "recipient": "a@x.com",
                    "payload": { "startTime": starts_at.to_rfc3339() }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["immediate"], true);
        assert!(body.get("reminder_id").is_none());
        assert!(repository.all().await.is_empty());
    }

    #[tokio::test]
    async fn missing_event_time_is_a_bad_request() {
        let (router, _) = router(false);

        let response = router
            .oneshot(post_json(
                "/",
                json!({ "recipient": "a@x.com", "payload": { "name": "Round 1" } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn oversized_lead_time_is_a_bad_request() {
        for lead_time_minutes in [i64::MAX, 1_000_000_000_000] {
            let (router, repository) = router(false);

            let response = router
                .oneshot(post_json(
                    "/",
                    json!({
                        "recipient": "a@x.com",
                        "payload": { "name": "Round 1", "date": "2030-01-01T00:00:00Z" },
                        "lead_time_minutes": lead_time_minutes,
                    }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
            assert!(repository.all().await.is_empty());
        }
    }

    #[tokio::test]
    async fn send_now_failure_surfaces_the_cause() {
        let (router, _) = router(true);

        let response = router
            .oneshot(post_json(
                "/send-now",
                json!({ "recipient": "a@x.com", "payload": {} }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["code"], "DELIVERY_FAILED");
        assert_eq!(body["message"], "mail relay rejected message: 550");
    }

    #[tokio::test]
    async fn send_test_requires_a_recipient() {
        let (router, _) = router(false);

        let response = router
            .oneshot(post_json("/send-test", json!({ "recipient": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lookup_rejects_bad_ids_and_reports_missing_ones() {
        let (router, _) = router(false);

        let bad = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let missing = router
            .oneshot(
                Request::builder()
                    .uri(format!("/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
