use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::usecases::dispatch_reminder::{DispatchError, ReminderDispatcher},
    domain::{
        entities::reminders::{InsertReminderEntity, ReminderEntity},
        repositories::reminders::ReminderRepository,
        value_objects::contest_event::event_start_time,
    },
};

pub const DEFAULT_LEAD_TIME_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),

    #[error("reminder store failed: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("delivery failed: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone)]
pub struct ScheduleReminderParams {
    pub recipient: String,
    pub payload: Value,
    /// Falls back to the use case's default lead time.
    pub lead_time: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The fire time had already passed; the reminder was sent right away and
    /// nothing was stored.
    Immediate,
    Scheduled {
        reminder_id: Uuid,
        fire_at: DateTime<Utc>,
    },
}

/// Entrypoints exposed to the HTTP layer: scheduling, immediate sends, test
/// sends and status lookups.
pub struct ReminderSchedulingUseCase {
    repository: Arc<dyn ReminderRepository + Send + Sync>,
    dispatcher: Arc<ReminderDispatcher>,
    default_lead_time: Duration,
}

impl ReminderSchedulingUseCase {
    pub fn new(
        repository: Arc<dyn ReminderRepository + Send + Sync>,
        dispatcher: Arc<ReminderDispatcher>,
        default_lead_time: Duration,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            default_lead_time,
        }
    }

    pub async fn schedule(
        &self,
        params: ScheduleReminderParams,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        self.schedule_at(params, Utc::now()).await
    }

    pub async fn schedule_at(
        &self,
        params: ScheduleReminderParams,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        let recipient = validate_recipient(&params.recipient)?;
        let event_start = event_start_time(&params.payload)
            .map_err(|err| ScheduleError::Validation(err.to_string()))?;

        let lead_time = params.lead_time.unwrap_or(self.default_lead_time);
        if lead_time < Duration::zero() {
            return Err(ScheduleError::Validation(
                "lead time must not be negative".to_string(),
            ));
        }

        let fire_at = event_start
            .checked_sub_signed(lead_time)
            .ok_or_else(|| ScheduleError::Validation("lead time is out of range".to_string()))?;

        if fire_at <= now {
            info!(
                %recipient,
                %fire_at,
                "schedule_reminder: fire time already passed, sending immediately"
            );
            self.dispatcher.dispatch(&recipient, &params.payload).await?;
            return Ok(ScheduleOutcome::Immediate);
        }

        let insert_reminder_entity =
            InsertReminderEntity::pending(recipient.clone(), params.payload, fire_at, now);
        let payload = insert_reminder_entity.payload.clone();

        let reminder_id = self
            .repository
            .create(insert_reminder_entity)
            .await
            .map_err(|err| {
                error!(
                    %recipient,
                    db_error = ?err,
                    "schedule_reminder: failed to persist reminder"
                );
                ScheduleError::Storage(err)
            })?;

        info!(%reminder_id, %recipient, %fire_at, "schedule_reminder: reminder scheduled");

        if let Err(err) = self
            .dispatcher
            .send_confirmation(&recipient, &payload, fire_at)
            .await
        {
            warn!(
                %reminder_id,
                %recipient,
                error = %err,
                "schedule_reminder: confirmation message failed; reminder stays scheduled"
            );
        }

        Ok(ScheduleOutcome::Scheduled {
            reminder_id,
            fire_at,
        })
    }

    pub async fn send_now(&self, recipient: &str, payload: &Value) -> Result<(), ScheduleError> {
        let recipient = validate_recipient(recipient)?;
        self.dispatcher.dispatch(&recipient, payload).await?;
        Ok(())
    }

    pub async fn send_test(&self, recipient: &str) -> Result<(), ScheduleError> {
        let recipient = validate_recipient(recipient)?;
        self.dispatcher.send_test(&recipient).await?;
        Ok(())
    }

    pub async fn find_reminder(
        &self,
        reminder_id: Uuid,
    ) -> Result<Option<ReminderEntity>, ScheduleError> {
        self.repository
            .find_by_id(reminder_id)
            .await
            .map_err(ScheduleError::Storage)
    }
}

fn validate_recipient(recipient: &str) -> Result<String, ScheduleError> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(ScheduleError::Validation(
            "recipient is required".to_string(),
        ));
    }
    Ok(recipient.to_string())
}
