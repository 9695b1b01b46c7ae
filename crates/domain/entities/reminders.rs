use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::reminder_statuses::ReminderStatus,
    infra::db::postgres::schema::reminders,
};

/// A persisted reminder and its delivery state.
///
/// `fire_at` never changes after creation. Retries are steered through
/// `next_attempt_at`, which starts equal to `fire_at`.
#[derive(
    Debug, Clone, PartialEq, Serialize, Identifiable, Selectable, Queryable, Insertable, AsChangeset,
)]
#[diesel(table_name = reminders)]
#[diesel(treat_none_as_null = true)]
pub struct ReminderEntity {
    pub id: Uuid,
    pub recipient: String,
    pub payload: Value,
    pub fire_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReminderEntity {
    pub fn status(&self) -> ReminderStatus {
        if self.delivered {
            ReminderStatus::Delivered
        } else if self.dead_lettered_at.is_some() {
            ReminderStatus::DeadLettered
        } else {
            ReminderStatus::Pending
        }
    }

    /// Whether the poller may pick this record up at `now`, ignoring claims.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.delivered && self.dead_lettered_at.is_none() && self.next_attempt_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = reminders)]
pub struct InsertReminderEntity {
    pub recipient: String,
    pub payload: Value,
    pub fire_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered: bool,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
}

impl InsertReminderEntity {
    pub fn pending(
        recipient: String,
        payload: Value,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            recipient,
            payload,
            fire_at,
            next_attempt_at: fire_at,
            delivered: false,
            attempt_count: 0,
            created_at: now,
        }
    }
}
