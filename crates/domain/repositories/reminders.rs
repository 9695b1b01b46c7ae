use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::reminders::{InsertReminderEntity, ReminderEntity};

#[async_trait]
#[automock]
pub trait ReminderRepository {
    async fn create(&self, insert_reminder_entity: InsertReminderEntity) -> Result<Uuid>;

    /// Atomically selects up to `limit` due reminders, oldest `fire_at` first,
    /// and marks them claimed by `worker_id`. Claims older than `claim_ttl` are
    /// treated as abandoned and may be taken over.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        worker_id: String,
        claim_ttl: Duration,
    ) -> Result<Vec<ReminderEntity>>;

    /// Re-stamps `claimed_at` while `worker_id` still holds the claim and the
    /// reminder is still undelivered. `false` means the claim was lost.
    async fn renew_claim(
        &self,
        reminder_id: Uuid,
        worker_id: String,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Writes the whole record, but only while `worker_id` holds the claim.
    /// `false` means another worker has taken the reminder over and nothing
    /// was written.
    async fn save_claimed(&self, reminder: ReminderEntity, worker_id: String) -> Result<bool>;

    async fn find_by_id(&self, reminder_id: Uuid) -> Result<Option<ReminderEntity>>;
}
