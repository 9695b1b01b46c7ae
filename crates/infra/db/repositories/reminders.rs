use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::reminders::{InsertReminderEntity, ReminderEntity},
        repositories::reminders::ReminderRepository,
    },
    infra::db::postgres::{postgres_connection::PgPool, schema::reminders},
};

pub struct ReminderPostgres {
    db_pool: Arc<PgPool>,
}

impl ReminderPostgres {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }
}

// Diesel is synchronous; every query runs on the blocking threadpool so the
// poller and the HTTP handlers never stall the Tokio workers.
#[async_trait]
impl ReminderRepository for ReminderPostgres {
    async fn create(&self, insert_reminder_entity: InsertReminderEntity) -> Result<Uuid> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Uuid> {
            let mut conn = db_pool.get()?;

            let reminder_id = insert_into(reminders::table)
                .values(&insert_reminder_entity)
                .returning(reminders::id)
                .get_result::<Uuid>(&mut conn)?;

            Ok(reminder_id)
        })
        .await?
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        worker_id: String,
        claim_ttl: Duration,
    ) -> Result<Vec<ReminderEntity>> {
        let db_pool = Arc::clone(&self.db_pool);
        let claim_expired_before = now
            .checked_sub_signed(claim_ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        task::spawn_blocking(move || -> Result<Vec<ReminderEntity>> {
            let mut conn = db_pool.get()?;

            let mut claimed = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                // SKIP LOCKED lets concurrent pollers split the backlog instead
                // of blocking on (or double-sending) the same rows.
                let candidate_ids = reminders::table
                    .select(reminders::id)
                    .filter(reminders::delivered.eq(false))
                    .filter(reminders::dead_lettered_at.is_null())
                    .filter(reminders::next_attempt_at.le(now))
                    .filter(
                        reminders::claimed_at
                            .is_null()
                            .or(reminders::claimed_at.lt(claim_expired_before)),
                    )
                    .order(reminders::fire_at.asc())
                    .limit(limit)
                    .for_update()
                    .skip_locked()
                    .load::<Uuid>(conn)?;

                if candidate_ids.is_empty() {
                    return Ok(Vec::new());
                }

                update(reminders::table.filter(reminders::id.eq_any(candidate_ids)))
                    .set((
                        reminders::claimed_at.eq(Some(now)),
                        reminders::claimed_by.eq(Some(worker_id)),
                    ))
                    .returning(ReminderEntity::as_select())
                    .get_results::<ReminderEntity>(conn)
            })?;

            claimed.sort_by_key(|reminder| (reminder.fire_at, reminder.created_at));
            Ok(claimed)
        })
        .await?
    }

    async fn renew_claim(
        &self,
        reminder_id: Uuid,
        worker_id: String,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let renewed = update(
                reminders::table
                    .filter(reminders::id.eq(reminder_id))
                    .filter(reminders::claimed_by.eq(worker_id))
                    .filter(reminders::delivered.eq(false))
                    .filter(reminders::dead_lettered_at.is_null()),
            )
            .set(reminders::claimed_at.eq(Some(now)))
            .execute(&mut conn)?;

            Ok(renewed == 1)
        })
        .await?
    }

    async fn save_claimed(&self, reminder: ReminderEntity, worker_id: String) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let written = update(
                reminders::table
                    .filter(reminders::id.eq(reminder.id))
                    .filter(reminders::claimed_by.eq(worker_id)),
            )
            .set(&reminder)
            .execute(&mut conn)?;

            Ok(written == 1)
        })
        .await?
    }

    async fn find_by_id(&self, reminder_id: Uuid) -> Result<Option<ReminderEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<ReminderEntity>> {
            let mut conn = db_pool.get()?;

            let reminder = reminders::table
                .find(reminder_id)
                .select(ReminderEntity::as_select())
                .first::<ReminderEntity>(&mut conn)
                .optional()?;

            Ok(reminder)
        })
        .await?
    }
}
