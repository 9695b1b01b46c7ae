use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    entities::reminders::{InsertReminderEntity, ReminderEntity},
    repositories::reminders::ReminderRepository,
};

/// Process-local reminder store. Used when no database is configured; its
/// contents are lost on restart and it cannot be shared between processes.
#[derive(Default)]
pub struct InMemoryReminderRepository {
    store: RwLock<HashMap<Uuid, ReminderEntity>>,
}

impl InMemoryReminderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ReminderEntity> {
        let store = self.store.read().await;
        let mut reminders: Vec<ReminderEntity> = store.values().cloned().collect();
        reminders.sort_by_key(|reminder| (reminder.fire_at, reminder.created_at));
        reminders
    }
}

#[async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn create(&self, insert_reminder_entity: InsertReminderEntity) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let reminder = ReminderEntity {
            id,
            recipient: insert_reminder_entity.recipient,
            payload: insert_reminder_entity.payload,
            fire_at: insert_reminder_entity.fire_at,
            next_attempt_at: insert_reminder_entity.next_attempt_at,
            delivered: insert_reminder_entity.delivered,
            delivered_at: None,
            attempt_count: insert_reminder_entity.attempt_count,
            last_error: None,
            claimed_at: None,
            claimed_by: None,
            dead_lettered_at: None,
            created_at: insert_reminder_entity.created_at,
        };

        self.store.write().await.insert(id, reminder);
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        worker_id: String,
        claim_ttl: Duration,
    ) -> Result<Vec<ReminderEntity>> {
        if limit <= 0 {
            bail!("claim limit must be positive, got {limit}");
        }

        let claim_expired_before = now
            .checked_sub_signed(claim_ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut store = self.store.write().await;

        let mut candidates: Vec<&mut ReminderEntity> = store
            .values_mut()
            .filter(|reminder| reminder.is_due(now))
            .filter(|reminder| {
                reminder
                    .claimed_at
                    .is_none_or(|claimed_at| claimed_at < claim_expired_before)
            })
            .collect();

        candidates.sort_by_key(|reminder| (reminder.fire_at, reminder.created_at));

        let claimed = candidates
            .into_iter()
            .take(limit as usize)
            .map(|reminder| {
                reminder.claimed_at = Some(now);
                reminder.claimed_by = Some(worker_id.clone());
                reminder.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn renew_claim(
        &self,
        reminder_id: Uuid,
        worker_id: String,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut store = self.store.write().await;
        match store.get_mut(&reminder_id) {
            Some(reminder)
                if reminder.claimed_by.as_deref() == Some(worker_id.as_str())
                    && !reminder.delivered
                    && reminder.dead_lettered_at.is_none() =>
            {
                reminder.claimed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_claimed(&self, reminder: ReminderEntity, worker_id: String) -> Result<bool> {
        let mut store = self.store.write().await;
        match store.get_mut(&reminder.id) {
            Some(current) if current.claimed_by.as_deref() == Some(worker_id.as_str()) => {
                *current = reminder;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, reminder_id: Uuid) -> Result<Option<ReminderEntity>> {
        Ok(self.store.read().await.get(&reminder_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_at(fire_at: DateTime<Utc>) -> InsertReminderEntity {
        InsertReminderEntity::pending(
            "a@x.com".to_string(),
            json!({ "name": "Round" }),
            fire_at,
            fire_at - Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn claims_only_due_records_in_fire_at_order() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();

        let later = repository.create(pending_at(now - Duration::minutes(1))).await.unwrap();
        let earlier = repository.create(pending_at(now - Duration::minutes(5))).await.unwrap();
        repository.create(pending_at(now + Duration::minutes(5))).await.unwrap();

        let claimed = repository
            .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
            .await
            .unwrap();

        let ids: Vec<Uuid> = claimed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![earlier, later]);
        assert!(claimed.iter().all(|r| r.claimed_by.as_deref() == Some("w1")));
    }

    #[tokio::test]
    async fn claimed_records_are_not_handed_out_twice_until_the_claim_expires() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();
        repository.create(pending_at(now - Duration::minutes(1))).await.unwrap();

        let first = repository
            .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
            .await
            .unwrap();
        let second = repository
            .claim_due(now, 50, "w2".to_string(), Duration::minutes(5))
            .await
            .unwrap();
        let after_expiry = repository
            .claim_due(now + Duration::minutes(6), 50, "w2".to_string(), Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(after_expiry.len(), 1);
        assert_eq!(after_expiry[0].claimed_by.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn renewal_fails_once_another_worker_took_the_claim() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();
        let id = repository.create(pending_at(now - Duration::minutes(1))).await.unwrap();

        repository
            .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(
            repository
                .renew_claim(id, "w1".to_string(), now + Duration::minutes(1))
                .await
                .unwrap()
        );

        // Renewed at +1min, so the lease holds until +6min.
        let too_early = repository
            .claim_due(now + Duration::minutes(5), 50, "w2".to_string(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(too_early.is_empty());

        repository
            .claim_due(now + Duration::minutes(7), 50, "w2".to_string(), Duration::minutes(5))
            .await
            .unwrap();
        assert!(
            !repository
                .renew_claim(id, "w1".to_string(), now + Duration::minutes(7))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn save_claimed_does_not_overwrite_a_taken_over_reminder() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();
        let id = repository.create(pending_at(now - Duration::minutes(1))).await.unwrap();

        let mut stale = repository
            .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
            .await
            .unwrap()
            .remove(0);
        repository
            .claim_due(now + Duration::minutes(6), 50, "w2".to_string(), Duration::minutes(5))
            .await
            .unwrap();

        stale.attempt_count = 1;
        stale.claimed_by = None;
        let written = repository
            .save_claimed(stale, "w1".to_string())
            .await
            .unwrap();

        let current = repository.find_by_id(id).await.unwrap().unwrap();
        assert!(!written);
        assert_eq!(current.claimed_by.as_deref(), Some("w2"));
        assert_eq!(current.attempt_count, 0);
    }

    #[tokio::test]
    async fn huge_claim_ttl_does_not_overflow() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();
        repository.create(pending_at(now - Duration::minutes(1))).await.unwrap();

        let claimed = repository
            .claim_due(now, 50, "w1".to_string(), Duration::MAX)
            .await
            .unwrap();

        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn save_claimed_overwrites_the_whole_record() {
        let repository = InMemoryReminderRepository::new();
        let now = Utc::now();
        let id = repository.create(pending_at(now)).await.unwrap();
        repository
            .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
            .await
            .unwrap();

        let mut reminder = repository.find_by_id(id).await.unwrap().unwrap();
        reminder.delivered = true;
        reminder.delivered_at = Some(now);
        reminder.attempt_count = 1;
        reminder.claimed_at = None;
        reminder.claimed_by = None;
        assert!(
            repository
                .save_claimed(reminder.clone(), "w1".to_string())
                .await
                .unwrap()
        );

        assert_eq!(repository.find_by_id(id).await.unwrap(), Some(reminder));
        assert!(
            repository
                .claim_due(now, 50, "w1".to_string(), Duration::minutes(5))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
