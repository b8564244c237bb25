//! Durable deferred chat deletion.
//!
//! A scheduled deletion is a row in `chat_deletions`; the worker polls for due
//! rows, so pending deletions survive restarts and can be cancelled. A job is
//! claimed by deleting its row: only the caller that removed the row (by its
//! token) goes on to delete the conversation, which makes execution idempotent.
//! Participants are only notified when a conversation was actually removed.

use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::unix_now;

use super::{
    protocol::{ServerEvent, CHAT_DELETED},
    registry::Registry,
    store::{remove_in, PairKey},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ScheduledDeletion {
    pub token: Uuid,
    pub participant_lo: Uuid,
    pub participant_hi: Uuid,
    pub requested_by: Uuid,
    pub due_at: i64,
}

impl ScheduledDeletion {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.participant_lo, self.participant_hi)
    }
}

#[derive(Debug, Clone)]
pub struct DeletionScheduler {
    db_pool: SqlitePool,
    registry: Registry,
    delay: Duration,
}

impl DeletionScheduler {
    pub fn new(db_pool: SqlitePool, registry: Registry, delay: Duration) -> Self {
        Self { db_pool, registry, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// One pending job per pair: scheduling again returns the job already armed.
    pub async fn schedule(&self, requester: Uuid, counterpart: Uuid, now: i64) -> Result<ScheduledDeletion, sqlx::Error> {
        let pair = PairKey::new(requester, counterpart);
        let delay = i64::try_from(self.delay.as_secs()).unwrap_or(i64::MAX);
        let due_at = now.saturating_add(delay);

        let armed = sqlx::query(
            "INSERT INTO chat_deletions (token,participant_lo,participant_hi,requested_by,due_at) VALUES (?,?,?,?,?) \
             ON CONFLICT (participant_lo, participant_hi) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(pair.lo())
        .bind(pair.hi())
        .bind(requester)
        .bind(due_at)
        .execute(&self.db_pool)
        .await?
        .rows_affected()
            == 1;

        let job = self.pending(requester, counterpart).await?.ok_or(sqlx::Error::RowNotFound)?;
        if armed {
            tracing::info!(requested_by = %requester, due_at = job.due_at, "chat deletion scheduled");
        }
        Ok(job)
    }

    pub async fn pending(&self, a: Uuid, b: Uuid) -> Result<Option<ScheduledDeletion>, sqlx::Error> {
        let pair = PairKey::new(a, b);
        sqlx::query_as(
            "SELECT token,participant_lo,participant_hi,requested_by,due_at FROM chat_deletions \
             WHERE participant_lo=? AND participant_hi=?",
        )
        .bind(pair.lo())
        .bind(pair.hi())
        .fetch_optional(&self.db_pool)
        .await
    }

    /// Cancels the pending job for the pair. False if nothing was pending.
    pub async fn cancel(&self, a: Uuid, b: Uuid) -> Result<bool, sqlx::Error> {
        let pair = PairKey::new(a, b);
        let result = sqlx::query("DELETE FROM chat_deletions WHERE participant_lo=? AND participant_hi=?")
            .bind(pair.lo())
            .bind(pair.hi())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Executes every job due at `now` and returns the pairs whose conversation
    /// was removed. A due job with nothing left to delete is consumed silently.
    pub async fn fire_due(&self, now: i64) -> Result<Vec<PairKey>, sqlx::Error> {
        let due: Vec<ScheduledDeletion> = sqlx::query_as(
            "SELECT token,participant_lo,participant_hi,requested_by,due_at FROM chat_deletions \
             WHERE due_at <= ? ORDER BY due_at",
        )
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?;

        let mut fired = Vec::with_capacity(due.len());
        for job in due {
            match self.execute(&job).await {
                Ok(true) => {
                    self.notify(job.pair());
                    fired.push(job.pair());
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(token = %job.token, error = %err, "chat deletion failed"),
            }
        }
        Ok(fired)
    }

    async fn execute(&self, job: &ScheduledDeletion) -> Result<bool, sqlx::Error> {
        let mut tx = self.db_pool.begin().await?;
        let claimed = sqlx::query("DELETE FROM chat_deletions WHERE token=?")
            .bind(job.token)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
        if !claimed {
            return Ok(false);
        }

        let removed = remove_in(&mut tx, job.pair()).await?;
        tx.commit().await?;

        tracing::info!(token = %job.token, removed, "scheduled chat deletion executed");
        Ok(removed)
    }

    fn notify(&self, pair: PairKey) {
        for participant in pair.participants() {
            if let Some(handle) = self.registry.resolve(participant) {
                handle.send(ServerEvent::ChatDeleted { message: CHAT_DELETED.to_owned() });
            }
        }
    }

    pub async fn run(self, poll: Duration) {
        let mut interval = tokio::time::interval(poll);
        loop {
            interval.tick().await;
            if let Err(err) = self.fire_due(unix_now()).await {
                tracing::warn!(error = %err, "polling scheduled deletions failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        chat::{registry::ConnectionHandle, store::{ConversationStore, Message}},
        db::memory_pool,
    };

    const DAY: i64 = 24 * 60 * 60;

    async fn setup() -> (DeletionScheduler, ConversationStore, Registry, Uuid, Uuid) {
        let db_pool = memory_pool().await.unwrap();
        let registry = Registry::new();
        let scheduler = DeletionScheduler::new(db_pool.clone(), registry.clone(), Duration::from_secs(DAY as u64));
        let store = ConversationStore::new(db_pool);

        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        store.create(a, b).await.unwrap();
        store
            .append_message(a, b, &Message { body: "hi".into(), sender_id: a, sent_at: 0 })
            .await
            .unwrap();
        (scheduler, store, registry, a, b)
    }

    #[tokio::test]
    async fn deletion_fires_after_the_delay() {
        let (scheduler, store, registry, a, b) = setup().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(b, ConnectionHandle::new(tx));

        let t = 1_000_000;
        let job = scheduler.schedule(a, b, t).await.unwrap();
        assert_eq!(job.due_at, t + DAY);

        assert!(scheduler.fire_due(t + DAY - 60).await.unwrap().is_empty());
        assert!(store.find(a, b).await.unwrap().is_some());
        assert!(rx.try_recv().is_err());

        let fired = scheduler.fire_due(t + DAY).await.unwrap();
        assert_eq!(fired, vec![PairKey::new(a, b)]);
        assert!(store.find(a, b).await.unwrap().is_none());
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::ChatDeleted { message: CHAT_DELETED.into() });

        assert!(scheduler.fire_due(t + 2 * DAY).await.unwrap().is_empty());
        assert!(scheduler.pending(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rescheduling_keeps_the_first_due_time() {
        let (scheduler, _store, _registry, a, b) = setup().await;
        let first = scheduler.schedule(a, b, 100).await.unwrap();
        let second = scheduler.schedule(b, a, 500).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.requested_by, a);
    }

    #[tokio::test]
    async fn cancelled_deletion_never_fires() {
        let (scheduler, store, _registry, a, b) = setup().await;
        scheduler.schedule(a, b, 0).await.unwrap();

        assert!(scheduler.cancel(b, a).await.unwrap());
        assert!(!scheduler.cancel(a, b).await.unwrap());
        assert!(scheduler.fire_due(2 * DAY).await.unwrap().is_empty());
        assert!(store.find(a, b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn job_without_a_conversation_does_not_notify() {
        let (scheduler, store, registry, a, b) = setup().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(a, ConnectionHandle::new(tx));

        scheduler.schedule(a, b, 0).await.unwrap();
        store.remove(a, b).await.unwrap();

        assert!(scheduler.fire_due(DAY).await.unwrap().is_empty());
        assert!(scheduler.pending(a, b).await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn oversized_delay_does_not_wrap() {
        let (scheduler, _store, registry, a, b) = setup().await;
        let forever = DeletionScheduler::new(scheduler.db_pool.clone(), registry, Duration::from_secs(u64::MAX));

        let job = forever.schedule(a, b, 1_000).await.unwrap();
        assert_eq!(job.due_at, i64::MAX);
        assert!(forever.fire_due(unix_now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_jobs_survive_a_new_scheduler() {
        let (scheduler, store, _registry, a, b) = setup().await;
        scheduler.schedule(a, b, 0).await.unwrap();

        let restarted = DeletionScheduler::new(scheduler.db_pool.clone(), Registry::new(), scheduler.delay());
        assert_eq!(restarted.fire_due(DAY).await.unwrap().len(), 1);
        assert!(store.find(a, b).await.unwrap().is_none());
    }
}
