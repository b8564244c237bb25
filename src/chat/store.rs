//! Conversations between two identities, addressed by the unordered pair.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::unix_now;

use super::ChatError;

/// Normalized `(min, max)` form of a participant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    lo: Uuid,
    hi: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b { Self { lo: a, hi: b } } else { Self { lo: b, hi: a } }
    }

    pub fn lo(&self) -> Uuid {
        self.lo
    }

    pub fn hi(&self) -> Uuid {
        self.hi
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.lo, self.hi]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Message {
    pub body: String,
    pub sender_id: Uuid,
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub body: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sent_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    pub participants: Vec<Participant>,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    db_pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    async fn conversation_id(&self, pair: PairKey) -> Result<Option<Uuid>, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM conversations WHERE participant_lo=? AND participant_hi=?")
                .bind(pair.lo)
                .bind(pair.hi)
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    /// The conversation for `{a, b}` in either order, or `None`. Never creates.
    pub async fn find(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
        let pair = PairKey::new(a, b);
        let Some(id) = self.conversation_id(pair).await? else {
            return Ok(None);
        };

        let messages = sqlx::query_as("SELECT body,sender_id,sent_at FROM messages WHERE conversation_id=? ORDER BY seq")
            .bind(id)
            .fetch_all(&self.db_pool)
            .await?;

        Ok(Some(Conversation { id, participants: pair.participants(), messages }))
    }

    pub async fn exists(&self, a: Uuid, b: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.conversation_id(PairKey::new(a, b)).await?.is_some())
    }

    /// Upserts the conversation row. Returns its id and whether this call created it.
    pub async fn create(&self, a: Uuid, b: Uuid) -> Result<(Uuid, bool), sqlx::Error> {
        let pair = PairKey::new(a, b);
        let inserted = sqlx::query(
            "INSERT INTO conversations (id,participant_lo,participant_hi,created_at) VALUES (?,?,?,?) \
             ON CONFLICT (participant_lo, participant_hi) DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(pair.lo)
        .bind(pair.hi)
        .bind(unix_now())
        .execute(&self.db_pool)
        .await?
        .rows_affected()
            == 1;

        let id = self.conversation_id(pair).await?.ok_or(sqlx::Error::RowNotFound)?;
        if inserted {
            tracing::debug!(conversation_id = %id, "conversation created");
        }
        Ok((id, inserted))
    }

    /// Appends in a single statement so the lookup and the insert cannot interleave.
    pub async fn append_message(&self, a: Uuid, b: Uuid, message: &Message) -> Result<(), ChatError> {
        let pair = PairKey::new(a, b);
        let result = sqlx::query(
            "INSERT INTO messages (conversation_id,sender_id,body,sent_at) \
             SELECT id,?,?,? FROM conversations WHERE participant_lo=? AND participant_hi=?",
        )
        .bind(message.sender_id)
        .bind(&message.body)
        .bind(message.sent_at)
        .bind(pair.lo)
        .bind(pair.hi)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::ConversationNotFound);
        }
        Ok(())
    }

    /// Deletes the conversation and its messages. False if there was none.
    pub async fn remove(&self, a: Uuid, b: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = self.db_pool.begin().await?;
        let removed = remove_in(&mut tx, PairKey::new(a, b)).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Ordered messages with display names. Empty if the pair never talked.
    pub async fn fetch_history(&self, a: Uuid, b: Uuid) -> Result<History, sqlx::Error> {
        let pair = PairKey::new(a, b);
        let Some(id) = self.conversation_id(pair).await? else {
            return Ok(History::default());
        };

        let participants = sqlx::query_as("SELECT id,name FROM users WHERE id IN (?,?) ORDER BY id")
            .bind(pair.lo)
            .bind(pair.hi)
            .fetch_all(&self.db_pool)
            .await?;

        let messages = sqlx::query_as(
            "SELECT m.body, m.sender_id, COALESCE(u.name, 'Unknown user') AS sender_name, m.sent_at \
             FROM messages m LEFT JOIN users u ON u.id = m.sender_id \
             WHERE m.conversation_id=? ORDER BY m.seq",
        )
        .bind(id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(History { participants, messages })
    }
}

/// Removal inside a caller-owned transaction.
pub(crate) async fn remove_in(conn: &mut SqliteConnection, pair: PairKey) -> Result<bool, sqlx::Error> {
    sqlx::query(
        "DELETE FROM messages WHERE conversation_id IN \
         (SELECT id FROM conversations WHERE participant_lo=? AND participant_hi=?)",
    )
    .bind(pair.lo)
    .bind(pair.hi)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM conversations WHERE participant_lo=? AND participant_hi=?")
        .bind(pair.lo)
        .bind(pair.hi)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
