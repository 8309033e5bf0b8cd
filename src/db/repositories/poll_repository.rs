use crate::db::PollStore;
use crate::db::connection::DbPool;
use crate::db::models::Poll;
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Postgres-backed poll documents. Options and tallies live in JSONB columns
/// so a poll is read and written as one row.
#[derive(Clone)]
pub struct PgPollStore {
    pool: DbPool,
}

impl PgPollStore {
    pub fn new(pool: DbPool) -> Self {
        PgPollStore { pool }
    }
}

fn poll_from_row(row: PgRow) -> Result<Poll, sqlx::Error> {
    let options: Json<Vec<String>> = row.try_get("options")?;
    let votes: Json<BTreeMap<String, u64>> = row.try_get("votes")?;

    Ok(Poll {
        id: row.try_get("id")?,
        question: row.try_get("question")?,
        options: options.0,
        votes: votes.0,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn create(&self, poll: &Poll) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO polls (id, question, options, votes, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(poll.id)
        .bind(&poll.question)
        .bind(Json(&poll.options))
        .bind(Json(&poll.votes))
        .bind(poll.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError> {
        let row = sqlx::query(
            "SELECT id, question, options, votes, created_at FROM polls WHERE id = $1",
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(poll_from_row).transpose()?)
    }

    async fn list(&self) -> Result<Vec<Poll>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, question, options, votes, created_at FROM polls ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let polls = rows
            .into_iter()
            .map(poll_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(polls)
    }

    async fn set(&self, poll: &Poll) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE polls SET question = $2, options = $3, votes = $4 WHERE id = $1")
                .bind(poll.id)
                .bind(&poll.question)
                .bind(Json(&poll.options))
                .bind(Json(&poll.votes))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(poll.id));
        }

        Ok(())
    }

    async fn delete(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
