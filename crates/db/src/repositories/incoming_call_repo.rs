//! Repository for the `incoming_calls` table.

use sqlx::PgPool;

use crate::models::incoming_call::{IncomingCall, UpsertIncomingCall};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, external_call_id, from_number, to_number, status, started_at, \
    ended_at, duration_secs, recording_url, created_at, updated_at";

/// Provides upsert and lookup operations for inbound calls.
pub struct IncomingCallRepo;

impl IncomingCallRepo {
    /// Insert or refresh an inbound call keyed by `external_call_id`.
    ///
    /// Present fields overwrite; absent ones keep the stored value. The
    /// returned flag is `true` when the row was newly inserted.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertIncomingCall,
    ) -> Result<(IncomingCall, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO incoming_calls
                (external_call_id, from_number, to_number, status, started_at, ended_at,
                 duration_secs, recording_url)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 0), $8)
             ON CONFLICT ON CONSTRAINT uq_incoming_calls_external_call_id DO UPDATE SET
                status = EXCLUDED.status,
                started_at = COALESCE(EXCLUDED.started_at, incoming_calls.started_at),
                ended_at = COALESCE(EXCLUDED.ended_at, incoming_calls.ended_at),
                duration_secs = COALESCE($7, incoming_calls.duration_secs),
                recording_url = COALESCE(EXCLUDED.recording_url, incoming_calls.recording_url),
                updated_at = NOW()
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        );
        let row: IncomingCallRow = sqlx::query_as(&query)
            .bind(&input.external_call_id)
            .bind(&input.from_number)
            .bind(&input.to_number)
            .bind(&input.status)
            .bind(input.started_at)
            .bind(input.ended_at)
            .bind(input.duration_secs)
            .bind(&input.recording_url)
            .fetch_one(pool)
            .await?;
        Ok((row.call, row.inserted))
    }

    /// Inbound calls to a provisioned number, most recent first.
    pub async fn list_by_number(
        pool: &PgPool,
        to_number: &str,
        limit: i64,
    ) -> Result<Vec<IncomingCall>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM incoming_calls
             WHERE to_number = $1
             ORDER BY started_at DESC NULLS LAST
             LIMIT $2"
        );
        sqlx::query_as::<_, IncomingCall>(&query)
            .bind(to_number)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

#[derive(sqlx::FromRow)]
struct IncomingCallRow {
    #[sqlx(flatten)]
    call: IncomingCall,
    inserted: bool,
}
