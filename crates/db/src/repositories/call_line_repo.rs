//! Repository for the `call_lines` table.

use callsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::call_line::{CallLine, CreateCallLine, UpdateCallLine};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, campaign_id, external_call_id, destination_number, call_time, \
    status, interaction, duration_secs, recording_available, recording_url, transcript, \
    metadata, created_at, updated_at";

/// Provides CRUD operations for call lines.
pub struct CallLineRepo;

impl CallLineRepo {
    /// Insert a new call line, returning the created row.
    ///
    /// Absent fields take column defaults. `recording_available` follows
    /// `recording_url`.
    pub async fn create(pool: &PgPool, input: &CreateCallLine) -> Result<CallLine, sqlx::Error> {
        let query = format!(
            "INSERT INTO call_lines
                (campaign_id, external_call_id, destination_number, call_time, status,
                 interaction, duration_secs, recording_available, recording_url, transcript,
                 metadata)
             VALUES ($1, $2, $3, $4, COALESCE($5, 'pending'), COALESCE($6, 'no_interaction'),
                     COALESCE($7, 0), $8 IS NOT NULL, $8, $9, COALESCE($10, '{{}}'::jsonb))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(input.campaign_id)
            .bind(&input.external_call_id)
            .bind(&input.destination_number)
            .bind(input.call_time)
            .bind(&input.status)
            .bind(&input.interaction)
            .bind(input.duration_secs)
            .bind(&input.recording_url)
            .bind(&input.transcript)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }

    /// Find a line by its upstream call id within a campaign.
    pub async fn find_by_call_id(
        pool: &PgPool,
        campaign_id: DbId,
        external_call_id: &str,
    ) -> Result<Option<CallLine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM call_lines
             WHERE campaign_id = $1 AND external_call_id = $2"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(campaign_id)
            .bind(external_call_id)
            .fetch_optional(pool)
            .await
    }

    /// Find the line keyed by destination (one without an upstream call id).
    pub async fn find_unkeyed_by_destination(
        pool: &PgPool,
        campaign_id: DbId,
        destination_number: &str,
    ) -> Result<Option<CallLine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM call_lines
             WHERE campaign_id = $1 AND destination_number = $2 AND external_call_id IS NULL"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(campaign_id)
            .bind(destination_number)
            .fetch_optional(pool)
            .await
    }

    /// All lines to a destination within a campaign, most recent call first.
    pub async fn list_by_destination(
        pool: &PgPool,
        campaign_id: DbId,
        destination_number: &str,
    ) -> Result<Vec<CallLine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM call_lines
             WHERE campaign_id = $1 AND destination_number = $2
             ORDER BY call_time DESC NULLS LAST, id DESC"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(campaign_id)
            .bind(destination_number)
            .fetch_all(pool)
            .await
    }

    /// List every line of a campaign in insertion order.
    pub async fn list_by_campaign(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<CallLine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM call_lines WHERE campaign_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(campaign_id)
            .fetch_all(pool)
            .await
    }

    /// Overwrite present fields; merge `metadata` keys into the stored object.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateCallLine,
    ) -> Result<Option<CallLine>, sqlx::Error> {
        let query = format!(
            "UPDATE call_lines SET
                external_call_id = COALESCE($2, external_call_id),
                call_time = COALESCE($3, call_time),
                status = COALESCE($4, status),
                interaction = COALESCE($5, interaction),
                duration_secs = COALESCE($6, duration_secs),
                recording_url = COALESCE($7, recording_url),
                recording_available = COALESCE($7, recording_url) IS NOT NULL,
                transcript = COALESCE($8, transcript),
                metadata = metadata || COALESCE($9, '{{}}'::jsonb),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CallLine>(&query)
            .bind(id)
            .bind(&input.external_call_id)
            .bind(input.call_time)
            .bind(&input.status)
            .bind(&input.interaction)
            .bind(input.duration_secs)
            .bind(&input.recording_url)
            .bind(&input.transcript)
            .bind(&input.metadata)
            .fetch_optional(pool)
            .await
    }
}
