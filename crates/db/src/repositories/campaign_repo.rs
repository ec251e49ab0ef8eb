//! Repository for the `campaigns` table.

use callsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::campaign::{Campaign, CreateCampaign, UpdateCampaign};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, external_id, name, status, origin_number, agent_name, \
    contact_numbers, total_calls, calls_made, picked_up_calls, completed_calls, failed_calls, \
    busy_calls, no_answer_calls, transfer_calls, low_interaction_calls, cost, scheduled_at, \
    cached_at, sync_status, created_at, updated_at";

/// Provides CRUD operations for campaigns.
pub struct CampaignRepo;

impl CampaignRepo {
    /// Insert a new campaign, returning the created row.
    ///
    /// `cached_at` is stamped on insert. Fails with a unique violation
    /// (SQLSTATE 23505) if `external_id` is already taken.
    pub async fn create(pool: &PgPool, input: &CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let query = format!(
            "INSERT INTO campaigns
                (user_id, external_id, name, status, origin_number, agent_name, contact_numbers,
                 total_calls, calls_made, picked_up_calls, completed_calls, failed_calls,
                 busy_calls, no_answer_calls, transfer_calls, low_interaction_calls, cost,
                 scheduled_at, sync_status, cached_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7,
                     COALESCE($8, 0), COALESCE($9, 0), COALESCE($10, 0), COALESCE($11, 0),
                     COALESCE($12, 0), COALESCE($13, 0), COALESCE($14, 0), COALESCE($15, 0),
                     COALESCE($16, 0), COALESCE($17, 0), $18, $19, NOW())
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(input.user_id)
            .bind(&input.external_id)
            .bind(&input.name)
            .bind(&input.status)
            .bind(&input.origin_number)
            .bind(&input.agent_name)
            .bind(&input.contact_numbers)
            .bind(input.total_calls)
            .bind(input.calls_made)
            .bind(input.picked_up_calls)
            .bind(input.completed_calls)
            .bind(input.failed_calls)
            .bind(input.busy_calls)
            .bind(input.no_answer_calls)
            .bind(input.transfer_calls)
            .bind(input.low_interaction_calls)
            .bind(input.cost)
            .bind(input.scheduled_at)
            .bind(&input.sync_status)
            .fetch_one(pool)
            .await
    }

    /// Find a campaign by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE id = $1");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a campaign by its upstream identifier.
    pub async fn find_by_external_id(
        pool: &PgPool,
        external_id: &str,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE external_id = $1");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's campaigns, newest first. `None` lists every user's.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: Option<DbId>,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaigns
             WHERE ($1::BIGINT IS NULL OR user_id = $1)
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Field-merge a campaign. Only non-`None` fields in `input` are applied;
    /// `cached_at` is always refreshed.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE campaigns SET
                name = COALESCE($2, name),
                status = COALESCE($3, status),
                origin_number = COALESCE($4, origin_number),
                agent_name = COALESCE($5, agent_name),
                contact_numbers = COALESCE($6, contact_numbers),
                total_calls = COALESCE($7, total_calls),
                calls_made = COALESCE($8, calls_made),
                picked_up_calls = COALESCE($9, picked_up_calls),
                completed_calls = COALESCE($10, completed_calls),
                failed_calls = COALESCE($11, failed_calls),
                busy_calls = COALESCE($12, busy_calls),
                no_answer_calls = COALESCE($13, no_answer_calls),
                transfer_calls = COALESCE($14, transfer_calls),
                low_interaction_calls = COALESCE($15, low_interaction_calls),
                cost = COALESCE($16, cost),
                scheduled_at = COALESCE($17, scheduled_at),
                sync_status = COALESCE($18, sync_status),
                cached_at = NOW(),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.status)
            .bind(&input.origin_number)
            .bind(&input.agent_name)
            .bind(&input.contact_numbers)
            .bind(input.total_calls)
            .bind(input.calls_made)
            .bind(input.picked_up_calls)
            .bind(input.completed_calls)
            .bind(input.failed_calls)
            .bind(input.busy_calls)
            .bind(input.no_answer_calls)
            .bind(input.transfer_calls)
            .bind(input.low_interaction_calls)
            .bind(input.cost)
            .bind(input.scheduled_at)
            .bind(&input.sync_status)
            .fetch_optional(pool)
            .await
    }

    /// Refresh only the cache-freshness timestamp. `updated_at` is left alone.
    ///
    /// Returns `true` if a row was touched.
    pub async fn touch_cached_at(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE campaigns SET cached_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the contact-number set.
    pub async fn set_contact_numbers(
        pool: &PgPool,
        id: DbId,
        numbers: &[String],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE campaigns SET contact_numbers = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(numbers)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the lifecycle status (used by local campaign actions).
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: &str,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE campaigns SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }
}
