//! Repository for the `campaign_activity_logs` table.

use callsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::activity_log::{ActivityLog, CreateActivityLog};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, campaign_id, action, details, created_at";

/// Append-only access to campaign activity entries.
pub struct ActivityLogRepo;

impl ActivityLogRepo {
    /// Append an activity entry, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateActivityLog,
    ) -> Result<ActivityLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO campaign_activity_logs (user_id, campaign_id, action, details)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ActivityLog>(&query)
            .bind(input.user_id)
            .bind(input.campaign_id)
            .bind(&input.action)
            .bind(&input.details)
            .fetch_one(pool)
            .await
    }

    /// Entries for one campaign, oldest first.
    pub async fn list_for_campaign(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<ActivityLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaign_activity_logs
             WHERE campaign_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ActivityLog>(&query)
            .bind(campaign_id)
            .fetch_all(pool)
            .await
    }
}
