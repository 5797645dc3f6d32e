use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::pool::{PoolEntry, PoolEntryId, PoolStatusChange};
use leadrobin_core::domain::user::UserId;

use super::{PoolRepository, RepositoryError};
use crate::DbPool;

const POOL_COLUMNS: &str = "id,
                seller_id,
                facility,
                enabled,
                sort_order,
                created_at,
                updated_at";

pub struct SqlPoolRepository {
    pool: DbPool,
}

impl SqlPoolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PoolRepository for SqlPoolRepository {
    async fn find_entry(&self, id: &PoolEntryId) -> Result<Option<PoolEntry>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {POOL_COLUMNS} FROM seller_pool WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(entry_from_row).transpose()
    }

    async fn find_membership(
        &self,
        seller: &UserId,
        facility: Facility,
    ) -> Result<Option<PoolEntry>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {POOL_COLUMNS} FROM seller_pool WHERE seller_id = ? AND facility = ?"
        ))
        .bind(&seller.0)
        .bind(facility.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn list_for_facility(
        &self,
        facility: Facility,
    ) -> Result<Vec<PoolEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {POOL_COLUMNS} FROM seller_pool
             WHERE facility = ?
             ORDER BY sort_order ASC, seller_id ASC"
        ))
        .bind(facility.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_for_seller(&self, seller: &UserId) -> Result<Vec<PoolEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {POOL_COLUMNS} FROM seller_pool
             WHERE seller_id = ?
             ORDER BY facility ASC"
        ))
        .bind(&seller.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn save(&self, entry: &PoolEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO seller_pool (
                id,
                seller_id,
                facility,
                enabled,
                sort_order,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                sort_order = excluded.sort_order,
                updated_at = excluded.updated_at",
        )
        .bind(&entry.id.0)
        .bind(&entry.seller_id.0)
        .bind(entry.facility.as_str())
        .bind(entry.enabled)
        .bind(entry.sort_order)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_enabled(
        &self,
        id: &PoolEntryId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE seller_pool SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(enabled)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_sort_order(
        &self,
        id: &PoolEntryId,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE seller_pool SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(sort_order)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn max_sort_order(&self, facility: Facility) -> Result<Option<i64>, RepositoryError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sort_order) FROM seller_pool WHERE facility = ?")
                .bind(facility.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(max)
    }

    async fn append_status_change(
        &self,
        change: &PoolStatusChange,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pool_status_history (
                id,
                pool_entry_id,
                changed_by,
                enabled,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&change.id)
        .bind(&change.pool_entry_id.0)
        .bind(&change.changed_by.0)
        .bind(change.enabled)
        .bind(change.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_status_history(
        &self,
        id: &PoolEntryId,
    ) -> Result<Vec<PoolStatusChange>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, pool_entry_id, changed_by, enabled, occurred_at
             FROM pool_status_history
             WHERE pool_entry_id = ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(change_from_row).collect()
    }
}

fn entry_from_row(row: SqliteRow) -> Result<PoolEntry, RepositoryError> {
    let facility_raw = row.try_get::<String, _>("facility")?;
    let facility = Facility::parse(&facility_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown facility `{facility_raw}`")))?;

    Ok(PoolEntry {
        id: PoolEntryId(row.try_get("id")?),
        seller_id: UserId(row.try_get("seller_id")?),
        facility,
        enabled: row.try_get("enabled")?,
        sort_order: row.try_get("sort_order")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn change_from_row(row: SqliteRow) -> Result<PoolStatusChange, RepositoryError> {
    Ok(PoolStatusChange {
        id: row.try_get("id")?,
        pool_entry_id: PoolEntryId(row.try_get("pool_entry_id")?),
        changed_by: UserId(row.try_get("changed_by")?),
        enabled: row.try_get("enabled")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
