use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::lead::{AcceptStatus, Lead, LeadId, LeadSource, LeadStatus};
use leadrobin_core::domain::user::UserId;

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS: &str = "id,
                facility,
                status,
                accept_status,
                assigned_to,
                assigned_at,
                source,
                contact_name,
                contact_email,
                contact_phone,
                subject,
                message,
                listing_id,
                created_at,
                updated_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(lead_from_row).transpose()
    }

    async fn find_by_listing(&self, listing_id: &str) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE listing_id = ? LIMIT 1"
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    async fn create(&self, lead: &Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO leads (
                id,
                facility,
                status,
                accept_status,
                assigned_to,
                assigned_at,
                source,
                contact_name,
                contact_email,
                contact_phone,
                subject,
                message,
                listing_id,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id.0)
        .bind(lead.facility.map(|facility| facility.as_str()))
        .bind(lead.status.as_str())
        .bind(lead.accept_status.map(|accept| accept.as_str()))
        .bind(lead.assigned_to.as_ref().map(|seller| seller.0.as_str()))
        .bind(lead.assigned_at.map(|value| value.to_rfc3339()))
        .bind(lead.source.as_str())
        .bind(&lead.contact_name)
        .bind(lead.contact_email.as_deref())
        .bind(lead.contact_phone.as_deref())
        .bind(&lead.subject)
        .bind(lead.message.as_deref())
        .bind(lead.listing_id.as_deref())
        .bind(lead.created_at.to_rfc3339())
        .bind(lead.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                RepositoryError::Conflict(format!(
                    "lead `{}` collides with an existing row",
                    lead.id
                ))
            }
            _ => RepositoryError::Database(error),
        })?;

        Ok(())
    }

    async fn list_by_status(&self, status: LeadStatus) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE status = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(lead_from_row).collect()
    }

    async fn latest_assignee(
        &self,
        facility: Facility,
        sellers: &[UserId],
    ) -> Result<Option<UserId>, RepositoryError> {
        if sellers.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; sellers.len()].join(", ");
        let sql = format!(
            "SELECT assigned_to FROM leads
             WHERE facility = ? AND assigned_at IS NOT NULL AND assigned_to IN ({placeholders})
             ORDER BY assigned_at DESC, updated_at DESC, id DESC
             LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(facility.as_str());
        for seller in sellers {
            query = query.bind(&seller.0);
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|row| UserId(row.get("assigned_to"))))
    }

    async fn list_pending_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE status = 'pending_acceptance'
               AND accept_status = 'pending'
               AND assigned_to IS NOT NULL
               AND assigned_at IS NOT NULL
               AND assigned_at <= ?
             ORDER BY assigned_at ASC, id ASC"
        ))
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(lead_from_row).collect()
    }

    async fn commit_assignment(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                status = 'pending_acceptance',
                accept_status = 'pending',
                assigned_to = ?2,
                assigned_at = ?3,
                updated_at = ?3
             WHERE id = ?1
               AND assigned_to IS NULL
               AND status IN ('new', 'pending_acceptance')",
        )
        .bind(&id.0)
        .bind(&seller.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_reassignment(
        &self,
        id: &LeadId,
        from: &UserId,
        to: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                accept_status = 'pending',
                assigned_to = ?3,
                assigned_at = ?4,
                updated_at = ?4
             WHERE id = ?1
               AND status = 'pending_acceptance'
               AND assigned_to = ?2",
        )
        .bind(&id.0)
        .bind(&from.0)
        .bind(&to.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_acceptance(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                status = 'contacted',
                accept_status = 'accepted',
                updated_at = ?3
             WHERE id = ?1
               AND status = 'pending_acceptance'
               AND assigned_to = ?2
               AND accept_status = 'pending'",
        )
        .bind(&id.0)
        .bind(&seller.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_decline(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                accept_status = 'declined',
                updated_at = ?3
             WHERE id = ?1
               AND status = 'pending_acceptance'
               AND assigned_to = ?2
               AND accept_status = 'pending'",
        )
        .bind(&id.0)
        .bind(&seller.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_expiry(
        &self,
        id: &LeadId,
        seller: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                accept_status = 'declined',
                updated_at = ?4
             WHERE id = ?1
               AND status = 'pending_acceptance'
               AND assigned_to = ?2
               AND accept_status = 'pending'
               AND assigned_at IS NOT NULL
               AND assigned_at <= ?3",
        )
        .bind(&id.0)
        .bind(&seller.0)
        .bind(cutoff.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_assignment(
        &self,
        id: &LeadId,
        from: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                status = 'new',
                accept_status = NULL,
                assigned_to = NULL,
                assigned_at = NULL,
                updated_at = ?3
             WHERE id = ?1
               AND status = 'pending_acceptance'
               AND assigned_to = ?2",
        )
        .bind(&id.0)
        .bind(&from.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_status(
        &self,
        id: &LeadId,
        from: LeadStatus,
        to: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET
                status = ?3,
                updated_at = ?4
             WHERE id = ?1 AND status = ?2",
        )
        .bind(&id.0)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = LeadStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead status `{status_raw}`")))?;

    let accept_status = row
        .try_get::<Option<String>, _>("accept_status")?
        .map(|value| {
            AcceptStatus::parse(&value).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown accept status `{value}`"))
            })
        })
        .transpose()?;

    let facility = row
        .try_get::<Option<String>, _>("facility")?
        .map(|value| {
            Facility::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown facility `{value}`")))
        })
        .transpose()?;

    let source_raw = row.try_get::<String, _>("source")?;
    let source = LeadSource::parse(&source_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead source `{source_raw}`")))?;

    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        facility,
        status,
        accept_status,
        assigned_to: row.try_get::<Option<String>, _>("assigned_to")?.map(UserId),
        assigned_at: parse_optional_timestamp("assigned_at", row.try_get("assigned_at")?)?,
        source,
        contact_name: row.try_get("contact_name")?,
        contact_email: row.try_get("contact_email")?,
        contact_phone: row.try_get("contact_phone")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        listing_id: row.try_get("listing_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
