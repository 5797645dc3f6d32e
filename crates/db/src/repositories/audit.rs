use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadrobin_core::domain::audit::{AuditAction, AuditActor, AuditEntry, NotificationRecord};
use leadrobin_core::domain::lead::LeadId;
use leadrobin_core::domain::user::UserId;

use super::{AuditLogRepository, NotificationLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lead_audit_log (
                id,
                lead_id,
                actor_type,
                actor_id,
                action,
                from_value,
                to_value,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.lead_id.0)
        .bind(entry.actor.actor_type())
        .bind(entry.actor.actor_id())
        .bind(entry.action.as_str())
        .bind(entry.from_value.as_deref())
        .bind(entry.to_value.as_deref())
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, actor_type, actor_id, action, from_value, to_value, occurred_at
             FROM lead_audit_log
             WHERE lead_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }
}

#[async_trait::async_trait]
impl NotificationLogRepository for SqlAuditLogRepository {
    async fn append_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO notification_log (
                id,
                lead_id,
                user_id,
                email_to,
                subject,
                success,
                error,
                sent_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.lead_id.0)
        .bind(&record.user_id.0)
        .bind(&record.email_to)
        .bind(&record.subject)
        .bind(record.success)
        .bind(record.error.as_deref())
        .bind(record.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_notifications_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, user_id, email_to, subject, success, error, sent_at
             FROM notification_log
             WHERE lead_id = ?
             ORDER BY sent_at ASC, rowid ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(notification_from_row).collect()
    }
}

fn entry_from_row(row: SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let actor_type = row.try_get::<String, _>("actor_type")?;
    let actor_id = row.try_get::<Option<String>, _>("actor_id")?;
    let actor = AuditActor::from_parts(&actor_type, actor_id)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit actor `{actor_type}`")))?;

    let action_raw = row.try_get::<String, _>("action")?;
    let action = AuditAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action_raw}`")))?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        lead_id: LeadId(row.try_get("lead_id")?),
        actor,
        action,
        from_value: row.try_get("from_value")?,
        to_value: row.try_get("to_value")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn notification_from_row(row: SqliteRow) -> Result<NotificationRecord, RepositoryError> {
    Ok(NotificationRecord {
        id: row.try_get("id")?,
        lead_id: LeadId(row.try_get("lead_id")?),
        user_id: UserId(row.try_get("user_id")?),
        email_to: row.try_get("email_to")?,
        subject: row.try_get("subject")?,
        success: row.try_get("success")?,
        error: row.try_get("error")?,
        sent_at: parse_timestamp("sent_at", row.try_get("sent_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
