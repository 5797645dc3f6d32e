use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;
use crate::domain::user::UserId;

/// Who drove a lead transition: a signed-in user, or the timeout monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditActor {
    User(UserId),
    System,
}

impl AuditActor {
    pub fn actor_type(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::System => "system",
        }
    }

    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id.0.as_str()),
            Self::System => None,
        }
    }

    pub fn from_parts(actor_type: &str, actor_id: Option<String>) -> Option<Self> {
        match actor_type {
            "user" => actor_id.map(|id| Self::User(UserId(id))),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Assigned,
    Reassigned,
    Accepted,
    Declined,
    Expired,
    Unassigned,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "ASSIGNED",
            Self::Reassigned => "REASSIGNED",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
            Self::Expired => "EXPIRED",
            Self::Unassigned => "UNASSIGNED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASSIGNED" => Some(Self::Assigned),
            "REASSIGNED" => Some(Self::Reassigned),
            "ACCEPTED" => Some(Self::Accepted),
            "DECLINED" => Some(Self::Declined),
            "EXPIRED" => Some(Self::Expired),
            "UNASSIGNED" => Some(Self::Unassigned),
            _ => None,
        }
    }
}

/// Append-only record of an assignee or status change on a lead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub lead_id: LeadId,
    pub actor: AuditActor,
    pub action: AuditAction,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn record(
        lead_id: LeadId,
        actor: AuditActor,
        action: AuditAction,
        from_value: Option<String>,
        to_value: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id,
            actor,
            action,
            from_value,
            to_value,
            occurred_at: now,
        }
    }
}

/// Outcome of one notification dispatch attempt, success or failure.
/// Sellers with notifications disabled are skipped and produce no record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub lead_id: LeadId,
    pub user_id: UserId,
    pub email_to: String,
    pub subject: String,
    pub success: bool,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn record(
        lead_id: LeadId,
        user_id: UserId,
        email_to: String,
        subject: String,
        success: bool,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id,
            user_id,
            email_to,
            subject,
            success,
            error,
            sent_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditAction, AuditActor};
    use crate::domain::user::UserId;

    #[test]
    fn actions_round_trip_through_strings() {
        for action in [
            AuditAction::Assigned,
            AuditAction::Reassigned,
            AuditAction::Accepted,
            AuditAction::Declined,
            AuditAction::Expired,
            AuditAction::Unassigned,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("MERGED"), None);
    }

    #[test]
    fn actor_splits_into_type_and_id() {
        let user = AuditActor::User(UserId("u-7".to_string()));
        assert_eq!(user.actor_type(), "user");
        assert_eq!(user.actor_id(), Some("u-7"));
        assert_eq!(
            AuditActor::from_parts("user", Some("u-7".to_string())),
            Some(user)
        );

        assert_eq!(AuditActor::System.actor_id(), None);
        assert_eq!(AuditActor::from_parts("system", None), Some(AuditActor::System));
        assert_eq!(AuditActor::from_parts("user", None), None);
        assert_eq!(AuditActor::from_parts("robot", None), None);
    }
}
