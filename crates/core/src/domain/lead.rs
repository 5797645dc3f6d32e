use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::facility::Facility;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse lead lifecycle. The engine owns `New` and `PendingAcceptance`;
/// `Contacted` is the first active state after acceptance, and `Won`/`Lost`
/// belong to downstream sales work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    PendingAcceptance,
    Contacted,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PendingAcceptance => "pending_acceptance",
            Self::Contacted => "contacted",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "pending_acceptance" => Some(Self::PendingAcceptance),
            "contacted" => Some(Self::Contacted),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// Tracks the acceptance protocol independently of the coarse status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptStatus {
    Pending,
    Accepted,
    Declined,
}

impl AcceptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    WebForm,
    Marketplace,
    Manual,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebForm => "web_form",
            Self::Marketplace => "marketplace",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "web_form" => Some(Self::WebForm),
            "marketplace" => Some(Self::Marketplace),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub facility: Option<Facility>,
    pub status: LeadStatus,
    pub accept_status: Option<AcceptStatus>,
    pub assigned_to: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub source: LeadSource,
    pub contact_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub subject: String,
    pub message: Option<String>,
    pub listing_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload; everything else on `Lead` is engine-owned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub facility: Option<Facility>,
    pub source: LeadSource,
    pub contact_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub subject: String,
    pub message: Option<String>,
    pub listing_id: Option<String>,
}

impl Lead {
    pub fn create(data: NewLead, now: DateTime<Utc>) -> Self {
        Self {
            id: LeadId::generate(),
            facility: data.facility,
            status: LeadStatus::New,
            accept_status: None,
            assigned_to: None,
            assigned_at: None,
            source: data.source,
            contact_name: data.contact_name,
            contact_email: data.contact_email,
            contact_phone: data.contact_phone,
            subject: data.subject,
            message: data.message,
            listing_id: data.listing_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending_acceptance(&self) -> bool {
        self.status == LeadStatus::PendingAcceptance
    }

    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        matches!(
            (self.status, next),
            (LeadStatus::New, LeadStatus::PendingAcceptance)
                | (LeadStatus::PendingAcceptance, LeadStatus::Contacted)
                | (LeadStatus::PendingAcceptance, LeadStatus::New)
                | (LeadStatus::PendingAcceptance, LeadStatus::PendingAcceptance)
                | (LeadStatus::Contacted, LeadStatus::Won)
                | (LeadStatus::Contacted, LeadStatus::Lost)
        )
    }

    pub fn transition_to(&mut self, next: LeadStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    /// Structural invariants that must hold on every persisted snapshot.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let assigned_states = matches!(
            self.status,
            LeadStatus::PendingAcceptance | LeadStatus::Contacted | LeadStatus::Won | LeadStatus::Lost
        );
        if self.assigned_to.is_some() != assigned_states {
            return Err(DomainError::InvariantViolation(format!(
                "lead {} has assignee {:?} in status {}",
                self.id,
                self.assigned_to.as_ref().map(|id| id.0.as_str()),
                self.status.as_str()
            )));
        }
        if self.status == LeadStatus::PendingAcceptance && self.assigned_at.is_none() {
            return Err(DomainError::InvariantViolation(format!(
                "lead {} is pending acceptance without assigned_at",
                self.id
            )));
        }
        Ok(())
    }
}
