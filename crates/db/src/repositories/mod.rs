use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadrobin_core::domain::audit::{AuditEntry, NotificationRecord};
use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::lead::{Lead, LeadId, LeadStatus};
use leadrobin_core::domain::pool::{PoolEntry, PoolEntryId, PoolStatusChange};
use leadrobin_core::domain::user::{User, UserId};

pub mod audit;
pub mod lead;
pub mod memory;
pub mod pool;
pub mod user;

pub use audit::SqlAuditLogRepository;
pub use lead::SqlLeadRepository;
pub use memory::{
    InMemoryAuditLogRepository, InMemoryLeadRepository, InMemoryPoolRepository,
    InMemoryUserRepository,
};
pub use pool::SqlPoolRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Lead persistence. Every mutation that participates in the acceptance
/// protocol is a guarded update: the WHERE clause re-states the expected
/// prior state and the method reports whether a row matched. Callers treat
/// `false` as a lost race or stale view, never as silent success.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;

    async fn find_by_listing(&self, listing_id: &str) -> Result<Option<Lead>, RepositoryError>;

    async fn create(&self, lead: &Lead) -> Result<(), RepositoryError>;

    async fn list_by_status(&self, status: LeadStatus) -> Result<Vec<Lead>, RepositoryError>;

    /// Most recent assignee for the facility among the given sellers,
    /// judged by `assigned_at`. Sellers outside the slice are invisible,
    /// which is what lets the rotation survive roster edits.
    async fn latest_assignee(
        &self,
        facility: Facility,
        sellers: &[UserId],
    ) -> Result<Option<UserId>, RepositoryError>;

    /// Pending leads whose acceptance window closed at or before `cutoff`.
    async fn list_pending_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Lead>, RepositoryError>;

    /// First assignment, or repair of a pending lead that lost its assignee.
    async fn commit_assignment(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Hand-off to the next seller after a decline or expiry.
    async fn commit_reassignment(
        &self,
        id: &LeadId,
        from: &UserId,
        to: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn commit_acceptance(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn commit_decline(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Deadline-checked decline on behalf of the monitor. The cutoff guard
    /// lives in the statement so a lead accepted between scan and commit is
    /// left alone.
    async fn commit_expiry(
        &self,
        id: &LeadId,
        seller: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Return a pending lead to the unassigned queue (pool exhausted).
    async fn clear_assignment(
        &self,
        id: &LeadId,
        from: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Downstream status moves (contacted -> won/lost), still guarded.
    async fn commit_status(
        &self,
        id: &LeadId,
        from: LeadStatus,
        to: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PoolRepository: Send + Sync {
    async fn find_entry(&self, id: &PoolEntryId) -> Result<Option<PoolEntry>, RepositoryError>;

    async fn find_membership(
        &self,
        seller: &UserId,
        facility: Facility,
    ) -> Result<Option<PoolEntry>, RepositoryError>;

    /// All entries for a facility ordered by `sort_order`, disabled included.
    async fn list_for_facility(
        &self,
        facility: Facility,
    ) -> Result<Vec<PoolEntry>, RepositoryError>;

    async fn list_for_seller(&self, seller: &UserId) -> Result<Vec<PoolEntry>, RepositoryError>;

    async fn save(&self, entry: &PoolEntry) -> Result<(), RepositoryError>;

    async fn set_enabled(
        &self,
        id: &PoolEntryId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn set_sort_order(
        &self,
        id: &PoolEntryId,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn max_sort_order(&self, facility: Facility) -> Result<Option<i64>, RepositoryError>;

    async fn append_status_change(
        &self,
        change: &PoolStatusChange,
    ) -> Result<(), RepositoryError>;

    async fn list_status_history(
        &self,
        id: &PoolEntryId,
    ) -> Result<Vec<PoolStatusChange>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn list_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;

    async fn list_active_sellers(&self) -> Result<Vec<User>, RepositoryError>;

    async fn save(&self, user: &User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;

    /// Trail for one lead, oldest first. Entries sharing a timestamp come
    /// back in append order, so a decline and its hand-off read causally.
    async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<AuditEntry>, RepositoryError>;
}

#[async_trait]
pub trait NotificationLogRepository: Send + Sync {
    async fn append_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), RepositoryError>;

    async fn list_notifications_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;
}
