use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadrobin_core::domain::audit::{AuditEntry, NotificationRecord};
use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::lead::{AcceptStatus, Lead, LeadId, LeadStatus};
use leadrobin_core::domain::pool::{PoolEntry, PoolEntryId, PoolStatusChange};
use leadrobin_core::domain::user::{Role, User, UserId};

use super::{
    AuditLogRepository, LeadRepository, NotificationLogRepository, PoolRepository,
    RepositoryError, UserRepository,
};

/// In-memory stand-ins with the same guard semantics as the SQL
/// repositories. Engine unit tests run against these, so any drift from the
/// SQL behavior shows up as a test that lies.
#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<HashMap<String, Lead>>,
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads.get(&id.0).cloned())
    }

    async fn find_by_listing(&self, listing_id: &str) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads.values().find(|lead| lead.listing_id.as_deref() == Some(listing_id)).cloned())
    }

    async fn create(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        let listing_taken = lead.listing_id.as_deref().is_some_and(|listing| {
            leads.values().any(|existing| existing.listing_id.as_deref() == Some(listing))
        });
        if leads.contains_key(&lead.id.0) || listing_taken {
            return Err(RepositoryError::Conflict(format!(
                "lead `{}` collides with an existing row",
                lead.id
            )));
        }
        leads.insert(lead.id.0.clone(), lead.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: LeadStatus) -> Result<Vec<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        let mut matching: Vec<Lead> =
            leads.values().filter(|lead| lead.status == status).cloned().collect();
        matching.sort_by(|a, b| (a.created_at, &a.id.0).cmp(&(b.created_at, &b.id.0)));
        Ok(matching)
    }

    async fn latest_assignee(
        &self,
        facility: Facility,
        sellers: &[UserId],
    ) -> Result<Option<UserId>, RepositoryError> {
        let leads = self.leads.read().await;
        let latest = leads
            .values()
            .filter(|lead| lead.facility == Some(facility))
            .filter(|lead| lead.assigned_at.is_some())
            .filter(|lead| {
                lead.assigned_to.as_ref().is_some_and(|seller| sellers.contains(seller))
            })
            .max_by(|a, b| {
                (a.assigned_at, a.updated_at, &a.id.0)
                    .cmp(&(b.assigned_at, b.updated_at, &b.id.0))
            });
        Ok(latest.and_then(|lead| lead.assigned_to.clone()))
    }

    async fn list_pending_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        let mut expired: Vec<Lead> = leads
            .values()
            .filter(|lead| lead.status == LeadStatus::PendingAcceptance)
            .filter(|lead| lead.accept_status == Some(AcceptStatus::Pending))
            .filter(|lead| lead.assigned_to.is_some())
            .filter(|lead| lead.assigned_at.is_some_and(|at| at <= cutoff))
            .cloned()
            .collect();
        expired.sort_by(|a, b| (a.assigned_at, &a.id.0).cmp(&(b.assigned_at, &b.id.0)));
        Ok(expired)
    }

    async fn commit_assignment(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        let assignable = lead.assigned_to.is_none()
            && matches!(lead.status, LeadStatus::New | LeadStatus::PendingAcceptance);
        if !assignable {
            return Ok(false);
        }
        lead.status = LeadStatus::PendingAcceptance;
        lead.accept_status = Some(AcceptStatus::Pending);
        lead.assigned_to = Some(seller.clone());
        lead.assigned_at = Some(now);
        lead.updated_at = now;
        Ok(true)
    }

    async fn commit_reassignment(
        &self,
        id: &LeadId,
        from: &UserId,
        to: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if lead.status != LeadStatus::PendingAcceptance || lead.assigned_to.as_ref() != Some(from)
        {
            return Ok(false);
        }
        lead.accept_status = Some(AcceptStatus::Pending);
        lead.assigned_to = Some(to.clone());
        lead.assigned_at = Some(now);
        lead.updated_at = now;
        Ok(true)
    }

    async fn commit_acceptance(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if !pending_for(lead, seller) {
            return Ok(false);
        }
        lead.status = LeadStatus::Contacted;
        lead.accept_status = Some(AcceptStatus::Accepted);
        lead.updated_at = now;
        Ok(true)
    }

    async fn commit_decline(
        &self,
        id: &LeadId,
        seller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if !pending_for(lead, seller) {
            return Ok(false);
        }
        lead.accept_status = Some(AcceptStatus::Declined);
        lead.updated_at = now;
        Ok(true)
    }

    async fn commit_expiry(
        &self,
        id: &LeadId,
        seller: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if !pending_for(lead, seller) || !lead.assigned_at.is_some_and(|at| at <= cutoff) {
            return Ok(false);
        }
        lead.accept_status = Some(AcceptStatus::Declined);
        lead.updated_at = now;
        Ok(true)
    }

    async fn clear_assignment(
        &self,
        id: &LeadId,
        from: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if lead.status != LeadStatus::PendingAcceptance || lead.assigned_to.as_ref() != Some(from)
        {
            return Ok(false);
        }
        lead.status = LeadStatus::New;
        lead.accept_status = None;
        lead.assigned_to = None;
        lead.assigned_at = None;
        lead.updated_at = now;
        Ok(true)
    }

    async fn commit_status(
        &self,
        id: &LeadId,
        from: LeadStatus,
        to: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        if lead.status != from {
            return Ok(false);
        }
        lead.status = to;
        lead.updated_at = now;
        Ok(true)
    }
}

fn pending_for(lead: &Lead, seller: &UserId) -> bool {
    lead.status == LeadStatus::PendingAcceptance
        && lead.assigned_to.as_ref() == Some(seller)
        && lead.accept_status == Some(AcceptStatus::Pending)
}

#[derive(Default)]
pub struct InMemoryPoolRepository {
    entries: RwLock<HashMap<String, PoolEntry>>,
    history: RwLock<Vec<PoolStatusChange>>,
}

#[async_trait::async_trait]
impl PoolRepository for InMemoryPoolRepository {
    async fn find_entry(&self, id: &PoolEntryId) -> Result<Option<PoolEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id.0).cloned())
    }

    async fn find_membership(
        &self,
        seller: &UserId,
        facility: Facility,
    ) -> Result<Option<PoolEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .find(|entry| entry.seller_id == *seller && entry.facility == facility)
            .cloned())
    }

    async fn list_for_facility(
        &self,
        facility: Facility,
    ) -> Result<Vec<PoolEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<PoolEntry> =
            entries.values().filter(|entry| entry.facility == facility).cloned().collect();
        matching.sort_by(|a, b| {
            (a.sort_order, &a.seller_id.0).cmp(&(b.sort_order, &b.seller_id.0))
        });
        Ok(matching)
    }

    async fn list_for_seller(&self, seller: &UserId) -> Result<Vec<PoolEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<PoolEntry> =
            entries.values().filter(|entry| entry.seller_id == *seller).cloned().collect();
        matching.sort_by_key(|entry| entry.facility.as_str());
        Ok(matching)
    }

    async fn save(&self, entry: &PoolEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.id.0.clone(), entry.clone());
        Ok(())
    }

    async fn set_enabled(
        &self,
        id: &PoolEntryId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id.0) else {
            return Ok(false);
        };
        entry.enabled = enabled;
        entry.updated_at = now;
        Ok(true)
    }

    async fn set_sort_order(
        &self,
        id: &PoolEntryId,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id.0) else {
            return Ok(false);
        };
        entry.sort_order = sort_order;
        entry.updated_at = now;
        Ok(true)
    }

    async fn max_sort_order(&self, facility: Facility) -> Result<Option<i64>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.facility == facility)
            .map(|entry| entry.sort_order)
            .max())
    }

    async fn append_status_change(
        &self,
        change: &PoolStatusChange,
    ) -> Result<(), RepositoryError> {
        let mut history = self.history.write().await;
        history.push(change.clone());
        Ok(())
    }

    async fn list_status_history(
        &self,
        id: &PoolEntryId,
    ) -> Result<Vec<PoolStatusChange>, RepositoryError> {
        let history = self.history.read().await;
        let mut matching: Vec<PoolStatusChange> =
            history.iter().filter(|change| change.pool_entry_id == *id).cloned().collect();
        matching.sort_by(|a, b| (a.occurred_at, &a.id).cmp(&(b.occurred_at, &b.id)));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn list_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut matching: Vec<User> =
            ids.iter().filter_map(|id| users.get(&id.0).cloned()).collect();
        matching.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(matching)
    }

    async fn list_active_sellers(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut sellers: Vec<User> = users
            .values()
            .filter(|user| user.role == Role::Seller && user.is_active)
            .cloned()
            .collect();
        sellers.sort_by(|a, b| {
            (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name))
        });
        Ok(sellers)
    }

    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditEntry>>,
    notifications: RwLock<Vec<NotificationRecord>>,
}

#[async_trait::async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<AuditEntry> =
            entries.iter().filter(|entry| entry.lead_id == *lead_id).cloned().collect();
        // Stable sort: same-instant entries keep their append order.
        matching.sort_by_key(|entry| entry.occurred_at);
        Ok(matching)
    }
}

#[async_trait::async_trait]
impl NotificationLogRepository for InMemoryAuditLogRepository {
    async fn append_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), RepositoryError> {
        let mut notifications = self.notifications.write().await;
        notifications.push(record.clone());
        Ok(())
    }

    async fn list_notifications_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut matching: Vec<NotificationRecord> =
            notifications.iter().filter(|record| record.lead_id == *lead_id).cloned().collect();
        matching.sort_by_key(|record| record.sent_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use leadrobin_core::domain::facility::Facility;
    use leadrobin_core::domain::lead::{AcceptStatus, Lead, LeadId, LeadSource, LeadStatus};
    use leadrobin_core::domain::user::UserId;

    use crate::repositories::{InMemoryLeadRepository, LeadRepository, RepositoryError};

    #[tokio::test]
    async fn guards_match_the_sql_repository_semantics() {
        let repo = InMemoryLeadRepository::default();
        let lead = sample_lead("lead-mem-001", None);
        repo.create(&lead).await.expect("create lead");

        let seller = UserId("seller-a".to_string());
        let rival = UserId("seller-b".to_string());
        let now = parse_ts("2026-03-01T09:00:00+00:00");

        assert!(repo.commit_assignment(&lead.id, &seller, now).await.expect("assign"));
        assert!(!repo.commit_assignment(&lead.id, &rival, now).await.expect("double assign"));

        assert!(!repo
            .commit_acceptance(&lead.id, &rival, now)
            .await
            .expect("wrong actor acceptance"));
        assert!(repo.commit_acceptance(&lead.id, &seller, now).await.expect("accept"));
        assert!(!repo
            .commit_expiry(&lead.id, &seller, now + Duration::hours(13), now)
            .await
            .expect("expiry after acceptance"));

        let stored = repo.find_by_id(&lead.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, LeadStatus::Contacted);
        assert_eq!(stored.accept_status, Some(AcceptStatus::Accepted));
    }

    #[tokio::test]
    async fn listing_collisions_are_conflicts() {
        let repo = InMemoryLeadRepository::default();
        repo.create(&sample_lead("lead-mem-001", Some("listing-1")))
            .await
            .expect("create first lead");

        let duplicate = repo.create(&sample_lead("lead-mem-002", Some("listing-1"))).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        let found = repo.find_by_listing("listing-1").await.expect("find by listing");
        assert_eq!(found.map(|lead| lead.id), Some(LeadId("lead-mem-001".to_string())));
    }

    #[tokio::test]
    async fn latest_assignee_respects_the_roster_filter() {
        let repo = InMemoryLeadRepository::default();
        let roster = [UserId("seller-a".to_string())];
        let now = parse_ts("2026-03-01T09:00:00+00:00");

        let first = sample_lead("lead-mem-001", None);
        repo.create(&first).await.expect("create first");
        assert!(repo
            .commit_assignment(&first.id, &UserId("seller-a".to_string()), now)
            .await
            .expect("assign first"));

        let second = sample_lead("lead-mem-002", None);
        repo.create(&second).await.expect("create second");
        assert!(repo
            .commit_assignment(
                &second.id,
                &UserId("seller-gone".to_string()),
                now + Duration::hours(1)
            )
            .await
            .expect("assign second"));

        let latest = repo
            .latest_assignee(Facility::Falkenberg, &roster)
            .await
            .expect("latest assignee");
        assert_eq!(latest, Some(UserId("seller-a".to_string())));
    }

    fn sample_lead(id: &str, listing_id: Option<&str>) -> Lead {
        Lead {
            id: LeadId(id.to_string()),
            facility: Some(Facility::Falkenberg),
            status: LeadStatus::New,
            accept_status: None,
            assigned_to: None,
            assigned_at: None,
            source: LeadSource::WebForm,
            contact_name: "Test Contact".to_string(),
            contact_email: None,
            contact_phone: None,
            subject: "Volvo V70".to_string(),
            message: None,
            listing_id: listing_id.map(str::to_string),
            created_at: parse_ts("2026-03-01T08:00:00+00:00"),
            updated_at: parse_ts("2026-03-01T08:00:00+00:00"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
