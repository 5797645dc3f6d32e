use std::collections::HashSet;
use std::sync::Arc;

use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::pool::PoolEntry;
use leadrobin_core::domain::user::UserId;
use leadrobin_core::rotation::next_in_rotation;
use leadrobin_db::repositories::{LeadRepository, PoolRepository, UserRepository};

use crate::errors::EngineError;

/// Query-only rotation picker. The pick derives the cursor from lead history
/// on every call instead of keeping a stored pointer, so concurrent callers
/// never contend on shared rotation state and a re-enabled seller resumes
/// fairly. Committing the assignment is the caller's job.
pub struct RoundRobinAssigner {
    pools: Arc<dyn PoolRepository>,
    users: Arc<dyn UserRepository>,
    leads: Arc<dyn LeadRepository>,
}

impl RoundRobinAssigner {
    pub fn new(
        pools: Arc<dyn PoolRepository>,
        users: Arc<dyn UserRepository>,
        leads: Arc<dyn LeadRepository>,
    ) -> Self {
        Self { pools, users, leads }
    }

    pub async fn next_seller(&self, facility: Facility) -> Result<Option<UserId>, EngineError> {
        self.next_seller_excluding(facility, None).await
    }

    /// Next seller in rotation with `excluded` removed from the eligible set
    /// before the cursor is derived. Used after a decline or expiry so the
    /// seller who just failed to act cannot be picked again immediately,
    /// even in a two-member pool where the rotation would wrap onto them.
    pub async fn next_seller_excluding(
        &self,
        facility: Facility,
        excluded: Option<&UserId>,
    ) -> Result<Option<UserId>, EngineError> {
        let eligible = self.eligible_entries(facility, excluded).await?;
        if eligible.is_empty() {
            return Ok(None);
        }

        let roster: Vec<UserId> = eligible.iter().map(|entry| entry.seller_id.clone()).collect();
        let last = self.leads.latest_assignee(facility, &roster).await?;

        Ok(next_in_rotation(&eligible, last.as_ref()).map(|entry| entry.seller_id.clone()))
    }

    /// Enabled entries whose account is still active, in rotation order.
    async fn eligible_entries(
        &self,
        facility: Facility,
        excluded: Option<&UserId>,
    ) -> Result<Vec<PoolEntry>, EngineError> {
        let entries = self.pools.list_for_facility(facility).await?;
        let mut candidates: Vec<PoolEntry> = entries
            .into_iter()
            .filter(|entry| entry.enabled)
            .filter(|entry| excluded.map_or(true, |seller| seller != &entry.seller_id))
            .collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let ids: Vec<UserId> = candidates.iter().map(|entry| entry.seller_id.clone()).collect();
        let accounts = self.users.list_by_ids(&ids).await?;
        let active: HashSet<&str> = accounts
            .iter()
            .filter(|user| user.is_active)
            .map(|user| user.id.0.as_str())
            .collect();

        candidates.retain(|entry| active.contains(entry.seller_id.0.as_str()));
        Ok(candidates)
    }
}
