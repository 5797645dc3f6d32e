use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::pool::{PoolEntry, PoolEntryId, PoolStatusChange};
use leadrobin_core::domain::user::UserId;
use leadrobin_db::repositories::{PoolRepository, UserRepository};

use crate::errors::EngineError;

/// Manages facility rotation membership. Entries are disabled rather than
/// deleted when a seller leaves, so the slot keeps its toggle history and a
/// returning seller resumes under the same record.
pub struct PoolService {
    pools: Arc<dyn PoolRepository>,
    users: Arc<dyn UserRepository>,
}

impl PoolService {
    pub fn new(pools: Arc<dyn PoolRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { pools, users }
    }

    /// Puts a seller into a facility's rotation at the end of the order.
    /// An existing membership is re-enabled instead of duplicated; an
    /// already enabled one comes back unchanged. A seller with assignment
    /// notices turned off cannot join, since they would never hear about
    /// the leads handed to them.
    pub async fn add_seller(
        &self,
        seller: &UserId,
        facility: Facility,
        changed_by: &UserId,
        now: DateTime<Utc>,
    ) -> Result<PoolEntry, EngineError> {
        let Some(account) = self.users.find_by_id(seller).await? else {
            return Err(EngineError::UserNotFound(seller.clone()));
        };
        if !account.email_on_assignment {
            return Err(EngineError::NoticesDisabled(seller.clone()));
        }

        if let Some(existing) = self.pools.find_membership(seller, facility).await? {
            if existing.enabled {
                return Ok(existing);
            }
            self.set_enabled(&existing.id, true, changed_by, now).await?;
            return self.require_entry(&existing.id).await;
        }

        let next_order = self.pools.max_sort_order(facility).await?.unwrap_or(0) + 1;
        let entry = PoolEntry::new(seller.clone(), facility, next_order, now);
        self.pools.save(&entry).await?;
        self.pools
            .append_status_change(&PoolStatusChange::record(
                entry.id.clone(),
                changed_by.clone(),
                true,
                now,
            ))
            .await?;
        info!(
            event_name = "pool.seller_joined",
            seller_id = %seller,
            %facility,
            sort_order = next_order,
            "seller joined rotation"
        );
        Ok(entry)
    }

    /// Enables or disables a rotation slot. Returns whether anything
    /// changed; repeating the current state appends no history. Enabling
    /// requires the seller to still accept assignment notices.
    pub async fn set_enabled(
        &self,
        entry_id: &PoolEntryId,
        enabled: bool,
        changed_by: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let entry = self.require_entry(entry_id).await?;
        if entry.enabled == enabled {
            return Ok(false);
        }
        if enabled {
            let seller = self
                .users
                .find_by_id(&entry.seller_id)
                .await?
                .ok_or_else(|| EngineError::UserNotFound(entry.seller_id.clone()))?;
            if !seller.email_on_assignment {
                return Err(EngineError::NoticesDisabled(entry.seller_id.clone()));
            }
        }
        if !self.pools.set_enabled(entry_id, enabled, now).await? {
            return Err(EngineError::PoolEntryNotFound(entry_id.clone()));
        }
        self.pools
            .append_status_change(&PoolStatusChange::record(
                entry_id.clone(),
                changed_by.clone(),
                enabled,
                now,
            ))
            .await?;
        info!(
            event_name = "pool.slot_toggled",
            entry_id = %entry_id,
            enabled,
            "rotation slot toggled"
        );
        Ok(true)
    }

    /// Rewrites a facility's rotation order. `ordered` must name every
    /// entry of the facility exactly once; positions are renumbered from 1.
    pub async fn reorder(
        &self,
        facility: Facility,
        ordered: &[PoolEntryId],
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let current = self.pools.list_for_facility(facility).await?;
        let known: HashSet<&str> = current.iter().map(|entry| entry.id.0.as_str()).collect();
        for id in ordered {
            if !known.contains(id.0.as_str()) {
                return Err(EngineError::PoolEntryNotFound(id.clone()));
            }
        }
        let mut seen = HashSet::new();
        let complete =
            ordered.len() == current.len() && ordered.iter().all(|id| seen.insert(id.0.as_str()));
        if !complete {
            return Err(EngineError::InvalidReorder { facility });
        }

        for (position, id) in ordered.iter().enumerate() {
            if !self.pools.set_sort_order(id, position as i64 + 1, now).await? {
                return Err(EngineError::PoolEntryNotFound(id.clone()));
            }
        }
        info!(
            event_name = "pool.reordered",
            %facility,
            entries = ordered.len(),
            "rotation order rewritten"
        );
        Ok(())
    }

    /// Aligns a seller's memberships with `wanted`: joins what is missing
    /// and disables what is no longer listed. Returns the memberships after
    /// the sync, disabled ones included.
    pub async fn sync_facilities(
        &self,
        seller: &UserId,
        wanted: &[Facility],
        now: DateTime<Utc>,
    ) -> Result<Vec<PoolEntry>, EngineError> {
        for facility in wanted {
            self.add_seller(seller, *facility, seller, now).await?;
        }
        let memberships = self.pools.list_for_seller(seller).await?;
        for entry in &memberships {
            if entry.enabled && !wanted.contains(&entry.facility) {
                self.set_enabled(&entry.id, false, seller, now).await?;
            }
        }
        Ok(self.pools.list_for_seller(seller).await?)
    }

    /// Disables every enabled membership of a seller and reports how many
    /// were switched off. Called when an account is deactivated or turns
    /// off assignment notices.
    pub async fn disable_all_for_seller(
        &self,
        seller: &UserId,
        changed_by: &UserId,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let memberships = self.pools.list_for_seller(seller).await?;
        let mut disabled = 0;
        for entry in memberships.iter().filter(|entry| entry.enabled) {
            if self.set_enabled(&entry.id, false, changed_by, now).await? {
                disabled += 1;
            }
        }
        if disabled > 0 {
            info!(
                event_name = "pool.seller_removed",
                seller_id = %seller,
                disabled,
                "seller removed from all rotations"
            );
        }
        Ok(disabled)
    }

    /// Enable/disable history for a rotation slot, oldest first.
    pub async fn history(
        &self,
        entry_id: &PoolEntryId,
    ) -> Result<Vec<PoolStatusChange>, EngineError> {
        self.require_entry(entry_id).await?;
        Ok(self.pools.list_status_history(entry_id).await?)
    }

    async fn require_entry(&self, entry_id: &PoolEntryId) -> Result<PoolEntry, EngineError> {
        self.pools
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| EngineError::PoolEntryNotFound(entry_id.clone()))
    }
}
