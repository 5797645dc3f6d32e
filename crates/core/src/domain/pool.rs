use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::facility::Facility;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolEntryId(pub String);

impl PoolEntryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for PoolEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (seller, facility) rotation membership. Entries are disabled rather
/// than deleted so history and ordering survive opt-outs. `sort_order` is
/// unique per facility and defines the rotation sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub id: PoolEntryId,
    pub seller_id: UserId,
    pub facility: Facility,
    pub enabled: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PoolEntry {
    pub fn new(
        seller_id: UserId,
        facility: Facility,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PoolEntryId::generate(),
            seller_id,
            facility,
            enabled: true,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable record of an enable/disable toggle on a pool entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatusChange {
    pub id: String,
    pub pool_entry_id: PoolEntryId,
    pub changed_by: UserId,
    pub enabled: bool,
    pub occurred_at: DateTime<Utc>,
}

impl PoolStatusChange {
    pub fn record(
        pool_entry_id: PoolEntryId,
        changed_by: UserId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pool_entry_id,
            changed_by,
            enabled,
            occurred_at: now,
        }
    }
}
