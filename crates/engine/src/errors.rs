use thiserror::Error;

use leadrobin_core::acceptance::TransitionRejection;
use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::lead::LeadId;
use leadrobin_core::domain::pool::PoolEntryId;
use leadrobin_core::domain::user::UserId;
use leadrobin_db::repositories::RepositoryError;

/// Failures surfaced by engine operations. An empty pool is not represented
/// here: exhaustion is a normal outcome carried in the operation's result
/// type, and notification failures are logged without ever reaching callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("lead `{0}` not found")]
    LeadNotFound(LeadId),
    #[error("user `{0}` not found")]
    UserNotFound(UserId),
    #[error("pool entry `{0}` not found")]
    PoolEntryNotFound(PoolEntryId),
    #[error("reorder for {facility} must list every pool entry exactly once")]
    InvalidReorder { facility: Facility },
    #[error("seller `{0}` has assignment notices turned off and cannot enter a rotation")]
    NoticesDisabled(UserId),
    #[error(transparent)]
    Rejected(#[from] TransitionRejection),
    #[error("lead `{lead}` changed concurrently; retry the request")]
    Conflict { lead: LeadId },
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl EngineError {
    /// Precondition failures and lost races are caller mistakes or benign
    /// overlaps; everything else points at the system itself.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Conflict { .. })
    }
}
