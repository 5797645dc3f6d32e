pub mod acceptance;
pub mod config;
pub mod domain;
pub mod errors;
pub mod rotation;

pub use acceptance::{
    evaluate, AcceptanceEvent, AcceptancePolicy, TransitionOutcome, TransitionRejection, Urgency,
};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, NotifierConfig, NotifierMode,
};
pub use domain::audit::{AuditAction, AuditActor, AuditEntry, NotificationRecord};
pub use domain::facility::Facility;
pub use domain::lead::{AcceptStatus, Lead, LeadId, LeadSource, LeadStatus, NewLead};
pub use domain::pool::{PoolEntry, PoolEntryId, PoolStatusChange};
pub use domain::user::{Role, User, UserId};
pub use errors::DomainError;
pub use rotation::next_in_rotation;
