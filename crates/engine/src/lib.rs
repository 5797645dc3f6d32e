//! Lead distribution engine.
//!
//! Ties the domain rules to storage and notifications:
//! - **Assigner** (`assigner`) - derives the rotation cursor from lead
//!   history and picks the next seller
//! - **Service** (`service`) - intake, assignment, and the
//!   accept/decline/expire protocol with its audit trail
//! - **Monitor** (`monitor`) - the background sweep that expires offers
//!   nobody answered in time
//! - **Pools** (`pools`) - rotation membership and ordering
//!
//! Writes go through guarded updates: every transition re-states its
//! preconditions in the storage commit, so two callers racing over the same
//! lead resolve to exactly one winner without locks or a coordinator.

pub mod assigner;
pub mod errors;
pub mod monitor;
pub mod pools;
pub mod service;

pub use assigner::RoundRobinAssigner;
pub use errors::EngineError;
pub use monitor::{AcceptanceMonitor, MonitorHandle, ScanSummary};
pub use pools::PoolService;
pub use service::{CreatedLead, LeadService, ReassignmentOutcome};
