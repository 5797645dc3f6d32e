//! SQLite persistence.
//!
//! Storage for leads, rotation pools, users, and the audit trails:
//! - **Connection** (`connection`) - pool construction with the pragmas the
//!   engine relies on (foreign keys, WAL, busy timeout)
//! - **Migrations** (`migrations`) - embedded schema migrations
//! - **Repositories** (`repositories`) - the storage traits, their SQLite
//!   implementations, and in-memory fakes for tests
//! - **Fixtures** (`fixtures`) - demo roster seeding for local setups
//!
//! Mutations in the acceptance protocol are guarded updates whose WHERE
//! clauses re-state the expected prior state; callers get back whether a
//! row matched and treat `false` as a lost race.

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{
    LeadSeedInfo, RosterSeedDataset, RotationSeedInfo, SeedResult, VerificationResult,
};
