//! Assignment notifications.
//!
//! When the engine hands a lead to a seller, the seller gets an email with
//! the lead details and the acceptance deadline. This crate renders and
//! delivers those notices:
//! - **Messages** (`message`) - plain-text subject and body rendering
//! - **Notifier** (`notifier`) - the delivery trait plus no-op and recording
//!   implementations
//! - **Relay** (`relay`) - HTTP delivery through an email relay service,
//!   with bounded retries
//!
//! Delivery is best-effort: a lead assignment is never rolled back because
//! an email could not be sent. Callers log the outcome to the notification
//! audit trail and move on.

pub mod message;
pub mod notifier;
pub mod relay;

pub use message::assignment_notice;
pub use notifier::{
    AssignmentNotice, DispatchError, LeadNotifier, NoopNotifier, RecordingNotifier,
};
pub use relay::{build_notifier, HttpRelayNotifier, RetryPolicy};
