use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use leadrobin_core::{LeadId, UserId};

/// One fully rendered assignment notice, ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssignmentNotice {
    pub lead_id: LeadId,
    pub seller_id: UserId,
    pub email_to: String,
    pub subject: String,
    pub body: String,
    pub accept_by: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification relay rejected the notice: {0}")]
    Rejected(String),
    #[error("notification relay unreachable: {0}")]
    Unreachable(String),
    #[error("notifier misconfigured: {0}")]
    Misconfigured(String),
}

#[async_trait]
pub trait LeadNotifier: Send + Sync {
    async fn deliver(&self, notice: &AssignmentNotice) -> Result<(), DispatchError>;
}

/// Swallows every notice. Used when no relay is configured.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl LeadNotifier for NoopNotifier {
    async fn deliver(&self, _notice: &AssignmentNotice) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Test double that records delivered notices and can be scripted to fail.
/// Scripted failures are consumed in order; once drained, delivery succeeds.
#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    delivered: Vec<AssignmentNotice>,
    failures: VecDeque<DispatchError>,
}

impl RecordingNotifier {
    pub fn failing_with(failures: Vec<DispatchError>) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                delivered: Vec::new(),
                failures: failures.into(),
            }),
        }
    }

    pub async fn delivered(&self) -> Vec<AssignmentNotice> {
        self.state.lock().await.delivered.clone()
    }
}

#[async_trait]
impl LeadNotifier for RecordingNotifier {
    async fn deliver(&self, notice: &AssignmentNotice) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state.delivered.push(notice.clone());
        Ok(())
    }
}
