use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::lead::{AcceptStatus, Lead, LeadStatus};
use crate::domain::user::UserId;

/// Time limits of the acceptance protocol. The 12 hour window is a business
/// rule rather than deployment configuration; tests construct shorter
/// policies directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptancePolicy {
    pub accept_window: Duration,
    pub urgent_window: Duration,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self { accept_window: Duration::hours(12), urgent_window: Duration::hours(2) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Urgent,
    Overdue,
}

impl AcceptancePolicy {
    pub fn deadline(&self, assigned_at: DateTime<Utc>) -> DateTime<Utc> {
        assigned_at + self.accept_window
    }

    /// A lead is expirable once its deadline is at or before `now`.
    pub fn is_expired(&self, assigned_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.deadline(assigned_at) <= now
    }

    /// UI-facing classification; plays no part in transition legality.
    pub fn urgency(&self, assigned_at: DateTime<Utc>, now: DateTime<Utc>) -> Urgency {
        let deadline = self.deadline(assigned_at);
        if deadline <= now {
            Urgency::Overdue
        } else if deadline - now <= self.urgent_window {
            Urgency::Urgent
        } else {
            Urgency::Normal
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptanceEvent {
    Assign { seller: UserId },
    Accept { actor: UserId },
    Decline { actor: UserId },
    Expire,
}

/// Field writes a legal transition commits. `assigned_at` of `None` leaves
/// the stored clock untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: LeadStatus,
    pub to: LeadStatus,
    pub accept_status: Option<AcceptStatus>,
    pub assigned_to: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionRejection {
    #[error("lead is not awaiting acceptance (status is {status:?})")]
    NotPending { status: LeadStatus },
    #[error("lead cannot be assigned while in status {status:?}")]
    NotAssignable { status: LeadStatus },
    #[error("only the assigned seller may act on this lead")]
    WrongActor { assigned_to: Option<UserId> },
    #[error("acceptance deadline has not elapsed (deadline {deadline})")]
    DeadlineNotReached { deadline: DateTime<Utc> },
    #[error("lead is awaiting acceptance but carries no assignment timestamp")]
    MissingClock,
}

/// Validates one acceptance event against the lead's current snapshot and
/// produces the writes to commit. Callers re-encode the same guard in the
/// storage commit, so a stale snapshot here can only produce a rejected
/// commit, never a double transition.
pub fn evaluate(
    lead: &Lead,
    event: &AcceptanceEvent,
    policy: &AcceptancePolicy,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionRejection> {
    match event {
        AcceptanceEvent::Assign { seller } => {
            let assignable = lead.status == LeadStatus::New
                || (lead.status == LeadStatus::PendingAcceptance && lead.assigned_to.is_none());
            if !assignable {
                return Err(TransitionRejection::NotAssignable { status: lead.status });
            }
            Ok(TransitionOutcome {
                from: lead.status,
                to: LeadStatus::PendingAcceptance,
                accept_status: Some(AcceptStatus::Pending),
                assigned_to: Some(seller.clone()),
                assigned_at: Some(now),
            })
        }
        AcceptanceEvent::Accept { actor } => {
            require_pending_assignee(lead, actor)?;
            Ok(TransitionOutcome {
                from: lead.status,
                to: LeadStatus::Contacted,
                accept_status: Some(AcceptStatus::Accepted),
                assigned_to: lead.assigned_to.clone(),
                assigned_at: None,
            })
        }
        AcceptanceEvent::Decline { actor } => {
            require_pending_assignee(lead, actor)?;
            Ok(decline_outcome(lead))
        }
        AcceptanceEvent::Expire => {
            if lead.status != LeadStatus::PendingAcceptance {
                return Err(TransitionRejection::NotPending { status: lead.status });
            }
            let assigned_at = lead.assigned_at.ok_or(TransitionRejection::MissingClock)?;
            if !policy.is_expired(assigned_at, now) {
                return Err(TransitionRejection::DeadlineNotReached {
                    deadline: policy.deadline(assigned_at),
                });
            }
            Ok(decline_outcome(lead))
        }
    }
}

fn require_pending_assignee(lead: &Lead, actor: &UserId) -> Result<(), TransitionRejection> {
    if lead.status != LeadStatus::PendingAcceptance {
        return Err(TransitionRejection::NotPending { status: lead.status });
    }
    if lead.assigned_to.as_ref() != Some(actor) {
        return Err(TransitionRejection::WrongActor { assigned_to: lead.assigned_to.clone() });
    }
    Ok(())
}

// Decline and expiry mark the refusal only; reassignment or the fallback to
// unassigned is a follow-up transition owned by the caller.
fn decline_outcome(lead: &Lead) -> TransitionOutcome {
    TransitionOutcome {
        from: lead.status,
        to: LeadStatus::PendingAcceptance,
        accept_status: Some(AcceptStatus::Declined),
        assigned_to: lead.assigned_to.clone(),
        assigned_at: None,
    }
}
