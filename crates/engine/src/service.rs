use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use leadrobin_core::acceptance::{
    evaluate, AcceptanceEvent, AcceptancePolicy, TransitionRejection,
};
use leadrobin_core::domain::audit::{AuditAction, AuditActor, AuditEntry, NotificationRecord};
use leadrobin_core::domain::lead::{Lead, LeadId, LeadStatus, NewLead};
use leadrobin_core::domain::user::UserId;
use leadrobin_db::repositories::{
    AuditLogRepository, LeadRepository, NotificationLogRepository, PoolRepository,
    RepositoryError, UserRepository,
};
use leadrobin_notify::{assignment_notice, LeadNotifier};

use crate::assigner::RoundRobinAssigner;
use crate::errors::EngineError;

/// Orchestrates the lead lifecycle: intake, rotation assignment, the
/// accept/decline protocol, and the audit trail around each transition.
///
/// Every state change follows the same shape. The transition is evaluated
/// against a snapshot, then committed with a guarded update that re-checks
/// the same preconditions inside the store. A commit that matches zero rows
/// means another caller moved the lead first; the losing request gets a
/// rejection or conflict and nothing is written twice.
pub struct LeadService {
    leads: Arc<dyn LeadRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<dyn AuditLogRepository>,
    notifications: Arc<dyn NotificationLogRepository>,
    notifier: Arc<dyn LeadNotifier>,
    assigner: RoundRobinAssigner,
    policy: AcceptancePolicy,
}

/// Result of lead intake. `deduplicated` marks that a stored lead with the
/// same listing reference was returned instead of a new row.
#[derive(Clone, Debug)]
pub struct CreatedLead {
    pub lead: Lead,
    pub assigned_to: Option<UserId>,
    pub deduplicated: bool,
}

/// Where a declined or expired lead ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReassignmentOutcome {
    /// The next seller in rotation took over with a fresh acceptance window.
    Reassigned { from: UserId, to: UserId },
    /// Nobody else was eligible; the lead went back to the unassigned queue.
    Unassigned { from: UserId },
}

impl LeadService {
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        pools: Arc<dyn PoolRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<dyn AuditLogRepository>,
        notifications: Arc<dyn NotificationLogRepository>,
        notifier: Arc<dyn LeadNotifier>,
    ) -> Self {
        let assigner = RoundRobinAssigner::new(pools, users.clone(), leads.clone());
        Self {
            leads,
            users,
            audit,
            notifications,
            notifier,
            assigner,
            policy: AcceptancePolicy::default(),
        }
    }

    /// Replaces the default acceptance windows. Tests shrink them.
    pub fn with_policy(mut self, policy: AcceptancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    pub fn assigner(&self) -> &RoundRobinAssigner {
        &self.assigner
    }

    /// Persists an incoming lead and immediately offers it to the next
    /// seller in the facility's rotation. A lead whose listing reference is
    /// already stored is deduplicated: the stored lead comes back untouched
    /// and no new assignment happens.
    pub async fn create_with_assignment(
        &self,
        data: NewLead,
        actor: AuditActor,
        now: DateTime<Utc>,
    ) -> Result<CreatedLead, EngineError> {
        if let Some(listing) = data.listing_id.as_deref() {
            if let Some(existing) = self.leads.find_by_listing(listing).await? {
                debug!(
                    event_name = "lead.deduplicated",
                    lead_id = %existing.id,
                    listing,
                    "duplicate listing; returning stored lead"
                );
                return Ok(CreatedLead { lead: existing, assigned_to: None, deduplicated: true });
            }
        }

        let lead = Lead::create(data, now);
        match self.leads.create(&lead).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                // Lost an insert race on the listing reference.
                if let Some(listing) = lead.listing_id.as_deref() {
                    if let Some(existing) = self.leads.find_by_listing(listing).await? {
                        return Ok(CreatedLead {
                            lead: existing,
                            assigned_to: None,
                            deduplicated: true,
                        });
                    }
                }
                return Err(EngineError::Conflict { lead: lead.id });
            }
            Err(err) => return Err(err.into()),
        }

        let assigned_to = self.try_assign(&lead, &actor, now).await?;
        let stored = self.require_lead(&lead.id).await?;
        Ok(CreatedLead { lead: stored, assigned_to, deduplicated: false })
    }

    /// Offers a queued lead to the next seller in its facility's rotation.
    /// Returns `None` when the lead carries no facility or nobody in the
    /// pool is eligible; the lead stays queued either way.
    pub async fn assign_to_next(
        &self,
        lead_id: &LeadId,
        actor: AuditActor,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, EngineError> {
        let lead = self.require_lead(lead_id).await?;
        if lead.facility.is_none() {
            return Ok(None);
        }
        let assignable = lead.status == LeadStatus::New
            || (lead.status == LeadStatus::PendingAcceptance && lead.assigned_to.is_none());
        if !assignable {
            return Err(TransitionRejection::NotAssignable { status: lead.status }.into());
        }
        self.try_assign(&lead, &actor, now).await
    }

    /// Marks a pending offer accepted by its assignee and moves the lead to
    /// `contacted`. Safe to race against expiry: exactly one side commits.
    pub async fn accept(
        &self,
        lead_id: &LeadId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let lead = self.require_lead(lead_id).await?;
        evaluate(&lead, &AcceptanceEvent::Accept { actor: actor.clone() }, &self.policy, now)?;

        if !self.leads.commit_acceptance(lead_id, actor, now).await? {
            return Err(self
                .stale_rejection(lead_id, AcceptanceEvent::Accept { actor: actor.clone() }, now)
                .await);
        }

        self.record_audit(
            lead_id,
            AuditActor::User(actor.clone()),
            AuditAction::Accepted,
            Some(actor.0.clone()),
            Some(actor.0.clone()),
            now,
        )
        .await?;
        info!(event_name = "lead.accepted", lead_id = %lead_id, seller_id = %actor, "lead accepted");
        Ok(())
    }

    /// Records a decline by the assignee, then hands the lead straight to
    /// the next seller in rotation with the decliner excluded. With nobody
    /// else eligible the assignment is cleared and the lead re-queued.
    pub async fn decline(
        &self,
        lead_id: &LeadId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentOutcome, EngineError> {
        let lead = self.require_lead(lead_id).await?;
        evaluate(&lead, &AcceptanceEvent::Decline { actor: actor.clone() }, &self.policy, now)?;

        if !self.leads.commit_decline(lead_id, actor, now).await? {
            return Err(self
                .stale_rejection(lead_id, AcceptanceEvent::Decline { actor: actor.clone() }, now)
                .await);
        }

        self.record_audit(
            lead_id,
            AuditActor::User(actor.clone()),
            AuditAction::Declined,
            Some(actor.0.clone()),
            Some(actor.0.clone()),
            now,
        )
        .await?;
        info!(event_name = "lead.declined", lead_id = %lead_id, seller_id = %actor, "lead declined");

        self.hand_off(&lead, actor, actor, AuditActor::User(actor.clone()), now).await
    }

    /// Expires an unanswered offer on behalf of the timeout monitor. The
    /// deadline is re-checked inside the commit, so an offer accepted
    /// between the scan and the write is left alone.
    pub async fn expire(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentOutcome, EngineError> {
        let lead = self.require_lead(lead_id).await?;
        evaluate(&lead, &AcceptanceEvent::Expire, &self.policy, now)?;
        let holder = lead
            .assigned_to
            .clone()
            .ok_or(TransitionRejection::WrongActor { assigned_to: None })?;

        let cutoff = now - self.policy.accept_window;
        if !self.leads.commit_expiry(lead_id, &holder, cutoff, now).await? {
            return Err(self.stale_rejection(lead_id, AcceptanceEvent::Expire, now).await);
        }

        self.record_audit(
            lead_id,
            AuditActor::System,
            AuditAction::Expired,
            Some(holder.0.clone()),
            Some(holder.0.clone()),
            now,
        )
        .await?;
        info!(
            event_name = "lead.expired",
            lead_id = %lead_id,
            seller_id = %holder,
            "offer expired unanswered"
        );

        self.hand_off(&lead, &holder, &holder, AuditActor::System, now).await
    }

    /// Manually moves a pending offer to the next seller in rotation.
    /// `excluded` defaults to the current holder so the rotation cannot
    /// hand the lead straight back.
    pub async fn reassign(
        &self,
        lead_id: &LeadId,
        excluded: Option<&UserId>,
        actor: AuditActor,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentOutcome, EngineError> {
        let lead = self.require_lead(lead_id).await?;
        if lead.status != LeadStatus::PendingAcceptance {
            return Err(TransitionRejection::NotPending { status: lead.status }.into());
        }
        let Some(holder) = lead.assigned_to.clone() else {
            return Err(TransitionRejection::WrongActor { assigned_to: None }.into());
        };

        let skip = excluded.unwrap_or(&holder).clone();
        self.hand_off(&lead, &holder, &skip, actor, now).await
    }

    /// Pending offers whose acceptance deadline is at or before `now`.
    pub async fn overdue_leads(&self, now: DateTime<Utc>) -> Result<Vec<Lead>, EngineError> {
        let cutoff = now - self.policy.accept_window;
        Ok(self.leads.list_pending_expired(cutoff).await?)
    }

    /// Picks the next seller and commits the offer. `None` means the
    /// facility has nobody eligible and the lead stays queued.
    async fn try_assign(
        &self,
        lead: &Lead,
        actor: &AuditActor,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, EngineError> {
        let Some(facility) = lead.facility else {
            return Ok(None);
        };
        let Some(seller) = self.assigner.next_seller(facility).await? else {
            info!(
                event_name = "lead.pool_exhausted",
                lead_id = %lead.id,
                %facility,
                "no eligible sellers; lead stays queued"
            );
            return Ok(None);
        };

        if !self.leads.commit_assignment(&lead.id, &seller, now).await? {
            return Err(self
                .stale_rejection(&lead.id, AcceptanceEvent::Assign { seller }, now)
                .await);
        }

        self.record_audit(
            &lead.id,
            actor.clone(),
            AuditAction::Assigned,
            None,
            Some(seller.0.clone()),
            now,
        )
        .await?;
        info!(
            event_name = "lead.assigned",
            lead_id = %lead.id,
            seller_id = %seller,
            %facility,
            "lead assigned"
        );
        self.dispatch_notice(lead, &seller, now).await;
        Ok(Some(seller))
    }

    /// Moves a lead off `from` after a decline or expiry: onto the next
    /// eligible seller with a fresh acceptance window, or back to the
    /// unassigned queue when the rotation is exhausted.
    async fn hand_off(
        &self,
        lead: &Lead,
        from: &UserId,
        excluded: &UserId,
        actor: AuditActor,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentOutcome, EngineError> {
        let next = match lead.facility {
            Some(facility) => {
                self.assigner.next_seller_excluding(facility, Some(excluded)).await?
            }
            None => None,
        };

        match next {
            Some(to) => {
                if !self.leads.commit_reassignment(&lead.id, from, &to, now).await? {
                    return Err(EngineError::Conflict { lead: lead.id.clone() });
                }
                self.record_audit(
                    &lead.id,
                    actor,
                    AuditAction::Reassigned,
                    Some(from.0.clone()),
                    Some(to.0.clone()),
                    now,
                )
                .await?;
                info!(
                    event_name = "lead.reassigned",
                    lead_id = %lead.id,
                    from = %from,
                    to = %to,
                    "lead reassigned"
                );
                self.dispatch_notice(lead, &to, now).await;
                Ok(ReassignmentOutcome::Reassigned { from: from.clone(), to })
            }
            None => {
                if !self.leads.clear_assignment(&lead.id, from, now).await? {
                    return Err(EngineError::Conflict { lead: lead.id.clone() });
                }
                self.record_audit(
                    &lead.id,
                    actor,
                    AuditAction::Unassigned,
                    Some(from.0.clone()),
                    None,
                    now,
                )
                .await?;
                info!(
                    event_name = "lead.unassigned",
                    lead_id = %lead.id,
                    from = %from,
                    "rotation exhausted; lead returned to the queue"
                );
                Ok(ReassignmentOutcome::Unassigned { from: from.clone() })
            }
        }
    }

    /// Explains a guarded commit that matched no rows. The lead is re-read
    /// so the caller sees the rejection its fresh state produces, or a plain
    /// conflict when the fresh state would still allow the event.
    async fn stale_rejection(
        &self,
        lead_id: &LeadId,
        event: AcceptanceEvent,
        now: DateTime<Utc>,
    ) -> EngineError {
        match self.leads.find_by_id(lead_id).await {
            Ok(Some(fresh)) => match evaluate(&fresh, &event, &self.policy, now) {
                Err(rejection) => {
                    debug!(
                        event_name = "lead.transition_rejected",
                        lead_id = %lead_id,
                        reason = %rejection,
                        "guarded commit lost to a concurrent transition"
                    );
                    EngineError::Rejected(rejection)
                }
                Ok(_) => EngineError::Conflict { lead: lead_id.clone() },
            },
            Ok(None) => EngineError::LeadNotFound(lead_id.clone()),
            Err(err) => EngineError::Store(err),
        }
    }

    /// Sends the assignment email, best effort. Failures are logged and
    /// recorded; they never unwind an assignment that already committed.
    async fn dispatch_notice(&self, lead: &Lead, seller_id: &UserId, assigned_at: DateTime<Utc>) {
        let seller = match self.users.find_by_id(seller_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(
                    event_name = "lead.notice_skipped",
                    lead_id = %lead.id,
                    seller_id = %seller_id,
                    "assignee has no user record; notice skipped"
                );
                return;
            }
            Err(err) => {
                warn!(
                    event_name = "lead.notice_skipped",
                    lead_id = %lead.id,
                    seller_id = %seller_id,
                    error = %err,
                    "could not load assignee; notice skipped"
                );
                return;
            }
        };
        if !seller.email_on_assignment {
            debug!(
                event_name = "lead.notice_skipped",
                lead_id = %lead.id,
                seller_id = %seller_id,
                "assignment notices disabled; nothing sent"
            );
            return;
        }

        let notice = assignment_notice(lead, &seller, &self.policy, assigned_at);
        let outcome = self.notifier.deliver(&notice).await;
        let record = NotificationRecord::record(
            lead.id.clone(),
            seller.id.clone(),
            notice.email_to.clone(),
            notice.subject.clone(),
            outcome.is_ok(),
            outcome.as_ref().err().map(|err| err.to_string()),
            assigned_at,
        );
        if let Err(err) = outcome {
            warn!(
                event_name = "lead.notice_failed",
                lead_id = %lead.id,
                seller_id = %seller_id,
                error = %err,
                "assignment notice failed; continuing"
            );
        }
        if let Err(err) = self.notifications.append_notification(&record).await {
            warn!(
                event_name = "lead.notice_log_failed",
                lead_id = %lead.id,
                error = %err,
                "notification log write failed"
            );
        }
    }

    async fn record_audit(
        &self,
        lead_id: &LeadId,
        actor: AuditActor,
        action: AuditAction,
        from_value: Option<String>,
        to_value: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let entry = AuditEntry::record(lead_id.clone(), actor, action, from_value, to_value, now);
        Ok(self.audit.append(&entry).await?)
    }

    async fn require_lead(&self, lead_id: &LeadId) -> Result<Lead, EngineError> {
        self.leads
            .find_by_id(lead_id)
            .await?
            .ok_or_else(|| EngineError::LeadNotFound(lead_id.clone()))
    }
}
