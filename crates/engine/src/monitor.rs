use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::{LeadService, ReassignmentOutcome};

/// Counters from one expiry sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub reassigned: usize,
    pub unassigned: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Background worker that expires offers whose acceptance deadline has
/// passed. Each sweep re-derives the overdue set from storage, so a process
/// restart resumes exactly where the previous one left off and deadlines
/// that elapsed during the downtime are handled on the first tick.
pub struct AcceptanceMonitor {
    service: Arc<LeadService>,
    scan_interval: Duration,
}

impl AcceptanceMonitor {
    pub fn new(service: Arc<LeadService>, scan_interval: Duration) -> Self {
        Self { service, scan_interval }
    }

    /// One sweep over the overdue offers. Leads are handled one at a time:
    /// a storage failure or a lost race on one lead never stops the rest.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> ScanSummary {
        let overdue = match self.service.overdue_leads(now).await {
            Ok(leads) => leads,
            Err(error) => {
                warn!(
                    event_name = "monitor.scan_failed",
                    error = %error,
                    "overdue scan failed; retrying next tick"
                );
                return ScanSummary::default();
            }
        };

        let mut summary = ScanSummary { scanned: overdue.len(), ..ScanSummary::default() };
        for lead in &overdue {
            match self.service.expire(&lead.id, now).await {
                Ok(ReassignmentOutcome::Reassigned { .. }) => summary.reassigned += 1,
                Ok(ReassignmentOutcome::Unassigned { .. }) => summary.unassigned += 1,
                Err(error) if error.is_rejection() => {
                    debug!(
                        event_name = "monitor.expiry_skipped",
                        lead_id = %lead.id,
                        reason = %error,
                        "expiry skipped; lead moved first"
                    );
                    summary.skipped += 1;
                }
                Err(error) => {
                    warn!(
                        event_name = "monitor.expiry_failed",
                        lead_id = %lead.id,
                        error = %error,
                        "expiry failed; continuing sweep"
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.scanned > 0 {
            info!(
                event_name = "monitor.scan_completed",
                scanned = summary.scanned,
                reassigned = summary.reassigned,
                unassigned = summary.unassigned,
                skipped = summary.skipped,
                failed = summary.failed,
                "expiry sweep finished"
            );
        }
        summary
    }

    /// Starts the periodic sweep on the current runtime. The first sweep
    /// runs immediately.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.scan_interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!(event_name = "monitor.stopped", "acceptance monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.scan_once(Utc::now()).await;
                    }
                }
            }
        });
        MonitorHandle { shutdown: Some(shutdown_tx), task }
    }
}

/// Owner's handle to a running monitor. Dropping it without calling
/// [`MonitorHandle::stop`] also ends the loop, since the shutdown channel
/// closes either way.
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signals the loop and waits for the in-flight sweep to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = self.task.await {
            warn!(
                event_name = "monitor.task_failed",
                error = %error,
                "acceptance monitor task ended abnormally"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use leadrobin_core::domain::audit::{AuditAction, AuditActor};
    use leadrobin_core::domain::facility::Facility;
    use leadrobin_core::domain::lead::{Lead, LeadId, LeadSource, LeadStatus, NewLead};
    use leadrobin_core::domain::pool::PoolEntry;
    use leadrobin_core::domain::user::{Role, User, UserId};
    use leadrobin_db::repositories::{
        AuditLogRepository, InMemoryAuditLogRepository, InMemoryLeadRepository,
        InMemoryPoolRepository, InMemoryUserRepository, LeadRepository, PoolRepository,
        RepositoryError, UserRepository,
    };
    use leadrobin_notify::NoopNotifier;

    use super::{AcceptanceMonitor, ScanSummary};
    use crate::service::LeadService;

    /// Delegates to the in-memory store, with two knobs for simulating what
    /// a sweep can run into: a lead whose expiry commit fails, and a stale
    /// scan result for a lead that already moved on.
    #[derive(Default)]
    struct ScriptedLeads {
        inner: InMemoryLeadRepository,
        fail_expiry_for: StdMutex<Option<LeadId>>,
        ghost_in_scan: StdMutex<Option<Lead>>,
    }

    impl ScriptedLeads {
        fn fail_expiry_for(&self, id: &LeadId) {
            *self.fail_expiry_for.lock().expect("lock") = Some(id.clone());
        }

        fn ghost_in_scan(&self, lead: Lead) {
            *self.ghost_in_scan.lock().expect("lock") = Some(lead);
        }
    }

    #[async_trait]
    impl LeadRepository for ScriptedLeads {
        async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_listing(
            &self,
            listing_id: &str,
        ) -> Result<Option<Lead>, RepositoryError> {
            self.inner.find_by_listing(listing_id).await
        }

        async fn create(&self, lead: &Lead) -> Result<(), RepositoryError> {
            self.inner.create(lead).await
        }

        async fn list_by_status(
            &self,
            status: LeadStatus,
        ) -> Result<Vec<Lead>, RepositoryError> {
            self.inner.list_by_status(status).await
        }

        async fn latest_assignee(
            &self,
            facility: Facility,
            sellers: &[UserId],
        ) -> Result<Option<UserId>, RepositoryError> {
            self.inner.latest_assignee(facility, sellers).await
        }

        async fn list_pending_expired(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<Lead>, RepositoryError> {
            let mut leads = self.inner.list_pending_expired(cutoff).await?;
            if let Some(ghost) = self.ghost_in_scan.lock().expect("lock").clone() {
                leads.push(ghost);
            }
            Ok(leads)
        }

        async fn commit_assignment(
            &self,
            id: &LeadId,
            seller: &UserId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.commit_assignment(id, seller, now).await
        }

        async fn commit_reassignment(
            &self,
            id: &LeadId,
            from: &UserId,
            to: &UserId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.commit_reassignment(id, from, to, now).await
        }

        async fn commit_acceptance(
            &self,
            id: &LeadId,
            seller: &UserId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.commit_acceptance(id, seller, now).await
        }

        async fn commit_decline(
            &self,
            id: &LeadId,
            seller: &UserId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.commit_decline(id, seller, now).await
        }

        async fn commit_expiry(
            &self,
            id: &LeadId,
            seller: &UserId,
            cutoff: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            if self.fail_expiry_for.lock().expect("lock").as_ref() == Some(id) {
                return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.commit_expiry(id, seller, cutoff, now).await
        }

        async fn clear_assignment(
            &self,
            id: &LeadId,
            from: &UserId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.clear_assignment(id, from, now).await
        }

        async fn commit_status(
            &self,
            id: &LeadId,
            from: LeadStatus,
            to: LeadStatus,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.commit_status(id, from, to, now).await
        }
    }

    struct Rig {
        service: Arc<LeadService>,
        scripted: Arc<ScriptedLeads>,
        log: Arc<InMemoryAuditLogRepository>,
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-03T06:00:00+00:00")
            .expect("valid rfc3339")
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    async fn rig_with_sellers(sellers: &[(&str, i64)]) -> Rig {
        let scripted = Arc::new(ScriptedLeads::default());
        let pools = Arc::new(InMemoryPoolRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let log = Arc::new(InMemoryAuditLogRepository::default());

        for (id, order) in sellers {
            let seller = UserId(id.to_string());
            users
                .save(&User {
                    id: seller.clone(),
                    first_name: id.to_string(),
                    last_name: "Testsson".to_string(),
                    email: format!("{id}@bilhuset.se"),
                    role: Role::Seller,
                    is_active: true,
                    email_on_assignment: true,
                    created_at: at(0),
                    updated_at: at(0),
                })
                .await
                .expect("save user");
            pools
                .save(&PoolEntry::new(seller, Facility::Falkenberg, *order, at(0)))
                .await
                .expect("save pool entry");
        }

        let service = Arc::new(LeadService::new(
            scripted.clone(),
            pools,
            users,
            log.clone(),
            log.clone(),
            Arc::new(NoopNotifier),
        ));
        Rig { service, scripted, log }
    }

    async fn intake_at(rig: &Rig, now: DateTime<Utc>) -> LeadId {
        let created = rig
            .service
            .create_with_assignment(
                NewLead {
                    facility: Some(Facility::Falkenberg),
                    source: LeadSource::WebForm,
                    contact_name: "Erik Nilsson".to_string(),
                    contact_email: None,
                    contact_phone: None,
                    subject: "Begagnad V60".to_string(),
                    message: None,
                    listing_id: None,
                },
                AuditActor::System,
                now,
            )
            .await
            .expect("intake");
        assert!(created.assigned_to.is_some());
        created.lead.id
    }

    #[tokio::test]
    async fn sweep_expires_only_offers_past_their_deadline() {
        let rig = rig_with_sellers(&[("seller-a", 1), ("seller-b", 2)]).await;

        let stale = intake_at(&rig, at(0)).await;
        let fresh = intake_at(&rig, at(11 * 60)).await;

        let monitor = AcceptanceMonitor::new(rig.service.clone(), StdDuration::from_secs(60));
        let summary = monitor.scan_once(at(12 * 60)).await;

        assert_eq!(
            summary,
            ScanSummary { scanned: 1, reassigned: 1, ..ScanSummary::default() },
        );
        let stale_actions: Vec<_> = rig
            .log
            .list_for_lead(&stale)
            .await
            .expect("audit trail")
            .iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(
            stale_actions,
            vec![AuditAction::Assigned, AuditAction::Expired, AuditAction::Reassigned],
        );
        assert!(rig
            .log
            .list_for_lead(&fresh)
            .await
            .expect("audit trail")
            .iter()
            .all(|entry| entry.action == AuditAction::Assigned));
    }

    #[tokio::test]
    async fn exhausted_rotation_requeues_instead_of_reassigning() {
        let rig = rig_with_sellers(&[("seller-solo", 1)]).await;
        let lead = intake_at(&rig, at(0)).await;

        let monitor = AcceptanceMonitor::new(rig.service.clone(), StdDuration::from_secs(60));
        let summary = monitor.scan_once(at(13 * 60)).await;

        assert_eq!(
            summary,
            ScanSummary { scanned: 1, unassigned: 1, ..ScanSummary::default() },
        );
        let stored = rig.scripted.find_by_id(&lead).await.expect("reload").expect("lead");
        assert_eq!(stored.status, LeadStatus::New);
        assert_eq!(stored.assigned_to, None);
    }

    #[tokio::test]
    async fn one_broken_lead_never_stops_the_sweep() {
        let rig = rig_with_sellers(&[("seller-a", 1), ("seller-b", 2)]).await;

        let poisoned = intake_at(&rig, at(0)).await;
        let healthy = intake_at(&rig, at(1)).await;
        rig.scripted.fail_expiry_for(&poisoned);

        let monitor = AcceptanceMonitor::new(rig.service.clone(), StdDuration::from_secs(60));
        let summary = monitor.scan_once(at(13 * 60)).await;

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.reassigned, 1);
        let stored = rig.scripted.find_by_id(&healthy).await.expect("reload").expect("lead");
        assert_ne!(
            stored.assigned_to,
            Some(UserId("seller-b".to_string())),
            "the healthy lead moved off its original holder",
        );
    }

    #[tokio::test]
    async fn offers_that_moved_before_the_commit_are_skipped() {
        let rig = rig_with_sellers(&[("seller-a", 1), ("seller-b", 2)]).await;

        let lead = intake_at(&rig, at(0)).await;
        let snapshot = rig.scripted.find_by_id(&lead).await.expect("reload").expect("lead");
        rig.service.accept(&lead, &UserId("seller-a".to_string()), at(60)).await.expect("accept");
        // The scan sees a snapshot taken before the acceptance landed.
        rig.scripted.ghost_in_scan(snapshot);

        let monitor = AcceptanceMonitor::new(rig.service.clone(), StdDuration::from_secs(60));
        let summary = monitor.scan_once(at(13 * 60)).await;

        assert_eq!(
            summary,
            ScanSummary { scanned: 1, skipped: 1, ..ScanSummary::default() },
        );
        let expired = rig
            .log
            .list_for_lead(&lead)
            .await
            .expect("audit trail")
            .iter()
            .filter(|entry| entry.action == AuditAction::Expired)
            .count();
        assert_eq!(expired, 0, "an accepted offer never gains an expiry entry");
    }

    #[tokio::test]
    async fn spawned_monitor_sweeps_until_stopped() {
        let rig = rig_with_sellers(&[("seller-a", 1), ("seller-b", 2)]).await;
        let assigned_at = Utc::now() - Duration::hours(13);
        let lead = intake_at(&rig, assigned_at).await;

        let monitor = AcceptanceMonitor::new(rig.service.clone(), StdDuration::from_millis(10));
        let handle = monitor.spawn();
        tokio::time::sleep(StdDuration::from_millis(80)).await;
        handle.stop().await;

        let stored = rig.scripted.find_by_id(&lead).await.expect("reload").expect("lead");
        assert_eq!(
            stored.assigned_to,
            Some(UserId("seller-b".to_string())),
            "the first tick expired the overdue offer and rotation moved on",
        );
    }
}
