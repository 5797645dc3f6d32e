//! End-to-end lead flows over real sqlite storage: rotation under declines,
//! the accept/expire race in both orders and concurrently, and pool
//! exhaustion.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use leadrobin_core::acceptance::TransitionRejection;
use leadrobin_core::domain::audit::{AuditAction, AuditActor};
use leadrobin_core::domain::facility::Facility;
use leadrobin_core::domain::lead::{AcceptStatus, LeadId, LeadSource, LeadStatus, NewLead};
use leadrobin_core::domain::pool::PoolEntry;
use leadrobin_core::domain::user::{Role, User, UserId};
use leadrobin_db::repositories::{
    AuditLogRepository, LeadRepository, PoolRepository, SqlAuditLogRepository,
    SqlLeadRepository, SqlPoolRepository, SqlUserRepository, UserRepository,
};
use leadrobin_db::{connect_with_settings, migrations, DbPool};
use leadrobin_engine::{EngineError, LeadService, ReassignmentOutcome};
use leadrobin_notify::RecordingNotifier;

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}

fn seller(id: &str) -> UserId {
    UserId(id.to_string())
}

fn web_lead(facility: Facility, subject: &str) -> NewLead {
    NewLead {
        facility: Some(facility),
        source: LeadSource::WebForm,
        contact_name: "Maria Johansson".to_string(),
        contact_email: Some("maria.johansson@example.se".to_string()),
        contact_phone: None,
        subject: subject.to_string(),
        message: None,
        listing_id: None,
    }
}

async fn setup_pool() -> DbPool {
    // One connection keeps the private in-memory database alive for the
    // whole test.
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

async fn seed_roster(pool: &DbPool, facility: Facility, sellers: &[(&str, i64, bool)]) {
    let users = SqlUserRepository::new(pool.clone());
    let pools = SqlPoolRepository::new(pool.clone());
    let t0 = parse_ts("2026-03-05T07:00:00+00:00");

    for (id, order, enabled) in sellers {
        users
            .save(&User {
                id: seller(id),
                first_name: id.to_string(),
                last_name: "Testsson".to_string(),
                email: format!("{id}@bilhuset.se"),
                role: Role::Seller,
                is_active: true,
                email_on_assignment: true,
                created_at: t0,
                updated_at: t0,
            })
            .await
            .expect("save user");
        let mut entry = PoolEntry::new(seller(id), facility, *order, t0);
        entry.enabled = *enabled;
        pools.save(&entry).await.expect("save pool entry");
    }
}

fn service_over(pool: &DbPool) -> (LeadService, Arc<SqlAuditLogRepository>) {
    let log = Arc::new(SqlAuditLogRepository::new(pool.clone()));
    let service = LeadService::new(
        Arc::new(SqlLeadRepository::new(pool.clone())),
        Arc::new(SqlPoolRepository::new(pool.clone())),
        Arc::new(SqlUserRepository::new(pool.clone())),
        log.clone(),
        log.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    (service, log)
}

async fn audit_actions(log: &SqlAuditLogRepository, lead: &LeadId) -> Vec<AuditAction> {
    log.list_for_lead(lead)
        .await
        .expect("audit trail")
        .iter()
        .map(|entry| entry.action)
        .collect()
}

#[tokio::test]
async fn consecutive_declines_walk_the_rotation_without_bouncing_back() {
    let pool = setup_pool().await;
    seed_roster(
        &pool,
        Facility::Falkenberg,
        &[("flow-anna", 1, true), ("flow-bjorn", 2, true), ("flow-cecilia", 3, false)],
    )
    .await;
    let (service, log) = service_over(&pool);

    let t0 = parse_ts("2026-03-05T08:00:00+00:00");
    let created = service
        .create_with_assignment(
            web_lead(Facility::Falkenberg, "Provkörning XC40"),
            AuditActor::System,
            t0,
        )
        .await
        .expect("intake");
    let lead_id = created.lead.id.clone();
    assert_eq!(created.assigned_to, Some(seller("flow-anna")));

    let first = service
        .decline(&lead_id, &seller("flow-anna"), t0 + Duration::hours(1))
        .await
        .expect("first decline");
    assert_eq!(
        first,
        ReassignmentOutcome::Reassigned { from: seller("flow-anna"), to: seller("flow-bjorn") },
        "the disabled third slot is skipped",
    );

    let second = service
        .decline(&lead_id, &seller("flow-bjorn"), t0 + Duration::hours(2))
        .await
        .expect("second decline");
    assert_eq!(
        second,
        ReassignmentOutcome::Reassigned { from: seller("flow-bjorn"), to: seller("flow-anna") },
        "wrap-around may revisit an earlier decliner, never the current one",
    );

    assert_eq!(
        audit_actions(&log, &lead_id).await,
        vec![
            AuditAction::Assigned,
            AuditAction::Declined,
            AuditAction::Reassigned,
            AuditAction::Declined,
            AuditAction::Reassigned,
        ],
    );

    pool.close().await;
}

#[tokio::test]
async fn acceptance_that_lands_first_blocks_the_expiry() {
    let pool = setup_pool().await;
    seed_roster(&pool, Facility::Goteborg, &[("race-dag", 1, true), ("race-eva", 2, true)])
        .await;
    let (service, log) = service_over(&pool);

    let t0 = parse_ts("2026-03-05T09:00:00+00:00");
    let created = service
        .create_with_assignment(web_lead(Facility::Goteborg, "V60 recharge"), AuditActor::System, t0)
        .await
        .expect("intake");
    let lead_id = created.lead.id.clone();
    let holder = created.assigned_to.clone().expect("assigned");

    service.accept(&lead_id, &holder, t0 + Duration::hours(1)).await.expect("accept");
    let error = service
        .expire(&lead_id, t0 + Duration::hours(13))
        .await
        .expect_err("nothing left to expire");

    assert!(matches!(
        error,
        EngineError::Rejected(TransitionRejection::NotPending { status: LeadStatus::Contacted }),
    ));
    assert_eq!(
        audit_actions(&log, &lead_id).await,
        vec![AuditAction::Assigned, AuditAction::Accepted],
        "the losing side leaves no trace",
    );

    pool.close().await;
}

#[tokio::test]
async fn expiry_that_lands_first_blocks_the_acceptance() {
    let pool = setup_pool().await;
    seed_roster(
        &pool,
        Facility::Trollhattan,
        &[("race-frida", 1, true), ("race-gustav", 2, true)],
    )
    .await;
    let (service, log) = service_over(&pool);

    let t0 = parse_ts("2026-03-05T10:00:00+00:00");
    let created = service
        .create_with_assignment(
            web_lead(Facility::Trollhattan, "Inbyte av Passat"),
            AuditActor::System,
            t0,
        )
        .await
        .expect("intake");
    let lead_id = created.lead.id.clone();
    assert_eq!(created.assigned_to, Some(seller("race-frida")));

    // The deadline is inclusive: exactly twelve hours after assignment the
    // offer is expirable.
    let outcome = service.expire(&lead_id, t0 + Duration::hours(12)).await.expect("expiry");
    assert_eq!(
        outcome,
        ReassignmentOutcome::Reassigned { from: seller("race-frida"), to: seller("race-gustav") },
    );

    let error = service
        .accept(&lead_id, &seller("race-frida"), t0 + Duration::hours(12) + Duration::minutes(1))
        .await
        .expect_err("offer already moved on");
    assert!(matches!(error, EngineError::Rejected(TransitionRejection::WrongActor { .. })));

    let actions = audit_actions(&log, &lead_id).await;
    assert_eq!(
        actions,
        vec![AuditAction::Assigned, AuditAction::Expired, AuditAction::Reassigned],
    );
    assert_eq!(
        actions.iter().filter(|action| **action == AuditAction::Expired).count(),
        1,
        "exactly one expiry entry regardless of the race",
    );

    pool.close().await;
}

#[tokio::test]
async fn concurrent_accept_and_expiry_elect_exactly_one_winner() {
    let pool = setup_pool().await;
    seed_roster(&pool, Facility::Falkenberg, &[("race-ivar", 1, true), ("race-johanna", 2, true)])
        .await;
    let (service, log) = service_over(&pool);
    let service = Arc::new(service);

    let t0 = parse_ts("2026-03-05T12:00:00+00:00");
    let created = service
        .create_with_assignment(
            web_lead(Facility::Falkenberg, "Kombi med dragkrok"),
            AuditActor::System,
            t0,
        )
        .await
        .expect("intake");
    let lead_id = created.lead.id.clone();
    let holder = created.assigned_to.clone().expect("assigned");

    // At the deadline itself both transitions are legal, so whichever
    // guarded update lands first decides the lead.
    let deadline = t0 + Duration::hours(12);
    let accepting = tokio::spawn({
        let service = service.clone();
        let lead_id = lead_id.clone();
        let holder = holder.clone();
        async move { service.accept(&lead_id, &holder, deadline).await }
    });
    let expiring = tokio::spawn({
        let service = service.clone();
        let lead_id = lead_id.clone();
        async move { service.expire(&lead_id, deadline).await }
    });

    let accepted = accepting.await.expect("accept task");
    let expired = expiring.await.expect("expire task");
    assert!(
        accepted.is_ok() != expired.is_ok(),
        "exactly one side commits, got accept {accepted:?} and expire {expired:?}",
    );

    let leads = SqlLeadRepository::new(pool.clone());
    let stored = leads.find_by_id(&lead_id).await.expect("reload").expect("lead exists");
    let actions = audit_actions(&log, &lead_id).await;
    if accepted.is_ok() {
        let error = expired.expect_err("expiry side lost");
        assert!(error.is_rejection(), "the loser sees a rejection, not a storage error: {error}");
        assert_eq!(stored.status, LeadStatus::Contacted);
        assert_eq!(stored.accept_status, Some(AcceptStatus::Accepted));
        assert_eq!(stored.assigned_to, Some(holder));
        assert_eq!(actions, vec![AuditAction::Assigned, AuditAction::Accepted]);
    } else {
        let error = accepted.expect_err("accept side lost");
        assert!(error.is_rejection(), "the loser sees a rejection, not a storage error: {error}");
        assert_eq!(
            expired.expect("expiry side won"),
            ReassignmentOutcome::Reassigned { from: holder, to: seller("race-johanna") },
        );
        assert_eq!(stored.status, LeadStatus::PendingAcceptance);
        assert_eq!(stored.accept_status, Some(AcceptStatus::Pending));
        assert_eq!(stored.assigned_to, Some(seller("race-johanna")));
        assert_eq!(stored.assigned_at, Some(deadline), "the new holder gets a fresh window");
        assert_eq!(
            actions,
            vec![AuditAction::Assigned, AuditAction::Expired, AuditAction::Reassigned],
        );
    }

    pool.close().await;
}

#[tokio::test]
async fn exhausted_rotation_returns_the_lead_to_the_queue() {
    let pool = setup_pool().await;
    seed_roster(&pool, Facility::Goteborg, &[("solo-hanna", 1, true)]).await;
    let (service, log) = service_over(&pool);

    let t0 = parse_ts("2026-03-05T11:00:00+00:00");
    let created = service
        .create_with_assignment(web_lead(Facility::Goteborg, "XC90 leasing"), AuditActor::System, t0)
        .await
        .expect("intake");
    let lead_id = created.lead.id.clone();

    let outcome = service
        .decline(&lead_id, &seller("solo-hanna"), t0 + Duration::hours(2))
        .await
        .expect("decline");
    assert_eq!(outcome, ReassignmentOutcome::Unassigned { from: seller("solo-hanna") });

    let leads = SqlLeadRepository::new(pool.clone());
    let stored = leads.find_by_id(&lead_id).await.expect("reload").expect("lead exists");
    assert_eq!(stored.status, LeadStatus::New);
    assert_eq!(stored.assigned_to, None);
    assert_eq!(stored.assigned_at, None);
    assert_eq!(stored.accept_status, None);

    assert_eq!(
        audit_actions(&log, &lead_id).await,
        vec![AuditAction::Assigned, AuditAction::Declined, AuditAction::Unassigned],
    );

    pool.close().await;
}
