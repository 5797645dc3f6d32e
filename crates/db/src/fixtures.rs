use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Canonical demo roster and the verification contract it must satisfy.
///
/// The `sellers` list is the rotation the engine should derive for the
/// facility: enabled pool slots held by active accounts, in sort order.
/// `benched` names sellers that hold a pool slot but must never be picked,
/// either because the slot is disabled or the account is deactivated.
const SEED_ROTATIONS: &[SeedRotationContract] = &[
    SeedRotationContract {
        facility: "Falkenberg",
        sellers: &["user-anna", "user-bjorn", "user-cecilia"],
        benched: &[],
        description: "three active sellers, full round-robin",
    },
    SeedRotationContract {
        facility: "Göteborg",
        sellers: &["user-david", "user-elin"],
        benched: &["user-filip"],
        description: "deactivated account still holds an enabled slot",
    },
    SeedRotationContract {
        facility: "Trollhättan",
        sellers: &["user-elin"],
        benched: &["user-david"],
        description: "single active seller plus a disabled slot",
    },
];

const SEED_LEADS: &[SeedLeadContract] = &[
    SeedLeadContract {
        lead_id: "lead-demo-001",
        facility: "Falkenberg",
        status: "pending_acceptance",
        accept_status: Some("pending"),
        assigned_to: Some("user-anna"),
        listing_id: None,
        description: "awaiting acceptance, inside the deadline",
    },
    SeedLeadContract {
        lead_id: "lead-demo-002",
        facility: "Falkenberg",
        status: "new",
        accept_status: None,
        assigned_to: None,
        listing_id: Some("blocket-884213"),
        description: "unassigned marketplace lead with a listing reference",
    },
    SeedLeadContract {
        lead_id: "lead-demo-003",
        facility: "Göteborg",
        status: "contacted",
        accept_status: Some("accepted"),
        assigned_to: Some("user-david"),
        listing_id: None,
        description: "completed acceptance",
    },
];

const SEED_USER_IDS: &[&str] = &[
    "user-sara",
    "user-anna",
    "user-bjorn",
    "user-cecilia",
    "user-david",
    "user-elin",
    "user-filip",
];

const SEED_POOL_ENTRY_IDS: &[&str] = &[
    "pool-falkenberg-1",
    "pool-falkenberg-2",
    "pool-falkenberg-3",
    "pool-goteborg-1",
    "pool-goteborg-2",
    "pool-goteborg-3",
    "pool-trollhattan-1",
    "pool-trollhattan-2",
];

const SEED_LEAD_IDS: &[&str] = &["lead-demo-001", "lead-demo-002", "lead-demo-003"];

const SEED_AUDIT_IDS: &[&str] = &["audit-demo-001", "audit-demo-002", "audit-demo-003"];

const SEED_NOTIFICATION_IDS: &[&str] = &["notice-demo-001"];

const SEED_HISTORY_IDS: &[&str] = &["history-demo-001"];

/// Deterministic roster fixture for demos, local development, and
/// end-to-end tests. Loading is idempotent; every statement is an upsert.
pub struct RosterSeedDataset;

impl RosterSeedDataset {
    /// SQL fixture content for the demo roster.
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_roster.sql");

    /// Load the demo roster into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let rotations_seeded = SEED_ROTATIONS
            .iter()
            .map(|rotation| RotationSeedInfo {
                facility: rotation.facility,
                seller_count: rotation.sellers.len(),
                description: rotation.description,
            })
            .collect::<Vec<_>>();

        let leads_seeded = SEED_LEADS
            .iter()
            .map(|lead| LeadSeedInfo {
                lead_id: lead.lead_id,
                facility: lead.facility,
                description: lead.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { rotations_seeded, leads_seeded })
    }

    /// Verify that the seeded data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_users = sql_array_from_ids(SEED_USER_IDS);
        let expected_user_total = SEED_USER_IDS.len() as i64;
        let existing_user_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM users WHERE id IN {quoted_users}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("seed-users", existing_user_count == expected_user_total));

        let manager_exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = 'user-sara' AND role = 'manager' AND is_active = 1)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("seed-manager", manager_exists == 1));

        for rotation in SEED_ROTATIONS {
            checks.push((rotation.rotation_label(), Self::verify_rotation(pool, rotation).await?));
            checks.push((rotation.benched_label(), Self::verify_benched(pool, rotation).await?));
        }

        for lead in SEED_LEADS {
            checks.push((lead.lead_id, Self::verify_lead(pool, lead).await?));
        }

        let quoted_audits = sql_array_from_ids(SEED_AUDIT_IDS);
        let expected_audit_total = SEED_AUDIT_IDS.len() as i64;
        let existing_audit_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM lead_audit_log WHERE id IN {quoted_audits}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("seed-audit-entries", existing_audit_count == expected_audit_total));

        let notice_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM notification_log WHERE id = 'notice-demo-001' AND lead_id = 'lead-demo-001' AND user_id = 'user-anna' AND success = 1)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("seed-assignment-notice", notice_ok == 1));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// The rotation a facility derives: enabled slots, active accounts,
    /// sort order ascending.
    async fn verify_rotation(
        pool: &DbPool,
        rotation: &SeedRotationContract,
    ) -> Result<bool, RepositoryError> {
        let sellers: Vec<String> = sqlx::query_scalar(
            "SELECT sp.seller_id
             FROM seller_pool sp
             JOIN users u ON u.id = sp.seller_id
             WHERE sp.facility = ?1 AND sp.enabled = 1 AND u.is_active = 1
             ORDER BY sp.sort_order ASC, sp.seller_id ASC",
        )
        .bind(rotation.facility)
        .fetch_all(pool)
        .await?;
        Ok(string_list_matches(&sellers, rotation.sellers))
    }

    /// Benched sellers still hold a pool slot, but the slot is disabled or
    /// the account is deactivated.
    async fn verify_benched(
        pool: &DbPool,
        rotation: &SeedRotationContract,
    ) -> Result<bool, RepositoryError> {
        for seller_id in rotation.benched {
            let holds_slot: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM seller_pool WHERE facility = ?1 AND seller_id = ?2)",
            )
            .bind(rotation.facility)
            .bind(seller_id)
            .fetch_one(pool)
            .await?;
            if holds_slot != 1 {
                return Ok(false);
            }

            let eligible: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM seller_pool sp
                     JOIN users u ON u.id = sp.seller_id
                     WHERE sp.facility = ?1 AND sp.seller_id = ?2
                       AND sp.enabled = 1 AND u.is_active = 1
                 )",
            )
            .bind(rotation.facility)
            .bind(seller_id)
            .fetch_one(pool)
            .await?;
            if eligible != 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn verify_lead(
        pool: &DbPool,
        lead: &SeedLeadContract,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<String>)>(
            "SELECT facility, status, accept_status, assigned_to, listing_id
             FROM leads WHERE id = ?1",
        )
        .bind(lead.lead_id)
        .fetch_optional(pool)
        .await?;

        let Some((facility, status, accept_status, assigned_to, listing_id)) = row else {
            return Ok(false);
        };
        Ok(facility == lead.facility
            && status == lead.status
            && accept_status.as_deref() == lead.accept_status
            && assigned_to.as_deref() == lead.assigned_to
            && listing_id.as_deref() == lead.listing_id)
    }

    /// Remove the seeded fixture rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_notices = sql_array_from_ids(SEED_NOTIFICATION_IDS);
        let quoted_audits = sql_array_from_ids(SEED_AUDIT_IDS);
        let quoted_leads = sql_array_from_ids(SEED_LEAD_IDS);
        let quoted_history = sql_array_from_ids(SEED_HISTORY_IDS);
        let quoted_pool_entries = sql_array_from_ids(SEED_POOL_ENTRY_IDS);
        let quoted_users = sql_array_from_ids(SEED_USER_IDS);

        sqlx::query(&format!("DELETE FROM notification_log WHERE id IN {quoted_notices}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM lead_audit_log WHERE id IN {quoted_audits}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM leads WHERE id IN {quoted_leads}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM pool_status_history WHERE id IN {quoted_history}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM seller_pool WHERE id IN {quoted_pool_entries}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM users WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRotationContract {
    facility: &'static str,
    sellers: &'static [&'static str],
    benched: &'static [&'static str],
    description: &'static str,
}

impl SeedRotationContract {
    fn rotation_label(&self) -> &'static str {
        match self.facility {
            "Falkenberg" => "falkenberg-rotation",
            "Göteborg" => "goteborg-rotation",
            _ => "trollhattan-rotation",
        }
    }

    fn benched_label(&self) -> &'static str {
        match self.facility {
            "Falkenberg" => "falkenberg-benched",
            "Göteborg" => "goteborg-benched",
            _ => "trollhattan-benched",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedLeadContract {
    lead_id: &'static str,
    facility: &'static str,
    status: &'static str,
    accept_status: Option<&'static str>,
    assigned_to: Option<&'static str>,
    listing_id: Option<&'static str>,
    description: &'static str,
}

fn string_list_matches(actual: &[String], expected: &[&str]) -> bool {
    actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, b)| a == b)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub rotations_seeded: Vec<RotationSeedInfo>,
    pub leads_seeded: Vec<LeadSeedInfo>,
}

#[derive(Debug)]
pub struct RotationSeedInfo {
    pub facility: &'static str,
    pub seller_count: usize,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct LeadSeedInfo {
    pub lead_id: &'static str,
    pub facility: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!RosterSeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        let first = RosterSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            RosterSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "checks: {:?}", first_verification.checks);
        assert_eq!(first.rotations_seeded.len(), 3);
        assert_eq!(first.leads_seeded.len(), 3);

        let second = RosterSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            RosterSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(second.rotations_seeded.len(), 3);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_every_seeded_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        RosterSeedDataset::load(&pool).await.expect("load seed fixtures");
        RosterSeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let remaining_users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
            .fetch_one(&pool)
            .await
            .expect("count users");
        assert_eq!(remaining_users, 0);

        let remaining_leads: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM leads")
            .fetch_one(&pool)
            .await
            .expect("count leads");
        assert_eq!(remaining_leads, 0);

        let verification = RosterSeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
    }

    #[tokio::test]
    async fn benched_sellers_never_enter_the_derived_rotation() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        RosterSeedDataset::load(&pool).await.expect("load seed fixtures");

        let goteborg_rotation: Vec<String> = sqlx::query_scalar(
            "SELECT sp.seller_id FROM seller_pool sp
             JOIN users u ON u.id = sp.seller_id
             WHERE sp.facility = 'Göteborg' AND sp.enabled = 1 AND u.is_active = 1
             ORDER BY sp.sort_order",
        )
        .fetch_all(&pool)
        .await
        .expect("query Göteborg rotation");
        assert_eq!(goteborg_rotation, vec!["user-david", "user-elin"]);

        let trollhattan_rotation: Vec<String> = sqlx::query_scalar(
            "SELECT sp.seller_id FROM seller_pool sp
             JOIN users u ON u.id = sp.seller_id
             WHERE sp.facility = 'Trollhättan' AND sp.enabled = 1 AND u.is_active = 1
             ORDER BY sp.sort_order",
        )
        .fetch_all(&pool)
        .await
        .expect("query Trollhättan rotation");
        assert_eq!(trollhattan_rotation, vec!["user-elin"]);
    }

    #[test]
    fn seed_contract_json_matches_rust_seed_constants() {
        let contract: serde_json::Value = serde_json::from_str(include_str!(
            "../../../config/fixtures/seed_roster_contract.json"
        ))
        .expect("seed roster contract JSON must parse");

        assert_eq!(contract["dataset_version"].as_str(), Some("roster-2026.02"));
        assert_eq!(contract["seed_dataset"].as_str(), Some("deterministic_demo_roster"));

        let contract_rotations =
            contract["rotations"].as_array().expect("rotations should be an array");
        assert_eq!(contract_rotations.len(), SEED_ROTATIONS.len());

        for rotation in SEED_ROTATIONS {
            let contract_rotation = contract_rotations
                .iter()
                .find(|candidate| candidate["facility"].as_str() == Some(rotation.facility))
                .expect("contract should include every seeded facility");

            assert_eq!(
                contract_rotation["sellers"]
                    .as_array()
                    .expect("sellers should be an array")
                    .iter()
                    .map(|value| value.as_str().unwrap_or_default())
                    .collect::<Vec<_>>(),
                rotation.sellers
            );
            assert_eq!(
                contract_rotation["benched"]
                    .as_array()
                    .expect("benched should be an array")
                    .iter()
                    .map(|value| value.as_str().unwrap_or_default())
                    .collect::<Vec<_>>(),
                rotation.benched
            );
        }

        let contract_leads = contract["leads"].as_array().expect("leads should be an array");
        assert_eq!(contract_leads.len(), SEED_LEADS.len());

        for lead in SEED_LEADS {
            let contract_lead = contract_leads
                .iter()
                .find(|candidate| candidate["lead_id"].as_str() == Some(lead.lead_id))
                .expect("contract should include every seeded lead");

            assert_eq!(contract_lead["facility"].as_str(), Some(lead.facility));
            assert_eq!(contract_lead["status"].as_str(), Some(lead.status));
            assert_eq!(contract_lead["accept_status"].as_str(), lead.accept_status);
            assert_eq!(contract_lead["assigned_to"].as_str(), lead.assigned_to);
            assert_eq!(contract_lead["listing_id"].as_str(), lead.listing_id);
        }
    }
}
