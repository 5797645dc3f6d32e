use crate::commands::CommandResult;
use leadrobin_core::config::{AppConfig, LoadOptions};
use leadrobin_db::{connect_with_settings, migrations, RosterSeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        // Load the demo roster: three facility rotations and three leads.
        let seed_result = RosterSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        // Verify the seed data was loaded
        let verification = RosterSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, (&'static str, String, u8)> =
            if !verification.all_present {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                let message = if failed_checks.is_empty() {
                    "Some seed data failed to load".to_string()
                } else {
                    format!("Seed verification failed for checks: {}", failed_checks.join(", "))
                };
                Err(("seed_verification", message, 6u8))
            } else {
                Ok(SeedOutput {
                    rotations: seed_result.rotations_seeded,
                    leads: seed_result.leads_seeded,
                })
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let rotation_lines: Vec<String> = output
                .rotations
                .iter()
                .map(|r| format!("  - {}: {} sellers ({})", r.facility, r.seller_count, r.description))
                .collect();
            let lead_lines: Vec<String> = output
                .leads
                .iter()
                .map(|l| format!("  - {}: {} ({})", l.lead_id, l.facility, l.description))
                .collect();
            let message = format!(
                "demo roster loaded: {} facility rotations and {} leads\n{}\n{}",
                output.rotations.len(),
                output.leads.len(),
                rotation_lines.join("\n"),
                lead_lines.join("\n"),
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    rotations: Vec<leadrobin_db::RotationSeedInfo>,
    leads: Vec<leadrobin_db::LeadSeedInfo>,
}
