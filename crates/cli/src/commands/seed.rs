use partnerline_db::{connect_with_settings, migrations, DemoDataset, SeedResult};

use crate::commands::{build_runtime, load_config, CommandResult, Failure};

const COMMAND: &str = "seed";

pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
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

        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));
        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => CommandResult::success(COMMAND, seed_message(&seeded)),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded: {} partner(s), {} deal(s) [{}], {} touchpoint(s)",
        seeded.partner_ids.len(),
        seeded.deal_ids.len(),
        seeded.deal_ids.join(", "),
        seeded.touchpoint_count
    )
}

#[cfg(test)]
mod tests {
    use partnerline_db::SeedResult;

    use super::seed_message;

    #[test]
    fn message_lists_seeded_deals() {
        let message = seed_message(&SeedResult {
            partner_ids: vec!["p-1", "p-2"],
            deal_ids: vec!["deal-a", "deal-b"],
            touchpoint_count: 4,
        });

        assert_eq!(
            message,
            "demo dataset loaded: 2 partner(s), 2 deal(s) [deal-a, deal-b], 4 touchpoint(s)"
        );
    }
}
