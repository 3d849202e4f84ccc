use partnerline_core::{
    summarize_by_partner, AttributionModel, AttributionOrchestrator, AttributionResult, DealId,
    PartnerAttributionSummary,
};
use partnerline_db::{connect_with_settings, migrations, SqlAttributionRepository};
use serde::Serialize;

use crate::commands::{
    attribution_failure, build_runtime, load_config, resolve_model, CommandResult, Failure,
};

const COMMAND: &str = "calculate";

#[derive(Debug, Serialize)]
pub struct CalculationReport {
    pub models: Vec<AttributionModel>,
    pub results: Vec<AttributionResult>,
    pub partners: Vec<PartnerAttributionSummary>,
}

/// Recomputes stored attribution for each deal and totals the records per
/// partner.
pub fn run(deal_ids: &[String], model: Option<&str>, all: bool) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let models = if all {
        AttributionModel::ALL.to_vec()
    } else {
        match resolve_model(COMMAND, model, &config) {
            Ok(model) => vec![model],
            Err(result) => return result,
        }
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let parameters = config.attribution.model_parameters();
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

        let orchestrator =
            AttributionOrchestrator::new(SqlAttributionRepository::new(pool.clone()), parameters);
        let mut results = Vec::new();
        for deal_id in deal_ids {
            let deal_id = DealId(deal_id.clone());
            for model in &models {
                match orchestrator.calculate(&deal_id, *model).await {
                    Ok(records) => results.extend(records),
                    Err(error) => {
                        pool.close().await;
                        return Err(attribution_failure(&deal_id, error));
                    }
                }
            }
        }

        pool.close().await;
        Ok::<_, Failure>(results)
    });

    match result {
        Ok(results) => {
            let partners = summarize_by_partner(&results);
            let message = format!(
                "stored {} record(s) across {} deal(s) and {} model(s)",
                results.len(),
                deal_ids.len(),
                models.len()
            );
            CommandResult::success_with_data(
                COMMAND,
                message,
                &CalculationReport { models, results, partners },
            )
        }
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}
