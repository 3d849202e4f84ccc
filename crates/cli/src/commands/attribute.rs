use std::path::Path;

use partnerline_core::{AttributionModel, AttributionOrchestrator, AttributionResult, DealId};
use serde::Serialize;
use tracing::info;

use crate::commands::input::DealFile;
use crate::commands::{
    attribution_failure, build_runtime, load_config, resolve_model, CommandResult,
};

const COMMAND: &str = "attribute";

#[derive(Debug, Serialize)]
pub struct AttributionReport {
    pub deal_id: DealId,
    pub model: AttributionModel,
    pub results: Vec<AttributionResult>,
}

pub fn run(input: &Path, model: Option<&str>) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let model = match resolve_model(COMMAND, model, &config) {
        Ok(model) => model,
        Err(result) => return result,
    };
    let deal_file = match DealFile::read(input) {
        Ok(deal_file) => deal_file,
        Err(error) => return CommandResult::failure(COMMAND, "input", format!("{error:#}"), 2),
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let deal_id = deal_file.deal.id.clone();
    let parameters = config.attribution.model_parameters();
    let result = runtime.block_on(async {
        let repository = deal_file
            .into_repository()
            .await
            .map_err(|error| ("input", format!("{error:#}"), 2u8))?;
        let orchestrator = AttributionOrchestrator::new(repository, parameters);
        orchestrator
            .calculate(&deal_id, model)
            .await
            .map_err(|error| attribution_failure(&deal_id, error))
    });

    match result {
        Ok(results) => {
            info!(
                event_name = "cli.attribute.completed",
                deal_id = %deal_id,
                model = %model,
                partner_count = results.len(),
                "deal file attributed"
            );
            let message = format!(
                "attributed deal `{deal_id}` to {} partner(s) with {model}",
                results.len()
            );
            CommandResult::success_with_data(
                COMMAND,
                message,
                &AttributionReport { deal_id, model, results },
            )
        }
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}
