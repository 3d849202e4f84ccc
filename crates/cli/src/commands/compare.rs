use std::collections::BTreeMap;
use std::path::Path;

use partnerline_core::{AttributionModel, AttributionOrchestrator, AttributionResult, DealId};
use serde::Serialize;

use crate::commands::input::DealFile;
use crate::commands::{attribution_failure, build_runtime, load_config, CommandResult};

const COMMAND: &str = "compare";

#[derive(Debug, Serialize)]
pub struct ComparisonReport {
    pub deal_id: DealId,
    pub models: BTreeMap<AttributionModel, Vec<AttributionResult>>,
}

pub fn run(input: &Path) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
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
        AttributionOrchestrator::new(repository, parameters)
            .calculate_all(&deal_id)
            .await
            .map_err(|error| attribution_failure(&deal_id, error))
    });

    match result {
        Ok(models) => CommandResult::success_with_data(
            COMMAND,
            format!("compared {} models for deal `{deal_id}`", models.len()),
            &ComparisonReport { deal_id, models },
        ),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}
