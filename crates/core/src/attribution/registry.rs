use std::collections::BTreeMap;

use super::models::{self, PartnerScores};
use super::normalizer::{allocate, normalize};
use super::{AttributionInput, ModelParameters};
use crate::domain::attribution::{AttributionModel, AttributionResult};
use crate::domain::touchpoint::Touchpoint;
use crate::errors::DomainError;

pub type ScoringFn = fn(&[Touchpoint], &ModelParameters) -> PartnerScores;

/// Scoring function per model, in `AttributionModel::ALL` order.
pub static MODEL_REGISTRY: [(AttributionModel, ScoringFn); 5] = [
    (AttributionModel::EqualSplit, models::equal_split),
    (AttributionModel::FirstTouch, models::first_touch),
    (AttributionModel::LastTouch, models::last_touch),
    (AttributionModel::TimeDecay, models::time_decay),
    (AttributionModel::RoleBased, models::role_based),
];

pub fn scoring_fn(model: AttributionModel) -> ScoringFn {
    MODEL_REGISTRY[model as usize].1
}

/// Maps a model name such as `time_decay` to its registry entry.
pub fn resolve(name: &str) -> Result<(AttributionModel, ScoringFn), DomainError> {
    let model: AttributionModel = name.parse()?;
    Ok((model, scoring_fn(model)))
}

/// Runs one model end to end: score, normalize, convert to amounts.
/// No touchpoints means no records.
pub fn attribute(model: AttributionModel, input: &AttributionInput<'_>) -> Vec<AttributionResult> {
    let parameters = input.resolved_parameters();
    let scores = scoring_fn(model)(input.touchpoints, &parameters);
    let shares = normalize(&scores);
    allocate(input, model, &shares)
}

pub fn compare_models(
    input: &AttributionInput<'_>,
) -> BTreeMap<AttributionModel, Vec<AttributionResult>> {
    AttributionModel::ALL.into_iter().map(|model| (model, attribute(model, input))).collect()
}
