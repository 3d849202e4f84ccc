//! Scoring functions for the five attribution models.
//!
//! Each function returns raw, unnormalized scores keyed by partner. Scores
//! only need to be comparable within one call; the normalizer turns them
//! into percentages.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{ModelParameters, DEFAULT_HALF_LIFE_DAYS};
use crate::domain::partner::PartnerId;
use crate::domain::touchpoint::Touchpoint;

pub type PartnerScores = BTreeMap<PartnerId, f64>;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// One unit of credit per distinct partner, regardless of how many
/// touchpoints each partner logged.
pub fn equal_split(touchpoints: &[Touchpoint], _parameters: &ModelParameters) -> PartnerScores {
    touchpoints.iter().map(|touchpoint| (touchpoint.partner_id.clone(), 1.0)).collect()
}

/// All credit to the earliest touchpoint. Simultaneous earliest touchpoints
/// resolve to the lowest partner id.
pub fn first_touch(touchpoints: &[Touchpoint], _parameters: &ModelParameters) -> PartnerScores {
    sole_winner(touchpoints, |a, b| a.timestamp.cmp(&b.timestamp))
}

/// All credit to the latest touchpoint. Simultaneous latest touchpoints
/// resolve to the lowest partner id.
pub fn last_touch(touchpoints: &[Touchpoint], _parameters: &ModelParameters) -> PartnerScores {
    sole_winner(touchpoints, |a, b| b.timestamp.cmp(&a.timestamp))
}

/// Exponential decay: `0.5 ^ (age_days / half_life_days)` per touchpoint,
/// summed per partner. Touchpoints sharing one instant all weigh 1.0, so the
/// split follows touchpoint counts.
pub fn time_decay(touchpoints: &[Touchpoint], parameters: &ModelParameters) -> PartnerScores {
    let reference = parameters
        .reference_time
        .or_else(|| touchpoints.iter().map(|touchpoint| touchpoint.timestamp).max());
    let Some(reference) = reference else {
        return PartnerScores::new();
    };

    let half_life = if parameters.half_life_days.is_finite() && parameters.half_life_days > 0.0 {
        parameters.half_life_days
    } else {
        DEFAULT_HALF_LIFE_DAYS
    };

    // Ages are shifted so the youngest touchpoint weighs 1.0; the split is
    // unchanged but old deals no longer underflow every weight to zero.
    let ages: Vec<f64> =
        touchpoints.iter().map(|touchpoint| age_in_days(reference, touchpoint.timestamp)).collect();
    let youngest = ages.iter().copied().fold(f64::INFINITY, f64::min);

    let mut scores = PartnerScores::new();
    for (touchpoint, age) in touchpoints.iter().zip(ages) {
        let weight = 0.5f64.powf((age - youngest) / half_life);
        *scores.entry(touchpoint.partner_id.clone()).or_insert(0.0) += weight;
    }
    scores
}

/// Weight by interaction type. An explicit touchpoint weight wins over the
/// table; unknown types use the table's fallback weight.
pub fn role_based(touchpoints: &[Touchpoint], parameters: &ModelParameters) -> PartnerScores {
    let mut scores = PartnerScores::new();
    for touchpoint in touchpoints {
        let weight = touchpoint
            .weight
            .unwrap_or_else(|| parameters.role_weights.weight_for(&touchpoint.touchpoint_type));
        if !(weight.is_finite() && weight > 0.0) {
            continue;
        }
        *scores.entry(touchpoint.partner_id.clone()).or_insert(0.0) += weight;
    }
    scores
}

fn sole_winner(
    touchpoints: &[Touchpoint],
    by_time: impl Fn(&Touchpoint, &Touchpoint) -> Ordering,
) -> PartnerScores {
    touchpoints
        .iter()
        .min_by(|a, b| by_time(a, b).then_with(|| a.partner_id.cmp(&b.partner_id)))
        .map(|winner| PartnerScores::from([(winner.partner_id.clone(), 1.0)]))
        .unwrap_or_default()
}

/// Fractional days from `at` back to `reference`; touchpoints after the
/// reference count as age zero.
fn age_in_days(reference: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    let millis = (reference - at).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_DAY
}
