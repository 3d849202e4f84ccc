//! Converts raw partner scores into a percentage split that sums to exactly
//! 100.00, then into attributed and commission amounts.
//!
//! Residual rule (largest remainder): every share is first truncated to whole
//! hundredths of a percent. The hundredths still missing from 100.00 are then
//! handed out one at a time to the shares with the largest truncated
//! remainder, ties going to the lowest partner id. No share receives more
//! than one extra hundredth, so no share can be pushed to zero or below, and
//! an equal split hands its extra cent to the first partner in id order.

use rust_decimal::{Decimal, RoundingStrategy};

use super::{AttributionInput, PartnerScores, PERCENTAGE_SCALE};
use crate::domain::attribution::{AttributionModel, AttributionResult};
use crate::domain::partner::PartnerId;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;
/// 100.00 expressed in hundredths of a percent.
const TOTAL_UNITS: i64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartnerShare {
    pub partner_id: PartnerId,
    pub percentage: Decimal,
}

/// Normalizes scores to percentages. Returns no shares when the total score
/// is zero, negative or not finite.
pub fn normalize(scores: &PartnerScores) -> Vec<PartnerShare> {
    let positive: Vec<(&PartnerId, f64)> = scores
        .iter()
        .filter(|(_, score)| score.is_finite() && **score > 0.0)
        .map(|(partner_id, score)| (partner_id, *score))
        .collect();

    let total: f64 = positive.iter().map(|(_, score)| score).sum();
    if !(total.is_finite() && total > 0.0) {
        return Vec::new();
    }

    let mut units: Vec<(&PartnerId, i64, f64)> = positive
        .into_iter()
        .map(|(partner_id, score)| {
            let exact = TOTAL_UNITS as f64 * score / total;
            let floor = exact.floor();
            (partner_id, floor as i64, exact - floor)
        })
        .collect();

    let assigned: i64 = units.iter().map(|(_, floor, _)| floor).sum();
    distribute_remainder(&mut units, TOTAL_UNITS - assigned);

    units
        .into_iter()
        .filter(|(_, hundredths, _)| *hundredths > 0)
        .map(|(partner_id, hundredths, _)| PartnerShare {
            partner_id: partner_id.clone(),
            percentage: Decimal::new(hundredths, PERCENTAGE_SCALE),
        })
        .collect()
}

/// Hands out `missing` hundredths by largest remainder. Entries arrive in
/// ascending partner id order and the sort is stable, so equal remainders
/// keep the lowest-id tie break. A negative `missing` only arises from float
/// noise and is taken back from the smallest remainders that still hold a
/// unit.
fn distribute_remainder(units: &mut [(&PartnerId, i64, f64)], missing: i64) {
    if missing == 0 || units.is_empty() {
        return;
    }

    let mut order: Vec<usize> = (0..units.len()).collect();
    order.sort_by(|left, right| units[*right].2.total_cmp(&units[*left].2));

    if missing > 0 {
        for index in order.iter().cycle().take(missing as usize) {
            units[*index].1 += 1;
        }
        return;
    }

    let mut excess = -missing;
    for index in order.iter().rev() {
        if excess == 0 {
            break;
        }
        if units[*index].1 > 0 {
            units[*index].1 -= 1;
            excess -= 1;
        }
    }
}

/// Turns shares into attribution records for the input's deal. Partners
/// without a known commission rate earn no commission.
pub fn allocate(
    input: &AttributionInput<'_>,
    model: AttributionModel,
    shares: &[PartnerShare],
) -> Vec<AttributionResult> {
    shares
        .iter()
        .map(|share| {
            let rate =
                input.commission_rates.get(&share.partner_id).copied().unwrap_or(Decimal::ZERO);
            record(input, model, share, rate)
        })
        .collect()
}

fn record(
    input: &AttributionInput<'_>,
    model: AttributionModel,
    share: &PartnerShare,
    commission_rate: Decimal,
) -> AttributionResult {
    let amount = round(input.deal.amount * share.percentage / ONE_HUNDRED);
    let commission_amount = round(amount * commission_rate / ONE_HUNDRED);

    AttributionResult {
        partner_id: share.partner_id.clone(),
        deal_id: input.deal.id.clone(),
        model,
        percentage: share.percentage,
        amount,
        commission_amount,
        calculated_at: input.calculated_at,
    }
}

/// Always two decimal places, so `100` renders as `100.00`.
fn round(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(PERCENTAGE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PERCENTAGE_SCALE);
    rounded
}
