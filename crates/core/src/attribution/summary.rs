use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::domain::attribution::{AttributionResult, PartnerAttributionSummary};
use crate::domain::deal::DealId;
use crate::domain::partner::PartnerId;

/// Rolls attribution records up per partner, ordered by partner id. A deal
/// counts once per partner even when records from several models are passed.
pub fn summarize_by_partner(results: &[AttributionResult]) -> Vec<PartnerAttributionSummary> {
    let mut totals: BTreeMap<&PartnerId, (BTreeSet<&DealId>, Decimal, Decimal)> = BTreeMap::new();

    for result in results {
        let entry = totals
            .entry(&result.partner_id)
            .or_insert_with(|| (BTreeSet::new(), Decimal::ZERO, Decimal::ZERO));
        entry.0.insert(&result.deal_id);
        entry.1 += result.amount;
        entry.2 += result.commission_amount;
    }

    totals
        .into_iter()
        .map(|(partner_id, (deals, total_amount, total_commission))| PartnerAttributionSummary {
            partner_id: partner_id.clone(),
            deal_count: u32::try_from(deals.len()).unwrap_or(u32::MAX),
            total_amount,
            total_commission,
        })
        .collect()
}
