use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use partnerline_core::{
    ApplicationError, AttributionModel, AttributionResult, AttributionStore, Deal, DealId,
    DealSource, Partner, PartnerDirectory, PartnerId, Touchpoint, TouchpointSource,
};

use super::attribution::ensure_results_match;
use super::RepositoryError;

/// Process-local repository for tests and dry runs. Reads mirror the SQL
/// repository's ordering.
#[derive(Default)]
pub struct InMemoryAttributionRepository {
    partners: RwLock<BTreeMap<PartnerId, Partner>>,
    deals: RwLock<BTreeMap<DealId, Deal>>,
    touchpoints: RwLock<Vec<Touchpoint>>,
    results: RwLock<Vec<AttributionResult>>,
}

impl InMemoryAttributionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_partner(&self, partner: Partner) {
        self.partners.write().await.insert(partner.id.clone(), partner);
    }

    pub async fn save_deal(&self, deal: Deal) {
        self.deals.write().await.insert(deal.id.clone(), deal);
    }

    pub async fn append_touchpoint(&self, touchpoint: Touchpoint) -> Result<(), RepositoryError> {
        let mut touchpoints = self.touchpoints.write().await;
        if touchpoints.iter().any(|existing| existing.id == touchpoint.id) {
            return Err(RepositoryError::Duplicate(format!("touchpoint `{}`", touchpoint.id.0)));
        }
        touchpoints.push(touchpoint);
        Ok(())
    }
}

#[async_trait]
impl DealSource for InMemoryAttributionRepository {
    async fn find_deal(&self, id: &DealId) -> Result<Option<Deal>, ApplicationError> {
        Ok(self.deals.read().await.get(id).cloned())
    }
}

#[async_trait]
impl TouchpointSource for InMemoryAttributionRepository {
    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Touchpoint>, ApplicationError> {
        let mut matching: Vec<Touchpoint> = self
            .touchpoints
            .read()
            .await
            .iter()
            .filter(|touchpoint| &touchpoint.deal_id == deal_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matching)
    }
}

#[async_trait]
impl PartnerDirectory for InMemoryAttributionRepository {
    async fn commission_rates(
        &self,
        partner_ids: &[PartnerId],
    ) -> Result<BTreeMap<PartnerId, Decimal>, ApplicationError> {
        let partners = self.partners.read().await;
        Ok(partner_ids
            .iter()
            .filter_map(|id| partners.get(id).map(|partner| (id.clone(), partner.commission_rate)))
            .collect())
    }
}

#[async_trait]
impl AttributionStore for InMemoryAttributionRepository {
    async fn replace_for_deal(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
        results: Vec<AttributionResult>,
    ) -> Result<(), ApplicationError> {
        ensure_results_match(deal_id, model, &results)?;
        let mut stored = self.results.write().await;
        stored.retain(|result| !(&result.deal_id == deal_id && result.model == model));
        stored.extend(results);
        Ok(())
    }

    async fn list_for_deal(
        &self,
        deal_id: &DealId,
        model: Option<AttributionModel>,
    ) -> Result<Vec<AttributionResult>, ApplicationError> {
        let mut matching: Vec<AttributionResult> = self
            .results
            .read()
            .await
            .iter()
            .filter(|result| &result.deal_id == deal_id)
            .filter(|result| model.map_or(true, |model| result.model == model))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.model.as_str().cmp(b.model.as_str()).then_with(|| a.partner_id.cmp(&b.partner_id))
        });
        Ok(matching)
    }
}
