//! Integration seam between storage and the pure attribution functions.
//!
//! The orchestrator fetches a deal, its touchpoints and the involved
//! partners' commission rates, runs one model, and replaces the stored
//! records for that deal and model in a single store call.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::registry::attribute;
use super::{AttributionInput, ModelParameters};
use crate::domain::attribution::{AttributionModel, AttributionResult};
use crate::domain::deal::{Deal, DealId};
use crate::domain::partner::PartnerId;
use crate::domain::touchpoint::Touchpoint;
use crate::errors::{ApplicationError, DomainError};

#[async_trait]
pub trait DealSource: Send + Sync {
    async fn find_deal(&self, id: &DealId) -> Result<Option<Deal>, ApplicationError>;
}

#[async_trait]
pub trait TouchpointSource: Send + Sync {
    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Touchpoint>, ApplicationError>;
}

#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    /// Rates for the requested partners; unknown partners are simply absent.
    async fn commission_rates(
        &self,
        partner_ids: &[PartnerId],
    ) -> Result<BTreeMap<PartnerId, Decimal>, ApplicationError>;
}

#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// Atomically swaps every record for `deal_id` + `model` with `results`.
    async fn replace_for_deal(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
        results: Vec<AttributionResult>,
    ) -> Result<(), ApplicationError>;

    async fn list_for_deal(
        &self,
        deal_id: &DealId,
        model: Option<AttributionModel>,
    ) -> Result<Vec<AttributionResult>, ApplicationError>;
}

/// Everything the orchestrator needs from storage.
pub trait AttributionRepository:
    DealSource + TouchpointSource + PartnerDirectory + AttributionStore
{
}

impl<T> AttributionRepository for T where
    T: DealSource + TouchpointSource + PartnerDirectory + AttributionStore
{
}

type CalculationKey = (DealId, AttributionModel);

pub struct AttributionOrchestrator<R> {
    repository: R,
    parameters: ModelParameters,
    in_flight: Mutex<HashSet<CalculationKey>>,
}

impl<R> AttributionOrchestrator<R>
where
    R: AttributionRepository,
{
    pub fn new(repository: R, parameters: ModelParameters) -> Self {
        Self { repository, parameters, in_flight: Mutex::new(HashSet::new()) }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    /// Recomputes and persists attribution for one deal under one model.
    /// A second call for the same deal and model while the first is still
    /// running fails with [`ApplicationError::Conflict`].
    pub async fn calculate(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
    ) -> Result<Vec<AttributionResult>, ApplicationError> {
        let _claim = self.claim(deal_id, model)?;
        info!(
            event_name = "attribution.calculate.start",
            deal_id = %deal_id,
            model = %model,
            "starting attribution calculation"
        );

        let deal = self
            .repository
            .find_deal(deal_id)
            .await?
            .ok_or_else(|| DomainError::DealNotFound(deal_id.clone()))?;
        let touchpoints = TouchpointSource::list_for_deal(&self.repository, deal_id).await?;

        let partner_ids: Vec<PartnerId> = touchpoints
            .iter()
            .map(|touchpoint| touchpoint.partner_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let commission_rates = self.repository.commission_rates(&partner_ids).await?;
        for partner_id in partner_ids.iter().filter(|id| !commission_rates.contains_key(*id)) {
            warn!(
                event_name = "attribution.calculate.missing_commission_rate",
                deal_id = %deal_id,
                partner_id = %partner_id,
                "partner has no commission rate; commission will be zero"
            );
        }

        let results = attribute(
            model,
            &AttributionInput {
                deal: &deal,
                touchpoints: &touchpoints,
                commission_rates: &commission_rates,
                parameters: &self.parameters,
                calculated_at: Utc::now(),
            },
        );

        self.repository.replace_for_deal(deal_id, model, results.clone()).await?;
        info!(
            event_name = "attribution.calculate.completed",
            deal_id = %deal_id,
            model = %model,
            touchpoint_count = touchpoints.len(),
            partner_count = results.len(),
            "attribution calculation persisted"
        );

        Ok(results)
    }

    /// Runs every model for the deal, one after another.
    pub async fn calculate_all(
        &self,
        deal_id: &DealId,
    ) -> Result<BTreeMap<AttributionModel, Vec<AttributionResult>>, ApplicationError> {
        let mut by_model = BTreeMap::new();
        for model in AttributionModel::ALL {
            by_model.insert(model, self.calculate(deal_id, model).await?);
        }
        Ok(by_model)
    }

    pub async fn stored_results(
        &self,
        deal_id: &DealId,
        model: Option<AttributionModel>,
    ) -> Result<Vec<AttributionResult>, ApplicationError> {
        AttributionStore::list_for_deal(&self.repository, deal_id, model).await
    }

    fn claim(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
    ) -> Result<CalculationClaim<'_>, ApplicationError> {
        let key = (deal_id.clone(), model);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            warn!(
                event_name = "attribution.calculate.conflict",
                deal_id = %deal_id,
                model = %model,
                "attribution calculation already in progress"
            );
            return Err(ApplicationError::Conflict { deal_id: deal_id.clone(), model });
        }
        Ok(CalculationClaim { in_flight: &self.in_flight, key })
    }
}

/// Releases the deal+model slot when the calculation finishes or fails.
struct CalculationClaim<'a> {
    in_flight: &'a Mutex<HashSet<CalculationKey>>,
    key: CalculationKey,
}

impl Drop for CalculationClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::RwLock;

    use super::{
        AttributionOrchestrator, AttributionStore, DealSource, PartnerDirectory, TouchpointSource,
    };
    use crate::attribution::ModelParameters;
    use crate::domain::attribution::{AttributionModel, AttributionResult};
    use crate::domain::deal::{Deal, DealId};
    use crate::domain::partner::PartnerId;
    use crate::domain::touchpoint::{Touchpoint, TouchpointType};
    use crate::errors::{ApplicationError, DomainError};

    #[derive(Default)]
    struct FakeRepository {
        deals: BTreeMap<DealId, Deal>,
        touchpoints: Vec<Touchpoint>,
        rates: BTreeMap<PartnerId, Decimal>,
        stored: RwLock<Vec<AttributionResult>>,
    }

    #[async_trait]
    impl DealSource for FakeRepository {
        async fn find_deal(&self, id: &DealId) -> Result<Option<Deal>, ApplicationError> {
            Ok(self.deals.get(id).cloned())
        }
    }

    #[async_trait]
    impl TouchpointSource for FakeRepository {
        async fn list_for_deal(
            &self,
            deal_id: &DealId,
        ) -> Result<Vec<Touchpoint>, ApplicationError> {
            Ok(self.touchpoints.iter().filter(|tp| &tp.deal_id == deal_id).cloned().collect())
        }
    }

    #[async_trait]
    impl PartnerDirectory for FakeRepository {
        async fn commission_rates(
            &self,
            partner_ids: &[PartnerId],
        ) -> Result<BTreeMap<PartnerId, Decimal>, ApplicationError> {
            Ok(partner_ids
                .iter()
                .filter_map(|id| self.rates.get(id).map(|rate| (id.clone(), *rate)))
                .collect())
        }
    }

    #[async_trait]
    impl AttributionStore for FakeRepository {
        async fn replace_for_deal(
            &self,
            deal_id: &DealId,
            model: AttributionModel,
            results: Vec<AttributionResult>,
        ) -> Result<(), ApplicationError> {
            let mut stored = self.stored.write().await;
            stored.retain(|result| !(&result.deal_id == deal_id && result.model == model));
            stored.extend(results);
            Ok(())
        }

        async fn list_for_deal(
            &self,
            deal_id: &DealId,
            model: Option<AttributionModel>,
        ) -> Result<Vec<AttributionResult>, ApplicationError> {
            let stored = self.stored.read().await;
            Ok(stored
                .iter()
                .filter(|result| &result.deal_id == deal_id)
                .filter(|result| model.map_or(true, |model| result.model == model))
                .cloned()
                .collect())
        }
    }

    fn repository() -> FakeRepository {
        let deal_id = DealId("deal-7".to_string());
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).single().expect("valid date");
        FakeRepository {
            deals: BTreeMap::from([(
                deal_id.clone(),
                Deal { id: deal_id.clone(), amount: Decimal::new(80_000, 0), closed_at: None },
            )]),
            touchpoints: vec![
                Touchpoint::new(
                    deal_id.clone(),
                    PartnerId("p-a".to_string()),
                    TouchpointType::Referral,
                    start,
                ),
                Touchpoint::new(
                    deal_id,
                    PartnerId("p-b".to_string()),
                    TouchpointType::ContentShare,
                    start + Duration::days(3),
                ),
            ],
            rates: BTreeMap::from([(PartnerId("p-a".to_string()), Decimal::new(10, 0))]),
            stored: RwLock::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn calculate_persists_results_for_deal_and_model() {
        let orchestrator = AttributionOrchestrator::new(repository(), ModelParameters::default());
        let deal_id = DealId("deal-7".to_string());

        let results =
            orchestrator.calculate(&deal_id, AttributionModel::RoleBased).await.expect("calculate");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].percentage, Decimal::new(75, 0));
        assert_eq!(results[0].commission_amount, Decimal::new(6_000, 0));
        assert_eq!(results[1].commission_amount, Decimal::ZERO);

        let stored = orchestrator
            .stored_results(&deal_id, Some(AttributionModel::RoleBased))
            .await
            .expect("list");
        assert_eq!(stored, results);
    }

    #[tokio::test]
    async fn recalculation_replaces_prior_records() {
        let orchestrator = AttributionOrchestrator::new(repository(), ModelParameters::default());
        let deal_id = DealId("deal-7".to_string());

        orchestrator.calculate(&deal_id, AttributionModel::FirstTouch).await.expect("first run");
        orchestrator.calculate(&deal_id, AttributionModel::FirstTouch).await.expect("second run");
        orchestrator.calculate(&deal_id, AttributionModel::EqualSplit).await.expect("other model");

        let first_touch = orchestrator
            .stored_results(&deal_id, Some(AttributionModel::FirstTouch))
            .await
            .expect("list");
        assert_eq!(first_touch.len(), 1);
        assert_eq!(orchestrator.stored_results(&deal_id, None).await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn missing_deal_is_reported() {
        let orchestrator = AttributionOrchestrator::new(repository(), ModelParameters::default());
        let missing = DealId("deal-404".to_string());

        let error = orchestrator
            .calculate(&missing, AttributionModel::EqualSplit)
            .await
            .expect_err("missing deal");
        assert_eq!(error, ApplicationError::Domain(DomainError::DealNotFound(missing)));
    }

    #[tokio::test]
    async fn overlapping_calculation_is_rejected_then_released() {
        let orchestrator = AttributionOrchestrator::new(repository(), ModelParameters::default());
        let deal_id = DealId("deal-7".to_string());

        let claim = orchestrator.claim(&deal_id, AttributionModel::TimeDecay).expect("claim");
        let error = orchestrator
            .calculate(&deal_id, AttributionModel::TimeDecay)
            .await
            .expect_err("conflict while claimed");
        assert!(matches!(error, ApplicationError::Conflict { .. }));

        // other models for the same deal are unaffected
        orchestrator.calculate(&deal_id, AttributionModel::LastTouch).await.expect("last touch");

        drop(claim);
        orchestrator.calculate(&deal_id, AttributionModel::TimeDecay).await.expect("released");
    }

    #[tokio::test]
    async fn calculate_all_runs_every_model() {
        let orchestrator = AttributionOrchestrator::new(repository(), ModelParameters::default());
        let deal_id = DealId("deal-7".to_string());

        let by_model = orchestrator.calculate_all(&deal_id).await.expect("calculate all");
        assert_eq!(by_model.len(), 5);
        for results in by_model.values() {
            let total: Decimal = results.iter().map(|result| result.percentage).sum();
            assert_eq!(total, Decimal::ONE_HUNDRED);
        }
    }
}
