//! Partner attribution engine
//!
//! Splits credit for a closed deal across the partners that touched it.
//! Five scoring models produce raw per-partner scores; the shared normalizer
//! turns those into percentages that sum to exactly 100.00 and derives the
//! attributed and commission amounts.

pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
pub mod summary;

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::deal::Deal;
use crate::domain::partner::PartnerId;
use crate::domain::touchpoint::{Touchpoint, TouchpointType};

pub use models::PartnerScores;
pub use normalizer::{allocate, normalize, PartnerShare};
pub use registry::{attribute, compare_models, resolve, scoring_fn, ScoringFn, MODEL_REGISTRY};
pub use summary::summarize_by_partner;

/// Days after which a time-decay weight halves.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;

/// Weight used by the role-based model for touchpoint types missing from the table.
pub const FALLBACK_ROLE_WEIGHT: f64 = 5.0;

/// Decimal places kept on percentages and money amounts.
pub const PERCENTAGE_SCALE: u32 = 2;

/// Default role-based weight per touchpoint type, in percentage points.
pub const DEFAULT_ROLE_WEIGHTS: [(TouchpointType, f64); 9] = [
    (TouchpointType::Referral, 30.0),
    (TouchpointType::DealRegistration, 30.0),
    (TouchpointType::Demo, 25.0),
    (TouchpointType::Proposal, 25.0),
    (TouchpointType::Negotiation, 20.0),
    (TouchpointType::CoSell, 20.0),
    (TouchpointType::Introduction, 15.0),
    (TouchpointType::TechnicalEnablement, 15.0),
    (TouchpointType::ContentShare, 10.0),
];

/// Weight table for the role-based model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleWeights {
    weights: BTreeMap<TouchpointType, f64>,
    fallback: f64,
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self { weights: DEFAULT_ROLE_WEIGHTS.into_iter().collect(), fallback: FALLBACK_ROLE_WEIGHT }
    }
}

impl RoleWeights {
    pub fn new(weights: BTreeMap<TouchpointType, f64>, fallback: f64) -> Self {
        Self { weights, fallback }
    }

    pub fn with_weight(mut self, touchpoint_type: TouchpointType, weight: f64) -> Self {
        self.weights.insert(touchpoint_type, weight);
        self
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn weight_for(&self, touchpoint_type: &TouchpointType) -> f64 {
        self.weights.get(touchpoint_type).copied().unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> f64 {
        self.fallback
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TouchpointType, &f64)> {
        self.weights.iter()
    }
}

/// Tunables passed alongside every model call. Defaults come from the
/// constants above; nothing reads shared mutable state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub half_life_days: f64,
    pub role_weights: RoleWeights,
    /// Time-decay reference point. When unset the deal close time is used,
    /// then the latest touchpoint.
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            role_weights: RoleWeights::default(),
            reference_time: None,
        }
    }
}

impl ModelParameters {
    pub fn with_half_life_days(mut self, half_life_days: f64) -> Self {
        self.half_life_days = half_life_days;
        self
    }

    pub fn with_role_weights(mut self, role_weights: RoleWeights) -> Self {
        self.role_weights = role_weights;
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }
}

/// Plain-data input for one attribution calculation.
#[derive(Clone, Debug)]
pub struct AttributionInput<'a> {
    pub deal: &'a Deal,
    /// Touchpoints recorded against `deal`.
    pub touchpoints: &'a [Touchpoint],
    pub commission_rates: &'a BTreeMap<PartnerId, Decimal>,
    pub parameters: &'a ModelParameters,
    /// Stamped on every produced record.
    pub calculated_at: DateTime<Utc>,
}

impl AttributionInput<'_> {
    pub(crate) fn resolved_parameters(&self) -> Cow<'_, ModelParameters> {
        match (self.parameters.reference_time, self.deal.closed_at) {
            (None, Some(closed_at)) => {
                Cow::Owned(self.parameters.clone().with_reference_time(closed_at))
            }
            _ => Cow::Borrowed(self.parameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ModelParameters, RoleWeights, FALLBACK_ROLE_WEIGHT};
    use crate::domain::touchpoint::TouchpointType;

    #[test]
    fn default_role_table_matches_documented_weights() {
        let weights = RoleWeights::default();
        assert_eq!(weights.weight_for(&TouchpointType::Referral), 30.0);
        assert_eq!(weights.weight_for(&TouchpointType::Proposal), 25.0);
        assert_eq!(weights.weight_for(&TouchpointType::CoSell), 20.0);
        assert_eq!(weights.weight_for(&TouchpointType::TechnicalEnablement), 15.0);
        assert_eq!(weights.weight_for(&TouchpointType::ContentShare), 10.0);
        assert_eq!(
            weights.weight_for(&TouchpointType::Other("webinar".to_string())),
            FALLBACK_ROLE_WEIGHT
        );
    }

    #[test]
    fn overrides_do_not_touch_the_default_table() {
        let custom = RoleWeights::default().with_weight(TouchpointType::Demo, 50.0);
        assert_eq!(custom.weight_for(&TouchpointType::Demo), 50.0);
        assert_eq!(RoleWeights::default().weight_for(&TouchpointType::Demo), 25.0);
    }

    #[test]
    fn builder_sets_reference_time() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid date");
        let parameters =
            ModelParameters::default().with_half_life_days(14.0).with_reference_time(at);
        assert_eq!(parameters.half_life_days, 14.0);
        assert_eq!(parameters.reference_time, Some(at));
    }
}
