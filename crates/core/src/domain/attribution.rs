use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::deal::DealId;
use crate::domain::partner::PartnerId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    EqualSplit,
    FirstTouch,
    LastTouch,
    TimeDecay,
    RoleBased,
}

impl AttributionModel {
    pub const ALL: [AttributionModel; 5] = [
        Self::EqualSplit,
        Self::FirstTouch,
        Self::LastTouch,
        Self::TimeDecay,
        Self::RoleBased,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EqualSplit => "equal_split",
            Self::FirstTouch => "first_touch",
            Self::LastTouch => "last_touch",
            Self::TimeDecay => "time_decay",
            Self::RoleBased => "role_based",
        }
    }
}

impl FromStr for AttributionModel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "equal_split" => Ok(Self::EqualSplit),
            "first_touch" => Ok(Self::FirstTouch),
            "last_touch" => Ok(Self::LastTouch),
            "time_decay" => Ok(Self::TimeDecay),
            "role_based" => Ok(Self::RoleBased),
            other => Err(DomainError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for AttributionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credit assigned to one partner for one deal under one model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub partner_id: PartnerId,
    pub deal_id: DealId,
    pub model: AttributionModel,
    pub percentage: Decimal,
    pub amount: Decimal,
    pub commission_amount: Decimal,
    pub calculated_at: DateTime<Utc>,
}

/// Per-partner roll-up across a set of attribution results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerAttributionSummary {
    pub partner_id: PartnerId,
    pub deal_count: u32,
    pub total_amount: Decimal,
    pub total_commission: Decimal,
}

#[cfg(test)]
mod tests {
    use super::AttributionModel;
    use crate::errors::DomainError;

    #[test]
    fn parses_every_model_name() {
        for model in AttributionModel::ALL {
            let parsed: AttributionModel = model.as_str().parse().expect("known model");
            assert_eq!(parsed, model);
        }
    }

    #[test]
    fn accepts_dashed_and_upper_case_names() {
        assert_eq!("Time-Decay".parse::<AttributionModel>(), Ok(AttributionModel::TimeDecay));
    }

    #[test]
    fn rejects_unknown_model_name() {
        let error = "u_shaped".parse::<AttributionModel>().expect_err("unknown model");
        assert_eq!(error, DomainError::UnknownModel("u_shaped".to_string()));
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&AttributionModel::RoleBased).expect("serialize");
        assert_eq!(json, "\"role_based\"");
    }
}
