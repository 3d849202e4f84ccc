use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::DealId;
use crate::domain::partner::PartnerId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TouchpointId(pub String);

impl TouchpointId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Kind of partner interaction. Tags outside the known set are kept verbatim
/// in `Other` so they survive a round trip through storage.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TouchpointType {
    Referral,
    Demo,
    ContentShare,
    Introduction,
    Proposal,
    Negotiation,
    DealRegistration,
    CoSell,
    TechnicalEnablement,
    Other(String),
}

impl TouchpointType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Referral => "referral",
            Self::Demo => "demo",
            Self::ContentShare => "content_share",
            Self::Introduction => "introduction",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::DealRegistration => "deal_registration",
            Self::CoSell => "co_sell",
            Self::TechnicalEnablement => "technical_enablement",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for TouchpointType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "referral" => Self::Referral,
            "demo" => Self::Demo,
            "content_share" => Self::ContentShare,
            "introduction" => Self::Introduction,
            "proposal" => Self::Proposal,
            "negotiation" => Self::Negotiation,
            "deal_registration" => Self::DealRegistration,
            "co_sell" => Self::CoSell,
            "technical_enablement" => Self::TechnicalEnablement,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl From<String> for TouchpointType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<TouchpointType> for String {
    fn from(value: TouchpointType) -> Self {
        match value {
            TouchpointType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for TouchpointType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(value))
    }
}

impl fmt::Display for TouchpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded partner interaction with a deal. Touchpoints are
/// append-only; nothing in the engine mutates one after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub id: TouchpointId,
    pub deal_id: DealId,
    pub partner_id: PartnerId,
    #[serde(rename = "type")]
    pub touchpoint_type: TouchpointType,
    pub timestamp: DateTime<Utc>,
    /// Explicit override weight, only consulted by the role-based model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl Touchpoint {
    pub fn new(
        deal_id: DealId,
        partner_id: PartnerId,
        touchpoint_type: TouchpointType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TouchpointId::generate(),
            deal_id,
            partner_id,
            touchpoint_type,
            timestamp,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::TouchpointType;

    #[test]
    fn known_tags_parse_case_insensitively() {
        assert_eq!(TouchpointType::from("Deal_Registration"), TouchpointType::DealRegistration);
        assert_eq!(TouchpointType::from(" co_sell "), TouchpointType::CoSell);
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let tag = TouchpointType::from("webinar");
        assert_eq!(tag, TouchpointType::Other("webinar".to_string()));
        assert!(!tag.is_recognized());
        assert_eq!(String::from(tag), "webinar");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&TouchpointType::TechnicalEnablement).expect("serialize");
        assert_eq!(json, "\"technical_enablement\"");

        let parsed: TouchpointType = serde_json::from_str("\"content_share\"").expect("parse");
        assert_eq!(parsed, TouchpointType::ContentShare);
    }
}
