//! Deal files accepted by `attribute` and `compare`.
//!
//! ```json
//! {
//!   "deal": { "id": "deal-1", "amount": "100000.00", "closed_at": "2026-03-31T00:00:00Z" },
//!   "touchpoints": [
//!     { "partner_id": "p-1", "type": "referral", "timestamp": "2026-03-01T09:00:00Z" }
//!   ],
//!   "partners": [ { "id": "p-1", "name": "Northwind", "commission_rate": "15" } ]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use partnerline_core::{Deal, DealId, Partner, PartnerId, Touchpoint, TouchpointId, TouchpointType};
use partnerline_db::InMemoryAttributionRepository;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct DealFile {
    pub deal: Deal,
    #[serde(default)]
    pub touchpoints: Vec<TouchpointEntry>,
    #[serde(default)]
    pub partners: Vec<PartnerEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TouchpointEntry {
    #[serde(default)]
    pub id: Option<TouchpointId>,
    #[serde(default)]
    pub deal_id: Option<DealId>,
    pub partner_id: PartnerId,
    #[serde(rename = "type")]
    pub touchpoint_type: TouchpointType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PartnerEntry {
    pub id: PartnerId,
    #[serde(default)]
    pub name: Option<String>,
    pub commission_rate: Decimal,
}

impl DealFile {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read deal file {}", path.display()))?;
        let file: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse deal file {}", path.display()))?;
        file.check()?;
        Ok(file)
    }

    fn check(&self) -> Result<()> {
        for (index, entry) in self.touchpoints.iter().enumerate() {
            if let Some(deal_id) = entry.deal_id.as_ref().filter(|id| **id != self.deal.id) {
                bail!(
                    "touchpoint #{} belongs to deal `{deal_id}`, not `{}`",
                    index + 1,
                    self.deal.id
                );
            }
        }
        Ok(())
    }

    /// Touchpoints without an id get `<deal>-tp-<n>` in file order, so ties
    /// resolve the same way on every run.
    pub fn touchpoints(&self) -> Vec<Touchpoint> {
        self.touchpoints
            .iter()
            .enumerate()
            .map(|(index, entry)| Touchpoint {
                id: entry
                    .id
                    .clone()
                    .unwrap_or_else(|| TouchpointId(format!("{}-tp-{}", self.deal.id, index + 1))),
                deal_id: self.deal.id.clone(),
                partner_id: entry.partner_id.clone(),
                touchpoint_type: entry.touchpoint_type.clone(),
                timestamp: entry.timestamp,
                weight: entry.weight,
            })
            .collect()
    }

    pub async fn into_repository(self) -> Result<InMemoryAttributionRepository> {
        let repository = InMemoryAttributionRepository::new();
        for touchpoint in self.touchpoints() {
            repository.append_touchpoint(touchpoint).await?;
        }
        for entry in self.partners {
            repository
                .save_partner(Partner {
                    name: entry.name.unwrap_or_else(|| entry.id.0.clone()),
                    id: entry.id,
                    commission_rate: entry.commission_rate,
                })
                .await;
        }
        repository.save_deal(self.deal).await;
        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::DealFile;

    const DEAL: &str = r#"{
        "deal": { "id": "deal-1", "amount": "1000" },
        "touchpoints": [
            { "partner_id": "p-1", "type": "referral", "timestamp": "2026-03-01T09:00:00Z" },
            { "id": "given", "partner_id": "p-2", "type": "webinar",
              "timestamp": "2026-03-02T09:00:00Z", "weight": 12.5 }
        ],
        "partners": [ { "id": "p-1", "commission_rate": 10 } ]
    }"#;

    #[test]
    fn fills_missing_touchpoint_ids_in_file_order() {
        let file: DealFile = serde_json::from_str(DEAL).expect("parse");
        let touchpoints = file.touchpoints();

        assert_eq!(touchpoints[0].id.0, "deal-1-tp-1");
        assert_eq!(touchpoints[1].id.0, "given");
        assert_eq!(touchpoints[1].weight, Some(12.5));
        assert!(!touchpoints[1].touchpoint_type.is_recognized());
    }

    #[test]
    fn rejects_touchpoints_from_another_deal() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("deal.json");
        fs::write(
            &path,
            r#"{
                "deal": { "id": "deal-1", "amount": "1000" },
                "touchpoints": [ { "deal_id": "deal-2", "partner_id": "p-1",
                                   "type": "demo", "timestamp": "2026-03-01T09:00:00Z" } ]
            }"#,
        )
        .expect("write");

        let error = DealFile::read(&path).expect_err("mismatched deal");
        assert!(error.to_string().contains("deal-2"));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = DealFile::read(Path::new("/nonexistent/deal.json")).expect_err("missing");
        assert!(error.to_string().contains("/nonexistent/deal.json"));
    }
}
