use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use partnerline_core::{
    ApplicationError, AttributionModel, AttributionResult, AttributionStore, Deal, DealId,
    DealSource, DomainError, Partner, PartnerDirectory, PartnerId, Touchpoint, TouchpointId,
    TouchpointSource, TouchpointType,
};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use super::RepositoryError;
use crate::DbPool;

/// SQLite-backed storage for partners, deals, touchpoints and attribution
/// records. Decimals are stored as TEXT and timestamps as RFC 3339 with
/// nanosecond precision so text order matches time order.
pub struct SqlAttributionRepository {
    pool: DbPool,
}

impl SqlAttributionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_partner(&self, partner: &Partner) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO partner (id, name, commission_rate)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                commission_rate = excluded.commission_rate
            "#,
        )
        .bind(&partner.id.0)
        .bind(&partner.name)
        .bind(partner.commission_rate.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_deal(&self, deal: &Deal) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO deal (id, amount, closed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                amount = excluded.amount,
                closed_at = excluded.closed_at
            "#,
        )
        .bind(&deal.id.0)
        .bind(deal.amount.to_string())
        .bind(deal.closed_at.map(format_timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Touchpoints are append-only; re-inserting an existing id fails.
    pub async fn append_touchpoint(&self, touchpoint: &Touchpoint) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO touchpoint (id, deal_id, partner_id, touchpoint_type, occurred_at, weight)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&touchpoint.id.0)
        .bind(&touchpoint.deal_id.0)
        .bind(&touchpoint.partner_id.0)
        .bind(touchpoint.touchpoint_type.as_str())
        .bind(format_timestamp(touchpoint.timestamp))
        .bind(touchpoint.weight)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_deal(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let row = sqlx::query("SELECT id, amount, closed_at FROM deal WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Deal, RepositoryError> {
            let amount: String = row.try_get("amount")?;
            let closed_at: Option<String> = row.try_get("closed_at")?;
            Ok(Deal {
                id: DealId(row.try_get("id")?),
                amount: parse_decimal("deal.amount", &amount)?,
                closed_at: closed_at
                    .map(|raw| parse_timestamp("deal.closed_at", &raw))
                    .transpose()?,
            })
        })
        .transpose()
    }

    async fn load_touchpoints(&self, deal_id: &DealId) -> Result<Vec<Touchpoint>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, deal_id, partner_id, touchpoint_type, occurred_at, weight
            FROM touchpoint
            WHERE deal_id = ?
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(&deal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(touchpoint_from_row).collect()
    }

    async fn load_commission_rates(
        &self,
        partner_ids: &[PartnerId],
    ) -> Result<BTreeMap<PartnerId, Decimal>, RepositoryError> {
        if partner_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let placeholders = vec!["?"; partner_ids.len()].join(", ");
        let sql = format!("SELECT id, commission_rate FROM partner WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for partner_id in partner_ids {
            query = query.bind(&partner_id.0);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(PartnerId, Decimal), RepositoryError> {
                let rate: String = row.try_get("commission_rate")?;
                let rate = parse_decimal("partner.commission_rate", &rate)?;
                Ok((PartnerId(row.try_get("id")?), rate))
            })
            .collect()
    }

    async fn write_results(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
        results: &[AttributionResult],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM attribution_result WHERE deal_id = ? AND model = ?")
            .bind(&deal_id.0)
            .bind(model.as_str())
            .execute(&mut *tx)
            .await?;

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO attribution_result (
                    deal_id, model, partner_id, percentage, amount, commission_amount, calculated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&result.deal_id.0)
            .bind(result.model.as_str())
            .bind(&result.partner_id.0)
            .bind(result.percentage.to_string())
            .bind(result.amount.to_string())
            .bind(result.commission_amount.to_string())
            .bind(format_timestamp(result.calculated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "attribution.store.replaced",
            deal_id = %deal_id,
            model = %model,
            record_count = results.len(),
            "attribution records replaced"
        );
        Ok(())
    }

    async fn load_results(
        &self,
        deal_id: &DealId,
        model: Option<AttributionModel>,
    ) -> Result<Vec<AttributionResult>, RepositoryError> {
        let model = model.map(AttributionModel::as_str);
        let rows = sqlx::query(
            r#"
            SELECT deal_id, model, partner_id, percentage, amount, commission_amount, calculated_at
            FROM attribution_result
            WHERE deal_id = ? AND (? IS NULL OR model = ?)
            ORDER BY model ASC, partner_id ASC
            "#,
        )
        .bind(&deal_id.0)
        .bind(model)
        .bind(model)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(result_from_row).collect()
    }
}

#[async_trait]
impl DealSource for SqlAttributionRepository {
    async fn find_deal(&self, id: &DealId) -> Result<Option<Deal>, ApplicationError> {
        Ok(self.load_deal(id).await?)
    }
}

#[async_trait]
impl TouchpointSource for SqlAttributionRepository {
    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<Touchpoint>, ApplicationError> {
        Ok(self.load_touchpoints(deal_id).await?)
    }
}

#[async_trait]
impl PartnerDirectory for SqlAttributionRepository {
    async fn commission_rates(
        &self,
        partner_ids: &[PartnerId],
    ) -> Result<BTreeMap<PartnerId, Decimal>, ApplicationError> {
        Ok(self.load_commission_rates(partner_ids).await?)
    }
}

#[async_trait]
impl AttributionStore for SqlAttributionRepository {
    async fn replace_for_deal(
        &self,
        deal_id: &DealId,
        model: AttributionModel,
        results: Vec<AttributionResult>,
    ) -> Result<(), ApplicationError> {
        ensure_results_match(deal_id, model, &results)?;
        Ok(self.write_results(deal_id, model, &results).await?)
    }

    async fn list_for_deal(
        &self,
        deal_id: &DealId,
        model: Option<AttributionModel>,
    ) -> Result<Vec<AttributionResult>, ApplicationError> {
        Ok(self.load_results(deal_id, model).await?)
    }
}

pub(crate) fn ensure_results_match(
    deal_id: &DealId,
    model: AttributionModel,
    results: &[AttributionResult],
) -> Result<(), DomainError> {
    match results.iter().find(|result| &result.deal_id != deal_id || result.model != model) {
        Some(stray) => Err(DomainError::InvariantViolation(format!(
            "record for deal `{}` under `{}` cannot replace deal `{deal_id}` under `{model}`",
            stray.deal_id, stray.model
        ))),
        None => Ok(()),
    }
}

fn touchpoint_from_row(row: &SqliteRow) -> Result<Touchpoint, RepositoryError> {
    let kind: String = row.try_get("touchpoint_type")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(Touchpoint {
        id: TouchpointId(row.try_get("id")?),
        deal_id: DealId(row.try_get("deal_id")?),
        partner_id: PartnerId(row.try_get("partner_id")?),
        touchpoint_type: TouchpointType::from(kind),
        timestamp: parse_timestamp("touchpoint.occurred_at", &occurred_at)?,
        weight: row.try_get("weight")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<AttributionResult, RepositoryError> {
    let model: String = row.try_get("model")?;
    let percentage: String = row.try_get("percentage")?;
    let amount: String = row.try_get("amount")?;
    let commission_amount: String = row.try_get("commission_amount")?;
    let calculated_at: String = row.try_get("calculated_at")?;

    Ok(AttributionResult {
        partner_id: PartnerId(row.try_get("partner_id")?),
        deal_id: DealId(row.try_get("deal_id")?),
        model: model
            .parse()
            .map_err(|error: DomainError| RepositoryError::Decode(error.to_string()))?,
        percentage: parse_decimal("attribution_result.percentage", &percentage)?,
        amount: parse_decimal("attribution_result.amount", &amount)?,
        commission_amount: parse_decimal(
            "attribution_result.commission_amount",
            &commission_amount,
        )?,
        calculated_at: parse_timestamp("attribution_result.calculated_at", &calculated_at)?,
    })
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid {field} `{raw}`: {error}")))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|error| RepositoryError::Decode(format!("invalid {field} `{raw}`: {error}")))
}
