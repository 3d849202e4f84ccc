use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_PARTNER_IDS: &[&str] = &["partner-northwind", "partner-contoso", "partner-fabrikam"];
const DEMO_DEAL_IDS: &[&str] = &["deal-demo-001", "deal-demo-002"];
const DEMO_TOUCHPOINT_COUNT: usize = 6;

/// Small deterministic dataset used by `partnerline seed` and integration
/// tests: three partners, one closed deal with four touchpoints and one open
/// deal with two.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            partner_ids: DEMO_PARTNER_IDS.to_vec(),
            deal_ids: DEMO_DEAL_IDS.to_vec(),
            touchpoint_count: DEMO_TOUCHPOINT_COUNT,
        })
    }

    /// Removes the dataset along with any attribution records computed for it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let deals = sql_array_from_ids(DEMO_DEAL_IDS);
        let partners = sql_array_from_ids(DEMO_PARTNER_IDS);
        let mut tx = pool.begin().await?;

        sqlx::query(&format!("DELETE FROM attribution_result WHERE deal_id IN {deals}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM touchpoint WHERE deal_id IN {deals}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM deal WHERE id IN {deals}")).execute(&mut *tx).await?;
        sqlx::query(&format!("DELETE FROM partner WHERE id IN {partners}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub partner_ids: Vec<&'static str>,
    pub deal_ids: Vec<&'static str>,
    pub touchpoint_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn count(pool: &DbPool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .expect("count rows")
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(DemoDataset::SQL.contains("INSERT OR IGNORE INTO touchpoint"));
    }

    #[tokio::test]
    async fn load_is_idempotent_and_clean_removes_everything() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoDataset::load(&pool).await.expect("load");
        let second = DemoDataset::load(&pool).await.expect("reload");
        assert_eq!(first, second);
        assert_eq!(count(&pool, "partner").await, 3);
        assert_eq!(count(&pool, "deal").await, 2);
        assert_eq!(count(&pool, "touchpoint").await, first.touchpoint_count as i64);

        DemoDataset::clean(&pool).await.expect("clean");
        for table in ["attribution_result", "touchpoint", "deal", "partner"] {
            assert_eq!(count(&pool, table).await, 0, "{table} should be empty");
        }
    }
}
