//! Population of the dimension and fact tables from staging

use std::time::Instant;

use serde::Serialize;
use tokio_postgres::{Row, Transaction};
use tracing::{debug, info};

use super::copy;
use super::error::WarehouseResult;
use super::schema::{
    CUSTOMER_SOURCE_SQL, DIM_ARTICLE_SQL, DIM_DATE_SQL, FACT_SALES_SQL, Namespace,
};
use crate::progress::{PROGRESS_INTERVAL, format_number};
use crate::transform::{CustomerDimRow, StagedCustomer};

/// Rows fetched per round trip from the customer cursor
pub const DEFAULT_FETCH_SIZE: i32 = 200_000;

/// Calendar year covered by the date dimension
pub const DEFAULT_COVERED_YEAR: i32 = 2019;

/// Outcome of the customer dimension load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CustomerLoadStats {
    /// Staged rows read through the cursor
    pub processed: u64,
    /// Rows copied into `dim_customer`
    pub loaded: u64,
}

/// Project staged articles into `dim_article`, ignoring duplicate ids
pub async fn populate_dim_article(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<u64> {
    info!("Populating dim_article from stg_articles");
    let rows = tx.execute(ns.render(DIM_ARTICLE_SQL).as_str(), &[]).await?;
    info!(rows = %format_number(rows), "dim_article populated");
    Ok(rows)
}

fn staged_customer(row: &Row) -> WarehouseResult<StagedCustomer> {
    Ok(StagedCustomer {
        customer_id: row.try_get(0)?,
        fn_flag: row.try_get(1)?,
        active: row.try_get(2)?,
        club_member_status: row.try_get(3)?,
        fashion_news_frequency: row.try_get(4)?,
        age: row.try_get(5)?,
        postal_code: row.try_get(6)?,
    })
}

/// Build `dim_customer` by streaming staged customers through the row transforms
///
/// Rows are read with a server-side portal in batches of `fetch_size`,
/// transformed, written to a temporary CSV and then bulk-copied. One row is
/// kept per customer id; rows without an id are skipped.
pub async fn populate_dim_customer(
    tx: &Transaction<'_>,
    ns: &Namespace,
    fetch_size: i32,
) -> WarehouseResult<CustomerLoadStats> {
    info!("Populating dim_customer with transformations (region_id, age_range)");
    let start = Instant::now();

    let staging_file = tempfile::Builder::new()
        .prefix("dim_customer-")
        .suffix(".csv")
        .tempfile()?;
    let mut writer = csv::Writer::from_writer(staging_file.as_file());

    let mut stats = CustomerLoadStats::default();
    {
        let query = ns.render(CUSTOMER_SOURCE_SQL);
        let portal = tx.bind(query.as_str(), &[]).await?;
        loop {
            let rows = tx.query_portal(&portal, fetch_size).await?;
            if rows.is_empty() {
                break;
            }
            let batch_len = rows.len();
            for row in &rows {
                writer.serialize(CustomerDimRow::from(staged_customer(row)?))?;
                stats.processed += 1;
                if stats.processed % PROGRESS_INTERVAL == 0 {
                    info!(
                        processed = %format_number(stats.processed),
                        "Processed customer rows"
                    );
                }
            }
            if batch_len < fetch_size as usize {
                break;
            }
        }
    }
    writer.flush()?;
    drop(writer);
    debug!(
        file = %staging_file.path().display(),
        processed = stats.processed,
        "Customer rows transformed"
    );

    stats.loaded = copy::load(
        tx,
        &ns.qualify("dim_customer"),
        staging_file.path(),
        &CustomerDimRow::COLUMNS,
        true,
    )
    .await?;

    info!(
        processed = %format_number(stats.processed),
        loaded = %format_number(stats.loaded),
        duration_ms = start.elapsed().as_millis() as u64,
        "dim_customer populated"
    );
    Ok(stats)
}

/// Generate one `dim_date` row per day of `year`, joined to staged weather
pub async fn populate_dim_date(
    tx: &Transaction<'_>,
    ns: &Namespace,
    year: i32,
) -> WarehouseResult<u64> {
    info!(year, "Populating dim_date (calendar days joined to weather)");
    let rows = tx.execute(ns.render(DIM_DATE_SQL).as_str(), &[&year]).await?;
    info!(rows = %format_number(rows), "dim_date populated");
    Ok(rows)
}

/// Insert every staged transaction that resolves against all three dimensions
pub async fn populate_fact_sales(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<u64> {
    info!("Populating fact_sales from stg_transactions");
    let start = Instant::now();
    let rows = tx.execute(ns.render(FACT_SALES_SQL).as_str(), &[]).await?;
    info!(
        rows = %format_number(rows),
        duration_ms = start.elapsed().as_millis() as u64,
        "fact_sales populated"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_source_skips_missing_ids() {
        let sql = Namespace::default().render(CUSTOMER_SOURCE_SQL);
        assert!(sql.contains("FROM hm_dwh.stg_customers"));
        assert!(sql.contains("WHERE customer_id IS NOT NULL"));
        assert!(sql.contains("DISTINCT ON (customer_id)"));
    }

    #[test]
    fn test_fact_sales_inner_joins_all_dimensions() {
        let sql = Namespace::default().render(FACT_SALES_SQL);
        for join in [
            "JOIN hm_dwh.dim_date d",
            "JOIN hm_dwh.dim_customer c",
            "JOIN hm_dwh.dim_article a",
        ] {
            assert!(sql.contains(join), "{join}");
        }
        assert!(!sql.contains("LEFT JOIN"));
        assert!(sql.contains("t.price,\n    1\n"));
    }

    #[test]
    fn test_dim_date_is_parameterized_by_year() {
        assert!(DIM_DATE_SQL.contains("make_date($1::int, 1, 1)"));
        assert!(DIM_DATE_SQL.contains("make_date($1::int, 12, 31)"));
        assert!(DIM_DATE_SQL.contains("LEFT JOIN {schema}.stg_weather w"));
        assert!(DIM_DATE_SQL.contains("EXTRACT(ISODOW FROM d)"));
    }

    #[test]
    fn test_dim_article_ignores_conflicts() {
        assert!(DIM_ARTICLE_SQL.contains("ON CONFLICT (article_id) DO NOTHING"));
    }
}
