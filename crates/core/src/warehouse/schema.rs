//! Database schema definitions for staging and star-schema tables
//!
//! DDL and DML live in `sql/` next to this crate and are embedded at build
//! time. The only substitution applied is the `{schema}` namespace, which is
//! validated as a plain SQL identifier first.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_postgres::Transaction;
use tracing::{info, warn};

use super::error::{WarehouseError, WarehouseResult};
use crate::archive::SourceFile;

/// Namespace used when none is configured
pub const DEFAULT_SCHEMA: &str = "hm_dwh";

const PLACEHOLDER: &str = "{schema}";

pub(crate) const STAGING_DDL: &str = include_str!("../../sql/001_staging.sql");
pub(crate) const TARGET_DDL: &str = include_str!("../../sql/002_targets.sql");
pub(crate) const RESET_SQL: &str = include_str!("../../sql/reset.sql");
pub(crate) const TRUNCATE_SQL: &str = include_str!("../../sql/truncate.sql");
pub(crate) const DIM_ARTICLE_SQL: &str = include_str!("../../sql/dim_article.sql");
pub(crate) const CUSTOMER_SOURCE_SQL: &str = include_str!("../../sql/customer_source.sql");
pub(crate) const DIM_DATE_SQL: &str = include_str!("../../sql/dim_date.sql");
pub(crate) const FACT_SALES_SQL: &str = include_str!("../../sql/fact_sales.sql");

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// A validated schema name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate a schema name
    pub fn new(name: impl Into<String>) -> WarehouseResult<Self> {
        let name = name.into();
        if IDENTIFIER.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(WarehouseError::InvalidNamespace(name))
        }
    }

    /// Schema name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Schema-qualified table name
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.0, table)
    }

    /// Substitute this namespace into a SQL template
    pub fn render(&self, template: &str) -> String {
        template.replace(PLACEHOLDER, &self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_SCHEMA.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staging tables and the CSV columns they receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingTable {
    Articles,
    Customers,
    Weather,
    Transactions,
}

impl StagingTable {
    /// Load order; the transaction log is by far the largest and goes last
    pub const LOAD_ORDER: [StagingTable; 4] = [
        Self::Articles,
        Self::Customers,
        Self::Weather,
        Self::Transactions,
    ];

    /// Unqualified table name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Articles => "stg_articles",
            Self::Customers => "stg_customers",
            Self::Weather => "stg_weather",
            Self::Transactions => "stg_transactions",
        }
    }

    /// Source file feeding this table
    pub fn source(&self) -> SourceFile {
        match self {
            Self::Articles => SourceFile::Articles,
            Self::Customers => SourceFile::Customers,
            Self::Weather => SourceFile::Weather,
            Self::Transactions => SourceFile::Transactions,
        }
    }

    /// CSV columns in file order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Articles => &[
                "article_id",
                "product_code",
                "prod_name",
                "product_type_no",
                "product_type_name",
                "product_group_name",
                "graphical_appearance_no",
                "graphical_appearance_name",
                "colour_group_code",
                "colour_group_name",
                "perceived_colour_value_id",
                "perceived_colour_value_name",
                "perceived_colour_master_id",
                "perceived_colour_master_name",
                "department_no",
                "department_name",
                "index_code",
                "index_name",
                "index_group_no",
                "index_group_name",
                "section_no",
                "section_name",
                "garment_group_no",
                "garment_group_name",
                "detail_desc",
            ],
            Self::Customers => &[
                "customer_id",
                "fn",
                "active",
                "club_member_status",
                "fashion_news_frequency",
                "age",
                "postal_code",
            ],
            Self::Weather => &["day", "weather_code"],
            Self::Transactions => &[
                "t_dat",
                "customer_id",
                "article_id",
                "price",
                "sales_channel_id",
            ],
        }
    }
}

/// Target tables of the star schema
pub const TARGET_TABLES: [&str; 5] = [
    "dim_region",
    "dim_date",
    "dim_customer",
    "dim_article",
    "fact_sales",
];

/// Create the schema and the staging tables if absent
pub async fn ensure_schema_and_staging(
    tx: &Transaction<'_>,
    ns: &Namespace,
) -> WarehouseResult<()> {
    info!(schema = %ns, "Ensuring staging tables exist");
    tx.batch_execute(&ns.render(STAGING_DDL)).await?;
    Ok(())
}

/// Create the dimension and fact tables if absent and seed the region lookup
pub async fn ensure_target_tables(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<()> {
    info!(schema = %ns, "Ensuring target tables exist");
    tx.batch_execute(&ns.render(TARGET_DDL)).await?;
    Ok(())
}

/// Drop every target and staging table, cascading to dependents
pub async fn reset(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<()> {
    warn!(schema = %ns, "Reset enabled: dropping target and staging tables");
    tx.batch_execute(&ns.render(RESET_SQL)).await?;
    Ok(())
}

/// Empty staging tables and the fact/dimension tables before a reload
///
/// The fact table and the dimensions it references are truncated in one
/// statement; `dim_region` keeps its seed rows.
pub async fn truncate_for_reload(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<()> {
    info!(schema = %ns, "Truncating staging and target tables for clean load");
    tx.batch_execute(&ns.render(TRUNCATE_SQL)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TEMPLATES: [&str; 8] = [
        STAGING_DDL,
        TARGET_DDL,
        RESET_SQL,
        TRUNCATE_SQL,
        DIM_ARTICLE_SQL,
        CUSTOMER_SOURCE_SQL,
        DIM_DATE_SQL,
        FACT_SALES_SQL,
    ];

    #[test]
    fn test_namespace_validation() {
        assert!(Namespace::new("hm_dwh").is_ok());
        assert!(Namespace::new("_private2").is_ok());
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("2019").is_err());
        assert!(Namespace::new("hm-dwh").is_err());
        assert!(Namespace::new("x; DROP SCHEMA public").is_err());
        assert!(Namespace::new("a".repeat(64)).is_err());
        assert_eq!(Namespace::default().as_str(), DEFAULT_SCHEMA);
    }

    #[test]
    fn test_render_replaces_every_placeholder() {
        let ns = Namespace::new("warehouse").unwrap();
        for template in ALL_TEMPLATES {
            assert!(template.contains(PLACEHOLDER));
            let sql = ns.render(template);
            assert!(!sql.contains(PLACEHOLDER));
            assert!(sql.contains("warehouse."));
        }
    }

    #[test]
    fn test_staging_ddl_has_every_loaded_column() {
        for table in StagingTable::LOAD_ORDER {
            let start = STAGING_DDL
                .find(&format!("{{schema}}.{} (", table.name()))
                .unwrap();
            let end = start + STAGING_DDL[start..].find(");").unwrap();
            let body = &STAGING_DDL[start..end];
            for column in table.columns() {
                assert!(body.contains(&format!("    {column} ")), "{column}");
            }
        }
    }

    #[test]
    fn test_target_ddl_constraints() {
        let ddl = TARGET_DDL;
        for table in TARGET_TABLES {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {{schema}}.{table}")));
        }
        assert!(ddl.contains("CHECK (region_id BETWEEN 0 AND 9)"));
        assert!(ddl.contains("CHECK (weekday BETWEEN 1 AND 7)"));
        assert!(ddl.contains("CHECK (week_of_year BETWEEN 1 AND 53)"));
        assert!(ddl.contains("CHECK (month BETWEEN 1 AND 12)"));
        assert!(ddl.contains("CHECK (season IN ('Winter', 'Spring', 'Summer', 'Autumn'))"));
        assert!(ddl.contains("CHECK (age IS NULL OR age BETWEEN 0 AND 120)"));
        assert!(ddl.contains("CHECK (price >= 0)"));
        assert!(ddl.contains("CHECK (quantity > 0)"));
        assert!(ddl.contains("REFERENCES {schema}.dim_date (date)"));
        assert!(ddl.contains("REFERENCES {schema}.dim_customer (customer_id)"));
        assert!(ddl.contains("REFERENCES {schema}.dim_article (article_id)"));
        assert!(ddl.contains("REFERENCES {schema}.dim_region (region_id)"));
    }

    #[test]
    fn test_region_seed_has_ten_rows() {
        let start = TARGET_DDL.find("INSERT INTO {schema}.dim_region").unwrap();
        let end = start + TARGET_DDL[start..].find("ON CONFLICT (region_id) DO NOTHING").unwrap();
        let seed = &TARGET_DDL[start..end];
        for id in 0..=9 {
            assert!(seed.contains(&format!("({id}, '")), "region {id}");
        }
        assert_eq!(seed.matches("')").count(), 10);
    }

    #[test]
    fn test_truncate_clears_fact_and_dimensions_together() {
        let statements: Vec<&str> = TRUNCATE_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| s.contains("TRUNCATE"))
            .collect();
        assert_eq!(statements.len(), 2);

        let fact = statements
            .iter()
            .find(|s| s.contains("fact_sales"))
            .unwrap();
        for table in ["dim_article", "dim_customer", "dim_date"] {
            assert!(fact.contains(&format!("{{schema}}.{table}")));
        }
        assert!(fact.contains("RESTART IDENTITY"));
        assert!(!TRUNCATE_SQL.contains("dim_region"));
    }

    #[test]
    fn test_reset_drops_all_tables() {
        for table in TARGET_TABLES
            .iter()
            .copied()
            .chain(StagingTable::LOAD_ORDER.iter().map(|t| t.name()))
        {
            assert!(RESET_SQL.contains(&format!("DROP TABLE IF EXISTS {{schema}}.{table} CASCADE")));
        }
    }

    #[test]
    fn test_staging_sources() {
        assert_eq!(StagingTable::Weather.source(), SourceFile::Weather);
        assert_eq!(StagingTable::Transactions.columns().len(), 5);
        assert_eq!(StagingTable::Articles.columns().len(), 25);
        assert_eq!(StagingTable::LOAD_ORDER[3], StagingTable::Transactions);
    }
}
