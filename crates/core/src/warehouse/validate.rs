//! Post-load row counts and data quality counters
//!
//! Counters are observational only; nothing here can fail a run on its own.

use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use tracing::info;

use super::error::WarehouseResult;
use super::schema::Namespace;
use crate::progress::format_count;

/// Counters collected after a load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub dim_region_rows: i64,
    pub dim_article_rows: i64,
    pub dim_customer_rows: i64,
    pub dim_date_rows: i64,
    pub fact_sales_rows: i64,
    pub unknown_age_customers: i64,
    pub null_region_customers: i64,
    pub staged_transactions: i64,
    /// Staged transactions with no matching date, customer or article
    pub dropped_transactions: i64,
}

/// A single counting query
struct Check {
    label: &'static str,
    sql: &'static str,
}

const CHECKS: [Check; 8] = [
    Check {
        label: "dim_region rows",
        sql: "SELECT COUNT(*) FROM {schema}.dim_region",
    },
    Check {
        label: "dim_article rows",
        sql: "SELECT COUNT(*) FROM {schema}.dim_article",
    },
    Check {
        label: "dim_customer rows",
        sql: "SELECT COUNT(*) FROM {schema}.dim_customer",
    },
    Check {
        label: "dim_date rows",
        sql: "SELECT COUNT(*) FROM {schema}.dim_date",
    },
    Check {
        label: "fact_sales rows",
        sql: "SELECT COUNT(*) FROM {schema}.fact_sales",
    },
    Check {
        label: "customers with UNKNOWN age_range",
        sql: "SELECT COUNT(*) FROM {schema}.dim_customer WHERE age_range = 'UNKNOWN'",
    },
    Check {
        label: "customers with NULL region_id",
        sql: "SELECT COUNT(*) FROM {schema}.dim_customer WHERE region_id IS NULL",
    },
    Check {
        label: "stg_transactions rows",
        sql: "SELECT COUNT(*) FROM {schema}.stg_transactions",
    },
];

impl ValidationReport {
    /// Build a report from the counters in [`CHECKS`] order
    fn from_counts(counts: [i64; 8]) -> Self {
        let [
            dim_region_rows,
            dim_article_rows,
            dim_customer_rows,
            dim_date_rows,
            fact_sales_rows,
            unknown_age_customers,
            null_region_customers,
            staged_transactions,
        ] = counts;
        Self {
            dim_region_rows,
            dim_article_rows,
            dim_customer_rows,
            dim_date_rows,
            fact_sales_rows,
            unknown_age_customers,
            null_region_customers,
            staged_transactions,
            dropped_transactions: (staged_transactions - fact_sales_rows).max(0),
        }
    }

    /// Labelled counters in display order
    pub fn entries(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("dim_region rows", self.dim_region_rows),
            ("dim_article rows", self.dim_article_rows),
            ("dim_customer rows", self.dim_customer_rows),
            ("dim_date rows", self.dim_date_rows),
            ("fact_sales rows", self.fact_sales_rows),
            ("customers with UNKNOWN age_range", self.unknown_age_customers),
            ("customers with NULL region_id", self.null_region_customers),
            ("stg_transactions rows", self.staged_transactions),
            (
                "transactions dropped by dimension joins",
                self.dropped_transactions,
            ),
        ]
    }

    /// Log every counter at info level
    pub fn log(&self) {
        for (label, value) in self.entries() {
            info!(check = label, value, "  {}: {}", label, format_count(value));
        }
    }
}

/// Run every counter query and log the results
pub async fn validate(tx: &Transaction<'_>, ns: &Namespace) -> WarehouseResult<ValidationReport> {
    info!("Validation checks");
    let mut counts = [0i64; 8];
    for (slot, check) in counts.iter_mut().zip(CHECKS.iter()) {
        let row = tx.query_one(ns.render(check.sql).as_str(), &[]).await?;
        *slot = row.try_get(0)?;
        tracing::debug!(check = check.label, value = *slot, "Counter read");
    }
    let report = ValidationReport::from_counts(counts);
    report.log();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_transactions() {
        let report = ValidationReport::from_counts([10, 3, 4, 365, 7, 1, 0, 9]);
        assert_eq!(report.fact_sales_rows, 7);
        assert_eq!(report.staged_transactions, 9);
        assert_eq!(report.dropped_transactions, 2);
        assert_eq!(report.dim_date_rows, 365);
    }

    #[test]
    fn test_dropped_transactions_never_negative() {
        let report = ValidationReport::from_counts([10, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(report.dropped_transactions, 0);
    }

    #[test]
    fn test_entries_follow_check_labels() {
        let report = ValidationReport::default();
        let entries = report.entries();
        assert_eq!(entries.len(), CHECKS.len() + 1);
        for (entry, check) in entries.iter().zip(CHECKS.iter()) {
            assert_eq!(entry.0, check.label);
        }
    }

    #[test]
    fn test_checks_are_namespaced() {
        let ns = Namespace::new("dwh_test").unwrap();
        for check in &CHECKS {
            assert!(ns.render(check.sql).contains("dwh_test."));
        }
    }
}
