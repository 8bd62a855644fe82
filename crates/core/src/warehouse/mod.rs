//! PostgreSQL warehouse: connection, schema management and loading
//!
//! All loading steps take an open [`Transaction`] so the caller decides the
//! transaction boundaries. The steps are:
//!
//! 1. [`schema::ensure_schema_and_staging`] / [`schema::ensure_target_tables`]
//! 2. [`schema::truncate_for_reload`]
//! 3. [`load_staging`] bulk-copies the four CSV sources
//! 4. [`populate`] fills the dimensions and the fact table
//! 5. [`validate::validate`] reports row counts

pub mod copy;
pub mod error;
pub mod populate;
pub mod schema;
pub mod validate;

pub use error::{WarehouseError, WarehouseResult};
pub use populate::{CustomerLoadStats, DEFAULT_COVERED_YEAR, DEFAULT_FETCH_SIZE};
pub use schema::{DEFAULT_SCHEMA, Namespace, StagingTable};
pub use validate::ValidationReport;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, error, info};

use crate::archive::SourcePaths;
use crate::config::ConnectionSettings;

/// An open warehouse connection
pub struct Warehouse {
    client: Client,
    connection: JoinHandle<()>,
    target: String,
}

impl Warehouse {
    /// Connect to the configured PostgreSQL server
    pub async fn connect(settings: &ConnectionSettings) -> WarehouseResult<Self> {
        let target = settings.masked();
        info!(target = %target, "Connecting to PostgreSQL");
        let (client, connection) = settings.to_pg_config().connect(NoTls).await?;

        // Spawn connection handler
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!(target = %target, "Connected");
        Ok(Self {
            client,
            connection,
            target,
        })
    }

    /// Client used to open transactions
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Close the connection and wait for the connection task to finish
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            error!(error = %e, "PostgreSQL connection task failed");
        }
        debug!(target = %self.target, "Connection closed");
    }
}

/// Bulk-copy every staging source in [`StagingTable::LOAD_ORDER`]
///
/// Returns the rows copied per table in load order.
pub async fn load_staging(
    tx: &Transaction<'_>,
    ns: &Namespace,
    paths: &SourcePaths,
) -> WarehouseResult<Vec<(StagingTable, u64)>> {
    let mut loaded = Vec::with_capacity(StagingTable::LOAD_ORDER.len());
    for table in StagingTable::LOAD_ORDER {
        let rows = copy::load(
            tx,
            &ns.qualify(table.name()),
            paths.get(table.source()),
            table.columns(),
            true,
        )
        .await?;
        loaded.push((table, rows));
    }
    Ok(loaded)
}
