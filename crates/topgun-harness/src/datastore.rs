// crates/topgun-harness/src/datastore.rs
// ============================================================================
// Module: Data Store
// Description: Warm connection to the deployment's backing Postgres.
// Purpose: Let scenarios inspect and dump system state directly.
// Dependencies: sqlx
// ============================================================================

//! ## Overview
//! After every deploy the controller connects to the database job with the
//! deployment's fixed test credentials. The connection is established eagerly
//! so an unreachable database fails setup instead of the first query.

use std::net::IpAddr;
use std::net::SocketAddr;
use std::time::Duration;

use sqlx::postgres::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::HarnessResult;

/// Port the database job listens on.
pub const DATABASE_PORT: u16 = 5432;

/// Role, password, and database baked into test manifests.
const DATABASE_USER: &str = "atc";
const DATABASE_PASSWORD: &str = "dummy-password";
const DATABASE_NAME: &str = "atc";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the connection URL for the database at `address`.
#[must_use]
pub fn connection_url(address: IpAddr) -> String {
    let socket = SocketAddr::new(address, DATABASE_PORT);
    format!(
        "postgres://{DATABASE_USER}:{DATABASE_PASSWORD}@{socket}/{DATABASE_NAME}?sslmode=disable"
    )
}

/// Open pool against one deployment's database.
#[derive(Debug, Clone)]
pub struct DataStore {
    address: IpAddr,
    pool: PgPool,
}

impl DataStore {
    /// Connects to the database at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Datastore`] when no connection can be
    /// established.
    pub async fn connect(address: IpAddr) -> HarnessResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&connection_url(address))
            .await?;
        tracing::info!(%address, "connected to deployment database");
        Ok(Self {
            address,
            pool,
        })
    }

    /// Returns the database address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns the pool for ad hoc queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Datastore`] when the query fails.
    pub async fn ping(&self) -> HarnessResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!(address = %self.address, "closed deployment database");
    }
}
