use std::sync::Arc;

use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::info;

use ordermate_core::config::{StoreBackend, StoreConfig};

use crate::repositories::{
    CustomerRepository, InMemoryCustomerRepository, InMemoryOrderRepository, OrderRepository,
    RepositoryError, RtdbClient, RtdbCustomerRepository, RtdbOrderRepository,
    SqlCustomerRepository, SqlOrderRepository,
};
use crate::{connect_from_config, migrations, DbPool};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("migration execution failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error("store configuration is incomplete: {0}")]
    Configuration(String),
    #[error("store client could not be built: {0}")]
    Client(#[from] RepositoryError),
}

#[derive(Clone)]
enum Probe {
    Memory,
    Sqlite(DbPool),
    Rtdb(RtdbClient),
}

/// The pair of repositories backing one configured store.
#[derive(Clone)]
pub struct RecordStore {
    pub customers: Arc<dyn CustomerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    backend: StoreBackend,
    probe: Probe,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self {
            customers: Arc::new(InMemoryCustomerRepository::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            backend: StoreBackend::Memory,
            probe: Probe::Memory,
        }
    }

    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            customers: Arc::new(SqlCustomerRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            backend: StoreBackend::Sqlite,
            probe: Probe::Sqlite(pool),
        }
    }

    pub fn rtdb(client: RtdbClient) -> Self {
        Self {
            customers: Arc::new(RtdbCustomerRepository::new(client.clone())),
            orders: Arc::new(RtdbOrderRepository::new(client.clone())),
            backend: StoreBackend::Rtdb,
            probe: Probe::Rtdb(client),
        }
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Rtdb => "rtdb",
        }
    }

    /// Round-trips to the backing store without touching any record.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        match &self.probe {
            Probe::Memory => Ok(()),
            Probe::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            Probe::Rtdb(client) => client.ping().await,
        }
    }
}

pub async fn open_store(config: &StoreConfig) -> Result<RecordStore, StoreError> {
    let store = match config.backend {
        StoreBackend::Memory => RecordStore::in_memory(),
        StoreBackend::Sqlite => {
            let pool = connect_from_config(config).await?;
            migrations::run_pending(&pool).await?;
            RecordStore::sqlite(pool)
        }
        StoreBackend::Rtdb => {
            let base_url = config
                .rtdb_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| StoreError::Configuration("store.rtdb_url is not set".to_string()))?;
            let client = RtdbClient::new(base_url, config.rtdb_auth.clone(), config.timeout_secs)?;
            RecordStore::rtdb(client)
        }
    };

    info!(event_name = "store.opened", backend = store.backend_name(), "record store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use ordermate_core::config::{AppConfig, StoreBackend};
    use ordermate_core::domain::customer::{Customer, CustomerLookup};

    use super::{open_store, StoreError};

    #[tokio::test]
    async fn sqlite_store_is_migrated_on_open() {
        let mut config = AppConfig::default().store;
        config.url = "sqlite::memory:".to_string();
        config.max_connections = 1;

        let store = open_store(&config).await.expect("open sqlite store");
        store.ping().await.expect("ping");

        let customer = Customer::from_lookup(&CustomerLookup::new(Some("Alice"), None, None));
        store.customers.insert(customer.clone()).await.expect("insert into migrated schema");
        assert_eq!(store.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn rtdb_store_requires_url() {
        let mut config = AppConfig::default().store;
        config.backend = StoreBackend::Rtdb;
        config.rtdb_url = None;

        let error = open_store(&config).await.err().expect("missing url must fail");
        assert!(matches!(error, StoreError::Configuration(_)));
    }

    #[tokio::test]
    async fn memory_store_pings_without_io() {
        let mut config = AppConfig::default().store;
        config.backend = StoreBackend::Memory;

        let store = open_store(&config).await.expect("open memory store");
        store.ping().await.expect("ping");
        assert_eq!(store.backend_name(), "memory");
    }
}
