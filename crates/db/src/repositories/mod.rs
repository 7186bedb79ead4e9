use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use ordermate_core::domain::customer::{normalize_email, Customer, CustomerId};
use ordermate_core::domain::order::{Order, OrderId};

pub mod customer;
pub mod memory;
pub mod order;
pub mod rtdb;

pub use customer::SqlCustomerRepository;
pub use memory::{InMemoryCustomerRepository, InMemoryOrderRepository};
pub use order::SqlOrderRepository;
pub use rtdb::{RtdbClient, RtdbCustomerRepository, RtdbOrderRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("query not supported by store: {0}")]
    QueryUnsupported(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;

    /// Indexed equality lookup on an already normalized email.
    ///
    /// Stores without a usable index return `QueryUnsupported`; callers should
    /// go through [`CustomerRepository::find_by_email`] which handles that.
    async fn query_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError>;

    /// Writes a new customer. Returns `Conflict` if the store rejects a duplicate.
    async fn insert(&self, customer: Customer) -> Result<(), RepositoryError>;

    /// Replaces the address of an existing customer and returns the updated
    /// record, or `None` if the id is unknown.
    async fn update_address(
        &self,
        id: &CustomerId,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError>;

    /// Looks a customer up by email, falling back to a full scan when the
    /// indexed query errors or misses.
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Ok(None);
        }

        match self.query_by_email(&normalized).await {
            Ok(Some(customer)) => return Ok(Some(customer)),
            Ok(None) => {
                debug!(event_name = "store.customer.email_query_miss", "indexed email query missed; scanning");
            }
            Err(error) => {
                debug!(
                    event_name = "store.customer.email_query_failed",
                    error = %error,
                    "indexed email query failed; scanning"
                );
            }
        }

        let customers = self.list().await?;
        Ok(customers.into_iter().find(|customer| customer.matches_email(&normalized)))
    }

    async fn find_by_name_and_address(
        &self,
        name: &str,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.list().await?;
        Ok(customers
            .into_iter()
            .find(|customer| customer.name == name && customer.address == address))
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn insert(&self, order: Order) -> Result<(), RepositoryError>;

    /// Persists the mutable parts of an order: its items and shipping address.
    async fn save(&self, order: &Order) -> Result<(), RepositoryError>;
}
