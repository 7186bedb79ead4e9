use std::sync::Arc;

use tracing::{debug, info};

use ordermate_core::domain::customer::{Customer, CustomerId, CustomerLookup};
use ordermate_core::errors::{ApplicationError, DomainError};
use ordermate_db::repositories::{CustomerRepository, RepositoryError};

use crate::locks::KeyedLocks;

/// Finds or creates customers. This is the only place that decides whether a
/// loosely specified identity refers to an existing record.
#[derive(Clone)]
pub struct CustomerResolver {
    customers: Arc<dyn CustomerRepository>,
    locks: KeyedLocks,
}

impl CustomerResolver {
    pub fn new(customers: Arc<dyn CustomerRepository>, locks: KeyedLocks) -> Self {
        Self { customers, locks }
    }

    /// Resolution order: exact email, then exact name and address, then a new
    /// record if a name or email is present.
    ///
    /// Concurrent calls with the same normalized identity are serialized, so
    /// they resolve to one record.
    pub async fn resolve(&self, lookup: &CustomerLookup) -> Result<Customer, ApplicationError> {
        if !lookup.can_create() {
            return Err(DomainError::Resolution.into());
        }

        let _guard = self.locks.lock(lookup.lock_key()).await;

        if let Some(existing) = self.find_existing(lookup).await? {
            debug!(
                event_name = "store.customer.resolved",
                customer_id = %existing.id,
                "resolved existing customer"
            );
            return Ok(existing);
        }

        let customer = Customer::from_lookup(lookup);
        match self.customers.insert(customer.clone()).await {
            Ok(()) => {
                info!(
                    event_name = "store.customer.created",
                    customer_id = %customer.id,
                    has_email = lookup.has_email(),
                    "created customer"
                );
                Ok(customer)
            }
            Err(RepositoryError::Conflict(reason)) if lookup.has_email() => {
                debug!(
                    event_name = "store.customer.insert_conflict",
                    reason = %reason,
                    "customer inserted concurrently; re-reading"
                );
                self.customers
                    .find_by_email(&lookup.email)
                    .await
                    .map_err(read_error)?
                    .ok_or_else(|| ApplicationError::StoreWrite(reason))
            }
            Err(error) => Err(write_error(error)),
        }
    }

    pub async fn get(&self, id: &CustomerId) -> Result<Customer, ApplicationError> {
        self.customers
            .find_by_id(id)
            .await
            .map_err(read_error)?
            .ok_or_else(|| DomainError::customer_not_found(&id.0).into())
    }

    pub async fn update_address(
        &self,
        id: &CustomerId,
        new_address: &str,
    ) -> Result<Customer, ApplicationError> {
        let address = new_address.trim();
        if address.is_empty() {
            return Err(DomainError::Validation("new_address cannot be empty".to_string()).into());
        }

        let _guard = self.locks.lock(format!("customer:id:{id}")).await;
        let updated = self
            .customers
            .update_address(id, address)
            .await
            .map_err(write_error)?
            .ok_or_else(|| ApplicationError::from(DomainError::customer_not_found(&id.0)))?;

        info!(
            event_name = "store.customer.address_updated",
            customer_id = %updated.id,
            "updated customer address"
        );
        Ok(updated)
    }

    async fn find_existing(
        &self,
        lookup: &CustomerLookup,
    ) -> Result<Option<Customer>, ApplicationError> {
        if lookup.has_email() {
            if let Some(customer) =
                self.customers.find_by_email(&lookup.email).await.map_err(read_error)?
            {
                return Ok(Some(customer));
            }
        }

        if lookup.has_name_and_address() {
            return self
                .customers
                .find_by_name_and_address(&lookup.name, &lookup.address)
                .await
                .map_err(read_error);
        }

        Ok(None)
    }
}

pub(crate) fn read_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::StoreRead(error.to_string())
}

pub(crate) fn write_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::StoreWrite(error.to_string())
}
