use std::collections::HashMap;

use tokio::sync::RwLock;

use ordermate_core::domain::customer::{Customer, CustomerId};
use ordermate_core::domain::order::{Order, OrderId};

use super::{CustomerRepository, OrderRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
}

impl InMemoryCustomerRepository {
    pub async fn len(&self) -> usize {
        self.customers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.customers.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id.0).cloned())
    }

    async fn query_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.values().find(|customer| customer.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.values().cloned().collect())
    }

    async fn insert(&self, customer: Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        if customers.contains_key(&customer.id.0) {
            return Err(RepositoryError::Conflict(format!("customer `{}` already exists", customer.id)));
        }
        customers.insert(customer.id.0.clone(), customer);
        Ok(())
    }

    async fn update_address(
        &self,
        id: &CustomerId,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let mut customers = self.customers.write().await;
        Ok(customers.get_mut(&id.0).map(|customer| {
            customer.address = address.to_string();
            customer.clone()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderRepository {
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id.0) {
            return Err(RepositoryError::Conflict(format!("order `{}` already exists", order.id)));
        }
        orders.insert(order.id.0.clone(), order);
        Ok(())
    }

    async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id.0) {
            Some(stored) => {
                stored.items = order.items.clone();
                stored.shipping_address = order.shipping_address.clone();
            }
            None => {
                orders.insert(order.id.0.clone(), order.clone());
            }
        }
        Ok(())
    }
}
