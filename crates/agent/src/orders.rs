use std::sync::Arc;

use tracing::info;

use ordermate_core::domain::customer::Customer;
use ordermate_core::domain::order::{ItemMap, LineItem, Order, OrderDelta, OrderId};
use ordermate_core::errors::{ApplicationError, DomainError};
use ordermate_db::repositories::OrderRepository;

use crate::locks::KeyedLocks;
use crate::resolution::{read_error, write_error};

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    locks: KeyedLocks,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>, locks: KeyedLocks) -> Self {
        Self { orders, locks }
    }

    /// Places a new order. A blank or missing shipping address falls back to
    /// the customer's stored address.
    pub async fn create(
        &self,
        customer: &Customer,
        items: &[LineItem],
        shipping_address: Option<&str>,
    ) -> Result<Order, ApplicationError> {
        let items = ItemMap::from_requested(items)?;
        let shipping_address = shipping_address
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .unwrap_or(customer.address.as_str())
            .to_string();

        let order = Order::place(customer.id.clone(), items, shipping_address);
        self.orders.insert(order.clone()).await.map_err(write_error)?;

        info!(
            event_name = "store.order.created",
            order_id = %order.id,
            customer_id = %order.customer_id,
            line_count = order.items.len(),
            "placed order"
        );
        Ok(order)
    }

    pub async fn get(&self, id: &OrderId) -> Result<Order, ApplicationError> {
        self.orders
            .find_by_id(id)
            .await
            .map_err(read_error)?
            .ok_or_else(|| DomainError::order_not_found(&id.0).into())
    }

    /// Read-modify-write of an order's items and address, serialized per order.
    pub async fn apply_delta(
        &self,
        id: &OrderId,
        delta: &OrderDelta,
        new_shipping_address: Option<&str>,
    ) -> Result<Order, ApplicationError> {
        validate_delta(delta)?;

        let _guard = self.locks.lock(format!("order:{id}")).await;
        let mut order = self.get(id).await?;

        order.items = order.items.apply_delta(delta);
        if let Some(address) = new_shipping_address.map(str::trim).filter(|value| !value.is_empty()) {
            order.shipping_address = address.to_string();
        }

        self.orders.save(&order).await.map_err(write_error)?;

        info!(
            event_name = "store.order.modified",
            order_id = %order.id,
            line_count = order.items.len(),
            "applied order delta"
        );
        Ok(order)
    }
}

fn validate_delta(delta: &OrderDelta) -> Result<(), DomainError> {
    let blank_sku = delta.add_items.iter().any(|item| item.sku.trim().is_empty())
        || delta.update_quantities.iter().any(|update| update.sku.trim().is_empty());
    if blank_sku {
        return Err(DomainError::Validation("item sku cannot be empty".to_string()));
    }
    Ok(())
}
