use crate::commands::{current_thread_runtime, CommandResult};
use ordermate_agent::locks::KeyedLocks;
use ordermate_agent::orders::OrderService;
use ordermate_core::config::{AppConfig, LoadOptions};
use ordermate_core::domain::order::OrderId;
use ordermate_core::errors::{ApplicationError, DomainError};
use ordermate_db::open_store;

/// Looks an order up through the same service `get_order_status` uses and
/// prints it as the envelope's `data`.
pub fn run(order_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "order",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "order",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let store = open_store(&config.store)
            .await
            .map_err(|error| ApplicationError::StoreRead(error.to_string()))?;
        let orders = OrderService::new(store.orders.clone(), KeyedLocks::new());
        orders.get(&OrderId(order_id.trim().to_string())).await
    });

    let order = match result {
        Ok(order) => order,
        Err(ApplicationError::Domain(error @ DomainError::NotFound { .. })) => {
            return CommandResult::failure("order", "lookup", error.to_string(), 6);
        }
        Err(error) => {
            return CommandResult::failure("order", "store_connectivity", error.to_string(), 4);
        }
    };

    match serde_json::to_value(&order) {
        Ok(data) => CommandResult::success_with_data(
            "order",
            format!("order {} is {}", order.id, order.status.as_str()),
            Some(data),
        ),
        Err(error) => CommandResult::failure(
            "order",
            "serialization",
            format!("failed to serialize order `{}`: {error}", order.id),
            7,
        ),
    }
}
