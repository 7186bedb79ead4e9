pub mod config;
pub mod domain;
pub mod errors;

pub use domain::customer::{Customer, CustomerId, CustomerLookup};
pub use domain::order::{
    ItemMap, LineItem, Order, OrderDelta, OrderId, OrderStatus, QuantityUpdate,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
