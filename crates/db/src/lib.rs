pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use store::{open_store, RecordStore, StoreError};
