//! Infrastructure layer: configuration and storage adapters.

pub mod config;
pub mod store;

pub use config::{ConfigError, LedgerConfig};
pub use store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore, StoreError};
