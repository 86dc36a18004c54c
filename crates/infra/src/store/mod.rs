//! Product/repair storage boundary.
//!
//! The warranty logic works on snapshots; this trait is how the request layer
//! loads and persists them. Implementations must keep product serials unique
//! and delete a product's repairs together with the product.

use async_trait::async_trait;
use thiserror::Error;

use ledger_core::{ProductId, RepairId};
use ledger_warranty::{Product, Repair, RepairStatus};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Storage operation error.
///
/// These are **infrastructure errors** (constraints, backend failures) as
/// opposed to domain errors (validation, transitions).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serial already registered: {0}")]
    DuplicateSerial(String),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a product; fails with `DuplicateSerial` if the serial is taken.
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Products ordered by name, optionally filtered by a case-insensitive
    /// substring of name or serial.
    async fn list_products(&self, query: Option<&str>) -> Result<Vec<Product>, StoreError>;

    /// Delete a product and all of its repairs. Returns whether it existed.
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;

    /// Insert a repair; fails with `ProductNotFound` if the owner is missing.
    async fn insert_repair(&self, repair: &Repair) -> Result<(), StoreError>;

    async fn get_repair(&self, id: RepairId) -> Result<Option<Repair>, StoreError>;

    /// Repairs ordered by `opened_at`, newest first.
    async fn list_repairs(&self, status: Option<RepairStatus>) -> Result<Vec<Repair>, StoreError>;

    /// A product's repairs, newest first.
    async fn repairs_for_product(&self, product_id: ProductId) -> Result<Vec<Repair>, StoreError>;

    /// Persist the status and closure timestamp of a repair, but only while the
    /// stored status is still `expected` (compare-and-set).
    /// Returns `false` when the repair is missing or was changed in between.
    async fn update_repair_status(&self, repair: &Repair, expected: RepairStatus) -> Result<bool, StoreError>;
}

pub(crate) fn newest_first(repairs: &mut [Repair]) {
    repairs.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
}
