use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use ledger_core::{ProductId, RepairId};
use ledger_warranty::{Product, Repair, RepairStatus};

use super::{newest_first, LedgerStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    repairs: HashMap<RepairId, Repair>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.products.values().any(|p| p.serial == product.serial) {
            return Err(StoreError::DuplicateSerial(product.serial.clone()));
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self, query: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let tables = self.read()?;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| query.is_none_or(|q| p.matches(q)))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        if tables.products.remove(&id).is_none() {
            return Ok(false);
        }
        tables.repairs.retain(|_, r| r.product_id != id);
        Ok(true)
    }

    async fn insert_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.products.contains_key(&repair.product_id) {
            return Err(StoreError::ProductNotFound(repair.product_id));
        }
        tables.repairs.insert(repair.id, repair.clone());
        Ok(())
    }

    async fn get_repair(&self, id: RepairId) -> Result<Option<Repair>, StoreError> {
        Ok(self.read()?.repairs.get(&id).cloned())
    }

    async fn list_repairs(&self, status: Option<RepairStatus>) -> Result<Vec<Repair>, StoreError> {
        let tables = self.read()?;
        let mut repairs: Vec<Repair> = tables
            .repairs
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut repairs);
        Ok(repairs)
    }

    async fn repairs_for_product(&self, product_id: ProductId) -> Result<Vec<Repair>, StoreError> {
        let tables = self.read()?;
        let mut repairs: Vec<Repair> = tables
            .repairs
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        newest_first(&mut repairs);
        Ok(repairs)
    }

    async fn update_repair_status(&self, repair: &Repair, expected: RepairStatus) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        match tables.repairs.get_mut(&repair.id) {
            Some(stored) if stored.status == expected => {
                stored.status = repair.status;
                stored.closed_at = repair.closed_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
