//! Service wiring: the store collaborator plus the warranty evaluator, and the
//! request-scoped operations the routes call.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use ledger_core::{DomainError, ProductId, RepairId};
use ledger_infra::{InMemoryLedgerStore, LedgerConfig, LedgerStore, SqliteLedgerStore, StoreError};
use ledger_warranty::{
    report, ExpiringProduct, OpenRepair, Product, RegisterProduct, Repair, RepairStatus, SummaryReport,
    WarrantyEvaluator, WarrantyWindow,
};

/// Error returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct AppServices {
    store: Arc<dyn LedgerStore>,
    evaluator: WarrantyEvaluator,
}

impl AppServices {
    pub fn new(store: Arc<dyn LedgerStore>, evaluator: WarrantyEvaluator) -> Self {
        Self { store, evaluator }
    }

    pub async fn register_product(&self, cmd: RegisterProduct) -> ServiceResult<Product> {
        let product = Product::register(ProductId::new(), &cmd, self.evaluator.policy())?;
        match self.store.insert_product(&product).await {
            Ok(()) => {
                tracing::info!(product_id = %product.id, serial = %product.serial, "product registered");
                Ok(product)
            }
            Err(StoreError::DuplicateSerial(_)) => Err(DomainError::conflict("serial must be unique").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_products(&self, query: Option<&str>) -> ServiceResult<Vec<Product>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        Ok(self.store.list_products(query).await?)
    }

    pub async fn get_product(&self, id: ProductId) -> ServiceResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub async fn delete_product(&self, id: ProductId) -> ServiceResult<()> {
        if !self.store.delete_product(id).await? {
            return Err(DomainError::not_found().into());
        }
        tracing::info!(product_id = %id, "product deleted with its repairs");
        Ok(())
    }

    /// Evaluate coverage for one product, repairs included.
    pub async fn warranty_status(&self, id: ProductId, today: NaiveDate) -> ServiceResult<(Product, WarrantyWindow)> {
        let product = self.get_product(id).await?;
        let repairs = self.store.repairs_for_product(id).await?;
        let window = self.evaluator.evaluate(&product, &repairs, today);
        Ok((product, window))
    }

    pub async fn product_repairs(&self, id: ProductId) -> ServiceResult<Vec<Repair>> {
        let product = self.get_product(id).await?;
        Ok(self.store.repairs_for_product(product.id).await?)
    }

    pub async fn expiring_products(&self, days: i64, today: NaiveDate) -> ServiceResult<Vec<ExpiringProduct>> {
        if days <= 0 {
            return Err(DomainError::validation("days must be greater than zero").into());
        }
        let products = self.store.list_products(None).await?;
        let repairs = self.store.list_repairs(None).await?;
        Ok(report::expiring_within(&self.evaluator, &products, &repairs, days, today))
    }

    pub async fn open_repair(&self, cmd: OpenRepair, now: DateTime<Utc>) -> ServiceResult<Repair> {
        self.get_product(cmd.product_id).await?;
        let repair = Repair::open(RepairId::new(), &cmd, now)?;
        match self.store.insert_repair(&repair).await {
            Ok(()) => {
                tracing::info!(repair_id = %repair.id, product_id = %repair.product_id, "repair opened");
                Ok(repair)
            }
            // Product deleted between the lookup and the insert.
            Err(StoreError::ProductNotFound(_)) => Err(DomainError::not_found().into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_repairs(&self, status: Option<RepairStatus>) -> ServiceResult<Vec<Repair>> {
        Ok(self.store.list_repairs(status).await?)
    }

    pub async fn get_repair(&self, id: RepairId) -> ServiceResult<Repair> {
        self.store
            .get_repair(id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub async fn transition_repair(
        &self,
        id: RepairId,
        next: RepairStatus,
        now: DateTime<Utc>,
    ) -> ServiceResult<Repair> {
        let mut repair = self.get_repair(id).await?;
        let from = repair.status;
        repair.transition_to(next, now).map_err(DomainError::from)?;

        if !self.store.update_repair_status(&repair, from).await? {
            return Err(self.lost_update(id, next).await);
        }
        tracing::info!(repair_id = %id, %from, to = %repair.status, "repair status changed");
        Ok(repair)
    }

    /// The repair changed (or vanished) between load and write: judge the
    /// request against the current state instead of overwriting it.
    async fn lost_update(&self, id: RepairId, next: RepairStatus) -> ServiceError {
        let current = match self.store.get_repair(id).await {
            Ok(Some(current)) => current,
            Ok(None) => return DomainError::not_found().into(),
            Err(e) => return e.into(),
        };
        tracing::warn!(repair_id = %id, current = %current.status, requested = %next, "concurrent status change");
        match current.status.transition(next) {
            Err(e) => DomainError::from(e).into(),
            Ok(_) => DomainError::conflict("repair was modified concurrently; retry the request").into(),
        }
    }

    pub async fn summary(&self, now: DateTime<Utc>) -> ServiceResult<SummaryReport> {
        let products = self.store.list_products(None).await?;
        let repairs = self.store.list_repairs(None).await?;
        Ok(report::summarize(&self.evaluator, &products, &repairs, now))
    }
}

/// Pick the store from configuration: SQLite when `DATABASE_URL` is set,
/// in-memory otherwise.
pub async fn build_services(config: &LedgerConfig) -> Result<AppServices, StoreError> {
    let store: Arc<dyn LedgerStore> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("using sqlite store");
            Arc::new(SqliteLedgerStore::connect(url).await?)
        }
        None => Arc::new(InMemoryLedgerStore::new()),
    };
    Ok(AppServices::new(store, WarrantyEvaluator::new(config.warranty)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    use ledger_warranty::WarrantyPolicy;

    /// Serves one pre-captured repair snapshot on the next `get_repair`,
    /// standing in for a request that loaded it before a concurrent write.
    struct StaleReads {
        inner: InMemoryLedgerStore,
        stale: Mutex<Option<Repair>>,
    }

    #[async_trait]
    impl LedgerStore for StaleReads {
        async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
            self.inner.insert_product(product).await
        }
        async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.get_product(id).await
        }
        async fn list_products(&self, query: Option<&str>) -> Result<Vec<Product>, StoreError> {
            self.inner.list_products(query).await
        }
        async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
            self.inner.delete_product(id).await
        }
        async fn insert_repair(&self, repair: &Repair) -> Result<(), StoreError> {
            self.inner.insert_repair(repair).await
        }
        async fn get_repair(&self, id: RepairId) -> Result<Option<Repair>, StoreError> {
            let stale = self.stale.lock().unwrap().take();
            match stale {
                Some(snapshot) => Ok(Some(snapshot)),
                None => self.inner.get_repair(id).await,
            }
        }
        async fn list_repairs(&self, status: Option<RepairStatus>) -> Result<Vec<Repair>, StoreError> {
            self.inner.list_repairs(status).await
        }
        async fn repairs_for_product(&self, product_id: ProductId) -> Result<Vec<Repair>, StoreError> {
            self.inner.repairs_for_product(product_id).await
        }
        async fn update_repair_status(&self, repair: &Repair, expected: RepairStatus) -> Result<bool, StoreError> {
            self.inner.update_repair_status(repair, expected).await
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<StaleReads>, AppServices, Repair) {
        let store = Arc::new(StaleReads {
            inner: InMemoryLedgerStore::new(),
            stale: Mutex::new(None),
        });
        let services = AppServices::new(store.clone(), WarrantyEvaluator::new(WarrantyPolicy::default()));

        let product = services
            .register_product(RegisterProduct {
                name: "Washer".to_string(),
                serial: "WS-1".to_string(),
                purchase_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
                warranty_months: None,
                brand: None,
                retailer: None,
                price: None,
            })
            .await
            .unwrap();
        let repair = services
            .open_repair(
                OpenRepair {
                    product_id: product.id,
                    opened_at: None,
                    status: None,
                    cost: None,
                    notes: None,
                    consumer_opted_for_repair: true,
                },
                now(),
            )
            .await
            .unwrap();
        let repair = services
            .transition_repair(repair.id, RepairStatus::InProgress, now())
            .await
            .unwrap();
        (store, services, repair)
    }

    #[tokio::test]
    async fn racing_close_does_not_overwrite_the_first_close() {
        let (store, services, in_progress) = setup().await;

        services
            .transition_repair(in_progress.id, RepairStatus::Fixed, now())
            .await
            .unwrap();

        // Second request still sees InProgress.
        *store.stale.lock().unwrap() = Some(in_progress.clone());
        let err = services
            .transition_repair(in_progress.id, RepairStatus::Rejected, now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Validation { code: "repair_closed", .. })
        ));

        let stored = services.get_repair(in_progress.id).await.unwrap();
        assert_eq!(stored.status, RepairStatus::Fixed);
        assert!(stored.qualifies_for_extension());
    }

    #[tokio::test]
    async fn stale_request_is_judged_against_current_state() {
        let (store, services, in_progress) = setup().await;

        // Loaded while Open, but another request moved it to InProgress.
        let mut open = in_progress.clone();
        open.status = RepairStatus::Open;
        *store.stale.lock().unwrap() = Some(open);

        // Open -> InProgress looked valid to the stale request; the current
        // state InProgress -> InProgress is a no-op, reported as such.
        let err = services
            .transition_repair(in_progress.id, RepairStatus::InProgress, now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Validation { code: "already_in_status", .. })
        ));
    }
}
