//! SQLite-backed ledger store.
//!
//! Dates are stored as ISO-8601 text (`YYYY-MM-DD`), repair timestamps as
//! RFC 3339 text so the original offset survives a round trip. Serial
//! uniqueness and the product -> repairs cascade are enforced by the schema.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (unique violation) | `DuplicateSerial` |
//! | Database (foreign key violation) | `ProductNotFound` |
//! | Decode / column type mismatch | `Corrupt` |
//! | Anything else | `Backend` |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use ledger_core::{ProductId, RepairId};
use ledger_warranty::{Product, Repair, RepairStatus};

use super::{newest_first, LedgerStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id              TEXT PRIMARY KEY NOT NULL,
        name            TEXT NOT NULL,
        brand           TEXT NULL,
        serial          TEXT NOT NULL,
        purchase_date   TEXT NOT NULL,
        warranty_months INTEGER NOT NULL DEFAULT 24,
        retailer        TEXT NULL,
        price           INTEGER NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS ix_products_serial ON products (serial)",
    r#"
    CREATE TABLE IF NOT EXISTS repairs (
        id                        TEXT PRIMARY KEY NOT NULL,
        product_id                TEXT NOT NULL REFERENCES products (id) ON DELETE CASCADE,
        status                    TEXT NOT NULL DEFAULT 'open',
        opened_at                 TEXT NOT NULL,
        closed_at                 TEXT NULL,
        cost                      INTEGER NULL,
        notes                     TEXT NULL,
        consumer_opted_for_repair INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_repairs_product_status ON repairs (product_id, status)",
];

const PRODUCT_COLUMNS: &str =
    "id, name, brand, serial, purchase_date, warranty_months, retailer, price";
const REPAIR_COLUMNS: &str =
    "id, product_id, status, opened_at, closed_at, cost, notes, consumer_opted_for_repair";

/// SQLite ledger store.
///
/// `SqlitePool` is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (creating if needed) the database at `database_url` and apply the schema.
    ///
    /// `sqlite::memory:` databases live per connection, so they get a single,
    /// never-recycled connection.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Backend(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(in_memory, "sqlite ledger store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn fetch_repairs(&self, sql: &str, bind: Option<String>) -> Result<Vec<Repair>, StoreError> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_repairs", e))?;

        let mut repairs = rows.iter().map(repair_from_row).collect::<Result<Vec<_>, _>>()?;
        // Offsets differ per row, so text ordering is not chronological.
        newest_first(&mut repairs);
        Ok(repairs)
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let price = product.price.map(to_i64).transpose()?;
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(product.brand.as_deref())
        .bind(&product.serial)
        .bind(product.purchase_date.to_string())
        .bind(i64::from(product.warranty_months))
        .bind(product.retailer.as_deref())
        .bind(price)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error("insert_product", e) {
            StoreError::DuplicateSerial(_) => StoreError::DuplicateSerial(product.serial.clone()),
            other => other,
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    /// Search runs through [`Product::matches`] rather than `LIKE`: SQLite's
    /// `LIKE` treats `%`/`_` as wildcards and folds ASCII case only.
    #[instrument(skip(self), err)]
    async fn list_products(&self, query: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let mut products = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            if query.is_none_or(|q| product.matches(q)) {
                products.push(product);
            }
        }
        Ok(products)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, repair), fields(repair_id = %repair.id, product_id = %repair.product_id), err)]
    async fn insert_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        let cost = repair.cost.map(to_i64).transpose()?;
        sqlx::query(&format!(
            "INSERT INTO repairs ({REPAIR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .bind(repair.id.to_string())
        .bind(repair.product_id.to_string())
        .bind(repair.status.as_str())
        .bind(repair.opened_at.to_rfc3339())
        .bind(repair.closed_at.map(|at| at.to_rfc3339()))
        .bind(cost)
        .bind(repair.notes.as_deref())
        .bind(repair.consumer_opted_for_repair)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error("insert_repair", e) {
            StoreError::ProductNotFound(_) => StoreError::ProductNotFound(repair.product_id),
            other => other,
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(repair_id = %id), err)]
    async fn get_repair(&self, id: RepairId) -> Result<Option<Repair>, StoreError> {
        let row = sqlx::query(&format!("SELECT {REPAIR_COLUMNS} FROM repairs WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_repair", e))?;
        row.as_ref().map(repair_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_repairs(&self, status: Option<RepairStatus>) -> Result<Vec<Repair>, StoreError> {
        match status {
            Some(status) => {
                self.fetch_repairs(
                    &format!("SELECT {REPAIR_COLUMNS} FROM repairs WHERE status = ?1"),
                    Some(status.as_str().to_string()),
                )
                .await
            }
            None => {
                self.fetch_repairs(&format!("SELECT {REPAIR_COLUMNS} FROM repairs"), None)
                    .await
            }
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn repairs_for_product(&self, product_id: ProductId) -> Result<Vec<Repair>, StoreError> {
        self.fetch_repairs(
            &format!("SELECT {REPAIR_COLUMNS} FROM repairs WHERE product_id = ?1"),
            Some(product_id.to_string()),
        )
        .await
    }

    #[instrument(skip(self, repair), fields(repair_id = %repair.id, status = %repair.status, %expected), err)]
    async fn update_repair_status(&self, repair: &Repair, expected: RepairStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE repairs SET status = ?1, closed_at = ?2 WHERE id = ?3 AND status = ?4")
            .bind(repair.status.as_str())
            .bind(repair.closed_at.map(|at| at.to_rfc3339()))
            .bind(repair.id.to_string())
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_repair_status", e))?;
        Ok(result.rows_affected() > 0)
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    let id: String = column(row, "id")?;
    let purchase_date: String = column(row, "purchase_date")?;
    let warranty_months: i64 = column(row, "warranty_months")?;
    let price: Option<i64> = column(row, "price")?;

    Ok(Product {
        id: ProductId::from_uuid(parse_uuid(&id)?),
        name: column(row, "name")?,
        brand: column(row, "brand")?,
        serial: column(row, "serial")?,
        purchase_date: NaiveDate::parse_from_str(&purchase_date, "%Y-%m-%d")
            .map_err(|e| StoreError::Corrupt(format!("purchase_date {purchase_date:?}: {e}")))?,
        warranty_months: i32::try_from(warranty_months)
            .map_err(|_| StoreError::Corrupt(format!("warranty_months out of range: {warranty_months}")))?,
        retailer: column(row, "retailer")?,
        price: price.map(to_u64).transpose()?,
    })
}

fn repair_from_row(row: &SqliteRow) -> Result<Repair, StoreError> {
    let id: String = column(row, "id")?;
    let product_id: String = column(row, "product_id")?;
    let status: String = column(row, "status")?;
    let opened_at: String = column(row, "opened_at")?;
    let closed_at: Option<String> = column(row, "closed_at")?;
    let cost: Option<i64> = column(row, "cost")?;

    Ok(Repair {
        id: RepairId::from_uuid(parse_uuid(&id)?),
        product_id: ProductId::from_uuid(parse_uuid(&product_id)?),
        status: status
            .parse::<RepairStatus>()
            .map_err(|_| StoreError::Corrupt(format!("unknown repair status {status:?}")))?,
        opened_at: parse_timestamp(&opened_at)?,
        closed_at: closed_at.as_deref().map(parse_timestamp).transpose()?,
        cost: cost.map(to_u64).transpose()?,
        notes: column(row, "notes")?,
        consumer_opted_for_repair: column(row, "consumer_opted_for_repair")?,
    })
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("id {raw:?}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, StoreError> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn to_i64(amount: u64) -> Result<i64, StoreError> {
    i64::try_from(amount).map_err(|_| StoreError::Backend(format!("amount too large: {amount}")))
}

fn to_u64(amount: i64) -> Result<u64, StoreError> {
    u64::try_from(amount).map_err(|_| StoreError::Corrupt(format!("negative amount: {amount}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.is_unique_violation() {
                StoreError::DuplicateSerial(msg)
            } else if db_err.is_foreign_key_violation() {
                StoreError::ProductNotFound(ProductId::from_uuid(Uuid::nil()))
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn store() -> SqliteLedgerStore {
        SqliteLedgerStore::connect("sqlite::memory:").await.unwrap()
    }

    fn product(name: &str, serial: &str) -> Product {
        Product {
            id: ProductId::new(),
            name: name.to_string(),
            brand: Some("Acme".to_string()),
            serial: serial.to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            warranty_months: 24,
            retailer: None,
            price: Some(49_999),
        }
    }

    fn repair(product_id: ProductId, opened_at: DateTime<FixedOffset>) -> Repair {
        Repair {
            id: RepairId::new(),
            product_id,
            status: RepairStatus::Open,
            opened_at,
            closed_at: None,
            cost: Some(1_250),
            notes: Some("hinge".to_string()),
            consumer_opted_for_repair: true,
        }
    }

    #[tokio::test]
    async fn product_round_trips_and_serial_is_unique() {
        let store = store().await;
        let p = product("Laptop", "SN-1");
        store.insert_product(&p).await.unwrap();

        assert_eq!(store.get_product(p.id).await.unwrap(), Some(p.clone()));

        let err = store.insert_product(&product("Clone", "SN-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSerial(s) if s == "SN-1"));
    }

    #[tokio::test]
    async fn search_matches_name_or_serial_case_insensitively() {
        let store = store().await;
        store.insert_product(&product("Toaster", "TST-9")).await.unwrap();
        store.insert_product(&product("Camera", "CAM-1")).await.unwrap();

        let all = store.list_products(None).await.unwrap();
        assert_eq!(all.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["Camera", "Toaster"]);

        let hits = store.list_products(Some("cam")).await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = store.list_products(Some("tst-")).await.unwrap();
        assert_eq!(hits[0].name, "Toaster");
    }

    #[tokio::test]
    async fn repair_round_trip_keeps_offset_and_orders_newest_first() {
        let store = store().await;
        let p = product("Laptop", "SN-1");
        store.insert_product(&p).await.unwrap();

        let plus2 = FixedOffset::east_opt(2 * 3600).unwrap();
        // 09:00+02:00 is earlier than 08:00Z on the same day.
        let early = plus2.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap().fixed_offset();

        let first = repair(p.id, early);
        let second = repair(p.id, late);
        store.insert_repair(&first).await.unwrap();
        store.insert_repair(&second).await.unwrap();

        let stored = store.get_repair(first.id).await.unwrap().unwrap();
        assert_eq!(stored, first);
        assert_eq!(stored.opened_at.offset(), &plus2);

        let history = store.repairs_for_product(p.id).await.unwrap();
        assert_eq!(history.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn orphan_repairs_are_rejected() {
        let store = store().await;
        let missing = ProductId::new();
        let err = store
            .insert_repair(&repair(missing, Utc::now().fixed_offset()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn deleting_a_product_cascades_to_repairs() {
        let store = store().await;
        let p = product("Laptop", "SN-1");
        store.insert_product(&p).await.unwrap();
        store.insert_repair(&repair(p.id, Utc::now().fixed_offset())).await.unwrap();

        assert!(store.delete_product(p.id).await.unwrap());
        assert!(store.list_repairs(None).await.unwrap().is_empty());
        assert!(!store.delete_product(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn status_update_and_filtering() {
        let store = store().await;
        let p = product("Laptop", "SN-1");
        store.insert_product(&p).await.unwrap();
        let mut r = repair(p.id, Utc::now().fixed_offset());
        store.insert_repair(&r).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 4, 3, 12, 0, 0).unwrap();
        r.transition_to(RepairStatus::InProgress, now).unwrap();
        assert!(store.update_repair_status(&r, RepairStatus::Open).await.unwrap());
        r.transition_to(RepairStatus::Fixed, now).unwrap();
        assert!(store.update_repair_status(&r, RepairStatus::InProgress).await.unwrap());

        let fixed = store.list_repairs(Some(RepairStatus::Fixed)).await.unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].closed_at, Some(now.fixed_offset()));
        assert!(store.list_repairs(Some(RepairStatus::Open)).await.unwrap().is_empty());

        let unknown = repair(p.id, Utc::now().fixed_offset());
        assert!(!store.update_repair_status(&unknown, RepairStatus::Open).await.unwrap());
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_overwrite_a_closed_repair() {
        let store = store().await;
        let p = product("Laptop", "SN-1");
        store.insert_product(&p).await.unwrap();
        let mut r = repair(p.id, Utc::now().fixed_offset());
        store.insert_repair(&r).await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 4, 3, 12, 0, 0).unwrap();
        r.transition_to(RepairStatus::InProgress, now).unwrap();
        assert!(store.update_repair_status(&r, RepairStatus::Open).await.unwrap());

        let mut a = store.get_repair(r.id).await.unwrap().unwrap();
        let mut b = a.clone();
        a.transition_to(RepairStatus::Fixed, now).unwrap();
        assert!(store.update_repair_status(&a, RepairStatus::InProgress).await.unwrap());

        b.transition_to(RepairStatus::Rejected, now).unwrap();
        assert!(!store.update_repair_status(&b, RepairStatus::InProgress).await.unwrap());

        let stored = store.get_repair(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RepairStatus::Fixed);
        assert_eq!(stored.closed_at, Some(now.fixed_offset()));
    }

    #[tokio::test]
    async fn search_treats_wildcard_characters_literally() {
        let store = store().await;
        store.insert_product(&product("Kettle", "SN-1")).await.unwrap();
        store.insert_product(&product("Fan 100%", "FAN_1")).await.unwrap();

        let hits = store.list_products(Some("SN_1")).await.unwrap();
        assert!(hits.is_empty());
        let hits = store.list_products(Some("n_1")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].serial, "FAN_1");

        let hits = store.list_products(Some("%")).await.unwrap();
        assert_eq!(hits.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["Fan 100%"]);
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let store = store().await;
        store.insert_product(&product("Ölradiator", "OR-1")).await.unwrap();

        assert_eq!(store.list_products(Some("ölRAD")).await.unwrap().len(), 1);
    }
}
