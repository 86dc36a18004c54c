use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledger_core::{DomainError, DomainResult, Entity, ProductId};

use crate::policy::WarrantyPolicy;

const MAX_NAME_LEN: usize = 200;
const MAX_SERIAL_LEN: usize = 100;
const MAX_PARTY_LEN: usize = 150;

/// A registered consumer product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    /// Unique across the ledger (enforced by the store).
    pub serial: String,
    pub purchase_date: NaiveDate,
    /// Declared coverage length. Rows written before validation existed may hold
    /// non-positive values; the evaluator substitutes the policy default for those.
    pub warranty_months: i32,
    pub retailer: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub price: Option<u64>,
}

/// Command: register a product at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub name: String,
    pub serial: String,
    pub purchase_date: NaiveDate,
    pub warranty_months: Option<i32>,
    pub brand: Option<String>,
    pub retailer: Option<String>,
    pub price: Option<i64>,
}

impl Product {
    /// Validate and normalize an intake command into a new product.
    ///
    /// Serial uniqueness needs the store and is checked by the caller.
    pub fn register(id: ProductId, cmd: &RegisterProduct, policy: &WarrantyPolicy) -> DomainResult<Self> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }

        let serial = cmd.serial.trim();
        if serial.is_empty() {
            return Err(DomainError::validation("serial is required"));
        }
        if serial.chars().count() > MAX_SERIAL_LEN {
            return Err(DomainError::validation(format!(
                "serial must be at most {MAX_SERIAL_LEN} characters"
            )));
        }

        let warranty_months = match cmd.warranty_months {
            Some(m) if m <= 0 => {
                return Err(DomainError::validation("warranty months must be positive"));
            }
            Some(m) => m,
            None => i32::try_from(policy.default_months)
                .map_err(|_| DomainError::invariant("default warranty months out of range"))?,
        };

        let price = match cmd.price {
            Some(p) => Some(
                u64::try_from(p).map_err(|_| DomainError::validation("price cannot be negative"))?,
            ),
            None => None,
        };

        Ok(Self {
            id,
            name: name.to_string(),
            brand: normalize_optional("brand", cmd.brand.as_deref())?,
            serial: serial.to_string(),
            purchase_date: cmd.purchase_date,
            warranty_months,
            retailer: normalize_optional("retailer", cmd.retailer.as_deref())?,
            price,
        })
    }

    /// Case-insensitive match on name or serial (product search).
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle) || self.serial.to_lowercase().contains(&needle)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

fn normalize_optional(field: &str, value: Option<&str>) -> DomainResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > MAX_PARTY_LEN {
        return Err(DomainError::validation(format!(
            "{field} must be at most {MAX_PARTY_LEN} characters"
        )));
    }
    Ok(Some(value.to_string()))
}
