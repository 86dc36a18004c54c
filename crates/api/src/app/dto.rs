use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use ledger_core::{DomainError, ProductId};
use ledger_warranty::{OpenRepair, Product, RegisterProduct, RepairStatus, WarrantyWindow};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial: String,
    pub purchase_date: NaiveDate,
    pub warranty_months: Option<i32>,
    pub brand: Option<String>,
    pub retailer: Option<String>,
    /// Minor currency units. Kept as a raw number so decimals get a targeted message.
    pub price: Option<serde_json::Number>,
}

impl TryFrom<CreateProductRequest> for RegisterProduct {
    type Error = DomainError;

    fn try_from(req: CreateProductRequest) -> Result<Self, Self::Error> {
        let price = req
            .price
            .map(|n| {
                n.as_i64().ok_or_else(|| {
                    DomainError::validation(format!(
                        "price must be a whole number of minor currency units (e.g. cents), got {n}"
                    ))
                })
            })
            .transpose()?;

        Ok(RegisterProduct {
            name: req.name,
            serial: req.serial,
            purchase_date: req.purchase_date,
            warranty_months: req.warranty_months,
            brand: req.brand,
            retailer: req.retailer,
            price,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRepairRequest {
    pub product_id: String,
    pub opened_at: Option<DateTime<FixedOffset>>,
    pub status: Option<String>,
    pub cost: Option<i64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub consumer_opted_for_repair: bool,
}

impl CreateRepairRequest {
    pub fn into_command(self) -> Result<OpenRepair, DomainError> {
        let product_id: ProductId = self.product_id.parse()?;
        let status = self.status.as_deref().map(str::parse::<RepairStatus>).transpose()?;
        Ok(OpenRepair {
            product_id,
            opened_at: self.opened_at,
            status,
            cost: self.cost,
            notes: self.notes,
            consumer_opted_for_repair: self.consumer_opted_for_repair,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRepairStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepairListQuery {
    pub status: Option<String>,
}

impl RepairListQuery {
    pub fn status(&self) -> Result<Option<RepairStatus>, DomainError> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn warranty_to_json(product: &Product, window: &WarrantyWindow) -> serde_json::Value {
    json!({
        "product_id": product.id.to_string(),
        "in_warranty": window.in_warranty,
        "expires_on": window.expires_on.to_string(),
        "reason": window.reason,
    })
}
