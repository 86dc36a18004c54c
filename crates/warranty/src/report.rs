//! Read-side aggregations over products and repairs.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::ProductId;

use crate::evaluator::WarrantyEvaluator;
use crate::product::Product;
use crate::repair::{Repair, RepairStatus};

/// Look-ahead used by the summary report and the default expiring listing.
pub const EXPIRING_SOON_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Every status is present, zero when no repair is in it.
    pub counts_by_status: BTreeMap<RepairStatus, u64>,
    /// Mean age of repairs in days (closed ones up to closure); `None` without repairs.
    pub average_days_open: Option<f64>,
    pub expiring_products: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringProduct {
    pub product: Product,
    pub days_remaining: i64,
}

/// Index repairs by the product they belong to.
pub fn group_by_product(repairs: &[Repair]) -> HashMap<ProductId, Vec<Repair>> {
    let mut grouped: HashMap<ProductId, Vec<Repair>> = HashMap::new();
    for repair in repairs {
        grouped.entry(repair.product_id).or_default().push(repair.clone());
    }
    grouped
}

/// Products whose coverage ends within `days`, soonest first (ties by name).
pub fn expiring_within(
    evaluator: &WarrantyEvaluator,
    products: &[Product],
    repairs: &[Repair],
    days: i64,
    today: NaiveDate,
) -> Vec<ExpiringProduct> {
    let by_product = group_by_product(repairs);

    let mut expiring: Vec<ExpiringProduct> = products
        .iter()
        .filter_map(|product| {
            let history = by_product.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
            evaluator
                .is_expiring_within(product, history, days, today)
                .then(|| ExpiringProduct {
                    product: product.clone(),
                    days_remaining: evaluator.days_remaining(product, history, today),
                })
        })
        .collect();

    expiring.sort_by(|a, b| {
        a.days_remaining
            .cmp(&b.days_remaining)
            .then_with(|| a.product.name.cmp(&b.product.name))
    });
    expiring
}

/// Repair counts, mean repair age and the number of products expiring soon.
pub fn summarize(
    evaluator: &WarrantyEvaluator,
    products: &[Product],
    repairs: &[Repair],
    now: DateTime<Utc>,
) -> SummaryReport {
    let mut counts_by_status: BTreeMap<RepairStatus, u64> =
        RepairStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for repair in repairs {
        *counts_by_status.entry(repair.status).or_default() += 1;
    }

    let average_days_open = (!repairs.is_empty()).then(|| {
        let total: f64 = repairs.iter().map(|r| r.days_open(now)).sum();
        total / repairs.len() as f64
    });

    let expiring_products =
        expiring_within(evaluator, products, repairs, EXPIRING_SOON_DAYS, now.date_naive()).len() as u64;

    SummaryReport {
        counts_by_status,
        average_days_open,
        expiring_products,
    }
}
