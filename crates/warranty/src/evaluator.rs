//! Warranty coverage evaluation.
//!
//! Coverage runs from the purchase date for the product's warranty length.
//! A repair that the consumer explicitly opted into (the right-to-repair
//! guarantee) and that ended up `Fixed` restarts a coverage window from its
//! closure date; the latest window wins, windows never stack.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::policy::WarrantyPolicy;
use crate::product::Product;
use crate::repair::Repair;

/// Coverage verdict for a product on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyWindow {
    pub in_warranty: bool,
    pub expires_on: NaiveDate,
    pub reason: String,
}

/// Pure warranty calculator parameterized by a [`WarrantyPolicy`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WarrantyEvaluator {
    policy: WarrantyPolicy,
}

impl WarrantyEvaluator {
    pub fn new(policy: WarrantyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WarrantyPolicy {
        &self.policy
    }

    /// Expiration from the purchase date alone.
    pub fn base_expiration(&self, product: &Product) -> NaiveDate {
        let months = self.policy.effective_months(product.warranty_months);
        add_months(product.purchase_date, months)
    }

    /// Last covered day, including any right-to-repair extension earned by `repairs`.
    pub fn expiration_date(&self, product: &Product, repairs: &[Repair]) -> NaiveDate {
        repairs
            .iter()
            .filter(|r| r.qualifies_for_extension())
            .filter_map(Repair::closed_on_utc)
            .map(|closed_on| add_months(closed_on, self.policy.repair_extension_months))
            .fold(self.base_expiration(product), NaiveDate::max)
    }

    /// Coverage verdict on `reference_date`; the expiration day itself is still covered.
    pub fn evaluate(&self, product: &Product, repairs: &[Repair], reference_date: NaiveDate) -> WarrantyWindow {
        let expires_on = self.expiration_date(product, repairs);
        let in_warranty = reference_date <= expires_on;
        let reason = if in_warranty {
            format!("Warranty valid until {expires_on}")
        } else {
            format!("Warranty expired on {expires_on}")
        };

        WarrantyWindow {
            in_warranty,
            expires_on,
            reason,
        }
    }

    /// Signed number of days from `reference_date` to the expiration date.
    pub fn days_remaining(&self, product: &Product, repairs: &[Repair], reference_date: NaiveDate) -> i64 {
        self.expiration_date(product, repairs)
            .signed_duration_since(reference_date)
            .num_days()
    }

    /// Coverage ends within the next `days` days. Already-expired products are excluded.
    pub fn is_expiring_within(
        &self,
        product: &Product,
        repairs: &[Repair],
        days: i64,
        reference_date: NaiveDate,
    ) -> bool {
        let remaining = self.days_remaining(product, repairs, reference_date);
        (0..=days).contains(&remaining)
    }
}

/// Calendar month addition clamped to month end; saturates at the end of chrono's range.
fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}
