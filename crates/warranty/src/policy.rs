//! Warranty policy knobs supplied by configuration.

use serde::{Deserialize, Serialize};

/// Coverage rules applied by the [`WarrantyEvaluator`](crate::WarrantyEvaluator).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyPolicy {
    /// Coverage length used when a product declares no positive warranty length.
    pub default_months: u32,
    /// Coverage granted from the closure date of a consumer-opted, fixed repair.
    pub repair_extension_months: u32,
}

impl WarrantyPolicy {
    pub const DEFAULT_MONTHS: u32 = 24;
    pub const REPAIR_EXTENSION_MONTHS: u32 = 12;

    pub fn new(default_months: u32, repair_extension_months: u32) -> Self {
        Self {
            default_months,
            repair_extension_months,
        }
    }

    /// Warranty length to apply for a declared value; non-positive falls back to the default.
    pub fn effective_months(&self, declared: i32) -> u32 {
        u32::try_from(declared)
            .ok()
            .filter(|m| *m > 0)
            .unwrap_or(self.default_months)
    }
}

impl Default for WarrantyPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MONTHS, Self::REPAIR_EXTENSION_MONTHS)
    }
}
