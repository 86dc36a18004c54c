//! Warranty domain module.
//!
//! This crate contains the business rules of the ledger: product intake,
//! the repair lifecycle state machine and warranty evaluation. Everything
//! here is deterministic domain logic (no IO, no HTTP, no storage, no clock
//! reads); callers pass "today" and "now" explicitly.

pub mod evaluator;
pub mod policy;
pub mod product;
pub mod repair;
pub mod report;

pub use evaluator::{WarrantyEvaluator, WarrantyWindow};
pub use policy::WarrantyPolicy;
pub use product::{Product, RegisterProduct};
pub use repair::{OpenRepair, Repair, RepairStatus, TransitionError};
pub use report::{ExpiringProduct, SummaryReport, EXPIRING_SOON_DAYS};
