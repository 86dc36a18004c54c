use core::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledger_core::{DomainError, DomainResult, Entity, ProductId, RepairId};

/// Repair status lifecycle: `Open -> InProgress -> Fixed | Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Open,
    InProgress,
    Fixed,
    Rejected,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 4] = [
        RepairStatus::Open,
        RepairStatus::InProgress,
        RepairStatus::Fixed,
        RepairStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RepairStatus::Open => "open",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::Fixed => "fixed",
            RepairStatus::Rejected => "rejected",
        }
    }

    /// Fixed and Rejected close the repair.
    pub fn is_terminal(self) -> bool {
        matches!(self, RepairStatus::Fixed | RepairStatus::Rejected)
    }

    pub fn allowed_next(self) -> &'static [RepairStatus] {
        match self {
            RepairStatus::Open => &[RepairStatus::InProgress],
            RepairStatus::InProgress => &[RepairStatus::Fixed, RepairStatus::Rejected],
            RepairStatus::Fixed | RepairStatus::Rejected => &[],
        }
    }

    /// Validate a transition from `self` to `next`.
    pub fn transition(self, next: RepairStatus) -> Result<RepairStatus, TransitionError> {
        if self == next {
            return Err(TransitionError::AlreadyInStatus(self));
        }
        if self.is_terminal() {
            return Err(TransitionError::Closed(self));
        }
        if !self.allowed_next().contains(&next) {
            return Err(TransitionError::NotAllowed { from: self, to: next });
        }
        Ok(next)
    }
}

impl core::fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairStatus {
    type Err = DomainError;

    /// Accepts `in_progress`, `InProgress`, `in-progress` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "open" => Ok(RepairStatus::Open),
            "inprogress" => Ok(RepairStatus::InProgress),
            "fixed" => Ok(RepairStatus::Fixed),
            "rejected" => Ok(RepairStatus::Rejected),
            _ => Err(DomainError::validation(
                "status must be one of: open, in_progress, fixed, rejected",
            )),
        }
    }
}

/// Why a requested status change was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("repair is already in the requested status")]
    AlreadyInStatus(RepairStatus),

    #[error("closed repairs cannot transition to a new status")]
    Closed(RepairStatus),

    #[error("allowed transitions: Open -> InProgress -> Fixed|Rejected")]
    NotAllowed { from: RepairStatus, to: RepairStatus },
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::AlreadyInStatus(_) => "already_in_status",
            TransitionError::Closed(_) => "repair_closed",
            TransitionError::NotAllowed { .. } => "invalid_transition",
        }
    }
}

impl From<TransitionError> for DomainError {
    fn from(err: TransitionError) -> Self {
        DomainError::validation_with_code(err.code(), err.to_string())
    }
}

/// A repair case filed against a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    pub id: RepairId,
    pub product_id: ProductId,
    pub status: RepairStatus,
    pub opened_at: DateTime<FixedOffset>,
    /// Set iff `status` is terminal.
    pub closed_at: Option<DateTime<FixedOffset>>,
    /// Cost in smallest currency unit (e.g., cents).
    pub cost: Option<u64>,
    pub notes: Option<String>,
    /// The consumer explicitly chose repair under the legal guarantee, which
    /// unlocks the right-to-repair coverage extension once the repair is fixed.
    pub consumer_opted_for_repair: bool,
}

/// Command: open a repair case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRepair {
    pub product_id: ProductId,
    pub opened_at: Option<DateTime<FixedOffset>>,
    /// Only `Open` (or nothing) is accepted.
    pub status: Option<RepairStatus>,
    pub cost: Option<i64>,
    pub notes: Option<String>,
    pub consumer_opted_for_repair: bool,
}

impl Repair {
    /// Create a repair in the `Open` state. `now` stands in for a missing `opened_at`.
    pub fn open(id: RepairId, cmd: &OpenRepair, now: DateTime<Utc>) -> DomainResult<Self> {
        let cost = match cmd.cost {
            Some(c) => Some(
                u64::try_from(c).map_err(|_| DomainError::validation("cost cannot be negative"))?,
            ),
            None => None,
        };

        if cmd.status.is_some_and(|s| s != RepairStatus::Open) {
            return Err(DomainError::validation_with_code(
                "invalid_initial_status",
                "new repairs must start in the open status",
            ));
        }

        Ok(Self {
            id,
            product_id: cmd.product_id,
            status: RepairStatus::Open,
            opened_at: cmd.opened_at.unwrap_or_else(|| now.fixed_offset()),
            closed_at: None,
            cost,
            notes: cmd
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            consumer_opted_for_repair: cmd.consumer_opted_for_repair,
        })
    }

    /// Apply a status change, stamping `closed_at` when the repair closes.
    pub fn transition_to(&mut self, next: RepairStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status = self.status.transition(next)?;
        self.closed_at = if next.is_terminal() {
            Some(now.fixed_offset())
        } else {
            None
        };
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Closure date as a UTC calendar date.
    pub fn closed_on_utc(&self) -> Option<NaiveDate> {
        self.closed_at.map(|at| at.with_timezone(&Utc).date_naive())
    }

    /// Consumer opted in, repair fixed, closure recorded.
    pub fn qualifies_for_extension(&self) -> bool {
        self.consumer_opted_for_repair && self.status == RepairStatus::Fixed && self.closed_at.is_some()
    }

    /// Fractional days between opening and closure (or `now` while still open).
    pub fn days_open(&self, now: DateTime<Utc>) -> f64 {
        let end = self.closed_at.map(|at| at.with_timezone(&Utc)).unwrap_or(now);
        let elapsed = end.signed_duration_since(self.opened_at.with_timezone(&Utc));
        elapsed.num_milliseconds() as f64 / 86_400_000.0
    }
}

impl Entity for Repair {
    type Id = RepairId;

    fn id(&self) -> RepairId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn open_cmd() -> OpenRepair {
        OpenRepair {
            product_id: ProductId::new(),
            opened_at: None,
            status: None,
            cost: Some(4_500),
            notes: Some(" screen flicker ".to_string()),
            consumer_opted_for_repair: true,
        }
    }

    fn open_repair() -> Repair {
        Repair::open(RepairId::new(), &open_cmd(), now()).unwrap()
    }

    #[test]
    fn open_starts_in_open_without_closure() {
        let repair = open_repair();
        assert_eq!(repair.status, RepairStatus::Open);
        assert_eq!(repair.closed_at, None);
        assert_eq!(repair.opened_at, now().fixed_offset());
        assert_eq!(repair.notes.as_deref(), Some("screen flicker"));
        assert!(repair.consumer_opted_for_repair);
    }

    #[test]
    fn open_rejects_non_open_initial_status() {
        let mut cmd = open_cmd();
        cmd.status = Some(RepairStatus::InProgress);
        let err = Repair::open(RepairId::new(), &cmd, now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation_with_code(
                "invalid_initial_status",
                "new repairs must start in the open status"
            )
        );

        cmd.status = Some(RepairStatus::Open);
        assert!(Repair::open(RepairId::new(), &cmd, now()).is_ok());
    }

    #[test]
    fn open_rejects_negative_cost() {
        let mut cmd = open_cmd();
        cmd.cost = Some(-10);
        assert_eq!(
            Repair::open(RepairId::new(), &cmd, now()).unwrap_err(),
            DomainError::validation("cost cannot be negative")
        );
    }

    #[test]
    fn skipping_in_progress_is_rejected() {
        let mut repair = open_repair();
        let err = repair.transition_to(RepairStatus::Fixed, now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotAllowed {
                from: RepairStatus::Open,
                to: RepairStatus::Fixed
            }
        );
        assert_eq!(err.to_string(), "allowed transitions: Open -> InProgress -> Fixed|Rejected");
        assert_eq!(repair.status, RepairStatus::Open);
        assert_eq!(repair.closed_at, None);
    }

    #[test]
    fn sequential_flow_sets_closed_at_only_on_closure() {
        let mut repair = open_repair();

        repair.transition_to(RepairStatus::InProgress, now()).unwrap();
        assert_eq!(repair.status, RepairStatus::InProgress);
        assert_eq!(repair.closed_at, None);

        let closed = now() + chrono::Duration::days(3);
        repair.transition_to(RepairStatus::Fixed, closed).unwrap();
        assert_eq!(repair.status, RepairStatus::Fixed);
        assert_eq!(repair.closed_at, Some(closed.fixed_offset()));
        assert!(repair.is_closed());
    }

    #[test]
    fn in_progress_can_be_rejected() {
        let mut repair = open_repair();
        repair.transition_to(RepairStatus::InProgress, now()).unwrap();
        repair.transition_to(RepairStatus::Rejected, now()).unwrap();
        assert!(repair.closed_at.is_some());
        assert!(!repair.qualifies_for_extension());
    }

    #[test]
    fn terminal_states_cannot_transition() {
        let mut repair = open_repair();
        repair.transition_to(RepairStatus::InProgress, now()).unwrap();
        repair.transition_to(RepairStatus::Fixed, now()).unwrap();

        let err = repair.transition_to(RepairStatus::InProgress, now()).unwrap_err();
        assert_eq!(err, TransitionError::Closed(RepairStatus::Fixed));
        assert_eq!(err.to_string(), "closed repairs cannot transition to a new status");
    }

    #[test]
    fn same_status_is_reported_as_already_in_status() {
        let mut repair = open_repair();
        let err = repair.transition_to(RepairStatus::Open, now()).unwrap_err();
        assert_eq!(err, TransitionError::AlreadyInStatus(RepairStatus::Open));
        assert_eq!(err.code(), "already_in_status");

        // Same-status wins over the terminal check.
        assert_eq!(
            RepairStatus::Fixed.transition(RepairStatus::Fixed),
            Err(TransitionError::AlreadyInStatus(RepairStatus::Fixed))
        );
    }

    #[test]
    fn transition_error_converts_to_coded_validation() {
        let err: DomainError = TransitionError::Closed(RepairStatus::Rejected).into();
        match err {
            DomainError::Validation { code, message } => {
                assert_eq!(code, "repair_closed");
                assert_eq!(message, "closed repairs cannot transition to a new status");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("in_progress".parse::<RepairStatus>().unwrap(), RepairStatus::InProgress);
        assert_eq!("InProgress".parse::<RepairStatus>().unwrap(), RepairStatus::InProgress);
        assert_eq!(" Fixed ".parse::<RepairStatus>().unwrap(), RepairStatus::Fixed);
        assert!("done".parse::<RepairStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&RepairStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn closed_on_utc_truncates_offset_timestamps() {
        let mut repair = open_repair();
        // 2026-05-02T01:30+03:00 is still May 1st in UTC.
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        repair.status = RepairStatus::Fixed;
        repair.closed_at = Some(offset.with_ymd_and_hms(2026, 5, 2, 1, 30, 0).unwrap());
        assert_eq!(repair.closed_on_utc(), NaiveDate::from_ymd_opt(2026, 5, 1));
    }

    #[test]
    fn days_open_uses_now_for_open_repairs() {
        let repair = open_repair();
        let later = now() + chrono::Duration::hours(36);
        assert!((repair.days_open(later) - 1.5).abs() < 1e-9);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = RepairStatus> {
            prop::sample::select(RepairStatus::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: closed_at is set iff the status is terminal, whatever was requested.
            #[test]
            fn closed_at_tracks_terminal_status(steps in prop::collection::vec(any_status(), 0..8)) {
                let mut repair = open_repair();
                for next in steps {
                    let before = repair.clone();
                    match repair.transition_to(next, now()) {
                        Ok(()) => prop_assert!(before.status.allowed_next().contains(&next)),
                        Err(_) => prop_assert_eq!(&repair, &before),
                    }
                    prop_assert_eq!(repair.closed_at.is_some(), repair.status.is_terminal());
                }
            }
        }
    }
}
