//! Borrowing lifecycle state machine
//!
//! Every status change a loan can go through is expressed here as a pure
//! function over `BorrowingStatus`, together with the copy-status pairing and
//! the fine arithmetic. Services persist the outcome; nothing in this module
//! touches the database.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::DomainError;

/// Date format accepted for due dates and stored in the database
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BorrowingStatus {
    Requested,
    Active,
    Returned,
    ReturnedLate,
    Overdue,
    Rejected,
    Cancelled,
    LostByBorrower,
}

impl BorrowingStatus {
    pub const ALL: [BorrowingStatus; 8] = [
        BorrowingStatus::Requested,
        BorrowingStatus::Active,
        BorrowingStatus::Returned,
        BorrowingStatus::ReturnedLate,
        BorrowingStatus::Overdue,
        BorrowingStatus::Rejected,
        BorrowingStatus::Cancelled,
        BorrowingStatus::LostByBorrower,
    ];

    /// Statuses that keep a copy tied to a borrowing
    pub const OPEN: [BorrowingStatus; 3] = [
        BorrowingStatus::Requested,
        BorrowingStatus::Active,
        BorrowingStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Requested => "REQUESTED",
            BorrowingStatus::Active => "ACTIVE",
            BorrowingStatus::Returned => "RETURNED",
            BorrowingStatus::ReturnedLate => "RETURNED_LATE",
            BorrowingStatus::Overdue => "OVERDUE",
            BorrowingStatus::Rejected => "REJECTED",
            BorrowingStatus::Cancelled => "CANCELLED",
            BorrowingStatus::LostByBorrower => "LOST_BY_BORROWER",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !Self::OPEN.contains(self)
    }

    /// Apply an event, returning the next status or an invalid-transition error.
    pub fn transition(self, event: BorrowingEvent) -> Result<BorrowingStatus, DomainError> {
        use BorrowingStatus::*;

        let next = match (self, event) {
            (Requested, BorrowingEvent::Approve) => Active,
            (Requested, BorrowingEvent::Reject) => Rejected,
            (Requested, BorrowingEvent::Cancel) => Cancelled,
            (Active | Overdue, BorrowingEvent::Return { late: false }) => Returned,
            (Active | Overdue, BorrowingEvent::Return { late: true }) => ReturnedLate,
            (Active | Overdue, BorrowingEvent::MarkLost) => LostByBorrower,
            (Active, BorrowingEvent::MarkOverdue) => Overdue,
            _ => {
                return Err(DomainError::InvalidTransition {
                    action: event.name(),
                    status: self.as_str(),
                });
            }
        };

        Ok(next)
    }

    /// Copy status a transition into `self` imposes, `None` when the copy is left alone.
    pub fn copy_status(&self) -> Option<CopyStatus> {
        match self {
            BorrowingStatus::Active | BorrowingStatus::Overdue => Some(CopyStatus::OnLoan),
            BorrowingStatus::Returned | BorrowingStatus::ReturnedLate => {
                Some(CopyStatus::Available)
            }
            BorrowingStatus::LostByBorrower => Some(CopyStatus::Lost),
            BorrowingStatus::Requested
            | BorrowingStatus::Rejected
            | BorrowingStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BorrowingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| DomainError::Validation(format!("Unknown borrowing status '{}'", s)))
    }
}

/// Actions that move a borrowing between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowingEvent {
    Approve,
    Reject,
    Cancel,
    Return { late: bool },
    MarkLost,
    MarkOverdue,
}

impl BorrowingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BorrowingEvent::Approve => "approve",
            BorrowingEvent::Reject => "reject",
            BorrowingEvent::Cancel => "cancel",
            BorrowingEvent::Return { .. } => "return",
            BorrowingEvent::MarkLost => "mark lost",
            BorrowingEvent::MarkOverdue => "mark overdue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyStatus {
    Available,
    #[serde(rename = "On Loan")]
    OnLoan,
    Reserved,
    Lost,
    Damaged,
    #[serde(rename = "In Repair")]
    InRepair,
    Withdrawn,
}

impl CopyStatus {
    pub const ALL: [CopyStatus; 7] = [
        CopyStatus::Available,
        CopyStatus::OnLoan,
        CopyStatus::Reserved,
        CopyStatus::Lost,
        CopyStatus::Damaged,
        CopyStatus::InRepair,
        CopyStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "Available",
            CopyStatus::OnLoan => "On Loan",
            CopyStatus::Reserved => "Reserved",
            CopyStatus::Lost => "Lost",
            CopyStatus::Damaged => "Damaged",
            CopyStatus::InRepair => "In Repair",
            CopyStatus::Withdrawn => "Withdrawn",
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CopyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::Validation(format!("Unknown copy status '{}'", s)))
    }
}

/// Circulation rules applied when loans are opened and closed
#[derive(Debug, Clone, PartialEq)]
pub struct LoanPolicy {
    pub fine_rate_per_day: f64,
    pub lost_book_fee: f64,
    pub default_loan_days: i64,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            fine_rate_per_day: 0.50,
            lost_book_fee: 25.00,
            default_loan_days: 14,
        }
    }
}

/// Outcome of closing a loan on a given day
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnAssessment {
    pub status: BorrowingStatus,
    pub overdue_days: i64,
    pub fine_amount: f64,
}

impl LoanPolicy {
    pub fn default_due_date(&self, issued_on: NaiveDate) -> NaiveDate {
        issued_on + Duration::days(self.default_loan_days)
    }

    /// Fine for a late return. Same-day returns are never late.
    pub fn assess_return(&self, due_date: NaiveDate, returned_on: NaiveDate) -> ReturnAssessment {
        let overdue_days = overdue_days(due_date, returned_on);
        if overdue_days == 0 {
            return ReturnAssessment {
                status: BorrowingStatus::Returned,
                overdue_days,
                fine_amount: 0.0,
            };
        }

        ReturnAssessment {
            status: BorrowingStatus::ReturnedLate,
            overdue_days,
            fine_amount: round_cents(overdue_days as f64 * self.fine_rate_per_day),
        }
    }
}

/// Whole days past the due date, never negative.
pub fn overdue_days(due_date: NaiveDate, on: NaiveDate) -> i64 {
    (on - due_date).num_days().max(0)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        DomainError::Validation(format!("Invalid date '{}'. Use YYYY-MM-DD.", raw))
    })
}

/// Due dates supplied by borrowers or staff must lie strictly after `today`.
pub fn parse_future_due_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, DomainError> {
    let due = parse_date(raw)?;
    if due <= today {
        return Err(DomainError::Validation(
            "Due date must be in the future.".to_string(),
        ));
    }
    Ok(due)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn requested_transitions() {
        let s = BorrowingStatus::Requested;
        assert_eq!(s.transition(BorrowingEvent::Approve).unwrap(), BorrowingStatus::Active);
        assert_eq!(s.transition(BorrowingEvent::Reject).unwrap(), BorrowingStatus::Rejected);
        assert_eq!(s.transition(BorrowingEvent::Cancel).unwrap(), BorrowingStatus::Cancelled);
        assert!(s.transition(BorrowingEvent::Return { late: false }).is_err());
        assert!(s.transition(BorrowingEvent::MarkLost).is_err());
        assert!(s.transition(BorrowingEvent::MarkOverdue).is_err());
    }

    #[test]
    fn active_and_overdue_share_closing_transitions() {
        for s in [BorrowingStatus::Active, BorrowingStatus::Overdue] {
            assert_eq!(
                s.transition(BorrowingEvent::Return { late: false }).unwrap(),
                BorrowingStatus::Returned
            );
            assert_eq!(
                s.transition(BorrowingEvent::Return { late: true }).unwrap(),
                BorrowingStatus::ReturnedLate
            );
            assert_eq!(
                s.transition(BorrowingEvent::MarkLost).unwrap(),
                BorrowingStatus::LostByBorrower
            );
            assert!(s.transition(BorrowingEvent::Approve).is_err());
            assert!(s.transition(BorrowingEvent::Cancel).is_err());
        }
        assert_eq!(
            BorrowingStatus::Active
                .transition(BorrowingEvent::MarkOverdue)
                .unwrap(),
            BorrowingStatus::Overdue
        );
        assert!(
            BorrowingStatus::Overdue
                .transition(BorrowingEvent::MarkOverdue)
                .is_err()
        );
    }

    #[test]
    fn terminal_states_never_move() {
        let events = [
            BorrowingEvent::Approve,
            BorrowingEvent::Reject,
            BorrowingEvent::Cancel,
            BorrowingEvent::Return { late: false },
            BorrowingEvent::Return { late: true },
            BorrowingEvent::MarkLost,
            BorrowingEvent::MarkOverdue,
        ];
        for status in BorrowingStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in events {
                match status.transition(event) {
                    Err(DomainError::InvalidTransition { status: name, .. }) => {
                        assert_eq!(name, status.as_str())
                    }
                    other => panic!("{status} accepted {event:?}: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn copy_status_pairing() {
        assert_eq!(BorrowingStatus::Active.copy_status(), Some(CopyStatus::OnLoan));
        assert_eq!(BorrowingStatus::Overdue.copy_status(), Some(CopyStatus::OnLoan));
        assert_eq!(
            BorrowingStatus::ReturnedLate.copy_status(),
            Some(CopyStatus::Available)
        );
        assert_eq!(
            BorrowingStatus::LostByBorrower.copy_status(),
            Some(CopyStatus::Lost)
        );
        assert_eq!(BorrowingStatus::Requested.copy_status(), None);
        assert_eq!(BorrowingStatus::Cancelled.copy_status(), None);
    }

    #[test]
    fn late_return_fines_whole_days() {
        let policy = LoanPolicy::default();
        let assessment = policy.assess_return(date("2024-03-01"), date("2024-03-04"));
        assert_eq!(assessment.status, BorrowingStatus::ReturnedLate);
        assert_eq!(assessment.overdue_days, 3);
        assert_eq!(assessment.fine_amount, 1.5);
    }

    #[test]
    fn on_time_and_early_returns_are_free() {
        let policy = LoanPolicy::default();
        let same_day = policy.assess_return(date("2024-03-01"), date("2024-03-01"));
        assert_eq!(same_day.status, BorrowingStatus::Returned);
        assert_eq!(same_day.fine_amount, 0.0);

        let early = policy.assess_return(date("2024-03-10"), date("2024-03-01"));
        assert_eq!(early.overdue_days, 0);
        assert_eq!(early.fine_amount, 0.0);
    }

    #[test]
    fn status_strings_round_trip_through_from_str() {
        assert_eq!(
            "returned_late".parse::<BorrowingStatus>().unwrap(),
            BorrowingStatus::ReturnedLate
        );
        assert_eq!("on loan".parse::<CopyStatus>().unwrap(), CopyStatus::OnLoan);
        assert!("borrowed".parse::<BorrowingStatus>().is_err());
        assert!("shelved".parse::<CopyStatus>().is_err());
    }

    #[test]
    fn due_dates_must_be_future_and_well_formed() {
        let today = date("2024-05-10");
        assert_eq!(
            parse_future_due_date("2024-05-24", today).unwrap(),
            date("2024-05-24")
        );
        assert!(parse_future_due_date("2024-05-10", today).is_err());
        assert!(parse_future_due_date("24/05/2024", today).is_err());
        assert_eq!(
            LoanPolicy::default().default_due_date(today),
            date("2024-05-24")
        );
    }
}
