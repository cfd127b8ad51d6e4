//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::BookShort;
use super::user::UserShort;

/// Loan record as stored. Never deleted; returned loans are the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    /// Book price at lending time
    pub price: Decimal,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned: bool,
    /// Set iff `returned`
    pub returned_date: Option<DateTime<Utc>>,
    /// Fixed at return time
    pub fine: Decimal,
    pub notified: bool,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        !self.returned
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_date < now
    }
}

/// Lend command handed to the store
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Return command handed to the store
#[derive(Debug, Clone)]
pub struct CloseLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub returned_date: DateTime<Utc>,
}

/// Loan with book and borrower joined in, for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub book: BookShort,
    pub user: Option<UserShort>,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn new(loan: Loan, book: BookShort, user: Option<UserShort>, now: DateTime<Utc>) -> Self {
        let is_overdue = loan.is_overdue(now);
        Self {
            loan,
            book,
            user,
            is_overdue,
        }
    }
}

/// A borrower together with their full loan list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowerLoans {
    pub user: UserShort,
    pub loans: Vec<LoanDetails>,
}

/// Operator listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    /// `true`: only unreturned loans, `false`: only returned loans, unset: all
    pub active: Option<bool>,
}

impl LoanQuery {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.active.map_or(true, |active| loan.is_active() == active)
    }
}
