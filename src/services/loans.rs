//! Loan management service: lending, returns and loan listings

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{BorrowerLoans, CloseLoan, Loan, LoanDetails, LoanQuery, NewLoan},
        user::{User, UserClaims, UserShort},
    },
    repository::Store,
    services::fines::FinePolicy,
};

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    fine_policy: FinePolicy,
    loan_period: Duration,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, fine_policy: FinePolicy, loan_period: Duration) -> Self {
        Self {
            store,
            fine_policy,
            loan_period,
        }
    }

    /// Lend a book to the verified borrower with this email
    pub async fn lend(
        &self,
        operator: &UserClaims,
        book_id: i32,
        email: &str,
    ) -> AppResult<(Loan, BorrowerLoans)> {
        self.lend_at(operator, book_id, email, store_now()).await
    }

    pub(crate) async fn lend_at(
        &self,
        operator: &UserClaims,
        book_id: i32,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<(Loan, BorrowerLoans)> {
        operator.require_operator()?;

        let borrower = self.resolve_borrower(email).await?;
        if !borrower.can_borrow() {
            return Err(AppError::Forbidden("Admins cannot borrow books".to_string()));
        }

        let loan = self
            .store
            .lend(&NewLoan {
                user_id: borrower.id,
                book_id,
                borrowed_date: now,
                due_date: now + self.loan_period,
            })
            .await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = borrower.id,
            book_id,
            due_date = %loan.due_date,
            "Book lent"
        );

        let borrower = self.borrower_loans(&borrower).await?;
        Ok((loan, borrower))
    }

    /// Take a book back from the borrower with this email and fix the fine
    pub async fn return_book(
        &self,
        operator: &UserClaims,
        book_id: i32,
        email: &str,
    ) -> AppResult<(Loan, BorrowerLoans)> {
        self.return_at(operator, book_id, email, store_now()).await
    }

    pub(crate) async fn return_at(
        &self,
        operator: &UserClaims,
        book_id: i32,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<(Loan, BorrowerLoans)> {
        operator.require_operator()?;

        let borrower = self.resolve_borrower(email).await?;

        let loan = self
            .store
            .return_book(
                &CloseLoan {
                    user_id: borrower.id,
                    book_id,
                    returned_date: now,
                },
                &self.fine_policy,
            )
            .await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = borrower.id,
            book_id,
            fine = %loan.fine,
            "Book returned"
        );

        let borrower = self.borrower_loans(&borrower).await?;
        Ok((loan, borrower))
    }

    /// All loans of a user, active and returned
    pub async fn list_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        // Verify user exists
        self.store.get_user(user_id).await?;
        self.store.user_loans(user_id).await
    }

    /// Loans of every borrower (operator only)
    pub async fn list_all_loans(
        &self,
        operator: &UserClaims,
        query: &LoanQuery,
    ) -> AppResult<Vec<LoanDetails>> {
        operator.require_operator()?;
        self.store.all_loans(query).await
    }

    async fn resolve_borrower(&self, email: &str) -> AppResult<User> {
        self.store
            .find_verified_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn borrower_loans(&self, borrower: &User) -> AppResult<BorrowerLoans> {
        Ok(BorrowerLoans {
            user: UserShort::from(borrower),
            loans: self.store.user_loans(borrower.id).await?,
        })
    }
}

/// Current time at the store's microsecond precision, so the fine is
/// computed from the same instant that gets persisted
fn store_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
