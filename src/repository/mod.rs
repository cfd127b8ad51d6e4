//! Repository layer: the durable store behind the lending workflow

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{Book, CloseLoan, Loan, LoanDetails, LoanQuery, NewLoan, User},
    services::fines::FinePolicy,
};

pub use memory::MemoryStore;

/// Store operations used by the services.
///
/// `lend` and `return_book` are failure-atomic: on any error nothing they
/// touched is changed. Concurrent calls on the same book are serialised.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check for readiness probes
    async fn ping(&self) -> AppResult<()>;

    async fn get_book(&self, id: i32) -> AppResult<Book>;

    async fn get_user(&self, id: i32) -> AppResult<User>;

    /// Case-insensitive lookup restricted to verified accounts
    async fn find_verified_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Check stock and duplicates, take one copy off the shelf and record the loan
    async fn lend(&self, new_loan: &NewLoan) -> AppResult<Loan>;

    /// Close the borrower's active loan on the book, fix its fine and restock
    async fn return_book(&self, close: &CloseLoan, policy: &FinePolicy) -> AppResult<Loan>;

    /// Every loan of a borrower, active and returned, oldest first
    async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>>;

    /// Loans of all borrowers with borrower details joined
    async fn all_loans(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>>;

    /// Active, not yet notified loans due at or before `horizon`
    async fn loans_due_before(&self, horizon: DateTime<Utc>) -> AppResult<Vec<Loan>>;

    /// Flip `notified` on an active loan. Returns false if the loan was
    /// returned or already notified in the meantime.
    async fn mark_notified(&self, loan_id: i32) -> AppResult<bool>;
}

/// PostgreSQL store
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Store for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.books.get_by_id(id).await
    }

    async fn get_user(&self, id: i32) -> AppResult<User> {
        self.users.get_by_id(id).await
    }

    async fn find_verified_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.users.get_verified_by_email(email).await
    }

    async fn lend(&self, new_loan: &NewLoan) -> AppResult<Loan> {
        self.loans.lend(new_loan).await
    }

    async fn return_book(&self, close: &CloseLoan, policy: &FinePolicy) -> AppResult<Loan> {
        self.loans.return_loan(close, policy).await
    }

    async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.loans.get_user_loans(user_id).await
    }

    async fn all_loans(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        self.loans.list(query).await
    }

    async fn loans_due_before(&self, horizon: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        self.loans.due_for_reminder(horizon).await
    }

    async fn mark_notified(&self, loan_id: i32) -> AppResult<bool> {
        self.loans.mark_notified(loan_id).await
    }
}
