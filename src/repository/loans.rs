//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookShort},
        loan::{CloseLoan, Loan, LoanDetails, LoanQuery, NewLoan},
        user::UserShort,
    },
    services::fines::FinePolicy,
};

const DETAILS_SELECT: &str = r#"
    SELECT l.*,
           b.title AS book_title, b.author AS book_author, b.price AS book_price,
           u.username AS user_username, u.email AS user_email
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Lend one copy of a book. Runs as a single transaction holding the
    /// book row lock, so concurrent lends of the same book queue up.
    pub async fn lend(&self, new_loan: &NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(new_loan.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Book with id {} not found", new_loan.book_id))
            })?;

        if !book.in_stock() {
            return Err(out_of_stock(&book));
        }

        let already_borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND NOT returned)",
        )
        .bind(new_loan.user_id)
        .bind(new_loan.book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_borrowed {
            return Err(duplicate_loan());
        }

        let decremented = sqlx::query(
            r#"
            UPDATE books
            SET quantity = quantity - 1, available = quantity - 1 > 0
            WHERE id = $1 AND quantity > 0
            "#,
        )
        .bind(new_loan.book_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if decremented != 1 {
            return Err(out_of_stock(&book));
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, price, borrowed_date, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new_loan.user_id)
        .bind(new_loan.book_id)
        .bind(book.price)
        .bind(new_loan.borrowed_date)
        .bind(new_loan.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_active_loan_conflict)?;

        tx.commit().await?;

        Ok(loan)
    }

    /// Return a loan: close it with its fine and put the copy back, in one
    /// transaction. The loan update is guarded on `NOT returned`, so a
    /// second return of the same loan never restocks twice.
    pub async fn return_loan(&self, close: &CloseLoan, policy: &FinePolicy) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        // Same lock order as lend: book row first
        let book_exists: Option<i32> =
            sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
                .bind(close.book_id)
                .fetch_optional(&mut *tx)
                .await?;

        if book_exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Book with id {} not found",
                close.book_id
            )));
        }

        let active = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE user_id = $1 AND book_id = $2 AND NOT returned
            FOR UPDATE
            "#,
        )
        .bind(close.user_id)
        .bind(close.book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(no_active_loan)?;

        let fine = policy.compute(active.due_date, close.returned_date);

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET returned = TRUE, returned_date = $2, fine = $3
            WHERE id = $1 AND NOT returned
            RETURNING *
            "#,
        )
        .bind(active.id)
        .bind(close.returned_date)
        .bind(fine)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(no_active_loan)?;

        sqlx::query("UPDATE books SET quantity = quantity + 1, available = TRUE WHERE id = $1")
            .bind(close.book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(loan)
    }

    /// Get all loans of a user, active and returned
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(&format!(
            "{} WHERE l.user_id = $1 ORDER BY l.borrowed_date, l.id",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.iter()
            .map(|row| details_from_row(row, false, now))
            .collect()
    }

    /// List loans of every borrower
    pub async fn list(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(&format!(
            "{} WHERE ($1::BOOLEAN IS NULL OR l.returned <> $1) ORDER BY l.borrowed_date, l.id",
            DETAILS_SELECT
        ))
        .bind(query.active)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.iter()
            .map(|row| details_from_row(row, true, now))
            .collect()
    }

    /// Loans needing a due-date reminder
    pub async fn due_for_reminder(&self, horizon: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE due_date <= $1 AND NOT returned AND NOT notified
            ORDER BY due_date, id
            "#,
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Mark a loan as notified, only while it is still active
    pub async fn mark_notified(&self, loan_id: i32) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE loans SET notified = TRUE WHERE id = $1 AND NOT returned AND NOT notified",
        )
        .bind(loan_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }
}

fn details_from_row(row: &PgRow, with_user: bool, now: DateTime<Utc>) -> AppResult<LoanDetails> {
    let loan = Loan::from_row(row)?;
    let book = BookShort {
        id: loan.book_id,
        title: row.try_get("book_title")?,
        author: row.try_get("book_author")?,
        price: row.try_get("book_price")?,
    };
    let user = if with_user {
        Some(UserShort {
            id: loan.user_id,
            username: row.try_get("user_username")?,
            email: row.try_get("user_email")?,
        })
    } else {
        None
    };

    Ok(LoanDetails::new(loan, book, user, now))
}

fn out_of_stock(book: &Book) -> AppError {
    AppError::OutOfStock(format!("Book \"{}\" is out of stock", book.title))
}

fn duplicate_loan() -> AppError {
    AppError::DuplicateLoan("User already has this book borrowed".to_string())
}

fn no_active_loan() -> AppError {
    AppError::NoActiveLoan("No active borrow record found for this book".to_string())
}

/// The partial unique index on active (user, book) pairs backs up the
/// in-transaction duplicate check.
fn map_active_loan_conflict(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => duplicate_loan(),
        _ => AppError::from(e),
    }
}
