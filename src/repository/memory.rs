//! In-process store.
//!
//! All state sits behind one async mutex, so every `Store` call is a single
//! critical section: a lend or return either applies completely or not at
//! all, and two calls on the same book never interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookShort, CreateBook},
        loan::{CloseLoan, Loan, LoanDetails, LoanQuery, NewLoan},
        user::{CreateUser, User, UserShort},
    },
    services::fines::FinePolicy,
};

use super::Store;

#[derive(Default)]
struct MemoryState {
    books: BTreeMap<i32, Book>,
    users: BTreeMap<i32, User>,
    loans: BTreeMap<i32, Loan>,
    /// Derived index: loan ids per borrower, in creation order
    loans_by_user: HashMap<i32, Vec<i32>>,
    next_id: i32,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn book(&self, id: i32) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    fn active_loan_id(&self, user_id: i32, book_id: i32) -> Option<i32> {
        self.loans_by_user.get(&user_id).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|id| matches!(self.loans.get(id), Some(l) if l.book_id == book_id && l.is_active()))
        })
    }

    fn details(&self, loan: &Loan, with_user: bool, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        let book = BookShort::from(self.book(loan.book_id)?);
        let user = if with_user {
            let user = self.users.get(&loan.user_id).ok_or_else(|| {
                AppError::Internal(format!("Loan {} references missing user", loan.id))
            })?;
            Some(UserShort::from(user))
        } else {
            None
        };
        Ok(LoanDetails::new(loan.clone(), book, user, now))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog entry
    pub async fn insert_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;

        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        let book = Book {
            id,
            title: book.title,
            author: book.author,
            description: book.description,
            price: book.price,
            quantity: book.quantity,
            available: book.quantity > 0,
            created_at: Utc::now(),
        };
        state.books.insert(id, book.clone());
        Ok(book)
    }

    /// Add an account. Emails are unique, case-insensitively.
    pub async fn insert_user(&self, user: CreateUser) -> AppResult<User> {
        let email = user.email.trim().to_lowercase();

        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(AppError::Validation(format!("Email {} already registered", email)));
        }
        let id = state.allocate_id();
        let user = User {
            id,
            username: user.username,
            email,
            role: user.role,
            account_verified: user.account_verified,
            created_at: Utc::now(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.state.lock().await.book(id).cloned()
    }

    async fn get_user(&self, id: i32) -> AppResult<User> {
        self.state
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn find_verified_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.account_verified && u.email == email)
            .cloned())
    }

    async fn lend(&self, new_loan: &NewLoan) -> AppResult<Loan> {
        let mut state = self.state.lock().await;

        let book = state.book(new_loan.book_id)?;
        if !book.in_stock() {
            return Err(AppError::OutOfStock(format!(
                "Book \"{}\" is out of stock",
                book.title
            )));
        }
        let price = book.price;

        if state.active_loan_id(new_loan.user_id, new_loan.book_id).is_some() {
            return Err(AppError::DuplicateLoan(
                "User already has this book borrowed".to_string(),
            ));
        }

        let id = state.allocate_id();
        let loan = Loan {
            id,
            user_id: new_loan.user_id,
            book_id: new_loan.book_id,
            price,
            borrowed_date: new_loan.borrowed_date,
            due_date: new_loan.due_date,
            returned: false,
            returned_date: None,
            fine: rust_decimal::Decimal::ZERO,
            notified: false,
        };

        // Checked in stock above and the lock is still held
        if let Some(book) = state.books.get_mut(&new_loan.book_id) {
            book.adjust_quantity(-1);
        }
        state.loans.insert(id, loan.clone());
        state.loans_by_user.entry(new_loan.user_id).or_default().push(id);

        Ok(loan)
    }

    async fn return_book(&self, close: &CloseLoan, policy: &FinePolicy) -> AppResult<Loan> {
        let mut state = self.state.lock().await;

        state.book(close.book_id)?;
        let loan_id = state
            .active_loan_id(close.user_id, close.book_id)
            .ok_or_else(|| {
                AppError::NoActiveLoan("No active borrow record found for this book".to_string())
            })?;

        let loan = match state.loans.get_mut(&loan_id) {
            Some(loan) => {
                loan.fine = policy.compute(loan.due_date, close.returned_date);
                loan.returned = true;
                loan.returned_date = Some(close.returned_date);
                loan.clone()
            }
            None => return Err(AppError::Internal(format!("Loan {} vanished", loan_id))),
        };

        if let Some(book) = state.books.get_mut(&close.book_id) {
            book.adjust_quantity(1);
        }

        Ok(loan)
    }

    async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let state = self.state.lock().await;
        let now = Utc::now();

        state
            .loans_by_user
            .get(&user_id)
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| state.loans.get(id))
            .map(|loan| state.details(loan, false, now))
            .collect()
    }

    async fn all_loans(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let state = self.state.lock().await;
        let now = Utc::now();

        state
            .loans
            .values()
            .filter(|loan| query.matches(loan))
            .map(|loan| state.details(loan, true, now))
            .collect()
    }

    async fn loans_due_before(&self, horizon: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let state = self.state.lock().await;
        let mut due: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| l.is_active() && !l.notified && l.due_date <= horizon)
            .cloned()
            .collect();
        due.sort_by_key(|l| (l.due_date, l.id));
        Ok(due)
    }

    async fn mark_notified(&self, loan_id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.loans.get_mut(&loan_id) {
            Some(loan) if loan.is_active() && !loan.notified => {
                loan.notified = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Loan with id {} not found", loan_id))),
        }
    }
}
