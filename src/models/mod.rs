//! Data models for Book Mart

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort, CreateBook};
pub use loan::{BorrowerLoans, CloseLoan, Loan, LoanDetails, LoanQuery, NewLoan};
pub use user::{CreateUser, Role, User, UserClaims, UserShort};
