//! Borrow workflow endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::loan::{BorrowerLoans, Loan, LoanDetails, LoanQuery},
    AppState,
};

use super::AuthenticatedUser;

/// Borrower designated by email
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BorrowerRequest {
    /// Email of a verified borrower account
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Lend response
#[derive(Serialize, ToSchema)]
pub struct LendResponse {
    pub message: String,
    /// The new loan
    pub borrow: Loan,
    /// Borrower with their full loan list
    pub user: BorrowerLoans,
}

/// Return response
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub message: String,
    /// The closed loan
    pub borrow: Loan,
    /// Late fine charged on this return
    pub fine: Decimal,
    pub user: BorrowerLoans,
}

/// Loan listing
#[derive(Serialize, ToSchema)]
pub struct BorrowedBooksResponse {
    pub borrowed_books: Vec<LoanDetails>,
}

/// Lend a book to a borrower (operator only)
#[utoipa::path(
    post,
    path = "/borrow/lend/{book_id}",
    tag = "borrow",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    request_body = BorrowerRequest,
    responses(
        (status = 201, description = "Book borrowed", body = LendResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorResponse),
        (status = 403, description = "Not an operator, or borrower is an admin", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Out of stock or already borrowed", body = crate::error::ErrorResponse)
    )
)]
pub async fn lend_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(request): Json<BorrowerRequest>,
) -> AppResult<(StatusCode, Json<LendResponse>)> {
    claims.require_operator()?;
    request.validate()?;

    let (loan, user) = state
        .services
        .loans
        .lend(&claims, book_id, &request.email)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LendResponse {
            message: "Book borrowed successfully".to_string(),
            borrow: loan,
            user,
        }),
    ))
}

/// Take a book back from a borrower (operator only)
#[utoipa::path(
    post,
    path = "/borrow/return/{book_id}",
    tag = "borrow",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    request_body = BorrowerRequest,
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No active loan for this book", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(request): Json<BorrowerRequest>,
) -> AppResult<Json<ReturnResponse>> {
    claims.require_operator()?;
    request.validate()?;

    let (loan, user) = state
        .services
        .loans
        .return_book(&claims, book_id, &request.email)
        .await?;

    Ok(Json(ReturnResponse {
        message: "Book returned successfully".to_string(),
        fine: loan.fine,
        borrow: loan,
        user,
    }))
}

/// List loans of all borrowers (operator only)
#[utoipa::path(
    get,
    path = "/borrow/admin/borrowed-books",
    tag = "borrow",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans with borrower and book", body = BorrowedBooksResponse),
        (status = 403, description = "Not an operator", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_borrowed_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<BorrowedBooksResponse>> {
    let borrowed_books = state.services.loans.list_all_loans(&claims, &query).await?;
    Ok(Json(BorrowedBooksResponse { borrowed_books }))
}

/// List the caller's own loans
#[utoipa::path(
    get,
    path = "/borrow/my-borrowed-books",
    tag = "borrow",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's loans, active and returned", body = BorrowedBooksResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn my_borrowed_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowedBooksResponse>> {
    let borrowed_books = state.services.loans.list_user_loans(claims.user_id).await?;
    Ok(Json(BorrowedBooksResponse { borrowed_books }))
}

/// List loans of a specific user (operator only)
#[utoipa::path(
    get,
    path = "/borrow/users/{id}/loans",
    tag = "borrow",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loans, active and returned", body = BorrowedBooksResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<BorrowedBooksResponse>> {
    claims.require_operator()?;

    let borrowed_books = state.services.loans.list_user_loans(user_id).await?;
    Ok(Json(BorrowedBooksResponse { borrowed_books }))
}
