//! Book (catalog entry) model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Book record with its shelf stock
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: Decimal,
    /// Copies currently on the shelf
    pub quantity: i32,
    /// Always `quantity > 0`
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    /// Apply a stock delta, keeping `available` in step. Returns false
    /// (and leaves the book untouched) if the result would be negative.
    pub fn adjust_quantity(&mut self, delta: i32) -> bool {
        let next = self.quantity + delta;
        if next < 0 {
            return false;
        }
        self.quantity = next;
        self.available = next > 0;
        true
    }
}

/// Book fields joined into loan listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub price: Decimal,
}

impl From<&Book> for BookShort {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            price: book.price,
        }
    }
}

/// New catalog entry
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("negative_price"));
    }
    Ok(())
}
