//! Book Mart lending backend
//!
//! Borrow/return workflow over a book inventory: stock-safe lending,
//! deterministic late fines, and a background sweep that reminds
//! borrowers of upcoming due dates.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
