//! BKC API Client
//!
//! Typed access to every backend operation on top of the request router,
//! plus the tap engine sharing the same executor. Results are returned to
//! the caller and mirrored on the `FeedbackHub` for presentation.

pub mod error;
pub mod models;
pub mod client;

pub use error::ApiError;
pub use models::{BuyItem, HealthReport, Invoice, ItemList, LoanPlan, NewListing, P2pLoanRequest};
pub use client::{BkcClient, BANK_AMOUNT_MAX, DEPOSIT_USD_MAX};

pub type Result<T> = std::result::Result<T, ApiError>;
