//! Virtual Bank REST adapter
//!
//! [`BankApi`] is the seam between the client logic and the backend: one
//! method per backend operation, each returning `Result<T, ApiError>`.
//! [`BankClient`] talks HTTP; [`mock::MockBankApi`] is an in-memory bank for
//! tests and offline use.

pub mod client;
pub mod error;
#[cfg(feature = "mock-api")]
pub mod mock;
pub mod routes;
pub mod types;

pub use client::{BankClient, ClientConfig};
pub use error::{ApiError, ApiErrorKind, FieldErrors};
pub use routes::{DEFAULT_BASE_URL, Endpoint};
pub use types::{Ack, CreatedAccount, DepositReceipt, ReversalReceipt, TransferReceipt};

use async_trait::async_trait;

use crate::models::{
    Account, AccountDetails, AddFavoriteRequest, CreateAccountRequest, DepositRequest,
    LoginRequest, MostActiveAccount, RegisterRequest, ReverseDepositRequest, Transaction,
    TransferRequest, UserPage, UserPayload,
};
use crate::session::Session;

/// Backend operations
///
/// Implementations never retry and never panic; every failure, including
/// a 2xx body with `success: false`, comes back as an [`ApiError`].
#[async_trait]
pub trait BankApi: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    // --- auth ---

    async fn register(&self, request: &RegisterRequest) -> Result<Ack, ApiError>;

    async fn verify_email(&self, code: &str) -> Result<Ack, ApiError>;

    /// Returns the `userDetails` record to be stored as the session.
    async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError>;

    // --- accounts ---

    async fn create_account(&self, request: &CreateAccountRequest) -> Result<CreatedAccount, ApiError>;

    async fn my_accounts(&self) -> Result<Vec<Account>, ApiError>;

    async fn create_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ApiError>;

    async fn create_deposit(&self, request: &DepositRequest) -> Result<DepositReceipt, ApiError>;

    async fn delete_account(&self, account_id: &str) -> Result<Ack, ApiError>;

    async fn history(&self, account_no: &str) -> Result<Vec<Transaction>, ApiError>;

    async fn favorites(&self) -> Result<Vec<Account>, ApiError>;

    async fn add_favorite(&self, request: &AddFavoriteRequest) -> Result<Ack, ApiError>;

    // --- users (staff) ---

    async fn users(&self) -> Result<UserPage, ApiError>;

    async fn delete_user(&self, dpi: &str) -> Result<Ack, ApiError>;

    async fn create_user(&self, payload: &UserPayload) -> Result<Ack, ApiError>;

    /// `dpi` is the path key only; it is never part of the payload.
    async fn update_user(&self, dpi: &str, payload: &UserPayload) -> Result<Ack, ApiError>;

    // --- admin ---

    async fn most_active_accounts(&self) -> Result<Vec<MostActiveAccount>, ApiError>;

    async fn account_details(&self, account_id: &str) -> Result<AccountDetails, ApiError>;

    async fn reverse_deposit(&self, request: &ReverseDepositRequest) -> Result<ReversalReceipt, ApiError>;
}
