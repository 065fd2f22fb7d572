//! Virtual Bank Client
//!
//! Typed client for the Virtual Bank REST API plus the client-side state the
//! web front end used to carry: field validation, session storage, form
//! submission state machines and role-gated navigation.
//!
//! # Modules
//!
//! - [`core_types`] - Roles, account and transaction kinds
//! - [`validation`] - Field validators and their messages
//! - [`money`] - Amount parsing and formatting
//! - [`models`] - Wire DTOs
//! - [`session`] - Session record and its storage
//! - [`api`] - `BankApi` trait, HTTP client, in-memory mock
//! - [`cancel`] - Abort handles for in-flight requests
//! - [`resources`] - Cached read-only queries with loading/error state
//! - [`mutations`] - Write operations with loading flags and notices
//! - [`submission`] - Form submission state machine and its flows
//! - [`form`] - Blur-validated registration, login and user forms
//! - [`navigation`] - Routes, menu and auth guard

// Core types - must be first!
pub mod core_types;

pub mod money;
pub mod models;
pub mod validation;

pub mod api;
pub mod cancel;
pub mod session;

pub mod form;
pub mod mutations;
pub mod navigation;
pub mod resources;
pub mod submission;

pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use api::{ApiError, ApiErrorKind, BankApi, BankClient, ClientConfig, Endpoint};
pub use cancel::{AbortHandle, AbortSignal};
pub use core_types::{AccountNo, AccountType, RecordId, Role, TransactionType};
pub use mutations::{MutationKind, MutationResult, Mutations, Notifier};
pub use navigation::{Guard, Page, Section, guard};
pub use session::{Session, SessionContext};
pub use submission::{FormMachine, SubmissionState, SubmitFlow, SubmitOutcome};
