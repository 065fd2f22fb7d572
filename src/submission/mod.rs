//! Form submission state machine
//!
//! ```text
//! Idle ──submit──▶ Validating ──ok──▶ Submitting ──▶ Success
//!                      │                  │
//!                      └──errors──▶ Error ◀┘ (transport / HTTP / success:false)
//! ```
//!
//! One generic machine ([`FormMachine`]) drives the transfer, deposit,
//! deposit-reversal and email-verification forms.

pub mod deposit;
pub mod machine;
pub mod reversal;
pub mod state;
pub mod transfer;
pub mod verification;

pub use deposit::{DepositFields, DepositFlow, DepositForm, deposit_form};
pub use machine::{Banner, FormMachine, FormSnapshot, SubmitFlow, SubmitOutcome, VALIDATION_SUMMARY};
pub use reversal::{ReversalFields, ReversalFlow, ReversalForm, reversal_form};
pub use state::SubmissionState;
pub use transfer::{TransferFields, TransferFlow, TransferForm, receipt_lines, transfer_form};
pub use verification::{CodeEntry, CodeForm, VerificationFlow, VerifyStatus};
