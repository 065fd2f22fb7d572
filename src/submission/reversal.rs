//! Admin deposit reversal form
//!
//! The one-minute reversal window is enforced by the server; an expired
//! deposit comes back as an ordinary error banner.

use async_trait::async_trait;
use std::sync::Arc;

use super::machine::{FormMachine, SubmitFlow};
use crate::api::{ApiError, BankApi, FieldErrors, ReversalReceipt};
use crate::models::ReverseDepositRequest;

pub const FIELD_TRANSACTION_ID: &str = "transactionId";

pub const MISSING_ID_MESSAGE: &str = "Por favor, ingresa un ID de transacción.";
pub const REVERSAL_SUCCESS_MESSAGE: &str = "Depósito revertido exitosamente.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReversalFields {
    pub transaction_id: String,
}

pub struct ReversalFlow {
    api: Arc<dyn BankApi>,
}

impl ReversalFlow {
    pub fn new(api: Arc<dyn BankApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SubmitFlow for ReversalFlow {
    type Fields = ReversalFields;
    type Request = ReverseDepositRequest;
    type Receipt = ReversalReceipt;

    fn name(&self) -> &'static str {
        "reverse_deposit"
    }

    fn validate(&self, fields: &ReversalFields) -> Result<ReverseDepositRequest, FieldErrors> {
        let id = fields.transaction_id.trim();
        if id.is_empty() {
            let mut errors = FieldErrors::new();
            errors.insert(FIELD_TRANSACTION_ID.into(), MISSING_ID_MESSAGE.into());
            return Err(errors);
        }
        Ok(ReverseDepositRequest {
            transaction_id: id.to_string(),
        })
    }

    async fn submit(&self, request: ReverseDepositRequest) -> Result<ReversalReceipt, ApiError> {
        self.api.reverse_deposit(&request).await
    }

    fn success_message(&self, receipt: &ReversalReceipt) -> String {
        let base = receipt.message.as_deref().unwrap_or(REVERSAL_SUCCESS_MESSAGE);
        match (receipt.updated_account_balance, &receipt.currency) {
            (Some(balance), Some(currency)) => {
                format!("{} Nuevo saldo: {:.2} {}", base, balance, currency)
            }
            (Some(balance), None) => format!("{} Nuevo saldo: {:.2}", base, balance),
            _ => base.to_string(),
        }
    }
}

pub type ReversalForm = FormMachine<ReversalFlow>;

pub fn reversal_form(api: Arc<dyn BankApi>) -> ReversalForm {
    FormMachine::new(ReversalFlow::new(api))
}
