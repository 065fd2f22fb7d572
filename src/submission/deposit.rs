//! Deposit form

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::machine::{FormMachine, SubmitFlow};
use crate::api::{ApiError, BankApi, DepositReceipt, FieldErrors};
use crate::models::DepositRequest;
use crate::money::parse_amount;
use crate::resources::AccountsResource;

pub const FIELD_ACCOUNT: &str = "fromAccount";
pub const FIELD_AMOUNT: &str = "amount";

pub const SELECT_ACCOUNT_MESSAGE: &str = "Selecciona una cuenta de origen";
pub const INVALID_AMOUNT_MESSAGE: &str = "Ingresa un monto válido";
pub const DEPOSIT_SUCCESS_MESSAGE: &str = "Deposito enviado con exito";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositFields {
    pub account: String,
    pub amount: String,
}

pub struct DepositFlow {
    api: Arc<dyn BankApi>,
    /// Refreshed after a successful deposit when the form shows balances.
    accounts: Option<AccountsResource>,
}

impl DepositFlow {
    pub fn new(api: Arc<dyn BankApi>, accounts: Option<AccountsResource>) -> Self {
        Self { api, accounts }
    }
}

#[async_trait]
impl SubmitFlow for DepositFlow {
    type Fields = DepositFields;
    type Request = DepositRequest;
    type Receipt = DepositReceipt;

    fn name(&self) -> &'static str {
        "deposit"
    }

    fn validate(&self, fields: &DepositFields) -> Result<DepositRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let account = fields.account.trim();
        if account.is_empty() {
            errors.insert(FIELD_ACCOUNT.into(), SELECT_ACCOUNT_MESSAGE.into());
        }
        let amount = parse_amount(&fields.amount)
            .inspect_err(|_| {
                errors.insert(FIELD_AMOUNT.into(), INVALID_AMOUNT_MESSAGE.into());
            })
            .ok();

        match amount {
            Some(amount) if errors.is_empty() => Ok(DepositRequest {
                account: account.to_string(),
                amount,
            }),
            _ => Err(errors),
        }
    }

    async fn submit(&self, request: DepositRequest) -> Result<DepositReceipt, ApiError> {
        self.api.create_deposit(&request).await
    }

    fn success_message(&self, receipt: &DepositReceipt) -> String {
        receipt
            .message
            .clone()
            .unwrap_or_else(|| DEPOSIT_SUCCESS_MESSAGE.to_string())
    }

    async fn after_success(&self, _receipt: &DepositReceipt) {
        if let Some(accounts) = &self.accounts
            && let Err(e) = accounts.refetch().await
        {
            debug!(error = %e, "Balance refresh after deposit failed");
        }
    }
}

pub type DepositForm = FormMachine<DepositFlow>;

pub fn deposit_form(api: Arc<dyn BankApi>, accounts: Option<AccountsResource>) -> DepositForm {
    FormMachine::new(DepositFlow::new(api, accounts))
}
