//! Transfer form

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::machine::{FormMachine, SubmitFlow};
use crate::api::{ApiError, BankApi, FieldErrors, TransferReceipt};
use crate::models::TransferRequest;
use crate::money::{format_amount, parse_amount};
use crate::resources::AccountsResource;

pub const FIELD_FROM: &str = "fromAccount";
pub const FIELD_TO: &str = "toAccount";
pub const FIELD_AMOUNT: &str = "amount";

pub const SELECT_SOURCE_MESSAGE: &str = "Selecciona una cuenta de origen";
pub const ENTER_DESTINATION_MESSAGE: &str = "Ingresa la cuenta de destino";
pub const INVALID_AMOUNT_MESSAGE: &str = "Ingresa un monto válido y mayor a cero.";
pub const SAME_ACCOUNT_MESSAGE: &str = "No puedes transferir dinero a la misma cuenta.";
pub const TRANSFER_SUCCESS_MESSAGE: &str = "¡Transferencia Exitosa!";

pub fn insufficient_funds_message(balance: &str) -> String {
    format!("Fondos insuficientes. Saldo disponible: {}.", balance)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferFields {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
}

/// Validates against the accounts snapshot and refetches it on success.
pub struct TransferFlow {
    api: Arc<dyn BankApi>,
    accounts: AccountsResource,
}

impl TransferFlow {
    pub fn new(api: Arc<dyn BankApi>, accounts: AccountsResource) -> Self {
        Self { api, accounts }
    }

    pub fn accounts(&self) -> &AccountsResource {
        &self.accounts
    }
}

#[async_trait]
impl SubmitFlow for TransferFlow {
    type Fields = TransferFields;
    type Request = TransferRequest;
    type Receipt = TransferReceipt;

    fn name(&self) -> &'static str {
        "transfer"
    }

    fn validate(&self, fields: &TransferFields) -> Result<TransferRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let from = fields.from_account.trim();
        let to = fields.to_account.trim();

        if from.is_empty() {
            errors.insert(FIELD_FROM.into(), SELECT_SOURCE_MESSAGE.into());
        }
        if to.is_empty() {
            errors.insert(FIELD_TO.into(), ENTER_DESTINATION_MESSAGE.into());
        }

        let amount = match parse_amount(&fields.amount) {
            Ok(amount) => {
                // Optimistic: the server re-checks against the live balance.
                if let Some(source) = self.accounts.data().iter().find(|a| a.no_account == from)
                    && amount > source.amount
                {
                    errors.insert(
                        FIELD_AMOUNT.into(),
                        insufficient_funds_message(&format_amount(source.amount, &source.currency)),
                    );
                }
                Some(amount)
            }
            Err(_) => {
                errors.insert(FIELD_AMOUNT.into(), INVALID_AMOUNT_MESSAGE.into());
                None
            }
        };

        if !from.is_empty() && from == to {
            errors.insert(FIELD_TO.into(), SAME_ACCOUNT_MESSAGE.into());
        }

        match amount {
            Some(amount) if errors.is_empty() => Ok(TransferRequest {
                from_account: from.to_string(),
                to_account: to.to_string(),
                amount,
            }),
            _ => Err(errors),
        }
    }

    async fn submit(&self, request: TransferRequest) -> Result<TransferReceipt, ApiError> {
        self.api.create_transfer(&request).await
    }

    fn success_message(&self, receipt: &TransferReceipt) -> String {
        receipt
            .message
            .clone()
            .unwrap_or_else(|| TRANSFER_SUCCESS_MESSAGE.to_string())
    }

    async fn after_success(&self, _receipt: &TransferReceipt) {
        if let Err(e) = self.accounts.refetch().await {
            debug!(error = %e, "Balance refresh after transfer failed");
        }
    }
}

/// Banner detail lines for a completed transfer.
pub fn receipt_lines(receipt: &TransferReceipt) -> Vec<String> {
    let mut lines = vec![
        format!("Monto: {:.2}", receipt.amount),
        format!("Desde: {}", receipt.from),
        format!("Hacia: {}", receipt.to),
    ];
    if let (Some(converted), Some(currency)) = (receipt.converted_amount, &receipt.converted_to) {
        lines.push(format!("Monto convertido: {:.2} {}", converted, currency));
    }
    lines
}

pub type TransferForm = FormMachine<TransferFlow>;

pub fn transfer_form(api: Arc<dyn BankApi>, accounts: AccountsResource) -> TransferForm {
    FormMachine::new(TransferFlow::new(api, accounts))
}

#[cfg(all(test, feature = "mock-api"))]
mod tests {
    use super::*;
    use crate::api::Endpoint;
    use crate::api::mock::MockBankApi;
    use crate::cancel::AbortSignal;
    use crate::resources::{MyAccounts, Resource};
    use crate::session::SessionContext;
    use crate::submission::machine::SubmitOutcome;
    use crate::submission::state::SubmissionState;
    use rust_decimal::Decimal;

    async fn setup() -> (Arc<MockBankApi>, TransferForm) {
        let bank = Arc::new(MockBankApi::demo(SessionContext::in_memory()));
        bank.act_as("2000000000001");
        let accounts = Resource::new(MyAccounts, bank.clone());
        accounts.refetch().await.unwrap();
        let form = transfer_form(bank.clone(), accounts);
        (bank, form)
    }

    fn fill(form: &TransferForm, from: &str, to: &str, amount: &str) {
        form.set_fields(TransferFields {
            from_account: from.into(),
            to_account: to.into(),
            amount: amount.into(),
        });
    }

    #[tokio::test]
    async fn test_empty_form_errors() {
        let (bank, form) = setup().await;
        let outcome = form.submit(&AbortSignal::never()).await;
        let SubmitOutcome::Rejected(errors) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(errors[FIELD_FROM], SELECT_SOURCE_MESSAGE);
        assert_eq!(errors[FIELD_TO], ENTER_DESTINATION_MESSAGE);
        assert_eq!(errors[FIELD_AMOUNT], INVALID_AMOUNT_MESSAGE);
        assert_eq!(bank.calls(Endpoint::CreateTransaction), 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_blocked_client_side() {
        let (bank, form) = setup().await;
        fill(&form, "001", "004", "150.00");
        let outcome = form.submit(&AbortSignal::never()).await;
        let SubmitOutcome::Rejected(errors) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(errors[FIELD_AMOUNT], "Fondos insuficientes. Saldo disponible: Q100.00.");
        assert_eq!(bank.calls(Endpoint::CreateTransaction), 0);
        assert_eq!(form.fields().amount, "150.00");
    }

    #[tokio::test]
    async fn test_same_account_blocked() {
        let (bank, form) = setup().await;
        fill(&form, "001", "001", "10");
        let outcome = form.submit(&AbortSignal::never()).await;
        let SubmitOutcome::Rejected(errors) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(errors[FIELD_TO], SAME_ACCOUNT_MESSAGE);
        assert_eq!(errors.len(), 1);
        assert_eq!(bank.calls(Endpoint::CreateTransaction), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_amount() {
        let (_, form) = setup().await;
        for amount in ["abc", "0", "-5", ""] {
            fill(&form, "001", "002", amount);
            let outcome = form.submit(&AbortSignal::never()).await;
            assert!(matches!(outcome, SubmitOutcome::Rejected(ref e) if e[FIELD_AMOUNT] == INVALID_AMOUNT_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_success_refetches_balances() {
        let (bank, form) = setup().await;
        fill(&form, "001", "002", "50");
        let outcome = form.submit(&AbortSignal::never()).await;
        let SubmitOutcome::Succeeded(receipt) = outcome else {
            panic!("expected success");
        };
        assert_eq!(receipt.amount, Decimal::from(50));

        let snap = form.snapshot();
        assert_eq!(snap.state, SubmissionState::Success);
        assert_eq!(snap.fields, TransferFields::default());
        assert_eq!(snap.banner.unwrap().message(), TRANSFER_SUCCESS_MESSAGE);
        assert_eq!(
            receipt_lines(&receipt),
            vec!["Monto: 50.00", "Desde: 001", "Hacia: 002"]
        );

        assert_eq!(bank.calls(Endpoint::MyAccounts), 2);
        let refreshed = form.flow().accounts().data();
        let source = refreshed.iter().find(|a| a.no_account == "001").unwrap();
        assert_eq!(source.amount, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_server_decline_keeps_fields() {
        let (bank, form) = setup().await;
        bank.fail_next(
            Endpoint::CreateTransaction,
            ApiError::rejected(
                &serde_json::json!({"success": false, "message": "Fondos insuficientes"}),
                "x",
            ),
        );
        fill(&form, "001", "002", "50");
        let outcome = form.submit(&AbortSignal::never()).await;
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));

        let snap = form.snapshot();
        assert_eq!(snap.state, SubmissionState::Error);
        assert_eq!(snap.banner.unwrap().message(), "Fondos insuficientes");
        assert_eq!(snap.fields.from_account, "001");
        assert_eq!(snap.fields.amount, "50");
    }
}
