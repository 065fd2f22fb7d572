//! Response shapes returned by [`BankApi`](super::BankApi)
//!
//! The backend is loose about where it puts things (`message` vs `msg`, a
//! receipt nested under `data` or inlined in the body), so these types are
//! decoded from the raw JSON body with explicit fallbacks.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use crate::core_types::{AccountNo, RecordId};
use crate::models::{Account, DepositRequest, TransferRequest};

/// Success message from either `message` or `msg`.
pub fn body_message(body: &Value) -> Option<String> {
    ["message", "msg"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Deserialize `body[key]`, mapping a missing or malformed field to a decode error.
pub fn decode_field<T: DeserializeOwned>(body: &Value, key: &str) -> Result<T, ApiError> {
    let value = body
        .get(key)
        .ok_or_else(|| ApiError::decode(format!("missing field `{}`", key)))?;
    serde_json::from_value(value.clone()).map_err(|e| ApiError::decode(format!("`{}`: {}", key, e)))
}

fn decimal_at(body: &Value, key: &str) -> Option<Decimal> {
    body.get(key)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn string_at(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ack {
    pub message: Option<String>,
}

impl Ack {
    pub fn from_body(body: &Value) -> Self {
        Self {
            message: body_message(body),
        }
    }

    pub fn message_or(&self, default: &str) -> String {
        self.message.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Result of `/account/createAccount`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAccount {
    pub message: Option<String>,
    pub account: Account,
}

impl CreatedAccount {
    pub fn from_body(body: &Value) -> Result<Self, ApiError> {
        Ok(Self {
            message: body_message(body),
            account: decode_field(body, "account")?,
        })
    }
}

/// What the success banner of a transfer shows.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub message: Option<String>,
    pub amount: Decimal,
    pub from: AccountNo,
    pub to: AccountNo,
    /// Present when source and destination currencies differ.
    pub converted_amount: Option<Decimal>,
    pub converted_to: Option<String>,
}

impl TransferReceipt {
    /// Details are read from `body.data` when it is an object, otherwise from
    /// the body itself; anything missing falls back to the request.
    pub fn from_body(body: &Value, request: &TransferRequest) -> Self {
        let details = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
        let converted_amount = decimal_at(details, "convertedAmount");
        let converted_to = string_at(details, "convertedTo");
        Self {
            message: body_message(body),
            amount: decimal_at(details, "amount").unwrap_or(request.amount),
            from: string_at(details, "from").unwrap_or_else(|| request.from_account.clone()),
            to: string_at(details, "to").unwrap_or_else(|| request.to_account.clone()),
            converted_amount: converted_amount.filter(|_| converted_to.is_some()),
            converted_to: converted_to.filter(|_| converted_amount.is_some()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub message: Option<String>,
    pub account: AccountNo,
    pub amount: Decimal,
}

impl DepositReceipt {
    pub fn from_body(body: &Value, request: &DepositRequest) -> Self {
        Self {
            message: body_message(body),
            account: request.account.clone(),
            amount: request.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReversalReceipt {
    pub message: Option<String>,
    pub transaction_id: RecordId,
    pub updated_account_balance: Option<Decimal>,
    pub currency: Option<String>,
}

impl ReversalReceipt {
    pub fn from_body(body: &Value, transaction_id: &str) -> Self {
        Self {
            message: body_message(body),
            transaction_id: transaction_id.to_string(),
            updated_account_balance: decimal_at(body, "updatedAccountBalance"),
            currency: body
                .get("reversalDetails")
                .and_then(|d| string_at(d, "currency")),
        }
    }
}
