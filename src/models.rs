//! Wire DTOs exchanged with the Virtual Bank REST API
//!
//! The server owns every one of these shapes. Field names follow the
//! backend's camelCase JSON; record identifiers arrive as Mongo-style `_id`.
//! Amounts are deserialized from JSON numbers into `Decimal` and sent back as
//! JSON numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountNo, AccountType, RecordId, Role, TransactionType};

// ============================================================================
// Accounts
// ============================================================================

/// A bank account owned by the session user (also the shape of a favorite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: RecordId,
    pub no_account: AccountNo,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub amount: Decimal,
    /// Link to the favorite relation, `None` when not bookmarked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites: Option<serde_json::Value>,
}

impl Account {
    pub fn is_favorite(&self) -> bool {
        self.favorites.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// One ledger movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: RecordId,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account: Option<AccountNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<AccountNo>,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Whether this movement added funds to `account_no`.
    pub fn is_credit_for(&self, account_no: &str) -> bool {
        match self.tx_type {
            TransactionType::Deposit => true,
            TransactionType::Transfer => self.to_account.as_deref() == Some(account_no),
            TransactionType::Withdrawal => false,
        }
    }
}

/// Row of the admin "most active accounts" report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostActiveAccount {
    pub no_account: AccountNo,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub owner_username: String,
    #[serde(default)]
    pub total_movement: Decimal,
    #[serde(default)]
    pub current_balance: Decimal,
    #[serde(default)]
    pub currency: String,
}

/// Owner summary embedded in [`AccountDetails`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOwner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Single-account admin view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetails {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: RecordId,
    pub no_account: AccountNo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AccountOwner>,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    /// `true` while the account is active.
    #[serde(default)]
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "last5Movements")]
    pub last_movements: Vec<Transaction>,
}

// ============================================================================
// Users
// ============================================================================

/// A bank customer or staff member as listed by `/user/users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub dpi: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub work_name: String,
    #[serde(default)]
    pub income: Decimal,
    pub role: Role,
    /// `true` while the user is active.
    #[serde(default = "default_true")]
    pub status: bool,
}

fn default_true() -> bool {
    true
}

/// Users listing plus the server's total count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

// ============================================================================
// Requests
// ============================================================================

/// Self-service registration (`/auth/register`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub dpi: String,
    pub email: String,
    pub income: String,
    pub direction: String,
    pub phone: String,
    pub password: String,
}

/// Login identifier: all-digit identifiers are sent as `dpi`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoginRequest {
    Dpi { dpi: String, password: String },
    Username { username: String, password: String },
}

impl LoginRequest {
    pub fn new(identifier: &str, password: &str) -> Self {
        let identifier = identifier.trim();
        if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
            LoginRequest::Dpi {
                dpi: identifier.to_string(),
                password: password.to_string(),
            }
        } else {
            LoginRequest::Username {
                username: identifier.to_string(),
                password: password.to_string(),
            }
        }
    }
}

/// How an admin identifies the owner of a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOwnerRef {
    Username(String),
    Dpi(String),
}

/// Open an account for an existing user (`/account/createAccount`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    #[serde(rename = "targetDPI", skip_serializing_if = "Option::is_none")]
    pub target_dpi: Option<String>,
}

impl CreateAccountRequest {
    pub fn new(owner: AccountOwnerRef, amount: Decimal, currency: &str, account_type: AccountType) -> Self {
        let (target_username, target_dpi) = match owner {
            AccountOwnerRef::Username(u) => (Some(u.trim().to_string()), None),
            AccountOwnerRef::Dpi(d) => (None, Some(d.trim().to_string())),
        };
        Self {
            amount,
            currency: currency.to_string(),
            account_type,
            target_username,
            target_dpi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: AccountNo,
    pub to_account: AccountNo,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// The backend reads the credited account from `fromAccount`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    #[serde(rename = "fromAccount")]
    pub account: AccountNo,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub account_no: AccountNo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteRequest {
    pub my_account_no: AccountNo,
    pub favorite_account_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseDepositRequest {
    pub transaction_id: RecordId,
}

/// Admin create/update payload. `dpi` is omitted on update.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<String>,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub direction: String,
    pub work_name: String,
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub income: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_from_wire() {
        let account: Account = serde_json::from_value(json!({
            "_id": "665f",
            "noAccount": "001",
            "type": "Monetary",
            "currency": "GTQ",
            "amount": 100.5,
            "favorites": null
        }))
        .unwrap();
        assert_eq!(account.id, "665f");
        assert_eq!(account.account_type, AccountType::Monetary);
        assert_eq!(account.amount, Decimal::new(1005, 1));
        assert!(!account.is_favorite());
    }

    #[test]
    fn test_transaction_credit_direction() {
        let tx: Transaction = serde_json::from_value(json!({
            "_id": "t1",
            "type": "TRANSFER",
            "fromAccount": "001",
            "toAccount": "002",
            "amount": 50,
            "currency": "GTQ",
            "createdAt": "2025-05-30T15:04:05Z"
        }))
        .unwrap();
        assert!(tx.is_credit_for("002"));
        assert!(!tx.is_credit_for("001"));
        assert!(tx.created_at.is_some());
    }

    #[test]
    fn test_login_request_picks_identifier_kind() {
        let by_dpi = serde_json::to_value(LoginRequest::new("1234567890123", "Secret1")).unwrap();
        assert_eq!(by_dpi, json!({"dpi": "1234567890123", "password": "Secret1"}));

        let by_name = serde_json::to_value(LoginRequest::new("anagarcia", "Secret1")).unwrap();
        assert_eq!(by_name, json!({"username": "anagarcia", "password": "Secret1"}));
    }

    #[test]
    fn test_transfer_request_sends_number() {
        let req = TransferRequest {
            from_account: "001".into(),
            to_account: "002".into(),
            amount: Decimal::new(5025, 2),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["fromAccount"], "001");
        assert_eq!(value["amount"].as_f64(), Some(50.25));
    }

    #[test]
    fn test_create_account_request_owner_field() {
        let req = CreateAccountRequest::new(
            AccountOwnerRef::Dpi(" 1234567890123 ".into()),
            Decimal::from(10),
            "USD",
            AccountType::Savings,
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["targetDPI"], "1234567890123");
        assert!(value.get("targetUsername").is_none());
        assert_eq!(value["type"], "Savings");
    }

    #[test]
    fn test_user_payload_omits_dpi_on_update() {
        let payload = UserPayload {
            username: "anagarcia".into(),
            income: Some(Decimal::from(1500)),
            ..Default::default()
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("dpi").is_none());
        assert_eq!(value["income"].as_f64(), Some(1500.0));
        assert_eq!(value["workName"], "");
    }
}
