//! Core types used throughout the client
//!
//! Enumerations the backend exchanges as plain strings. They are kept as
//! closed Rust enums so that role checks and account-type choices are
//! exhaustive at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account number as printed on statements (`noAccount`).
pub type AccountNo = String;

/// Server-side identifier (`_id`) of any persisted record.
pub type RecordId = String;

/// User role carried in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN_ROLE")]
    Admin,
    #[serde(rename = "SUPERVISOR_ROLE")]
    Supervisor,
    #[serde(rename = "CLIENT_ROLE")]
    Client,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Supervisor, Role::Client];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN_ROLE",
            Role::Supervisor => "SUPERVISOR_ROLE",
            Role::Client => "CLIENT_ROLE",
        }
    }

    /// Admin and supervisor sessions may use the `/account/admin/*` and
    /// `/user/*` endpoints.
    #[inline]
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN_ROLE" => Ok(Role::Admin),
            "SUPERVISOR_ROLE" => Ok(Role::Supervisor),
            "CLIENT_ROLE" => Ok(Role::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Bank account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccountType {
    #[default]
    Savings,
    Monetary,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "Savings",
            AccountType::Monetary => "Monetary",
        }
    }

    /// Label shown next to the account in listings.
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Savings => "Cuenta de Ahorros",
            AccountType::Monetary => "Cuenta monetaria",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "monetary" => Ok(AccountType::Monetary),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// Ledger movement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
