//! Money Parsing and Formatting
//!
//! Amounts travel as `Decimal` inside the client. Form input arrives as text and
//! goes through [`parse_amount`]; anything shown to the user goes through
//! [`format_amount`], which mimics the `es-GT` currency style the bank's
//! statements use (`Q1,234.50`, `US$10.00`).
//!
//! ## Usage
//! ```rust
//! use rust_decimal::Decimal;
//! use virtual_bank_client::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("1234.5").unwrap();
//! assert_eq!(amount, Decimal::new(12345, 1));
//! assert_eq!(format_amount(amount, "GTQ"), "Q1,234.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Currencies offered when opening an account.
pub const SUPPORTED_CURRENCIES: [&str; 8] = ["USD", "EUR", "GTQ", "MXN", "COP", "ARS", "JPY", "GBP"];

/// Currency assumed when the server omits one.
pub const DEFAULT_CURRENCY: &str = "GTQ";

// ============================================================================
// Error Types
// ============================================================================

/// Money parsing errors
#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

// ============================================================================
// Parse: Form text → Decimal
// ============================================================================

/// Parse a user-entered amount.
///
/// Accepts plain decimals (`"50"`, `"12.75"`) and scientific notation
/// (`"1e3"`). The result is always strictly positive.
///
/// # Errors
/// * `InvalidFormat` - empty or non-numeric input (`"abc"`, `"NaN"`, `"inf"`)
/// * `InvalidAmount` - zero or negative values
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    let value = Decimal::from_str(amount_str)
        .or_else(|_| Decimal::from_scientific(amount_str))
        .map_err(|_| MoneyError::InvalidFormat(format!("not a number: {}", amount_str)))?;

    if value <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(value.normalize())
}

/// Check that a currency code is one the bank opens accounts in.
pub fn validate_currency(code: &str) -> Result<&'static str, MoneyError> {
    let upper = code.trim().to_ascii_uppercase();
    SUPPORTED_CURRENCIES
        .iter()
        .find(|c| **c == upper)
        .copied()
        .ok_or(MoneyError::UnsupportedCurrency(code.to_string()))
}

// ============================================================================
// Format: Decimal → display string
// ============================================================================

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code {
        "GTQ" => Some("Q"),
        "USD" => Some("US$"),
        "EUR" => Some("€"),
        "MXN" => Some("MX$"),
        "GBP" => Some("£"),
        "JPY" => Some("JP¥"),
        _ => None,
    }
}

/// Group the integer digits in threes with `,`.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format an amount with two decimals and the currency symbol.
///
/// Unknown codes are rendered as a `"COP 1,000.00"` style prefix.
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let plain = format!("{:.2}", rounded.abs());
    let (whole, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let body = format!("{}.{}", group_thousands(whole), frac);

    let code = currency.trim().to_ascii_uppercase();
    match currency_symbol(&code) {
        Some(symbol) => format!("{sign}{symbol}{body}"),
        None if code.is_empty() => format!("{sign}{body}"),
        None => format!("{sign}{code} {body}"),
    }
}

// ============================================================================
// Tests
// ============================================================================
