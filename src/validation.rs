//! Field validators for the registration, login and user-management forms
//!
//! Every rule is a pure `fn(&str) -> bool` paired with the message shown under
//! the input when the rule fails. Empty input fails every rule.
//!
//! [`Dpi`] is the one identifier that also exists as a validated type: it is
//! used as a path segment (`/user/update/:dpi`) and must never be built from
//! unchecked text.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use validator::ValidateEmail;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for typed identifiers
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

// ============================================================================
// Rule constants
// ============================================================================

pub const USERNAME_MIN_LEN: usize = 5;
pub const USERNAME_MAX_LEN: usize = 20;
pub const DPI_LEN: usize = 13;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 30;
/// Minimum monthly income in quetzales accepted at registration.
pub const INCOME_MIN: i64 = 100;
pub const WORK_NAME_MIN_LEN: usize = 3;
pub const WORK_NAME_MAX_LEN: usize = 50;
pub const PERSON_NAME_MIN_LEN: usize = 2;
pub const PERSON_NAME_MAX_LEN: usize = 50;
pub const PHONE_LEN: usize = 8;
pub const DIRECTION_MIN_LEN: usize = 5;
pub const DIRECTION_MAX_LEN: usize = 100;
pub const VERIFICATION_CODE_LEN: usize = 6;

// ============================================================================
// Messages
// ============================================================================

pub const USERNAME_MESSAGE: &str = "Ingresar minimo 5 caracteres, sin espacios";
pub const DPI_MESSAGE: &str = "Por favor, ingresa un DPI válido de 13 dígitos";
pub const PASSWORD_MESSAGE: &str =
    "Contraseña minimo de 6 caracteres, sin espacios y debe contener al menos una letra mayúscula";
pub const PASSWORD_CONFIRM_MESSAGE: &str = "Las contraseñas no coinciden";
pub const INCOME_MESSAGE: &str = "El ingreso mínimo es Q100";
pub const WORK_NAME_MESSAGE: &str = "El nombre del trabajo debe tener entre 3 y 50 caracteres";
pub const EMAIL_MESSAGE: &str = "Por favor, ingresa un correo electrónico válido";
pub const NAME_MESSAGE: &str = "El nombre debe tener entre 2 y 50 caracteres";
pub const SURNAME_MESSAGE: &str = "El apellido debe tener entre 2 y 50 caracteres";
pub const PHONE_MESSAGE: &str = "El teléfono debe tener 8 dígitos";
pub const DIRECTION_MESSAGE: &str = "La dirección debe tener entre 5 y 100 caracteres";
pub const VERIFICATION_CODE_MESSAGE: &str = "El código debe tener 6 dígitos";

// ============================================================================
// Predicates
// ============================================================================

fn char_len_between(value: &str, min: usize, max: usize) -> bool {
    let len = value.chars().count();
    (min..=max).contains(&len)
}

fn all_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// No whitespace, 5-20 characters.
pub fn validate_username(username: &str) -> bool {
    !username.chars().any(char::is_whitespace)
        && char_len_between(username, USERNAME_MIN_LEN, USERNAME_MAX_LEN)
}

/// Exactly 13 decimal digits.
pub fn validate_dpi(dpi: &str) -> bool {
    all_digits(dpi, DPI_LEN)
}

/// No whitespace, 6-30 characters, at least one uppercase letter.
pub fn validate_password(password: &str) -> bool {
    !password.chars().any(char::is_whitespace)
        && char_len_between(password, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN)
        && password.chars().any(|c| c.is_ascii_uppercase())
}

/// Confirmation must repeat a non-empty password exactly.
pub fn validate_password_confirm(password: &str, confirmation: &str) -> bool {
    !confirmation.is_empty() && password == confirmation
}

/// Numeric text not below [`INCOME_MIN`].
pub fn validate_income(income: &str) -> bool {
    let income = income.trim();
    Decimal::from_str(income)
        .or_else(|_| Decimal::from_scientific(income))
        .map(|value| value >= Decimal::from(INCOME_MIN))
        .unwrap_or(false)
}

/// Trimmed length between 3 and 50.
pub fn validate_work_name(work_name: &str) -> bool {
    char_len_between(work_name.trim(), WORK_NAME_MIN_LEN, WORK_NAME_MAX_LEN)
}

pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.validate_email()
}

pub fn validate_name(name: &str) -> bool {
    char_len_between(name.trim(), PERSON_NAME_MIN_LEN, PERSON_NAME_MAX_LEN)
}

pub fn validate_surname(surname: &str) -> bool {
    validate_name(surname)
}

/// Guatemalan numbers: 8 digits, no country prefix.
pub fn validate_phone(phone: &str) -> bool {
    all_digits(phone, PHONE_LEN)
}

pub fn validate_direction(direction: &str) -> bool {
    char_len_between(direction.trim(), DIRECTION_MIN_LEN, DIRECTION_MAX_LEN)
}

pub fn validate_verification_code(code: &str) -> bool {
    all_digits(code, VERIFICATION_CODE_LEN)
}

/// The login form accepts either an email or a username in one box.
pub fn validate_login_identifier(identifier: &str) -> bool {
    if identifier.contains('@') {
        validate_email(identifier)
    } else {
        validate_username(identifier)
    }
}

// ============================================================================
// Dpi - Validated national identity number (Private Fields)
// ============================================================================

/// Validated DPI (13 ASCII digits)
///
/// Fields are private to force validation through `new()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dpi(String);

impl Dpi {
    /// Create a new validated Dpi
    ///
    /// # Examples
    /// ```
    /// use virtual_bank_client::validation::Dpi;
    ///
    /// let dpi = Dpi::new("1234567890123").unwrap();
    /// assert_eq!(dpi.as_str(), "1234567890123");
    ///
    /// assert!(Dpi::new("12345").is_err());
    /// ```
    pub fn new(dpi: &str) -> Result<Self, ValidationError> {
        let dpi = dpi.trim();

        if dpi.len() != DPI_LEN {
            return Err(ValidationError::InvalidLength {
                field: "dpi",
                min: DPI_LEN,
                max: DPI_LEN,
                actual: dpi.len(),
            });
        }

        if !dpi.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "dpi",
                value: dpi.to_string(),
                expected: "13 decimal digits",
            });
        }

        Ok(Self(dpi.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Dpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Dpi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Dpi {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dpi::new(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
