//! Blur-validated input forms
//!
//! Fields are checked when the user leaves them, never on each keystroke.
//! Editing a field drops its validity until the next blur, so a value that
//! was never checked cannot be submitted. The submit button is disabled while
//! any field is not known to be valid or a request is in flight.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;

use crate::api::FieldErrors;
use crate::core_types::Role;
use crate::models::{RegisterRequest, User, UserPayload};
use crate::validation::*;

/// One input's value and validation display state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFieldState {
    pub value: String,
    pub is_valid: bool,
    pub show_error: bool,
}

impl FormFieldState {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Pre-filled from trusted data, already valid.
    pub fn valid(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_valid: true,
            show_error: false,
        }
    }
}

/// Field states keyed by a form's field enum.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap<K: Ord + Copy + Debug> {
    states: BTreeMap<K, FormFieldState>,
}

impl<K: Ord + Copy + Debug> FieldMap<K> {
    pub fn new(keys: &[K]) -> Self {
        Self {
            states: keys.iter().map(|k| (*k, FormFieldState::default())).collect(),
        }
    }

    pub fn state(&self, key: K) -> FormFieldState {
        self.states.get(&key).cloned().unwrap_or_default()
    }

    pub fn value(&self, key: K) -> &str {
        self.states.get(&key).map(|s| s.value.as_str()).unwrap_or("")
    }

    pub fn set(&mut self, key: K, state: FormFieldState) {
        self.states.insert(key, state);
    }

    fn change(&mut self, key: K, value: &str) {
        let state = self.states.entry(key).or_default();
        state.value = value.to_string();
        state.is_valid = false;
    }

    fn mark(&mut self, key: K, valid: bool) {
        let state = self.states.entry(key).or_default();
        state.is_valid = valid;
        state.show_error = !valid;
    }

    fn invalidate(&mut self, key: K) {
        if let Some(state) = self.states.get_mut(&key) {
            state.is_valid = false;
        }
    }

    pub fn all_valid(&self) -> bool {
        self.states.values().all(|s| s.is_valid)
    }

    pub fn is_showing_error(&self, key: K) -> bool {
        self.states.get(&key).is_some_and(|s| s.show_error)
    }
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterField {
    Name,
    Surname,
    Username,
    Dpi,
    Email,
    Income,
    Direction,
    Phone,
    Password,
    PasswordConfirm,
}

impl RegisterField {
    pub const ALL: [RegisterField; 10] = [
        RegisterField::Name,
        RegisterField::Surname,
        RegisterField::Username,
        RegisterField::Dpi,
        RegisterField::Email,
        RegisterField::Income,
        RegisterField::Direction,
        RegisterField::Phone,
        RegisterField::Password,
        RegisterField::PasswordConfirm,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            RegisterField::Name => NAME_MESSAGE,
            RegisterField::Surname => SURNAME_MESSAGE,
            RegisterField::Username => USERNAME_MESSAGE,
            RegisterField::Dpi => DPI_MESSAGE,
            RegisterField::Email => EMAIL_MESSAGE,
            RegisterField::Income => INCOME_MESSAGE,
            RegisterField::Direction => DIRECTION_MESSAGE,
            RegisterField::Phone => PHONE_MESSAGE,
            RegisterField::Password => PASSWORD_MESSAGE,
            RegisterField::PasswordConfirm => PASSWORD_CONFIRM_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterForm {
    fields: FieldMap<RegisterField>,
}

impl Default for RegisterForm {
    fn default() -> Self {
        Self {
            fields: FieldMap::new(&RegisterField::ALL),
        }
    }
}

impl RegisterForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, field: RegisterField) -> FormFieldState {
        self.fields.state(field)
    }

    pub fn change(&mut self, field: RegisterField, value: &str) {
        self.fields.change(field, value);
        if field == RegisterField::Password {
            self.fields.invalidate(RegisterField::PasswordConfirm);
        }
    }

    /// Validate `field` against its current value.
    pub fn blur(&mut self, field: RegisterField) -> bool {
        let value = self.fields.value(field);
        let valid = match field {
            RegisterField::Name => validate_name(value),
            RegisterField::Surname => validate_surname(value),
            RegisterField::Username => validate_username(value),
            RegisterField::Dpi => validate_dpi(value),
            RegisterField::Email => validate_email(value),
            RegisterField::Income => validate_income(value),
            RegisterField::Direction => validate_direction(value),
            RegisterField::Phone => validate_phone(value),
            RegisterField::Password => validate_password(value),
            RegisterField::PasswordConfirm => {
                validate_password_confirm(self.fields.value(RegisterField::Password), value)
            }
        };
        self.fields.mark(field, valid);
        valid
    }

    pub fn blur_all(&mut self) -> bool {
        RegisterField::ALL
            .into_iter()
            .fold(true, |ok, field| self.blur(field) && ok)
    }

    /// Message under the input, while its error is shown.
    pub fn error(&self, field: RegisterField) -> Option<&'static str> {
        self.fields
            .is_showing_error(field)
            .then(|| field.message())
    }

    pub fn is_disabled(&self, loading: bool) -> bool {
        loading || !self.fields.all_valid()
    }

    pub fn request(&self) -> RegisterRequest {
        let v = |f| self.fields.value(f).to_string();
        RegisterRequest {
            name: v(RegisterField::Name),
            surname: v(RegisterField::Surname),
            username: v(RegisterField::Username),
            dpi: v(RegisterField::Dpi),
            email: v(RegisterField::Email),
            income: v(RegisterField::Income),
            direction: v(RegisterField::Direction),
            phone: v(RegisterField::Phone),
            password: v(RegisterField::Password),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoginField {
    Identifier,
    Password,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    fields: FieldMap<LoginField>,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            fields: FieldMap::new(&[LoginField::Identifier, LoginField::Password]),
        }
    }
}

impl LoginForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, field: LoginField) -> FormFieldState {
        self.fields.state(field)
    }

    pub fn change(&mut self, field: LoginField, value: &str) {
        self.fields.change(field, value);
    }

    pub fn blur(&mut self, field: LoginField) -> bool {
        let value = self.fields.value(field);
        let valid = match field {
            LoginField::Identifier => validate_login_identifier(value),
            LoginField::Password => validate_password(value),
        };
        self.fields.mark(field, valid);
        valid
    }

    /// The identifier message follows what was typed: email or username.
    pub fn error(&self, field: LoginField) -> Option<&'static str> {
        if !self.fields.is_showing_error(field) {
            return None;
        }
        Some(match field {
            LoginField::Identifier if self.fields.value(field).contains('@') => EMAIL_MESSAGE,
            LoginField::Identifier => USERNAME_MESSAGE,
            LoginField::Password => PASSWORD_MESSAGE,
        })
    }

    pub fn is_disabled(&self, loading: bool) -> bool {
        loading || !self.fields.all_valid()
    }

    pub fn credentials(&self) -> (&str, &str) {
        (
            self.fields.value(LoginField::Identifier),
            self.fields.value(LoginField::Password),
        )
    }
}

// ============================================================================
// Admin user create / edit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserField {
    Username,
    Name,
    Surname,
    Email,
    Password,
    Dpi,
    Phone,
    Direction,
    WorkName,
    Income,
}

impl UserField {
    pub const ALL: [UserField; 10] = [
        UserField::Username,
        UserField::Name,
        UserField::Surname,
        UserField::Email,
        UserField::Password,
        UserField::Dpi,
        UserField::Phone,
        UserField::Direction,
        UserField::WorkName,
        UserField::Income,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UserField::Username => "username",
            UserField::Name => "name",
            UserField::Surname => "surname",
            UserField::Email => "email",
            UserField::Password => "password",
            UserField::Dpi => "dpi",
            UserField::Phone => "phone",
            UserField::Direction => "direction",
            UserField::WorkName => "workName",
            UserField::Income => "income",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            UserField::Username => USERNAME_MESSAGE,
            UserField::Name => NAME_MESSAGE,
            UserField::Surname => SURNAME_MESSAGE,
            UserField::Email => EMAIL_MESSAGE,
            UserField::Password => PASSWORD_MESSAGE,
            UserField::Dpi => DPI_MESSAGE,
            UserField::Phone => PHONE_MESSAGE,
            UserField::Direction => DIRECTION_MESSAGE,
            UserField::WorkName => WORK_NAME_MESSAGE,
            UserField::Income => INCOME_MESSAGE,
        }
    }
}

/// Create a user, or edit one loaded from the users listing.
///
/// When editing, the DPI is locked, the password may be left blank to keep
/// the current one, and an administrator's role cannot be changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UserForm {
    fields: FieldMap<UserField>,
    role: Role,
    editing: Option<Role>,
}

impl Default for UserForm {
    fn default() -> Self {
        Self::create()
    }
}

impl UserForm {
    pub fn create() -> Self {
        Self {
            fields: FieldMap::new(&UserField::ALL),
            role: Role::Client,
            editing: None,
        }
    }

    pub fn edit(user: &User) -> Self {
        let mut fields = FieldMap::new(&UserField::ALL);
        let prefilled = [
            (UserField::Username, user.username.clone()),
            (UserField::Name, user.name.clone()),
            (UserField::Surname, user.surname.clone()),
            (UserField::Email, user.email.clone()),
            (UserField::Dpi, user.dpi.clone()),
            (UserField::Phone, user.phone.clone()),
            (UserField::Direction, user.direction.clone()),
            (UserField::WorkName, user.work_name.clone()),
            (UserField::Income, user.income.to_string()),
        ];
        for (field, value) in prefilled {
            fields.set(field, FormFieldState::valid(value));
        }
        fields.set(UserField::Password, FormFieldState::valid(""));
        Self {
            fields,
            role: user.role,
            editing: Some(user.role),
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn field(&self, field: UserField) -> FormFieldState {
        self.fields.state(field)
    }

    pub fn is_locked(&self, field: UserField) -> bool {
        field == UserField::Dpi && self.is_editing()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn role_locked(&self) -> bool {
        self.editing == Some(Role::Admin)
    }

    /// Returns `false` when the role cannot be changed.
    pub fn set_role(&mut self, role: Role) -> bool {
        if self.role_locked() {
            return false;
        }
        self.role = role;
        true
    }

    /// Returns `false` when the field is locked.
    pub fn change(&mut self, field: UserField, value: &str) -> bool {
        if self.is_locked(field) {
            return false;
        }
        self.fields.change(field, value);
        true
    }

    pub fn blur(&mut self, field: UserField) -> bool {
        let value = self.fields.value(field);
        let valid = match field {
            UserField::Username => validate_username(value),
            UserField::Name => validate_name(value),
            UserField::Surname => validate_surname(value),
            UserField::Email => validate_email(value),
            UserField::Password if self.is_editing() && value.is_empty() => true,
            UserField::Password => validate_password(value),
            UserField::Dpi => validate_dpi(value),
            UserField::Phone => validate_phone(value),
            UserField::Direction => validate_direction(value),
            UserField::WorkName => validate_work_name(value),
            UserField::Income => validate_income(value),
        };
        self.fields.mark(field, valid);
        valid
    }

    pub fn error(&self, field: UserField) -> Option<&'static str> {
        self.fields
            .is_showing_error(field)
            .then(|| field.message())
    }

    pub fn is_disabled(&self, loading: bool) -> bool {
        loading || !self.fields.all_valid()
    }

    /// Validate every field and build the payload. The DPI is only sent on
    /// create; a blank password on edit is omitted.
    pub fn payload(&mut self) -> Result<UserPayload, FieldErrors> {
        let errors: FieldErrors = UserField::ALL
            .into_iter()
            .filter(|field| !self.blur(*field))
            .map(|field| (field.name().to_string(), field.message().to_string()))
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }

        let v = |f| self.fields.value(f).trim().to_string();
        let password = self.fields.value(UserField::Password);
        Ok(UserPayload {
            dpi: (!self.is_editing()).then(|| v(UserField::Dpi)),
            username: v(UserField::Username),
            name: v(UserField::Name),
            surname: v(UserField::Surname),
            email: v(UserField::Email),
            phone: v(UserField::Phone),
            direction: v(UserField::Direction),
            work_name: v(UserField::WorkName),
            income: Decimal::from_str(self.fields.value(UserField::Income).trim()).ok(),
            role: Some(self.role),
            password: (!password.is_empty()).then(|| password.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_register(form: &mut RegisterForm) {
        let values = [
            (RegisterField::Name, "Ana"),
            (RegisterField::Surname, "García"),
            (RegisterField::Username, "anagarcia"),
            (RegisterField::Dpi, "2000000000001"),
            (RegisterField::Email, "ana@banco.gt"),
            (RegisterField::Income, "2500"),
            (RegisterField::Direction, "Zona 10, Guatemala"),
            (RegisterField::Phone, "55551234"),
            (RegisterField::Password, "Cliente1"),
            (RegisterField::PasswordConfirm, "Cliente1"),
        ];
        for (field, value) in values {
            form.change(field, value);
            form.blur(field);
        }
    }

    #[test]
    fn test_blur_sets_error_flags() {
        let mut form = RegisterForm::new();
        form.change(RegisterField::Username, "ana");
        assert!(form.error(RegisterField::Username).is_none());

        assert!(!form.blur(RegisterField::Username));
        let state = form.field(RegisterField::Username);
        assert!(!state.is_valid);
        assert!(state.show_error);
        assert_eq!(form.error(RegisterField::Username), Some(USERNAME_MESSAGE));

        form.change(RegisterField::Username, "anagarcia");
        assert!(form.blur(RegisterField::Username));
        assert!(form.error(RegisterField::Username).is_none());
    }

    #[test]
    fn test_register_enabled_only_when_all_valid() {
        let mut form = RegisterForm::new();
        assert!(form.is_disabled(false));
        fill_register(&mut form);
        assert!(!form.is_disabled(false));
        assert!(form.is_disabled(true));

        let request = form.request();
        assert_eq!(request.username, "anagarcia");
        assert_eq!(request.income, "2500");
    }

    #[test]
    fn test_editing_drops_validity_until_blur() {
        let mut form = RegisterForm::new();
        fill_register(&mut form);
        form.change(RegisterField::Phone, "123");
        assert!(form.is_disabled(false));
        assert!(!form.field(RegisterField::Phone).show_error);
    }

    #[test]
    fn test_password_change_invalidates_confirmation() {
        let mut form = RegisterForm::new();
        fill_register(&mut form);
        form.change(RegisterField::Password, "Cliente2");
        form.blur(RegisterField::Password);
        assert!(!form.field(RegisterField::PasswordConfirm).is_valid);
        assert!(!form.blur(RegisterField::PasswordConfirm));
        assert_eq!(
            form.error(RegisterField::PasswordConfirm),
            Some(PASSWORD_CONFIRM_MESSAGE)
        );
    }

    #[test]
    fn test_login_identifier_message_follows_input() {
        let mut form = LoginForm::new();
        form.change(LoginField::Identifier, "ana@");
        form.blur(LoginField::Identifier);
        assert_eq!(form.error(LoginField::Identifier), Some(EMAIL_MESSAGE));

        form.change(LoginField::Identifier, "ana");
        form.blur(LoginField::Identifier);
        assert_eq!(form.error(LoginField::Identifier), Some(USERNAME_MESSAGE));

        form.change(LoginField::Identifier, "2000000000001");
        form.change(LoginField::Password, "Cliente1");
        form.blur(LoginField::Identifier);
        form.blur(LoginField::Password);
        assert!(!form.is_disabled(false));
        assert_eq!(form.credentials(), ("2000000000001", "Cliente1"));
    }

    fn admin_user() -> User {
        User {
            dpi: "1000000000001".into(),
            username: "ADMINB".into(),
            name: "Admin".into(),
            surname: "Banco".into(),
            email: "admin@banco.gt".into(),
            phone: "22223333".into(),
            direction: "Zona 1, Guatemala".into(),
            work_name: "Banco".into(),
            income: Decimal::from(5000),
            role: Role::Admin,
            status: true,
        }
    }

    #[test]
    fn test_user_edit_locks_dpi_and_admin_role() {
        let mut form = UserForm::edit(&admin_user());
        assert!(!form.change(UserField::Dpi, "9999999999999"));
        assert!(!form.set_role(Role::Client));
        assert_eq!(form.role(), Role::Admin);

        let payload = form.payload().unwrap();
        assert!(payload.dpi.is_none());
        assert!(payload.password.is_none());
        assert_eq!(payload.income, Some(Decimal::from(5000)));
    }

    #[test]
    fn test_user_create_requires_password() {
        let mut form = UserForm::create();
        form.change(UserField::Username, "nuevo1");
        let errors = form.payload().unwrap_err();
        assert!(errors.contains_key("password"));
        assert!(errors.contains_key("dpi"));
        assert!(!errors.contains_key("username"));
        assert!(form.set_role(Role::Supervisor));
    }
}
