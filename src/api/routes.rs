//! REST endpoint table
//!
//! Paths are relative to the configured base URL (`.../virtualBank/v1`).
//! `:param` segments are filled from the single path argument.

use reqwest::Method;
use std::fmt;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/virtualBank/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Register,
    VerifyEmail,
    Login,
    CreateAccount,
    MyAccounts,
    CreateTransaction,
    CreateDeposit,
    DeleteAccount,
    DepositHistory,
    Favorites,
    AddFavorite,
    Users,
    DeleteUser,
    CreateUser,
    UpdateUser,
    MostActiveAccounts,
    AccountDetails,
    ReverseDeposit,
}

impl Endpoint {
    pub const ALL: [Endpoint; 18] = [
        Endpoint::Register,
        Endpoint::VerifyEmail,
        Endpoint::Login,
        Endpoint::CreateAccount,
        Endpoint::MyAccounts,
        Endpoint::CreateTransaction,
        Endpoint::CreateDeposit,
        Endpoint::DeleteAccount,
        Endpoint::DepositHistory,
        Endpoint::Favorites,
        Endpoint::AddFavorite,
        Endpoint::Users,
        Endpoint::DeleteUser,
        Endpoint::CreateUser,
        Endpoint::UpdateUser,
        Endpoint::MostActiveAccounts,
        Endpoint::AccountDetails,
        Endpoint::ReverseDeposit,
    ];

    pub fn method(&self) -> Method {
        match self {
            Endpoint::VerifyEmail
            | Endpoint::MyAccounts
            | Endpoint::Favorites
            | Endpoint::Users
            | Endpoint::MostActiveAccounts
            | Endpoint::AccountDetails => Method::GET,
            Endpoint::Register
            | Endpoint::Login
            | Endpoint::CreateAccount
            | Endpoint::CreateTransaction
            | Endpoint::CreateDeposit
            | Endpoint::DepositHistory
            | Endpoint::CreateUser
            | Endpoint::ReverseDeposit => Method::POST,
            Endpoint::AddFavorite | Endpoint::UpdateUser => Method::PUT,
            Endpoint::DeleteAccount | Endpoint::DeleteUser => Method::DELETE,
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            Endpoint::Register => "/auth/register",
            Endpoint::VerifyEmail => "/auth/verify/:code",
            Endpoint::Login => "/auth/login",
            Endpoint::CreateAccount => "/account/createAccount",
            Endpoint::MyAccounts => "/account/getMyAccounts",
            Endpoint::CreateTransaction => "/account/createTransaction",
            Endpoint::CreateDeposit => "/account/createDeposit",
            Endpoint::DeleteAccount => "/account/deleteAccount/:id",
            Endpoint::DepositHistory => "/account/getDepositHistory",
            Endpoint::Favorites => "/account/getFavorites",
            Endpoint::AddFavorite => "/account/addFavorite",
            Endpoint::Users => "/user/users",
            Endpoint::DeleteUser => "/user/delete/:dpi",
            Endpoint::CreateUser => "/user/createUser",
            Endpoint::UpdateUser => "/user/update/:dpi",
            Endpoint::MostActiveAccounts => "/account/admin/mostActiveAccounts",
            Endpoint::AccountDetails => "/account/admin/accountDetails/:id",
            Endpoint::ReverseDeposit => "/account/admin/reverseDeposit",
        }
    }

    /// Path segments with the `:param` placeholder replaced.
    ///
    /// Segments are returned unencoded; the caller pushes them through
    /// `Url::path_segments_mut`, which percent-encodes each one.
    pub fn segments<'a>(&self, param: Option<&'a str>) -> Vec<&'a str> {
        self.template()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| if s.starts_with(':') { param.unwrap_or("") } else { s })
            .collect()
    }

    pub fn has_param(&self) -> bool {
        self.template().contains("/:")
    }

    /// Message shown when a failure carries no text of its own.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Endpoint::Register => "Error al registrar la cuenta",
            Endpoint::VerifyEmail => "El código ingresado es inválido o ha expirado.",
            Endpoint::Login => "Error al iniciar sesión",
            Endpoint::CreateAccount => "Error al crear la cuenta.",
            Endpoint::MyAccounts => "Error al obtener tus cuentas.",
            Endpoint::CreateTransaction => {
                "La transacción no se pudo completar (respuesta lógica del servidor)."
            }
            Endpoint::CreateDeposit => "Error al enviar el depósito.",
            Endpoint::DeleteAccount => "Error al eliminar la cuenta",
            Endpoint::DepositHistory => "Error al obtener el historial.",
            Endpoint::Favorites => "Error al obtener tus cuentas favoritas.",
            Endpoint::AddFavorite => "Error al agregar la cuenta favorita.",
            Endpoint::Users => "Error al cargar usuarios.",
            Endpoint::DeleteUser => "Error desconocido al eliminar el usuario.",
            Endpoint::CreateUser => "Error desconocido al crear usuario.",
            Endpoint::UpdateUser => "Error desconocido al actualizar usuario.",
            Endpoint::MostActiveAccounts => "Error al obtener cuentas más activas.",
            Endpoint::AccountDetails => "Error al obtener detalles de la cuenta.",
            Endpoint::ReverseDeposit => "Error al revertir el depósito.",
        }
    }

    /// Money-moving operations only succeed on an explicit `success: true`.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            Endpoint::CreateTransaction | Endpoint::CreateDeposit | Endpoint::ReverseDeposit
        )
    }

    /// Shown when a 2xx body carries no success flag and no message.
    pub fn unexpected_message(&self) -> &'static str {
        match self {
            Endpoint::CreateDeposit => "Respuesta inesperada al enviar el depósito.",
            Endpoint::ReverseDeposit => "Respuesta inesperada al revertir el depósito.",
            _ => "Respuesta inesperada del servidor.",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Register => "register",
            Endpoint::VerifyEmail => "verify_email",
            Endpoint::Login => "login",
            Endpoint::CreateAccount => "create_account",
            Endpoint::MyAccounts => "my_accounts",
            Endpoint::CreateTransaction => "create_transfer",
            Endpoint::CreateDeposit => "create_deposit",
            Endpoint::DeleteAccount => "delete_account",
            Endpoint::DepositHistory => "history",
            Endpoint::Favorites => "favorites",
            Endpoint::AddFavorite => "add_favorite",
            Endpoint::Users => "users",
            Endpoint::DeleteUser => "delete_user",
            Endpoint::CreateUser => "create_user",
            Endpoint::UpdateUser => "update_user",
            Endpoint::MostActiveAccounts => "most_active_accounts",
            Endpoint::AccountDetails => "account_details",
            Endpoint::ReverseDeposit => "reverse_deposit",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.template())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_fill_param() {
        assert_eq!(
            Endpoint::UpdateUser.segments(Some("1234567890123")),
            vec!["user", "update", "1234567890123"]
        );
        assert_eq!(
            Endpoint::MyAccounts.segments(None),
            vec!["account", "getMyAccounts"]
        );
    }

    #[test]
    fn test_param_endpoints() {
        let with_param: Vec<_> = Endpoint::ALL.iter().filter(|e| e.has_param()).collect();
        assert_eq!(
            with_param,
            vec![
                &Endpoint::VerifyEmail,
                &Endpoint::DeleteAccount,
                &Endpoint::DeleteUser,
                &Endpoint::UpdateUser,
                &Endpoint::AccountDetails,
            ]
        );
    }

    #[test]
    fn test_confirmation_endpoints() {
        let confirmed: Vec<_> = Endpoint::ALL
            .iter()
            .filter(|e| e.requires_confirmation())
            .collect();
        assert_eq!(
            confirmed,
            vec![
                &Endpoint::CreateTransaction,
                &Endpoint::CreateDeposit,
                &Endpoint::ReverseDeposit,
            ]
        );
        assert_eq!(
            Endpoint::CreateTransaction.unexpected_message(),
            "Respuesta inesperada del servidor."
        );
    }

    #[test]
    fn test_methods() {
        assert_eq!(Endpoint::AddFavorite.method(), Method::PUT);
        assert_eq!(Endpoint::DepositHistory.method(), Method::POST);
        assert_eq!(Endpoint::DeleteUser.method(), Method::DELETE);
        assert_eq!(
            Endpoint::ReverseDeposit.to_string(),
            "POST /account/admin/reverseDeposit"
        );
    }
}
