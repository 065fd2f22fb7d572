//! Write operations with loading flags and user feedback
//!
//! Each mutation marks itself loading for as long as its request is in
//! flight, reports the outcome through a [`Notifier`], and never fails with
//! an error: callers always get a [`MutationResult`].

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::api::{Ack, ApiError, BankApi, CreatedAccount};
use crate::models::{
    AddFavoriteRequest, CreateAccountRequest, LoginRequest, RegisterRequest, UserPayload,
};
use crate::session::{Session, SessionContext};
use crate::validation::Dpi;

pub const ACCOUNT_DELETED_MESSAGE: &str = "Cuenta eliminada exitosamente";
pub const FAVORITE_ADDED_MESSAGE: &str = "Cuenta favorita agregada con éxito";
pub const REGISTERED_MESSAGE: &str = "¡Registrado correctamente!";
pub const LOGGED_OUT_MESSAGE: &str = "Sesión cerrada";

/// Uniform outcome of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> MutationResult<T> {
    pub fn ok(data: T, message: Option<String>) -> Self {
        Self {
            success: true,
            message,
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Toast-style feedback sink.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Sends feedback to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        info!(target: "vbank::notice", "{}", message);
    }

    fn error(&self, message: &str) {
        warn!(target: "vbank::notice", "{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Keeps every notice, for tests and for the CLI to print.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *lock(&self.notices))
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        lock(&self.notices).push(Notice::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        lock(&self.notices).push(Notice::Error(message.to_string()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Mutations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateAccount,
    DeleteAccount,
    AddFavorite,
    Register,
    Login,
    Logout,
    CreateUser,
    UpdateUser,
    DeleteUser,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CreateAccount => "create_account",
            MutationKind::DeleteAccount => "delete_account",
            MutationKind::AddFavorite => "add_favorite",
            MutationKind::Register => "register",
            MutationKind::Login => "login",
            MutationKind::Logout => "logout",
            MutationKind::CreateUser => "create_user",
            MutationKind::UpdateUser => "update_user",
            MutationKind::DeleteUser => "delete_user",
        }
    }

    /// User administration reports failures inline instead of as toasts.
    fn toasts_errors(&self) -> bool {
        !matches!(
            self,
            MutationKind::CreateUser | MutationKind::UpdateUser | MutationKind::DeleteUser
        )
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clears the loading flag when the request finishes or is dropped.
struct LoadingGuard {
    kind: MutationKind,
    loading: Arc<Mutex<HashSet<MutationKind>>>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        lock(&self.loading).remove(&self.kind);
    }
}

#[derive(Clone)]
pub struct Mutations {
    api: Arc<dyn BankApi>,
    session: SessionContext,
    notifier: Arc<dyn Notifier>,
    loading: Arc<Mutex<HashSet<MutationKind>>>,
}

impl Mutations {
    pub fn new(api: Arc<dyn BankApi>, session: SessionContext, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            session,
            notifier,
            loading: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_loading(&self, kind: MutationKind) -> bool {
        lock(&self.loading).contains(&kind)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn begin(&self, kind: MutationKind) -> LoadingGuard {
        lock(&self.loading).insert(kind);
        LoadingGuard {
            kind,
            loading: self.loading.clone(),
        }
    }

    /// Run one request under the loading flag and turn its result into a
    /// [`MutationResult`]. `success_message` picks the toast for a success;
    /// `None` means the success is silent.
    async fn run<T, Fut>(
        &self,
        kind: MutationKind,
        request: Fut,
        success_message: impl FnOnce(&T) -> Option<String>,
    ) -> MutationResult<T>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _guard = self.begin(kind);
        info!(mutation = %kind, "Mutation started");
        match request.await {
            Ok(data) => {
                let message = success_message(&data);
                if let Some(message) = &message {
                    self.notifier.success(message);
                }
                info!(mutation = %kind, "Mutation succeeded");
                MutationResult::ok(data, message)
            }
            Err(e) => {
                warn!(mutation = %kind, code = e.code(), error = %e, "Mutation failed");
                if kind.toasts_errors() {
                    self.notifier.error(&e.message);
                }
                MutationResult::failed(e.message)
            }
        }
    }

    pub async fn create_account(&self, request: &CreateAccountRequest) -> MutationResult<CreatedAccount> {
        self.run(MutationKind::CreateAccount, self.api.create_account(request), |_| None)
            .await
    }

    pub async fn delete_account(&self, id: &str) -> MutationResult<Ack> {
        self.run(MutationKind::DeleteAccount, self.api.delete_account(id), |ack: &Ack| {
            Some(ack.message_or(ACCOUNT_DELETED_MESSAGE))
        })
        .await
    }

    pub async fn add_favorite(&self, request: &AddFavoriteRequest) -> MutationResult<Ack> {
        self.run(MutationKind::AddFavorite, self.api.add_favorite(request), |ack: &Ack| {
            Some(ack.message_or(FAVORITE_ADDED_MESSAGE))
        })
        .await
    }

    pub async fn register(&self, request: &RegisterRequest) -> MutationResult<Ack> {
        self.run(MutationKind::Register, self.api.register(request), |ack: &Ack| {
            Some(ack.message_or(REGISTERED_MESSAGE))
        })
        .await
    }

    /// Log in and store the returned session.
    pub async fn login(&self, identifier: &str, password: &str) -> MutationResult<Session> {
        let request = LoginRequest::new(identifier, password);
        let result = self
            .run(MutationKind::Login, self.api.login(&request), |_| None)
            .await;
        if let Some(session) = &result.data
            && let Err(e) = self.session.set(session)
        {
            warn!(code = e.code(), error = %e, "Could not store session");
            self.notifier.error(&e.to_string());
            return MutationResult::failed(e.to_string());
        }
        result
    }

    pub fn logout(&self) -> MutationResult<()> {
        let _guard = self.begin(MutationKind::Logout);
        match self.session.clear() {
            Ok(()) => MutationResult::ok((), Some(LOGGED_OUT_MESSAGE.to_string())),
            Err(e) => {
                self.notifier.error(&e.to_string());
                MutationResult::failed(e.to_string())
            }
        }
    }

    pub async fn create_user(&self, payload: &UserPayload) -> MutationResult<Ack> {
        self.run(MutationKind::CreateUser, self.api.create_user(payload), |_| None)
            .await
    }

    pub async fn update_user(&self, dpi: &Dpi, payload: &UserPayload) -> MutationResult<Ack> {
        self.run(
            MutationKind::UpdateUser,
            self.api.update_user(dpi.as_str(), payload),
            |_| None,
        )
        .await
    }

    pub async fn delete_user(&self, dpi: &Dpi) -> MutationResult<Ack> {
        self.run(MutationKind::DeleteUser, self.api.delete_user(dpi.as_str()), |_| None)
            .await
    }
}
