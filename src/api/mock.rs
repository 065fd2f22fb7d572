//! In-memory bank behind the [`BankApi`] seam
//!
//! Enough of the backend's behavior to drive every client flow without a
//! server: users with passwords and pending verification codes, accounts,
//! a transaction log, favorites, cross-currency transfers and a deposit
//! reversal window. The caller is identified the same way the real API does
//! it, from the bearer token in the [`SessionContext`].
//!
//! Test hooks: per-endpoint call counters, one-shot failure injection and a
//! configurable latency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::BankApi;
use super::error::ApiError;
use super::routes::Endpoint;
use super::types::{Ack, CreatedAccount, DepositReceipt, ReversalReceipt, TransferReceipt};
use crate::core_types::{AccountNo, AccountType, RecordId, Role, TransactionType};
use crate::models::{
    Account, AccountDetails, AccountOwner, AddFavoriteRequest, CreateAccountRequest,
    DepositRequest, LoginRequest, MostActiveAccount, RegisterRequest, ReverseDepositRequest,
    Transaction, TransferRequest, User, UserPage, UserPayload,
};
use crate::money::validate_currency;
use crate::session::{Session, SessionContext};
use crate::validation::validate_dpi;

/// Tokens handed out by [`MockBankApi::login`] are this prefix plus the DPI.
pub const TOKEN_PREFIX: &str = "mock-token-";

/// Deposits older than this can no longer be reversed.
pub const REVERSAL_WINDOW_SECS: i64 = 60;

/// Rows in the most-active report.
pub const MOST_ACTIVE_LIMIT: usize = 5;

/// Units of GTQ per unit of `currency`.
fn gtq_rate(currency: &str) -> Decimal {
    match currency {
        "USD" => Decimal::new(771, 2),
        "EUR" => Decimal::new(840, 2),
        "GBP" => Decimal::new(980, 2),
        "MXN" => Decimal::new(45, 2),
        "JPY" => Decimal::new(52, 3),
        "ARS" => Decimal::new(85, 4),
        "COP" => Decimal::new(19, 4),
        _ => Decimal::ONE,
    }
}

fn convert(amount: Decimal, from: &str, to: &str) -> Decimal {
    (amount * gtq_rate(from) / gtq_rate(to)).round_dp(2)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn http_error(status: u16, message: &str) -> ApiError {
    ApiError::http(status, Some(&json!({ "message": message })), message)
}

/// 200 with `success: false`, the way the backend declines a transfer.
fn declined(message: &str) -> ApiError {
    ApiError::rejected(&json!({ "success": false, "message": message }), message)
}

fn unauthorized() -> ApiError {
    http_error(401, "No autorizado")
}

fn forbidden() -> ApiError {
    http_error(403, "No tienes permisos para realizar esta acción")
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct MockUser {
    user: User,
    password: String,
    verified: bool,
}

#[derive(Debug, Clone)]
struct MockAccount {
    account: Account,
    owner_dpi: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MockTransaction {
    tx: Transaction,
    reversed: bool,
}

impl MockTransaction {
    fn touches(&self, account_no: &str) -> bool {
        self.tx.from_account.as_deref() == Some(account_no)
            || self.tx.to_account.as_deref() == Some(account_no)
    }
}

#[derive(Debug, Default)]
struct MockState {
    users: Vec<MockUser>,
    accounts: Vec<MockAccount>,
    transactions: Vec<MockTransaction>,
    /// Owner account number -> bookmarked account ids.
    favorites: HashMap<AccountNo, Vec<RecordId>>,
    /// Verification code -> DPI.
    pending_codes: HashMap<String, String>,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, dpi: &str) -> Option<&MockUser> {
        self.users.iter().find(|u| u.user.dpi == dpi)
    }

    fn user_mut(&mut self, dpi: &str) -> Option<&mut MockUser> {
        self.users.iter_mut().find(|u| u.user.dpi == dpi)
    }

    fn account(&self, no: &str) -> Option<&MockAccount> {
        self.accounts.iter().find(|a| a.account.no_account == no)
    }

    fn account_mut(&mut self, no: &str) -> Option<&mut MockAccount> {
        self.accounts.iter_mut().find(|a| a.account.no_account == no)
    }

    /// Lookup by record id, falling back to the account number.
    fn account_by_key(&self, key: &str) -> Option<&MockAccount> {
        self.accounts
            .iter()
            .find(|a| a.account.id == key)
            .or_else(|| self.account(key))
    }

    fn next_account_no(&mut self) -> AccountNo {
        let highest = self
            .accounts
            .iter()
            .filter_map(|a| a.account.no_account.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("{:03}", highest + 1)
    }

    fn record(&mut self, tx_type: TransactionType, from: Option<&str>, to: Option<&str>, amount: Decimal, currency: &str) -> RecordId {
        let id = format!("tx-{}", self.next_id());
        self.transactions.push(MockTransaction {
            tx: Transaction {
                id: id.clone(),
                tx_type,
                from_account: from.map(str::to_string),
                to_account: to.map(str::to_string),
                amount,
                currency: currency.to_string(),
                created_at: Some(Utc::now()),
            },
            reversed: false,
        });
        id
    }

    /// Movements touching `account_no`, newest first.
    fn movements(&self, account_no: &str) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| !t.reversed && t.touches(account_no))
            .map(|t| t.tx.clone())
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        txs
    }
}

// ============================================================================
// MockBankApi
// ============================================================================

pub struct MockBankApi {
    state: Mutex<MockState>,
    session: SessionContext,
    calls: Mutex<HashMap<Endpoint, usize>>,
    failures: Mutex<HashMap<Endpoint, VecDeque<ApiError>>>,
    latency: Mutex<Duration>,
}

impl Default for MockBankApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBankApi {
    /// Empty bank with its own in-memory session.
    pub fn new() -> Self {
        Self::with_session(SessionContext::in_memory())
    }

    /// Empty bank that identifies callers from `session`.
    pub fn with_session(session: SessionContext) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            session,
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Bank seeded with a few users and accounts.
    ///
    /// | user | password | role | accounts |
    /// |---|---|---|---|
    /// | `ADMINB` | `ADMINB` | admin | |
    /// | `supervisor1` | `Super1` | supervisor | |
    /// | `anagarcia` | `Cliente1` | client | 001 (Q100), 002 (Q500), 003 (US$250) |
    /// | `luisperez` | `Cliente1` | client | 004 (Q1,000) |
    pub fn demo(session: SessionContext) -> Self {
        let bank = Self::with_session(session);
        bank.add_user(demo_user("1000000000001", "ADMINB", "Admin", "Banco", Role::Admin), "ADMINB");
        bank.add_user(demo_user("1000000000002", "supervisor1", "Sofía", "Méndez", Role::Supervisor), "Super1");
        bank.add_user(demo_user("2000000000001", "anagarcia", "Ana", "García", Role::Client), "Cliente1");
        bank.add_user(demo_user("2000000000002", "luisperez", "Luis", "Pérez", Role::Client), "Cliente1");
        bank.add_account("2000000000001", "001", "GTQ", Decimal::from(100));
        bank.add_account("2000000000001", "002", "GTQ", Decimal::from(500));
        bank.add_account("2000000000001", "003", "USD", Decimal::from(250));
        bank.add_account("2000000000002", "004", "GTQ", Decimal::from(1000));
        bank
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // --- seeding ---

    /// Add a verified, active user.
    pub fn add_user(&self, user: User, password: &str) {
        lock(&self.state).users.push(MockUser {
            user,
            password: password.to_string(),
            verified: true,
        });
    }

    pub fn add_account(&self, owner_dpi: &str, no_account: &str, currency: &str, amount: Decimal) -> Account {
        let mut state = lock(&self.state);
        let account = Account {
            id: format!("acc-{}", state.next_id()),
            no_account: no_account.to_string(),
            account_type: AccountType::Savings,
            currency: currency.to_string(),
            amount,
            favorites: None,
        };
        state.accounts.push(MockAccount {
            account: account.clone(),
            owner_dpi: owner_dpi.to_string(),
            created_at: Utc::now(),
        });
        account
    }

    /// Store a session for `dpi` as if they had logged in.
    pub fn act_as(&self, dpi: &str) -> Option<Session> {
        let session = {
            let state = lock(&self.state);
            state.user(dpi).map(|u| session_for(&u.user))?
        };
        if let Err(e) = self.session.set(&session) {
            warn!(error = %e, "Mock could not store session");
        }
        Some(session)
    }

    // --- inspection ---

    pub fn balance(&self, no_account: &str) -> Option<Decimal> {
        lock(&self.state).account(no_account).map(|a| a.account.amount)
    }

    /// Code e-mailed to `username` at registration, if still pending.
    pub fn pending_code(&self, username: &str) -> Option<String> {
        let state = lock(&self.state);
        let dpi = &state.users.iter().find(|u| u.user.username == username)?.user.dpi;
        state
            .pending_codes
            .iter()
            .find(|(_, owner)| *owner == dpi)
            .map(|(code, _)| code.clone())
    }

    pub fn last_transaction_id(&self) -> Option<RecordId> {
        lock(&self.state).transactions.last().map(|t| t.tx.id.clone())
    }

    /// Move a transaction's timestamp into the past.
    pub fn backdate_transaction(&self, id: &str, secs: i64) {
        let mut state = lock(&self.state);
        if let Some(t) = state.transactions.iter_mut().find(|t| t.tx.id == id)
            && let Some(created_at) = t.tx.created_at.as_mut()
        {
            *created_at -= chrono::Duration::seconds(secs);
        }
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        lock(&self.calls).get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    // --- behavior ---

    /// Fail the next call to `endpoint` with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        lock(&self.failures).entry(endpoint).or_default().push_back(error);
    }

    /// Delay every call by `latency` before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    async fn enter(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        *lock(&self.calls).entry(endpoint).or_default() += 1;
        debug!(op = endpoint.name(), "mock call");

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected = lock(&self.failures)
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        if let Some(err) = injected {
            warn!(op = endpoint.name(), code = err.code(), "Injected failure");
            return Err(err);
        }
        Ok(())
    }

    fn actor(&self, state: &MockState) -> Result<User, ApiError> {
        let token = self.session.token().ok_or_else(unauthorized)?;
        let dpi = token.strip_prefix(TOKEN_PREFIX).ok_or_else(unauthorized)?;
        state
            .user(dpi)
            .filter(|u| u.user.status)
            .map(|u| u.user.clone())
            .ok_or_else(unauthorized)
    }

    fn staff(&self, state: &MockState) -> Result<User, ApiError> {
        let user = self.actor(state)?;
        if user.role.is_staff() {
            Ok(user)
        } else {
            Err(forbidden())
        }
    }

    /// The caller owns `no_account` or is staff.
    fn check_access(&self, state: &MockState, actor: &User, no_account: &str) -> Result<(), ApiError> {
        let account = state
            .account(no_account)
            .ok_or_else(|| http_error(404, "Cuenta no encontrada"))?;
        if actor.role.is_staff() || account.owner_dpi == actor.dpi {
            Ok(())
        } else {
            Err(forbidden())
        }
    }
}

fn demo_user(dpi: &str, username: &str, name: &str, surname: &str, role: Role) -> User {
    User {
        dpi: dpi.to_string(),
        username: username.to_string(),
        name: name.to_string(),
        surname: surname.to_string(),
        email: format!("{}@bancavirtual.gt", username.to_lowercase()),
        phone: "55550000".to_string(),
        direction: "Zona 10, Ciudad de Guatemala".to_string(),
        work_name: "Banca Virtual".to_string(),
        income: Decimal::from(5000),
        role,
        status: true,
    }
}

fn session_for(user: &User) -> Session {
    Session::new(format!("{}{}", TOKEN_PREFIX, user.dpi), user.role)
        .with_profile("username", user.username.clone())
        .with_profile("email", user.email.clone())
        .with_profile("name", user.name.clone())
        .with_profile("dpi", user.dpi.clone())
}

fn ack(message: &str) -> Ack {
    Ack {
        message: Some(message.to_string()),
    }
}

#[async_trait]
impl BankApi for MockBankApi {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Ack, ApiError> {
        self.enter(Endpoint::Register).await?;
        let mut state = lock(&self.state);

        if state.users.iter().any(|u| u.user.username == request.username) {
            return Err(http_error(400, "El nombre de usuario ya está en uso"));
        }
        if state.users.iter().any(|u| u.user.dpi == request.dpi) {
            return Err(http_error(400, "El DPI ya está registrado"));
        }
        if state.users.iter().any(|u| u.user.email == request.email) {
            return Err(http_error(400, "El correo ya está registrado"));
        }

        state.users.push(MockUser {
            user: User {
                dpi: request.dpi.clone(),
                username: request.username.clone(),
                name: request.name.clone(),
                surname: request.surname.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                direction: request.direction.clone(),
                work_name: String::new(),
                income: request.income.trim().parse().unwrap_or_default(),
                role: Role::Client,
                status: true,
            },
            password: request.password.clone(),
            verified: false,
        });
        let n = state.next_id();
        let code = format!("{:06}", 100_000 + (n * 7919) % 900_000);
        state.pending_codes.insert(code, request.dpi.clone());
        info!(username = %request.username, "Mock user registered");
        Ok(ack("¡Registrado correctamente! Revisa tu correo para verificar tu cuenta."))
    }

    async fn verify_email(&self, code: &str) -> Result<Ack, ApiError> {
        self.enter(Endpoint::VerifyEmail).await?;
        let mut state = lock(&self.state);
        let dpi = state
            .pending_codes
            .remove(code.trim())
            .ok_or_else(|| http_error(400, "El código ingresado es inválido o ha expirado."))?;
        if let Some(user) = state.user_mut(&dpi) {
            user.verified = true;
        }
        Ok(ack("Correo verificado exitosamente."))
    }

    async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        self.enter(Endpoint::Login).await?;
        let state = lock(&self.state);
        let (found, password) = match request {
            LoginRequest::Dpi { dpi, password } => (state.user(dpi), password),
            LoginRequest::Username { username, password } => (
                state.users.iter().find(|u| u.user.username == *username),
                password,
            ),
        };
        let user = found
            .filter(|u| u.user.status && u.password == *password)
            .ok_or_else(|| http_error(400, "Credenciales inválidas"))?;
        if !user.verified {
            return Err(http_error(403, "Por favor verifica tu correo electrónico antes de iniciar sesión."));
        }
        Ok(session_for(&user.user))
    }

    async fn create_account(&self, request: &CreateAccountRequest) -> Result<CreatedAccount, ApiError> {
        self.enter(Endpoint::CreateAccount).await?;
        let mut state = lock(&self.state);
        self.staff(&state)?;

        let owner = match (&request.target_username, &request.target_dpi) {
            (_, Some(dpi)) => state.user(dpi),
            (Some(username), None) => state.users.iter().find(|u| u.user.username == *username),
            (None, None) => return Err(http_error(400, "Debes indicar el usuario o DPI del titular")),
        }
        .map(|u| u.user.dpi.clone())
        .ok_or_else(|| http_error(404, "Usuario no encontrado"))?;

        let currency = validate_currency(&request.currency).map_err(|e| http_error(400, &e.to_string()))?;
        if request.amount < Decimal::ZERO {
            return Err(http_error(400, "El monto inicial no puede ser negativo"));
        }

        let no_account = state.next_account_no();
        let account = Account {
            id: format!("acc-{}", state.next_id()),
            no_account,
            account_type: request.account_type,
            currency: currency.to_string(),
            amount: request.amount,
            favorites: None,
        };
        state.accounts.push(MockAccount {
            account: account.clone(),
            owner_dpi: owner,
            created_at: Utc::now(),
        });
        Ok(CreatedAccount {
            message: Some("Cuenta creada exitosamente".to_string()),
            account,
        })
    }

    async fn my_accounts(&self) -> Result<Vec<Account>, ApiError> {
        self.enter(Endpoint::MyAccounts).await?;
        let state = lock(&self.state);
        let actor = self.actor(&state)?;
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.owner_dpi == actor.dpi)
            .map(|a| a.account.clone())
            .collect())
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ApiError> {
        self.enter(Endpoint::CreateTransaction).await?;
        let mut state = lock(&self.state);
        let actor = self.actor(&state)?;

        let source = state
            .account(&request.from_account)
            .ok_or_else(|| http_error(404, "Cuenta de origen no encontrada"))?;
        if source.owner_dpi != actor.dpi {
            return Err(http_error(403, "La cuenta de origen no te pertenece"));
        }
        let from_currency = source.account.currency.clone();
        let balance = source.account.amount;
        let to_currency = state
            .account(&request.to_account)
            .map(|a| a.account.currency.clone())
            .ok_or_else(|| http_error(404, "Cuenta de destino no encontrada"))?;

        if request.from_account == request.to_account {
            return Err(http_error(400, "No puedes transferir dinero a la misma cuenta."));
        }
        if request.amount <= Decimal::ZERO {
            return Err(http_error(400, "El monto debe ser mayor a cero"));
        }
        if request.amount > balance {
            return Err(declined("Fondos insuficientes"));
        }

        let credited = convert(request.amount, &from_currency, &to_currency);
        if let Some(source) = state.account_mut(&request.from_account) {
            source.account.amount -= request.amount;
        }
        if let Some(dest) = state.account_mut(&request.to_account) {
            dest.account.amount += credited;
        }
        state.record(
            TransactionType::Transfer,
            Some(&request.from_account),
            Some(&request.to_account),
            request.amount,
            &from_currency,
        );
        info!(from = %request.from_account, to = %request.to_account, amount = %request.amount, "Mock transfer");

        let converted = from_currency != to_currency;
        Ok(TransferReceipt {
            message: Some("¡Transferencia Exitosa!".to_string()),
            amount: request.amount,
            from: request.from_account.clone(),
            to: request.to_account.clone(),
            converted_amount: converted.then_some(credited),
            converted_to: converted.then_some(to_currency),
        })
    }

    async fn create_deposit(&self, request: &DepositRequest) -> Result<DepositReceipt, ApiError> {
        self.enter(Endpoint::CreateDeposit).await?;
        let mut state = lock(&self.state);
        let actor = self.actor(&state)?;
        self.check_access(&state, &actor, &request.account)?;
        if request.amount <= Decimal::ZERO {
            return Err(http_error(400, "El monto debe ser mayor a cero"));
        }

        let currency = match state.account_mut(&request.account) {
            Some(account) => {
                account.account.amount += request.amount;
                account.account.currency.clone()
            }
            None => return Err(http_error(404, "Cuenta no encontrada")),
        };
        state.record(TransactionType::Deposit, None, Some(&request.account), request.amount, &currency);
        Ok(DepositReceipt {
            message: Some("Deposito enviado con exito".to_string()),
            account: request.account.clone(),
            amount: request.amount,
        })
    }

    async fn delete_account(&self, account_id: &str) -> Result<Ack, ApiError> {
        self.enter(Endpoint::DeleteAccount).await?;
        let mut state = lock(&self.state);
        let actor = self.actor(&state)?;
        let no_account = state
            .account_by_key(account_id)
            .map(|a| a.account.no_account.clone())
            .ok_or_else(|| http_error(404, "Cuenta no encontrada"))?;
        self.check_access(&state, &actor, &no_account)?;

        state.accounts.retain(|a| a.account.no_account != no_account);
        state.favorites.remove(&no_account);
        Ok(ack("Cuenta eliminada exitosamente"))
    }

    async fn history(&self, account_no: &str) -> Result<Vec<Transaction>, ApiError> {
        self.enter(Endpoint::DepositHistory).await?;
        let state = lock(&self.state);
        let actor = self.actor(&state)?;
        self.check_access(&state, &actor, account_no)?;
        Ok(state.movements(account_no))
    }

    async fn favorites(&self) -> Result<Vec<Account>, ApiError> {
        self.enter(Endpoint::Favorites).await?;
        let state = lock(&self.state);
        let actor = self.actor(&state)?;

        let mut favorites = Vec::new();
        for owned in state.accounts.iter().filter(|a| a.owner_dpi == actor.dpi) {
            let owner_no = &owned.account.no_account;
            for id in state.favorites.get(owner_no).into_iter().flatten() {
                if let Some(fav) = state.account_by_key(id) {
                    let mut account = fav.account.clone();
                    account.favorites = Some(json!({ "owner": owner_no }));
                    favorites.push(account);
                }
            }
        }
        Ok(favorites)
    }

    async fn add_favorite(&self, request: &AddFavoriteRequest) -> Result<Ack, ApiError> {
        self.enter(Endpoint::AddFavorite).await?;
        let mut state = lock(&self.state);
        let actor = self.actor(&state)?;

        let mine = state
            .account(&request.my_account_no)
            .ok_or_else(|| http_error(404, "Cuenta no encontrada"))?;
        if mine.owner_dpi != actor.dpi {
            return Err(forbidden());
        }
        let favorite_id = state
            .account_by_key(&request.favorite_account_id)
            .map(|a| a.account.id.clone())
            .ok_or_else(|| http_error(404, "Cuenta favorita no encontrada"))?;

        let list = state.favorites.entry(request.my_account_no.clone()).or_default();
        if list.contains(&favorite_id) {
            return Err(http_error(400, "La cuenta ya está en tus favoritos"));
        }
        list.push(favorite_id);
        Ok(ack("Cuenta favorita agregada con éxito"))
    }

    async fn users(&self) -> Result<UserPage, ApiError> {
        self.enter(Endpoint::Users).await?;
        let state = lock(&self.state);
        self.staff(&state)?;
        let users: Vec<User> = state.users.iter().map(|u| u.user.clone()).collect();
        let total = users.len() as u64;
        Ok(UserPage { users, total })
    }

    async fn delete_user(&self, dpi: &str) -> Result<Ack, ApiError> {
        self.enter(Endpoint::DeleteUser).await?;
        let mut state = lock(&self.state);
        let actor = self.staff(&state)?;
        if actor.dpi == dpi {
            return Err(http_error(400, "No puedes eliminar tu propio usuario"));
        }
        if state.user(dpi).is_none() {
            return Err(http_error(404, "Usuario no encontrado"));
        }
        state.users.retain(|u| u.user.dpi != dpi);
        state.accounts.retain(|a| a.owner_dpi != dpi);
        Ok(ack("Usuario eliminado exitosamente"))
    }

    async fn create_user(&self, payload: &UserPayload) -> Result<Ack, ApiError> {
        self.enter(Endpoint::CreateUser).await?;
        let mut state = lock(&self.state);
        self.staff(&state)?;

        let dpi = payload
            .dpi
            .as_deref()
            .map(str::trim)
            .filter(|d| validate_dpi(d))
            .ok_or_else(|| http_error(400, "DPI inválido"))?
            .to_string();
        if state.user(&dpi).is_some() {
            return Err(http_error(400, "El DPI ya está registrado"));
        }
        if state.users.iter().any(|u| u.user.username == payload.username) {
            return Err(http_error(400, "El nombre de usuario ya está en uso"));
        }
        let password = payload
            .password
            .as_deref()
            .and_then(non_empty)
            .ok_or_else(|| http_error(400, "La contraseña es obligatoria"))?;

        state.users.push(MockUser {
            user: User {
                dpi,
                username: payload.username.clone(),
                name: payload.name.clone(),
                surname: payload.surname.clone(),
                email: payload.email.clone(),
                phone: payload.phone.clone(),
                direction: payload.direction.clone(),
                work_name: payload.work_name.clone(),
                income: payload.income.unwrap_or_default(),
                role: payload.role.unwrap_or(Role::Client),
                status: true,
            },
            password,
            verified: true,
        });
        Ok(ack("Usuario creado exitosamente"))
    }

    async fn update_user(&self, dpi: &str, payload: &UserPayload) -> Result<Ack, ApiError> {
        self.enter(Endpoint::UpdateUser).await?;
        let mut state = lock(&self.state);
        self.staff(&state)?;

        if state
            .users
            .iter()
            .any(|u| u.user.dpi != dpi && u.user.username == payload.username)
        {
            return Err(http_error(400, "El nombre de usuario ya está en uso"));
        }
        let entry = state
            .user_mut(dpi)
            .ok_or_else(|| http_error(404, "Usuario no encontrado"))?;
        let user = &mut entry.user;
        let fields = [
            (&mut user.username, &payload.username),
            (&mut user.name, &payload.name),
            (&mut user.surname, &payload.surname),
            (&mut user.email, &payload.email),
            (&mut user.phone, &payload.phone),
            (&mut user.direction, &payload.direction),
            (&mut user.work_name, &payload.work_name),
        ];
        for (current, update) in fields {
            if let Some(value) = non_empty(update) {
                *current = value;
            }
        }
        if let Some(income) = payload.income {
            user.income = income;
        }
        if let Some(role) = payload.role {
            user.role = role;
        }
        if let Some(password) = payload.password.as_deref().and_then(non_empty) {
            entry.password = password;
        }
        Ok(ack("Usuario actualizado exitosamente"))
    }

    async fn most_active_accounts(&self) -> Result<Vec<MostActiveAccount>, ApiError> {
        self.enter(Endpoint::MostActiveAccounts).await?;
        let state = lock(&self.state);
        self.staff(&state)?;

        let mut rows: Vec<MostActiveAccount> = state
            .accounts
            .iter()
            .map(|a| {
                let no = &a.account.no_account;
                let total_movement = state
                    .transactions
                    .iter()
                    .filter(|t| !t.reversed && t.touches(no))
                    .map(|t| t.tx.amount)
                    .sum();
                let owner = state.user(&a.owner_dpi);
                MostActiveAccount {
                    no_account: no.clone(),
                    owner_name: owner
                        .map(|u| format!("{} {}", u.user.name, u.user.surname))
                        .unwrap_or_default(),
                    owner_username: owner.map(|u| u.user.username.clone()).unwrap_or_default(),
                    total_movement,
                    current_balance: a.account.amount,
                    currency: a.account.currency.clone(),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_movement
                .cmp(&a.total_movement)
                .then_with(|| a.no_account.cmp(&b.no_account))
        });
        rows.truncate(MOST_ACTIVE_LIMIT);
        Ok(rows)
    }

    async fn account_details(&self, account_id: &str) -> Result<AccountDetails, ApiError> {
        self.enter(Endpoint::AccountDetails).await?;
        let state = lock(&self.state);
        self.staff(&state)?;

        let entry = state
            .account_by_key(account_id)
            .ok_or_else(|| http_error(404, "Cuenta no encontrada"))?;
        let mut last_movements = state.movements(&entry.account.no_account);
        last_movements.truncate(5);
        Ok(AccountDetails {
            id: entry.account.id.clone(),
            no_account: entry.account.no_account.clone(),
            user: state.user(&entry.owner_dpi).map(|u| AccountOwner {
                name: format!("{} {}", u.user.name, u.user.surname),
                username: u.user.username.clone(),
                email: u.user.email.clone(),
            }),
            amount: entry.account.amount,
            currency: entry.account.currency.clone(),
            account_type: entry.account.account_type,
            status: true,
            created_at: Some(entry.created_at),
            last_movements,
        })
    }

    async fn reverse_deposit(&self, request: &ReverseDepositRequest) -> Result<ReversalReceipt, ApiError> {
        self.enter(Endpoint::ReverseDeposit).await?;
        let mut state = lock(&self.state);
        self.staff(&state)?;

        let index = state
            .transactions
            .iter()
            .position(|t| t.tx.id == request.transaction_id.trim())
            .ok_or_else(|| http_error(404, "Transacción no encontrada"))?;
        let entry = state.transactions[index].clone();
        if entry.tx.tx_type != TransactionType::Deposit {
            return Err(http_error(400, "Solo se pueden revertir depósitos"));
        }
        if entry.reversed {
            return Err(http_error(400, "El depósito ya fue revertido"));
        }
        let age = entry.tx.created_at.map(|at| Utc::now() - at)
            .unwrap_or_else(chrono::Duration::zero);
        if age > chrono::Duration::seconds(REVERSAL_WINDOW_SECS) {
            return Err(http_error(400, "El tiempo para revertir este depósito ha expirado"));
        }

        let target = entry.tx.to_account.clone().unwrap_or_default();
        let account = state
            .account_mut(&target)
            .ok_or_else(|| http_error(404, "Cuenta no encontrada"))?;
        if account.account.amount < entry.tx.amount {
            return Err(http_error(400, "Fondos insuficientes para revertir el depósito"));
        }
        account.account.amount -= entry.tx.amount;
        let updated = account.account.amount;
        let currency = account.account.currency.clone();
        state.transactions[index].reversed = true;

        info!(tx = %entry.tx.id, account = %target, "Mock deposit reversed");
        Ok(ReversalReceipt {
            message: Some("Depósito revertido exitosamente.".to_string()),
            transaction_id: entry.tx.id,
            updated_account_balance: Some(updated),
            currency: Some(currency),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;

    const ANA: &str = "2000000000001";
    const ADMIN: &str = "1000000000001";

    fn bank() -> MockBankApi {
        MockBankApi::demo(SessionContext::in_memory())
    }

    #[tokio::test]
    async fn test_requires_session() {
        let bank = bank();
        let err = bank.my_accounts().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(bank.calls(Endpoint::MyAccounts), 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let bank = bank();
        bank.act_as(ANA);
        let receipt = bank
            .create_transfer(&TransferRequest {
                from_account: "002".into(),
                to_account: "004".into(),
                amount: Decimal::from(50),
            })
            .await
            .unwrap();
        assert_eq!(receipt.message.as_deref(), Some("¡Transferencia Exitosa!"));
        assert!(receipt.converted_amount.is_none());
        assert_eq!(bank.balance("002"), Some(Decimal::from(450)));
        assert_eq!(bank.balance("004"), Some(Decimal::from(1050)));
    }

    #[tokio::test]
    async fn test_transfer_converts_currency() {
        let bank = bank();
        bank.act_as(ANA);
        let receipt = bank
            .create_transfer(&TransferRequest {
                from_account: "003".into(),
                to_account: "004".into(),
                amount: Decimal::from(10),
            })
            .await
            .unwrap();
        assert_eq!(receipt.converted_amount, Some(Decimal::new(7710, 2)));
        assert_eq!(receipt.converted_to.as_deref(), Some("GTQ"));
        assert_eq!(bank.balance("004"), Some(Decimal::new(107710, 2)));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_declined() {
        let bank = bank();
        bank.act_as(ANA);
        let err = bank
            .create_transfer(&TransferRequest {
                from_account: "001".into(),
                to_account: "004".into(),
                amount: Decimal::from(150),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "Fondos insuficientes");
        assert_eq!(bank.balance("001"), Some(Decimal::from(100)));
    }

    #[tokio::test]
    async fn test_register_verify_login() {
        let bank = bank();
        let request = RegisterRequest {
            name: "Marta".into(),
            surname: "López".into(),
            username: "martalopez".into(),
            dpi: "3000000000003".into(),
            email: "marta@example.com".into(),
            income: "1500".into(),
            direction: "Zona 1, Mixco".into(),
            phone: "55551234".into(),
            password: "Secret1".into(),
        };
        bank.register(&request).await.unwrap();

        let login = LoginRequest::new("martalopez", "Secret1");
        assert_eq!(bank.login(&login).await.unwrap_err().http_status(), Some(403));

        let code = bank.pending_code("martalopez").unwrap();
        bank.verify_email(&code).await.unwrap();
        assert!(bank.verify_email(&code).await.is_err());

        let session = bank.login(&LoginRequest::new("3000000000003", "Secret1")).await.unwrap();
        assert_eq!(session.role, Some(Role::Client));
        assert_eq!(session.username(), Some("martalopez"));
    }

    #[tokio::test]
    async fn test_reversal_window() {
        let bank = bank();
        bank.act_as(ADMIN);
        bank.create_deposit(&DepositRequest {
            account: "004".into(),
            amount: Decimal::from(200),
        })
        .await
        .unwrap();
        let tx = bank.last_transaction_id().unwrap();

        bank.backdate_transaction(&tx, REVERSAL_WINDOW_SECS + 5);
        let err = bank
            .reverse_deposit(&ReverseDepositRequest { transaction_id: tx.clone() })
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(bank.balance("004"), Some(Decimal::from(1200)));
    }

    #[tokio::test]
    async fn test_reversal_restores_balance() {
        let bank = bank();
        bank.act_as(ADMIN);
        bank.create_deposit(&DepositRequest {
            account: "004".into(),
            amount: Decimal::from(200),
        })
        .await
        .unwrap();
        let tx = bank.last_transaction_id().unwrap();
        let receipt = bank
            .reverse_deposit(&ReverseDepositRequest { transaction_id: tx.clone() })
            .await
            .unwrap();
        assert_eq!(receipt.updated_account_balance, Some(Decimal::from(1000)));
        assert_eq!(receipt.currency.as_deref(), Some("GTQ"));

        let again = bank
            .reverse_deposit(&ReverseDepositRequest { transaction_id: tx })
            .await
            .unwrap_err();
        assert_eq!(again.message, "El depósito ya fue revertido");
    }

    #[tokio::test]
    async fn test_client_cannot_list_users() {
        let bank = bank();
        bank.act_as(ANA);
        assert_eq!(bank.users().await.unwrap_err().http_status(), Some(403));
        bank.act_as(ADMIN);
        assert_eq!(bank.users().await.unwrap().total, 4);
    }

    #[tokio::test]
    async fn test_favorites() {
        let bank = bank();
        bank.act_as(ADMIN);
        let target = bank.account_details("004").await.unwrap().id;
        bank.act_as(ANA);
        bank.add_favorite(&AddFavoriteRequest {
            my_account_no: "001".into(),
            favorite_account_id: target.clone(),
        })
        .await
        .unwrap();
        let favorites = bank.favorites().await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].no_account, "004");
        assert!(favorites[0].is_favorite());

        let dup = bank
            .add_favorite(&AddFavoriteRequest {
                my_account_no: "001".into(),
                favorite_account_id: target,
            })
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let bank = bank();
        bank.act_as(ANA);
        bank.fail_next(Endpoint::MyAccounts, ApiError::http(500, None, "x"));
        assert_eq!(bank.my_accounts().await.unwrap_err().http_status(), Some(500));
        assert_eq!(bank.my_accounts().await.unwrap().len(), 3);
        assert_eq!(bank.calls(Endpoint::MyAccounts), 2);
    }

    #[tokio::test]
    async fn test_most_active_ordering() {
        let bank = bank();
        bank.act_as(ANA);
        bank.create_transfer(&TransferRequest {
            from_account: "002".into(),
            to_account: "004".into(),
            amount: Decimal::from(300),
        })
        .await
        .unwrap();
        bank.act_as(ADMIN);
        let rows = bank.most_active_accounts().await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].no_account, "002");
        assert_eq!(rows[0].total_movement, Decimal::from(300));
        assert_eq!(rows[1].no_account, "004");
        assert_eq!(rows[0].owner_username, "anagarcia");
    }
}
