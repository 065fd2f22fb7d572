//! HTTP implementation of [`BankApi`]
//!
//! One shared `reqwest::Client` with a fixed timeout. Every request reads the
//! bearer token fresh from the [`SessionContext`], so a login or logout in
//! the same process takes effect on the next call.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{ApiError, ApiErrorKind};
use super::routes::{DEFAULT_BASE_URL, Endpoint};
use super::types::{
    Ack, CreatedAccount, DepositReceipt, ReversalReceipt, TransferReceipt, decode_field,
};
use super::BankApi;
use crate::models::{
    Account, AccountDetails, AddFavoriteRequest, CreateAccountRequest, DepositRequest,
    HistoryRequest, LoginRequest, MostActiveAccount, RegisterRequest, ReverseDepositRequest,
    Transaction, TransferRequest, User, UserPage, UserPayload,
};
use crate::session::{Session, SessionContext};

/// Default client-side timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BankClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_ms: u64,
    session: SessionContext,
}

impl BankClient {
    pub fn new(config: &ClientConfig, session: SessionContext) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            ApiError::new(
                ApiErrorKind::Transport,
                format!("Invalid base URL '{}': {}", config.base_url, e),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::new(
                ApiErrorKind::Transport,
                format!("Base URL '{}' cannot hold a path", config.base_url),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                ApiError::new(
                    ApiErrorKind::Transport,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        info!(base_url = %base_url, timeout_ms = config.timeout_ms, "Bank client ready");
        Ok(Self {
            http,
            base_url,
            timeout_ms: config.timeout_ms,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Absolute URL for `endpoint`, with `param` percent-encoded into its
    /// placeholder segment.
    pub fn url_for(&self, endpoint: Endpoint, param: Option<&str>) -> Result<Url, ApiError> {
        if endpoint.has_param() && param.is_none_or(|p| p.trim().is_empty()) {
            return Err(ApiError::new(
                ApiErrorKind::Validation,
                format!("Falta el identificador para {}", endpoint.name()),
            ));
        }
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(endpoint.segments(param.map(str::trim)));
        }
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        param: Option<&str>,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let url = self.url_for(endpoint, param)?;
        let mut request = self.http.request(endpoint.method(), url);
        // Read per request: a record purged as garbage simply means no header.
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(op = endpoint.name(), "-> {}", endpoint);
        let response = request.send().await.map_err(|e| {
            let err = ApiError::transport(&e, self.timeout_ms);
            error!(op = endpoint.name(), code = err.code(), error = %e, "Request failed");
            err
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(&e, self.timeout_ms))?;
        let parsed = parse_body(&bytes);

        if !status.is_success() {
            let err = ApiError::http(status.as_u16(), parsed.as_ref(), endpoint.failure_message());
            warn!(op = endpoint.name(), status = status.as_u16(), message = %err.message, "Request rejected");
            return Err(err);
        }

        let body = parsed.unwrap_or(Value::Null);
        let declared = body.get("success").and_then(Value::as_bool);
        let confirmed = declared.unwrap_or(!endpoint.requires_confirmation());
        if !confirmed {
            let fallback = match declared {
                Some(_) => endpoint.failure_message(),
                None => endpoint.unexpected_message(),
            };
            let err = ApiError::rejected(&body, fallback);
            warn!(op = endpoint.name(), message = %err.message, "Request declined by server");
            return Err(err);
        }

        info!(op = endpoint.name(), status = status.as_u16(), "Request ok");
        Ok(body)
    }

    async fn get(&self, endpoint: Endpoint, param: Option<&str>) -> Result<Value, ApiError> {
        self.send::<Value>(endpoint, param, None).await
    }
}

/// JSON when possible, otherwise the raw text as a JSON string.
fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
}

/// A list under `key`; missing or `null` means empty.
fn decode_list<T: serde::de::DeserializeOwned>(body: &Value, key: &str) -> Result<Vec<T>, ApiError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => decode_field(body, key),
    }
}

#[async_trait]
impl BankApi for BankClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Ack, ApiError> {
        let body = self.send(Endpoint::Register, None, Some(request)).await?;
        Ok(Ack::from_body(&body))
    }

    async fn verify_email(&self, code: &str) -> Result<Ack, ApiError> {
        let body = self.get(Endpoint::VerifyEmail, Some(code)).await?;
        Ok(Ack::from_body(&body))
    }

    async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        let body = self.send(Endpoint::Login, None, Some(request)).await?;
        decode_field(&body, "userDetails")
    }

    async fn create_account(&self, request: &CreateAccountRequest) -> Result<CreatedAccount, ApiError> {
        let body = self.send(Endpoint::CreateAccount, None, Some(request)).await?;
        CreatedAccount::from_body(&body)
    }

    async fn my_accounts(&self) -> Result<Vec<Account>, ApiError> {
        let body = self.get(Endpoint::MyAccounts, None).await?;
        decode_list(&body, "accounts")
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ApiError> {
        let body = self.send(Endpoint::CreateTransaction, None, Some(request)).await?;
        Ok(TransferReceipt::from_body(&body, request))
    }

    async fn create_deposit(&self, request: &DepositRequest) -> Result<DepositReceipt, ApiError> {
        let body = self.send(Endpoint::CreateDeposit, None, Some(request)).await?;
        Ok(DepositReceipt::from_body(&body, request))
    }

    async fn delete_account(&self, account_id: &str) -> Result<Ack, ApiError> {
        let body = self.send::<Value>(Endpoint::DeleteAccount, Some(account_id), None).await?;
        Ok(Ack::from_body(&body))
    }

    async fn history(&self, account_no: &str) -> Result<Vec<Transaction>, ApiError> {
        let request = HistoryRequest {
            account_no: account_no.to_string(),
        };
        let body = self.send(Endpoint::DepositHistory, None, Some(&request)).await?;
        decode_list(&body, "transactions")
    }

    async fn favorites(&self) -> Result<Vec<Account>, ApiError> {
        let body = self.get(Endpoint::Favorites, None).await?;
        decode_list(&body, "favorites")
    }

    async fn add_favorite(&self, request: &AddFavoriteRequest) -> Result<Ack, ApiError> {
        let body = self.send(Endpoint::AddFavorite, None, Some(request)).await?;
        Ok(Ack::from_body(&body))
    }

    async fn users(&self) -> Result<UserPage, ApiError> {
        let body = self.get(Endpoint::Users, None).await?;
        let users: Vec<User> = decode_list(&body, "user")?;
        let total = body
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(users.len() as u64);
        Ok(UserPage { users, total })
    }

    async fn delete_user(&self, dpi: &str) -> Result<Ack, ApiError> {
        let body = self.send::<Value>(Endpoint::DeleteUser, Some(dpi), None).await?;
        Ok(Ack::from_body(&body))
    }

    async fn create_user(&self, payload: &UserPayload) -> Result<Ack, ApiError> {
        let body = self.send(Endpoint::CreateUser, None, Some(payload)).await?;
        Ok(Ack::from_body(&body))
    }

    async fn update_user(&self, dpi: &str, payload: &UserPayload) -> Result<Ack, ApiError> {
        // The DPI is immutable: it only ever travels as the path key.
        let mut payload = payload.clone();
        payload.dpi = None;
        let body = self.send(Endpoint::UpdateUser, Some(dpi), Some(&payload)).await?;
        Ok(Ack::from_body(&body))
    }

    async fn most_active_accounts(&self) -> Result<Vec<MostActiveAccount>, ApiError> {
        let body = self.get(Endpoint::MostActiveAccounts, None).await?;
        decode_list(&body, "accounts")
    }

    async fn account_details(&self, account_id: &str) -> Result<AccountDetails, ApiError> {
        let body = self.get(Endpoint::AccountDetails, Some(account_id)).await?;
        decode_field(&body, "accountDetails")
    }

    async fn reverse_deposit(&self, request: &ReverseDepositRequest) -> Result<ReversalReceipt, ApiError> {
        let body = self.send(Endpoint::ReverseDeposit, None, Some(request)).await?;
        Ok(ReversalReceipt::from_body(&body, &request.transaction_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BankClient {
        let config = ClientConfig {
            base_url: base.to_string(),
            ..Default::default()
        };
        BankClient::new(&config, SessionContext::in_memory()).unwrap()
    }

    #[test]
    fn test_url_joins_base_path() {
        let c = client("http://localhost:3000/virtualBank/v1");
        assert_eq!(
            c.url_for(Endpoint::MyAccounts, None).unwrap().as_str(),
            "http://localhost:3000/virtualBank/v1/account/getMyAccounts"
        );

        let c = client("http://localhost:3000/virtualBank/v1/");
        assert_eq!(
            c.url_for(Endpoint::Login, None).unwrap().as_str(),
            "http://localhost:3000/virtualBank/v1/auth/login"
        );
    }

    #[test]
    fn test_url_encodes_param() {
        let c = client(DEFAULT_BASE_URL);
        let url = c.url_for(Endpoint::AccountDetails, Some("a/b c")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/virtualBank/v1/account/admin/accountDetails/a%2Fb%20c"
        );
    }

    #[test]
    fn test_missing_param_is_rejected() {
        let c = client(DEFAULT_BASE_URL);
        let err = c.url_for(Endpoint::DeleteUser, Some("  ")).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Validation);
        assert!(c.url_for(Endpoint::VerifyEmail, None).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(BankClient::new(&config, SessionContext::in_memory()).is_err());

        let config = ClientConfig {
            base_url: "mailto:bank@example.com".into(),
            ..Default::default()
        };
        assert!(BankClient::new(&config, SessionContext::in_memory()).is_err());
    }

    #[test]
    fn test_parse_body_keeps_plain_text() {
        assert_eq!(parse_body(b""), None);
        assert_eq!(parse_body(b"{\"a\":1}"), Some(serde_json::json!({"a": 1})));
        assert_eq!(
            parse_body(b"Bad Gateway"),
            Some(Value::String("Bad Gateway".into()))
        );
    }
}
