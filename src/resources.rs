//! Data-fetching resources
//!
//! A [`Resource`] caches the last result of one read-only query together
//! with its `loading` flag and last error, and exposes `refetch`. Keyed
//! queries (history of an account, details of an account) take their key
//! through [`Resource::load`]; loading with no key clears the resource
//! without touching the network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::api::{ApiError, BankApi};
use crate::models::{Account, AccountDetails, MostActiveAccount, Transaction, UserPage};

/// One read-only backend query.
#[async_trait]
pub trait Query: Send + Sync + 'static {
    type Output: Default + Clone + Send + Sync + 'static;

    /// Whether the query needs a key (account number or id).
    const KEYED: bool = false;

    fn name(&self) -> &'static str;

    async fn fetch(&self, api: &dyn BankApi, key: Option<&str>) -> Result<Self::Output, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceState<T> {
    pub loading: bool,
    pub error: Option<String>,
    pub data: T,
}

pub struct Resource<Q: Query> {
    query: Arc<Q>,
    api: Arc<dyn BankApi>,
    key: Arc<Mutex<Option<String>>>,
    state: Arc<Mutex<ResourceState<Q::Output>>>,
    /// Bumped per fetch; only the latest fetch may publish.
    generation: Arc<AtomicU64>,
}

impl<Q: Query> Clone for Resource<Q> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            api: self.api.clone(),
            key: self.key.clone(),
            state: self.state.clone(),
            generation: self.generation.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<Q: Query> Resource<Q> {
    pub fn new(query: Q, api: Arc<dyn BankApi>) -> Self {
        Self {
            query: Arc::new(query),
            api,
            key: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(ResourceState::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> ResourceState<Q::Output> {
        lock(&self.state).clone()
    }

    pub fn data(&self) -> Q::Output {
        lock(&self.state).data.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    pub fn key(&self) -> Option<String> {
        lock(&self.key).clone()
    }

    /// Switch to `key` and fetch. `None` (or blank) clears the resource.
    pub async fn load(&self, key: Option<&str>) -> Result<Q::Output, ApiError> {
        let key = key.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string);
        *lock(&self.key) = key;
        self.refetch().await
    }

    /// Fetch again with the current key.
    pub async fn refetch(&self) -> Result<Q::Output, ApiError> {
        let name = self.query.name();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = self.key();

        if Q::KEYED && key.is_none() {
            debug!(resource = name, "No key, clearing");
            *lock(&self.state) = ResourceState::default();
            return Ok(Q::Output::default());
        }

        {
            let mut state = lock(&self.state);
            state.loading = true;
            state.error = None;
        }

        let result = self.query.fetch(self.api.as_ref(), key.as_deref()).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(resource = name, "Superseded fetch discarded");
            return result;
        }

        let mut state = lock(&self.state);
        state.loading = false;
        match &result {
            Ok(data) => state.data = data.clone(),
            Err(e) => {
                warn!(resource = name, code = e.code(), message = %e.message, "Fetch failed");
                state.error = Some(e.message.clone());
                if Q::KEYED {
                    state.data = Q::Output::default();
                }
            }
        }
        result
    }
}

// ============================================================================
// Queries
// ============================================================================

pub struct MyAccounts;

#[async_trait]
impl Query for MyAccounts {
    type Output = Vec<Account>;

    fn name(&self) -> &'static str {
        "my_accounts"
    }

    async fn fetch(&self, api: &dyn BankApi, _key: Option<&str>) -> Result<Vec<Account>, ApiError> {
        api.my_accounts().await
    }
}

pub struct Favorites;

#[async_trait]
impl Query for Favorites {
    type Output = Vec<Account>;

    fn name(&self) -> &'static str {
        "favorites"
    }

    async fn fetch(&self, api: &dyn BankApi, _key: Option<&str>) -> Result<Vec<Account>, ApiError> {
        api.favorites().await
    }
}

pub struct Users;

#[async_trait]
impl Query for Users {
    type Output = UserPage;

    fn name(&self) -> &'static str {
        "users"
    }

    async fn fetch(&self, api: &dyn BankApi, _key: Option<&str>) -> Result<UserPage, ApiError> {
        api.users().await
    }
}

/// Movements of one account, keyed by account number.
pub struct History;

#[async_trait]
impl Query for History {
    type Output = Vec<Transaction>;
    const KEYED: bool = true;

    fn name(&self) -> &'static str {
        "history"
    }

    async fn fetch(&self, api: &dyn BankApi, key: Option<&str>) -> Result<Vec<Transaction>, ApiError> {
        api.history(key.unwrap_or_default()).await
    }
}

pub struct MostActive;

#[async_trait]
impl Query for MostActive {
    type Output = Vec<MostActiveAccount>;

    fn name(&self) -> &'static str {
        "most_active_accounts"
    }

    async fn fetch(&self, api: &dyn BankApi, _key: Option<&str>) -> Result<Vec<MostActiveAccount>, ApiError> {
        api.most_active_accounts().await
    }
}

/// Admin view of one account, keyed by account id.
pub struct Details;

#[async_trait]
impl Query for Details {
    type Output = Option<AccountDetails>;
    const KEYED: bool = true;

    fn name(&self) -> &'static str {
        "account_details"
    }

    async fn fetch(&self, api: &dyn BankApi, key: Option<&str>) -> Result<Option<AccountDetails>, ApiError> {
        api.account_details(key.unwrap_or_default()).await.map(Some)
    }
}

pub type AccountsResource = Resource<MyAccounts>;
pub type FavoritesResource = Resource<Favorites>;
pub type UsersResource = Resource<Users>;
pub type HistoryResource = Resource<History>;
pub type MostActiveResource = Resource<MostActive>;
pub type DetailsResource = Resource<Details>;
