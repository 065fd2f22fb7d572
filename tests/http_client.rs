//! BankClient against a local axum server standing in for the REST API.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use virtual_bank_client::api::{ApiErrorKind, BankApi, BankClient, ClientConfig};
use virtual_bank_client::cancel::AbortSignal;
use virtual_bank_client::core_types::Role;
use virtual_bank_client::models::{DepositRequest, LoginRequest, TransferRequest, UserPayload};
use virtual_bank_client::mutations::{Mutations, RecordingNotifier};
use virtual_bank_client::resources::{MyAccounts, Resource};
use virtual_bank_client::session::{MemoryStorage, SESSION_KEY, Session, SessionContext, Storage};
use virtual_bank_client::submission::{SubmissionState, SubmitOutcome, TransferFields, transfer_form};

#[derive(Clone, Default)]
struct Seen {
    auth: Arc<Mutex<Vec<Option<String>>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Seen {
    fn record(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth.lock().unwrap().push(auth);
    }

    fn last_auth(&self) -> Option<String> {
        self.auth.lock().unwrap().last().cloned().flatten()
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }
}

async fn my_accounts(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
    seen.record(&headers);
    Json(json!({
        "success": true,
        "accounts": [
            {"_id": "a1", "noAccount": "001", "type": "Savings", "currency": "GTQ", "amount": 1000},
            {"_id": "a2", "noAccount": "002", "type": "Monetary", "currency": "GTQ", "amount": 20.5}
        ]
    }))
}

async fn declined_transfer(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    seen.record(&headers);
    let unflagged = body["toAccount"] == "003";
    seen.bodies.lock().unwrap().push(body);
    if unflagged {
        return Json(json!({"message": "Servicio en mantenimiento"}));
    }
    Json(json!({"success": false, "message": "Fondos insuficientes"}))
}

async fn slow_deposit() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"success": true}))
}

async fn missing_user(Path(dpi): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"errors": [{"msg": format!("Usuario {} no encontrado", dpi)}]})),
    )
}

async fn update_user(State(seen): State<Seen>, Path(_dpi): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    seen.bodies.lock().unwrap().push(body);
    Json(json!({"success": true, "message": "Usuario actualizado"}))
}

async fn bad_code(Path(_code): Path<String>) -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "Código inválido")
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body.get("dpi").and_then(Value::as_str) == Some("2000000000001") {
        (
            StatusCode::OK,
            Json(json!({
                "message": "Login exitoso",
                "userDetails": {"token": "jwt-abc", "role": "CLIENT_ROLE", "username": "anagarcia"}
            })),
        )
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "Credenciales inválidas"})))
    }
}

async fn spawn_bank(seen: Seen) -> String {
    let app = Router::new()
        .route("/virtualBank/v1/account/getMyAccounts", get(my_accounts))
        .route("/virtualBank/v1/account/createTransaction", post(declined_transfer))
        .route("/virtualBank/v1/account/createDeposit", post(slow_deposit))
        .route("/virtualBank/v1/user/delete/{dpi}", delete(missing_user))
        .route("/virtualBank/v1/user/update/{dpi}", put(update_user))
        .route("/virtualBank/v1/auth/verify/{code}", get(bad_code))
        .route("/virtualBank/v1/auth/login", post(login))
        .with_state(seen);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/virtualBank/v1", addr)
}

fn client(base_url: String, timeout_ms: u64, session: SessionContext) -> BankClient {
    BankClient::new(&ClientConfig { base_url, timeout_ms }, session).unwrap()
}

#[tokio::test]
async fn http_bearer_header_follows_session() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let storage = Arc::new(MemoryStorage::new());
    let session = SessionContext::new(storage.clone());
    let bank = client(base, 5_000, session.clone());

    bank.my_accounts().await.unwrap();
    assert_eq!(seen.last_auth(), None);

    session.set(&Session::new("tok-1", Role::Client)).unwrap();
    let accounts = bank.my_accounts().await.unwrap();
    assert_eq!(seen.last_auth().as_deref(), Some("Bearer tok-1"));
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].no_account, "001");

    // A corrupt record is purged and the request goes out unauthenticated
    storage.set_item(SESSION_KEY, "undefined").unwrap();
    bank.my_accounts().await.unwrap();
    assert_eq!(seen.last_auth(), None);
    assert!(storage.get_item(SESSION_KEY).is_none());
}

#[tokio::test]
async fn http_success_false_is_rejected() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let bank = client(base, 5_000, SessionContext::in_memory());

    let err = bank
        .create_transfer(&TransferRequest {
            from_account: "001".into(),
            to_account: "002".into(),
            amount: 50.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Rejected);
    assert_eq!(err.message, "Fondos insuficientes");
    assert_eq!(seen.last_body()["amount"].as_f64(), Some(50.0));
}

#[tokio::test]
async fn http_transfer_form_keeps_fields_on_decline() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let session = SessionContext::in_memory();
    session.set(&Session::new("tok-1", Role::Client)).unwrap();
    let bank: Arc<dyn BankApi> = Arc::new(client(base, 5_000, session));

    let accounts = Resource::new(MyAccounts, bank.clone());
    accounts.refetch().await.unwrap();
    let form = transfer_form(bank, accounts);
    let fields = TransferFields {
        from_account: "001".into(),
        to_account: "002".into(),
        amount: "50".into(),
    };
    form.set_fields(fields.clone());

    let outcome = form.submit(&AbortSignal::never()).await;
    assert!(matches!(outcome, SubmitOutcome::Failed(_)));

    let snap = form.snapshot();
    assert_eq!(snap.state, SubmissionState::Error);
    assert_eq!(snap.banner.unwrap().message(), "Fondos insuficientes");
    assert_eq!(snap.fields, fields);
}

#[tokio::test]
async fn http_transfer_without_success_flag_is_not_confirmed() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let session = SessionContext::in_memory();
    session.set(&Session::new("tok-1", Role::Client)).unwrap();
    let bank: Arc<dyn BankApi> = Arc::new(client(base, 5_000, session));

    let err = bank
        .create_transfer(&TransferRequest {
            from_account: "001".into(),
            to_account: "003".into(),
            amount: 10.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Rejected);
    assert_eq!(err.message, "Servicio en mantenimiento");

    let accounts = Resource::new(MyAccounts, bank.clone());
    accounts.refetch().await.unwrap();
    let form = transfer_form(bank, accounts);
    let fields = TransferFields {
        from_account: "001".into(),
        to_account: "003".into(),
        amount: "10".into(),
    };
    form.set_fields(fields.clone());

    let outcome = form.submit(&AbortSignal::never()).await;
    assert!(!matches!(outcome, SubmitOutcome::Succeeded(_)));

    let snap = form.snapshot();
    assert_eq!(snap.state, SubmissionState::Error);
    assert_eq!(snap.banner.unwrap().message(), "Servicio en mantenimiento");
    assert_eq!(snap.fields, fields);
}

#[tokio::test]
async fn http_login_does_not_need_success_flag() {
    let base = spawn_bank(Seen::default()).await;
    let bank = client(base, 5_000, SessionContext::in_memory());

    // login answers with userDetails only
    let session = bank
        .login(&LoginRequest::new("2000000000001", "Cliente1"))
        .await
        .unwrap();
    assert_eq!(session.token, "jwt-abc");
}

#[tokio::test]
async fn http_timeout_is_transport_error() {
    let base = spawn_bank(Seen::default()).await;
    let bank = client(base, 200, SessionContext::in_memory());

    let err = bank
        .create_deposit(&DepositRequest {
            account: "001".into(),
            amount: 10.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Timeout);
    assert!(err.is_transport());
    assert_eq!(err.message, "timeout of 200ms exceeded");
}

#[tokio::test]
async fn http_error_message_extraction() {
    let base = spawn_bank(Seen::default()).await;
    let bank = client(base, 5_000, SessionContext::in_memory());

    let err = bank.delete_user("1234567890123").await.unwrap_err();
    assert_eq!(err.http_status(), Some(404));
    assert_eq!(err.message, "Usuario 1234567890123 no encontrado");

    let err = bank.verify_email("000000").await.unwrap_err();
    assert_eq!(err.http_status(), Some(400));
    assert_eq!(err.message, "Código inválido");
}

#[tokio::test]
async fn http_update_user_never_sends_dpi() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let bank = client(base, 5_000, SessionContext::in_memory());

    let payload = UserPayload {
        dpi: Some("2000000000001".into()),
        username: "anagarcia".into(),
        ..Default::default()
    };
    let ack = bank.update_user("2000000000001", &payload).await.unwrap();
    assert_eq!(ack.message.as_deref(), Some("Usuario actualizado"));
    assert!(seen.last_body().get("dpi").is_none());
    assert_eq!(seen.last_body()["username"], "anagarcia");
}

#[tokio::test]
async fn http_login_mutation_stores_session() {
    let seen = Seen::default();
    let base = spawn_bank(seen.clone()).await;
    let session = SessionContext::in_memory();
    let bank: Arc<dyn BankApi> = Arc::new(client(base, 5_000, session.clone()));
    let notices = Arc::new(RecordingNotifier::new());
    let mutations = Mutations::new(bank.clone(), session.clone(), notices.clone());

    let failed = mutations.login("anagarcia", "Cliente1").await;
    assert!(!failed.success);
    assert_eq!(failed.message.as_deref(), Some("Credenciales inválidas"));

    let ok = mutations.login("2000000000001", "Cliente1").await;
    assert!(ok.success);
    assert_eq!(session.token().as_deref(), Some("jwt-abc"));
    assert_eq!(session.current().unwrap().username(), Some("anagarcia"));

    bank.my_accounts().await.unwrap();
    assert_eq!(seen.last_auth().as_deref(), Some("Bearer jwt-abc"));
}

#[tokio::test]
async fn http_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bank = client(format!("http://{}/virtualBank/v1", addr), 1_000, SessionContext::in_memory());
    let err = bank.my_accounts().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Transport);
    assert_eq!(err.code(), "TRANSPORT");
}
