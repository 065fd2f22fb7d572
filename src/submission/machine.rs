//! Generic form submission machine
//!
//! A [`SubmitFlow`] supplies the form-specific parts (field validation, the
//! API call, the success message, what to refresh afterwards). A
//! [`FormMachine`] drives any flow through [`SubmissionState`] and owns the
//! form fields, per-field errors and the result banner.
//!
//! The state itself is the in-flight flag: a submit is accepted only from
//! a settled state, so two racing submits on one form produce at most one
//! API call.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::state::SubmissionState;
use crate::api::{ApiError, ApiErrorKind, FieldErrors};
use crate::cancel::AbortSignal;

/// Banner shown when client-side validation fails.
pub const VALIDATION_SUMMARY: &str = "Por favor, corrige los errores del formulario.";

#[async_trait]
pub trait SubmitFlow: Send + Sync + 'static {
    type Fields: Default + Clone + Send + Sync + 'static;
    type Request: Send + 'static;
    type Receipt: Clone + Send + Sync + 'static;

    /// Flow name for logging
    fn name(&self) -> &'static str;

    /// Check the fields; on success produce the request to send.
    fn validate(&self, fields: &Self::Fields) -> Result<Self::Request, FieldErrors>;

    async fn submit(&self, request: Self::Request) -> Result<Self::Receipt, ApiError>;

    fn success_message(&self, receipt: &Self::Receipt) -> String;

    /// Runs after the success state is published, e.g. to refetch balances.
    async fn after_success(&self, _receipt: &Self::Receipt) {}
}

/// Result banner
#[derive(Debug, Clone, PartialEq)]
pub enum Banner<R> {
    Success { message: String, receipt: R },
    Error { message: String },
}

impl<R> Banner<R> {
    pub fn message(&self) -> &str {
        match self {
            Banner::Success { message, .. } | Banner::Error { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Banner::Success { .. })
    }
}

/// Point-in-time copy of a form for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSnapshot<F, R> {
    pub state: SubmissionState,
    pub fields: F,
    pub field_errors: FieldErrors,
    pub banner: Option<Banner<R>>,
}

/// What a call to [`FormMachine::submit`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<R> {
    /// Another submission is in flight; nothing happened.
    Busy,
    /// Client-side validation failed; no request was made.
    Rejected(FieldErrors),
    Succeeded(R),
    Failed(ApiError),
    /// Aborted while waiting; the response, if any, was discarded.
    Cancelled,
}

struct Inner<F, R> {
    state: SubmissionState,
    fields: F,
    field_errors: FieldErrors,
    banner: Option<Banner<R>>,
}

pub struct FormMachine<F: SubmitFlow> {
    flow: Arc<F>,
    inner: Arc<Mutex<Inner<F::Fields, F::Receipt>>>,
}

impl<F: SubmitFlow> Clone for FormMachine<F> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<F: SubmitFlow> FormMachine<F> {
    pub fn new(flow: F) -> Self {
        Self {
            flow: Arc::new(flow),
            inner: Arc::new(Mutex::new(Inner {
                state: SubmissionState::Idle,
                fields: F::Fields::default(),
                field_errors: FieldErrors::new(),
                banner: None,
            })),
        }
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    fn lock(&self) -> MutexGuard<'_, Inner<F::Fields, F::Receipt>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state
    }

    pub fn fields(&self) -> F::Fields {
        self.lock().fields.clone()
    }

    pub fn snapshot(&self) -> FormSnapshot<F::Fields, F::Receipt> {
        let inner = self.lock();
        FormSnapshot {
            state: inner.state,
            fields: inner.fields.clone(),
            field_errors: inner.field_errors.clone(),
            banner: inner.banner.clone(),
        }
    }

    /// Submit button enabled.
    pub fn can_submit(&self) -> bool {
        self.lock().state.accepts_submit()
    }

    /// Change a field. Clears that field's error and any result banner.
    pub fn edit(&self, field: &str, apply: impl FnOnce(&mut F::Fields)) {
        let mut inner = self.lock();
        apply(&mut inner.fields);
        inner.field_errors.remove(field);
        if inner.state.is_terminal() {
            debug!(flow = self.flow.name(), from = %inner.state, "Edit resets form to IDLE");
            inner.state = SubmissionState::Idle;
            inner.banner = None;
        }
    }

    /// Replace all fields, e.g. when prefilling from a selection.
    pub fn set_fields(&self, fields: F::Fields) {
        let mut inner = self.lock();
        inner.fields = fields;
        inner.field_errors.clear();
        if inner.state.is_terminal() {
            inner.state = SubmissionState::Idle;
            inner.banner = None;
        }
    }

    pub async fn submit(&self, abort: &AbortSignal) -> SubmitOutcome<F::Receipt> {
        let name = self.flow.name();
        let fields = {
            let mut inner = self.lock();
            if !inner.state.accepts_submit() {
                debug!(flow = name, state = %inner.state, "Submit ignored while busy");
                return SubmitOutcome::Busy;
            }
            inner.state = SubmissionState::Validating;
            inner.field_errors.clear();
            inner.banner = None;
            inner.fields.clone()
        };

        let request = match self.flow.validate(&fields) {
            Ok(request) => request,
            Err(errors) => {
                warn!(flow = name, fields = ?errors.keys().collect::<Vec<_>>(), "Validation failed");
                let mut inner = self.lock();
                inner.state = SubmissionState::Error;
                inner.field_errors = errors.clone();
                inner.banner = Some(Banner::Error {
                    message: VALIDATION_SUMMARY.to_string(),
                });
                return SubmitOutcome::Rejected(errors);
            }
        };

        if abort.is_aborted() {
            self.lock().state = SubmissionState::Idle;
            return SubmitOutcome::Cancelled;
        }
        self.lock().state = SubmissionState::Submitting;
        info!(flow = name, "VALIDATING -> SUBMITTING");

        let result = tokio::select! {
            biased;
            _ = abort.aborted() => None,
            result = self.flow.submit(request) => Some(result),
        };

        match result {
            None => {
                info!(flow = name, "Submission cancelled");
                self.lock().state = SubmissionState::Idle;
                SubmitOutcome::Cancelled
            }
            Some(Ok(receipt)) => {
                let message = self.flow.success_message(&receipt);
                info!(flow = name, message = %message, "SUBMITTING -> SUCCESS");
                {
                    let mut inner = self.lock();
                    inner.state = SubmissionState::Success;
                    inner.fields = F::Fields::default();
                    inner.field_errors.clear();
                    inner.banner = Some(Banner::Success {
                        message,
                        receipt: receipt.clone(),
                    });
                }
                self.flow.after_success(&receipt).await;
                SubmitOutcome::Succeeded(receipt)
            }
            Some(Err(err)) => {
                warn!(flow = name, code = err.code(), message = %err.message, "SUBMITTING -> ERROR");
                let mut inner = self.lock();
                inner.state = SubmissionState::Error;
                if err.kind == ApiErrorKind::Validation {
                    inner.field_errors = err.fields.clone();
                }
                inner.banner = Some(Banner::Error {
                    message: err.message.clone(),
                });
                SubmitOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::AbortHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct EchoFields {
        text: String,
    }

    /// Echoes the text back after a delay; "boom" fails.
    #[derive(Default)]
    struct EchoFlow {
        calls: AtomicUsize,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl SubmitFlow for EchoFlow {
        type Fields = EchoFields;
        type Request = String;
        type Receipt = String;

        fn name(&self) -> &'static str {
            "echo"
        }

        fn validate(&self, fields: &EchoFields) -> Result<String, FieldErrors> {
            if fields.text.is_empty() {
                let mut errors = FieldErrors::new();
                errors.insert("text".into(), "requerido".into());
                return Err(errors);
            }
            Ok(fields.text.clone())
        }

        async fn submit(&self, request: String) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if request == "boom" {
                return Err(ApiError::http(500, None, "x"));
            }
            Ok(request)
        }

        fn success_message(&self, receipt: &String) -> String {
            format!("ok {}", receipt)
        }

        async fn after_success(&self, _receipt: &String) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn machine() -> FormMachine<EchoFlow> {
        FormMachine::new(EchoFlow::default())
    }

    fn set_text(m: &FormMachine<EchoFlow>, text: &str) {
        m.edit("text", |f| f.text = text.to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_makes_no_call() {
        let m = machine();
        let outcome = m.submit(&AbortSignal::never()).await;
        assert!(matches!(outcome, SubmitOutcome::Rejected(ref e) if e.contains_key("text")));
        let snap = m.snapshot();
        assert_eq!(snap.state, SubmissionState::Error);
        assert_eq!(snap.banner.unwrap().message(), VALIDATION_SUMMARY);
        assert_eq!(m.flow().calls.load(Ordering::SeqCst), 0);

        set_text(&m, "a");
        let snap = m.snapshot();
        assert_eq!(snap.state, SubmissionState::Idle);
        assert!(snap.field_errors.is_empty());
        assert!(snap.banner.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_fields_and_refreshes() {
        let m = machine();
        set_text(&m, "hola");
        let outcome = m.submit(&AbortSignal::never()).await;
        assert_eq!(outcome, SubmitOutcome::Succeeded("hola".into()));

        let snap = m.snapshot();
        assert_eq!(snap.state, SubmissionState::Success);
        assert_eq!(snap.fields, EchoFields::default());
        assert_eq!(snap.banner.unwrap().message(), "ok hola");
        assert_eq!(m.flow().refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_fields() {
        let m = machine();
        set_text(&m, "boom");
        let outcome = m.submit(&AbortSignal::never()).await;
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        let snap = m.snapshot();
        assert_eq!(snap.state, SubmissionState::Error);
        assert_eq!(snap.fields.text, "boom");
        assert_eq!(snap.banner.unwrap().message(), "Request failed with status code 500");
        assert_eq!(m.flow().refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_submit_makes_one_call() {
        let m = machine();
        set_text(&m, "hola");
        let never = AbortSignal::never();
        let (a, b) = tokio::join!(m.submit(&never), m.submit(&never));
        let busy = [&a, &b]
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Busy))
            .count();
        assert_eq!(busy, 1);
        assert_eq!(m.flow().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_returns_to_idle() {
        let m = machine();
        set_text(&m, "hola");
        let handle = AbortHandle::new();
        let signal = handle.signal();

        let runner = m.clone();
        let task = tokio::spawn(async move { runner.submit(&signal).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(m.state(), SubmissionState::Submitting);
        drop(handle);

        assert_eq!(task.await.unwrap(), SubmitOutcome::Cancelled);
        let snap = m.snapshot();
        assert_eq!(snap.state, SubmissionState::Idle);
        assert_eq!(snap.fields.text, "hola");
        assert!(snap.banner.is_none());
        assert_eq!(m.flow().refreshes.load(Ordering::SeqCst), 0);
    }
}
