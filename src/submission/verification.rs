//! Email verification code entry
//!
//! Six single-digit cells. Filling the last empty cell submits the code
//! automatically, once; after a failure the user retries, which clears the
//! cells. A successful verification is followed, after a short delay, by a
//! redirect to the login route.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::machine::{FormMachine, SubmitFlow, SubmitOutcome};
use super::state::SubmissionState;
use crate::api::{Ack, ApiError, BankApi, FieldErrors};
use crate::cancel::AbortSignal;
use crate::navigation::LOGIN_ROUTE;
use crate::validation::{VERIFICATION_CODE_LEN, VERIFICATION_CODE_MESSAGE};

pub const FIELD_CODE: &str = "code";

pub const VERIFY_SUCCESS_MESSAGE: &str = "¡Verificación exitosa!";
pub const VERIFY_FAILURE_MESSAGE: &str = "El código ingresado es inválido o ha expirado.";

/// Delay between a successful verification and the redirect.
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(800);

/// What the verification screen shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl From<SubmissionState> for VerifyStatus {
    fn from(state: SubmissionState) -> Self {
        match state {
            SubmissionState::Idle | SubmissionState::Validating => VerifyStatus::Idle,
            SubmissionState::Submitting => VerifyStatus::Loading,
            SubmissionState::Success => VerifyStatus::Success,
            SubmissionState::Error => VerifyStatus::Error,
        }
    }
}

// ============================================================================
// Code cells
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeEntry {
    cells: [Option<char>; VERIFICATION_CODE_LEN],
    focus: usize,
}

impl CodeEntry {
    pub fn cell(&self, index: usize) -> Option<char> {
        self.cells.get(index).copied().flatten()
    }

    /// Index of the focused cell.
    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Entered digits, empty cells skipped.
    pub fn code(&self) -> String {
        self.cells.iter().flatten().collect()
    }

    /// Replace the content of cell `index` with `value`.
    ///
    /// `value` may be empty (clears the cell) or one ASCII digit (fills it and
    /// moves focus to the next cell). Anything else is ignored. Returns
    /// whether the input was accepted.
    pub fn input(&mut self, index: usize, value: &str) -> bool {
        if index >= VERIFICATION_CODE_LEN {
            return false;
        }
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => {
                self.cells[index] = None;
                self.focus = index;
                true
            }
            (Some(digit), None) if digit.is_ascii_digit() => {
                self.cells[index] = Some(digit);
                self.focus = (index + 1).min(VERIFICATION_CODE_LEN - 1);
                true
            }
            _ => false,
        }
    }

    /// Backspace in cell `index`: clears a filled cell, or moves focus back
    /// from an empty one.
    pub fn backspace(&mut self, index: usize) {
        if index >= VERIFICATION_CODE_LEN {
            return;
        }
        if self.cells[index].is_some() {
            self.cells[index] = None;
            self.focus = index;
        } else if index > 0 {
            self.focus = index - 1;
        }
    }
}

// ============================================================================
// Flow
// ============================================================================

pub struct VerificationFlow {
    api: Arc<dyn BankApi>,
}

impl VerificationFlow {
    pub fn new(api: Arc<dyn BankApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SubmitFlow for VerificationFlow {
    type Fields = CodeEntry;
    type Request = String;
    type Receipt = Ack;

    fn name(&self) -> &'static str {
        "verify_email"
    }

    fn validate(&self, entry: &CodeEntry) -> Result<String, FieldErrors> {
        if entry.is_complete() {
            Ok(entry.code())
        } else {
            let mut errors = FieldErrors::new();
            errors.insert(FIELD_CODE.into(), VERIFICATION_CODE_MESSAGE.into());
            Err(errors)
        }
    }

    async fn submit(&self, code: String) -> Result<Ack, ApiError> {
        // The screen shows one fixed text for every failure.
        self.api
            .verify_email(&code)
            .await
            .map_err(|e| ApiError::new(e.kind, VERIFY_FAILURE_MESSAGE))
    }

    fn success_message(&self, _receipt: &Ack) -> String {
        VERIFY_SUCCESS_MESSAGE.to_string()
    }
}

/// Code entry screen: six cells over a [`FormMachine`].
#[derive(Clone)]
pub struct CodeForm {
    machine: FormMachine<VerificationFlow>,
    auto_submitted: Arc<AtomicBool>,
    redirect_delay: Duration,
}

impl CodeForm {
    pub fn new(api: Arc<dyn BankApi>, redirect_delay: Duration) -> Self {
        Self {
            machine: FormMachine::new(VerificationFlow::new(api)),
            auto_submitted: Arc::new(AtomicBool::new(false)),
            redirect_delay,
        }
    }

    pub fn status(&self) -> VerifyStatus {
        self.machine.state().into()
    }

    pub fn entry(&self) -> CodeEntry {
        self.machine.fields()
    }

    pub fn machine(&self) -> &FormMachine<VerificationFlow> {
        &self.machine
    }

    /// Type into cell `index`. Completing the code submits it, once.
    ///
    /// Returns the submission outcome when this input triggered one.
    pub async fn input(&self, index: usize, value: &str, abort: &AbortSignal) -> Option<SubmitOutcome<Ack>> {
        if self.status() != VerifyStatus::Idle {
            debug!(status = ?self.status(), "Code input ignored");
            return None;
        }
        let mut accepted = false;
        self.machine.edit(FIELD_CODE, |entry| accepted = entry.input(index, value));
        if !accepted || !self.entry().is_complete() {
            return None;
        }
        if self.auto_submitted.swap(true, Ordering::SeqCst) {
            return None;
        }

        info!("Verification code complete, submitting");
        let outcome = self.machine.submit(abort).await;
        if matches!(outcome, SubmitOutcome::Cancelled | SubmitOutcome::Busy) {
            self.auto_submitted.store(false, Ordering::SeqCst);
        }
        Some(outcome)
    }

    /// Fill cells from `code`, starting at the first cell.
    pub async fn enter_code(&self, code: &str, abort: &AbortSignal) -> Option<SubmitOutcome<Ack>> {
        let mut last = None;
        for (index, ch) in code.chars().take(VERIFICATION_CODE_LEN).enumerate() {
            let mut buf = [0u8; 4];
            last = self.input(index, ch.encode_utf8(&mut buf), abort).await;
        }
        last
    }

    pub fn backspace(&self, index: usize) {
        if self.status() == VerifyStatus::Idle {
            self.machine.edit(FIELD_CODE, |entry| entry.backspace(index));
        }
    }

    /// From `Error`: clear every cell and return to `Idle`.
    pub fn retry(&self) {
        if self.status() == VerifyStatus::Error {
            self.machine.set_fields(CodeEntry::default());
            self.auto_submitted.store(false, Ordering::SeqCst);
        }
    }

    /// After `Success`, wait the redirect delay and return the login route.
    /// `None` when not verified or aborted while waiting.
    pub async fn redirect(&self, abort: &AbortSignal) -> Option<&'static str> {
        if self.status() != VerifyStatus::Success {
            return None;
        }
        tokio::select! {
            biased;
            _ = abort.aborted() => None,
            _ = tokio::time::sleep(self.redirect_delay) => Some(LOGIN_ROUTE),
        }
    }
}

#[cfg(test)]
mod entry_tests {
    use super::*;

    #[test]
    fn test_digit_advances_focus() {
        let mut entry = CodeEntry::default();
        assert!(entry.input(0, "4"));
        assert_eq!(entry.focus(), 1);
        assert_eq!(entry.cell(0), Some('4'));
    }

    #[test]
    fn test_non_digit_ignored() {
        let mut entry = CodeEntry::default();
        assert!(!entry.input(0, "a"));
        assert!(!entry.input(0, "12"));
        assert!(!entry.input(9, "1"));
        assert_eq!(entry, CodeEntry::default());
    }

    #[test]
    fn test_backspace_on_empty_moves_back() {
        let mut entry = CodeEntry::default();
        entry.input(0, "1");
        entry.input(1, "2");
        assert_eq!(entry.focus(), 2);

        entry.backspace(2);
        assert_eq!(entry.focus(), 1);
        entry.backspace(1);
        assert_eq!(entry.cell(1), None);
        assert_eq!(entry.focus(), 1);

        entry.backspace(0);
        assert_eq!(entry.cell(0), None);
        entry.backspace(0);
        assert_eq!(entry.focus(), 0);
    }

    #[test]
    fn test_last_cell_keeps_focus() {
        let mut entry = CodeEntry::default();
        for (i, d) in ["1", "2", "3", "4", "5", "6"].iter().enumerate() {
            entry.input(i, d);
        }
        assert!(entry.is_complete());
        assert_eq!(entry.focus(), 5);
        assert_eq!(entry.code(), "123456");
    }
}

#[cfg(all(test, feature = "mock-api"))]
mod tests {
    use super::*;
    use crate::api::Endpoint;
    use crate::api::mock::MockBankApi;
    use crate::models::RegisterRequest;

    async fn registered() -> (Arc<MockBankApi>, String) {
        let bank = Arc::new(MockBankApi::new());
        bank.register(&RegisterRequest {
            name: "Marta".into(),
            surname: "López".into(),
            username: "martalopez".into(),
            dpi: "3000000000003".into(),
            email: "marta@example.com".into(),
            income: "1500".into(),
            direction: "Zona 1, Mixco".into(),
            phone: "55551234".into(),
            password: "Secret1".into(),
        })
        .await
        .unwrap();
        let code = bank.pending_code("martalopez").unwrap();
        (bank, code)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_digit_submits_once() {
        let (bank, code) = registered().await;
        let form = CodeForm::new(bank.clone(), DEFAULT_REDIRECT_DELAY);
        let never = AbortSignal::never();

        let digits: Vec<char> = code.chars().collect();
        for (i, d) in digits.iter().take(5).enumerate() {
            assert!(form.input(i, &d.to_string(), &never).await.is_none());
        }
        assert_eq!(bank.calls(Endpoint::VerifyEmail), 0);

        let outcome = form.input(5, &digits[5].to_string(), &never).await;
        assert!(matches!(outcome, Some(SubmitOutcome::Succeeded(_))));
        assert_eq!(form.status(), VerifyStatus::Success);

        assert!(form.input(5, "0", &never).await.is_none());
        assert_eq!(bank.calls(Endpoint::VerifyEmail), 1);

        let start = tokio::time::Instant::now();
        assert_eq!(form.redirect(&never).await, Some(LOGIN_ROUTE));
        assert!(start.elapsed() >= DEFAULT_REDIRECT_DELAY);
    }

    #[tokio::test]
    async fn test_wrong_code_then_retry() {
        let (bank, code) = registered().await;
        let form = CodeForm::new(bank.clone(), DEFAULT_REDIRECT_DELAY);
        let never = AbortSignal::never();

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let outcome = form.enter_code(wrong, &never).await;
        assert!(matches!(outcome, Some(SubmitOutcome::Failed(_))));
        assert_eq!(form.status(), VerifyStatus::Error);
        assert_eq!(
            form.machine().snapshot().banner.unwrap().message(),
            VERIFY_FAILURE_MESSAGE
        );
        assert!(form.redirect(&never).await.is_none());

        form.retry();
        assert_eq!(form.status(), VerifyStatus::Idle);
        assert_eq!(form.entry(), CodeEntry::default());

        let outcome = form.enter_code(&code, &never).await;
        assert!(matches!(outcome, Some(SubmitOutcome::Succeeded(_))));
        assert_eq!(bank.calls(Endpoint::VerifyEmail), 2);
    }
}
