//! API Error Types
//!
//! Every failure a caller can observe, from a refused TCP connection to a
//! form field left empty, ends up as one [`ApiError`]: a kind, a single
//! displayable message, and optional per-field detail.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field messages keyed by form field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Shown when neither the server nor the transport produced any text.
pub const FALLBACK_MESSAGE: &str = "Ocurrió un error inesperado.";

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection refused, DNS failure, reset.
    Transport,
    /// Client-side timeout elapsed.
    Timeout,
    /// Non-2xx response.
    Http { status: u16 },
    /// 2xx response whose body says `success: false`.
    Rejected,
    /// Form input rejected before any request was made.
    Validation,
    /// The caller aborted while the request was in flight.
    Cancelled,
    /// 2xx response that did not have the expected shape.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub fields: FieldErrors,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    pub fn validation(summary: impl Into<String>, fields: FieldErrors) -> Self {
        Self {
            kind: ApiErrorKind::Validation,
            message: summary.into(),
            fields,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ApiErrorKind::Cancelled, "Solicitud cancelada.")
    }

    pub fn decode(what: impl std::fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::Decode,
            format!("Respuesta inesperada del servidor: {}", what),
        )
    }

    /// Build from a non-2xx response body.
    pub fn http(status: u16, body: Option<&Value>, fallback: &str) -> Self {
        let transport_text = format!("Request failed with status code {}", status);
        Self::new(
            ApiErrorKind::Http { status },
            extract_message(body, Some(&transport_text), fallback),
        )
    }

    /// Build from a 2xx body that declared `success: false`.
    pub fn rejected(body: &Value, fallback: &str) -> Self {
        Self::new(ApiErrorKind::Rejected, extract_message(Some(body), None, fallback))
    }

    /// Build from a transport failure.
    pub fn transport(err: &reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::new(
                ApiErrorKind::Timeout,
                format!("timeout of {}ms exceeded", timeout_ms),
            )
        } else {
            Self::new(ApiErrorKind::Transport, err.to_string())
        }
    }

    /// Get the error code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self.kind {
            ApiErrorKind::Transport => "TRANSPORT",
            ApiErrorKind::Timeout => "TIMEOUT",
            ApiErrorKind::Http { .. } => "HTTP_ERROR",
            ApiErrorKind::Rejected => "REJECTED",
            ApiErrorKind::Validation => "VALIDATION",
            ApiErrorKind::Cancelled => "CANCELLED",
            ApiErrorKind::Decode => "DECODE",
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self.kind {
            ApiErrorKind::Http { status } => Some(status),
            _ => None,
        }
    }

    /// Timeouts are transport failures too.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Transport | ApiErrorKind::Timeout)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.http_status(), Some(401))
    }
}

fn non_empty_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pick the one message to show for a failure.
///
/// Priority: `message`, then `error`, then `msg`, then the first
/// `errors[].msg` of an express-validator style body, then a bare string body,
/// then the transport's own text, then `fallback`.
pub fn extract_message(body: Option<&Value>, transport_text: Option<&str>, fallback: &str) -> String {
    if let Some(body) = body {
        let structured = non_empty_str(body, "message")
            .or_else(|| non_empty_str(body, "error"))
            .or_else(|| non_empty_str(body, "msg"))
            .or_else(|| {
                body.get("errors")
                    .and_then(Value::as_array)
                    .and_then(|errors| errors.first())
                    .and_then(|first| non_empty_str(first, "msg"))
            })
            .or_else(|| body.as_str().map(str::trim).filter(|s| !s.is_empty()));
        if let Some(text) = structured {
            return text.to_string();
        }
    }

    transport_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
