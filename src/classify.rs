//! Error classification: every handler failure becomes one JSON envelope.
//!
//! ```text
//! { "status": 400, "error": "VALIDATION_ERROR", "message": "Invalid Request",
//!   "errors": { "userName": "is required" } }
//! ```
//!
//! The checks run in a fixed order and the first match wins:
//!
//! | Error | Status | Tag |
//! |---|---|---|
//! | [`BindingError`] | 400 | `DECODE_ERROR` |
//! | [`ValidationError`] | 400 | `VALIDATION_ERROR` |
//! | [`NotFoundError`] | 404 | `DOMAIN_ERROR` |
//! | [`DomainError`] | 400 | `DOMAIN_ERROR` |
//! | anything else | 500 | `INTERNAL_ERROR` |
//!
//! Opaque errors are searched too: an `anyhow` chain that wraps any of the
//! shapes above is classified as that shape, in the same order.

use std::collections::BTreeMap;

use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::bind::BindingError;
use crate::context::Context;
use crate::error::{DomainError, Error, NotFoundError};
use crate::response::{self, Response};
use crate::validate::ValidationError;

pub(crate) const INVALID_REQUEST: &str = "Invalid Request";
pub(crate) const SOMETHING_WENT_WRONG: &str = "Something went wrong";

/// Pre-rendered 500 body, sent when the real envelope cannot be serialised.
const INTERNAL_BODY: &str =
    r#"{"status":500,"error":"INTERNAL_ERROR","message":"Something went wrong"}"#;

/// The `error` tag of an [`ErrorResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DomainError,
    ValidationError,
    DecodeError,
    InternalError,
}

/// The wire shape of every failure response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: ErrorKind, message: impl Into<String>) -> Self {
        Self { status: status.as_u16(), error, message: message.into(), errors: None }
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, SOMETHING_WENT_WRONG)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn binding(b: &BindingError) -> Self {
        Self {
            errors: b.errors.clone(),
            ..Self::new(StatusCode::BAD_REQUEST, ErrorKind::DecodeError, b.message.clone())
        }
    }

    fn validation(v: &ValidationError) -> Self {
        Self {
            errors: Some(v.field_errors()),
            ..Self::new(StatusCode::BAD_REQUEST, ErrorKind::ValidationError, INVALID_REQUEST)
        }
    }

    fn not_found(n: &NotFoundError) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::DomainError, n.message.clone())
    }

    fn domain(d: &DomainError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::DomainError, d.message.clone())
    }
}

/// Maps a handler error to its response. Total and deterministic.
pub fn classify(err: &Error) -> ErrorResponse {
    match err {
        Error::Binding(b) => ErrorResponse::binding(b),
        Error::Validation(v) => ErrorResponse::validation(v),
        Error::NotFound(n) => ErrorResponse::not_found(n),
        Error::Domain(d) => ErrorResponse::domain(d),
        Error::Other(other) => classify_chain(other),
    }
}

fn classify_chain(err: &anyhow::Error) -> ErrorResponse {
    find::<BindingError>(err)
        .map(ErrorResponse::binding)
        .or_else(|| find::<ValidationError>(err).map(ErrorResponse::validation))
        .or_else(|| find::<NotFoundError>(err).map(ErrorResponse::not_found))
        .or_else(|| find::<DomainError>(err).map(ErrorResponse::domain))
        .unwrap_or_else(ErrorResponse::internal)
}

/// Looks through `anyhow` context layers first, then `source()` links.
fn find<T>(err: &anyhow::Error) -> Option<&T>
where
    T: std::error::Error + Send + Sync + 'static,
{
    err.downcast_ref::<T>()
        .or_else(|| err.chain().find_map(|e| e.downcast_ref::<T>()))
}

/// Classifies `err`, logs it, and records the envelope on `ctx`.
pub(crate) fn respond(ctx: &Context, err: &Error) {
    let res = classify(err);

    error!(
        request_id = %ctx.request_id(),
        method = %ctx.method(),
        uri = ctx.uri(),
        status = res.status,
        kind = ?res.error,
        error = %err,
        "request failed"
    );

    if let Err(e) = ctx.json(res.status_code(), &res) {
        error!(request_id = %ctx.request_id(), error = %e, "failed to write error response");
        ctx.write(Response::with_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            response::JSON,
            INTERNAL_BODY,
        ));
    }
}
