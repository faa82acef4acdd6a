//! Request binding: raw bodies and query strings into typed values.
//!
//! Every failure a client can cause comes back as a [`BindingError`] with a
//! fixed, human-readable message. Failures the client cannot cause (a broken
//! connection mid-read) come back as opaque [`Error::Other`].

mod form;
mod json;
mod query;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;

use crate::context::RequestBody;
use crate::error::Error;

pub use form::{Form, FormFile};
pub(crate) use form::{FormKind, form_kind, parse_multipart, parse_urlencoded};
pub use json::decode_json;
pub use query::{decode_query, flatten_query, QueryValue};
pub(crate) use query::parse_bool;

/// Request bodies larger than this are rejected before decoding.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// A malformed, oversized or structurally invalid request payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingError {
    pub message: String,
    pub errors: Option<BTreeMap<String, String>>,
}

impl BindingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), errors: None }
    }

    pub fn with_errors(message: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self { message: message.into(), errors: Some(errors) }
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BindingError {}

/// Buffers a request body, refusing anything over `limit` bytes.
pub(crate) async fn read_body(
    mut body: RequestBody,
    limit: usize,
    timeout: Option<Duration>,
) -> Result<Bytes, Error> {
    let read = async move {
        let mut buf = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| Error::Other(anyhow::anyhow!("failed to read request body: {e}")))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            if buf.len() + data.len() > limit {
                return Err(BindingError::new(format!("body must not exceed {limit} bytes")).into());
            }
            buf.extend_from_slice(&data);
        }
        Ok::<_, Error>(buf.freeze())
    };

    match timeout {
        Some(t) => tokio::time::timeout(t, read)
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("timed out reading request body after {t:?}")))?,
        None => read.await,
    }
}
