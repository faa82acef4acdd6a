//! JSON body decoding.

use serde::de::DeserializeOwned;
use serde_json::error::Category;

use super::BindingError;
use crate::error::Error;
use crate::validate::ValidationError;

/// Decodes exactly one JSON value from `body` into `T`.
///
/// Keys `T` does not declare are rejected whether or not `T` uses
/// `#[serde(deny_unknown_fields)]`. Failures are checked in a fixed order:
///
/// | Condition | Message |
/// |---|---|
/// | empty body | `body must be valid JSON` |
/// | truncated value | `body contains badly-formed JSON` |
/// | unknown key `x` | `body contains unknown keys "x"` |
/// | missing field `f` | validation error, `{"f": "is required"}` |
/// | other syntax error | `body contains badly-formed JSON and can not be parsed` |
/// | wrong type at `f` | `body contains incorrect JSON type for field "f"` |
/// | trailing value | `body must only contain a single JSON value` |
///
/// The size limit is enforced earlier, while the body is read.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BindingError::new("body must be valid JSON").into());
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let mut unknown: Option<String> = None;

    let decoded: Result<T, _> = {
        let mut on_unknown = |path: serde_ignored::Path<'_>| {
            unknown.get_or_insert_with(|| path.to_string());
        };
        serde_path_to_error::deserialize(serde_ignored::Deserializer::new(&mut de, &mut on_unknown))
    };

    match decoded {
        Ok(value) => {
            if let Some(key) = unknown {
                return Err(unknown_keys(&key));
            }
            if de.end().is_err() {
                return Err(BindingError::new("body must only contain a single JSON value").into());
            }
            Ok(value)
        }
        Err(err) => {
            let path = err.path().to_string();
            let inner = err.into_inner();
            Err(classify(body, &path, unknown, inner))
        }
    }
}

fn classify(body: &[u8], path: &str, unknown: Option<String>, err: serde_json::Error) -> Error {
    match err.classify() {
        Category::Eof => BindingError::new("body contains badly-formed JSON").into(),
        Category::Syntax => {
            BindingError::new("body contains badly-formed JSON and can not be parsed").into()
        }
        Category::Data => {
            let message = err.to_string();

            if let Some(key) = unknown.or_else(|| backticked(&message, "unknown field `")) {
                return unknown_keys(&key);
            }
            if let Some(field) = backticked(&message, "missing field `") {
                let field = if path.is_empty() || path == "." { field } else { format!("{path}.{field}") };
                return ValidationError::missing(field).into();
            }
            if !path.is_empty() && path != "." {
                return BindingError::new(format!("body contains incorrect JSON type for field {path:?}"))
                    .into();
            }

            let offset = byte_offset(body, err.line(), err.column());
            BindingError::new(format!(
                "body contains incorrect JSON value that was not appropriate for the request body (at character {offset})"
            ))
            .into()
        }
        Category::Io => Error::other(err),
    }
}

fn unknown_keys(key: &str) -> Error {
    BindingError::new(format!("body contains unknown keys {key:?}")).into()
}

/// Pulls `name` out of serde messages shaped like ``prefix`name`, ...``.
fn backticked(message: &str, prefix: &str) -> Option<String> {
    let rest = message.strip_prefix(prefix)?;
    let end = rest.find('`')?;
    Some(rest[..end].to_owned())
}

/// Converts serde_json's 1-based line/column into a byte offset.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let preceding: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    preceding + column
}
