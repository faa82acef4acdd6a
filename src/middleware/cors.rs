//! Cross-origin resource sharing.
//!
//! Allowed methods are fixed to `GET POST PUT PATCH DELETE` and every request
//! header is allowed. Origins come from configuration: `*` allows any
//! origin, and an entry may hold one `*` wildcard (`https://*.example.com`).
//!
//! Preflight requests (`OPTIONS` with `Access-Control-Request-Method`) are
//! answered with `204` before routing. Other requests are routed normally and
//! get `Access-Control-Allow-Origin` when their origin is allowed.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, HeaderValue, ORIGIN, VARY,
};
use http::{HeaderMap, Method, StatusCode};

use crate::response::Response;

const ALLOWED_METHODS: [Method; 5] =
    [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

#[derive(Clone, Debug, PartialEq, Eq)]
enum OriginRule {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl OriginRule {
    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Exact(o) => o == origin,
            Self::Wildcard { prefix, suffix } => {
                origin.len() >= prefix.len() + suffix.len()
                    && origin.starts_with(prefix.as_str())
                    && origin.ends_with(suffix.as_str())
            }
        }
    }
}

/// A compiled CORS policy.
#[derive(Clone, Debug)]
pub struct Cors {
    any_origin: bool,
    rules: Vec<OriginRule>,
}

impl Cors {
    /// Compiles `origins`. Matching is case-insensitive. An empty list allows
    /// every origin.
    pub fn new<S: AsRef<str>>(origins: &[S]) -> Self {
        let mut any_origin = origins.is_empty();
        let mut rules = Vec::new();

        for origin in origins {
            let origin = origin.as_ref().trim().to_ascii_lowercase();
            if origin == "*" {
                any_origin = true;
                break;
            }
            match origin.split_once('*') {
                Some((prefix, suffix)) => rules.push(OriginRule::Wildcard {
                    prefix: prefix.to_owned(),
                    suffix: suffix.to_owned(),
                }),
                None => rules.push(OriginRule::Exact(origin)),
            }
        }

        Self { any_origin, rules }
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        if self.any_origin {
            return true;
        }
        let origin = origin.to_ascii_lowercase();
        self.rules.iter().any(|r| r.matches(&origin))
    }

    fn allow_origin_value(&self, origin: &HeaderValue) -> HeaderValue {
        if self.any_origin { HeaderValue::from_static("*") } else { origin.clone() }
    }

    /// Answers a preflight request, or returns `None` when the request is
    /// not one.
    pub fn preflight(&self, method: &Method, headers: &HeaderMap) -> Option<Response> {
        if *method != Method::OPTIONS {
            return None;
        }
        let requested = headers.get(ACCESS_CONTROL_REQUEST_METHOD)?;

        let mut res = Response::new(StatusCode::NO_CONTENT);
        let out = res.headers_mut();
        out.append(VARY, HeaderValue::from_static("Origin"));
        out.append(VARY, HeaderValue::from_static("Access-Control-Request-Method"));
        out.append(VARY, HeaderValue::from_static("Access-Control-Request-Headers"));

        let Some(origin) = headers.get(ORIGIN) else {
            return Some(res);
        };
        let origin_allowed = origin.to_str().is_ok_and(|o| self.allows_origin(o));
        let method_allowed = requested
            .to_str()
            .ok()
            .and_then(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
            .is_some_and(|m| m == Method::OPTIONS || ALLOWED_METHODS.contains(&m));

        if origin_allowed && method_allowed {
            out.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin_value(origin));
            out.insert(ACCESS_CONTROL_ALLOW_METHODS, requested.clone());
            if let Some(req_headers) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
                out.insert(ACCESS_CONTROL_ALLOW_HEADERS, req_headers.clone());
            }
        }
        Some(res)
    }

    /// Adds CORS headers to the response of a routed request.
    pub fn decorate(&self, method: &Method, headers: &HeaderMap, res: &mut Response) {
        res.headers_mut().append(VARY, HeaderValue::from_static("Origin"));

        let Some(origin) = headers.get(ORIGIN) else {
            return;
        };
        let method_allowed = *method == Method::OPTIONS || ALLOWED_METHODS.contains(method);
        if method_allowed && origin.to_str().is_ok_and(|o| self.allows_origin(o)) {
            let value = self.allow_origin_value(origin);
            res.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(&["*"])
    }
}
