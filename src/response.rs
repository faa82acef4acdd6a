//! The outgoing response a [`Context`](crate::Context) accumulates.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

pub(crate) const JSON: &str = "application/json";
pub(crate) const HTML: &str = "text/html; charset=utf-8";

/// A fully buffered HTTP response.
///
/// Handlers rarely build one directly: the writers on
/// [`Context`](crate::Context) do it for them.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Response with no body.
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Response with a body and a `content-type`.
    pub fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut res = Self::new(status);
        res.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        res.body = body.into();
        res
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Merges `extra` under the response's own headers. A header the
    /// response already sets keeps its value and is never repeated, except
    /// `set-cookie`, whose values accumulate.
    pub(crate) fn merge_headers(&mut self, extra: HeaderMap) {
        for name in extra.keys() {
            if name != SET_COOKIE && self.headers.contains_key(name) {
                continue;
            }
            for value in extra.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CACHE_CONTROL, LOCATION};

    #[test]
    fn body_sets_content_type() {
        let res = Response::with_body(StatusCode::CREATED, JSON, "{}");
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], JSON);
        assert_eq!(res.body().as_ref(), b"{}");
    }

    #[test]
    fn merge_keeps_repeated_headers_and_own_content_type() {
        let mut extra = HeaderMap::new();
        extra.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        extra.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        extra.insert(LOCATION, HeaderValue::from_static("/x"));

        let mut res = Response::with_body(StatusCode::OK, JSON, "[]");
        res.merge_headers(extra);

        assert_eq!(res.headers().get_all(SET_COOKIE).iter().count(), 2);
        assert_eq!(res.headers()[CONTENT_TYPE], JSON);
        assert_eq!(res.headers()[LOCATION], "/x");
    }

    #[test]
    fn merge_never_repeats_single_valued_headers() {
        let mut extra = HeaderMap::new();
        extra.insert(LOCATION, HeaderValue::from_static("/from-middleware"));
        extra.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        extra.insert(SET_COOKIE, HeaderValue::from_static("late=1"));

        let mut res = Response::new(StatusCode::FOUND);
        res.headers_mut().insert(LOCATION, HeaderValue::from_static("/target"));
        res.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        res.headers_mut().insert(SET_COOKIE, HeaderValue::from_static("early=1"));
        res.merge_headers(extra);

        assert_eq!(res.headers().get_all(LOCATION).iter().collect::<Vec<_>>(), ["/target"]);
        assert_eq!(res.headers().get_all(CACHE_CONTROL).iter().collect::<Vec<_>>(), ["max-age=60"]);
        assert_eq!(res.headers().get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn into_inner_keeps_status_and_headers() {
        let res = Response::with_body(StatusCode::NOT_FOUND, HTML, "<p>gone</p>").into_inner();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[CONTENT_TYPE], HTML);
    }
}
