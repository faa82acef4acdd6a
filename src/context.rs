//! Per-request state and response writers.
//!
//! A [`Context`] is created by the router for every inbound request and
//! handed to the handler chain. It is a cheap handle: clones share the same
//! request, so middleware can keep one while passing another down.
//!
//! Response writers (`ok`, `created`, ...) record the response; the router
//! sends it once the chain returns. The first write wins. Later writes are
//! dropped with a warning.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::Body;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{OnceCell, watch};
use tracing::warn;

use crate::bind::{self, BindingError, Form, FormKind, MAX_BODY_BYTES};
use crate::cookie::{Cookies, SetCookie};
use crate::error::{DomainError, Error};
use crate::response::{self, Response};
use crate::validate::{Validate, ValidationError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The request body as the router hands it over.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

pub(crate) fn boxed_body<B>(body: B) -> RequestBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Connection-level facts the router attaches to each request.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestMeta {
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) shutdown: Option<watch::Receiver<bool>>,
    pub(crate) body_timeout: Option<Duration>,
}

/// Per-request handle passed to handlers and middleware.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    request_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: Vec<(String, String)>,
    meta: RequestMeta,
    body: Mutex<Option<RequestBody>>,
    form: OnceCell<Form>,
    current_user: Mutex<Option<String>>,
    out: Mutex<Outgoing>,
}

#[derive(Default)]
struct Outgoing {
    headers: HeaderMap,
    response: Option<Response>,
}

impl Context {
    /// Builds a context around a bare request, with no path parameters and
    /// no peer address. Useful for calling handlers directly in tests.
    pub fn from_request<B>(req: http::Request<B>) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self::new(parts, boxed_body(body), Vec::new(), RequestMeta::default())
    }

    pub(crate) fn new(
        parts: http::request::Parts,
        body: RequestBody,
        params: Vec<(String, String)>,
        meta: RequestMeta,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id: uuid::Uuid::new_v4().to_string(),
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                params,
                meta,
                body: Mutex::new(Some(body)),
                form: OnceCell::new(),
                current_user: Mutex::new(None),
                out: Mutex::new(Outgoing::default()),
            }),
        }
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    /// Unique identifier generated for this request.
    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Identifier of the authenticated user, if middleware set one.
    pub fn current_user(&self) -> Option<String> {
        self.inner.current_user.lock().clone()
    }

    pub fn set_current_user(&self, user: impl Into<String>) {
        *self.inner.current_user.lock() = Some(user.into());
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Path and query, e.g. `/users?page=2`.
    pub fn uri(&self) -> &str {
        self.inner
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.inner.uri.path())
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// First value of header `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookies(&self) -> Cookies {
        Cookies::parse(
            self.inner
                .headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().get(name).map(str::to_owned)
    }

    /// Client address. Proxy headers take precedence when they carry a
    /// port: `X-Forwarded-For` (first hop) then `X-Real-IP`, each paired with
    /// `X-Forwarded-Port`. Falls back to the peer socket address.
    pub fn remote_addr(&self) -> String {
        let port = self.header("x-forwarded-port").filter(|p| !p.is_empty());

        if let (Some(forwarded), Some(port)) = (self.header("x-forwarded-for"), port) {
            if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
                return format!("{ip}:{port}");
            }
        }
        if let (Some(ip), Some(port)) = (self.header("x-real-ip").filter(|ip| !ip.is_empty()), port) {
            return format!("{ip}:{port}");
        }

        self.inner.meta.peer.map(|p| p.to_string()).unwrap_or_default()
    }

    /// Resolves once the server starts shutting down. Never resolves for a
    /// context built outside a running server.
    pub async fn cancelled(&self) {
        if let Some(mut rx) = self.inner.meta.shutdown.clone() {
            let fired = rx.wait_for(|stop| *stop).await.is_ok();
            if fired {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.meta.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    // ── Path parameters ───────────────────────────────────────────────────────

    /// Value captured by `{name}` in the route pattern.
    pub fn path_value(&self, name: &str) -> Option<&str> {
        self.inner
            .params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `{name}` as an integer, `0` when missing or not a number.
    pub fn path_int(&self, name: &str) -> i64 {
        self.path_value(name).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// The `{id}` path parameter.
    pub fn path_id(&self) -> Option<&str> {
        self.path_value("id")
    }

    /// `{name}` as a non-zero integer.
    pub fn path_int_id(&self, name: &str) -> Result<i64, Error> {
        match self.path_int(name) {
            0 => Err(DomainError::new(format!(
                "invalid integer {name}: {}",
                self.path_value(name).unwrap_or_default()
            ))
            .into()),
            id => Ok(id),
        }
    }

    // ── Query parameters ──────────────────────────────────────────────────────

    /// Every query parameter, values in order of appearance.
    pub fn query_params(&self) -> BTreeMap<String, Vec<String>> {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in url::form_urlencoded::parse(self.raw_query().as_bytes()) {
            params.entry(k.into_owned()).or_default().push(v.into_owned());
        }
        params
    }

    /// First value of query parameter `name`, trimmed. Empty when absent.
    pub fn query(&self, name: &str) -> String {
        url::form_urlencoded::parse(self.raw_query().as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_owned())
            .unwrap_or_default()
    }

    /// `0` when missing or not a number.
    pub fn query_int(&self, name: &str) -> i64 {
        self.query_int_or_error(name).unwrap_or(0)
    }

    pub fn query_int_or_error(&self, name: &str) -> Result<i64, Error> {
        let value = self.query(name);
        if value.is_empty() {
            return Err(DomainError::new(format!("query parameter {name} is missing")).into());
        }
        value.parse::<i64>().map_err(|e| {
            DomainError::new(format!("query parameter {name} is not a valid integer: {e}")).into()
        })
    }

    /// `false` when missing or not a boolean.
    pub fn query_bool(&self, name: &str) -> bool {
        self.query_bool_or_error(name).unwrap_or(false)
    }

    /// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
    pub fn query_bool_or_error(&self, name: &str) -> Result<bool, Error> {
        let value = self.query(name);
        if value.is_empty() {
            return Err(DomainError::new(format!("query parameter {name} not found")).into());
        }
        bind::parse_bool(&value).ok_or_else(|| {
            DomainError::new(format!("query parameter {name} is not a valid boolean")).into()
        })
    }

    fn raw_query(&self) -> &str {
        self.inner.uri.query().unwrap_or_default()
    }

    // ── Decode pipeline ───────────────────────────────────────────────────────

    /// Reads the body as JSON into `T`, normalises it, then validates it.
    ///
    /// The body can be read once. A second call sees an empty body.
    pub async fn decode<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned + Validate,
    {
        let bytes = self.read_body().await?;
        let value = bind::decode_json(&bytes)?;
        self.validated(value)
    }

    async fn read_body(&self) -> Result<Bytes, Error> {
        let body = self.inner.body.lock().take();
        match body {
            Some(body) => bind::read_body(body, MAX_BODY_BYTES, self.inner.meta.body_timeout).await,
            None => Ok(Bytes::new()),
        }
    }

    /// Same pipeline as [`decode`](Self::decode), sourced from the query string.
    pub fn decode_url<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned + Validate,
    {
        let value = bind::decode_query(self.raw_query())?;
        self.validated(value)
    }

    fn validated<T: Validate>(&self, mut value: T) -> Result<T, Error> {
        value.normalize(self);
        value.validate().map_err(ValidationError::of::<T>)?;
        Ok(value)
    }

    // ── Forms ─────────────────────────────────────────────────────────────────

    /// The parsed form body. URL-encoded and multipart bodies are read on the
    /// first call, under the same size limit as [`decode`](Self::decode);
    /// any other content type gives an empty form.
    pub async fn form(&self) -> Result<&Form, Error> {
        self.inner
            .form
            .get_or_try_init(|| async {
                let form: Result<Form, Error> = match bind::form_kind(self.header(CONTENT_TYPE.as_str())) {
                    FormKind::Other => Ok(Form::default()),
                    FormKind::UrlEncoded => Ok(bind::parse_urlencoded(&self.read_body().await?)),
                    FormKind::Multipart { boundary: Some(boundary) } => {
                        bind::parse_multipart(&boundary, self.read_body().await?).await
                    }
                    FormKind::Multipart { boundary: None } => {
                        Err(BindingError::new("multipart body has no boundary").into())
                    }
                };
                form
            })
            .await
    }

    /// First value for `key` in the form body, then in the query string.
    /// Empty when neither has it.
    pub async fn form_value(&self, key: &str) -> Result<String, Error> {
        if let Some(value) = self.form().await?.value(key) {
            return Ok(value.to_owned());
        }
        Ok(url::form_urlencoded::parse(self.raw_query().as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default())
    }

    /// The parsed `multipart/form-data` body, files included.
    pub async fn multipart(&self) -> Result<&Form, Error> {
        if !matches!(bind::form_kind(self.header(CONTENT_TYPE.as_str())), FormKind::Multipart { .. }) {
            return Err(BindingError::new("request Content-Type isn't multipart/form-data").into());
        }
        self.form().await
    }

    /// Takes the raw body for handlers that do their own reading.
    pub fn take_body(&self) -> RequestBody {
        self.inner
            .body
            .lock()
            .take()
            .unwrap_or_else(|| boxed_body(Empty::new()))
    }

    // ── Response ──────────────────────────────────────────────────────────────

    /// Sets a response header, replacing any previous value. Invalid names
    /// or values are dropped with a warning.
    pub fn set_header(&self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.inner.out.lock().headers.insert(name, value);
            }
            _ => warn!(request_id = %self.request_id(), header = name, "dropping invalid response header"),
        }
    }

    pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) {
        for (name, value) in headers {
            self.set_header(name, value);
        }
    }

    pub fn set_cookie(&self, cookie: &SetCookie) {
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(value) => {
                self.inner.out.lock().headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!(request_id = %self.request_id(), cookie = cookie.name(), "dropping invalid cookie: {e}"),
        }
    }

    /// `200 OK` with `body` as JSON.
    pub fn ok<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::OK, body)
    }

    /// `201 Created` with `body` as JSON.
    pub fn created<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::CREATED, body)
    }

    pub fn not_found<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::NOT_FOUND, body)
    }

    pub fn bad_request<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::BAD_REQUEST, body)
    }

    pub fn unauthorized<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::UNAUTHORIZED, body)
    }

    pub fn internal_server_error<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        self.json(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    /// Any status with `body` as JSON.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, body: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(body)?;
        self.write(Response::with_body(status, response::JSON, bytes));
        Ok(())
    }

    /// `302 Found` pointing at `url`.
    pub fn redirect(&self, url: &str) {
        match HeaderValue::try_from(url) {
            Ok(location) => {
                let mut res = Response::new(StatusCode::FOUND);
                res.headers_mut().insert(LOCATION, location);
                self.write(res);
            }
            Err(e) => warn!(request_id = %self.request_id(), url, "refusing redirect to invalid location: {e}"),
        }
    }

    pub fn html(&self, status: StatusCode, body: impl Into<String>) {
        self.write(Response::with_body(status, response::HTML, body.into()));
    }

    /// Records `res` unless a response was already written.
    pub fn write(&self, res: Response) {
        let mut out = self.inner.out.lock();
        if let Some(first) = &out.response {
            warn!(
                request_id = %self.inner.request_id,
                first = first.status().as_u16(),
                ignored = res.status().as_u16(),
                "response already written, ignoring second write"
            );
            return;
        }
        out.response = Some(res);
    }

    pub fn is_written(&self) -> bool {
        self.inner.out.lock().response.is_some()
    }

    /// Final response: the recorded one, or an empty `200`, with pending
    /// headers and cookies merged in.
    pub(crate) fn take_response(&self) -> Response {
        let mut out = self.inner.out.lock();
        let mut res = out.response.take().unwrap_or_default();
        res.merge_headers(std::mem::take(&mut out.headers));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{FieldViolation, Violations};
    use http_body_util::Full;
    use serde::Deserialize;

    fn ctx(uri: &str) -> Context {
        Context::from_request(http::Request::get(uri).body(Empty::<Bytes>::new()).unwrap())
    }

    fn post(body: &str) -> Context {
        Context::from_request(
            http::Request::post("/")
                .body(Full::new(Bytes::from(body.to_owned())))
                .unwrap(),
        )
    }

    #[derive(Debug, Deserialize)]
    struct Signup {
        #[serde(rename = "userName")]
        user_name: String,
        email: String,
    }

    impl Validate for Signup {
        const FIELD_NAMES: &'static [(&'static str, &'static str)] = &[("user_name", "userName")];

        fn normalize(&mut self, _ctx: &Context) {
            self.email = self.email.trim().to_lowercase();
        }

        fn validate(&self) -> Result<(), Vec<FieldViolation>> {
            let mut v = Violations::new();
            if self.user_name.is_empty() {
                v.add("user_name", "required", "");
            }
            if !self.email.contains('@') {
                v.add("email", "email", "");
            }
            v.finish()
        }
    }

    #[test]
    fn request_ids_are_unique() {
        let a = ctx("/");
        let b = ctx("/");
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.request_id(), a.clone().request_id());
    }

    #[tokio::test]
    async fn decode_normalizes_then_validates() {
        let s: Signup = post(r#"{"userName":"ada","email":"  ADA@X.IO "}"#).decode().await.unwrap();
        assert_eq!(s.email, "ada@x.io");

        let err = post(r#"{"userName":"","email":"nope"}"#).decode::<Signup>().await.unwrap_err();
        match err {
            Error::Validation(v) => {
                let fields = v.field_errors();
                assert_eq!(fields["userName"], "is required");
                assert_eq!(fields["email"], "must be a valid email address");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn binding_errors_come_before_validation() {
        let err = post(r#"{"userName":"","email":"x","extra":1}"#).decode::<Signup>().await.unwrap_err();
        assert!(matches!(err, Error::Binding(_)), "{err:?}");
    }

    #[tokio::test]
    async fn absent_field_is_required() {
        let err = post(r#"{"email":"a@b.c"}"#).decode::<Signup>().await.unwrap_err();
        match err {
            Error::Validation(v) => {
                let fields = v.field_errors();
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["userName"], "is required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_is_read_once() {
        let c = post(r#"{"userName":"a","email":"a@b"}"#);
        c.decode::<Signup>().await.unwrap();
        let err = c.decode::<Signup>().await.unwrap_err();
        assert!(matches!(err, Error::Binding(ref b) if b.message == "body must be valid JSON"));
    }

    #[test]
    fn decode_url_runs_the_same_pipeline() {
        #[derive(Deserialize)]
        struct Filter {
            #[serde(default)]
            ids: Vec<String>,
            name: String,
        }
        impl Validate for Filter {}

        let f: Filter = ctx("/?ids=1&ids=2&name=bob").decode_url().unwrap();
        assert_eq!(f.ids, vec!["1", "2"]);
        assert_eq!(f.name, "bob");
    }

    #[test]
    fn query_helpers() {
        let c = ctx("/items?page=3&flag=T&bad=x&name=%20bob%20");
        assert_eq!(c.query("name"), "bob");
        assert_eq!(c.query_int("page"), 3);
        assert_eq!(c.query_int("bad"), 0);
        assert!(c.query_bool("flag"));
        assert!(!c.query_bool("missing"));

        let err = c.query_int_or_error("missing").unwrap_err();
        assert!(matches!(err, Error::Domain(ref d) if d.message == "query parameter missing is missing"));
        assert!(matches!(c.query_bool_or_error("bad"), Err(Error::Domain(_))));
        assert_eq!(c.query_params()["page"], vec!["3"]);
        assert_eq!(c.uri(), "/items?page=3&flag=T&bad=x&name=%20bob%20");
    }

    #[test]
    fn path_helpers() {
        let (parts, body) = http::Request::get("/users/42/x")
            .body(boxed_body(Empty::new()))
            .unwrap()
            .into_parts();
        let params = vec![("id".to_owned(), "42".to_owned()), ("slug".to_owned(), "x".to_owned())];
        let c = Context::new(parts, body, params, RequestMeta::default());

        assert_eq!(c.path_id(), Some("42"));
        assert_eq!(c.path_int("id"), 42);
        assert_eq!(c.path_int_id("id").unwrap(), 42);
        assert_eq!(c.path_int("slug"), 0);
        let err = c.path_int_id("slug").unwrap_err();
        assert!(matches!(err, Error::Domain(ref d) if d.message == "invalid integer slug: x"));
    }

    #[test]
    fn remote_addr_prefers_proxy_headers_with_port() {
        let req = |headers: &[(&str, &str)]| {
            let mut b = http::Request::get("/");
            for (k, v) in headers {
                b = b.header(*k, *v);
            }
            let (parts, body) = b.body(boxed_body(Empty::new())).unwrap().into_parts();
            let meta = RequestMeta { peer: Some("10.0.0.9:5555".parse().unwrap()), ..Default::default() };
            Context::new(parts, body, Vec::new(), meta)
        };

        assert_eq!(
            req(&[("x-forwarded-for", " , 1.2.3.4, 5.6.7.8"), ("x-forwarded-port", "443")]).remote_addr(),
            "1.2.3.4:443"
        );
        assert_eq!(req(&[("x-real-ip", "9.9.9.9"), ("x-forwarded-port", "80")]).remote_addr(), "9.9.9.9:80");
        assert_eq!(req(&[("x-forwarded-for", "1.2.3.4")]).remote_addr(), "10.0.0.9:5555");
    }

    #[test]
    fn first_write_wins() {
        let c = ctx("/");
        c.created(&serde_json::json!({"id": 1})).unwrap();
        c.ok(&"ignored").unwrap();

        let res = c.take_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.body().as_ref(), br#"{"id":1}"#);
    }

    #[test]
    fn unwritten_response_is_empty_ok_with_headers() {
        let c = ctx("/");
        c.set_header("x-trace", "abc");
        c.set_cookie(&SetCookie::new("sid", "1"));
        c.set_cookie(&SetCookie::new("theme", "dark"));

        let res = c.take_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.body().is_empty());
        assert_eq!(res.headers()["x-trace"], "abc");
        assert_eq!(res.headers().get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn redirect_sets_location() {
        let c = ctx("/old");
        c.redirect("/new");
        let res = c.take_response();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[LOCATION], "/new");
    }

    #[test]
    fn cookies_from_request() {
        let c = Context::from_request(
            http::Request::get("/")
                .header(COOKIE, "a=1; b=2")
                .body(Empty::<Bytes>::new())
                .unwrap(),
        );
        assert_eq!(c.cookie("b").as_deref(), Some("2"));
        assert_eq!(c.cookies().len(), 2);
    }

    fn form_post(uri: &str, content_type: &str, body: impl Into<Bytes>) -> Context {
        Context::from_request(
            http::Request::post(uri)
                .header(CONTENT_TYPE, content_type)
                .body(Full::new(body.into()))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn form_value_prefers_the_body_over_the_query() {
        let c = form_post("/?name=query&page=2", "application/x-www-form-urlencoded", "name=body&tag=a&tag=b");
        assert_eq!(c.form_value("name").await.unwrap(), "body");
        assert_eq!(c.form_value("page").await.unwrap(), "2");
        assert_eq!(c.form_value("missing").await.unwrap(), "");
        assert_eq!(c.form().await.unwrap().values("tag"), ["a", "b"]);
    }

    #[tokio::test]
    async fn form_ignores_other_bodies() {
        let c = form_post("/?name=q", "application/json", r#"{"name":"json"}"#);
        assert!(c.form().await.unwrap().is_empty());
        assert_eq!(c.form_value("name").await.unwrap(), "q");
    }

    #[tokio::test]
    async fn oversized_form_is_a_binding_error() {
        let big = format!("a={}", "x".repeat(MAX_BODY_BYTES));
        let c = form_post("/", "application/x-www-form-urlencoded", big);
        let err = c.form_value("a").await.unwrap_err();
        assert!(matches!(err, Error::Binding(ref b) if b.message == "body must not exceed 1048576 bytes"), "{err:?}");
    }

    #[tokio::test]
    async fn multipart_reads_fields_and_files() {
        let body = "--B\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhi\r\n\
                    --B\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\r\nabc\r\n\
                    --B--\r\n";
        let c = form_post("/", "multipart/form-data; boundary=B", body);

        let form = c.multipart().await.unwrap();
        assert_eq!(form.value("title"), Some("hi"));
        assert_eq!(form.file("doc").unwrap().data.as_ref(), b"abc");
        assert_eq!(c.form_value("title").await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn multipart_requires_a_multipart_body() {
        let c = form_post("/", "application/x-www-form-urlencoded", "a=1");
        let err = c.multipart().await.unwrap_err();
        assert!(
            matches!(err, Error::Binding(ref b) if b.message == "request Content-Type isn't multipart/form-data"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn cancelled_follows_the_shutdown_signal() {
        let (tx, rx) = watch::channel(false);
        let (parts, body) = http::Request::get("/").body(boxed_body(Empty::new())).unwrap().into_parts();
        let c = Context::new(parts, body, Vec::new(), RequestMeta { shutdown: Some(rx), ..Default::default() });

        assert!(!c.is_cancelled());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), c.cancelled()).await.unwrap();
        assert!(c.is_cancelled());
    }
}
