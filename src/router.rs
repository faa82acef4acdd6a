//! Radix-tree request router.
//!
//! One tree per HTTP method plus one for method-less patterns. O(path-length)
//! lookup. Routes and middleware are registered on a [`Router`], which is
//! consumed when served: there is no way to add a route to a running server.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::classify::{self, ErrorResponse};
use crate::config::Config;
use crate::context::{Context, RequestBody, RequestMeta};
use crate::error::{NotFoundError, ServerError};
use crate::handler::{BoxedHandler, Handler, Middleware};
use crate::middleware::cors::Cors;
use crate::recover;
use crate::response::Response;
use crate::server::Server;

/// The application router.
///
/// Each registration returns `self` so calls chain:
///
/// ```rust,no_run
/// # use kiln::{Context, Error, Router};
/// # async fn list_users(_: Context) -> Result<(), Error> { Ok(()) }
/// # async fn get_user(_: Context) -> Result<(), Error> { Ok(()) }
/// # async fn ping(_: Context) -> Result<(), Error> { Ok(()) }
/// let app = Router::new()
///     .middleware(kiln::middleware::trace)
///     .handle("GET /users", list_users)
///     .handle("GET /users/{id}", get_user)
///     .handle("/ping", ping);
/// ```
pub struct Router {
    trees: HashMap<Method, MatchitRouter<usize>>,
    any: MatchitRouter<usize>,
    handlers: Vec<BoxedHandler>,
    patterns: HashMap<String, usize>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            any: MatchitRouter::new(),
            handlers: Vec::new(),
            patterns: HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Registers `handler` for `pattern`.
    ///
    /// A pattern is `"METHOD /path"` or `"/path"` (any method). Path segments
    /// in braces capture a parameter: `/users/{id}`, and `{*rest}` captures
    /// the remainder.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is already registered, is malformed, or conflicts
    /// with an existing route. These are programming errors and surface at
    /// startup, never at request time.
    pub fn handle(mut self, pattern: &str, handler: impl Handler) -> Self {
        let (method, path) = parse_pattern(pattern);
        let key = match &method {
            Some(m) => format!("{m} {path}"),
            None => path.to_owned(),
        };

        if self.patterns.contains_key(&key) {
            error!(pattern = %key, "handler already exists");
            panic!("kiln: handler already exists for pattern `{key}`");
        }

        let index = self.handlers.len();
        let tree = match method {
            Some(m) => self.trees.entry(m).or_insert_with(MatchitRouter::new),
            None => &mut self.any,
        };
        if let Err(e) = tree.insert(path, index) {
            error!(pattern = %key, error = %e, "invalid route");
            panic!("kiln: invalid route `{key}`: {e}");
        }

        self.handlers.push(handler.into_boxed_handler());
        self.patterns.insert(key, index);
        self
    }

    /// Registers `handler` for `method` and `path`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.handle(&format!("{method} {path}"), handler)
    }

    /// Adds middleware applied to every route. The first one added is the
    /// outermost: it runs first on the way in and last on the way out.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Serves this router with `config` until a shutdown signal arrives.
    /// Shorthand for [`Server::new(config).serve(router)`](Server::serve).
    pub async fn serve(self, config: Config) -> Result<(), ServerError> {
        Server::new(config).serve(self).await
    }

    /// Freezes the routing table, wrapping every handler in the middleware
    /// chain.
    pub(crate) fn compile(self, config: &Config) -> App {
        let middleware = self.middleware;
        let handlers = self
            .handlers
            .into_iter()
            .map(|h| middleware.iter().rev().fold(h, |next, mw| mw.wrap(next)))
            .collect();

        App {
            trees: self.trees,
            any: self.any,
            handlers,
            cors: Cors::new(&config.allowed_origins),
            body_timeout: config.read_timeout(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `"GET /path"` into its method and path.
fn parse_pattern(pattern: &str) -> (Option<Method>, &str) {
    let pattern = pattern.trim();
    let (method, path) = match pattern.split_once(char::is_whitespace) {
        Some((m, p)) => {
            let method = Method::from_bytes(m.as_bytes()).unwrap_or_else(|e| {
                error!(pattern, "invalid method in route pattern");
                panic!("kiln: invalid method in pattern `{pattern}`: {e}")
            });
            (Some(method), p.trim_start())
        }
        None => (None, pattern),
    };

    if !path.starts_with('/') {
        error!(pattern, "route path must start with '/'");
        panic!("kiln: route path must start with '/' in pattern `{pattern}`");
    }
    (method, path)
}

// ── Compiled application ──────────────────────────────────────────────────────

/// A frozen router: lookup tables plus fully wrapped handlers. Shared
/// read-only by every connection.
pub(crate) struct App {
    trees: HashMap<Method, MatchitRouter<usize>>,
    any: MatchitRouter<usize>,
    handlers: Vec<BoxedHandler>,
    cors: Cors,
    body_timeout: Option<std::time::Duration>,
}

impl App {
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, Vec<(String, String)>)> {
        let in_tree = |tree: &MatchitRouter<usize>| {
            tree.at(path).ok().map(|m| {
                let params = m.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
                (Arc::clone(&self.handlers[*m.value]), params)
            })
        };

        self.trees
            .get(method)
            .and_then(in_tree)
            .or_else(|| {
                // HEAD is served by GET routes when it has none of its own.
                (*method == Method::HEAD)
                    .then(|| self.trees.get(&Method::GET).and_then(in_tree))
                    .flatten()
            })
            .or_else(|| in_tree(&self.any))
    }

    /// Routes one request and produces its response. Never fails: every error
    /// and panic becomes a response.
    pub(crate) async fn dispatch(&self, req: http::Request<RequestBody>, meta: RequestMeta) -> Response {
        let (parts, body) = req.into_parts();

        if let Some(preflight) = self.cors.preflight(&parts.method, &parts.headers) {
            return preflight;
        }

        let meta = RequestMeta { body_timeout: self.body_timeout, ..meta };
        let route = self.lookup(&parts.method, parts.uri.path());
        let (handler, params) = match route {
            Some((h, p)) => (Some(h), p),
            None => (None, Vec::new()),
        };
        let ctx = Context::new(parts, body, params, meta);

        match handler {
            Some(handler) => match recover::run(handler, ctx.clone()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => classify::respond(&ctx, &e),
                Err(panic) => {
                    error!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        uri = ctx.uri(),
                        panic = %panic.message,
                        location = panic.location.as_deref().unwrap_or("unknown"),
                        backtrace = panic.backtrace.as_deref().unwrap_or(""),
                        "panic in request handler"
                    );
                    let body = ErrorResponse::internal();
                    if ctx.json(StatusCode::INTERNAL_SERVER_ERROR, &body).is_err() {
                        ctx.write(Response::new(StatusCode::INTERNAL_SERVER_ERROR));
                    }
                }
            },
            None => {
                let err = NotFoundError::new(format!("no route matches {} {}", ctx.method(), ctx.path()));
                classify::respond(&ctx, &err.into());
            }
        }

        let mut res = ctx.take_response();
        self.cors.decorate(ctx.method(), ctx.headers(), &mut res);
        res
    }
}
