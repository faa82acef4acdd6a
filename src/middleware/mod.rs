//! Built-in middleware.
//!
//! Middleware is any `Fn(BoxedHandler) -> BoxedHandler`. Register it with
//! [`Router::middleware`](crate::Router::middleware); the first one
//! registered runs first on the way in and last on the way out.
//!
//! - [`trace`]: one log line per request with method, uri, request id and
//!   latency.
//! - [`cors`]: cross-origin policy. The router applies it around routing, so
//!   it is configured through [`Config::allowed_origins`](crate::Config)
//!   rather than registered here.

pub mod cors;

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::handler::{self, BoxedHandler};

/// Logs every request once it completes.
///
/// ```rust
/// use kiln::{middleware, Router};
///
/// let app = Router::new().middleware(middleware::trace);
/// ```
pub fn trace(next: BoxedHandler) -> BoxedHandler {
    handler::from_fn(move |ctx| {
        let next = next.clone();
        async move {
            let start = Instant::now();
            debug!(request_id = %ctx.request_id(), method = %ctx.method(), uri = ctx.uri(), "request started");

            let result = next.call(ctx.clone()).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(()) => info!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    uri = ctx.uri(),
                    latency_ms,
                    "request completed"
                ),
                Err(e) => warn!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    uri = ctx.uri(),
                    latency_ms,
                    error = %e,
                    "request returned an error"
                ),
            }
            result
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Error;
    use crate::handler::Handler;
    use bytes::Bytes;
    use http_body_util::Empty;

    async fn created(ctx: Context) -> Result<(), Error> {
        ctx.created(&"x")
    }

    async fn failing(_ctx: Context) -> Result<(), Error> {
        Err(crate::not_found!("nothing here"))
    }

    fn ctx() -> Context {
        Context::from_request(http::Request::get("/t").body(Empty::<Bytes>::new()).unwrap())
    }

    #[tokio::test]
    async fn trace_is_transparent() {
        let c = ctx();
        trace(created.into_boxed_handler()).call(c.clone()).await.unwrap();
        assert_eq!(c.take_response().status(), http::StatusCode::CREATED);

        let err = trace(failing.into_boxed_handler()).call(ctx()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
