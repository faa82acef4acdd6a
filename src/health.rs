//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust,no_run
//! use kiln::{Router, health};
//!
//! let app = Router::new()
//!     .handle("GET /healthz", health::liveness)
//!     .handle("GET /readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler if you need to gate on
//! dependency availability:
//!
//! ```rust,no_run
//! use kiln::{Context, Error};
//!
//! async fn readiness(ctx: Context) -> Result<(), Error> {
//!     if dependencies_are_healthy().await {
//!         ctx.ok(&serde_json::json!({ "status": "ready" }))
//!     } else {
//!         ctx.json(http::StatusCode::SERVICE_UNAVAILABLE, &serde_json::json!({ "status": "unavailable" }))
//!     }
//! }
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```
//!
//! While the server is draining, the built-in `readiness` answers `503` so
//! load balancers stop sending new requests.

use http::StatusCode;
use serde::Serialize;

use crate::context::Context;
use crate::error::Error;

#[derive(Serialize)]
struct Probe {
    status: &'static str,
}

/// Liveness probe. Always `200 {"status":"ok"}`: if the process can answer
/// HTTP at all, it is alive.
pub async fn liveness(ctx: Context) -> Result<(), Error> {
    ctx.ok(&Probe { status: "ok" })
}

/// Readiness probe. `200 {"status":"ready"}`, or
/// `503 {"status":"shutting down"}` once graceful shutdown has begun.
pub async fn readiness(ctx: Context) -> Result<(), Error> {
    if ctx.is_cancelled() {
        return ctx.json(StatusCode::SERVICE_UNAVAILABLE, &Probe { status: "shutting down" });
    }
    ctx.ok(&Probe { status: "ready" })
}
