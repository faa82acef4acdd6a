//! Per-request panic containment.
//!
//! The handler chain runs inside [`run`]. A panic anywhere in it unwinds to
//! here instead of killing the connection task, and comes back as a
//! [`PanicReport`] with the message, location and a backtrace.
//!
//! The backtrace has to be taken while the panicking frame is still on the
//! stack, which only a panic hook can do. [`install_hook`] adds one (once per
//! process) that captures panics raised while a request is being polled and
//! forwards every other panic to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context as TaskContext, Poll};

use futures_util::FutureExt;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};

thread_local! {
    static IN_BOUNDARY: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// What is known about a recovered panic.
#[derive(Clone, Debug)]
pub struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: Option<String>,
}

impl PanicReport {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self { message: payload_message(payload), location: None, backtrace: None }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Installs the capturing panic hook. Idempotent.
pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if IN_BOUNDARY.with(Cell::get) {
                let report = PanicReport {
                    message: payload_message(info.payload()),
                    location: info.location().map(ToString::to_string),
                    backtrace: Some(Backtrace::force_capture().to_string()),
                };
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `handler` with `ctx`, converting a panic into `Err(PanicReport)`.
pub(crate) async fn run(handler: BoxedHandler, ctx: Context) -> Result<Result<(), Error>, PanicReport> {
    let chain = Boundary(Box::pin(async move { handler.call(ctx).await }));

    match AssertUnwindSafe(chain).catch_unwind().await {
        Ok(result) => Ok(result),
        Err(payload) => Err(CAPTURED
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| PanicReport::from_payload(&*payload))),
    }
}

/// Marks the current thread as "inside a request" for the duration of each
/// poll.
struct Boundary(BoxFuture);

impl Future for Boundary {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let _guard = BoundaryGuard::enter();
        self.0.as_mut().poll(cx)
    }
}

struct BoundaryGuard(bool);

impl BoundaryGuard {
    fn enter() -> Self {
        CAPTURED.with(|slot| slot.borrow_mut().take());
        Self(IN_BOUNDARY.with(|flag| flag.replace(true)))
    }
}

impl Drop for BoundaryGuard {
    fn drop(&mut self) {
        IN_BOUNDARY.with(|flag| flag.set(self.0));
    }
}
