//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one table, so each is
//! hidden behind a trait object (`dyn ErasedHandler`). Middleware works on the
//! same erased form: it takes a [`BoxedHandler`] and returns another one.
//!
//! ```text
//! async fn get_user(ctx: Context) -> Result<(), Error>  ← user writes this
//!        ↓ router.handle("GET /users/{id}", get_user)
//! get_user.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                          ← stored as BoxedHandler
//!        ↓ wrapped by every middleware at compile time
//! handler.call(ctx)  at request time                     ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

// ── Erased types ──────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler future.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

/// Object-safe dispatch interface behind [`BoxedHandler`].
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// A handler-to-handler transform, applied to every route.
///
/// Implemented for any `Fn(BoxedHandler) -> BoxedHandler`.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function with
/// the signature:
///
/// ```text
/// async fn name(ctx: Context) -> Result<(), kiln::Error>
/// ```
///
/// A handler writes its response through the [`Context`] and returns
/// `Ok(())`, or returns an error and lets the router answer for it.
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Boxes a closure as a handler. This is how middleware builds the handler
/// it returns:
///
/// ```rust
/// use kiln::handler::{self, BoxedHandler};
///
/// fn require_user(next: BoxedHandler) -> BoxedHandler {
///     handler::from_fn(move |ctx| {
///         let next = next.clone();
///         async move {
///             if ctx.header("x-user").is_none() {
///                 return Err(kiln::domain_err!("missing user"));
///             }
///             next.call(ctx).await
///         }
///     })
/// }
/// ```
pub fn from_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.0)(ctx))
    }
}
