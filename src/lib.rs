//! # kiln
//!
//! The request-handling core of a JSON HTTP service: routing, middleware,
//! typed body and query decoding with validation, one error envelope for
//! every failure, and graceful shutdown.
//!
//! ## The contract
//!
//! Handlers write successes and return failures. The router is the single
//! place that turns a failure into a response, so every error a client sees
//! has the same shape:
//!
//! ```text
//! { "status": 400, "error": "VALIDATION_ERROR", "message": "Invalid Request",
//!   "errors": { "email": "must be a valid email address" } }
//! ```
//!
//! - **Decode errors** (`DECODE_ERROR`, 400): malformed or oversized bodies,
//!   unknown fields, query strings that do not fit the target type.
//! - **Validation errors** (`VALIDATION_ERROR`, 400): per-field rule
//!   violations reported by [`Validate`], and required fields missing from
//!   the body or query.
//! - **Domain errors** (`DOMAIN_ERROR`, 400, or 404 for [`NotFoundError`]).
//! - **Everything else**, panics included (`INTERNAL_ERROR`, 500): the cause
//!   is logged, never sent.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kiln::{Config, Context, Error, Router, Validate, Violations, FieldViolation};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! impl Validate for NewUser {
//!     fn normalize(&mut self, _ctx: &Context) {
//!         self.name = self.name.trim().to_owned();
//!     }
//!
//!     fn validate(&self) -> Result<(), Vec<FieldViolation>> {
//!         let mut v = Violations::new();
//!         if self.name.is_empty() {
//!             v.add("name", "required", "");
//!         }
//!         v.finish()
//!     }
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     kiln::logging::init(&kiln::logging::LogConfig::from_env())?;
//!     kiln::config::load_env_files()?;
//!
//!     let app = Router::new()
//!         .middleware(kiln::middleware::trace)
//!         .handle("GET /users/{id}", get_user)
//!         .handle("POST /users", create_user);
//!
//!     app.serve(Config::from_env()?).await?;
//!     Ok(())
//! }
//!
//! async fn get_user(ctx: Context) -> Result<(), Error> {
//!     let id = ctx.path_int_id("id")?;
//!     if id != 1 {
//!         return Err(kiln::not_found!("user {id} not found"));
//!     }
//!     ctx.ok(&User { id, name: "ada".into() })
//! }
//!
//! async fn create_user(ctx: Context) -> Result<(), Error> {
//!     let new: NewUser = ctx.decode().await?;
//!     ctx.created(&User { id: 2, name: new.name })
//! }
//! ```

mod bind;
mod classify;
mod context;
mod cookie;
mod error;
mod recover;
mod response;
mod router;
mod server;
mod validate;

pub mod config;
pub mod docs;
pub mod handler;
pub mod health;
pub mod logging;
pub mod middleware;

pub use bind::{BindingError, Form, FormFile, MAX_BODY_BYTES, QueryValue, decode_json, decode_query, flatten_query};
pub use classify::{ErrorKind, ErrorResponse, classify};
pub use config::Config;
pub use context::{BoxError, Context, RequestBody};
pub use cookie::{Cookies, SameSite, SetCookie};
pub use error::{ConfigError, DomainError, Error, NotFoundError, ServerError};
pub use handler::{Handler, Middleware};
pub use recover::PanicReport;
pub use response::Response;
pub use router::Router;
pub use server::{Server, State};
pub use validate::{FieldViolation, Validate, ValidationError, Violations, rule_message};
