//! Minimal kiln service: JSON CRUD endpoints, validation, health checks and
//! API docs.
//!
//! Run with:
//!   HTTP_PORT=3000 LOG_LEVEL=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/1
//!   curl http://localhost:3000/users/7              # 404 envelope
//!   curl 'http://localhost:3000/users?limit=5&role=admin&role=dev'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"userName":"  alice ","email":"alice@example.com"}'
//!   curl -X POST http://localhost:3000/users -d '{"userName":""}'   # validation envelope
//!   curl http://localhost:3000/healthz

use kiln::{Config, Context, Error, FieldViolation, Router, Validate, Violations, docs, health, middleware};
use serde::{Deserialize, Serialize};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiln::config::load_env_files()?;
    kiln::logging::init(&kiln::logging::LogConfig::from_env())?;

    let app = Router::new()
        .middleware(middleware::trace)
        .handle("GET /users", list_users)
        .handle("GET /users/{id}", get_user)
        .handle("POST /users", create_user)
        .handle("DELETE /users/{id}", delete_user)
        .handle("GET /healthz", health::liveness)
        .handle("GET /readyz", health::readiness)
        .handle("GET /docs", docs::api_reference("/openapi.yaml", "Users API"));

    app.serve(Config::from_env()?).await?;
    Ok(())
}

#[derive(Serialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct ListUsers {
    limit: Option<u32>,
    #[serde(default)]
    role: Vec<String>,
}

impl Validate for ListUsers {
    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        let mut v = Violations::new();
        if self.limit.is_some_and(|l| l > 100) {
            v.add("limit", "max", "100");
        }
        v.finish()
    }
}

async fn list_users(ctx: Context) -> Result<(), Error> {
    let q: ListUsers = ctx.decode_url()?;
    let users: Vec<User> = (1..=i64::from(q.limit.unwrap_or(2)))
        .map(|id| User { id, name: format!("user-{id} ({})", q.role.join(",")) })
        .collect();
    ctx.ok(&users)
}

async fn get_user(ctx: Context) -> Result<(), Error> {
    let id = ctx.path_int_id("id")?;
    if id != 1 {
        return Err(kiln::not_found!("user {id} not found"));
    }
    ctx.ok(&User { id, name: "alice".into() })
}

#[derive(Deserialize)]
struct CreateUser {
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(default)]
    email: String,
}

impl Validate for CreateUser {
    const FIELD_NAMES: &'static [(&'static str, &'static str)] = &[("user_name", "userName")];

    fn normalize(&mut self, _ctx: &Context) {
        self.user_name = self.user_name.trim().to_owned();
        self.email = self.email.trim().to_lowercase();
    }

    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        let mut v = Violations::new();
        if self.user_name.is_empty() {
            v.add("user_name", "required", "");
        } else if self.user_name.chars().count() < 3 {
            v.add("user_name", "min", "3");
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            v.add("email", "email", "");
        }
        v.finish()
    }
}

async fn create_user(ctx: Context) -> Result<(), Error> {
    let input: CreateUser = ctx.decode().await?;
    ctx.set_header("location", "/users/99");
    ctx.created(&User { id: 99, name: input.user_name })
}

async fn delete_user(ctx: Context) -> Result<(), Error> {
    let id = ctx.path_int_id("id")?;
    ctx.ok(&serde_json::json!({ "deleted": id }))
}
