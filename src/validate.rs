//! The validation boundary.
//!
//! kiln does not ship a rule engine. A decode target reports its own
//! violations through [`Validate`], each tagged with a rule name and
//! parameter (`required`, `min=3`, `oneof=a b c`, ...). The classifier turns
//! them into human-readable messages using a closed catalog.
//!
//! ```rust
//! use kiln::{FieldViolation, Validate, Violations};
//!
//! #[derive(serde::Deserialize)]
//! struct CreateUser {
//!     #[serde(rename = "userName")]
//!     user_name: String,
//! }
//!
//! impl Validate for CreateUser {
//!     const FIELD_NAMES: &'static [(&'static str, &'static str)] = &[("user_name", "userName")];
//!
//!     fn validate(&self) -> Result<(), Vec<FieldViolation>> {
//!         let mut v = Violations::new();
//!         if self.user_name.is_empty() {
//!             v.add("user_name", "required", "");
//!         }
//!         v.finish()
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::context::Context;

/// A single failed rule on a single field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Rust field name, e.g. `user_name`.
    pub field: String,
    /// Rule name, e.g. `min`.
    pub rule: String,
    /// Rule parameter, e.g. `3`. Empty when the rule takes none.
    pub param: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, rule: impl Into<String>, param: impl Into<String>) -> Self {
        Self { field: field.into(), rule: rule.into(), param: param.into() }
    }
}

/// Implemented by every type passed to [`Context::decode`] or
/// [`Context::decode_url`].
///
/// All items have defaults, so `impl Validate for T {}` opts a type in with
/// no rules and no normalisation.
pub trait Validate {
    /// Explicit `(rust_field, wire_name)` table used when naming fields in
    /// error responses. Fields not listed fall back to their lowercased name.
    const FIELD_NAMES: &'static [(&'static str, &'static str)] = &[];

    /// Optional clean-up hook (trimming, casing) run after decoding and
    /// before [`validate`](Validate::validate).
    fn normalize(&mut self, _ctx: &Context) {}

    /// Returns every violated rule, in declaration order.
    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        Ok(())
    }
}

/// Collects violations and converts them into the result [`Validate`] wants.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, rule: &str, param: &str) -> &mut Self {
        self.0.push(FieldViolation::new(field, rule, param));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> Result<(), Vec<FieldViolation>> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}

/// Ordered violations for one decoded value, plus the field-name table of its
/// type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
    names: &'static [(&'static str, &'static str)],
    verbatim: bool,
}

impl ValidationError {
    pub fn new(
        violations: Vec<FieldViolation>,
        names: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { violations, names, verbatim: false }
    }

    /// A `required` violation for a field absent from the input. `field` is
    /// already the wire name and is reported unchanged.
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, "required", "")],
            names: &[],
            verbatim: true,
        }
    }

    /// Builds the error for type `T`, picking up its field-name table.
    pub fn of<T: Validate>(violations: Vec<FieldViolation>) -> Self {
        Self::new(violations, T::FIELD_NAMES)
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Renders `wire_name → message` for the response body. When a field
    /// fails several rules the last one wins.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        self.violations
            .iter()
            .map(|v| (self.wire_name(&v.field), rule_message(&v.rule, &v.param)))
            .collect()
    }

    fn wire_name(&self, field: &str) -> String {
        if self.verbatim {
            return field.to_owned();
        }
        self.names
            .iter()
            .find(|(rust, _)| *rust == field)
            .map(|(_, wire)| (*wire).to_owned())
            .unwrap_or_else(|| field.to_lowercase())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed:")?;
        for v in &self.violations {
            write!(f, " {}({}={})", v.field, v.rule, v.param)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Message template for a rule name. Unknown rules read "is invalid".
pub fn rule_message(rule: &str, param: &str) -> String {
    match rule {
        "required" => "is required".to_owned(),
        "email" => "must be a valid email address".to_owned(),
        "min" => format!("must be at least {param} characters"),
        "max" => format!("cannot be more than {param} characters"),
        "len" => format!("must be exactly {param} characters"),
        "gte" => format!("must be greater than or equal to {param}"),
        "lte" => format!("must be less than or equal to {param}"),
        "gt" | "gtfield" => format!("must be greater than {param}"),
        "lt" | "ltfield" => format!("must be less than {param}"),
        "eq" | "eqfield" => format!("must be equal to {param}"),
        "nefield" => format!("must not be equal to {param}"),
        "eqcsfield" => format!("must be equal to the related field {param}"),
        "gtcsfield" => format!("must be greater than the related field {param}"),
        "ltcsfield" => format!("must be less than the related field {param}"),
        "oneof" => format!("must be one of: [{}]", param.split_whitespace().collect::<Vec<_>>().join(",")),
        "uuid" => "must be a valid UUID".to_owned(),
        "uuid3" | "uuid4" | "uuid5" => "must be a valid UUID v3, v4, or v5".to_owned(),
        "alpha" => "must contain only alphabetic characters".to_owned(),
        "alphanum" => "must contain only alphanumeric characters".to_owned(),
        "alphaunicode" => "must contain only unicode alphabetic characters".to_owned(),
        "alphanumunicode" => "must contain only unicode alphanumeric characters".to_owned(),
        "ascii" => "must contain only ASCII characters".to_owned(),
        "numeric" => "must be a numeric value".to_owned(),
        "lowercase" => "must be lowercase".to_owned(),
        "uppercase" => "must be uppercase".to_owned(),
        "contains" => "must contain the specified characters".to_owned(),
        "containsany" => "must contain any of the specified characters".to_owned(),
        "url" => "must be a valid URL".to_owned(),
        "ip" => "must be a valid IP address".to_owned(),
        "ipv4" | "ip4_addr" => "must be a valid IPv4 address".to_owned(),
        "ipv6" | "ip6_addr" => "must be a valid IPv6 address".to_owned(),
        "cidr" => "must be a valid CIDR address".to_owned(),
        "cidrv4" => "must be a valid CIDR IPv4 address".to_owned(),
        "cidrv6" => "must be a valid CIDR IPv6 address".to_owned(),
        "hostname" => "must be a valid hostname".to_owned(),
        "hostname_port" => "must be a valid Host:Port".to_owned(),
        "mac" => "must be a valid MAC address".to_owned(),
        "datetime" => "must be a valid datetime".to_owned(),
        "base64" => "must be a valid Base64 encoded string".to_owned(),
        "json" => "must be a valid JSON string".to_owned(),
        "credit_card" => "must be a valid credit card number".to_owned(),
        "dir" => "must be an existing directory".to_owned(),
        "file" => "must be an existing file".to_owned(),
        "image" => "must be a valid image file".to_owned(),
        "unique" => "must be unique".to_owned(),
        _ => "is invalid".to_owned(),
    }
}
