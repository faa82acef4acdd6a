//! Query-string decoding with weak typing.
//!
//! Repeated keys stay a list, single keys collapse to a scalar. Values are
//! coerced on demand: `"42"` becomes a number, `"true"`/`"1"`/`"t"` a bool, a
//! lone value becomes a one-element list. Field names come from the target's
//! serde names (`#[serde(rename = "...")]` where they differ).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::value::{StrDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor,
};
use serde::forward_to_deserialize_any;

use super::BindingError;
use crate::error::Error;
use crate::validate::ValidationError;

/// One flattened query parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

/// Groups a raw query string by key, keeping first-appearance order.
pub fn flatten_query(query: &str) -> Vec<(String, QueryValue)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match index.get(key.as_ref()) {
            Some(&i) => grouped[i].1.push(value.into_owned()),
            None => {
                index.insert(key.to_string(), grouped.len());
                grouped.push((key.into_owned(), vec![value.into_owned()]));
            }
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                QueryValue::One(values.remove(0))
            } else {
                QueryValue::Many(values)
            };
            (key, value)
        })
        .collect()
}

/// Decodes a raw query string (without the leading `?`) into `T`.
///
/// An absent field with no default is a `required` validation error.
/// Anything else that fails is a [`BindingError`] with one entry per field.
pub fn decode_query<T: DeserializeOwned>(query: &str) -> Result<T, Error> {
    T::deserialize(QueryDeserializer(flatten_query(query))).map_err(|e| match e {
        QueryError { missing: true, field: Some(field), .. } => ValidationError::missing(field).into(),
        e => BindingError::with_errors("Query Params Decoding Failed", field_errors(&e.to_string())).into(),
    })
}

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']+)'").expect("static regex"));

/// Splits decoder messages into `field → explanation`. The field is the first
/// single-quoted token of each line.
fn field_errors(message: &str) -> BTreeMap<String, String> {
    message
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match QUOTED.captures(line) {
            Some(caps) => {
                let field = caps[1].to_owned();
                let rest = line.replacen(&caps[0], "", 1).trim().to_owned();
                (field, rest)
            }
            None => ("query".to_owned(), line.trim().to_owned()),
        })
        .collect()
}

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct QueryError {
    field: Option<String>,
    message: String,
    missing: bool,
}

impl QueryError {
    fn unconvertible(ty: &str, value: &str) -> Self {
        de::Error::custom(format!("expected type '{ty}', got unconvertible value '{value}'"))
    }

    fn list(ty: &str, len: usize) -> Self {
        de::Error::custom(format!("expected type '{ty}', got a list of {len} values"))
    }

    /// Prefixes the field path with `segment` (a key or `[index]`).
    fn within(mut self, segment: &str) -> Self {
        self.field = Some(match self.field.take() {
            None => segment.to_owned(),
            Some(f) if f.starts_with('[') => format!("{segment}{f}"),
            Some(f) => format!("{segment}.{f}"),
        });
        self
    }
}

impl de::Error for QueryError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self { field: None, message: msg.to_string(), missing: false }
    }

    fn missing_field(field: &'static str) -> Self {
        Self { field: Some(field.to_owned()), message: "is required".to_owned(), missing: true }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "'{field}' {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for QueryError {}

// ── Top level: the parameter map ──────────────────────────────────────────────

struct QueryDeserializer(Vec<(String, QueryValue)>);

impl<'de> de::Deserializer<'de> for QueryDeserializer {
    type Error = QueryError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_map(ParamMap { iter: self.0.into_iter(), pending: None })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes byte_buf
        option unit unit_struct newtype_struct seq tuple tuple_struct map struct
        enum identifier ignored_any
    }
}

struct ParamMap {
    iter: std::vec::IntoIter<(String, QueryValue)>,
    pending: Option<(String, QueryValue)>,
}

fn key_deserializer(key: &str) -> StrDeserializer<'_, QueryError> {
    key.into_deserializer()
}

impl<'de> MapAccess<'de> for ParamMap {
    type Error = QueryError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, QueryError> {
        let Some((key, value)) = self.iter.next() else {
            return Ok(None);
        };
        let decoded = seed.deserialize(key_deserializer(&key))?;
        self.pending = Some((key, value));
        Ok(Some(decoded))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, QueryError> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| <QueryError as de::Error>::custom("value requested before key"))?;
        seed.deserialize(ValueDeserializer(value)).map_err(|e| e.within(&key))
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

struct ValueDeserializer(QueryValue);

impl ValueDeserializer {
    fn scalar(self, ty: &str) -> Result<String, QueryError> {
        match self.0 {
            QueryValue::One(s) => Ok(s),
            QueryValue::Many(values) => Err(QueryError::list(ty, values.len())),
        }
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn enum_access(s: String) -> StringDeserializer<QueryError> {
    s.into_deserializer()
}

macro_rules! weak_number {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
                let s = self.scalar(stringify!($ty))?;
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return visitor.$visit(<$ty>::default());
                }
                match trimmed.parse::<$ty>() {
                    Ok(n) => visitor.$visit(n),
                    Err(_) => Err(QueryError::unconvertible(stringify!($ty), &s)),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer {
    type Error = QueryError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        match self.0 {
            QueryValue::One(s) => visitor.visit_string(s),
            QueryValue::Many(values) => visitor.visit_seq(ValueSeq { iter: values.into_iter(), index: 0 }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        let s = self.scalar("bool")?;
        match parse_bool(s.trim()) {
            Some(b) => visitor.visit_bool(b),
            None => Err(QueryError::unconvertible("bool", &s)),
        }
    }

    weak_number! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        let s = self.scalar("char")?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(QueryError::unconvertible("char", &s)),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_string(self.scalar("string")?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_string(self.scalar("string")?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_byte_buf(self.scalar("bytes")?.into_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, QueryError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, QueryError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        let values = match self.0 {
            QueryValue::One(s) => vec![s],
            QueryValue::Many(values) => values,
        };
        visitor.visit_seq(ValueSeq { iter: values.into_iter(), index: 0 })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, QueryError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, QueryError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, QueryError> {
        Err(de::Error::custom("expected a nested map, which query parameters cannot carry"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, QueryError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, QueryError> {
        visitor.visit_enum(enum_access(self.scalar("enum")?))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, QueryError> {
        visitor.visit_unit()
    }
}

struct ValueSeq {
    iter: std::vec::IntoIter<String>,
    index: usize,
}

impl<'de> SeqAccess<'de> for ValueSeq {
    type Error = QueryError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, QueryError> {
        let Some(value) = self.iter.next() else {
            return Ok(None);
        };
        let index = self.index;
        self.index += 1;
        seed.deserialize(ValueDeserializer(QueryValue::One(value)))
            .map(Some)
            .map_err(|e| e.within(&format!("[{index}]")))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}
