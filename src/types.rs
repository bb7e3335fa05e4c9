use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// Reuse the same enum across backends so helper functions do not need to branch on driver
/// types:
/// ```rust
/// use singlestoredb::prelude::*;
///
/// let params = vec![
///     Value::Int(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer value (64-bit)
    Int(i64),
    /// Unsigned integer value that does not fit in an `i64`
    UInt(u64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Exact decimal value
    Decimal(Decimal),
    /// Text/string value
    Text(String),
    /// Binary data, also the shape of undecoded wire values
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day or interval; may be negative or exceed 24 hours
    Time(TimeDelta),
    /// Date and time without a zone
    DateTime(NaiveDateTime),
    /// JSON document
    Json(JsonValue),
    /// Members of a SQL SET
    Set(BTreeSet<String>),
    /// Vector column value
    Vector(Vector),
}

/// Element-typed vector values.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl Vector {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Vector::F32(v) => v.len(),
            Vector::F64(v) => v.len(),
            Vector::I8(v) => v.len(),
            Vector::I16(v) => v.len(),
            Vector::I32(v) => v.len(),
            Vector::I64(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON array rendering, as used when sending a vector as a parameter.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Vector::F32(v) => JsonValue::from(v.iter().map(|x| f64::from(*x)).collect::<Vec<_>>()),
            Vector::F64(v) => JsonValue::from(v.clone()),
            Vector::I8(v) => JsonValue::from(v.clone()),
            Vector::I16(v) => JsonValue::from(v.clone()),
            Vector::I32(v) => JsonValue::from(v.clone()),
            Vector::I64(v) => JsonValue::from(v.clone()),
        }
    }
}

impl Value {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        if let Value::Decimal(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<TimeDelta> {
        match self {
            Value::Time(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Value::Set(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Value::Vector(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the textual content of a raw wire value, if it has one.
    ///
    /// Raw values arrive either as `Text` or as undecoded `Bytes`; both forms are accepted.
    #[must_use]
    pub fn raw_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(std::borrow::Cow::Borrowed(s.as_str())),
            Value::Bytes(b) => std::str::from_utf8(b).ok().map(std::borrow::Cow::Borrowed),
            _ => None,
        }
    }

    /// Text rendering used by backends that only accept textual parameters.
    #[must_use]
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::UInt(u) => Some(u.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(format_time_delta(*t)),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Json(j) => Some(j.to_string()),
            Value::Set(members) => Some(members.iter().cloned().collect::<Vec<_>>().join(",")),
            Value::Vector(v) => Some(v.to_json().to_string()),
        }
    }
}

/// Render a `TimeDelta` in the `[-]HHH:MM:SS[.ffffff]` form MySQL uses for TIME.
#[must_use]
pub fn format_time_delta(delta: TimeDelta) -> String {
    let negative = delta < TimeDelta::zero();
    let abs = delta.abs();
    let total_secs = abs.num_seconds();
    let micros = abs.subsec_nanos() / 1_000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let sign = if negative { "-" } else { "" };
    if micros == 0 {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Statement parameters, either named (`:name`) or positional (`:1`, `:2`, ...).
///
/// ```rust
/// use singlestoredb::prelude::*;
///
/// let positional = Params::from(vec![Value::Int(1), Value::from("x")]);
/// let named = Params::named([("id", Value::Int(1))]);
/// assert!(!positional.is_empty());
/// assert!(!named.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Named(HashMap<String, Value>),
    Positional(Vec<Value>),
}

impl Params {
    /// Build named parameters from key/value pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Named(map) => map.is_empty(),
            Params::Positional(values) => values.is_empty(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Params::Named(map) => map.len(),
            Params::Positional(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_named(&self) -> bool {
        matches!(self, Params::Named(_))
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(map: HashMap<String, Value>) -> Self {
        Params::Named(map)
    }
}
