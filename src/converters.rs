//! Value converters keyed by wire type code.
//!
//! A converter table maps type codes to [`Pipeline`]s. Backends supply the defaults
//! ([`default_converters`]); callers may layer overrides on top with [`merge_converters`],
//! in which case the override runs on the default's output.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;

use crate::error::DbError;
use crate::field_type::{self, flags};
use crate::types::{Value, Vector};

/// A single value transform.
pub type ConvertFn = Arc<dyn Fn(Value) -> Result<Value, DbError> + Send + Sync>;

/// An ordered list of transforms applied to one value, first to last.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<ConvertFn>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline with one step.
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, DbError> + Send + Sync + 'static,
    {
        Self {
            steps: vec![Arc::new(f)],
        }
    }

    /// Append a step that runs on the output of the existing ones.
    #[must_use]
    pub fn then(mut self, step: ConvertFn) -> Self {
        self.steps.push(step);
        self
    }

    /// Append every step of `other` after the existing ones.
    #[must_use]
    pub fn chain(mut self, other: &Pipeline) -> Self {
        self.steps.extend(other.steps.iter().cloned());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the value through every step.
    ///
    /// # Errors
    ///
    /// Returns the first error a step reports.
    pub fn apply(&self, value: Value) -> Result<Value, DbError> {
        self.steps.iter().try_fold(value, |acc, step| step(acc))
    }
}

/// Converter pipelines keyed by wire type code.
#[derive(Debug, Clone, Default)]
pub struct ConverterTable {
    map: HashMap<u16, Pipeline>,
}

impl ConverterTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the pipeline for a type code.
    pub fn insert(&mut self, code: u16, pipeline: Pipeline) {
        self.map.insert(code, pipeline);
    }

    /// Register a single-function converter for a type code.
    pub fn insert_fn<F>(&mut self, code: u16, f: F)
    where
        F: Fn(Value) -> Result<Value, DbError> + Send + Sync + 'static,
    {
        self.map.insert(code, Pipeline::single(f));
    }

    #[must_use]
    pub fn get(&self, code: u16) -> Option<&Pipeline> {
        self.map.get(&code)
    }

    #[must_use]
    pub fn contains(&self, code: u16) -> bool {
        self.map.contains_key(&code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u16, &Pipeline)> {
        self.map.iter()
    }

    /// Pick the pipeline for a column.
    ///
    /// A column carrying the SET flag always uses the ENUM/SET converter, whatever
    /// its stated type code.
    #[must_use]
    pub fn for_column(&self, type_code: u16, column_flags: Option<u32>) -> Option<&Pipeline> {
        if column_flags.is_some_and(|f| f & flags::SET != 0) {
            self.get(field_type::ENUM)
        } else {
            self.get(type_code)
        }
    }
}

/// Layer caller overrides on top of default converters.
///
/// When both sides define a code, the result runs the default first and the override
/// on its output.
#[must_use]
pub fn merge_converters(overrides: &ConverterTable, defaults: &ConverterTable) -> ConverterTable {
    let mut out = defaults.clone();
    for (code, conv) in overrides.iter() {
        let merged = match out.map.remove(code) {
            Some(existing) => existing.chain(conv),
            None => conv.clone(),
        };
        out.map.insert(*code, merged);
    }
    out
}

/// Apply per-column converters to one raw row, in place.
///
/// Columns without a converter pass through unchanged.
///
/// # Errors
///
/// Returns `DbError::Data` when a converter rejects a value.
pub fn convert_row(row: &mut [Value], converters: &[(usize, Pipeline)]) -> Result<(), DbError> {
    for (idx, conv) in converters {
        if let Some(slot) = row.get_mut(*idx) {
            if slot.is_null() {
                continue;
            }
            let raw = std::mem::replace(slot, Value::Null);
            *slot = conv.apply(raw)?;
        }
    }
    Ok(())
}

/// Apply per-column converters to a batch of rows.
///
/// # Errors
///
/// Returns `DbError::Data` when a converter rejects a value.
pub fn convert_rows(
    rows: &mut [Vec<Value>],
    converters: &[(usize, Pipeline)],
) -> Result<(), DbError> {
    if converters.is_empty() {
        return Ok(());
    }
    for row in rows.iter_mut() {
        convert_row(row, converters)?;
    }
    Ok(())
}

fn raw_text(value: &Value) -> Option<String> {
    value.raw_str().map(|s| s.trim().to_string())
}

fn decode_decimal(value: Value) -> Result<Value, DbError> {
    match raw_text(&value) {
        Some(s) => Decimal::from_str(&s)
            .or_else(|_| Decimal::from_scientific(&s))
            .map(Value::Decimal)
            .map_err(|e| DbError::data(format!("invalid decimal value {s:?}: {e}"))),
        None => match value {
            Value::Int(i) => Ok(Value::Decimal(Decimal::from(i))),
            Value::UInt(u) => Ok(Value::Decimal(Decimal::from(u))),
            Value::Float(f) => Decimal::try_from(f)
                .map(Value::Decimal)
                .map_err(|e| DbError::data(format!("invalid decimal value {f}: {e}"))),
            other => Ok(other),
        },
    }
}

fn decode_int(value: Value) -> Result<Value, DbError> {
    match raw_text(&value) {
        Some(s) => {
            if let Ok(i) = s.parse::<i64>() {
                Ok(Value::Int(i))
            } else if let Ok(u) = s.parse::<u64>() {
                Ok(Value::UInt(u))
            } else {
                Err(DbError::data(format!("invalid integer value {s:?}")))
            }
        }
        None => match value {
            Value::UInt(u) => Ok(i64::try_from(u).map_or(Value::UInt(u), Value::Int)),
            other => Ok(other),
        },
    }
}

fn decode_float(value: Value) -> Result<Value, DbError> {
    match raw_text(&value) {
        Some(s) => s
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| DbError::data(format!("invalid floating point value {s:?}: {e}"))),
        None => match value {
            Value::Int(i) => Ok(Value::Float(i as f64)),
            other => Ok(other),
        },
    }
}

fn decode_null(_value: Value) -> Result<Value, DbError> {
    Ok(Value::Null)
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

fn decode_datetime(value: Value) -> Result<Value, DbError> {
    let Some(s) = raw_text(&value) else {
        return Ok(value);
    };
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Ok(Value::DateTime(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Ok(Value::DateTime(d.and_time(chrono::NaiveTime::MIN)));
    }
    // Zero dates and other out-of-range values stay textual.
    Ok(Value::Text(s))
}

fn decode_date(value: Value) -> Result<Value, DbError> {
    let Some(s) = raw_text(&value) else {
        return Ok(match value {
            Value::DateTime(dt) => Value::Date(dt.date()),
            other => other,
        });
    };
    match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        Ok(d) => Ok(Value::Date(d)),
        Err(_) => Ok(Value::Text(s)),
    }
}

/// Parse MySQL TIME text: `[-][H]HH:MM:SS[.ffffff]`.
fn parse_time(s: &str) -> Option<TimeDelta> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (hms, frac) = match rest.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (rest, None),
    };
    let mut parts = hms.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next().unwrap_or("0").parse().ok()?;
    let seconds: i64 = parts.next().unwrap_or("0").parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    let micros: i64 = match frac {
        Some(f) if !f.is_empty() && f.len() <= 6 && f.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{f:0<6}").parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    let delta = TimeDelta::try_hours(hours)?
        + TimeDelta::try_minutes(minutes)?
        + TimeDelta::try_seconds(seconds)?
        + TimeDelta::microseconds(micros);
    Some(if negative { -delta } else { delta })
}

fn decode_time(value: Value) -> Result<Value, DbError> {
    let Some(s) = raw_text(&value) else {
        return Ok(value);
    };
    Ok(parse_time(&s).map_or(Value::Text(s), Value::Time))
}

fn decode_bit(value: Value) -> Result<Value, DbError> {
    match value {
        Value::Bytes(bytes) if bytes.len() <= 8 => {
            let n = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            Ok(i64::try_from(n).map_or(Value::UInt(n), Value::Int))
        }
        other => Ok(other),
    }
}

fn decode_json(value: Value) -> Result<Value, DbError> {
    let Some(s) = value.raw_str() else {
        return Ok(value);
    };
    serde_json::from_str(&s)
        .map(Value::Json)
        .map_err(|e| DbError::data(format!("invalid JSON value: {e}")))
}

fn decode_set(value: Value) -> Result<Value, DbError> {
    match value {
        Value::Set(_) => Ok(value),
        other => match other.raw_str() {
            Some(s) => Ok(Value::Set(
                s.split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>(),
            )),
            None => Ok(other),
        },
    }
}

fn json_vector(value: Value, code: u16) -> Result<Value, DbError> {
    let Some(s) = value.raw_str() else {
        return Ok(value);
    };
    let bad = |e: serde_json::Error| DbError::data(format!("invalid vector value: {e}"));
    let vector = match code {
        field_type::FLOAT32_VECTOR_JSON => Vector::F32(serde_json::from_str(&s).map_err(bad)?),
        field_type::FLOAT64_VECTOR_JSON => Vector::F64(serde_json::from_str(&s).map_err(bad)?),
        field_type::INT8_VECTOR_JSON => Vector::I8(serde_json::from_str(&s).map_err(bad)?),
        field_type::INT16_VECTOR_JSON => Vector::I16(serde_json::from_str(&s).map_err(bad)?),
        field_type::INT32_VECTOR_JSON => Vector::I32(serde_json::from_str(&s).map_err(bad)?),
        _ => Vector::I64(serde_json::from_str(&s).map_err(bad)?),
    };
    Ok(Value::Vector(vector))
}

fn unpack<const N: usize, T>(bytes: &[u8], from_le: fn([u8; N]) -> T) -> Result<Vec<T>, DbError> {
    if bytes.len() % N != 0 {
        return Err(DbError::data(format!(
            "vector payload of {} bytes is not a multiple of {N}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            from_le(buf)
        })
        .collect())
}

fn binary_vector(value: Value, code: u16) -> Result<Value, DbError> {
    let Value::Bytes(bytes) = value else {
        return Ok(value);
    };
    let vector = match code {
        field_type::FLOAT32_VECTOR => Vector::F32(unpack(&bytes, f32::from_le_bytes)?),
        field_type::FLOAT64_VECTOR => Vector::F64(unpack(&bytes, f64::from_le_bytes)?),
        field_type::INT8_VECTOR => Vector::I8(unpack(&bytes, i8::from_le_bytes)?),
        field_type::INT16_VECTOR => Vector::I16(unpack(&bytes, i16::from_le_bytes)?),
        field_type::INT32_VECTOR => Vector::I32(unpack(&bytes, i32::from_le_bytes)?),
        _ => Vector::I64(unpack(&bytes, i64::from_le_bytes)?),
    };
    Ok(Value::Vector(vector))
}

/// The converters every built-in backend starts from.
///
/// String and blob codes have no entry; their raw values pass through.
#[must_use]
pub fn default_converters() -> ConverterTable {
    let mut table = ConverterTable::new();
    for code in [field_type::DECIMAL, field_type::NEWDECIMAL] {
        table.insert_fn(code, decode_decimal);
    }
    for code in [
        field_type::TINY,
        field_type::SHORT,
        field_type::LONG,
        field_type::LONGLONG,
        field_type::INT24,
        field_type::YEAR,
    ] {
        table.insert_fn(code, decode_int);
    }
    for code in [field_type::FLOAT, field_type::DOUBLE] {
        table.insert_fn(code, decode_float);
    }
    table.insert_fn(field_type::NULL, decode_null);
    for code in [field_type::TIMESTAMP, field_type::DATETIME] {
        table.insert_fn(code, decode_datetime);
    }
    for code in [field_type::DATE, field_type::NEWDATE] {
        table.insert_fn(code, decode_date);
    }
    table.insert_fn(field_type::TIME, decode_time);
    table.insert_fn(field_type::BIT, decode_bit);
    table.insert_fn(field_type::JSON, decode_json);
    for code in [field_type::ENUM, field_type::SET] {
        table.insert_fn(code, decode_set);
    }
    for code in [
        field_type::FLOAT32_VECTOR_JSON,
        field_type::FLOAT64_VECTOR_JSON,
        field_type::INT8_VECTOR_JSON,
        field_type::INT16_VECTOR_JSON,
        field_type::INT32_VECTOR_JSON,
        field_type::INT64_VECTOR_JSON,
    ] {
        table.insert_fn(code, move |v| json_vector(v, code));
    }
    for code in [
        field_type::FLOAT32_VECTOR,
        field_type::FLOAT64_VECTOR,
        field_type::INT8_VECTOR,
        field_type::INT16_VECTOR,
        field_type::INT32_VECTOR,
        field_type::INT64_VECTOR,
    ] {
        table.insert_fn(code, move |v| binary_vector(v, code));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn pipeline_runs_steps_in_order() {
        let p = Pipeline::single(|v| Ok(Value::Int(v.as_int().unwrap_or(0) + 1)))
            .then(Arc::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 10))));
        assert_eq!(p.apply(Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn merge_composes_override_after_default() {
        let defaults = default_converters();
        let mut overrides = ConverterTable::new();
        overrides.insert_fn(field_type::LONG, |v| {
            Ok(Value::Int(v.as_int().unwrap_or_default() * 2))
        });
        overrides.insert_fn(field_type::VAR_STRING, |v| {
            Ok(Value::Text(v.raw_str().unwrap_or_default().to_uppercase()))
        });
        let merged = merge_converters(&overrides, &defaults);

        let long = merged.get(field_type::LONG).unwrap();
        assert_eq!(long.len(), 2);
        assert_eq!(long.apply(bytes("21")).unwrap(), Value::Int(42));

        let text = merged.get(field_type::VAR_STRING).unwrap();
        assert_eq!(text.len(), 1);
        assert_eq!(text.apply(bytes("abc")).unwrap(), Value::Text("ABC".into()));

        // defaults untouched
        assert_eq!(defaults.get(field_type::LONG).unwrap().len(), 1);
    }

    #[test]
    fn set_flag_forces_enum_set_converter() {
        let table = default_converters();
        let conv = table
            .for_column(field_type::STRING, Some(flags::SET | flags::NOT_NULL))
            .expect("set converter");
        let out = conv.apply(bytes("a,b")).unwrap();
        let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(out, Value::Set(expected));
        assert!(table.for_column(field_type::STRING, Some(flags::ENUM)).is_none());
    }

    #[test]
    fn convert_row_skips_columns_without_converters() {
        let table = default_converters();
        let convs = vec![(0, table.get(field_type::LONGLONG).unwrap().clone())];
        let mut row = vec![bytes("7"), bytes("seven")];
        convert_row(&mut row, &convs).unwrap();
        assert_eq!(row, vec![Value::Int(7), bytes("seven")]);
    }

    #[test]
    fn null_values_are_not_converted() {
        let table = default_converters();
        let convs = vec![(0, table.get(field_type::LONG).unwrap().clone())];
        let mut row = vec![Value::Null];
        convert_row(&mut row, &convs).unwrap();
        assert_eq!(row, vec![Value::Null]);
    }

    #[test]
    fn temporal_decoding() {
        let table = default_converters();
        let dt = table.get(field_type::DATETIME).unwrap();
        assert_eq!(
            dt.apply(bytes("2024-01-02 03:04:05.250000")).unwrap(),
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_micro_opt(3, 4, 5, 250_000)
                    .unwrap()
            )
        );
        assert_eq!(
            dt.apply(bytes("0000-00-00 00:00:00")).unwrap(),
            Value::Text("0000-00-00 00:00:00".into())
        );
        let time = table.get(field_type::TIME).unwrap();
        assert_eq!(
            time.apply(bytes("-838:59:59")).unwrap(),
            Value::Time(-(TimeDelta::hours(838) + TimeDelta::minutes(59) + TimeDelta::seconds(59)))
        );
        let date = table.get(field_type::DATE).unwrap();
        assert_eq!(
            date.apply(bytes("2023-12-31")).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
        );
    }

    #[test]
    fn numeric_decoding() {
        let table = default_converters();
        assert_eq!(
            table.get(field_type::LONGLONG).unwrap().apply(bytes("18446744073709551615")).unwrap(),
            Value::UInt(u64::MAX)
        );
        assert_eq!(
            table.get(field_type::NEWDECIMAL).unwrap().apply(bytes("12.50")).unwrap(),
            Value::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            table.get(field_type::DOUBLE).unwrap().apply(bytes("1.5")).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            table.get(field_type::BIT).unwrap().apply(Value::Bytes(vec![1, 0])).unwrap(),
            Value::Int(256)
        );
        let err = table.get(field_type::LONG).unwrap().apply(bytes("x1")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn typed_values_pass_through() {
        let table = default_converters();
        assert_eq!(
            table.get(field_type::LONG).unwrap().apply(Value::Int(3)).unwrap(),
            Value::Int(3)
        );
        let d = NaiveDate::from_ymd_opt(2020, 2, 2).unwrap();
        assert_eq!(
            table.get(field_type::DATE).unwrap().apply(Value::Date(d)).unwrap(),
            Value::Date(d)
        );
    }

    #[test]
    fn vector_decoding() {
        let table = default_converters();
        let mut payload = Vec::new();
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        payload.extend_from_slice(&(-2.0f32).to_le_bytes());
        assert_eq!(
            table.get(field_type::FLOAT32_VECTOR).unwrap().apply(Value::Bytes(payload)).unwrap(),
            Value::Vector(Vector::F32(vec![1.5, -2.0]))
        );
        assert_eq!(
            table.get(field_type::INT16_VECTOR_JSON).unwrap().apply(bytes("[1,2,3]")).unwrap(),
            Value::Vector(Vector::I16(vec![1, 2, 3]))
        );
        assert!(
            table
                .get(field_type::INT32_VECTOR)
                .unwrap()
                .apply(Value::Bytes(vec![1, 2, 3]))
                .is_err()
        );
    }
}
