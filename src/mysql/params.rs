use chrono::{Datelike, Timelike};
use mysql_async::Value as MyValue;

use crate::driver::BackendError;
use crate::types::{Params, Value};

/// Convert bound parameters into native positional parameters.
///
/// # Errors
///
/// Returns `BackendError::NotSupported` for named parameters; the native client is
/// always bound positionally.
pub fn convert_params(params: Params) -> Result<mysql_async::Params, BackendError> {
    match params {
        Params::Positional(values) if values.is_empty() => Ok(mysql_async::Params::Empty),
        Params::Positional(values) => Ok(mysql_async::Params::Positional(
            values.into_iter().map(to_mysql_value).collect(),
        )),
        Params::Named(_) => Err(BackendError::NotSupported(
            "named parameters are not supported by the native driver".to_string(),
        )),
    }
}

#[must_use]
pub fn to_mysql_value(value: Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(i64::from(b)),
        Value::Int(i) => MyValue::Int(i),
        Value::UInt(u) => MyValue::UInt(u),
        Value::Float(f) => MyValue::Double(f),
        Value::Text(s) => MyValue::Bytes(s.into_bytes()),
        Value::Bytes(b) => MyValue::Bytes(b),
        Value::Date(d) => MyValue::Date(
            u16::try_from(d.year()).unwrap_or(0),
            month_day(d.month()),
            month_day(d.day()),
            0,
            0,
            0,
            0,
        ),
        Value::DateTime(dt) => MyValue::Date(
            u16::try_from(dt.year()).unwrap_or(0),
            month_day(dt.month()),
            month_day(dt.day()),
            month_day(dt.hour()),
            month_day(dt.minute()),
            month_day(dt.second()),
            dt.nanosecond() / 1_000,
        ),
        Value::Time(delta) => {
            let negative = delta < chrono::TimeDelta::zero();
            let abs = delta.abs();
            let secs = abs.num_seconds();
            let days = u32::try_from(secs / 86_400).unwrap_or(u32::MAX);
            let rem = secs % 86_400;
            MyValue::Time(
                negative,
                days,
                u8::try_from(rem / 3600).unwrap_or(0),
                u8::try_from((rem % 3600) / 60).unwrap_or(0),
                u8::try_from(rem % 60).unwrap_or(0),
                abs.subsec_nanos().unsigned_abs() / 1_000,
            )
        }
        other => other
            .to_sql_text()
            .map_or(MyValue::NULL, |s| MyValue::Bytes(s.into_bytes())),
    }
}

fn month_day(v: u32) -> u8 {
    u8::try_from(v).unwrap_or(0)
}
