use chrono::{NaiveDate, TimeDelta};
use mysql_async::{Column, Row as MyRow, Value as MyValue};

use crate::driver::RawColumn;
use crate::field_type::{self, BINARY_CHARSET};
use crate::types::Value;

#[must_use]
pub fn raw_column(col: &Column) -> RawColumn {
    let flags = u32::from(col.flags().bits());
    RawColumn {
        name: col.name_str().into_owned(),
        type_code: u16::from(col.column_type() as u8),
        display_size: Some(col.column_length()),
        internal_size: Some(col.column_length()),
        precision: Some(col.column_length()),
        scale: Some(u32::from(col.decimals())),
        null_ok: Some(flags & field_type::flags::NOT_NULL == 0),
        flags: Some(flags),
        charset: Some(col.character_set()),
    }
}

/// One native row as values, undecoded where the protocol sent text.
#[must_use]
pub fn extract_row(row: MyRow, columns: &[RawColumn]) -> Vec<Value> {
    row.unwrap_raw()
        .into_iter()
        .enumerate()
        .map(|(idx, value)| match value {
            Some(value) => from_mysql_value(value, columns.get(idx)),
            None => Value::Null,
        })
        .collect()
}

/// Map a native value onto the crate's value domain.
///
/// Text-protocol values stay undecoded for the converters, except that byte strings
/// of character columns are handed over as text.
#[must_use]
pub fn from_mysql_value(value: MyValue, column: Option<&RawColumn>) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) => {
            let is_text = column
                .and_then(|c| c.charset)
                .is_some_and(|cs| cs != BINARY_CHARSET);
            if is_text {
                match String::from_utf8(bytes) {
                    Ok(s) => Value::Text(s),
                    Err(e) => Value::Bytes(e.into_bytes()),
                }
            } else {
                Value::Bytes(bytes)
            }
        }
        MyValue::Int(i) => Value::Int(i),
        MyValue::UInt(u) => i64::try_from(u).map_or(Value::UInt(u), Value::Int),
        MyValue::Float(f) => Value::Float(f64::from(f)),
        MyValue::Double(f) => Value::Float(f),
        MyValue::Date(y, m, d, h, mi, s, us) => {
            let is_date = column.is_some_and(|c| {
                c.type_code == field_type::DATE || c.type_code == field_type::NEWDATE
            });
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d));
            match (date, is_date) {
                (Some(date), true) => Value::Date(date),
                (Some(date), false) => date
                    .and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                    .map_or_else(
                        || Value::Text(format!("{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}")),
                        Value::DateTime,
                    ),
                (None, true) => Value::Text(format!("{y:04}-{m:02}-{d:02}")),
                (None, false) => {
                    Value::Text(format!("{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
                }
            }
        }
        MyValue::Time(negative, days, h, m, s, us) => {
            let delta = TimeDelta::days(i64::from(days))
                + TimeDelta::hours(i64::from(h))
                + TimeDelta::minutes(i64::from(m))
                + TimeDelta::seconds(i64::from(s))
                + TimeDelta::microseconds(i64::from(us));
            Value::Time(if negative { -delta } else { delta })
        }
    }
}
