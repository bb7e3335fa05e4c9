use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::driver::{HttpError, RawColumn, ResultSetData};
use crate::field_type::{self, BINARY_CHARSET, flags};
use crate::types::Value;

static ROW_RETURNING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(select|show|call|echo|describe|desc|explain|with|values)\b").ok()
});

static API_ERROR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*Error\s+(\d+)\s*:\s*(?s)(.*)$").ok());

/// Whether a statement goes to the `query/tuples` endpoint rather than `exec`.
#[must_use]
pub fn returns_rows(sql: &str) -> bool {
    ROW_RETURNING
        .as_ref()
        .is_some_and(|re| re.is_match(statement_start(sql)))
}

/// `sql` past any leading whitespace, comments and opening parentheses.
fn statement_start(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        rest = if let Some(after) = trimmed.strip_prefix('(') {
            after
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            after.split_once("*/").map_or("", |(_, tail)| tail)
        } else if trimmed.starts_with("--") || trimmed.starts_with('#') {
            trimmed.split_once('\n').map_or("", |(_, tail)| tail)
        } else {
            return trimmed;
        };
    }
}

#[derive(Debug, Serialize)]
pub struct ApiRequest<'a> {
    pub sql: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiColumn {
    pub name: String,
    pub data_type: String,
    #[serde(default = "nullable_default")]
    pub nullable: bool,
}

fn nullable_default() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiResultSet {
    #[serde(default)]
    pub columns: Vec<ApiColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<ApiResultSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponse {
    #[serde(default)]
    pub last_insert_id: Option<u64>,
    #[serde(default)]
    pub rows_affected: i64,
}

/// Split an API error body of the form `Error <code>: <message>`.
#[must_use]
pub fn parse_api_error(status: u16, body: &str) -> HttpError {
    let parsed = API_ERROR
        .as_ref()
        .and_then(|re| re.captures(body))
        .and_then(|caps| {
            let errno = caps.get(1)?.as_str().parse::<i32>().ok()?;
            Some((errno, caps.get(2)?.as_str().trim().to_string()))
        });
    match parsed {
        Some((errno, msg)) => HttpError::Api {
            status,
            errno: Some(errno),
            msg,
        },
        None => HttpError::Api {
            status,
            errno: None,
            msg: body.trim().to_string(),
        },
    }
}

/// Map an API `dataType` name onto a wire type code and column flags.
#[must_use]
pub fn type_code_for(data_type: &str) -> (u16, u32) {
    let upper = data_type.trim().to_ascii_uppercase();
    let (base, modifier) = match upper.split_once('(') {
        Some((base, rest)) => (base.trim(), rest.split(')').next().unwrap_or_default()),
        None => (upper.as_str(), ""),
    };
    let unsigned = upper.contains("UNSIGNED");
    let base = base.trim_end_matches(" UNSIGNED").trim();
    let mut column_flags = if unsigned { flags::UNSIGNED } else { 0 };
    let code = match base {
        "DECIMAL" | "NUMERIC" | "DEC" => field_type::NEWDECIMAL,
        "TINYINT" | "BOOL" | "BOOLEAN" => field_type::TINY,
        "SMALLINT" => field_type::SHORT,
        "MEDIUMINT" => field_type::INT24,
        "INT" | "INTEGER" => field_type::LONG,
        "BIGINT" => field_type::LONGLONG,
        "FLOAT" => field_type::FLOAT,
        "DOUBLE" | "REAL" => field_type::DOUBLE,
        "NULL" => field_type::NULL,
        "TIMESTAMP" => field_type::TIMESTAMP,
        "DATE" => field_type::DATE,
        "TIME" => field_type::TIME,
        "DATETIME" => field_type::DATETIME,
        "YEAR" => field_type::YEAR,
        "BIT" => field_type::BIT,
        "JSON" => field_type::JSON,
        "ENUM" => {
            column_flags |= flags::ENUM;
            field_type::STRING
        }
        "SET" => {
            column_flags |= flags::SET;
            field_type::STRING
        }
        "CHAR" | "BINARY" => field_type::STRING,
        "VARCHAR" | "VARBINARY" => field_type::VAR_STRING,
        "TINYTEXT" | "TINYBLOB" => field_type::TINY_BLOB,
        "MEDIUMTEXT" | "MEDIUMBLOB" => field_type::MEDIUM_BLOB,
        "LONGTEXT" | "LONGBLOB" => field_type::LONG_BLOB,
        "TEXT" | "BLOB" => field_type::BLOB,
        "GEOGRAPHY" | "GEOGRAPHYPOINT" | "GEOMETRY" => field_type::GEOMETRY,
        "BSON" => field_type::BSON,
        "VECTOR" => vector_code(modifier),
        _ => field_type::VAR_STRING,
    };
    if is_binary_name(base) {
        column_flags |= flags::BINARY;
    }
    (code, column_flags)
}

fn vector_code(modifier: &str) -> u16 {
    let element = modifier.rsplit(',').next().unwrap_or_default().trim();
    match element {
        "F64" => field_type::FLOAT64_VECTOR_JSON,
        "I8" => field_type::INT8_VECTOR_JSON,
        "I16" => field_type::INT16_VECTOR_JSON,
        "I32" => field_type::INT32_VECTOR_JSON,
        "I64" => field_type::INT64_VECTOR_JSON,
        _ => field_type::FLOAT32_VECTOR_JSON,
    }
}

fn is_binary_name(base: &str) -> bool {
    matches!(
        base,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BSON"
    )
}

#[must_use]
pub fn raw_column(col: &ApiColumn) -> RawColumn {
    let (type_code, mut column_flags) = type_code_for(&col.data_type);
    if !col.nullable {
        column_flags |= flags::NOT_NULL;
    }
    let charset = (column_flags & flags::BINARY != 0).then_some(BINARY_CHARSET);
    RawColumn {
        name: col.name.clone(),
        type_code,
        null_ok: Some(col.nullable),
        flags: Some(column_flags),
        charset,
        ..RawColumn::default()
    }
}

/// Map one JSON cell onto the raw value domain the converters expect.
///
/// Binary columns arrive base64-encoded; structured JSON is handed over as text so
/// JSON and vector converters see the same shape as from the native protocol.
///
/// # Errors
///
/// Returns `HttpError::Decode` for binary cells that are not valid base64.
pub fn from_json_cell(cell: JsonValue, column: &RawColumn) -> Result<Value, HttpError> {
    let binary = column.charset == Some(BINARY_CHARSET);
    Ok(match cell {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) if binary => STANDARD
            .decode(s.as_bytes())
            .map(Value::Bytes)
            .map_err(|e| HttpError::Decode(format!("column {}: {e}", column.name)))?,
        JsonValue::String(s) => Value::Text(s),
        structured @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Text(structured.to_string()),
    })
}

/// Turn a `query/tuples` response into buffered result sets.
///
/// # Errors
///
/// Returns `HttpError::Decode` when a row does not match its columns.
pub fn build_result_sets(response: QueryResponse) -> Result<Vec<ResultSetData>, HttpError> {
    let mut sets = Vec::with_capacity(response.results.len().max(1));
    for set in response.results {
        let columns: Vec<RawColumn> = set.columns.iter().map(raw_column).collect();
        let mut rows = Vec::with_capacity(set.rows.len());
        for row in set.rows {
            if row.len() != columns.len() {
                return Err(HttpError::Decode(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let values = row
                .into_iter()
                .zip(&columns)
                .map(|(cell, col)| from_json_cell(cell, col))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }
        sets.push(ResultSetData::rows(columns, rows));
    }
    if sets.is_empty() {
        sets.push(ResultSetData::affected(0, None));
    }
    Ok(sets)
}

#[must_use]
pub fn exec_result(response: &ExecResponse) -> ResultSetData {
    ResultSetData::affected(response.rows_affected, response.last_insert_id)
}
