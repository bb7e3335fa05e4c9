use odbc_api::buffers::TextRowSet;
use odbc_api::handles::AsStatementRef;
use odbc_api::{Cursor, CursorImpl, DataType, Nullability, ResultSetMetadata};

use crate::driver::{BackendError, RawColumn, ResultSetData};
use crate::field_type::{self, flags};
use crate::types::Value;

/// Rows fetched per round trip.
const BATCH_SIZE: usize = 1000;
/// Upper bound for a single text cell; longer values fail the fetch instead of truncating.
const MAX_TEXT_LEN: usize = 65536;

/// Map an ODBC SQL type onto a wire type code.
#[must_use]
pub fn type_code_for(data_type: &DataType) -> u16 {
    match data_type {
        DataType::Numeric { .. } | DataType::Decimal { .. } => field_type::NEWDECIMAL,
        DataType::TinyInt { .. } | DataType::Bit { .. } => field_type::TINY,
        DataType::SmallInt { .. } => field_type::SHORT,
        DataType::Integer { .. } => field_type::LONG,
        DataType::BigInt { .. } => field_type::LONGLONG,
        DataType::Real { .. } => field_type::FLOAT,
        DataType::Float { .. } | DataType::Double { .. } => field_type::DOUBLE,
        DataType::Date { .. } => field_type::DATE,
        DataType::Time { .. } => field_type::TIME,
        DataType::Timestamp { .. } => field_type::DATETIME,
        DataType::Char { .. } | DataType::WChar { .. } | DataType::Binary { .. } => {
            field_type::STRING
        }
        DataType::LongVarchar { .. } | DataType::LongVarbinary { .. } => field_type::BLOB,
        _ => field_type::VAR_STRING,
    }
}

fn is_binary(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. }
    )
}

#[must_use]
pub fn raw_column(name: String, data_type: &DataType, nullability: Nullability) -> RawColumn {
    let null_ok = match nullability {
        Nullability::NoNulls => Some(false),
        Nullability::Nullable => Some(true),
        Nullability::Unknown => None,
    };
    let mut column_flags = if null_ok == Some(false) { flags::NOT_NULL } else { 0 };
    if is_binary(data_type) {
        column_flags |= flags::BINARY;
    }
    RawColumn {
        name,
        type_code: type_code_for(data_type),
        null_ok,
        flags: Some(column_flags),
        ..RawColumn::default()
    }
}

/// A text cell as the converters expect it.
///
/// Binary columns arrive as hex digits when bound as text and are decoded back
/// into bytes.
#[must_use]
pub fn from_text_cell(cell: Option<&[u8]>, column: &RawColumn) -> Value {
    let Some(bytes) = cell else {
        return Value::Null;
    };
    let binary = column.flags.is_some_and(|f| f & flags::BINARY != 0);
    if binary {
        return hex::decode(bytes).map_or_else(|_| Value::Bytes(bytes.to_vec()), Value::Bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

/// Every result set of one execution.
#[derive(Debug, Default)]
pub struct Batch {
    pub sets: Vec<ResultSetData>,
    /// Error of a later statement, reported once the sets before it are consumed.
    pub failure: Option<BackendError>,
}

/// `(rowcount, lastrowid)` from a `SELECT ROW_COUNT(), LAST_INSERT_ID()` row.
#[must_use]
pub fn affected_counts(rows: &[Vec<Value>]) -> (i64, Option<u64>) {
    let first = rows.first();
    let rowcount = first
        .and_then(|row| row.first())
        .and_then(|v| v.as_text().and_then(|s| s.parse::<i64>().ok()))
        .unwrap_or(-1);
    let lastrowid = first
        .and_then(|row| row.get(1))
        .and_then(|v| v.as_text().and_then(|s| s.parse::<u64>().ok()))
        .filter(|id| *id != 0);
    (rowcount, lastrowid)
}

fn describe<C: ResultSetMetadata>(cursor: &mut C) -> Result<Vec<RawColumn>, odbc_api::Error> {
    let count = u16::try_from(cursor.num_result_cols()?).unwrap_or(0);
    let mut columns = Vec::with_capacity(usize::from(count));
    for idx in 1..=count {
        let name = cursor.col_name(idx)?;
        let data_type = cursor.col_data_type(idx)?;
        let nullability = cursor.col_nullability(idx)?;
        columns.push(raw_column(name, &data_type, nullability));
    }
    Ok(columns)
}

/// Read one result set, all columns bound as text, and move to the next one.
fn read_set<S: AsStatementRef>(
    mut cursor: CursorImpl<S>,
) -> Result<(ResultSetData, Option<CursorImpl<S>>), odbc_api::Error> {
    let columns = describe(&mut cursor)?;
    if columns.is_empty() {
        return Ok((ResultSetData::affected(-1, None), cursor.more_results()?));
    }

    let mut buffers = TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN))?;
    let mut block = cursor.bind_buffer(&mut buffers)?;
    let mut rows = Vec::new();
    while let Some(batch) = block.fetch_with_truncation_check(true)? {
        for row in 0..batch.num_rows() {
            rows.push(
                columns
                    .iter()
                    .enumerate()
                    .map(|(col, column)| from_text_cell(batch.at(col, row), column))
                    .collect(),
            );
        }
    }
    let (cursor, _) = block.unbind()?;
    Ok((ResultSetData::rows(columns, rows), cursor.more_results()?))
}

/// Read every result set the cursor produces.
///
/// # Errors
///
/// Returns the ODBC error raised while reading the first set. Errors after
/// the first set are kept in [`Batch::failure`].
pub fn read_result_sets<S: AsStatementRef>(cursor: CursorImpl<S>) -> Result<Batch, odbc_api::Error> {
    let (first, mut next) = read_set(cursor)?;
    let mut batch = Batch {
        sets: vec![first],
        failure: None,
    };
    while let Some(cursor) = next {
        match read_set(cursor) {
            Ok((set, more)) => {
                batch.sets.push(set);
                next = more;
            }
            Err(e) => {
                batch.failure = Some(e.into());
                break;
            }
        }
    }
    Ok(batch)
}
