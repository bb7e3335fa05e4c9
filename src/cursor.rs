//! The public cursor: normalizes a backend's native cursor.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::connection::{Connection, Shared, check_name};
use crate::converters::{Pipeline, convert_row, convert_rows};
use crate::driver::{Driver, NativeCursor, NextSet, ScrollMode};
use crate::error::{DbError, ER_NO_RESULT_SET};
use crate::results::{Description, ResultFormat, Row, format_results, format_row};
use crate::translation::bind_params;
use crate::types::{Params, Value};

/// Rows fetched by [`Cursor::fetchmany`] when no size is given.
pub const DEFAULT_ARRAYSIZE: usize = 100;

/// Where a cursor is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Closed; every operation fails.
    Closed,
    /// Open without a result set.
    Idle,
    /// A result set is described; rows may remain.
    Active,
    /// Every statement queued by [`Cursor::executemany`] has run.
    ExhaustedMany,
}

/// Statements still queued by `executemany`.
struct PendingMany {
    sql: String,
    params: VecDeque<Params>,
}

/// A database cursor.
///
/// Obtained from [`Connection::cursor`]. Operations take `&mut self`, so a cursor
/// is driven by one caller at a time.
pub struct Cursor {
    conn: Weak<Shared>,
    driver: Arc<dyn Driver>,
    native: Option<Box<dyn NativeCursor>>,
    description: Option<Vec<Description>>,
    converters: Vec<(usize, Pipeline)>,
    rownumber: Option<i64>,
    format: ResultFormat,
    pending: Option<PendingMany>,
    many_exhausted: bool,
    /// Default batch size for [`Cursor::fetchmany`].
    pub arraysize: usize,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("driver", &self.driver.name())
            .field("state", &self.state())
            .field("rownumber", &self.rownumber)
            .field("format", &self.format)
            .field("arraysize", &self.arraysize)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub(crate) fn new(
        conn: Weak<Shared>,
        driver: Arc<dyn Driver>,
        native: Box<dyn NativeCursor>,
        format: ResultFormat,
    ) -> Self {
        Self {
            conn,
            driver,
            native: Some(native),
            description: None,
            converters: Vec::new(),
            rownumber: None,
            format,
            pending: None,
            many_exhausted: false,
            arraysize: DEFAULT_ARRAYSIZE,
        }
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.native.is_none() {
            return Err(DbError::cursor_closed());
        }
        Ok(())
    }

    /// The connection this cursor came from, while both are open.
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.native.as_ref()?;
        self.conn.upgrade().map(Connection::from_shared)
    }

    /// Columns of the active result set; `None` when there is none.
    #[must_use]
    pub fn description(&self) -> Option<&[Description]> {
        self.description.as_deref()
    }

    /// Rows yielded from the active result set; `None` before the first execute and
    /// between the statements of a multi-statement execution.
    #[must_use]
    pub fn rownumber(&self) -> Option<i64> {
        self.rownumber
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        if self.native.is_none() {
            CursorState::Closed
        } else if self.many_exhausted {
            CursorState::ExhaustedMany
        } else if self.description.is_some() {
            CursorState::Active
        } else {
            CursorState::Idle
        }
    }

    #[must_use]
    pub fn results_format(&self) -> ResultFormat {
        self.format
    }

    pub fn set_results_format(&mut self, format: ResultFormat) {
        self.format = format;
    }

    /// Rows produced or affected by the last statement; `-1` when unknown.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close.
    pub fn rowcount(&self) -> Result<i64, DbError> {
        let native = self.native.as_deref().ok_or_else(DbError::cursor_closed)?;
        Ok(native.rowcount())
    }

    /// Id generated by the last insert; `None` when there was none.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close.
    pub fn lastrowid(&self) -> Result<Option<u64>, DbError> {
        let native = self.native.as_deref().ok_or_else(DbError::cursor_closed)?;
        Ok(native.lastrowid().filter(|id| *id != 0))
    }

    /// Rebuild column descriptions and per-column converters from the native cursor.
    fn load_description(&mut self) {
        self.converters.clear();
        let columns = self.native.as_deref().and_then(|native| native.description());
        match columns {
            Some(columns) if !columns.is_empty() => {
                let table = self.driver.converters();
                for (idx, column) in columns.iter().enumerate() {
                    if let Some(pipeline) = table.for_column(column.type_code, column.flags) {
                        self.converters.push((idx, pipeline.clone()));
                    }
                }
                self.description = Some(columns.iter().map(Description::from_raw).collect());
            }
            _ => self.description = None,
        }
    }

    /// Execute one statement.
    ///
    /// `params` use `:name` placeholders when named and `:1`, `:2`, ... when
    /// positional; they are rewritten into the driver's own style. Without params
    /// the SQL text is sent untouched.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close,
    /// `DbError::Programming` for placeholders without a value, and the driver's
    /// translated error when the statement fails. A failed statement leaves the
    /// cursor open without a description.
    pub async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), DbError> {
        self.ensure_open()?;
        self.pending = None;
        self.many_exhausted = false;
        self.run(sql, params.as_ref()).await
    }

    async fn run(&mut self, sql: &str, params: Option<&Params>) -> Result<(), DbError> {
        self.description = None;
        self.converters.clear();
        self.rownumber = None;

        let bound = bind_params(sql, params, self.driver.paramstyle())?;
        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        native
            .execute(&bound.sql, bound.params)
            .await
            .map_err(|e| self.driver.convert_exception(e))?;

        self.load_description();
        self.rownumber = Some(0);
        Ok(())
    }

    /// Execute a statement once per parameter set.
    ///
    /// Only the first set runs immediately; each later one runs on the following
    /// [`Cursor::nextset`] call. An empty `param_seq` runs the statement once
    /// without parameters.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Programming` before anything runs when the sets mix named
    /// and positional parameters or positional sets differ in length; otherwise
    /// as [`Cursor::execute`].
    pub async fn executemany(&mut self, sql: &str, param_seq: Vec<Params>) -> Result<(), DbError> {
        self.ensure_open()?;
        self.pending = None;
        self.many_exhausted = false;

        if param_seq.is_empty() {
            return self.run(sql, None).await;
        }
        validate_param_seq(&param_seq)?;

        let mut queue: VecDeque<Params> = param_seq.into();
        let first = queue.pop_front();
        self.run(sql, first.as_ref()).await?;
        self.pending = Some(PendingMany {
            sql: sql.to_string(),
            params: queue,
        });
        Ok(())
    }

    /// Call a stored procedure as `CALL name(:1, ...)`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Programming` for an invalid procedure name, otherwise as
    /// [`Cursor::execute`].
    pub async fn callproc(&mut self, name: &str, params: Option<Vec<Value>>) -> Result<(), DbError> {
        self.ensure_open()?;
        let name = check_name(name)?;
        match params {
            Some(params) if !params.is_empty() => {
                let keys = (1..=params.len())
                    .map(|i| format!(":{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("CALL {name}({keys})");
                self.execute(&sql, Some(Params::Positional(params))).await
            }
            _ => self.execute(&format!("CALL {name}()"), None).await,
        }
    }

    fn advance(&mut self, count: usize) {
        if let Some(n) = self.rownumber.as_mut() {
            *n = n.saturating_add(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    fn describe(&self) -> &[Description] {
        self.description.as_deref().unwrap_or_default()
    }

    /// Fetch the next row, or `None` when the result set is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close, the driver's
    /// translated error, or `DbError::Data` when a converter rejects a value.
    pub async fn fetchone(&mut self) -> Result<Option<Row>, DbError> {
        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        let row = native
            .fetchone()
            .await
            .map_err(|e| self.driver.convert_exception(e))?;
        let Some(mut values) = row else {
            return Ok(None);
        };
        self.advance(1);
        convert_row(&mut values, &self.converters)?;
        Ok(Some(format_row(self.format, self.describe(), values)))
    }

    /// Fetch up to `size` rows (default [`Cursor::arraysize`], at least one).
    ///
    /// A size of one goes through the backend's single-row fetch; some backends
    /// repeat the same row when asked for batches of one.
    ///
    /// # Errors
    ///
    /// As [`Cursor::fetchone`].
    pub async fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>, DbError> {
        let size = size.unwrap_or(self.arraysize).max(1);
        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        let fetched = if size == 1 {
            native.fetchone().await.map(|row| row.into_iter().collect())
        } else {
            native.fetchmany(size).await
        };
        let mut rows = fetched.map_err(|e| self.driver.convert_exception(e))?;
        convert_rows(&mut rows, &self.converters)?;
        let formatted = format_results(self.format, self.describe(), rows);
        self.advance(formatted.len());
        Ok(formatted)
    }

    /// Fetch every remaining row of the active result set.
    ///
    /// # Errors
    ///
    /// As [`Cursor::fetchone`].
    pub async fn fetchall(&mut self) -> Result<Vec<Row>, DbError> {
        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        let mut rows = native
            .fetchall()
            .await
            .map_err(|e| self.driver.convert_exception(e))?;
        convert_rows(&mut rows, &self.converters)?;
        let formatted = format_results(self.format, self.describe(), rows);
        self.advance(formatted.len());
        Ok(formatted)
    }

    /// Row iteration: the next row, or `None` at the end.
    ///
    /// # Errors
    ///
    /// As [`Cursor::fetchone`].
    pub async fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        self.fetchone().await
    }

    /// Move to the next result set. Returns `false` when there is none.
    ///
    /// After [`Cursor::executemany`] this runs the next queued parameter set instead.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close, and any backend
    /// error other than "no more results", translated.
    pub async fn nextset(&mut self) -> Result<bool, DbError> {
        self.ensure_open()?;
        self.rownumber = None;

        if let Some(pending) = self.pending.as_mut() {
            return match pending.params.pop_front() {
                Some(params) => {
                    let sql = pending.sql.clone();
                    self.run(&sql, Some(&params)).await?;
                    Ok(true)
                }
                None => {
                    self.pending = None;
                    self.many_exhausted = true;
                    Ok(false)
                }
            };
        }

        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        match native.nextset().await {
            NextSet::HasMore => {
                self.load_description();
                self.rownumber = Some(0);
                Ok(true)
            }
            NextSet::Exhausted => {
                self.load_description();
                Ok(false)
            }
            NextSet::Error(e) => {
                let err = self.driver.convert_exception(e);
                if err.errno() == Some(ER_NO_RESULT_SET) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Move the read position and adjust [`Cursor::rownumber`] to match.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close, and
    /// `DbError::Programming` when the target lies outside the result set.
    pub async fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), DbError> {
        let native = self.native.as_deref_mut().ok_or_else(DbError::cursor_closed)?;
        native
            .scroll(value, mode)
            .await
            .map_err(|e| self.driver.convert_exception(e))?;
        if let Some(n) = self.rownumber.as_mut() {
            *n = match mode {
                ScrollMode::Relative => n.saturating_add(value),
                ScrollMode::Absolute => value,
            };
        }
        Ok(())
    }

    /// Accepted for compatibility; no backend needs it.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close.
    pub fn setinputsizes(&self, _sizes: &[usize]) -> Result<(), DbError> {
        self.ensure_open()
    }

    /// Accepted for compatibility; no backend needs it.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error after close.
    pub fn setoutputsize(&self, _size: usize, _column: Option<&str>) -> Result<(), DbError> {
        self.ensure_open()
    }

    /// Close the cursor.
    ///
    /// A cursor whose connection is already gone closes quietly.
    ///
    /// # Errors
    ///
    /// Returns the "cursor is closed" interface error when already closed, and the
    /// driver's translated error if the backend fails to close (the cursor then
    /// stays open).
    pub async fn close(&mut self) -> Result<(), DbError> {
        let mut native = self.native.take().ok_or_else(DbError::cursor_closed)?;
        match native.close().await {
            Ok(()) => {}
            Err(e) if e.is_reference() => {
                debug!(driver = self.driver.name(), "cursor closed after its session was torn down");
            }
            Err(e) => {
                self.native = Some(native);
                return Err(self.driver.convert_exception(e));
            }
        }
        self.conn = Weak::new();
        self.description = None;
        self.converters.clear();
        self.pending = None;
        self.many_exhausted = false;
        self.rownumber = None;
        Ok(())
    }

    /// Whether the cursor is open, its native session still exists and the
    /// connection answers a ping.
    pub async fn is_connected(&self) -> bool {
        if !self.native.as_deref().is_some_and(|native| native.is_connected()) {
            return false;
        }
        match self.connection() {
            Some(conn) => conn.is_connected().await,
            None => false,
        }
    }
}

fn validate_param_seq(param_seq: &[Params]) -> Result<(), DbError> {
    let Some(first) = param_seq.first() else {
        return Ok(());
    };
    let named = first.is_named();
    if param_seq.iter().any(|p| p.is_named() != named) {
        return Err(DbError::programming(
            "executemany parameter sets must be all named or all positional",
        ));
    }
    if !named
        && let Some((idx, p)) = param_seq
            .iter()
            .enumerate()
            .find(|(_, p)| p.len() != first.len())
    {
        return Err(DbError::programming(format!(
            "executemany parameter set {idx} has {} values; expected {}",
            p.len(),
            first.len()
        )));
    }
    Ok(())
}
