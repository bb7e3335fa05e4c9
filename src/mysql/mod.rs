//! Native protocol backend, built on mysql_async.
//!
//! - config: remapping the resolved configuration into client options
//! - params: bound values to native parameters
//! - query: native rows and column metadata to the crate's types
//! - stream: result sets read on demand by a task that owns the connection

pub mod config;
pub mod params;
pub mod query;
pub mod stream;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mysql_async::Conn;
use mysql_async::prelude::Queryable;
use tracing::debug;

pub use config::{MysqlArgs, remap_params};

use crate::config::ConnectionConfig;
use crate::converters::{ConverterTable, default_converters, merge_converters};
use crate::driver::{BackendError, Driver, NativeCursor, NextSet, RawColumn, ScrollMode, Session};
use crate::error::{DbError, ErrorKind, classify_mysql_error};
use crate::translation::ParamStyle;
use crate::types::{Params, Value};

use stream::{ResultStream, SessionState, SetHeader};

/// Map a native client error onto the DB-API kinds.
#[must_use]
pub fn convert_error(err: mysql_async::Error) -> DbError {
    match err {
        mysql_async::Error::Server(e) => {
            let errno = i32::from(e.code);
            DbError::new(
                classify_mysql_error(Some(errno), Some(&e.state)),
                Some(errno),
                e.message,
            )
        }
        mysql_async::Error::Io(e) => DbError::new(ErrorKind::Operational, None, e.to_string()),
        mysql_async::Error::Url(e) => DbError::new(ErrorKind::Programming, None, e.to_string()),
        mysql_async::Error::Driver(e) => DbError::new(ErrorKind::Interface, None, e.to_string()),
        other => DbError::new(ErrorKind::Internal, None, other.to_string()),
    }
}

/// Driver for the native binary/text protocol.
#[derive(Debug)]
pub struct MysqlDriver {
    args: MysqlArgs,
    converters: ConverterTable,
}

impl MysqlDriver {
    /// # Errors
    ///
    /// Returns `DbError::Programming` when the configuration cannot be remapped.
    pub fn new(config: &ConnectionConfig, overrides: &ConverterTable) -> Result<Self, DbError> {
        Ok(Self {
            args: remap_params(config)?,
            converters: merge_converters(overrides, &default_converters()),
        })
    }

    #[must_use]
    pub fn args(&self) -> &MysqlArgs {
        &self.args
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    fn name(&self) -> &str {
        "mysql"
    }

    fn paramstyle(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    async fn connect(&self) -> Result<Box<dyn Session>, BackendError> {
        debug!(host = %self.args.host, port = self.args.port, "connecting over native protocol");
        let conn = Conn::new(self.args.opts()).await?;
        Ok(Box::new(MysqlSession {
            state: Arc::new(SessionState::new(conn)),
        }))
    }
}

/// One native protocol connection.
pub struct MysqlSession {
    state: Arc<SessionState>,
}

impl MysqlSession {
    async fn run(&self, sql: &str) -> Result<(), BackendError> {
        let mut guard = self.state.acquire().await;
        let conn = guard.as_mut().ok_or(BackendError::Reference)?;
        conn.query_drop(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Session for MysqlSession {
    fn cursor(&self) -> Result<Box<dyn NativeCursor>, BackendError> {
        Ok(Box::new(MysqlCursor::new(Arc::downgrade(&self.state))))
    }

    async fn commit(&self) -> Result<(), BackendError> {
        self.run("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), BackendError> {
        self.run("ROLLBACK").await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        // A connection still streaming results is alive; pinging would discard them.
        if self.state.is_streaming() {
            return Ok(());
        }
        let mut guard = self.state.acquire().await;
        let conn = guard.as_mut().ok_or(BackendError::Reference)?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        let conn = self.state.acquire().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await?;
        }
        Ok(())
    }
}

/// Cursor over a native connection.
///
/// Rows are pulled from the server as they are fetched, so scrolling only moves
/// forward. Running another command on the same connection discards whatever
/// this cursor has not read yet.
pub struct MysqlCursor {
    session: Weak<SessionState>,
    stream: Option<ResultStream>,
    columns: Option<Vec<RawColumn>>,
    /// Affected rows, or rows read so far from the current set.
    rowcount: i64,
    lastrowid: Option<u64>,
    pos: usize,
}

impl MysqlCursor {
    fn new(session: Weak<SessionState>) -> Self {
        Self {
            session,
            stream: None,
            columns: None,
            rowcount: -1,
            lastrowid: None,
            pos: 0,
        }
    }

    fn position(&mut self, header: Option<SetHeader>) {
        let header = header.unwrap_or_else(|| SetHeader {
            affected: -1,
            ..SetHeader::default()
        });
        self.rowcount = if header.columns.is_some() { 0 } else { header.affected };
        self.columns = header.columns;
        self.lastrowid = header.lastrowid;
        self.pos = 0;
    }

    async fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.release().await;
        }
        self.position(None);
    }

    async fn fetch(&mut self, limit: Option<usize>) -> Result<Vec<Vec<Value>>, BackendError> {
        let Some(stream) = &self.stream else {
            return Ok(Vec::new());
        };
        let rows = stream.fetch(limit).await?;
        self.pos += rows.len();
        self.rowcount = i64::try_from(self.pos).unwrap_or(i64::MAX);
        Ok(rows)
    }
}

/// Rows to skip forward for a scroll request from read position `pos`.
///
/// # Errors
///
/// Returns `BackendError::NotSupported` for targets behind the read position.
pub fn forward_distance(pos: usize, value: i64, mode: ScrollMode) -> Result<usize, BackendError> {
    let pos = i64::try_from(pos).unwrap_or(i64::MAX);
    let target = match mode {
        ScrollMode::Relative => pos.saturating_add(value),
        ScrollMode::Absolute => value,
    };
    if target < pos {
        return Err(BackendError::NotSupported(
            "Native cursors stream their rows and cannot scroll backwards".to_string(),
        ));
    }
    Ok(usize::try_from(target - pos).unwrap_or(usize::MAX))
}

#[async_trait]
impl NativeCursor for MysqlCursor {
    async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), BackendError> {
        self.release().await;
        let state = self.session.upgrade().ok_or(BackendError::Reference)?;
        let params = params.map(params::convert_params).transpose()?;
        let (stream, header) = ResultStream::open(&state, sql.to_string(), params).await?;
        self.position(Some(header));
        self.stream = Some(stream);
        Ok(())
    }

    fn description(&self) -> Option<&[RawColumn]> {
        self.columns.as_deref()
    }

    async fn fetchone(&mut self) -> Result<Option<Vec<Value>>, BackendError> {
        Ok(self.fetch(Some(1)).await?.pop())
    }

    async fn fetchmany(&mut self, size: usize) -> Result<Vec<Vec<Value>>, BackendError> {
        self.fetch(Some(size)).await
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, BackendError> {
        self.fetch(None).await
    }

    async fn nextset(&mut self) -> NextSet {
        let Some(stream) = &self.stream else {
            return NextSet::Exhausted;
        };
        match stream.next_set().await {
            Ok(Some(header)) => {
                self.position(Some(header));
                NextSet::HasMore
            }
            Ok(None) => {
                self.release().await;
                NextSet::Exhausted
            }
            Err(e) => {
                self.release().await;
                NextSet::Error(e)
            }
        }
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn lastrowid(&self) -> Option<u64> {
        self.lastrowid
    }

    async fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), BackendError> {
        if self.columns.is_none() {
            return Err(BackendError::OutOfRange("No result set to scroll".to_string()));
        }
        let skip = forward_distance(self.pos, value, mode)?;
        let skipped = self.fetch(Some(skip)).await?.len();
        if skipped < skip {
            return Err(BackendError::OutOfRange(format!(
                "Scroll target is {} rows past the end of the result set",
                skip - skipped
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.release().await;
        if self.session.strong_count() == 0 {
            return Err(BackendError::Reference);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.strong_count() > 0
    }
}
