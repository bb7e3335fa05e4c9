//! ODBC backend over odbc-api.
//!
//! - `config`: connection-string construction from the shared configuration
//! - `params`: parameter binding, byte strings as binary
//! - `query`: result-set reading, all columns bound as text
//! - `worker`: the thread that owns the session's connection
//!
//! The driver manager is synchronous, so each session keeps one connection on
//! its own worker thread and async callers await the thread's replies.

pub mod config;
pub mod params;
pub mod query;
pub mod worker;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

pub use config::{DEFAULT_ODBC_DRIVER, OdbcArgs, remap_params};
pub use worker::OdbcWorker;

use crate::config::ConnectionConfig;
use crate::converters::{ConverterTable, default_converters, merge_converters};
use crate::driver::{
    BackendError, BufferedResults, Driver, NativeCursor, NextSet, RawColumn, ScrollMode, Session,
};
use crate::error::{DbError, ErrorKind, classify_mysql_error};
use crate::translation::ParamStyle;
use crate::types::{Params, Value};

/// Map an ODBC error onto the DB-API kinds, using the diagnostic record when present.
#[must_use]
pub fn convert_error(err: odbc_api::Error) -> DbError {
    let msg = err.to_string();
    match &err {
        odbc_api::Error::Diagnostics { record, .. } => {
            let errno = (record.native_error != 0).then_some(record.native_error);
            let state = record.state.as_str();
            DbError::new(classify_mysql_error(errno, Some(state)), errno, msg)
        }
        odbc_api::Error::TooLargeValueForBuffer { .. } => DbError::new(ErrorKind::Data, None, msg),
        _ => DbError::new(ErrorKind::Interface, None, msg),
    }
}

/// Driver for an ODBC driver manager.
#[derive(Debug)]
pub struct OdbcDriver {
    args: OdbcArgs,
    converters: ConverterTable,
}

impl OdbcDriver {
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
    pub fn args(&self) -> &OdbcArgs {
        &self.args
    }
}

#[async_trait]
impl Driver for OdbcDriver {
    fn name(&self) -> &str {
        "odbc"
    }

    fn paramstyle(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    async fn connect(&self) -> Result<Box<dyn Session>, BackendError> {
        debug!(
            odbc_driver = %self.args.driver,
            host = %self.args.host,
            port = self.args.port,
            "connecting through ODBC"
        );
        let worker = OdbcWorker::spawn(self.args.connection_string()).await?;
        Ok(Box::new(OdbcSession {
            worker: Arc::new(Mutex::new(Some(worker))),
        }))
    }
}

type SharedWorker = Arc<Mutex<Option<OdbcWorker>>>;

pub struct OdbcSession {
    worker: SharedWorker,
}

impl OdbcSession {
    async fn statement(&self, sql: &'static str) -> Result<(), BackendError> {
        match self.worker.lock().await.as_ref() {
            Some(worker) => worker.statement(sql).await,
            None => Err(BackendError::Reference),
        }
    }
}

#[async_trait]
impl Session for OdbcSession {
    fn cursor(&self) -> Result<Box<dyn NativeCursor>, BackendError> {
        Ok(Box::new(OdbcCursor {
            worker: Arc::downgrade(&self.worker),
            results: BufferedResults::new(),
        }))
    }

    // Transactions follow the server's autocommit variable, so they end in SQL.
    async fn commit(&self) -> Result<(), BackendError> {
        self.statement("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), BackendError> {
        self.statement("ROLLBACK").await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.statement("SELECT 1").await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.worker.lock().await.take();
        Ok(())
    }
}

pub struct OdbcCursor {
    worker: Weak<Mutex<Option<OdbcWorker>>>,
    results: BufferedResults,
}

#[async_trait]
impl NativeCursor for OdbcCursor {
    async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), BackendError> {
        self.results.clear();
        let params = params.map(params::convert_params).transpose()?.unwrap_or_default();
        let shared = self.worker.upgrade().ok_or(BackendError::Reference)?;
        let guard = shared.lock().await;
        let worker = guard.as_ref().ok_or(BackendError::Reference)?;
        let batch = worker.execute(sql.to_string(), params).await?;
        match batch.failure {
            Some(err) => self.results.load_until_error(batch.sets, err),
            None => self.results.load(batch.sets),
        }
        Ok(())
    }
    fn description(&self) -> Option<&[RawColumn]> {
        self.results.description()
    }

    async fn fetchone(&mut self) -> Result<Option<Vec<Value>>, BackendError> {
        Ok(self.results.fetchone())
    }

    async fn fetchmany(&mut self, size: usize) -> Result<Vec<Vec<Value>>, BackendError> {
        Ok(self.results.fetchmany(size))
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, BackendError> {
        Ok(self.results.fetchall())
    }

    async fn nextset(&mut self) -> NextSet {
        self.results.nextset()
    }

    fn rowcount(&self) -> i64 {
        self.results.rowcount()
    }

    fn lastrowid(&self) -> Option<u64> {
        self.results.lastrowid()
    }

    async fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), BackendError> {
        self.results.scroll(value, mode)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.results.clear();
        if self.worker.strong_count() == 0 {
            return Err(BackendError::Reference);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.worker.strong_count() > 0
    }
}
