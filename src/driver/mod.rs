//! The backend driver contract and the closed registry of built-in drivers.
//!
//! A [`Driver`] describes one backend: how it binds parameters, which converters
//! decode its values, how to open a [`Session`], and how its native errors map onto
//! [`DbError`]. Sessions hand out [`NativeCursor`]s, which speak the backend's own
//! idiom; the public [`crate::Cursor`] normalizes them.

mod buffered;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use buffered::{BufferedResults, ResultSetData};

use crate::config::ConnectionConfig;
use crate::converters::ConverterTable;
use crate::error::{DbError, ER_NO_RESULT_SET, ErrorKind, classify_mysql_error};
use crate::translation::ParamStyle;
use crate::types::{Params, Value};

/// Column metadata as a backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub type_code: u16,
    pub display_size: Option<u32>,
    pub internal_size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub null_ok: Option<bool>,
    pub flags: Option<u32>,
    pub charset: Option<u16>,
}

impl RawColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: u16) -> Self {
        Self {
            name: name.into(),
            type_code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = Some(flags);
        self
    }

    #[must_use]
    pub fn with_null_ok(mut self, null_ok: bool) -> Self {
        self.null_ok = Some(null_ok);
        self
    }
}

/// Where a scroll offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScrollMode {
    #[default]
    Relative,
    Absolute,
}

/// Outcome of asking a backend for its next result set.
#[derive(Debug)]
pub enum NextSet {
    HasMore,
    Exhausted,
    Error(BackendError),
}

/// Errors raised by the HTTP API client.
#[cfg(feature = "http")]
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP API error {status}: {msg}")]
    Api {
        status: u16,
        errno: Option<i32>,
        msg: String,
    },

    #[error("Invalid HTTP API response: {0}")]
    Decode(String),

    #[error("Invalid HTTP API endpoint: {0}")]
    Endpoint(String),
}

/// Backend-native errors. These never leave the crate's public operations; each
/// driver's [`Driver::convert_exception`] turns them into [`DbError`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    #[cfg(feature = "http")]
    #[error(transparent)]
    Http(#[from] HttpError),

    #[cfg(feature = "odbc")]
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// The session behind a cursor has been torn down.
    #[error("weakly-referenced session no longer exists")]
    Reference,

    #[error("{msg}")]
    Native {
        errno: Option<i32>,
        sqlstate: Option<String>,
        msg: String,
    },

    #[error("{0}")]
    NotSupported(String),

    #[error("{0}")]
    OutOfRange(String),
}

impl BackendError {
    #[must_use]
    pub fn native(errno: i32, msg: impl Into<String>) -> Self {
        BackendError::Native {
            errno: Some(errno),
            sqlstate: None,
            msg: msg.into(),
        }
    }

    /// The backend's "no more result sets" condition.
    #[must_use]
    pub fn no_result_set() -> Self {
        Self::native(ER_NO_RESULT_SET, "No result set to fetch from.")
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, BackendError::Reference)
    }
}

/// The translation every built-in driver applies.
#[must_use]
pub fn default_convert_exception(err: BackendError) -> DbError {
    match err {
        #[cfg(feature = "mysql")]
        BackendError::Mysql(e) => crate::mysql::convert_error(e),
        #[cfg(feature = "http")]
        BackendError::Http(e) => crate::http::convert_error(e),
        #[cfg(feature = "odbc")]
        BackendError::Odbc(e) => crate::odbc::convert_error(e),
        BackendError::Reference => DbError::interface(
            crate::error::ER_CLOSED,
            "Connection is closed.",
        ),
        BackendError::Native {
            errno,
            sqlstate,
            msg,
        } => DbError::new(
            classify_mysql_error(errno, sqlstate.as_deref()),
            errno,
            msg,
        ),
        BackendError::NotSupported(msg) => DbError::new(ErrorKind::NotSupported, None, msg),
        BackendError::OutOfRange(msg) => DbError::new(ErrorKind::Programming, None, msg),
    }
}

/// One backend: its binding style, converters, session factory and error mapping.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Placeholder style the backend's native cursor expects.
    fn paramstyle(&self) -> ParamStyle;

    /// Default converters merged with any caller overrides.
    fn converters(&self) -> &ConverterTable;

    /// Open a session.
    async fn connect(&self) -> Result<Box<dyn Session>, BackendError>;

    /// Liveness check. Ping failures report `false` rather than an error.
    async fn is_connected(&self, session: &dyn Session) -> bool {
        match session.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(driver = self.name(), error = %e, "ping failed");
                false
            }
        }
    }

    fn convert_exception(&self, err: BackendError) -> DbError {
        default_convert_exception(err)
    }
}

/// An open backend session.
#[async_trait]
pub trait Session: Send + Sync {
    fn cursor(&self) -> Result<Box<dyn NativeCursor>, BackendError>;
    async fn commit(&self) -> Result<(), BackendError>;
    async fn rollback(&self) -> Result<(), BackendError>;
    async fn ping(&self) -> Result<(), BackendError>;
    async fn close(&self) -> Result<(), BackendError>;

    /// Whether session variables and open transactions carry over from one
    /// statement to the next.
    fn keeps_session_state(&self) -> bool {
        true
    }
}

/// A backend's own cursor.
#[async_trait]
pub trait NativeCursor: Send {
    /// Run one statement. `params` are already in the driver's [`ParamStyle`].
    async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), BackendError>;

    /// Columns of the active result set; `None` when there is none.
    fn description(&self) -> Option<&[RawColumn]>;

    async fn fetchone(&mut self) -> Result<Option<Vec<Value>>, BackendError>;
    async fn fetchmany(&mut self, size: usize) -> Result<Vec<Vec<Value>>, BackendError>;
    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, BackendError>;
    async fn nextset(&mut self) -> NextSet;

    /// Rows produced or affected by the last statement; `-1` when unknown.
    fn rowcount(&self) -> i64;
    fn lastrowid(&self) -> Option<u64>;

    async fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), BackendError>;
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Whether the session behind the cursor still exists; no round trip.
    fn is_connected(&self) -> bool;
}

/// Identifiers of the built-in drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DriverKind {
    /// Native protocol.
    #[value(alias = "mysql.connector", alias = "mysql-connector", alias = "mysqlconnector")]
    Mysql,
    /// Data API over plain HTTP.
    Http,
    /// Data API over TLS.
    Https,
    /// ODBC driver manager.
    #[value(alias = "pyodbc")]
    Odbc,
}

impl DriverKind {
    /// Look up a registry key (already stripped of any `dialect+` prefix).
    ///
    /// # Errors
    ///
    /// Returns `DbError::Interface` for names no built-in driver answers to.
    pub fn parse(name: &str) -> Result<Self, DbError> {
        <DriverKind as clap::ValueEnum>::from_str(name, true)
            .map_err(|_| DbError::new(ErrorKind::Interface, None, format!("Unknown driver: {name}")))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DriverKind::Mysql => "mysql",
            DriverKind::Http => "http",
            DriverKind::Https => "https",
            DriverKind::Odbc => "odbc",
        }
    }
}

/// Resolve and construct the driver for a configuration.
///
/// # Errors
///
/// Returns `DbError::Interface` when the driver is unknown or its Cargo feature is
/// disabled, and `DbError::Programming` when the configuration cannot be remapped
/// into backend arguments.
#[cfg_attr(
    not(any(feature = "mysql", feature = "http", feature = "odbc")),
    allow(unused_variables)
)]
pub fn get_driver(
    config: &ConnectionConfig,
    overrides: &ConverterTable,
) -> Result<Arc<dyn Driver>, DbError> {
    let name = config.driver_name();
    let kind = DriverKind::parse(&name)?;
    debug!(driver = kind.as_str(), "selected driver");
    match kind {
        #[cfg(feature = "mysql")]
        DriverKind::Mysql => Ok(Arc::new(crate::mysql::MysqlDriver::new(config, overrides)?)),
        #[cfg(feature = "http")]
        DriverKind::Http | DriverKind::Https => Ok(Arc::new(crate::http::HttpDriver::new(
            config,
            overrides,
            kind == DriverKind::Https,
        )?)),
        #[cfg(feature = "odbc")]
        DriverKind::Odbc => Ok(Arc::new(crate::odbc::OdbcDriver::new(config, overrides)?)),
        #[allow(unreachable_patterns)]
        other => Err(DbError::new(
            ErrorKind::Interface,
            None,
            format!(
                "Driver {} is not available; enable the `{}` feature",
                other.as_str(),
                feature_for(other)
            ),
        )),
    }
}

fn feature_for(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::Mysql => "mysql",
        DriverKind::Http | DriverKind::Https => "http",
        DriverKind::Odbc => "odbc",
    }
}
