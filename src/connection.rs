//! The public connection: one backend session plus the driver that speaks to it.

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;
use tracing::debug;

use crate::config::{
    ConnectOptions, ConnectionConfig, EnvOptions, OptionSource, build_params,
};
use crate::cursor::Cursor;
use crate::driver::{Driver, Session, get_driver};
use crate::error::{DbError, ErrorKind};
use crate::results::ResultFormat;
use crate::types::{Params, Value};

static NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").ok());

/// Validate a server variable or procedure name before it is spliced into SQL.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns `DbError::Programming` when the name is not an identifier.
pub fn check_name(name: &str) -> Result<&str, DbError> {
    let name = name.trim();
    match NAME_PATTERN.as_ref() {
        Some(re) if re.is_match(name) => Ok(name),
        _ => Err(DbError::programming(format!(
            "Name contains invalid characters: {name:?}"
        ))),
    }
}

/// State shared between a connection and the cursors it hands out.
pub(crate) struct Shared {
    pub(crate) driver: Arc<dyn Driver>,
    session: Mutex<Option<Arc<dyn Session>>>,
    config: ConnectionConfig,
    results_format: ResultFormat,
}

impl Shared {
    fn session(&self) -> Result<Arc<dyn Session>, DbError> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(DbError::connection_closed)
    }

    fn take_session(&self) -> Option<Arc<dyn Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn is_open(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// A database connection.
///
/// ```rust,no_run
/// use singlestoredb::prelude::*;
///
/// # async fn demo() -> Result<(), DbError> {
/// let conn = connect(ConnectOptions::from_url("me:p455w0rd@s2-host.com/my_db")).await?;
/// let mut cur = conn.cursor()?;
/// cur.execute("SELECT :1 + 1", Some(Params::from(vec![Value::Int(1)]))).await?;
/// let rows = cur.fetchall().await?;
/// assert_eq!(rows.len(), 1);
/// conn.close().await?;
/// # Ok(()) }
/// ```
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.shared.driver.name())
            .field("host", &self.shared.config.host)
            .field("database", &self.shared.config.database)
            .field("open", &self.shared.is_open())
            .finish()
    }
}

impl Connection {
    pub const WARNING: ErrorKind = ErrorKind::Warning;
    pub const INTERFACE_ERROR: ErrorKind = ErrorKind::Interface;
    pub const DATABASE_ERROR: ErrorKind = ErrorKind::Database;
    pub const DATA_ERROR: ErrorKind = ErrorKind::Data;
    pub const OPERATIONAL_ERROR: ErrorKind = ErrorKind::Operational;
    pub const INTEGRITY_ERROR: ErrorKind = ErrorKind::Integrity;
    pub const INTERNAL_ERROR: ErrorKind = ErrorKind::Internal;
    pub const PROGRAMMING_ERROR: ErrorKind = ErrorKind::Programming;
    pub const NOT_SUPPORTED_ERROR: ErrorKind = ErrorKind::NotSupported;

    /// Connect, filling unset options from `SINGLESTOREDB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Programming` for invalid options, `DbError::Interface` for an
    /// unknown or disabled driver, and the driver's translated error when the
    /// backend cannot connect.
    pub async fn new(opts: ConnectOptions) -> Result<Self, DbError> {
        Self::connect_with(opts, &EnvOptions).await
    }

    /// Connect, filling unset options from `source`.
    ///
    /// # Errors
    ///
    /// See [`Connection::new`].
    pub async fn connect_with(
        opts: ConnectOptions,
        source: &dyn OptionSource,
    ) -> Result<Self, DbError> {
        let config = build_params(&opts, source)?;
        let driver = get_driver(&config, &opts.converters)?;
        let results_format = match opts.results_format {
            Some(format) => format,
            None => match source.get("results.format") {
                Some(raw) => raw.trim().parse()?,
                None => ResultFormat::default(),
            },
        };
        Self::open(config, driver, results_format).await
    }

    /// Connect through a caller-supplied driver.
    ///
    /// The driver's own converter table is used as is.
    ///
    /// # Errors
    ///
    /// Returns the driver's translated error when it cannot connect.
    pub async fn with_driver(
        config: ConnectionConfig,
        driver: Arc<dyn Driver>,
        results_format: ResultFormat,
    ) -> Result<Self, DbError> {
        Self::open(config, driver, results_format).await
    }

    async fn open(
        config: ConnectionConfig,
        driver: Arc<dyn Driver>,
        results_format: ResultFormat,
    ) -> Result<Self, DbError> {
        let session = driver
            .connect()
            .await
            .map_err(|e| driver.convert_exception(e))?;
        debug!(driver = driver.name(), host = ?config.host, "connection opened");
        Ok(Self {
            shared: Arc::new(Shared {
                driver,
                session: Mutex::new(Some(Arc::from(session))),
                config,
                results_format,
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// The resolved parameters this connection was opened with.
    #[must_use]
    pub fn connection_params(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn driver_name(&self) -> &str {
        self.shared.driver.name()
    }

    #[must_use]
    pub fn results_format(&self) -> ResultFormat {
        self.shared.results_format
    }

    /// Open a new cursor.
    ///
    /// # Errors
    ///
    /// Returns the "connection is closed" interface error after [`Connection::close`].
    pub fn cursor(&self) -> Result<Cursor, DbError> {
        self.cursor_with_format(self.shared.results_format)
    }

    /// Cursor for the connection's own queries; always returns tuples.
    fn internal_cursor(&self) -> Result<Cursor, DbError> {
        self.cursor_with_format(ResultFormat::Tuple)
    }

    fn cursor_with_format(&self, format: ResultFormat) -> Result<Cursor, DbError> {
        let session = self.shared.session()?;
        let native = session
            .cursor()
            .map_err(|e| self.shared.driver.convert_exception(e))?;
        Ok(Cursor::new(
            Arc::downgrade(&self.shared),
            Arc::clone(&self.shared.driver),
            native,
            format,
        ))
    }

    /// # Errors
    ///
    /// Returns the "connection is closed" interface error after close, or the
    /// driver's translated error.
    pub async fn commit(&self) -> Result<(), DbError> {
        let session = self.shared.session()?;
        session
            .commit()
            .await
            .map_err(|e| self.shared.driver.convert_exception(e))
    }

    /// # Errors
    ///
    /// Returns the "connection is closed" interface error after close, or the
    /// driver's translated error (`NotSupported` for backends without transactions).
    pub async fn rollback(&self) -> Result<(), DbError> {
        let session = self.shared.session()?;
        session
            .rollback()
            .await
            .map_err(|e| self.shared.driver.convert_exception(e))
    }

    /// Switch autocommit through the `autocommit` session variable.
    ///
    /// Backends that run every statement in a fresh server session accept
    /// `true` as is and refuse `false`.
    ///
    /// # Errors
    ///
    /// Returns the "connection is closed" interface error after close,
    /// `DbError::NotSupported` when autocommit cannot be turned off, or the
    /// driver's translated error.
    pub async fn autocommit(&self, value: bool) -> Result<(), DbError> {
        let session = self.shared.session()?;
        if !session.keeps_session_state() {
            return if value {
                Ok(())
            } else {
                Err(self.stateless("autocommit cannot be turned off"))
            };
        }
        self.set_session_var("autocommit", value).await
    }

    fn stateless(&self, what: &str) -> DbError {
        DbError::new(
            ErrorKind::NotSupported,
            None,
            format!(
                "The {} driver runs each statement in its own session; {what}",
                self.shared.driver.name()
            ),
        )
    }

    /// Close the connection. Closing twice is a no-op.
    ///
    /// Outstanding cursors are not closed; their next backend call fails with the
    /// closed-resource error.
    ///
    /// # Errors
    ///
    /// Returns the driver's translated error if the backend fails while closing;
    /// the connection is considered closed either way.
    pub async fn close(&self) -> Result<(), DbError> {
        let Some(session) = self.shared.take_session() else {
            return Ok(());
        };
        debug!(driver = self.shared.driver.name(), "closing connection");
        session
            .close()
            .await
            .map_err(|e| self.shared.driver.convert_exception(e))
    }

    /// Liveness check; `false` once closed or when the backend does not answer.
    pub async fn is_connected(&self) -> bool {
        match self.shared.session() {
            Ok(session) => self.shared.driver.is_connected(session.as_ref()).await,
            Err(_) => false,
        }
    }

    /// # Errors
    ///
    /// Returns `DbError::Programming` for an invalid variable name, otherwise as
    /// [`Cursor::execute`].
    pub async fn set_global_var(&self, name: &str, value: impl Into<Value>) -> Result<(), DbError> {
        self.set_var("global", name, value.into()).await
    }

    /// # Errors
    ///
    /// Returns `DbError::Programming` for an invalid variable name, otherwise as
    /// [`Cursor::execute`].
    pub async fn set_session_var(&self, name: &str, value: impl Into<Value>) -> Result<(), DbError> {
        self.set_var("session", name, value.into()).await
    }

    async fn set_var(&self, scope: &str, name: &str, value: Value) -> Result<(), DbError> {
        let session = self.shared.session()?;
        let name = check_name(name)?;
        if scope == "session" && !session.keeps_session_state() {
            return Err(self.stateless("session variables do not persist"));
        }
        let value = match value {
            Value::Bool(true) => Value::Text("ON".to_string()),
            Value::Bool(false) => Value::Text("OFF".to_string()),
            other => other,
        };
        let mut cur = self.internal_cursor()?;
        let sql = format!("set {scope} {name}=:1");
        let result = cur.execute(&sql, Some(Params::Positional(vec![value]))).await;
        let closed = cur.close().await;
        result.and(closed)
    }

    /// Read a global variable. `ON`/`TRUE` and `OFF`/`FALSE` come back as booleans.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Programming` for an invalid or unknown variable name,
    /// otherwise as [`Cursor::execute`].
    pub async fn get_global_var(&self, name: &str) -> Result<Value, DbError> {
        self.get_var("global", name).await
    }

    /// Read a session variable. `ON`/`TRUE` and `OFF`/`FALSE` come back as booleans.
    ///
    /// # Errors
    ///
    /// As [`Connection::get_global_var`].
    pub async fn get_session_var(&self, name: &str) -> Result<Value, DbError> {
        self.get_var("local", name).await
    }

    async fn get_var(&self, scope: &str, name: &str) -> Result<Value, DbError> {
        self.shared.session()?;
        let name = check_name(name)?;
        let mut cur = self.internal_cursor()?;
        let pattern = name.replace('_', "\\_").replace('%', "\\%");
        let sql = format!("show {scope} variables like '{pattern}'");
        let rows = match cur.execute(&sql, None).await {
            Ok(()) => cur.fetchall().await,
            Err(e) => Err(e),
        };
        cur.close().await?;
        let value = rows?
            .into_iter()
            .find(|row| {
                row.get_by_index(0)
                    .and_then(Value::raw_str)
                    .is_some_and(|found| found.eq_ignore_ascii_case(name))
            })
            .and_then(|row| row.get_by_index(1).cloned())
            .ok_or_else(|| DbError::programming(format!("Unknown variable: {name}")))?;
        Ok(variable_value(value))
    }

    /// Turn on the server's HTTP API, optionally moving it to `port`, and restart
    /// the proxy. Returns the port the API listens on.
    ///
    /// Requires privileges to set global variables and restart the proxy.
    ///
    /// # Errors
    ///
    /// Returns the driver's translated error if any step fails, and
    /// `DbError::Data` if the server reports a port that is not a number.
    pub async fn enable_http_api(&self, port: Option<u16>) -> Result<u16, DbError> {
        self.shared.session()?;
        if let Some(port) = port {
            self.set_global_var("http_proxy_port", i64::from(port)).await?;
        }
        self.set_global_var("http_api", true).await?;
        self.restart_proxy().await?;
        let value = self.get_global_var("http_proxy_port").await?;
        port_number(&value)
    }

    /// Turn off the server's HTTP API and restart the proxy.
    ///
    /// # Errors
    ///
    /// Returns the driver's translated error if either step fails.
    pub async fn disable_http_api(&self) -> Result<(), DbError> {
        self.shared.session()?;
        self.set_global_var("http_api", false).await?;
        self.restart_proxy().await
    }

    async fn restart_proxy(&self) -> Result<(), DbError> {
        let mut cur = self.internal_cursor()?;
        let result = cur.execute("restart proxy", None).await;
        let closed = cur.close().await;
        result.and(closed)
    }
}

fn variable_value(value: Value) -> Value {
    let Some(text) = value.raw_str().map(|s| s.into_owned()) else {
        return value;
    };
    match text.to_ascii_lowercase().as_str() {
        "on" | "true" => Value::Bool(true),
        "off" | "false" => Value::Bool(false),
        _ => Value::Text(text),
    }
}

fn port_number(value: &Value) -> Result<u16, DbError> {
    let parsed = match value {
        Value::Int(i) => u16::try_from(*i).ok(),
        Value::UInt(u) => u16::try_from(*u).ok(),
        other => other.raw_str().and_then(|s| s.trim().parse::<u16>().ok()),
    };
    parsed.ok_or_else(|| DbError::data(format!("Invalid HTTP API port reported by server: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_identifiers() {
        assert_eq!(check_name("  http_api ").unwrap(), "http_api");
        assert_eq!(check_name("_x1").unwrap(), "_x1");
        for bad in ["1abc", "a;drop table t", "a b", "", "a-b", "x'"] {
            let err = check_name(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Programming, "{bad}");
        }
    }

    #[test]
    fn variable_values_normalize_booleans() {
        assert_eq!(variable_value(Value::Text("ON".into())), Value::Bool(true));
        assert_eq!(variable_value(Value::Bytes(b"False".to_vec())), Value::Bool(false));
        assert_eq!(variable_value(Value::Text("9000".into())), Value::Text("9000".into()));
        assert_eq!(variable_value(Value::Int(3)), Value::Int(3));
    }

    #[test]
    fn reported_ports_parse() {
        assert_eq!(port_number(&Value::Text("9000".into())).unwrap(), 9000);
        assert_eq!(port_number(&Value::Int(8080)).unwrap(), 8080);
        assert_eq!(
            port_number(&Value::Text("nope".into())).unwrap_err().kind(),
            ErrorKind::Data
        );
    }
}
