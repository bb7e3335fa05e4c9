//! A DB-API style client for SingleStore over several backends.
//!
//! One [`Connection`]/[`Cursor`] surface sits on top of the native protocol
//! (`mysql` feature), the Data API over HTTP(S) (`http` feature) and ODBC
//! (`odbc` feature). Parameters are written once in a backend-neutral
//! placeholder style (`:name` or `:1`), values are decoded by per-type
//! converters, and every backend error surfaces as a [`DbError`].
//!
//! ```rust,no_run
//! use singlestoredb::prelude::*;
//!
//! # async fn demo() -> Result<(), DbError> {
//! let conn = connect(
//!     ConnectOptions::from_url("me:p455w0rd@s2-host.com/my_db")
//!         .with_results_format(ResultFormat::Dict),
//! )
//! .await?;
//! let mut cur = conn.cursor()?;
//! cur.execute(
//!     "SELECT name FROM users WHERE id = :id",
//!     Some(Params::named([("id", 42)])),
//! )
//! .await?;
//! if let Some(row) = cur.fetchone().await? {
//!     println!("{:?}", row.get("name"));
//! }
//! conn.close().await?;
//! # Ok(()) }
//! ```

pub mod config;
pub mod connection;
pub mod converters;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod field_type;
pub mod prelude;
pub mod results;
pub mod translation;
pub mod types;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "odbc")]
pub mod odbc;

pub use config::ConnectOptions;
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::{DbError, ErrorKind};

/// DB-API level implemented.
pub const APILEVEL: &str = "2.0";

/// Threads may share the module, but not connections.
pub const THREADSAFETY: u8 = 1;

/// Placeholder style callers write.
pub const PARAMSTYLE: &str = "named";

/// Placeholder style for named parameters.
pub const MAP_PARAMSTYLE: &str = "named";

/// Placeholder style for positional parameters.
pub const POSITIONAL_PARAMSTYLE: &str = "numeric";

/// Open a connection, filling unset options from `SINGLESTOREDB_*` environment variables.
///
/// # Errors
///
/// See [`Connection::new`].
pub async fn connect(opts: ConnectOptions) -> Result<Connection, DbError> {
    Connection::new(opts).await
}
