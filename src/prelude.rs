//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{
    ConnectOptions, ConnectionConfig, EnvOptions, MapOptions, OptionSource, ParamValue,
    build_params,
};
pub use crate::connection::Connection;
pub use crate::converters::{ConverterTable, Pipeline, default_converters};
pub use crate::cursor::{Cursor, CursorState};
pub use crate::driver::{
    BackendError, Driver, DriverKind, NativeCursor, NextSet, RawColumn, ScrollMode, Session,
};
pub use crate::error::{DbError, ER_CLOSED, ER_NO_RESULT_SET, ErrorKind};
pub use crate::field_type::ColumnType;
pub use crate::results::{Description, NamedRow, ResultFormat, Row};
pub use crate::translation::{BoundQuery, ParamStyle, bind_params};
pub use crate::types::{Params, Value, Vector};
pub use crate::{APILEVEL, PARAMSTYLE, THREADSAFETY, connect};
