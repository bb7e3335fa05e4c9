use thiserror::Error;

/// Error code carried by every "used after close" error.
pub const ER_CLOSED: i32 = 2048;

/// Error code a backend reports when there is no further result set.
pub const ER_NO_RESULT_SET: i32 = 2053;

/// The DB-API error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Warning,
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl ErrorKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Warning => "Warning",
            ErrorKind::Interface => "InterfaceError",
            ErrorKind::Database => "DatabaseError",
            ErrorKind::Data => "DataError",
            ErrorKind::Operational => "OperationalError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Programming => "ProgrammingError",
            ErrorKind::NotSupported => "NotSupportedError",
        }
    }
}

fn errno_prefix(errno: &Option<i32>) -> String {
    match errno {
        Some(code) => format!("({code}) "),
        None => String::new(),
    }
}

/// Errors surfaced by connections and cursors.
///
/// Backend-native errors are always translated into one of these variants by
/// the active driver before they reach the caller, so matching on the variant
/// works the same way regardless of which backend is in use:
/// ```rust
/// use singlestoredb::prelude::*;
///
/// let err = DbError::interface(ER_CLOSED, "Cursor is closed.");
/// assert_eq!(err.kind(), ErrorKind::Interface);
/// assert_eq!(err.errno(), Some(ER_CLOSED));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    #[error("Warning: {}{msg}", errno_prefix(.errno))]
    Warning { errno: Option<i32>, msg: String },

    #[error("InterfaceError: {}{msg}", errno_prefix(.errno))]
    Interface { errno: Option<i32>, msg: String },

    #[error("DatabaseError: {}{msg}", errno_prefix(.errno))]
    Database { errno: Option<i32>, msg: String },

    #[error("DataError: {}{msg}", errno_prefix(.errno))]
    Data { errno: Option<i32>, msg: String },

    #[error("OperationalError: {}{msg}", errno_prefix(.errno))]
    Operational { errno: Option<i32>, msg: String },

    #[error("IntegrityError: {}{msg}", errno_prefix(.errno))]
    Integrity { errno: Option<i32>, msg: String },

    #[error("InternalError: {}{msg}", errno_prefix(.errno))]
    Internal { errno: Option<i32>, msg: String },

    #[error("ProgrammingError: {}{msg}", errno_prefix(.errno))]
    Programming { errno: Option<i32>, msg: String },

    #[error("NotSupportedError: {}{msg}", errno_prefix(.errno))]
    NotSupported { errno: Option<i32>, msg: String },
}

impl DbError {
    /// Build an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, errno: Option<i32>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::Warning => DbError::Warning { errno, msg },
            ErrorKind::Interface => DbError::Interface { errno, msg },
            ErrorKind::Database => DbError::Database { errno, msg },
            ErrorKind::Data => DbError::Data { errno, msg },
            ErrorKind::Operational => DbError::Operational { errno, msg },
            ErrorKind::Integrity => DbError::Integrity { errno, msg },
            ErrorKind::Internal => DbError::Internal { errno, msg },
            ErrorKind::Programming => DbError::Programming { errno, msg },
            ErrorKind::NotSupported => DbError::NotSupported { errno, msg },
        }
    }

    #[must_use]
    pub fn interface(errno: i32, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interface, Some(errno), msg)
    }

    #[must_use]
    pub fn programming(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Programming, None, msg)
    }

    #[must_use]
    pub fn data(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, None, msg)
    }

    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, None, msg)
    }

    #[must_use]
    pub fn operational(errno: Option<i32>, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Operational, errno, msg)
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, None, msg)
    }

    /// The error raised by any operation on a closed cursor.
    #[must_use]
    pub fn cursor_closed() -> Self {
        Self::interface(ER_CLOSED, "Cursor is closed.")
    }

    /// The error raised by any operation on a closed connection.
    #[must_use]
    pub fn connection_closed() -> Self {
        Self::interface(ER_CLOSED, "Connection is closed.")
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Warning { .. } => ErrorKind::Warning,
            DbError::Interface { .. } => ErrorKind::Interface,
            DbError::Database { .. } => ErrorKind::Database,
            DbError::Data { .. } => ErrorKind::Data,
            DbError::Operational { .. } => ErrorKind::Operational,
            DbError::Integrity { .. } => ErrorKind::Integrity,
            DbError::Internal { .. } => ErrorKind::Internal,
            DbError::Programming { .. } => ErrorKind::Programming,
            DbError::NotSupported { .. } => ErrorKind::NotSupported,
        }
    }

    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            DbError::Warning { errno, .. }
            | DbError::Interface { errno, .. }
            | DbError::Database { errno, .. }
            | DbError::Data { errno, .. }
            | DbError::Operational { errno, .. }
            | DbError::Integrity { errno, .. }
            | DbError::Internal { errno, .. }
            | DbError::Programming { errno, .. }
            | DbError::NotSupported { errno, .. } => *errno,
        }
    }

    #[must_use]
    pub fn msg(&self) -> &str {
        match self {
            DbError::Warning { msg, .. }
            | DbError::Interface { msg, .. }
            | DbError::Database { msg, .. }
            | DbError::Data { msg, .. }
            | DbError::Operational { msg, .. }
            | DbError::Integrity { msg, .. }
            | DbError::Internal { msg, .. }
            | DbError::Programming { msg, .. }
            | DbError::NotSupported { msg, .. } => msg,
        }
    }

    /// True for the fixed "resource closed" interface error.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::Interface && self.errno() == Some(ER_CLOSED)
    }
}

/// Map a MySQL-family error onto an error kind.
///
/// The SQLSTATE class decides first; when it is missing or generic (`HY`),
/// the numeric code decides.
#[must_use]
pub fn classify_mysql_error(errno: Option<i32>, sqlstate: Option<&str>) -> ErrorKind {
    if let Some(kind) = sqlstate.and_then(kind_for_sqlstate) {
        return kind;
    }
    match errno {
        Some(1062 | 1169 | 1216 | 1217 | 1451 | 1452 | 1557 | 1586) => ErrorKind::Integrity,
        Some(1205 | 1213) => ErrorKind::Internal,
        Some(1044 | 1045 | 1049 | 1054 | 1064 | 1109 | 1146 | 1149) => ErrorKind::Programming,
        Some(1264 | 1265 | 1292 | 1366 | 1406) => ErrorKind::Data,
        Some(1235) => ErrorKind::NotSupported,
        Some(2000..=2999) => {
            if matches!(errno, Some(2002 | 2003 | 2005 | 2006 | 2013 | 2055)) {
                ErrorKind::Operational
            } else {
                ErrorKind::Interface
            }
        }
        Some(1000..=1999) => ErrorKind::Operational,
        _ => ErrorKind::Database,
    }
}

fn kind_for_sqlstate(sqlstate: &str) -> Option<ErrorKind> {
    let class = sqlstate.get(..2)?;
    let kind = match class {
        "02" | "21" | "22" => ErrorKind::Data,
        "08" | "0K" | "HZ" => ErrorKind::Operational,
        "0A" => ErrorKind::NotSupported,
        "23" | "XA" => ErrorKind::Integrity,
        "24" | "25" | "26" | "27" | "28" | "2A" | "2C" | "34" | "35" | "37" | "3C" | "3D"
        | "3F" | "42" => ErrorKind::Programming,
        "40" | "44" => ErrorKind::Internal,
        "07" | "2B" | "2D" | "2E" | "33" => ErrorKind::Database,
        _ => return None,
    };
    Some(kind)
}
