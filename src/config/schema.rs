use crate::error::DbError;

/// A connection parameter value before or after casting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ParamValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Declared type of a connection parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Bool,
}

/// Every connection parameter `connect` accepts, with its declared type.
pub static PARAM_SCHEMA: &[(&str, ParamType)] = &[
    ("host", ParamType::Str),
    ("user", ParamType::Str),
    ("password", ParamType::Str),
    ("port", ParamType::Int),
    ("database", ParamType::Str),
    ("driver", ParamType::Str),
    ("pure_python", ParamType::Bool),
    ("local_infile", ParamType::Bool),
    ("odbc_driver", ParamType::Str),
    ("charset", ParamType::Str),
];

#[must_use]
pub fn param_type(name: &str) -> Option<ParamType> {
    PARAM_SCHEMA
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ty)| *ty)
}

const TRUE_WORDS: &[&str] = &["on", "t", "true", "y", "yes", "enabled", "enable"];
const FALSE_WORDS: &[&str] = &["off", "f", "false", "n", "no", "disabled", "disable"];

/// Cast a parameter value to a boolean.
///
/// Accepts booleans, the integers `0`/`1` (also as text), and the usual on/off
/// spellings in any case.
///
/// # Errors
///
/// Returns `DbError::Programming` for any other value.
pub fn cast_bool_param(value: &ParamValue) -> Result<bool, DbError> {
    let unrecognized = || DbError::programming(format!("Unrecognized value for bool: {value}"));
    match value {
        ParamValue::Bool(b) => Ok(*b),
        ParamValue::Int(1) => Ok(true),
        ParamValue::Int(0) => Ok(false),
        ParamValue::Int(_) => Err(unrecognized()),
        ParamValue::Str(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(1) => return Ok(true),
                Ok(0) => return Ok(false),
                _ => {}
            }
            let lower = s.to_ascii_lowercase();
            if TRUE_WORDS.contains(&lower.as_str()) {
                Ok(true)
            } else if FALSE_WORDS.contains(&lower.as_str()) {
                Ok(false)
            } else {
                Err(unrecognized())
            }
        }
    }
}

/// Cast one parameter to its declared type.
///
/// # Errors
///
/// Returns `DbError::Programming` for unknown names and values that do not cast.
pub fn cast_param(name: &str, value: ParamValue) -> Result<ParamValue, DbError> {
    let Some(ty) = param_type(name) else {
        return Err(DbError::programming(format!(
            "Unrecognized connection parameter: {name}"
        )));
    };
    match ty {
        ParamType::Bool => cast_bool_param(&value).map(ParamValue::Bool),
        ParamType::Str => Ok(match value {
            ParamValue::Str(s) => ParamValue::Str(s),
            other => ParamValue::Str(other.to_string()),
        }),
        ParamType::Int => match value {
            ParamValue::Int(i) => Ok(ParamValue::Int(i)),
            ParamValue::Bool(b) => Ok(ParamValue::Int(i64::from(b))),
            ParamValue::Str(s) => s.trim().parse::<i64>().map(ParamValue::Int).map_err(|_| {
                DbError::programming(format!("Invalid integer value for {name}: {s}"))
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_spellings() {
        for word in ["on", "T", "true", "Y", "yes", "ENABLED", "enable", "1"] {
            assert!(cast_bool_param(&ParamValue::from(word)).unwrap(), "{word}");
        }
        assert!(cast_bool_param(&ParamValue::Int(1)).unwrap());
        assert!(cast_bool_param(&ParamValue::Bool(true)).unwrap());
    }

    // Earlier releases returned `true` for these spellings as well; they now cast to `false`.
    #[test]
    fn false_spellings_cast_to_false() {
        for word in ["off", "F", "false", "N", "no", "DISABLED", "disable", "0"] {
            assert!(!cast_bool_param(&ParamValue::from(word)).unwrap(), "{word}");
        }
        assert!(!cast_bool_param(&ParamValue::Int(0)).unwrap());
    }

    #[test]
    fn other_values_are_rejected() {
        for value in [ParamValue::from("maybe"), ParamValue::Int(2), ParamValue::from("")] {
            let err = cast_bool_param(&value).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Programming);
            assert!(err.msg().starts_with("Unrecognized value for bool"));
        }
    }

    #[test]
    fn casts_to_declared_types() {
        assert_eq!(cast_param("port", "1234".into()).unwrap(), ParamValue::Int(1234));
        assert_eq!(cast_param("local_infile", "yes".into()).unwrap(), ParamValue::Bool(true));
        assert_eq!(cast_param("user", ParamValue::Int(7)).unwrap(), ParamValue::from("7"));
        assert!(cast_param("port", "abc".into()).is_err());
        let err = cast_param("colour", "red".into()).unwrap_err();
        assert_eq!(err.msg(), "Unrecognized connection parameter: colour");
    }
}
