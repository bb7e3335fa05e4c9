use odbc_api::parameter::{InputParameter, VarBinaryBox, VarCharBox};

use crate::driver::BackendError;
use crate::types::{Params, Value};

/// How one value is handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OdbcParam {
    /// Text the server casts to the column type; `None` binds NULL.
    Text(Option<String>),
    Binary(Vec<u8>),
}

impl OdbcParam {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Bytes(bytes) => OdbcParam::Binary(bytes),
            other => OdbcParam::Text(other.to_sql_text()),
        }
    }

    #[must_use]
    pub fn into_parameter(self) -> Box<dyn InputParameter> {
        match self {
            OdbcParam::Text(Some(text)) => Box::new(VarCharBox::from_string(text)),
            OdbcParam::Text(None) => Box::new(VarCharBox::null()),
            OdbcParam::Binary(bytes) => Box::new(VarBinaryBox::from_vec(bytes)),
        }
    }
}

/// Classify bound parameters; byte strings keep their bytes.
///
/// # Errors
///
/// Returns `BackendError::NotSupported` for named parameters.
pub fn convert_params(params: Params) -> Result<Vec<OdbcParam>, BackendError> {
    match params {
        Params::Positional(values) => Ok(values.into_iter().map(OdbcParam::from_value).collect()),
        Params::Named(_) => Err(BackendError::NotSupported(
            "named parameters are not supported by the ODBC driver".to_string(),
        )),
    }
}
