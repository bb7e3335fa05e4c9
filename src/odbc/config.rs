use crate::config::{ConnectionConfig, DEFAULT_PORT};
use crate::error::DbError;

pub const DEFAULT_ODBC_DRIVER: &str = "SingleStore ODBC Unicode Driver";

/// Construction arguments for an ODBC connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdbcArgs {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
}

/// Translate the resolved configuration into ODBC connection attributes.
///
/// # Errors
///
/// Returns `DbError::Programming` for an empty ODBC driver name.
pub fn remap_params(config: &ConnectionConfig) -> Result<OdbcArgs, DbError> {
    let driver = config
        .odbc_driver
        .clone()
        .unwrap_or_else(|| DEFAULT_ODBC_DRIVER.to_string());
    if driver.trim().is_empty() {
        return Err(DbError::programming("ODBC driver name must not be empty"));
    }
    Ok(OdbcArgs {
        driver,
        host: config.host.clone().unwrap_or_else(|| "localhost".to_string()),
        port: config.port.unwrap_or(DEFAULT_PORT),
        database: config.database.clone(),
        user: config.user.clone(),
        password: config.password.clone(),
        charset: config.charset.clone(),
    })
}

/// Quote an attribute value when it contains characters the connection string
/// grammar reserves.
fn attribute(value: &str) -> String {
    if value.contains([';', '{', '}', '=']) || value.trim() != value {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

impl OdbcArgs {
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut out = format!(
            "Driver={{{}}};Server={};Port={};",
            self.driver.replace('}', "}}"),
            attribute(&self.host),
            self.port
        );
        let optional = [
            ("Database", &self.database),
            ("UID", &self.user),
            ("PWD", &self.password),
            ("CharSet", &self.charset),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                out.push_str(key);
                out.push('=');
                out.push_str(&attribute(value));
                out.push(';');
            }
        }
        out
    }
}
