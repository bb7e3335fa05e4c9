use mysql_async::OptsBuilder;

use crate::config::{ConnectionConfig, DEFAULT_PORT};
use crate::error::DbError;

/// Construction arguments for the native protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlArgs {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub charset: Option<String>,
    /// Recorded for callers; no local file handler is installed.
    pub allow_local_infile: bool,
}

/// Translate the resolved configuration into native client arguments.
///
/// `driver` and `odbc_driver` are dropped and `pure_python` is accepted but has no
/// effect on this client.
///
/// # Errors
///
/// Returns `DbError::Programming` for a character set name that is not a plain identifier.
pub fn remap_params(config: &ConnectionConfig) -> Result<MysqlArgs, DbError> {
    if let Some(charset) = &config.charset
        && !is_plain_name(charset)
    {
        return Err(DbError::programming(format!("Invalid character set name: {charset}")));
    }
    Ok(MysqlArgs {
        host: config.host.clone().unwrap_or_else(|| "localhost".to_string()),
        port: config.port.unwrap_or(DEFAULT_PORT),
        user: config.user.clone(),
        password: config.password.clone(),
        database: config.database.clone(),
        charset: config.charset.clone(),
        allow_local_infile: config.local_infile.unwrap_or(false),
    })
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl MysqlArgs {
    #[must_use]
    pub fn opts(&self) -> OptsBuilder {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(self.user.clone())
            .pass(self.password.clone())
            .db_name(self.database.clone());
        if let Some(charset) = &self.charset {
            builder = builder.init(vec![format!("SET NAMES {charset}")]);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaps_defaults() {
        let config = ConnectionConfig {
            host: Some("db".into()),
            user: Some("me".into()),
            local_infile: Some(true),
            pure_python: Some(true),
            ..ConnectionConfig::default()
        };
        let args = remap_params(&config).unwrap();
        assert_eq!(args.host, "db");
        assert_eq!(args.port, DEFAULT_PORT);
        assert!(args.allow_local_infile);
        assert_eq!(args.charset, None);
    }

    #[test]
    fn rejects_injected_charset() {
        let config = ConnectionConfig {
            charset: Some("utf8; drop table x".into()),
            ..ConnectionConfig::default()
        };
        assert!(remap_params(&config).is_err());
        let config = ConnectionConfig {
            charset: Some("utf8mb4".into()),
            ..ConnectionConfig::default()
        };
        assert!(remap_params(&config).is_ok());
    }
}
