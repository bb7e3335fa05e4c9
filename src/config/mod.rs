//! Connection parameter resolution.
//!
//! Explicit arguments ([`ConnectOptions`]) are merged with a process-wide
//! [`OptionSource`], a URL-shaped host is expanded into its parts, and every value is
//! cast against [`PARAM_SCHEMA`] before a [`ConnectionConfig`] is produced.

mod options;
mod schema;
mod dsn;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub use options::{ConnectOptions, EnvOptions, MapOptions, OptionSource};
pub use schema::{PARAM_SCHEMA, ParamType, ParamValue, cast_bool_param, cast_param, param_type};
pub use dsn::{is_url_shaped, parse_url};

use crate::error::DbError;

/// Driver used when neither the arguments, the URL nor the option source name one.
pub const DEFAULT_DRIVER: &str = "mysql";

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

static DRIVER_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\w+\+").ok());

/// Fully resolved connection parameters; every value is already cast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub driver: Option<String>,
    pub pure_python: Option<bool>,
    pub local_infile: Option<bool>,
    pub odbc_driver: Option<String>,
    pub charset: Option<String>,
}

impl ConnectionConfig {
    /// The driver registry key: lowercased, with any `dialect+` prefix removed.
    #[must_use]
    pub fn driver_name(&self) -> String {
        let raw = self.driver.as_deref().unwrap_or(DEFAULT_DRIVER);
        match DRIVER_PREFIX.as_ref() {
            Some(re) => re.replace(raw, "").to_ascii_lowercase(),
            None => raw.to_ascii_lowercase(),
        }
    }

    /// The parameters as name/value pairs, omitting unset ones.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, ParamValue> {
        let mut out = BTreeMap::new();
        let mut put = |name: &str, value: Option<ParamValue>| {
            if let Some(v) = value {
                out.insert(name.to_string(), v);
            }
        };
        put("host", self.host.clone().map(ParamValue::Str));
        put("user", self.user.clone().map(ParamValue::Str));
        put("password", self.password.clone().map(ParamValue::Str));
        put("port", self.port.map(ParamValue::from));
        put("database", self.database.clone().map(ParamValue::Str));
        put("driver", self.driver.clone().map(ParamValue::Str));
        put("pure_python", self.pure_python.map(ParamValue::Bool));
        put("local_infile", self.local_infile.map(ParamValue::Bool));
        put("odbc_driver", self.odbc_driver.clone().map(ParamValue::Str));
        put("charset", self.charset.clone().map(ParamValue::Str));
        out
    }

    fn from_cast(params: BTreeMap<String, ParamValue>) -> Result<Self, DbError> {
        let mut config = ConnectionConfig::default();
        for (name, value) in params {
            match (name.as_str(), value) {
                ("host", ParamValue::Str(v)) => config.host = Some(v),
                ("user", ParamValue::Str(v)) => config.user = Some(v),
                ("password", ParamValue::Str(v)) => config.password = Some(v),
                ("database", ParamValue::Str(v)) => config.database = Some(v),
                ("driver", ParamValue::Str(v)) => config.driver = Some(v.to_ascii_lowercase()),
                ("odbc_driver", ParamValue::Str(v)) => config.odbc_driver = Some(v),
                ("charset", ParamValue::Str(v)) => config.charset = Some(v),
                ("pure_python", ParamValue::Bool(v)) => config.pure_python = Some(v),
                ("local_infile", ParamValue::Bool(v)) => config.local_infile = Some(v),
                ("port", ParamValue::Int(v)) => {
                    // Zero means "not set", as with an absent port.
                    if v != 0 {
                        config.port = Some(u16::try_from(v).map_err(|_| {
                            DbError::programming(format!("Port number out of range: {v}"))
                        })?);
                    }
                }
                (other, value) => {
                    return Err(DbError::programming(format!(
                        "Invalid value for connection parameter {other}: {value}"
                    )));
                }
            }
        }
        Ok(config)
    }
}

/// Build the final connection parameters.
///
/// Explicit options win over the option source. A URL-shaped `host` is parsed and
/// its parts override both, except that an explicitly given driver is kept over the
/// URL scheme. All keys are then cast; the port defaults by driver (80 for `http`,
/// 443 for `https`, 3306 otherwise) and a password without a user is dropped.
///
/// # Errors
///
/// Returns `DbError::Programming` for unknown parameter names, values that do not
/// cast to their declared type, and malformed URLs.
pub fn build_params(
    opts: &ConnectOptions,
    source: &dyn OptionSource,
) -> Result<ConnectionConfig, DbError> {
    let mut out: BTreeMap<String, ParamValue> = BTreeMap::new();

    for (name, _) in PARAM_SCHEMA {
        let value = opts
            .get(name)
            .cloned()
            .or_else(|| source.get(name).map(ParamValue::Str));
        if let Some(value) = value {
            out.insert((*name).to_string(), value);
        }
    }
    for (name, value) in opts.params() {
        out.entry(name.clone()).or_insert_with(|| value.clone());
    }

    let url_host = out
        .get("host")
        .and_then(ParamValue::as_str)
        .filter(|h| is_url_shaped(h))
        .map(str::to_string);
    if let Some(url) = url_host {
        let mut parts = parse_url(&url)?;
        if opts.get("driver").is_some() {
            parts.remove("driver");
        }
        out.remove("host");
        for (name, value) in parts {
            out.insert(name, ParamValue::Str(value));
        }
    }

    let mut cast = BTreeMap::new();
    for (name, value) in out {
        let name = name.to_ascii_lowercase();
        let value = cast_param(&name, value)?;
        cast.insert(name, value);
    }
    let mut config = ConnectionConfig::from_cast(cast)?;

    if config.port.is_none() {
        config.port = Some(default_port(&config.driver_name(), source)?);
    }

    if config.user.is_none() {
        config.password = None;
    }

    debug!(driver = %config.driver_name(), host = ?config.host, "resolved connection parameters");
    Ok(config)
}

fn default_port(driver: &str, source: &dyn OptionSource) -> Result<u16, DbError> {
    let (option, fallback) = match driver {
        "http" => ("http_port", DEFAULT_HTTP_PORT),
        "https" => ("http_port", DEFAULT_HTTPS_PORT),
        _ => ("port", DEFAULT_PORT),
    };
    match source.get(option) {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| DbError::programming(format!("Invalid integer value for {option}: {raw}"))),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_options() -> MapOptions {
        MapOptions::new()
    }

    #[test]
    fn explicit_arguments_win_over_source() {
        let source = MapOptions::new().with("user", "env_user").with("database", "env_db");
        let opts = ConnectOptions::new().with_host("h").with_user("me");
        let config = build_params(&opts, &source).unwrap();
        assert_eq!(config.user.as_deref(), Some("me"));
        assert_eq!(config.database.as_deref(), Some("env_db"));
        assert_eq!(config.port, Some(DEFAULT_PORT));
    }

    #[test]
    fn url_host_is_expanded_and_cast() {
        let opts = ConnectOptions::from_url("user:pw@host:1234/db?local_infile=yes");
        let config = build_params(&opts, &no_options()).unwrap();
        assert_eq!(config.host.as_deref(), Some("host"));
        assert_eq!(config.user.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.port, Some(1234));
        assert_eq!(config.database.as_deref(), Some("db"));
        assert_eq!(config.local_infile, Some(true));
        assert_eq!(config.driver, None);
    }

    #[test]
    fn unknown_url_query_key_is_rejected() {
        let opts = ConnectOptions::from_url("user:pw@host:1234/db?x=1");
        let err = build_params(&opts, &no_options()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Programming);
        assert_eq!(err.msg(), "Unrecognized connection parameter: x");
    }

    #[test]
    fn http_ports_default_after_casting() {
        let config = build_params(&ConnectOptions::from_url("http://u@h/d"), &no_options()).unwrap();
        assert_eq!(config.driver.as_deref(), Some("http"));
        assert_eq!(config.port, Some(DEFAULT_HTTP_PORT));

        let config = build_params(&ConnectOptions::from_url("https://u@h/d"), &no_options()).unwrap();
        assert_eq!(config.port, Some(DEFAULT_HTTPS_PORT));

        let source = MapOptions::new().with("http_port", "9000");
        let config = build_params(&ConnectOptions::from_url("http://u@h/d"), &source).unwrap();
        assert_eq!(config.port, Some(9000));
    }

    #[test]
    fn url_port_equal_to_scheme_default_beats_source() {
        let source = MapOptions::new().with("http_port", "9000");
        let config = build_params(&ConnectOptions::from_url("http://u@h:80/d"), &source).unwrap();
        assert_eq!(config.port, Some(80));
    }

    #[test]
    fn url_credentials_reach_the_config_decoded() {
        let config =
            build_params(&ConnectOptions::from_url("me:p^ss{x}@h/db"), &no_options()).unwrap();
        assert_eq!(config.user.as_deref(), Some("me"));
        assert_eq!(config.password.as_deref(), Some("p^ss{x}"));
    }

    #[test]
    fn explicit_driver_beats_url_scheme() {
        let opts = ConnectOptions::from_url("http://u@h/d").with_driver("mysql");
        let config = build_params(&opts, &no_options()).unwrap();
        assert_eq!(config.driver.as_deref(), Some("mysql"));
        assert_eq!(config.port, Some(DEFAULT_PORT));
    }

    #[test]
    fn password_without_user_is_dropped() {
        let opts = ConnectOptions::new().with_host("h").with_password("secret");
        let config = build_params(&opts, &no_options()).unwrap();
        assert_eq!(config.password, None);
    }

    #[test]
    fn unknown_explicit_key_fails_without_partial_result() {
        let opts = ConnectOptions::new().with_host("h").with_param("colour", "red");
        let err = build_params(&opts, &no_options()).unwrap_err();
        assert_eq!(err.msg(), "Unrecognized connection parameter: colour");
    }

    #[test]
    fn driver_name_strips_dialect_prefix() {
        let config = ConnectionConfig {
            driver: Some("mysql+odbc".into()),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.driver_name(), "odbc");
        assert_eq!(ConnectionConfig::default().driver_name(), DEFAULT_DRIVER);
    }

    #[test]
    fn env_var_names() {
        assert_eq!(EnvOptions::var_name("results.format"), "SINGLESTOREDB_RESULTS_FORMAT");
        assert_eq!(EnvOptions::var_name("host"), "SINGLESTOREDB_HOST");
    }
}
