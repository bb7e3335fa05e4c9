use url::Url;

use crate::config::{ConnectionConfig, DEFAULT_HTTP_PORT, DEFAULT_HTTPS_PORT};
use crate::error::DbError;

/// Construction arguments for the Data API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpArgs {
    pub base_url: Url,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl HttpArgs {
    /// Resolve an API path against the server root.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Programming` if the path cannot be joined onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, DbError> {
        self.base_url
            .join(path)
            .map_err(|e| DbError::programming(format!("Invalid HTTP API path {path}: {e}")))
    }
}

/// Translate the resolved configuration into Data API arguments.
///
/// `charset`, `local_infile`, `pure_python` and `odbc_driver` have no meaning over
/// HTTP and are dropped.
///
/// # Errors
///
/// Returns `DbError::Programming` when host and port do not form a valid URL.
pub fn remap_params(config: &ConnectionConfig, https: bool) -> Result<HttpArgs, DbError> {
    let scheme = if https { "https" } else { "http" };
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config
        .port
        .unwrap_or(if https { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT });
    let raw = format!("{scheme}://{host}:{port}/");
    let base_url =
        Url::parse(&raw).map_err(|e| DbError::programming(format!("Invalid HTTP API URL {raw}: {e}")))?;
    Ok(HttpArgs {
        base_url,
        user: config.user.clone(),
        password: config.password.clone(),
        database: config.database.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_base_url_from_host_and_port() {
        let config = ConnectionConfig {
            host: Some("db.example.com".into()),
            port: Some(9000),
            user: Some("admin".into()),
            database: Some("app".into()),
            charset: Some("utf8mb4".into()),
            ..ConnectionConfig::default()
        };
        let args = remap_params(&config, false).unwrap();
        assert_eq!(args.base_url.as_str(), "http://db.example.com:9000/");
        assert_eq!(
            args.endpoint("api/v2/exec").unwrap().as_str(),
            "http://db.example.com:9000/api/v2/exec"
        );
        assert_eq!(args.database.as_deref(), Some("app"));
    }

    #[test]
    fn https_defaults() {
        let args = remap_params(&ConnectionConfig::default(), true).unwrap();
        assert_eq!(args.base_url.scheme(), "https");
        assert_eq!(args.base_url.host_str(), Some("localhost"));
        // 443 is the scheme default and is not rendered
        assert_eq!(args.base_url.port_or_known_default(), Some(443));
    }

    #[test]
    fn rejects_unparseable_host() {
        let config = ConnectionConfig {
            host: Some("bad host".into()),
            ..ConnectionConfig::default()
        };
        let err = remap_params(&config, false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Programming);
    }
}
