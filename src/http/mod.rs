//! SingleStore Data API (v2) backend over reqwest.
//!
//! - config: remapping the resolved configuration into endpoint arguments
//! - params: bound values to JSON arguments
//! - query: request/response bodies, dataType mapping, buffered result sets

pub mod config;
pub mod params;
pub mod query;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

pub use config::{HttpArgs, remap_params};

use crate::config::ConnectionConfig;
use crate::converters::{ConverterTable, default_converters, merge_converters};
use crate::driver::{
    BackendError, BufferedResults, Driver, HttpError, NativeCursor, NextSet, RawColumn,
    ResultSetData, ScrollMode, Session,
};
use crate::error::{DbError, ErrorKind, classify_mysql_error};
use crate::translation::ParamStyle;
use crate::types::{Params, Value};

const QUERY_PATH: &str = "api/v2/query/tuples";
const EXEC_PATH: &str = "api/v2/exec";
const PING_PATH: &str = "ping";

/// Map a Data API error onto the DB-API kinds.
#[must_use]
pub fn convert_error(err: HttpError) -> DbError {
    match err {
        HttpError::Api {
            errno: Some(errno),
            msg,
            ..
        } => DbError::new(classify_mysql_error(Some(errno), None), Some(errno), msg),
        HttpError::Api {
            status, msg, ..
        } => {
            let kind = match status {
                401 | 403 => ErrorKind::Operational,
                400..=499 => ErrorKind::Programming,
                _ => ErrorKind::Internal,
            };
            DbError::new(kind, None, format!("{status}: {msg}"))
        }
        HttpError::Transport(e) => DbError::new(ErrorKind::Operational, None, e.to_string()),
        HttpError::Decode(msg) => DbError::new(ErrorKind::Interface, None, msg),
        HttpError::Endpoint(msg) => DbError::new(ErrorKind::Programming, None, msg),
    }
}

/// Driver for the Data API, over plain HTTP or TLS.
#[derive(Debug)]
pub struct HttpDriver {
    args: Arc<HttpArgs>,
    converters: ConverterTable,
    https: bool,
}

impl HttpDriver {
    /// # Errors
    ///
    /// Returns `DbError::Programming` when the host and port do not form a URL.
    pub fn new(
        config: &ConnectionConfig,
        overrides: &ConverterTable,
        https: bool,
    ) -> Result<Self, DbError> {
        Ok(Self {
            args: Arc::new(remap_params(config, https)?),
            converters: merge_converters(overrides, &default_converters()),
            https,
        })
    }

    #[must_use]
    pub fn args(&self) -> &HttpArgs {
        &self.args
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &str {
        if self.https { "https" } else { "http" }
    }

    fn paramstyle(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    async fn connect(&self) -> Result<Box<dyn Session>, BackendError> {
        debug!(url = %self.args.base_url, "connecting to the HTTP API");
        let client = Client::builder().build().map_err(HttpError::from)?;
        let api = ApiClient {
            client,
            args: Arc::clone(&self.args),
        };
        api.ping().await?;
        Ok(Box::new(HttpSession {
            api: Arc::new(Mutex::new(Some(api))),
        }))
    }
}

/// A configured client plus the arguments every request needs.
#[derive(Debug, Clone)]
struct ApiClient {
    client: Client,
    args: Arc<HttpArgs>,
}

impl ApiClient {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.args.user {
            Some(user) => request.basic_auth(user, self.args.password.as_deref()),
            None => request,
        }
    }

    fn url(&self, path: &str) -> Result<url::Url, BackendError> {
        self.args
            .endpoint(path)
            .map_err(|e| BackendError::from(HttpError::Endpoint(e.msg().to_string())))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        sql: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<T, BackendError> {
        let body = query::ApiRequest {
            sql,
            args,
            database: self.args.database.as_deref(),
        };
        let request = self.authorize(self.client.post(self.url(path)?).json(&body));
        let response = check_status(request.send().await.map_err(HttpError::from)?).await?;
        Ok(response.json::<T>().await.map_err(HttpError::from)?)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let request = self.authorize(self.client.get(self.url(PING_PATH)?));
        check_status(request.send().await.map_err(HttpError::from)?).await?;
        Ok(())
    }

    async fn run(&self, sql: &str, params: Option<Params>) -> Result<Vec<ResultSetData>, BackendError> {
        let args = match params {
            Some(params) => params::convert_params(params)?,
            None => Vec::new(),
        };
        if query::returns_rows(sql) {
            let response: query::QueryResponse = self.post(QUERY_PATH, sql, args).await?;
            Ok(query::build_result_sets(response)?)
        } else {
            let response: query::ExecResponse = self.post(EXEC_PATH, sql, args).await?;
            Ok(vec![query::exec_result(&response)])
        }
    }
}

async fn check_status(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = error_body(response.text().await);
    Err(query::parse_api_error(status.as_u16(), &body))
}

/// Text of an error response; a body that cannot be read is described instead.
fn error_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    read.unwrap_or_else(|e| format!("(response body could not be read: {e})"))
}

/// A Data API "session": the API is stateless, so this only tracks liveness.
pub struct HttpSession {
    api: Arc<Mutex<Option<ApiClient>>>,
}

impl HttpSession {
    async fn client(&self) -> Result<ApiClient, BackendError> {
        self.api.lock().await.clone().ok_or(BackendError::Reference)
    }
}

#[async_trait]
impl Session for HttpSession {
    fn cursor(&self) -> Result<Box<dyn NativeCursor>, BackendError> {
        Ok(Box::new(HttpCursor {
            api: Arc::downgrade(&self.api),
            results: BufferedResults::new(),
        }))
    }

    /// Every statement is committed as it runs, so there is never anything pending.
    async fn commit(&self) -> Result<(), BackendError> {
        self.client().await.map(|_| ())
    }

    async fn rollback(&self) -> Result<(), BackendError> {
        Err(BackendError::NotSupported(
            "the HTTP API does not support transactions".to_string(),
        ))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.client().await?.ping().await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.api.lock().await.take();
        Ok(())
    }

    fn keeps_session_state(&self) -> bool {
        false
    }
}

pub struct HttpCursor {
    api: Weak<Mutex<Option<ApiClient>>>,
    results: BufferedResults,
}

#[async_trait]
impl NativeCursor for HttpCursor {
    async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), BackendError> {
        self.results.clear();
        let shared = self.api.upgrade().ok_or(BackendError::Reference)?;
        let api = shared.lock().await.clone().ok_or(BackendError::Reference)?;
        debug!(sql, "executing over the HTTP API");
        let sets = api.run(sql, params).await?;
        self.results.load(sets);
        Ok(())
    }

    fn description(&self) -> Option<&[RawColumn]> {
        self.results.description()
    }

    async fn fetchone(&mut self) -> Result<Option<Vec<Value>>, BackendError> {
        Ok(self.results.fetchone())
    }

    async fn fetchmany(&mut self, size: usize) -> Result<Vec<Vec<Value>>, BackendError> {
        Ok(self.results.fetchmany(size))
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, BackendError> {
        Ok(self.results.fetchall())
    }

    async fn nextset(&mut self) -> NextSet {
        self.results.nextset()
    }

    fn rowcount(&self) -> i64 {
        self.results.rowcount()
    }

    fn lastrowid(&self) -> Option<u64> {
        self.results.lastrowid()
    }

    async fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), BackendError> {
        self.results.scroll(value, mode)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.results.clear();
        if self.api.strong_count() == 0 {
            return Err(BackendError::Reference);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.api.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_with_codes_are_classified() {
        let err = convert_error(HttpError::Api {
            status: 500,
            errno: Some(1064),
            msg: "You have an error in your SQL syntax".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Programming);
        assert_eq!(err.errno(), Some(1064));
    }

    #[test]
    fn api_errors_without_codes_use_status() {
        let err = convert_error(HttpError::Api {
            status: 401,
            errno: None,
            msg: "denied".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Operational);
        let err = convert_error(HttpError::Decode("bad".into()));
        assert_eq!(err.kind(), ErrorKind::Interface);
    }

    #[test]
    fn endpoint_join_failures_are_configuration_errors() {
        let driver =
            HttpDriver::new(&ConnectionConfig::default(), &ConverterTable::new(), false).unwrap();
        let mut args = driver.args().clone();
        args.base_url = url::Url::parse("data:text/plain,root").unwrap();
        let api = ApiClient {
            client: Client::new(),
            args: Arc::new(args),
        };
        let err = api.url(QUERY_PATH).unwrap_err();
        assert!(matches!(err, BackendError::Http(HttpError::Endpoint(_))), "{err}");
        let err = driver.convert_exception(err);
        assert_eq!(err.kind(), ErrorKind::Programming);
        assert!(err.msg().contains(QUERY_PATH), "{err}");
    }

    #[test]
    fn unreadable_error_bodies_keep_the_read_failure() {
        let read: Result<String, std::io::Error> =
            Err(std::io::Error::other("connection reset mid-body"));
        let body = error_body(read);
        assert!(body.contains("connection reset mid-body"), "{body}");
        match query::parse_api_error(502, &body) {
            HttpError::Api { status, msg, .. } => {
                assert_eq!(status, 502);
                assert!(msg.contains("connection reset mid-body"), "{msg}");
            }
            other => panic!("expected an API error, got {other:?}"),
        }
        assert_eq!(error_body::<std::io::Error>(Ok("Error 1146: gone".into())), "Error 1146: gone");
    }

    #[tokio::test]
    async fn rollback_is_not_supported_and_close_tears_down() {
        let driver = HttpDriver::new(&ConnectionConfig::default(), &ConverterTable::new(), false).unwrap();
        let session = HttpSession {
            api: Arc::new(Mutex::new(Some(ApiClient {
                client: Client::new(),
                args: Arc::clone(&driver.args),
            }))),
        };
        let err = driver.convert_exception(session.rollback().await.unwrap_err());
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(!session.keeps_session_state());

        let mut cursor = session.cursor().unwrap();
        session.close().await.unwrap();
        let err = cursor.execute("select 1", None).await.unwrap_err();
        assert!(err.is_reference());
        assert!(session.commit().await.unwrap_err().is_reference());
    }
}
