use std::collections::{BTreeMap, HashMap};

use super::schema::ParamValue;
use crate::converters::{ConverterTable, Pipeline};
use crate::results::ResultFormat;

/// The process-wide option resolver consulted for every parameter not passed explicitly.
pub trait OptionSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Options from `SINGLESTOREDB_<NAME>` environment variables.
///
/// Dots in option names become underscores: `results.format` is read from
/// `SINGLESTOREDB_RESULTS_FORMAT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOptions;

impl EnvOptions {
    #[must_use]
    pub fn var_name(name: &str) -> String {
        format!("SINGLESTOREDB_{}", name.replace('.', "_").to_ascii_uppercase())
    }
}

impl OptionSource for EnvOptions {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(Self::var_name(name))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// Options from an explicit map; unset names resolve to nothing.
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    values: HashMap<String, String>,
}

impl MapOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl OptionSource for MapOptions {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Explicit call-site connection arguments.
///
/// ```rust
/// use singlestoredb::prelude::*;
///
/// let opts = ConnectOptions::new()
///     .with_host("user:secret@db.example.com/app")
///     .with_charset("utf8mb4")
///     .with_results_format(ResultFormat::Dict);
/// # let _ = opts;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    params: BTreeMap<String, ParamValue>,
    pub(crate) converters: ConverterTable,
    pub(crate) results_format: Option<ResultFormat>,
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a connection URL (or bare host name).
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        Self::new().with_host(url)
    }

    #[must_use]
    pub fn with_host(self, host: &str) -> Self {
        self.with_param("host", host)
    }

    #[must_use]
    pub fn with_user(self, user: &str) -> Self {
        self.with_param("user", user)
    }

    #[must_use]
    pub fn with_password(self, password: &str) -> Self {
        self.with_param("password", password)
    }

    #[must_use]
    pub fn with_port(self, port: u16) -> Self {
        self.with_param("port", port)
    }

    #[must_use]
    pub fn with_database(self, database: &str) -> Self {
        self.with_param("database", database)
    }

    #[must_use]
    pub fn with_driver(self, driver: &str) -> Self {
        self.with_param("driver", driver)
    }

    #[must_use]
    pub fn with_pure_python(self, pure_python: bool) -> Self {
        self.with_param("pure_python", pure_python)
    }

    #[must_use]
    pub fn with_local_infile(self, local_infile: bool) -> Self {
        self.with_param("local_infile", local_infile)
    }

    #[must_use]
    pub fn with_odbc_driver(self, odbc_driver: &str) -> Self {
        self.with_param("odbc_driver", odbc_driver)
    }

    #[must_use]
    pub fn with_charset(self, charset: &str) -> Self {
        self.with_param("charset", charset)
    }

    /// Set any parameter by name. Names are validated when the options are built.
    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a converter for a type code; it runs after the backend's own converter.
    #[must_use]
    pub fn with_converter(mut self, code: u16, pipeline: Pipeline) -> Self {
        self.converters.insert(code, pipeline);
        self
    }

    #[must_use]
    pub fn with_converters(mut self, converters: ConverterTable) -> Self {
        for (code, pipeline) in converters.iter() {
            self.converters.insert(*code, pipeline.clone());
        }
        self
    }

    #[must_use]
    pub fn with_results_format(mut self, format: ResultFormat) -> Self {
        self.results_format = Some(format);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.params.iter()
    }
}
