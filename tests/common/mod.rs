#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use singlestoredb::config::ConnectionConfig;
use singlestoredb::converters::{ConverterTable, default_converters};
use singlestoredb::driver::{
    BackendError, BufferedResults, Driver, NativeCursor, NextSet, RawColumn, ResultSetData,
    ScrollMode, Session,
};
use singlestoredb::field_type;
use singlestoredb::prelude::*;
use singlestoredb::translation::ParamStyle;

/// What the scripted backend answers for one SQL text.
#[derive(Clone)]
pub enum Reply {
    Sets(Vec<ResultSetData>),
    Fail(i32, String),
    /// Sets produced before a later statement of the batch failed.
    SetsThenFail(Vec<ResultSetData>, i32, String),
}

#[derive(Default)]
pub struct Script {
    replies: HashMap<String, Reply>,
    /// Statements as the backend received them, after parameter binding.
    pub log: Vec<(String, Option<Params>)>,
    /// Report the end of results as an error rather than a plain `Exhausted`.
    pub nextset_errors: Option<i32>,
    /// Variables written through `set <scope> <name>=?`, read by `show ... like`.
    pub variables: HashMap<String, Value>,
}

/// A backend that answers from a script and records what it was sent.
#[derive(Clone)]
pub struct FakeDriver {
    pub script: Arc<Mutex<Script>>,
    pub ping_ok: Arc<AtomicBool>,
    /// Cleared to act like a backend where every statement gets a fresh server session.
    pub keeps_session_state: Arc<AtomicBool>,
    converters: ConverterTable,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            ping_ok: Arc::new(AtomicBool::new(true)),
            keeps_session_state: Arc::new(AtomicBool::new(true)),
            converters: default_converters(),
        }
    }

    pub fn reply(&self, sql: &str, reply: Reply) -> &Self {
        self.lock().replies.insert(sql.to_string(), reply);
        self
    }

    pub fn rows(&self, sql: &str, columns: Vec<RawColumn>, rows: Vec<Vec<Value>>) -> &Self {
        self.reply(sql, Reply::Sets(vec![ResultSetData::rows(columns, rows)]))
    }

    pub fn fail(&self, sql: &str, errno: i32, msg: &str) -> &Self {
        self.reply(sql, Reply::Fail(errno, msg.to_string()))
    }

    pub fn nextset_errors(&self, errno: i32) {
        self.lock().nextset_errors = Some(errno);
    }

    pub fn variable(&self, name: &str, value: impl Into<Value>) -> &Self {
        self.lock().variables.insert(name.to_string(), value.into());
        self
    }

    pub fn log(&self) -> Vec<(String, Option<Params>)> {
        self.lock().log.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &str {
        "fake"
    }

    fn paramstyle(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    async fn connect(&self) -> Result<Box<dyn Session>, BackendError> {
        Ok(Box::new(FakeSession {
            driver: self.clone(),
            open: Arc::new(Mutex::new(true)),
        }))
    }
}

pub struct FakeSession {
    driver: FakeDriver,
    open: Arc<Mutex<bool>>,
}

impl FakeSession {
    fn check(&self) -> Result<(), BackendError> {
        if *self.open.lock().unwrap_or_else(PoisonError::into_inner) {
            Ok(())
        } else {
            Err(BackendError::Reference)
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    fn cursor(&self) -> Result<Box<dyn NativeCursor>, BackendError> {
        self.check()?;
        Ok(Box::new(FakeCursor {
            driver: self.driver.clone(),
            open: Arc::downgrade(&self.open),
            results: BufferedResults::new(),
            last_batch_of_one: None,
        }))
    }

    async fn commit(&self) -> Result<(), BackendError> {
        self.check()?;
        self.driver.lock().log.push(("COMMIT".to_string(), None));
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BackendError> {
        self.check()?;
        self.driver.lock().log.push(("ROLLBACK".to_string(), None));
        Ok(())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.check()?;
        if self.driver.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::native(2013, "Lost connection to server"))
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
        Ok(())
    }

    fn keeps_session_state(&self) -> bool {
        self.driver.keeps_session_state.load(Ordering::SeqCst)
    }
}

pub struct FakeCursor {
    driver: FakeDriver,
    open: Weak<Mutex<bool>>,
    results: BufferedResults,
    /// Batches of one hand back the previous row again, like some native cursors do.
    last_batch_of_one: Option<Vec<Value>>,
}

impl FakeCursor {
    fn check(&self) -> Result<(), BackendError> {
        match self.open.upgrade() {
            Some(open) if *open.lock().unwrap_or_else(PoisonError::into_inner) => Ok(()),
            _ => Err(BackendError::Reference),
        }
    }
}

#[async_trait]
impl NativeCursor for FakeCursor {
    async fn execute(&mut self, sql: &str, params: Option<Params>) -> Result<(), BackendError> {
        self.check()?;
        self.results.clear();
        self.last_batch_of_one = None;
        let reply = {
            let mut script = self.driver.lock();
            script.log.push((sql.to_string(), params.clone()));
            match script.replies.get(sql).cloned() {
                Some(reply) => Some(reply),
                None => script.variable_statement(sql, params),
            }
        };
        match reply {
            Some(Reply::Sets(sets)) => self.results.load(sets),
            Some(Reply::Fail(errno, msg)) => return Err(BackendError::native(errno, msg)),
            Some(Reply::SetsThenFail(sets, errno, msg)) => self
                .results
                .load_until_error(sets, BackendError::native(errno, msg)),
            None => self.results.load(vec![ResultSetData::affected(1, None)]),
        }
        Ok(())
    }

    fn description(&self) -> Option<&[RawColumn]> {
        self.results.description()
    }

    async fn fetchone(&mut self) -> Result<Option<Vec<Value>>, BackendError> {
        self.check()?;
        Ok(self.results.fetchone())
    }

    async fn fetchmany(&mut self, size: usize) -> Result<Vec<Vec<Value>>, BackendError> {
        self.check()?;
        if size == 1 {
            if let Some(row) = &self.last_batch_of_one {
                return Ok(vec![row.clone()]);
            }
            let rows = self.results.fetchmany(1);
            self.last_batch_of_one = rows.first().cloned();
            return Ok(rows);
        }
        Ok(self.results.fetchmany(size))
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, BackendError> {
        self.check()?;
        Ok(self.results.fetchall())
    }

    async fn nextset(&mut self) -> NextSet {
        if let Err(e) = self.check() {
            return NextSet::Error(e);
        }
        match self.results.nextset() {
            NextSet::Exhausted => match self.driver.lock().nextset_errors {
                Some(errno) => NextSet::Error(BackendError::native(errno, "No result set")),
                None => NextSet::Exhausted,
            },
            other => other,
        }
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
        self.check()
    }

    fn is_connected(&self) -> bool {
        self.check().is_ok()
    }
}

impl Script {
    /// Serve `set <scope> <name>=?` and `show <scope> variables like '<pattern>'`
    /// from the variable store.
    fn variable_statement(&mut self, sql: &str, params: Option<Params>) -> Option<Reply> {
        if let Some(rest) = sql.strip_prefix("set ") {
            let (_, assignment) = rest.split_once(' ')?;
            let name = assignment.strip_suffix("=?")?;
            let Some(Params::Positional(mut values)) = params else {
                return None;
            };
            // The server reports every variable back as text.
            let value = values.pop()?.to_sql_text().map_or(Value::Null, Value::Text);
            self.variables.insert(name.to_string(), value);
            return Some(Reply::Sets(vec![ResultSetData::affected(0, None)]));
        }
        let pattern = sql
            .strip_prefix("show ")?
            .split_once(" variables like '")?
            .1
            .strip_suffix('\'')?;
        let mut names: Vec<&String> = self
            .variables
            .keys()
            .filter(|name| like(pattern.as_bytes(), name.as_bytes()))
            .collect();
        names.sort();
        let rows = names
            .into_iter()
            .map(|name| vec![Value::from(name.as_str()), self.variables[name].clone()])
            .collect();
        Some(Reply::Sets(vec![ResultSetData::rows(
            vec![
                RawColumn::new("Variable_name", field_type::VAR_STRING),
                RawColumn::new("Value", field_type::VAR_STRING),
            ],
            rows,
        )]))
    }
}

/// SQL `LIKE` with `%`, `_` and backslash escapes.
fn like(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'%', rest)) => (0..=text.len()).any(|i| like(rest, &text[i..])),
        Some((b'_', rest)) => !text.is_empty() && like(rest, &text[1..]),
        Some((b'\\', [escaped, rest @ ..])) => {
            text.first() == Some(escaped) && like(rest, &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && like(rest, &text[1..]),
    }
}

pub async fn connect(driver: &FakeDriver, format: ResultFormat) -> Result<Connection, DbError> {
    Connection::with_driver(ConnectionConfig::default(), Arc::new(driver.clone()), format).await
}
