use std::sync::OnceLock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use odbc_api::parameter::InputParameter;
use odbc_api::{Connection, ConnectionOptions, Environment};
use tokio::sync::oneshot;
use tracing::debug;

use super::params::OdbcParam;
use super::query::{self, Batch};
use crate::driver::{BackendError, ResultSetData};

/// Client error for a worker thread that could not be started.
const CR_UNKNOWN_ERROR: i32 = 2000;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, odbc_api::Error> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

type Reply<T> = oneshot::Sender<Result<T, odbc_api::Error>>;

enum Command {
    Execute {
        sql: String,
        params: Vec<OdbcParam>,
        respond_to: Reply<Batch>,
    },
    /// A statement without parameters or results, such as `COMMIT`.
    Statement {
        sql: &'static str,
        respond_to: Reply<()>,
    },
}

/// Owns one ODBC connection on a dedicated thread.
///
/// The driver manager blocks, so every call is shipped to the thread and the
/// caller awaits the reply. Dropping the worker ends the thread and closes the
/// connection.
pub struct OdbcWorker {
    sender: Sender<Command>,
}

impl OdbcWorker {
    /// Start the thread and connect.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the connection cannot be opened.
    pub async fn spawn(connection_string: String) -> Result<Self, BackendError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready, connected) = oneshot::channel();
        thread::Builder::new()
            .name("odbc-worker".to_string())
            .spawn(move || run_worker(&connection_string, &receiver, ready))
            .map_err(|err| {
                BackendError::native(
                    CR_UNKNOWN_ERROR,
                    format!("failed to spawn ODBC worker thread: {err}"),
                )
            })?;
        connected.await.map_err(|_| BackendError::Reference)??;
        Ok(Self { sender })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, BackendError> {
        let (respond_to, reply) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .map_err(|_| BackendError::Reference)?;
        Ok(reply.await.map_err(|_| BackendError::Reference)??)
    }

    /// Run `sql` and read every result set it produces.
    ///
    /// # Errors
    ///
    /// Returns the error of the first statement; failures of later statements
    /// come back inside the batch.
    pub async fn execute(&self, sql: String, params: Vec<OdbcParam>) -> Result<Batch, BackendError> {
        self.request(|respond_to| Command::Execute {
            sql,
            params,
            respond_to,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the driver's error for the statement.
    pub async fn statement(&self, sql: &'static str) -> Result<(), BackendError> {
        self.request(|respond_to| Command::Statement { sql, respond_to })
            .await
    }
}

fn run_worker(
    connection_string: &str,
    receiver: &Receiver<Command>,
    ready: oneshot::Sender<Result<(), odbc_api::Error>>,
) {
    let conn = match environment().and_then(|env| {
        env.connect_with_connection_string(connection_string, ConnectionOptions::default())
    }) {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(execute(&conn, &sql, params));
            }
            Command::Statement { sql, respond_to } => {
                let _ = respond_to.send(conn.execute(sql, (), None).map(|_| ()));
            }
        }
    }
    debug!("ODBC worker stopped");
}

fn execute(
    conn: &Connection<'static>,
    sql: &str,
    params: Vec<OdbcParam>,
) -> Result<Batch, odbc_api::Error> {
    debug!(sql, "executing through ODBC");
    let bound: Vec<Box<dyn InputParameter>> =
        params.into_iter().map(OdbcParam::into_parameter).collect();
    if let Some(cursor) = conn.execute(sql, bound.as_slice(), None)? {
        return query::read_result_sets(cursor);
    }

    // Statements without rows: ask the server on the same connection.
    let counts = match conn.execute("SELECT ROW_COUNT(), LAST_INSERT_ID()", (), None)? {
        Some(cursor) => query::read_result_sets(cursor)?,
        None => Batch::default(),
    };
    let (rowcount, lastrowid) = counts
        .sets
        .first()
        .map_or((-1, None), |set| query::affected_counts(&set.rows));
    Ok(Batch {
        sets: vec![ResultSetData::affected(rowcount, lastrowid)],
        failure: None,
    })
}
