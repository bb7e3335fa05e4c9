use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use mysql_async::prelude::{Protocol, Queryable};
use mysql_async::{Conn, QueryResult};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot};
use tracing::debug;

use super::query::{extract_row, raw_column};
use crate::driver::{BackendError, RawColumn};
use crate::types::Value;

/// Client error raised when a result stream was discarded to run another command.
pub const CR_COMMANDS_OUT_OF_SYNC: i32 = 2014;

fn discarded() -> BackendError {
    BackendError::native(
        CR_COMMANDS_OUT_OF_SYNC,
        "Commands out of sync; the pending result was discarded by a later command on this connection",
    )
}

/// Shape of the result set a stream is positioned on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetHeader {
    /// `None` for statements that produce no rows.
    pub columns: Option<Vec<RawColumn>>,
    /// Affected rows for statements without rows; `-1` otherwise.
    pub affected: i64,
    pub lastrowid: Option<u64>,
}

enum Command {
    Fetch {
        limit: Option<usize>,
        respond_to: oneshot::Sender<Result<Vec<Vec<Value>>, BackendError>>,
    },
    NextSet {
        respond_to: oneshot::Sender<Result<Option<SetHeader>, BackendError>>,
    },
    Release {
        respond_to: oneshot::Sender<()>,
    },
}

/// One native connection, plus the stream currently reading from it.
pub struct SessionState {
    conn: Arc<Mutex<Option<Conn>>>,
    active: StdMutex<Option<mpsc::Sender<Command>>>,
}

impl SessionState {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            active: StdMutex::new(None),
        }
    }

    /// Lock the connection, first making any pending result stream let go of it.
    pub async fn acquire(&self) -> OwnedMutexGuard<Option<Conn>> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = active {
            release(&sender).await;
        }
        Arc::clone(&self.conn).lock_owned().await
    }

    /// Whether a result stream is still reading from the connection.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}

async fn release(sender: &mpsc::Sender<Command>) {
    let (respond_to, done) = oneshot::channel();
    if sender.send(Command::Release { respond_to }).await.is_ok() {
        let _ = done.await;
    }
}

/// Result sets of one execution, read from the server as they are asked for.
///
/// A task owns the locked connection and the native result while the stream is
/// open; the cursor talks to it over a channel.
pub struct ResultStream {
    sender: mpsc::Sender<Command>,
}

impl ResultStream {
    /// Run `sql` and position the stream on its first result set.
    ///
    /// # Errors
    ///
    /// Returns the native error when the first statement fails.
    pub async fn open(
        state: &SessionState,
        sql: String,
        params: Option<mysql_async::Params>,
    ) -> Result<(Self, SetHeader), BackendError> {
        let guard = state.acquire().await;
        let (sender, receiver) = mpsc::channel(1);
        let (ready, header) = oneshot::channel();
        tokio::spawn(run(guard, sql, params, ready, receiver));
        let header = header.await.map_err(|_| discarded())??;
        *state.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender.clone());
        Ok((Self { sender }, header))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BackendError> {
        let (respond_to, reply) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| discarded())?;
        reply.await.map_err(|_| discarded())
    }

    /// Up to `limit` rows of the current set; all remaining rows for `None`.
    ///
    /// # Errors
    ///
    /// Returns the native error, or "commands out of sync" once the stream was
    /// discarded.
    pub async fn fetch(&self, limit: Option<usize>) -> Result<Vec<Vec<Value>>, BackendError> {
        self.request(|respond_to| Command::Fetch { limit, respond_to })
            .await?
    }

    /// Skip the rest of the current set and move to the next one.
    ///
    /// # Errors
    ///
    /// Returns the error of the statement that produced the next set.
    pub async fn next_set(&self) -> Result<Option<SetHeader>, BackendError> {
        self.request(|respond_to| Command::NextSet { respond_to })
            .await?
    }

    /// Drop whatever the server still has to send and hand the connection back.
    pub async fn release(&self) {
        release(&self.sender).await;
    }
}

async fn run(
    mut guard: OwnedMutexGuard<Option<Conn>>,
    sql: String,
    params: Option<mysql_async::Params>,
    ready: oneshot::Sender<Result<SetHeader, BackendError>>,
    receiver: mpsc::Receiver<Command>,
) {
    let Some(conn) = guard.as_mut() else {
        let _ = ready.send(Err(BackendError::Reference));
        return;
    };
    debug!(sql = %sql, "executing over native protocol");
    match params {
        Some(params) => match conn.exec_iter(sql.as_str(), params).await {
            Ok(result) => serve(result, ready, receiver).await,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
            }
        },
        None => match conn.query_iter(sql.as_str()).await {
            Ok(result) => serve(result, ready, receiver).await,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
            }
        },
    }
}

/// Read position within the native result.
struct CurrentSet {
    header: SetHeader,
    /// The native result has moved past this set.
    finished: bool,
}

impl CurrentSet {
    fn of<P: Protocol>(result: &QueryResult<'_, 'static, P>) -> Self {
        let columns: Option<Vec<RawColumn>> = result
            .columns()
            .filter(|cols| !cols.is_empty())
            .map(|cols| cols.iter().map(raw_column).collect());
        let header = if columns.is_some() {
            SetHeader {
                columns,
                affected: -1,
                lastrowid: None,
            }
        } else {
            SetHeader {
                columns: None,
                affected: i64::try_from(result.affected_rows()).unwrap_or(i64::MAX),
                lastrowid: result.last_insert_id(),
            }
        };
        Self {
            header,
            finished: false,
        }
    }

    fn ended() -> Self {
        Self {
            header: SetHeader::default(),
            finished: true,
        }
    }
}

/// Answer cursor commands until released.
///
/// A server error met while reading past the current set belongs to the next
/// statement of the batch; it is held back and reported by the next `NextSet`.
async fn serve<P: Protocol>(
    mut result: QueryResult<'_, 'static, P>,
    ready: oneshot::Sender<Result<SetHeader, BackendError>>,
    mut receiver: mpsc::Receiver<Command>,
) {
    let mut set = CurrentSet::of(&result);
    if ready.send(Ok(set.header.clone())).is_err() {
        drain(result).await;
        return;
    }
    let mut deferred: Option<BackendError> = None;
    let mut ended = false;

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Fetch { limit, respond_to } => {
                let rows = fetch(&mut result, &mut set, limit, &mut deferred).await;
                let _ = respond_to.send(rows);
            }
            Command::NextSet { respond_to } => {
                let next = if ended {
                    Ok(None)
                } else {
                    advance(&mut result, &mut set, &mut deferred).await
                };
                if !matches!(next, Ok(Some(_))) {
                    ended = true;
                }
                let _ = respond_to.send(next);
            }
            Command::Release { respond_to } => {
                drain(result).await;
                let _ = respond_to.send(());
                return;
            }
        }
    }
    drain(result).await;
}

async fn drain<P: Protocol>(result: QueryResult<'_, 'static, P>) {
    if let Err(e) = result.drop_result().await {
        debug!(error = %e, "discarding unread results failed");
    }
}

async fn fetch<P: Protocol>(
    result: &mut QueryResult<'_, 'static, P>,
    set: &mut CurrentSet,
    limit: Option<usize>,
    deferred: &mut Option<BackendError>,
) -> Result<Vec<Vec<Value>>, BackendError> {
    let mut rows = Vec::new();
    let Some(columns) = set.header.columns.as_deref() else {
        return Ok(rows);
    };
    while !set.finished && limit.is_none_or(|n| rows.len() < n) {
        match result.next().await {
            Ok(Some(row)) => rows.push(extract_row(row, columns)),
            Ok(None) => set.finished = true,
            Err(mysql_async::Error::Server(e)) => {
                set.finished = true;
                *deferred = Some(mysql_async::Error::Server(e).into());
            }
            Err(e) => {
                set.finished = true;
                return Err(e.into());
            }
        }
    }
    Ok(rows)
}

async fn advance<P: Protocol>(
    result: &mut QueryResult<'_, 'static, P>,
    set: &mut CurrentSet,
    deferred: &mut Option<BackendError>,
) -> Result<Option<SetHeader>, BackendError> {
    while !set.finished {
        match result.next().await {
            Ok(Some(_)) => {}
            Ok(None) => set.finished = true,
            Err(mysql_async::Error::Server(e)) => {
                set.finished = true;
                *deferred = Some(mysql_async::Error::Server(e).into());
            }
            Err(e) => {
                *set = CurrentSet::ended();
                return Err(e.into());
            }
        }
    }
    if let Some(err) = deferred.take() {
        *set = CurrentSet::ended();
        return Err(err);
    }
    if result.is_empty() {
        *set = CurrentSet::ended();
        return Ok(None);
    }
    *set = CurrentSet::of(result);
    Ok(Some(set.header.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::default_convert_exception;
    use crate::error::ErrorKind;

    #[test]
    fn discarded_streams_are_interface_errors() {
        let err = default_convert_exception(discarded());
        assert_eq!(err.kind(), ErrorKind::Interface);
        assert_eq!(err.errno(), Some(CR_COMMANDS_OUT_OF_SYNC));
    }
}
