//! sqlx-backed driver for PostgreSQL and SQLite.
//!
//! Each call opens a dedicated connection; pooling is left to the caller's
//! deployment (e.g. pgbouncer). Parameters are bound positionally in the
//! order they appear on the command, so command text uses the backend's
//! native placeholders (`$1` for PostgreSQL, `?` or `?1` for SQLite).
//!
//! Blocking calls run on a private current-thread runtime. When the caller
//! is already inside a tokio runtime, the call is driven from a scoped helper
//! thread instead, which blocks the calling worker until it completes; prefer
//! the async variants there.

use super::{postgres, sqlite, AsyncRowCursor, Connection, Driver, Record, RowCursor, Value};
use crate::command::{Command, CommandKind, Parameter};
use crate::config::{ConnectionConfig, DatabaseBackend};
use crate::error::{CommandError, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, Fuse, StreamExt};
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection as _;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

/// Owns the runtime used by blocking calls.
///
/// Shut down in the background on drop so the driver can be dropped from
/// async code.
struct BlockingRuntime(Option<Runtime>);

impl BlockingRuntime {
    fn block_on<T: Send>(&self, future: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let Some(runtime) = &self.0 else {
            return Err(CommandError::internal("blocking runtime has shut down"));
        };
        if Handle::try_current().is_err() {
            return runtime.block_on(future);
        }

        // A runtime thread cannot block_on directly.
        debug!("Blocking call inside a runtime; running it on a helper thread");
        std::thread::scope(|scope| {
            scope
                .spawn(move || runtime.block_on(future))
                .join()
                .unwrap_or_else(|_| Err(CommandError::internal("blocking call panicked")))
        })
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Driver that opens sqlx connections.
#[derive(Clone)]
pub struct SqlxDriver {
    runtime: Arc<BlockingRuntime>,
}

impl SqlxDriver {
    /// Creates the driver and its blocking runtime.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CommandError::internal(format!("Failed to start runtime: {e}")))?;
        Ok(Self {
            runtime: Arc::new(BlockingRuntime(Some(runtime))),
        })
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        self.runtime.block_on(self.open_async(config))
    }

    async fn open_async(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let url = config.to_connection_string()?;
        debug!("Opening connection to {}", config.display_string());

        let backend = match config.backend {
            DatabaseBackend::Postgres => Backend::Postgres(PgConnection::connect(&url).await?),
            DatabaseBackend::Sqlite => Backend::Sqlite(SqliteConnection::connect(&url).await?),
        };

        Ok(Box::new(SqlxConnection {
            backend,
            statement: String::new(),
            runtime: Arc::clone(&self.runtime),
        }))
    }
}

enum Backend {
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

impl Backend {
    fn kind(&self) -> DatabaseBackend {
        match self {
            Self::Postgres(_) => DatabaseBackend::Postgres,
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }
}

struct SqlxConnection {
    backend: Backend,
    /// SQL of the open cursor; cursors borrow it for their lifetime.
    statement: String,
    runtime: Arc<BlockingRuntime>,
}

/// Returns the SQL sent for a command on the given backend.
fn statement_for(backend: DatabaseBackend, command: &Command) -> Result<String> {
    match command.kind {
        CommandKind::Text => Ok(command.text.clone()),
        CommandKind::StoredProcedure => {
            if !is_routine_name(&command.text) {
                return Err(CommandError::query(format!(
                    "'{}' is not a valid routine name",
                    command.text
                )));
            }
            match backend {
                DatabaseBackend::Postgres => {
                    let arg_names = command
                        .input_parameters()
                        .map(|p| {
                            let arg = p.name.trim_start_matches('@');
                            if is_identifier(arg) {
                                Ok(arg)
                            } else {
                                Err(CommandError::query(format!(
                                    "'{}' is not a valid argument name",
                                    p.name
                                )))
                            }
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(postgres::routine_statement(&command.text, &arg_names))
                }
                DatabaseBackend::Sqlite => Err(CommandError::unsupported(
                    "SQLite has no stored procedures",
                )),
            }
        }
    }
}

/// Accepts plain, optionally schema-qualified identifiers.
fn is_routine_name(name: &str) -> bool {
    name.split('.').all(is_identifier)
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl SqlxConnection {
    async fn first_row(&mut self, command: &Command) -> Result<Option<Record>> {
        let sql = statement_for(self.backend.kind(), command)?;
        let parameters: Vec<&Parameter> = command.input_parameters().collect();
        debug!("Executing: {}", sql);

        match &mut self.backend {
            Backend::Postgres(conn) => postgres::fetch_first(conn, &sql, &parameters).await,
            Backend::Sqlite(conn) => sqlite::fetch_first(conn, &sql, &parameters).await,
        }
    }
}

#[async_trait]
impl Connection for SqlxConnection {
    fn execute_scalar(&mut self, command: &Command) -> Result<Value> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.execute_scalar_async(command))
    }

    async fn execute_scalar_async(&mut self, command: &Command) -> Result<Value> {
        let row = self.first_row(command).await?;
        Ok(row
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.execute_non_query_async(command))
    }

    /// Text commands report their affected row count through the return slot.
    /// Routines populate it from the first column of their first row, and
    /// output parameters from same-named columns.
    async fn execute_non_query_async(&mut self, command: &mut Command) -> Result<u64> {
        match command.kind {
            CommandKind::Text => {
                debug!("Executing: {}", command.text);
                let rows_affected = {
                    let parameters: Vec<&Parameter> = command.input_parameters().collect();
                    match &mut self.backend {
                        Backend::Postgres(conn) => {
                            postgres::execute(conn, &command.text, &parameters).await?
                        }
                        Backend::Sqlite(conn) => {
                            sqlite::execute(conn, &command.text, &parameters).await?
                        }
                    }
                };
                command.set_return_value(Value::Int(
                    i64::try_from(rows_affected).unwrap_or(i64::MAX),
                ));
                Ok(rows_affected)
            }
            CommandKind::StoredProcedure => {
                let Some(row) = self.first_row(command).await? else {
                    return Ok(0);
                };
                let outputs: Vec<String> = command
                    .parameters
                    .iter()
                    .filter(|p| p.direction.is_output())
                    .map(|p| p.name.clone())
                    .collect();
                for name in outputs {
                    let column = name.trim_start_matches('@');
                    if let Ok(value) = row.get_by_name::<Value>(column) {
                        command.set_value(&name, value);
                    }
                }
                if let Some(first) = row.values().first() {
                    command.set_return_value(first.clone());
                }
                Ok(1)
            }
        }
    }

    fn execute_reader<'a>(&'a mut self, command: &'a Command) -> Result<Box<dyn RowCursor + 'a>> {
        let runtime = Arc::clone(&self.runtime);
        let inner = runtime.block_on(self.execute_reader_async(command))?;
        Ok(Box::new(BlockingCursor { inner, runtime }))
    }

    async fn execute_reader_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> Result<Box<dyn AsyncRowCursor + 'a>> {
        let sql = statement_for(self.backend.kind(), command)?;
        let parameters: Vec<&Parameter> = command.input_parameters().collect();
        debug!("Executing reader: {}", sql);

        let SqlxConnection {
            backend, statement, ..
        } = self;
        *statement = sql;
        let statement: &'a str = statement.as_str();

        let rows = match backend {
            Backend::Postgres(conn) => postgres::fetch(conn, statement, &parameters)?,
            Backend::Sqlite(conn) => sqlite::fetch(conn, statement, &parameters)?,
        };

        // Pull the first row so execution errors surface here, not on first read.
        let mut rows = rows.fuse();
        let pending = rows.next().await.transpose()?;
        Ok(Box::new(StreamCursor { rows, pending }))
    }
}

struct StreamCursor<'a> {
    rows: Fuse<BoxStream<'a, Result<Record>>>,
    pending: Option<Record>,
}

#[async_trait]
impl<'a> AsyncRowCursor for StreamCursor<'a> {
    async fn next_row(&mut self) -> Result<Option<Record>> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }
        self.rows.next().await.transpose()
    }
}

struct BlockingCursor<'a> {
    inner: Box<dyn AsyncRowCursor + 'a>,
    runtime: Arc<BlockingRuntime>,
}

impl RowCursor for BlockingCursor<'_> {
    fn next_row(&mut self) -> Result<Option<Record>> {
        self.runtime.block_on(self.inner.next_row())
    }
}
