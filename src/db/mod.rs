//! Database driver abstraction.
//!
//! The executor talks to a database only through the [`Driver`] and
//! [`Connection`] traits, so a scripted double ([`MockDriver`]) and the
//! sqlx-backed [`SqlxDriver`] can be used interchangeably. Every capability
//! comes in a blocking and an async flavour.

mod mock;
mod postgres;
mod sqlite;
mod sqlx_driver;
mod types;

pub use mock::{MockDriver, MockStats};
pub use sqlx_driver::SqlxDriver;
pub use types::{ColumnInfo, FromValue, Record, Value};

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Opens connections described by a [`ConnectionConfig`].
#[async_trait]
pub trait Driver: Send + Sync {
    /// Opens a connection, blocking the current thread.
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Opens a connection asynchronously.
    async fn open_async(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// A single open connection.
///
/// Dropping the connection closes it. Drivers receive a fully configured
/// [`Command`] and must not filter or reorder its parameters.
#[async_trait]
pub trait Connection: Send {
    /// Executes the command and returns the first column of the first row,
    /// or `Value::Null` when no row is produced.
    fn execute_scalar(&mut self, command: &Command) -> Result<Value>;

    async fn execute_scalar_async(&mut self, command: &Command) -> Result<Value>;

    /// Executes the command, storing output and return values into the
    /// command's parameters. Returns the number of rows affected.
    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64>;

    async fn execute_non_query_async(&mut self, command: &mut Command) -> Result<u64>;

    /// Executes the command and returns a forward-only cursor over its rows.
    ///
    /// The cursor borrows the connection; it is closed when dropped.
    fn execute_reader<'a>(&'a mut self, command: &'a Command) -> Result<Box<dyn RowCursor + 'a>>;

    async fn execute_reader_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> Result<Box<dyn AsyncRowCursor + 'a>>;
}

/// Forward-only, blocking row cursor.
pub trait RowCursor {
    /// Advances to the next row, returning `None` once the rows run out.
    fn next_row(&mut self) -> Result<Option<Record>>;

    /// Reads all remaining rows.
    fn collect_rows(&mut self) -> Result<Vec<Record>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Forward-only, async row cursor.
#[async_trait]
pub trait AsyncRowCursor: Send {
    /// Advances to the next row, returning `None` once the rows run out.
    async fn next_row(&mut self) -> Result<Option<Record>>;

    /// Reads all remaining rows.
    async fn collect_rows(&mut self) -> Result<Vec<Record>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
