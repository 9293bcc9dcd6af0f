//! Mock database driver for testing.
//!
//! Returns scripted results and records every connection, command and cursor
//! it hands out, so tests can assert on binding and resource release. The
//! blocking and async paths behave identically.

use super::{AsyncRowCursor, ColumnInfo, Connection, Driver, Record, RowCursor, Value};
use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::error::{CommandError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Resource counters collected by a [`MockDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
}

#[derive(Debug, Default)]
struct Script {
    scalar: Value,
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    return_value: Option<Value>,
    outputs: Vec<(String, Value)>,
    rows_affected: u64,
    open_error: Option<String>,
    execute_error: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    script: Script,
    stats: MockStats,
    commands: Vec<Command>,
}

/// A scripted driver double.
///
/// Clones share state, so a test can keep one handle while an executor owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a mock driver that returns `NULL` scalars and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar returned by every scalar execution.
    pub fn with_scalar(self, value: impl Into<Value>) -> Self {
        self.lock().script.scalar = value.into();
        self
    }

    /// Rows returned by every reader execution.
    pub fn with_rows(self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        {
            let mut state = self.lock();
            state.script.columns = columns
                .iter()
                .map(|name| ColumnInfo::new(*name, "mock"))
                .collect();
            state.script.rows = rows;
        }
        self
    }

    /// Value written into the return-value slot by non-query executions.
    pub fn with_return_value(self, value: impl Into<Value>) -> Self {
        self.lock().script.return_value = Some(value.into());
        self
    }

    /// Value written into a named output parameter by non-query executions.
    pub fn with_output(self, name: &str, value: impl Into<Value>) -> Self {
        self.lock()
            .script
            .outputs
            .push((name.to_string(), value.into()));
        self
    }

    /// Row count reported by non-query executions.
    pub fn with_rows_affected(self, rows: u64) -> Self {
        self.lock().script.rows_affected = rows;
        self
    }

    /// Makes every open fail with a connection error.
    pub fn failing_open(self, message: &str) -> Self {
        self.lock().script.open_error = Some(message.to_string());
        self
    }

    /// Makes every execution fail with a query error, after the connection
    /// has been opened.
    pub fn failing_execution(self, message: &str) -> Self {
        self.lock().script.execute_error = Some(message.to_string());
        self
    }

    /// Resource counters so far.
    pub fn stats(&self) -> MockStats {
        self.lock().stats
    }

    /// Commands received by the driver, in execution order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// The most recently executed command.
    pub fn last_command(&self) -> Option<Command> {
        self.lock().commands.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.lock();
        if let Some(message) = &state.script.open_error {
            return Err(CommandError::connection(message.clone()));
        }
        state.stats.connections_opened += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        self.connect()
    }

    async fn open_async(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        tokio::task::yield_now().await;
        self.connect()
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the command and fails if the script says so.
    fn record(&self, command: &Command) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(command.clone());
        match &state.script.execute_error {
            Some(message) => Err(CommandError::query(message.clone())),
            None => Ok(()),
        }
    }

    fn scalar(&self, command: &Command) -> Result<Value> {
        self.record(command)?;
        Ok(self.lock().script.scalar.clone())
    }

    fn non_query(&self, command: &mut Command) -> Result<u64> {
        self.record(command)?;
        let state = self.lock();
        if let Some(value) = &state.script.return_value {
            command.set_return_value(value.clone());
        }
        for (name, value) in &state.script.outputs {
            command.set_value(name, value.clone());
        }
        Ok(state.script.rows_affected)
    }

    fn cursor(&self, command: &Command) -> Result<MockCursor> {
        self.record(command)?;
        let mut state = self.lock();
        state.stats.cursors_opened += 1;
        let columns: Arc<[ColumnInfo]> = state.script.columns.clone().into();
        Ok(MockCursor {
            columns,
            rows: state.script.rows.iter().cloned().collect(),
            state: Arc::clone(&self.state),
        })
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.lock().stats.connections_closed += 1;
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn execute_scalar(&mut self, command: &Command) -> Result<Value> {
        self.scalar(command)
    }

    async fn execute_scalar_async(&mut self, command: &Command) -> Result<Value> {
        tokio::task::yield_now().await;
        self.scalar(command)
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64> {
        self.non_query(command)
    }

    async fn execute_non_query_async(&mut self, command: &mut Command) -> Result<u64> {
        tokio::task::yield_now().await;
        self.non_query(command)
    }

    fn execute_reader<'a>(&'a mut self, command: &'a Command) -> Result<Box<dyn RowCursor + 'a>> {
        Ok(Box::new(self.cursor(command)?))
    }

    async fn execute_reader_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> Result<Box<dyn AsyncRowCursor + 'a>> {
        tokio::task::yield_now().await;
        Ok(Box::new(self.cursor(command)?))
    }
}

struct MockCursor {
    columns: Arc<[ColumnInfo]>,
    rows: VecDeque<Vec<Value>>,
    state: Arc<Mutex<MockState>>,
}

impl MockCursor {
    fn advance(&mut self) -> Option<Record> {
        self.rows
            .pop_front()
            .map(|values| Record::new(Arc::clone(&self.columns), values))
    }
}

impl Drop for MockCursor {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .cursors_closed += 1;
    }
}

impl RowCursor for MockCursor {
    fn next_row(&mut self) -> Result<Option<Record>> {
        Ok(self.advance())
    }
}

#[async_trait]
impl AsyncRowCursor for MockCursor {
    async fn next_row(&mut self) -> Result<Option<Record>> {
        Ok(self.advance())
    }
}
