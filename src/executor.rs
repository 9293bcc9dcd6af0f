//! Scoped command execution.
//!
//! [`CommandExecutor`] opens a connection per call, builds and configures a
//! [`Command`], executes it and releases everything before returning. Every
//! operation follows the same order on the blocking and async paths:
//!
//! 1. open the connection
//! 2. build the command and run the [`CommandSetup`] step for the mode
//! 3. execute (for readers: run the projection, then close the cursor)
//! 4. drop the command, then close the connection
//!
//! Release happens through `Drop`, so it also runs when any step fails.
//! Errors are returned to the caller as they were raised.

use crate::command::{present_parameters, same_name, Command, CommandKind, Parameter};
use crate::config::ConnectionConfig;
use crate::db::{AsyncRowCursor, Driver, FromValue, RowCursor};
use crate::error::{CommandError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// Configures a freshly built command before it is executed.
///
/// Implementations can change the default command kind or add cross-cutting
/// parameters without reimplementing the execute methods. Parameters arrive
/// with absent entries already removed.
pub trait CommandSetup: Send + Sync {
    /// Configures a scalar command.
    fn setup_scalar(&self, command: &mut Command, parameters: Vec<Parameter>) {
        command.kind = CommandKind::Text;
        command.add_range(parameters);
    }

    /// Configures a reader command.
    fn setup_reader(&self, command: &mut Command, parameters: Vec<Parameter>) {
        configure_reader(command, parameters, CommandKind::Text);
    }

    /// Configures a non-query command, including its return-value slot.
    fn setup_non_query(&self, command: &mut Command, parameters: Vec<Parameter>) {
        configure_non_query(command, parameters, CommandKind::Text);
    }
}

/// Sets the kind and binds the parameters of a reader command.
pub fn configure_reader(command: &mut Command, parameters: Vec<Parameter>, kind: CommandKind) {
    command.kind = kind;
    command.add_range(parameters);
}

/// Sets the kind, adds the return-value slot first, then binds the parameters.
pub fn configure_non_query(command: &mut Command, parameters: Vec<Parameter>, kind: CommandKind) {
    command.kind = kind;
    command.add(Parameter::return_value());
    command.add_range(parameters);
}

/// Text commands for every mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSetup;

impl CommandSetup for DefaultSetup {}

/// Runs readers and non-queries as stored procedures. Scalars stay text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredProcedureSetup;

impl CommandSetup for StoredProcedureSetup {
    fn setup_reader(&self, command: &mut Command, parameters: Vec<Parameter>) {
        configure_reader(command, parameters, CommandKind::StoredProcedure);
    }

    fn setup_non_query(&self, command: &mut Command, parameters: Vec<Parameter>) {
        configure_non_query(command, parameters, CommandKind::StoredProcedure);
    }
}

/// Executes commands against the database described by a [`ConnectionConfig`].
///
/// The executor holds no per-call state; clones share the driver and setup
/// strategy, and concurrent calls each use their own connection.
#[derive(Clone)]
pub struct CommandExecutor {
    driver: Arc<dyn Driver>,
    connection: ConnectionConfig,
    setup: Arc<dyn CommandSetup>,
}

impl CommandExecutor {
    /// Creates an executor, validating the connection config.
    pub fn new(driver: impl Driver + 'static, connection: ConnectionConfig) -> Result<Self> {
        Self::with_driver(Arc::new(driver), connection)
    }

    /// Creates an executor from a shared driver.
    pub fn with_driver(driver: Arc<dyn Driver>, connection: ConnectionConfig) -> Result<Self> {
        connection.validate()?;
        Ok(Self {
            driver,
            connection,
            setup: Arc::new(DefaultSetup),
        })
    }

    /// Replaces the command setup strategy.
    pub fn with_setup(mut self, setup: impl CommandSetup + 'static) -> Self {
        self.setup = Arc::new(setup);
        self
    }

    /// The connection this executor targets.
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Runs a command and converts its single result value to `T`.
    pub fn execute_scalar<T, P>(&self, command_text: &str, parameters: P) -> Result<T>
    where
        T: FromValue,
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open(&self.connection)?;
        let mut command = Command::new(command_text);
        self.setup.setup_scalar(&mut command, parameters);
        log_execution("scalar", &command);

        let value = connection.execute_scalar(&command)?;
        T::from_value(value)
    }

    /// Async variant of [`execute_scalar`](Self::execute_scalar).
    pub async fn execute_scalar_async<T, P>(&self, command_text: &str, parameters: P) -> Result<T>
    where
        T: FromValue,
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open_async(&self.connection).await?;
        let mut command = Command::new(command_text);
        self.setup.setup_scalar(&mut command, parameters);
        log_execution("scalar", &command);

        let value = connection.execute_scalar_async(&command).await?;
        T::from_value(value)
    }

    /// Runs a command and returns the integer in its return-value slot.
    pub fn execute_non_query<P>(&self, command_text: &str, parameters: P) -> Result<i32>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        self.execute_non_query_with_outputs(command_text, parameters)
            .map(|result| result.return_value)
    }

    /// Async variant of [`execute_non_query`](Self::execute_non_query).
    pub async fn execute_non_query_async<P>(&self, command_text: &str, parameters: P) -> Result<i32>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        self.execute_non_query_with_outputs_async(command_text, parameters)
            .await
            .map(|result| result.return_value)
    }

    /// Like [`execute_non_query`](Self::execute_non_query), but also hands
    /// back the `Output` and `InputOutput` parameters as the database left
    /// them.
    pub fn execute_non_query_with_outputs<P>(
        &self,
        command_text: &str,
        parameters: P,
    ) -> Result<NonQueryResult>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open(&self.connection)?;
        let mut command = Command::new(command_text);
        self.setup.setup_non_query(&mut command, parameters);
        log_execution("non-query", &command);

        connection.execute_non_query(&mut command)?;
        NonQueryResult::from_command(command)
    }

    /// Async variant of
    /// [`execute_non_query_with_outputs`](Self::execute_non_query_with_outputs).
    pub async fn execute_non_query_with_outputs_async<P>(
        &self,
        command_text: &str,
        parameters: P,
    ) -> Result<NonQueryResult>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open_async(&self.connection).await?;
        let mut command = Command::new(command_text);
        self.setup.setup_non_query(&mut command, parameters);
        log_execution("non-query", &command);

        connection.execute_non_query_async(&mut command).await?;
        NonQueryResult::from_command(command)
    }

    /// Runs a command and applies `projection` to its row cursor.
    ///
    /// The cursor cannot outlive the projection and is closed before the
    /// connection.
    pub fn execute_reader<T, P, F>(&self, command_text: &str, parameters: P, projection: F) -> Result<T>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
        F: FnOnce(&mut dyn RowCursor) -> Result<T>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open(&self.connection)?;
        let mut command = Command::new(command_text);
        self.setup.setup_reader(&mut command, parameters);
        log_execution("reader", &command);

        let mut cursor = connection.execute_reader(&command)?;
        let result = projection(&mut *cursor);
        drop(cursor);
        result
    }

    /// Async variant of [`execute_reader`](Self::execute_reader).
    ///
    /// The projection is itself async and is awaited before the cursor and
    /// connection are released:
    ///
    /// ```ignore
    /// let names: Vec<String> = executor
    ///     .execute_reader_async("SELECT name FROM users", NO_PARAMS, |cursor| {
    ///         async move {
    ///             let rows = cursor.collect_rows().await?;
    ///             rows.iter().map(|row| row.get(0)).collect()
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute_reader_async<T, P, F>(
        &self,
        command_text: &str,
        parameters: P,
        projection: F,
    ) -> Result<T>
    where
        P: IntoIterator,
        P::Item: Into<Option<Parameter>>,
        F: for<'c> FnOnce(&'c mut dyn AsyncRowCursor) -> BoxFuture<'c, Result<T>>,
    {
        let parameters = present_parameters(parameters);
        let mut connection = self.driver.open_async(&self.connection).await?;
        let mut command = Command::new(command_text);
        self.setup.setup_reader(&mut command, parameters);
        log_execution("reader", &command);

        let mut cursor = connection.execute_reader_async(&command).await?;
        let result = projection(&mut *cursor).await;
        drop(cursor);
        result
    }
}

fn log_execution(mode: &str, command: &Command) {
    debug!(
        "Executing {} {:?} command '{}' with {} parameter(s)",
        mode,
        command.kind,
        command.text,
        command.parameters.len()
    );
}

/// Return code and output parameters of a non-query call.
#[derive(Debug, Clone, PartialEq)]
pub struct NonQueryResult {
    pub return_value: i32,
    /// `Output` and `InputOutput` parameters in command order.
    pub outputs: Vec<Parameter>,
}

impl NonQueryResult {
    fn from_command(command: Command) -> Result<Self> {
        let return_value = match command.return_value() {
            Some(parameter) if !parameter.value.is_null() => {
                i32::from_value(parameter.value.clone())?
            }
            _ => {
                return Err(CommandError::MissingReturnValue {
                    command: command.text,
                })
            }
        };
        let outputs = command
            .parameters
            .into_iter()
            .filter(|p| p.direction.is_output())
            .collect();
        Ok(Self {
            return_value,
            outputs,
        })
    }

    /// Converts the named output parameter's value to `T`.
    pub fn output<T: FromValue>(&self, name: &str) -> Result<T> {
        let parameter = self
            .outputs
            .iter()
            .find(|p| same_name(&p.name, name))
            .ok_or_else(|| CommandError::query(format!("no output parameter named '{name}'")))?;
        T::from_value(parameter.value.clone())
    }
}
