//! sql-command-manager - scoped command execution over a database driver.
//!
//! [`CommandExecutor`] opens a connection per call, configures a command
//! with its parameters, runs it in scalar, non-query or reader mode (blocking
//! or async) and releases every resource before returning.

pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;

pub use command::{Command, CommandKind, Direction, Parameter, SqlType, NO_PARAMS};
pub use config::{ConnectionConfig, DatabaseBackend};
pub use error::{CommandError, Result};
pub use executor::{
    CommandExecutor, CommandSetup, DefaultSetup, NonQueryResult, StoredProcedureSetup,
};
