//! Commands and parameters.
//!
//! A [`Command`] is built fresh for every execution, configured by a
//! [`CommandSetup`](crate::executor::CommandSetup) strategy and dropped before
//! the call returns.

use crate::db::Value;
use serde::{Deserialize, Serialize};

/// Name of the parameter that receives a non-query command's return value.
pub const RETURN_VALUE_PARAMETER: &str = "@ReturnValue";

/// Empty parameter list for calls that bind nothing.
pub const NO_PARAMS: [Parameter; 0] = [];

/// How the command text is interpreted by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Raw SQL text.
    #[default]
    Text,
    /// Name of a stored routine, invoked with the bound parameters.
    StoredProcedure,
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    /// Slot for the integer status returned by a routine.
    ReturnValue,
}

impl Direction {
    /// Whether the parameter's value is sent to the database.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }

    /// Whether the database writes a value back into the parameter.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }
}

/// Declared database type of a parameter.
///
/// Used by drivers to type `NULL` values and output slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Inferred from the value.
    #[default]
    Inferred,
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Text,
    Binary,
}

impl SqlType {
    /// Infers the declared type for a value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Inferred,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::BigInt,
            Value::Float(_) => Self::Float,
            Value::String(_) => Self::Text,
            Value::Bytes(_) => Self::Binary,
        }
    }
}

/// A named, typed value bound to a command.
///
/// Text commands bind inputs by position, in the order they were added, so
/// the command text uses the backend's positional placeholders (`$1`, `?`)
/// and the name is only a label. Stored procedures pass inputs by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub sql_type: SqlType,
    pub direction: Direction,
}

impl Parameter {
    /// Creates an input parameter. The type is inferred from the value.
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            name: normalize_name(name.into()),
            sql_type: SqlType::of(&value),
            value,
            direction: Direction::Input,
        }
    }

    /// Creates an output parameter of the given type with no value yet.
    pub fn output(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: normalize_name(name.into()),
            value: Value::Null,
            sql_type,
            direction: Direction::Output,
        }
    }

    /// Creates the integer return-value slot used by non-query commands.
    pub fn return_value() -> Self {
        Self {
            name: RETURN_VALUE_PARAMETER.to_string(),
            value: Value::Null,
            sql_type: SqlType::Int,
            direction: Direction::ReturnValue,
        }
    }

    /// Overrides the declared type.
    pub fn with_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = sql_type;
        self
    }

    /// Overrides the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

fn normalize_name(name: String) -> String {
    if name.starts_with('@') {
        name
    } else {
        format!("@{name}")
    }
}

/// Compares parameter names ignoring case and the `@` prefix.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.trim_start_matches('@')
        .eq_ignore_ascii_case(b.trim_start_matches('@'))
}

/// A single command invocation: text, kind and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
}

impl Command {
    /// Creates a text command with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn add(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    /// Appends all parameters in order.
    pub fn add_range(&mut self, parameters: impl IntoIterator<Item = Parameter>) {
        self.parameters.extend(parameters);
    }

    /// Looks up a parameter by name (with or without the `@` prefix).
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| same_name(&p.name, name))
    }

    /// The return-value slot, if one was added.
    pub fn return_value(&self) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.direction == Direction::ReturnValue)
    }

    /// Parameters whose values are sent to the database, in bind order.
    pub fn input_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.direction.is_input())
    }

    /// Stores a value produced by the database into a named parameter.
    ///
    /// Returns false when no parameter has that name.
    pub fn set_value(&mut self, name: &str, value: Value) -> bool {
        match self.parameters.iter_mut().find(|p| same_name(&p.name, name)) {
            Some(parameter) => {
                parameter.value = value;
                true
            }
            None => false,
        }
    }

    /// Stores the routine's return value into the return-value slot.
    pub fn set_return_value(&mut self, value: Value) -> bool {
        match self
            .parameters
            .iter_mut()
            .find(|p| p.direction == Direction::ReturnValue)
        {
            Some(parameter) => {
                parameter.value = value;
                true
            }
            None => false,
        }
    }
}

/// Drops absent entries from a caller-supplied parameter sequence.
pub fn present_parameters<P>(parameters: P) -> Vec<Parameter>
where
    P: IntoIterator,
    P::Item: Into<Option<Parameter>>,
{
    parameters
        .into_iter()
        .filter_map(|p| -> Option<Parameter> { p.into() })
        .collect()
}
