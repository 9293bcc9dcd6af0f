//! PostgreSQL binding and row conversion for the sqlx driver.

use super::{ColumnInfo, FromValue, Record, Value};
use crate::command::{Parameter, SqlType};
use crate::error::Result;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::{PgArguments, PgConnection, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::sync::Arc;
use tracing::warn;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Statement invoking a routine with its arguments in named notation, so the
/// bind order need not match the routine's signature.
pub(super) fn routine_statement(name: &str, arg_names: &[&str]) -> String {
    let args: Vec<String> = arg_names
        .iter()
        .enumerate()
        .map(|(i, arg)| format!("{arg} => ${}", i + 1))
        .collect();
    format!("SELECT * FROM {name}({})", args.join(", "))
}

fn build_query<'q>(sql: &'q str, parameters: &[&Parameter]) -> Result<PgQuery<'q>> {
    parameters
        .iter()
        .try_fold(sqlx::query(sql), |query, parameter| bind(query, parameter))
}

/// Binds one parameter, using its declared type for `NULL`s and narrowing.
fn bind<'q>(query: PgQuery<'q>, parameter: &Parameter) -> Result<PgQuery<'q>> {
    let query = match (&parameter.value, parameter.sql_type) {
        (Value::Null, SqlType::Bool) => query.bind(None::<bool>),
        (Value::Null, SqlType::SmallInt) => query.bind(None::<i16>),
        (Value::Null, SqlType::Int) => query.bind(None::<i32>),
        (Value::Null, SqlType::BigInt) => query.bind(None::<i64>),
        (Value::Null, SqlType::Float) => query.bind(None::<f64>),
        (Value::Null, SqlType::Binary) => query.bind(None::<Vec<u8>>),
        (Value::Null, _) => query.bind(None::<String>),
        (Value::Int(i), SqlType::SmallInt) => query.bind(i16::from_value(Value::Int(*i))?),
        (Value::Int(i), SqlType::Int) => query.bind(i32::from_value(Value::Int(*i))?),
        (Value::Int(i), _) => query.bind(*i),
        (Value::Bool(b), _) => query.bind(*b),
        (Value::Float(f), _) => query.bind(*f),
        (Value::String(s), _) => query.bind(s.clone()),
        (Value::Bytes(b), _) => query.bind(b.clone()),
    };
    Ok(query)
}

pub(super) async fn fetch_first(
    conn: &mut PgConnection,
    sql: &str,
    parameters: &[&Parameter],
) -> Result<Option<Record>> {
    let row = build_query(sql, parameters)?
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| convert_row(&row, column_info(&row)))
        .transpose()
}

pub(super) async fn execute(
    conn: &mut PgConnection,
    sql: &str,
    parameters: &[&Parameter],
) -> Result<u64> {
    let done = build_query(sql, parameters)?.execute(&mut *conn).await?;
    Ok(done.rows_affected())
}

/// Streams the rows of `sql`. Column metadata is read once from the first row.
pub(super) fn fetch<'a>(
    conn: &'a mut PgConnection,
    sql: &'a str,
    parameters: &[&Parameter],
) -> Result<BoxStream<'a, Result<Record>>> {
    let mut columns: Option<Arc<[ColumnInfo]>> = None;
    let rows = build_query(sql, parameters)?
        .fetch(conn)
        .map(move |row| {
            let row = row?;
            let columns = columns.get_or_insert_with(|| column_info(&row)).clone();
            convert_row(&row, columns)
        })
        .boxed();
    Ok(rows)
}

fn column_info(row: &PgRow) -> Arc<[ColumnInfo]> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a PgRow to a Record.
fn convert_row(row: &PgRow, columns: Arc<[ColumnInfo]>) -> Result<Record> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Record::new(columns, values))
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Only decode errors of the mapped types are returned.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let value = match type_name.to_uppercase().as_str() {
        "VOID" => Value::Null,

        "BOOL" | "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.into(),

        "INT2" | "SMALLINT" => row.try_get::<Option<i16>, _>(index)?.into(),

        "INT4" | "INT" | "INTEGER" => row.try_get::<Option<i32>, _>(index)?.into(),

        "INT8" | "BIGINT" => row.try_get::<Option<i64>, _>(index)?.into(),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<Option<f64>, _>(index)?.into(),

        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.into(),

        // Text-like types decode as strings. Types with no mapping (NUMERIC,
        // TIMESTAMPTZ, UUID, ...) read as NULL; cast them with `::text` in SQL.
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value.into(),
            Err(_) => {
                warn!("Column type {} has no mapping; reading it as NULL", type_name);
                Value::Null
            }
        },
    };
    Ok(value)
}
