//! SQLite binding and row conversion for the sqlx driver.
//!
//! SQLite is dynamically typed, so values are decoded by the storage class
//! of each individual value rather than the declared column type.

use super::{ColumnInfo, FromValue, Record, Value};
use crate::command::{Parameter, SqlType};
use crate::error::Result;
use futures::stream::{BoxStream, StreamExt};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo, ValueRef};
use std::sync::Arc;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn build_query<'q>(sql: &'q str, parameters: &[&Parameter]) -> Result<SqliteQuery<'q>> {
    parameters
        .iter()
        .try_fold(sqlx::query(sql), |query, parameter| bind(query, parameter))
}

fn bind<'q>(query: SqliteQuery<'q>, parameter: &Parameter) -> Result<SqliteQuery<'q>> {
    let query = match (&parameter.value, parameter.sql_type) {
        (Value::Null, SqlType::Bool) => query.bind(None::<bool>),
        (Value::Null, SqlType::SmallInt | SqlType::Int | SqlType::BigInt) => {
            query.bind(None::<i64>)
        }
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
    conn: &mut SqliteConnection,
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
    conn: &mut SqliteConnection,
    sql: &str,
    parameters: &[&Parameter],
) -> Result<u64> {
    let done = build_query(sql, parameters)?.execute(&mut *conn).await?;
    Ok(done.rows_affected())
}

pub(super) fn fetch<'a>(
    conn: &'a mut SqliteConnection,
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

fn column_info(row: &SqliteRow) -> Arc<[ColumnInfo]> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &SqliteRow, columns: Arc<[ColumnInfo]>) -> Result<Record> {
    let values = (0..row.len())
        .map(|i| convert_value(row, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(Record::new(columns, values))
}

fn convert_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let storage_class = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_uppercase()
    };

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}
