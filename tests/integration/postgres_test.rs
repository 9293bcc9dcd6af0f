//! PostgreSQL integration tests.
//!
//! Apart from one helper routine created with `CREATE OR REPLACE`, only
//! built-in functions are used, so any database works. Tests are skipped
//! unless DATABASE_URL is set.

use futures::FutureExt;
use sql_command_manager::db::SqlxDriver;
use sql_command_manager::{
    CommandError, CommandExecutor, ConnectionConfig, Parameter, SqlType, StoredProcedureSetup,
    NO_PARAMS,
};

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))
}

/// Helper to create a test executor.
fn get_test_executor() -> Option<CommandExecutor> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    CommandExecutor::new(SqlxDriver::new().ok()?, config).ok()
}

#[tokio::test]
async fn test_scalar_with_typed_parameter() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let value: i32 = executor
        .execute_scalar_async(
            "SELECT $1 + 1",
            [Parameter::input("n", 41).with_type(SqlType::Int)],
        )
        .await
        .unwrap();
    assert_eq!(value, 42);

    let text: Option<String> = executor
        .execute_scalar_async(
            "SELECT $1::text",
            [Parameter::input("s", None::<String>)],
        )
        .await
        .unwrap();
    assert_eq!(text, None);
}

#[tokio::test]
async fn test_reader_over_series() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let total = executor
        .execute_reader_async(
            "SELECT n FROM generate_series(1, $1) AS n",
            [Parameter::input("upto", 4).with_type(SqlType::Int)],
            |cursor| {
                async move {
                    let mut total = 0i64;
                    while let Some(row) = cursor.next_row().await? {
                        total += i64::from(row.get::<i32>(0)?);
                    }
                    Ok::<_, CommandError>(total)
                }
                .boxed()
            },
        )
        .await
        .unwrap();
    assert_eq!(total, 10);
}

const CREATE_ROUTINES: &str = r#"
CREATE OR REPLACE FUNCTION sqlcmd_test_divide(
    dividend int, divisor int, OUT quotient int, OUT remainder int
) AS $$ SELECT dividend / divisor, dividend % divisor $$ LANGUAGE sql
"#;

#[tokio::test]
async fn test_routine_arguments_bind_by_name() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    executor
        .execute_non_query_async(CREATE_ROUTINES, NO_PARAMS)
        .await
        .unwrap();
    let executor = executor.with_setup(StoredProcedureSetup);

    let result = executor
        .execute_non_query_with_outputs_async(
            "sqlcmd_test_divide",
            [
                Parameter::input("divisor", 4).with_type(SqlType::Int),
                Parameter::output("remainder", SqlType::Int),
                Parameter::input("dividend", 23).with_type(SqlType::Int),
            ],
        )
        .await
        .unwrap();

    assert_eq!(result.return_value, 5);
    assert_eq!(result.output::<i32>("remainder").unwrap(), 3);
}

#[tokio::test]
async fn test_unmapped_column_types_read_as_null() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let rows = executor
        .execute_reader_async(
            "SELECT SUM(x) AS total, SUM(x)::text AS total_text \
             FROM (VALUES (1::bigint), (2::bigint)) AS t(x)",
            NO_PARAMS,
            |cursor| async move { cursor.collect_rows().await }.boxed(),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<Option<String>>(0).unwrap(), None);
    assert_eq!(rows[0].get_by_name::<String>("total_text").unwrap(), "3");
}

#[tokio::test]
async fn test_query_error_propagates() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = executor
        .execute_scalar_async::<i32, _>("SELECT * FROM table_that_does_not_exist", NO_PARAMS)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Database(_)));
}

#[test]
fn test_blocking_scalar() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let value: String = executor
        .execute_scalar("SELECT 'hello'::text", NO_PARAMS)
        .unwrap();
    assert_eq!(value, "hello");
}
