//! Executor behaviour against the scripted mock driver.
//!
//! Covers parameter filtering, the return-value slot, resource release on
//! every exit path, typed conversion and sync/async parity.

use futures::FutureExt;
use pretty_assertions::assert_eq;
use sql_command_manager::db::{MockDriver, MockStats, Record, Value};
use sql_command_manager::{
    CommandError, CommandExecutor, ConnectionConfig, Direction, Parameter, SqlType, NO_PARAMS,
};

fn executor(driver: &MockDriver) -> CommandExecutor {
    CommandExecutor::new(driver.clone(), ConnectionConfig::sqlite("mock.db")).unwrap()
}

fn released(stats: MockStats) {
    assert_eq!(stats.connections_opened, stats.connections_closed);
    assert_eq!(stats.cursors_opened, stats.cursors_closed);
}

fn sparse_params() -> Vec<Option<Parameter>> {
    vec![
        None,
        Some(Parameter::input("a", 1)),
        None,
        Some(Parameter::input("b", "two")),
        None,
    ]
}

fn bound_names(driver: &MockDriver) -> Vec<String> {
    driver
        .last_command()
        .unwrap()
        .parameters
        .into_iter()
        .filter(|p| p.direction != Direction::ReturnValue)
        .map(|p| p.name)
        .collect()
}

#[test]
fn test_absent_parameters_are_never_bound() {
    let driver = MockDriver::new().with_scalar(1).with_return_value(0);
    let executor = executor(&driver);

    let _: i64 = executor.execute_scalar("q", sparse_params()).unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);

    executor.execute_non_query("q", sparse_params()).unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);

    executor
        .execute_reader("q", sparse_params(), |cursor| cursor.collect_rows())
        .unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);
}

#[tokio::test]
async fn test_absent_parameters_are_never_bound_async() {
    let driver = MockDriver::new().with_scalar(1).with_return_value(0);
    let executor = executor(&driver);

    let _: i64 = executor
        .execute_scalar_async("q", sparse_params())
        .await
        .unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);

    executor
        .execute_non_query_async("q", sparse_params())
        .await
        .unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);

    executor
        .execute_reader_async("q", sparse_params(), |cursor| {
            async move { cursor.collect_rows().await }.boxed()
        })
        .await
        .unwrap();
    assert_eq!(bound_names(&driver), vec!["@a", "@b"]);
}

#[test]
fn test_non_query_adds_exactly_one_return_slot_first() {
    let driver = MockDriver::new().with_return_value(7);
    let executor = executor(&driver);

    for params in [vec![], vec![Parameter::input("x", 1), Parameter::input("y", 2)]] {
        let expected_len = params.len() + 1;
        assert_eq!(executor.execute_non_query("proc", params).unwrap(), 7);

        let command = driver.last_command().unwrap();
        assert_eq!(command.parameters.len(), expected_len);
        let slots: Vec<_> = command
            .parameters
            .iter()
            .filter(|p| p.direction == Direction::ReturnValue)
            .collect();
        assert_eq!(slots.len(), 1);
        assert_eq!(command.parameters[0].direction, Direction::ReturnValue);
        assert_eq!(command.parameters[0].sql_type, SqlType::Int);
    }
}

#[test]
fn test_non_query_hands_output_parameters_back() {
    let driver = MockDriver::new()
        .with_return_value(0)
        .with_output("total", 12);
    let executor = executor(&driver);

    let result = executor
        .execute_non_query_with_outputs(
            "proc",
            [Parameter::output("total", SqlType::BigInt)],
        )
        .unwrap();

    assert_eq!(result.return_value, 0);
    assert_eq!(result.output::<i64>("total").unwrap(), 12);
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].direction, Direction::Output);
    assert_eq!(result.outputs[0].value, Value::Int(12));
    released(driver.stats());
}

#[tokio::test]
async fn test_non_query_hands_output_parameters_back_async() {
    let driver = MockDriver::new()
        .with_return_value(4)
        .with_output("total", 12);
    let executor = executor(&driver);

    let result = executor
        .execute_non_query_with_outputs_async(
            "proc",
            [None, Some(Parameter::output("total", SqlType::BigInt))],
        )
        .await
        .unwrap();

    assert_eq!(result.return_value, 4);
    assert_eq!(result.output::<i64>("@total").unwrap(), 12);
    released(driver.stats());
}

#[test]
fn test_resources_released_on_success() {
    let driver = MockDriver::new()
        .with_scalar(1)
        .with_return_value(0)
        .with_rows(&["n"], vec![vec![Value::Int(1)]]);
    let executor = executor(&driver);

    let _: i64 = executor.execute_scalar("q", NO_PARAMS).unwrap();
    executor.execute_non_query("q", NO_PARAMS).unwrap();
    executor
        .execute_reader("q", NO_PARAMS, |cursor| cursor.collect_rows())
        .unwrap();

    let stats = driver.stats();
    assert_eq!(stats.connections_opened, 3);
    assert_eq!(stats.cursors_opened, 1);
    released(stats);
}

#[test]
fn test_resources_released_when_execution_fails() {
    let driver = MockDriver::new().failing_execution("deadlock victim");
    let executor = executor(&driver);

    let err = executor.execute_scalar::<i64, _>("q", NO_PARAMS).unwrap_err();
    assert!(matches!(err, CommandError::Query(ref m) if m == "deadlock victim"));
    assert!(executor.execute_non_query("q", NO_PARAMS).is_err());
    assert!(executor
        .execute_reader("q", NO_PARAMS, |cursor| cursor.collect_rows())
        .is_err());

    let stats = driver.stats();
    assert_eq!(stats.connections_opened, 3);
    released(stats);
}

#[tokio::test]
async fn test_resources_released_when_async_execution_fails() {
    let driver = MockDriver::new().failing_execution("timeout");
    let executor = executor(&driver);

    assert!(executor
        .execute_scalar_async::<i64, _>("q", NO_PARAMS)
        .await
        .is_err());
    assert!(executor.execute_non_query_async("q", NO_PARAMS).await.is_err());
    assert!(executor
        .execute_reader_async("q", NO_PARAMS, |cursor| {
            async move { cursor.collect_rows().await }.boxed()
        })
        .await
        .is_err());

    let stats = driver.stats();
    assert_eq!(stats.connections_opened, 3);
    released(stats);
}

#[test]
fn test_open_failure_propagates_unchanged() {
    let driver = MockDriver::new().failing_open("no route to host");
    let executor = executor(&driver);

    let err = executor.execute_non_query("q", NO_PARAMS).unwrap_err();
    assert!(matches!(err, CommandError::Connection(ref m) if m == "no route to host"));
    assert_eq!(driver.stats(), MockStats::default());
    assert!(driver.commands().is_empty());
}

#[test]
fn test_projection_failure_still_releases_cursor() {
    let driver = MockDriver::new().with_rows(&["n"], vec![vec![Value::Int(1)]]);
    let executor = executor(&driver);

    let err = executor
        .execute_reader("q", NO_PARAMS, |cursor| {
            let row = cursor.next_row()?.unwrap();
            row.get::<String>(0)
        })
        .unwrap_err();

    assert!(matches!(err, CommandError::Cast { expected: "String", .. }));
    let stats = driver.stats();
    assert_eq!(stats.cursors_opened, 1);
    released(stats);
}

#[tokio::test]
async fn test_async_projection_failure_still_releases_cursor() {
    let driver = MockDriver::new().with_rows(&["n"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    let executor = executor(&driver);

    let err = executor
        .execute_reader_async("q", NO_PARAMS, |cursor| {
            async move {
                let row = cursor.next_row().await?;
                match row {
                    Some(row) => row.get::<String>(0),
                    None => Ok(String::new()),
                }
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Cast { expected: "String", .. }));
    let stats = driver.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.cursors_opened, 1);
    released(stats);
}

#[test]
fn test_scalar_returns_requested_type() {
    let driver = MockDriver::new().with_scalar("ada");
    let name: String = executor(&driver).execute_scalar("q", NO_PARAMS).unwrap();
    assert_eq!(name, "ada");
}

#[test]
fn test_scalar_cast_failure_is_not_coerced() {
    let driver = MockDriver::new().with_scalar("42");
    let err = executor(&driver)
        .execute_scalar::<i32, _>("q", NO_PARAMS)
        .unwrap_err();
    assert!(matches!(err, CommandError::Cast { expected: "i32", .. }));

    let driver = MockDriver::new().with_scalar(Value::Null);
    assert!(executor(&driver)
        .execute_scalar::<i64, _>("q", NO_PARAMS)
        .is_err());
    assert_eq!(
        executor(&driver)
            .execute_scalar::<Option<i64>, _>("q", NO_PARAMS)
            .unwrap(),
        None
    );
}

#[test]
fn test_reader_returns_projection_result_and_closes_cursor() {
    let driver = MockDriver::new().with_rows(
        &["id", "name"],
        vec![
            vec![Value::Int(1), Value::from("ada")],
            vec![Value::Int(2), Value::from("grace")],
        ],
    );
    let executor = executor(&driver);

    let names = executor
        .execute_reader("q", NO_PARAMS, |cursor| {
            let mut names = Vec::new();
            while let Some(row) = cursor.next_row()? {
                names.push(row.get_by_name::<String>("name")?);
            }
            Ok(names)
        })
        .unwrap();

    assert_eq!(names, vec!["ada".to_string(), "grace".to_string()]);
    let stats = driver.stats();
    assert_eq!(stats.cursors_opened, 1);
    assert_eq!(stats.cursors_closed, 1);
}

#[tokio::test]
async fn test_async_variants_match_sync_results() {
    let driver = MockDriver::new()
        .with_scalar(3.5)
        .with_return_value(11)
        .with_rows(&["n"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    let executor = executor(&driver);
    let params = || vec![Parameter::input("p1", 1)];

    let blocking = {
        let executor = executor.clone();
        tokio::task::spawn_blocking(move || {
            let scalar: f64 = executor.execute_scalar("q", params())?;
            let code = executor.execute_non_query("proc", params())?;
            let rows = executor.execute_reader("q", params(), |cursor| cursor.collect_rows())?;
            Ok::<_, CommandError>((scalar, code, rows))
        })
        .await
        .unwrap()
        .unwrap()
    };

    let scalar: f64 = executor.execute_scalar_async("q", params()).await.unwrap();
    let code = executor
        .execute_non_query_async("proc", params())
        .await
        .unwrap();
    let rows: Vec<Record> = executor
        .execute_reader_async("q", params(), |cursor| {
            async move { cursor.collect_rows().await }.boxed()
        })
        .await
        .unwrap();

    assert_eq!(blocking, (scalar, code, rows));
    released(driver.stats());
}

#[tokio::test]
async fn test_concurrent_calls_use_independent_connections() {
    let driver = MockDriver::new().with_scalar(1);
    let executor = executor(&driver);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute_scalar_async::<i64, _>("q", NO_PARAMS).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    let stats = driver.stats();
    assert_eq!(stats.connections_opened, 8);
    released(stats);
}

#[test]
fn test_executor_exposes_connection_read_only() {
    let driver = MockDriver::new();
    let executor = executor(&driver);
    assert_eq!(executor.connection(), &ConnectionConfig::sqlite("mock.db"));
}
