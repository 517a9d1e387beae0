use std::sync::Arc;

use sql_mapper::mapping::{MappedStatementBuilder, RowBounds};
use sql_mapper::results::{CursorState, ResultContext, RowMapper};
use sql_mapper::session::{Configuration, SqlSessionFactory};
use sql_mapper::test_utils::MockDataSource;
use sql_mapper::{Result, SqlMapperError, Value};

fn numbers(count: i64) -> MockDataSource {
    MockDataSource::new().with_rows(
        "from numbers",
        &["n"],
        (1..=count).map(|n| vec![Value::Int(n)]).collect(),
    )
}

fn factory(source: &MockDataSource) -> SqlSessionFactory {
    let configuration = Configuration::builder()
        .statement(
            MappedStatementBuilder::select("allNumbers", "select n from numbers")
                .row_mapper(RowMapper::Scalar),
        )
        .data_source(Arc::new(source.clone()))
        .build()
        .unwrap();
    SqlSessionFactory::new(configuration)
}

#[test]
fn rows_are_fetched_on_demand() {
    let source = numbers(5);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();
    let stats = source.stats();

    let mut cursor = session.select_cursor("allNumbers", &Value::Null).unwrap();
    assert_eq!(cursor.state(), CursorState::Created);
    assert_eq!(stats.rows_fetched(), 0);

    assert_eq!(cursor.next().unwrap().unwrap(), Value::Int(1));
    assert_eq!(stats.rows_fetched(), 1);
    assert_eq!(cursor.next().unwrap().unwrap(), Value::Int(2));
    assert_eq!(stats.rows_fetched(), 2);
    assert_eq!(cursor.current_index(), 2);
    assert!(cursor.is_open());
}

#[test]
fn exhaustion_releases_the_statement() {
    let source = numbers(3);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();
    let stats = source.stats();

    let mut cursor = session.select_cursor("allNumbers", &Value::Null).unwrap();
    let values: Vec<Value> = cursor.by_ref().collect::<Result<_>>().unwrap();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert!(cursor.is_consumed());
    assert_eq!(stats.cursors_closed(), 1);
    assert_eq!(stats.statements_closed(), 1);

    assert!(cursor.next().is_none());
    cursor.close().unwrap();
    drop(cursor);
    assert_eq!(cursor_counts(&source), (1, 1));
}

#[test]
fn close_and_drop_release_exactly_once() {
    let source = numbers(4);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();

    let mut cursor = session.select_cursor("allNumbers", &Value::Null).unwrap();
    cursor.next().unwrap().unwrap();
    cursor.close().unwrap();
    assert_eq!(cursor.state(), CursorState::Closed);
    assert!(cursor.next().is_none());
    cursor.close().unwrap();
    drop(cursor);
    assert_eq!(cursor_counts(&source), (1, 1));

    let unread = session.select_cursor("allNumbers", &Value::Null).unwrap();
    drop(unread);
    assert_eq!(cursor_counts(&source), (2, 2));
    assert_eq!(source.stats().rows_fetched(), 1);
}

#[test]
fn bounds_skip_and_limit() {
    let source = numbers(10);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();

    let cursor = session
        .select_cursor_with_bounds("allNumbers", &Value::Null, RowBounds::new(3, 2))
        .unwrap();
    let values: Vec<Value> = cursor.collect::<Result<_>>().unwrap();
    assert_eq!(values, vec![Value::Int(4), Value::Int(5)]);
    assert_eq!(source.stats().rows_fetched(), 5);
}

#[test]
fn result_handler_can_stop_early() {
    let source = numbers(10);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();

    let mut seen = Vec::new();
    let mut handler = |value: Value, context: &mut ResultContext| -> Result<()> {
        seen.push(value);
        if context.result_count() == 3 {
            context.stop();
        }
        Ok(())
    };
    session
        .select("allNumbers", &Value::Null, RowBounds::default(), &mut handler)
        .unwrap();
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(source.stats().rows_fetched(), 3);
    assert_eq!(cursor_counts(&source), (1, 1));
}

#[test]
fn handler_errors_end_the_select() {
    let source = numbers(4);
    let factory = factory(&source);
    let mut session = factory.open_session().unwrap();

    let mut handler = |value: Value, _: &mut ResultContext| -> Result<()> {
        if value == Value::Int(2) {
            return Err(SqlMapperError::ExecutionError("rejected row".into()));
        }
        Ok(())
    };
    let err = session
        .select("allNumbers", &Value::Null, RowBounds::default(), &mut handler)
        .unwrap_err();
    assert!(err.to_string().contains("rejected row"));
    assert_eq!(cursor_counts(&source), (1, 1));
}

fn cursor_counts(source: &MockDataSource) -> (usize, usize) {
    let stats = source.stats();
    (stats.cursors_closed(), stats.statements_closed())
}
