use std::sync::Arc;

use sql_mapper::executor::BATCH_UPDATE_RETURN_VALUE;
use sql_mapper::mapping::{MappedStatementBuilder, RowBounds, StatementType};
use sql_mapper::session::{Configuration, ExecutorType, LocalCacheScope, Settings, SqlSessionFactory};
use sql_mapper::test_utils::MockDataSource;
use sql_mapper::{SqlMapperError, Value};

fn factory(source: &MockDataSource, settings: Settings) -> SqlSessionFactory {
    let configuration = Configuration::builder()
        .settings(settings)
        .statement(MappedStatementBuilder::select(
            "findUser",
            "select id, name from users where id = #{id}",
        ))
        .statement(MappedStatementBuilder::select("allUsers", "select id, name from users"))
        .statement(
            MappedStatementBuilder::insert("insertUser", "insert into users (name) values (#{name})")
                .generated_key("id"),
        )
        .statement(MappedStatementBuilder::update(
            "renameUser",
            "update users set name = #{name} where id = #{id}",
        ))
        .statement(
            MappedStatementBuilder::update(
                "nextId",
                "{call next_id(#{id, mode=OUT, jdbcType=INTEGER}, #{name})}",
            )
            .statement_type(StatementType::Callable),
        )
        .data_source(Arc::new(source.clone()))
        .build()
        .unwrap();
    SqlSessionFactory::new(configuration)
}

fn user_rows(source: MockDataSource) -> MockDataSource {
    source.with_rows(
        "from users",
        &["id", "name"],
        vec![vec![1.into(), "ann".into()], vec![2.into(), "bob".into()]],
    )
}

#[test]
fn simple_executor_closes_every_statement() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();

    let mut first = Value::map([("id", 1), ("name", 0)]);
    session.update("renameUser", &mut first).unwrap();
    let mut second = Value::map([("id", 2), ("name", 0)]);
    session.update("renameUser", &mut second).unwrap();
    assert!(session.is_dirty());
    session.commit().unwrap();
    assert!(!session.is_dirty());

    let stats = source.stats();
    assert_eq!(stats.prepared(), 2);
    assert_eq!(stats.statements_closed(), 2);
    assert_eq!(stats.updates(), 2);
    assert_eq!(stats.commits(), 1);

    session.close();
    assert_eq!(stats.connections_opened(), 1);
    assert_eq!(stats.connections_closed(), 1);
}

#[test]
fn generated_key_is_written_into_the_parameter() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();

    let mut user = Value::map([("name", "ann")]);
    assert_eq!(session.insert("insertUser", &mut user).unwrap(), 1);
    assert_eq!(user.get_path("id"), Some(&Value::Int(1)));
    assert_eq!(
        source.executions()[0].parameters,
        vec![Value::from("ann")]
    );
}

#[test]
fn reuse_executor_prepares_each_sql_once() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Reuse, false).unwrap();

    for id in 1..=3 {
        let mut param = Value::map([("id", Value::Int(id)), ("name", Value::from("x"))]);
        session.update("renameUser", &mut param).unwrap();
    }
    let stats = source.stats();
    assert_eq!(stats.prepared(), 1);
    assert_eq!(stats.updates(), 3);
    assert_eq!(stats.statements_closed(), 0);

    session.commit().unwrap();
    assert_eq!(stats.statements_closed(), 1);
    let ids: Vec<_> = source
        .executions()
        .iter()
        .map(|e| e.parameters[1].clone())
        .collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn batch_executor_groups_consecutive_updates() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Batch, false).unwrap();

    for name in ["a", "b", "c"] {
        let mut user = Value::map([("name", name)]);
        assert_eq!(
            session.insert("insertUser", &mut user).unwrap(),
            BATCH_UPDATE_RETURN_VALUE
        );
        assert_eq!(user.get_path("id"), None);
    }
    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("z"))]);
    session.update("renameUser", &mut rename).unwrap();

    let stats = source.stats();
    assert_eq!(stats.prepared(), 2);
    assert_eq!(stats.batches(), 0);

    let results = session.flush_statements().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].statement_id(), "insertUser");
    assert_eq!(results[0].update_counts(), &[1, 1, 1]);
    let ids: Vec<_> = results[0]
        .parameter_objects()
        .iter()
        .map(|p| p.get_path("id").cloned())
        .collect();
    assert_eq!(ids, vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]);
    assert_eq!(results[1].statement_id(), "renameUser");
    assert_eq!(results[1].parameter_objects().len(), 1);

    assert_eq!(stats.batches(), 2);
    assert_eq!(stats.statements_closed(), 2);
    assert_eq!(source.executions().len(), 4);
}

#[test]
fn batch_executor_flushes_before_querying() {
    let source = user_rows(MockDataSource::new());
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Batch, false).unwrap();

    let mut user = Value::map([("name", "ann")]);
    session.insert("insertUser", &mut user).unwrap();
    let rows = session.select_list("allUsers", &Value::Null).unwrap();
    assert_eq!(rows.len(), 2);

    let executions = source.executions();
    assert!(executions[0].sql.starts_with("insert into users"));
    assert!(executions[1].sql.starts_with("select id, name from users"));
}

#[test]
fn failed_batch_reports_position_and_closes_statements() {
    let source = MockDataSource::new().fail_on("update users");
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Batch, false).unwrap();

    let mut user = Value::map([("name", "ann")]);
    session.insert("insertUser", &mut user).unwrap();
    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("z"))]);
    session.update("renameUser", &mut rename).unwrap();

    let err = session.flush_statements().unwrap_err();
    assert!(err.to_string().contains("Error executing batch #2 of statement `renameUser`"));
    assert!(matches!(err.root_cause(), SqlMapperError::ExecutionError(_)));
    let stats = source.stats();
    assert_eq!(stats.statements_closed(), stats.prepared());
}

#[test]
fn local_cache_serves_repeated_queries_until_an_update() {
    let source = user_rows(MockDataSource::new());
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();
    let param = Value::map([("id", 1)]);

    let first = session.select_list("findUser", &param).unwrap();
    let second = session.select_list("findUser", &param).unwrap();
    assert_eq!(first, second);
    assert_eq!(source.stats().queries(), 1);

    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("z"))]);
    session.update("renameUser", &mut rename).unwrap();
    session.select_list("findUser", &param).unwrap();
    assert_eq!(source.stats().queries(), 2);

    session.clear_cache();
    session.select_list("findUser", &param).unwrap();
    assert_eq!(source.stats().queries(), 3);
}

#[test]
fn statement_scoped_local_cache_never_serves_hits() {
    let source = user_rows(MockDataSource::new());
    let settings = Settings {
        local_cache_scope: LocalCacheScope::Statement,
        ..Settings::default()
    };
    let factory = factory(&source, settings);
    let mut session = factory.open_session().unwrap();
    let param = Value::map([("id", 1)]);
    session.select_list("findUser", &param).unwrap();
    session.select_list("findUser", &param).unwrap();
    assert_eq!(source.stats().queries(), 2);
}

#[test]
fn row_bounds_page_mapped_rows() {
    let source = user_rows(MockDataSource::new());
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();
    let rows = session
        .select_list_with_bounds("allUsers", &Value::Null, RowBounds::new(1, 5))
        .unwrap();
    assert_eq!(rows, vec![Value::map([("id", Value::Int(2)), ("name", Value::from("bob"))])]);
}

#[test]
fn select_one_rejects_multiple_rows() {
    let source = user_rows(MockDataSource::new());
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();
    let err = session.select_one("allUsers", &Value::Null).unwrap_err();
    assert!(err.to_string().contains("but found: 2"));

    let empty = MockDataSource::new();
    let mut session = self::factory(&empty, Settings::default()).open_session().unwrap();
    assert_eq!(session.select_one("findUser", &Value::map([("id", 9)])).unwrap(), None);
}

#[test]
fn callable_statement_reads_out_parameters_back() {
    let source = MockDataSource::new().with_out_parameter(1, Value::Int(42));
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();

    let mut param = Value::map([("name", "ann")]);
    session.update("nextId", &mut param).unwrap();
    assert_eq!(param.get_path("id"), Some(&Value::Int(42)));
    assert_eq!(
        source.executions()[0].parameters,
        vec![Value::Null, Value::from("ann")]
    );
}

#[test]
fn autocommit_sessions_never_commit_or_roll_back() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Simple, true).unwrap();
    let mut param = Value::map([("id", Value::Int(1)), ("name", Value::from("z"))]);
    session.update("renameUser", &mut param).unwrap();
    session.rollback().unwrap();
    session.commit_force(true).unwrap();
    drop(session);

    let stats = source.stats();
    assert_eq!(stats.commits(), 0);
    assert_eq!(stats.rollbacks(), 0);
}

#[test]
fn dropping_a_dirty_session_rolls_back() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    {
        let mut session = factory.open_session().unwrap();
        let mut param = Value::map([("id", Value::Int(1)), ("name", Value::from("z"))]);
        session.update("renameUser", &mut param).unwrap();
    }
    let stats = source.stats();
    assert_eq!(stats.commits(), 0);
    assert!(stats.rollbacks() >= 1);
    assert_eq!(stats.connections_closed(), 1);
}

#[test]
fn closed_sessions_refuse_work() {
    let source = MockDataSource::new();
    let factory = factory(&source, Settings::default());
    let mut session = factory.open_session().unwrap();
    session.close();
    assert!(session.is_closed());
    let err = session.select_list("allUsers", &Value::Null).unwrap_err();
    assert!(matches!(err.root_cause(), SqlMapperError::ClosedError(_)));
}

#[test]
fn unknown_statement_ids_are_configuration_errors() {
    let source = MockDataSource::new();
    let mut session = factory(&source, Settings::default()).open_session().unwrap();
    let err = session.select_list("nope", &Value::Null).unwrap_err();
    assert!(matches!(err, SqlMapperError::ConfigError(_)));
}

#[test]
fn mapper_handles_resolve_short_ids_in_their_namespace() {
    let source = user_rows(MockDataSource::new());
    let configuration = Configuration::builder()
        .mapper(
            "users",
            [
                MappedStatementBuilder::select("all", "select id, name from users"),
                MappedStatementBuilder::update("rename", "update users set name = #{name} where id = #{id}"),
            ],
        )
        .mapper("orders", [MappedStatementBuilder::select("all", "select id from orders")])
        .data_source(Arc::new(source.clone()))
        .build()
        .unwrap();
    let mut session = SqlSessionFactory::new(configuration).open_session().unwrap();

    let mut users = session.mapper("users").unwrap();
    assert_eq!(users.namespace(), "users");
    assert_eq!(users.select_list("all", &Value::Null).unwrap().len(), 2);
    let mut param = Value::map([("id", Value::Int(1)), ("name", Value::from("amy"))]);
    users.update("rename", &mut param).unwrap();
    users.session().commit().unwrap();

    let err = session.mapper("users").unwrap().select_list("missing", &Value::Null).unwrap_err();
    assert!(err.to_string().contains("users.missing"));
    let err = session.mapper("accounts").unwrap_err();
    assert!(matches!(err, SqlMapperError::BindingError { .. }));
    assert_eq!(session.select_list("orders.all", &Value::Null).unwrap(), Vec::<Value>::new());

    let executions = source.executions();
    assert_eq!(executions[0].sql, "select id, name from users");
    assert_eq!(executions[1].sql, "update users set name = ? where id = ?");
    assert_eq!(source.stats().commits(), 1);
}
