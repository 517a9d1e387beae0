use std::sync::Arc;
use std::thread;

use sql_mapper::mapping::{MappedStatementBuilder, StatementType};
use sql_mapper::session::{Configuration, SqlSessionFactory};
use sql_mapper::test_utils::MockDataSource;
use sql_mapper::{SqlMapperError, Value};

fn setup() -> (MockDataSource, SqlSessionFactory) {
    let source = MockDataSource::new().with_rows(
        "from users",
        &["id", "name"],
        vec![vec![1.into(), "ann".into()]],
    );
    let configuration = Configuration::builder()
        .perpetual_cache("users")
        .statement(
            MappedStatementBuilder::select("findUser", "select id, name from users where id = #{id}")
                .cache("users"),
        )
        .statement(
            MappedStatementBuilder::update("renameUser", "update users set name = #{name} where id = #{id}")
                .cache("users"),
        )
        .statement(
            MappedStatementBuilder::select(
                "lookupUser",
                "{call lookup_user(#{id}, #{name, mode=OUT, jdbcType=VARCHAR})}",
            )
            .statement_type(StatementType::Callable)
            .cache("users"),
        )
        .data_source(Arc::new(source.clone()))
        .build()
        .unwrap();
    (source, SqlSessionFactory::new(configuration))
}

fn param() -> Value {
    Value::map([("id", 1)])
}

fn cache_size(factory: &SqlSessionFactory) -> usize {
    factory.configuration().cache("users").unwrap().size()
}

#[test]
fn committed_results_are_served_to_later_sessions() {
    let (source, factory) = setup();

    let mut first = factory.open_session().unwrap();
    let rows = first.select_list("findUser", &param()).unwrap();
    assert_eq!(cache_size(&factory), 0);
    first.commit().unwrap();
    assert_eq!(cache_size(&factory), 1);
    first.close();

    let mut second = factory.open_session().unwrap();
    assert_eq!(second.select_list("findUser", &param()).unwrap(), rows);
    assert_eq!(second.select_list("findUser", &param()).unwrap(), rows);
    assert_eq!(source.stats().queries(), 1);
}

#[test]
fn staged_results_stay_private_until_commit() {
    let (source, factory) = setup();

    let mut writer = factory.open_session().unwrap();
    writer.select_list("findUser", &param()).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut reader = factory.open_session().unwrap();
            reader.select_list("findUser", &param()).unwrap();
            reader.rollback().unwrap();
        });
    });
    assert_eq!(source.stats().queries(), 2);
    assert_eq!(cache_size(&factory), 0);

    writer.commit().unwrap();
    thread::scope(|scope| {
        scope.spawn(|| {
            let mut reader = factory.open_session().unwrap();
            reader.select_list("findUser", &param()).unwrap();
        });
    });
    assert_eq!(source.stats().queries(), 2);
}

#[test]
fn rollback_discards_staged_results() {
    let (source, factory) = setup();

    let mut session = factory.open_session().unwrap();
    session.select_list("findUser", &param()).unwrap();
    session.rollback().unwrap();
    session.close();
    assert_eq!(cache_size(&factory), 0);

    let mut next = factory.open_session().unwrap();
    next.select_list("findUser", &param()).unwrap();
    assert_eq!(source.stats().queries(), 2);
}

#[test]
fn clean_close_publishes_staged_results() {
    let (_, factory) = setup();
    let mut session = factory.open_session().unwrap();
    session.select_list("findUser", &param()).unwrap();
    session.close();
    assert_eq!(cache_size(&factory), 1);
}

#[test]
fn an_update_clears_the_cache_only_when_committed() {
    let (source, factory) = setup();
    let mut warm = factory.open_session().unwrap();
    warm.select_list("findUser", &param()).unwrap();
    warm.commit().unwrap();
    drop(warm);
    assert_eq!(cache_size(&factory), 1);

    let mut writer = factory.open_session().unwrap();
    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("zed"))]);
    writer.update("renameUser", &mut rename).unwrap();

    let mut reader = factory.open_session().unwrap();
    reader.select_list("findUser", &param()).unwrap();
    assert_eq!(source.stats().queries(), 1);
    drop(reader);

    writer.commit().unwrap();
    assert_eq!(cache_size(&factory), 0);

    let mut after = factory.open_session().unwrap();
    after.select_list("findUser", &param()).unwrap();
    assert_eq!(source.stats().queries(), 2);
}

#[test]
fn rolled_back_update_leaves_the_cache_alone() {
    let (_, factory) = setup();
    let mut warm = factory.open_session().unwrap();
    warm.select_list("findUser", &param()).unwrap();
    warm.commit().unwrap();
    drop(warm);

    let mut writer = factory.open_session().unwrap();
    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("zed"))]);
    writer.update("renameUser", &mut rename).unwrap();
    writer.rollback().unwrap();
    assert_eq!(cache_size(&factory), 1);
}

#[test]
fn cached_callable_with_out_parameters_is_rejected_untouched() {
    let (source, factory) = setup();
    let mut warm = factory.open_session().unwrap();
    warm.select_list("findUser", &param()).unwrap();
    warm.commit().unwrap();
    drop(warm);

    let mut session = factory.open_session().unwrap();
    let err = session.select_list("lookupUser", &param()).unwrap_err();
    assert!(matches!(err.root_cause(), SqlMapperError::CacheError(msg) if msg.contains("OUT params")));
    assert_eq!(source.stats().queries(), 1);
    session.commit().unwrap();
    assert_eq!(cache_size(&factory), 1);
}
