#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_mapper::mapping::{MappedStatementBuilder, RowBounds};
use sql_mapper::results::RowMapper;
use sql_mapper::scripting::{ForEachNode, SqlNode};
use sql_mapper::session::{Configuration, ExecutorType, Settings, SqlSessionFactory};
use sql_mapper::sqlite::SqliteDataSource;
use sql_mapper::translation::PlaceholderStyle;
use sql_mapper::Value;
use tempfile::TempDir;

fn factory(settings: Settings) -> (TempDir, SqlSessionFactory) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapper.db");
    let data_source = SqliteDataSource::builder(path.to_string_lossy().into_owned())
        .build()
        .unwrap();
    data_source
        .execute_script(
            "create table users (id integer primary key autoincrement, name text not null, age integer);",
        )
        .unwrap();

    let configuration = Configuration::builder()
        .settings(settings)
        .database_id("sqlite")
        .lru_cache("users", 16)
        .statement(
            MappedStatementBuilder::insert("insertUser", "insert into users (name, age) values (#{name}, #{age})")
                .generated_key("id"),
        )
        .statement(
            MappedStatementBuilder::select("findUser", "select id, name, age from users where id = #{id}")
                .cache("users"),
        )
        .statement(
            MappedStatementBuilder::select(
                "findByIds",
                SqlNode::mixed(vec![
                    "select name from users where id in ".into(),
                    SqlNode::ForEach(
                        ForEachNode::new("ids", vec!["#{id}".into()])
                            .item("id")
                            .open("(")
                            .separator(", ")
                            .close(")"),
                    ),
                    " order by id".into(),
                ]),
            )
            .row_mapper(RowMapper::Scalar),
        )
        .statement(
            MappedStatementBuilder::select(
                "search",
                SqlNode::mixed(vec![
                    "select name from users".into(),
                    SqlNode::where_(vec![
                        SqlNode::if_then("minAge != null", vec!["age >= #{minAge}".into()]),
                        SqlNode::if_then("name != null", vec![" and name = #{name}".into()]),
                    ]),
                    " order by id".into(),
                ]),
            )
            .row_mapper(RowMapper::Scalar),
        )
        .statement(
            MappedStatementBuilder::select("countUsers", "select count(*) from users")
                .row_mapper(RowMapper::Scalar),
        )
        .statement(
            MappedStatementBuilder::update("renameUser", "update users set name = #{name} where id = #{id}")
                .cache("users"),
        )
        .statement(MappedStatementBuilder::delete("deleteUser", "delete from users where id = #{id}"))
        .data_source(Arc::new(data_source))
        .build()
        .unwrap();
    (dir, SqlSessionFactory::new(configuration))
}

fn user(name: &str, age: i64) -> Value {
    Value::map([("name", Value::from(name)), ("age", Value::Int(age))])
}

#[test]
fn insert_select_update_delete_round_trip() {
    let (_dir, factory) = factory(Settings::default());
    let mut session = factory.open_session().unwrap();

    let mut ann = user("ann", 31);
    assert_eq!(session.insert("insertUser", &mut ann).unwrap(), 1);
    let id = ann.get_path("id").cloned().unwrap();
    assert_eq!(id, Value::Int(1));

    let found = session
        .select_one("findUser", &Value::map([("id", id.clone())]))
        .unwrap()
        .unwrap();
    assert_eq!(found.get_path("name"), Some(&Value::from("ann")));
    assert_eq!(found.get_path("age"), Some(&Value::Int(31)));

    let mut rename = Value::map([("id", id.clone()), ("name", Value::from("anna"))]);
    assert_eq!(session.update("renameUser", &mut rename).unwrap(), 1);
    let renamed = session
        .select_one("findUser", &Value::map([("id", id.clone())]))
        .unwrap()
        .unwrap();
    assert_eq!(renamed.get_path("name"), Some(&Value::from("anna")));

    let mut target = Value::map([("id", id)]);
    assert_eq!(session.delete("deleteUser", &mut target).unwrap(), 1);
    assert_eq!(session.select_one("countUsers", &Value::Null).unwrap(), Some(Value::Int(0)));
    session.commit().unwrap();
}

#[test]
fn rollback_undoes_uncommitted_work() {
    let (_dir, factory) = factory(Settings::default());

    let mut session = factory.open_session().unwrap();
    let mut ann = user("ann", 31);
    session.insert("insertUser", &mut ann).unwrap();
    session.rollback().unwrap();
    session.close();

    let mut check = factory.open_session().unwrap();
    assert_eq!(check.select_one("countUsers", &Value::Null).unwrap(), Some(Value::Int(0)));
}

#[test]
fn committed_work_is_visible_to_new_sessions() {
    let (_dir, factory) = factory(Settings::default());
    {
        let mut session = factory.open_session().unwrap();
        for (name, age) in [("ann", 31), ("bob", 25), ("cy", 40)] {
            session.insert("insertUser", &mut user(name, age)).unwrap();
        }
        session.commit().unwrap();
    }

    let mut session = factory.open_session().unwrap();
    let names = session
        .select_list("findByIds", &Value::map([("ids", Value::List(vec![1.into(), 3.into()]))]))
        .unwrap();
    assert_eq!(names, vec![Value::from("ann"), Value::from("cy")]);

    let adults = session
        .select_list("search", &Value::map([("minAge", 30)]))
        .unwrap();
    assert_eq!(adults, vec![Value::from("ann"), Value::from("cy")]);

    let everyone = session.select_list("search", &Value::Null).unwrap();
    assert_eq!(everyone.len(), 3);

    let page = session
        .select_list_with_bounds("search", &Value::Null, RowBounds::new(1, 1))
        .unwrap();
    assert_eq!(page, vec![Value::from("bob")]);
}

#[test]
fn batch_inserts_land_on_flush() {
    let (_dir, factory) = factory(Settings::default());
    let mut session = factory.open_session_with(ExecutorType::Batch, false).unwrap();
    for (name, age) in [("ann", 31), ("bob", 25)] {
        session.insert("insertUser", &mut user(name, age)).unwrap();
    }
    let results = session.flush_statements().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].update_counts(), &[1, 1]);
    assert_eq!(
        results[0].parameter_objects()[1].get_path("id"),
        Some(&Value::Int(2))
    );
    session.commit().unwrap();

    let mut check = factory.open_session().unwrap();
    assert_eq!(check.select_one("countUsers", &Value::Null).unwrap(), Some(Value::Int(2)));
}

#[test]
fn reuse_executor_and_numbered_placeholders() {
    let settings = Settings {
        placeholder_style: PlaceholderStyle::Sqlite,
        ..Settings::default()
    };
    let (_dir, factory) = factory(settings);
    let mut session = factory.open_session_with(ExecutorType::Reuse, false).unwrap();
    for (name, age) in [("ann", 31), ("bob", 25)] {
        session.insert("insertUser", &mut user(name, age)).unwrap();
    }
    let found = session
        .select_list("search", &Value::map([("name", "bob")]))
        .unwrap();
    assert_eq!(found, vec![Value::from("bob")]);
    session.commit().unwrap();
}

#[test]
fn second_level_cache_spans_sessions() {
    let (_dir, factory) = factory(Settings::default());
    {
        let mut session = factory.open_session().unwrap();
        session.insert("insertUser", &mut user("ann", 31)).unwrap();
        session.commit().unwrap();
    }
    let param = Value::map([("id", 1)]);
    {
        let mut session = factory.open_session().unwrap();
        session.select_one("findUser", &param).unwrap();
        session.commit().unwrap();
    }
    let cache = factory.configuration().cache("users").unwrap();
    assert_eq!(cache.size(), 1);

    let mut writer = factory.open_session().unwrap();
    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("anna"))]);
    writer.update("renameUser", &mut rename).unwrap();
    writer.commit().unwrap();
    assert_eq!(cache.size(), 0);
}
