use std::sync::Arc;

use sql_mapper::mapping::MappedStatementBuilder;
use sql_mapper::scripting::{ForEachNode, SqlNode};
use sql_mapper::session::{Configuration, Settings};
use sql_mapper::type_handler::RecordSchema;
use sql_mapper::types::ValueType;
use sql_mapper::{SqlMapperError, Value};

fn configuration() -> Arc<Configuration> {
    Configuration::builder()
        .statement(MappedStatementBuilder::select(
            "byId",
            "select * from users where id = #{id}",
        ))
        .statement(MappedStatementBuilder::select(
            "search",
            SqlNode::mixed(vec![
                "select * from users".into(),
                SqlNode::where_(vec![
                    SqlNode::if_then("name != null", vec!["name = #{name}".into()]),
                    SqlNode::if_then("age != null", vec![" and age > #{age}".into()]),
                ]),
            ]),
        ))
        .statement(MappedStatementBuilder::select(
            "inList",
            SqlNode::mixed(vec![
                "select * from users where id in ".into(),
                SqlNode::ForEach(
                    ForEachNode::new("ids", vec!["#{id}".into()])
                        .item("id")
                        .open("(")
                        .separator(",")
                        .close(")"),
                ),
            ]),
        ))
        .statement(MappedStatementBuilder::select(
            "ordered",
            "select * from users order by ${column}",
        ))
        .build()
        .unwrap()
}

fn render(config: &Configuration, id: &str, param: &Value) -> (String, Vec<Value>) {
    let statement = config.mapped_statement(id).unwrap();
    let bound = statement.bound_sql(param, &config.compile_env()).unwrap();
    (bound.sql().to_string(), bound.parameter_values().unwrap())
}

#[test]
fn static_sql_is_identical_for_every_parameter() {
    let config = configuration();
    assert!(!config.mapped_statement("byId").unwrap().sql_source.is_dynamic());

    let (first, first_values) = render(&config, "byId", &Value::map([("id", 1)]));
    let (second, second_values) = render(&config, "byId", &Value::map([("id", 2)]));
    assert_eq!(first, "select * from users where id = ?");
    assert_eq!(first, second);
    assert_eq!(first_values, vec![Value::Int(1)]);
    assert_eq!(second_values, vec![Value::Int(2)]);
}

#[test]
fn scalar_parameter_binds_itself() {
    let config = configuration();
    let (_, values) = render(&config, "byId", &Value::Int(7));
    assert_eq!(values, vec![Value::Int(7)]);
}

#[test]
fn unrelated_properties_do_not_change_dynamic_sql() {
    let config = configuration();
    let (plain, _) = render(&config, "search", &Value::map([("name", "x")]));
    let (with_extra, values) = render(
        &config,
        "search",
        &Value::map([("name", Value::from("x")), ("colour", Value::from("blue"))]),
    );
    assert_eq!(plain, "select * from users WHERE name = ?");
    assert_eq!(plain, with_extra);
    assert_eq!(values, vec![Value::from("x")]);
}

#[test]
fn where_drops_leading_conjunction() {
    let config = configuration();
    let (sql, values) = render(&config, "search", &Value::map([("age", 30)]));
    assert_eq!(sql, "select * from users WHERE age > ?");
    assert_eq!(values, vec![Value::Int(30)]);

    let (sql, values) = render(&config, "search", &Value::map::<&str, Value, _>([]));
    assert_eq!(sql, "select * from users");
    assert!(values.is_empty());
}

#[test]
fn unresolvable_properties_are_binding_errors() {
    let config = Configuration::builder()
        .record_type(
            "User",
            RecordSchema::from([
                ("id".to_string(), ValueType::Int),
                ("name".to_string(), ValueType::Text),
            ]),
        )
        .statement(
            MappedStatementBuilder::select("byNope", "select * from users where id = #{nope}")
                .parameter_type("User"),
        )
        .statement(
            MappedStatementBuilder::select("byName", "select * from users where name = #{name}")
                .parameter_type("User"),
        )
        .statement(MappedStatementBuilder::select(
            "byCity",
            "select * from users where city = #{address.city}",
        ))
        .build()
        .unwrap();
    let env = config.compile_env();
    let user = Value::record("User", [("id", 1)]);

    let bound = config.mapped_statement("byNope").unwrap().bound_sql(&user, &env).unwrap();
    let err = bound.parameter_values().unwrap_err();
    assert!(
        matches!(&err, SqlMapperError::BindingError { fragment, .. } if fragment == "#{nope}"),
        "{err}"
    );

    // declared but unset fields bind NULL
    let bound = config.mapped_statement("byName").unwrap().bound_sql(&user, &env).unwrap();
    assert_eq!(bound.parameter_values().unwrap(), vec![Value::Null]);

    let by_city = config.mapped_statement("byCity").unwrap();
    let scalar_address = Value::map([("address", "12 Main St")]);
    let err = by_city
        .bound_sql(&scalar_address, &env)
        .unwrap()
        .parameter_values()
        .unwrap_err();
    assert!(
        matches!(&err, SqlMapperError::BindingError { fragment, .. } if fragment == "#{address.city}"),
        "{err}"
    );

    // missing map keys stay NULL
    let no_address = Value::map([("id", 1)]);
    let bound = by_city.bound_sql(&no_address, &env).unwrap();
    assert_eq!(bound.parameter_values().unwrap(), vec![Value::Null]);
}

#[test]
fn foreach_expands_one_marker_per_element() {
    let config = configuration();
    let param = Value::map([("ids", Value::List(vec![1.into(), 2.into(), 3.into()]))]);
    let (sql, values) = render(&config, "inList", &param);
    assert_eq!(sql, "select * from users where id in (?,?,?)");
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn substitution_is_textual() {
    let config = configuration();
    let (sql, values) = render(&config, "ordered", &Value::map([("column", "name")]));
    assert_eq!(sql, "select * from users order by name");
    assert!(values.is_empty());
}

#[test]
fn injection_filter_guards_substitutions() {
    let settings = Settings {
        injection_filter: Some(r"^\w+$".into()),
        ..Settings::default()
    };
    let config = Configuration::builder()
        .settings(settings)
        .statement(MappedStatementBuilder::select(
            "ordered",
            "select * from users order by ${column}",
        ))
        .build()
        .unwrap();
    let statement = config.mapped_statement("ordered").unwrap();
    let err = statement
        .bound_sql(&Value::map([("column", "1; drop table users")]), &config.compile_env())
        .unwrap_err();
    assert!(matches!(err.root_cause(), SqlMapperError::BindingError { .. }));
}

#[test]
fn malformed_templates_fail_at_registration() {
    let err = Configuration::builder()
        .statement(MappedStatementBuilder::select(
            "broken",
            SqlNode::if_then("name ==", vec!["name = #{name}".into()]),
        ))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("statement `broken`"));
}

#[test]
fn whitespace_can_be_shrunk() {
    let settings = Settings {
        shrink_whitespace: true,
        ..Settings::default()
    };
    let config = Configuration::builder()
        .settings(settings)
        .statement(MappedStatementBuilder::select(
            "spaced",
            "select *\n    from users\n   where id = #{id}",
        ))
        .build()
        .unwrap();
    let (sql, _) = render(&config, "spaced", &Value::map([("id", 1)]));
    assert_eq!(sql, "select * from users where id = ?");
}
