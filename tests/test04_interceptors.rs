use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sql_mapper::mapping::MappedStatementBuilder;
use sql_mapper::plugin::{Args, Capability, Interceptor, Invocation, Outcome, Signature};
use sql_mapper::session::{Configuration, ConfigurationBuilder, SqlSessionFactory};
use sql_mapper::test_utils::MockDataSource;
use sql_mapper::{Result, SqlMapperError, Value};

const QUERY_ARGS: &[&str] = &["MappedStatement", "Value", "RowBounds"];

fn builder(source: &MockDataSource) -> ConfigurationBuilder {
    Configuration::builder()
        .statement(MappedStatementBuilder::select(
            "findUser",
            "select id, name from users where id = #{id}",
        ))
        .statement(MappedStatementBuilder::update(
            "renameUser",
            "update users set name = #{name} where id = #{id}",
        ))
        .data_source(Arc::new(source.clone()))
}

fn users() -> MockDataSource {
    MockDataSource::new().with_rows("from users", &["id", "name"], vec![vec![1.into(), "ann".into()]])
}

struct Recorder {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for Recorder {
    fn name(&self) -> &str {
        &self.label
    }

    fn signatures(&self) -> Vec<Signature> {
        vec![Signature::new(Capability::Executor, "query", QUERY_ARGS)]
    }

    fn intercept(&self, invocation: Invocation<'_>) -> Result<Outcome> {
        self.log.lock().unwrap().push(format!("{}:before", self.label));
        let outcome = invocation.proceed();
        self.log.lock().unwrap().push(format!("{}:after", self.label));
        outcome
    }

    fn set_properties(&mut self, properties: &BTreeMap<String, String>) {
        if let Some(label) = properties.get("label") {
            self.label = label.clone();
        }
    }
}

#[test]
fn last_registered_interceptor_runs_outermost() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let source = users();
    let configuration = builder(&source)
        .interceptor(Arc::new(Recorder {
            label: "first".into(),
            log: log.clone(),
        }))
        .interceptor(Arc::new(Recorder {
            label: "second".into(),
            log: log.clone(),
        }))
        .build()
        .unwrap();
    assert_eq!(configuration.interceptor_chain().len(), 2);

    let mut session = SqlSessionFactory::new(configuration).open_session().unwrap();
    session.select_list("findUser", &Value::map([("id", 1)])).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["second:before", "first:before", "first:after", "second:after"]
    );
}

#[test]
fn properties_reach_the_interceptor_before_registration() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let source = users();
    let properties = BTreeMap::from([("label".to_string(), "audited".to_string())]);
    let configuration = builder(&source)
        .interceptor_with_properties(
            Recorder {
                label: "default".into(),
                log: log.clone(),
            },
            &properties,
        )
        .build()
        .unwrap();
    let names: Vec<_> = configuration
        .interceptor_chain()
        .interceptors()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(names, vec!["audited"]);
}

struct Counter {
    signature: Signature,
    calls: Arc<AtomicUsize>,
}

impl Interceptor for Counter {
    fn signatures(&self) -> Vec<Signature> {
        vec![self.signature.clone()]
    }

    fn intercept(&self, invocation: Invocation<'_>) -> Result<Outcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        invocation.proceed()
    }
}

#[test]
fn interceptors_only_see_their_declared_methods() {
    let updates = Arc::new(AtomicUsize::new(0));
    let bindings = Arc::new(AtomicUsize::new(0));
    let mappings = Arc::new(AtomicUsize::new(0));
    let source = users();
    let configuration = builder(&source)
        .interceptor(Arc::new(Counter {
            signature: Signature::new(Capability::Executor, "update", &["MappedStatement", "Value"]),
            calls: updates.clone(),
        }))
        .interceptor(Arc::new(Counter {
            signature: Signature::new(Capability::ParameterHandler, "set_parameters", &["Statement"]),
            calls: bindings.clone(),
        }))
        .interceptor(Arc::new(Counter {
            signature: Signature::new(Capability::ResultSetHandler, "handle_result_sets", &["ResultSet"]),
            calls: mappings.clone(),
        }))
        .build()
        .unwrap();
    let mut session = SqlSessionFactory::new(configuration).open_session().unwrap();

    session.select_list("findUser", &Value::map([("id", 1)])).unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 0);
    assert_eq!(bindings.load(Ordering::SeqCst), 1);
    assert_eq!(mappings.load(Ordering::SeqCst), 1);

    let mut rename = Value::map([("id", Value::Int(1)), ("name", Value::from("zed"))]);
    session.update("renameUser", &mut rename).unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(bindings.load(Ordering::SeqCst), 2);
    assert_eq!(mappings.load(Ordering::SeqCst), 1);
}

struct Stub;

impl Interceptor for Stub {
    fn signatures(&self) -> Vec<Signature> {
        vec![Signature::new(Capability::Executor, "query", QUERY_ARGS)]
    }

    fn intercept(&self, _invocation: Invocation<'_>) -> Result<Outcome> {
        Ok(Outcome::Rows(vec![Value::from("stubbed")]))
    }
}

#[test]
fn an_interceptor_can_answer_without_proceeding() {
    let source = users();
    let configuration = builder(&source).interceptor(Arc::new(Stub)).build().unwrap();
    let mut session = SqlSessionFactory::new(configuration).open_session().unwrap();
    let rows = session.select_list("findUser", &Value::map([("id", 1)])).unwrap();
    assert_eq!(rows, vec![Value::from("stubbed")]);
    assert_eq!(source.stats().queries(), 0);
    assert_eq!(source.stats().connections_opened(), 0);
}

struct Rewriter;

impl Interceptor for Rewriter {
    fn signatures(&self) -> Vec<Signature> {
        vec![Signature::new(Capability::Executor, "query", QUERY_ARGS)]
    }

    fn intercept(&self, mut invocation: Invocation<'_>) -> Result<Outcome> {
        if let Args::Query { parameter, .. } = invocation.args_mut() {
            *parameter = Cow::Owned(Value::map([("id", 42)]));
        }
        invocation.proceed()
    }
}

#[test]
fn an_interceptor_can_replace_arguments() {
    let source = users();
    let configuration = builder(&source).interceptor(Arc::new(Rewriter)).build().unwrap();
    let mut session = SqlSessionFactory::new(configuration).open_session().unwrap();
    session.select_list("findUser", &Value::map([("id", 1)])).unwrap();
    assert_eq!(source.executions()[0].parameters, vec![Value::Int(42)]);
}

#[test]
fn unknown_or_missing_signatures_fail_the_build() {
    struct Bogus(Vec<Signature>);
    impl Interceptor for Bogus {
        fn signatures(&self) -> Vec<Signature> {
            self.0.clone()
        }
        fn intercept(&self, invocation: Invocation<'_>) -> Result<Outcome> {
            invocation.proceed()
        }
    }

    let source = users();
    let err = builder(&source)
        .interceptor(Arc::new(Bogus(vec![Signature::new(
            Capability::Executor,
            "query",
            &["Value"],
        )])))
        .build()
        .unwrap_err();
    assert!(matches!(&err, SqlMapperError::PluginError(msg) if msg.contains("Could not find method on Executor named query(Value)")));

    let err = builder(&source)
        .interceptor(Arc::new(Bogus(Vec::new())))
        .build()
        .unwrap_err();
    assert!(matches!(err, SqlMapperError::PluginError(_)));
}
