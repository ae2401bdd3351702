//! Runtime tests: scope chain, values, expression evaluation, registries, pipes

use std::sync::Arc;
use std::time::Duration;

use oto::ast::{Expr, Statement};
use oto::config::{ConfigError, RunConfig};
use oto::parser::parse_source;
use oto::registry::{Bundle, CommandHandler, FnPipe, Pipe, PipeResolver, Registry, RegistryError};
use oto::runtime::value::set_path;
use oto::runtime::{
    EvaluationError, Evaluator, ExecutionContext, Map, MemoryStore, ScopeChain, ScopeError, Value,
};
use oto::stdlib::{command_registry, core_commands, pipe_registry};

fn expr(source: &str) -> Expr {
    let program = parse_source(&format!("@core/set value={{{}}}", source), "expr.oto").unwrap();
    match &program.statements[0] {
        Statement::Instruction(instr) => instr.argument("value").unwrap().clone(),
        other => panic!("expected instruction, got {:?}", other),
    }
}

async fn eval_in(source: &str, ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
    let pipes = pipe_registry().unwrap();
    let resolver: &dyn PipeResolver = &pipes;
    Evaluator::new(Some(resolver)).evaluate(&expr(source), ctx).await
}

async fn eval(source: &str) -> Value {
    eval_in(source, &ExecutionContext::new()).await.unwrap()
}

fn list(values: &[f64]) -> Value {
    Value::List(values.iter().map(|n| Value::Number(*n)).collect())
}

fn data(pairs: &[(&str, Value)]) -> Map {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ── Scope chain ─────────────────────────────────────────────

#[test]
fn scope_lookup_walks_inner_to_outer() {
    let mut scope = ScopeChain::new();
    scope.write("x", Value::from(1.0));
    scope.write("y", Value::from("outer"));
    scope.push();
    scope.write("x", Value::from(2.0));
    assert_eq!(scope.lookup("x"), Some(&Value::from(2.0)));
    assert_eq!(scope.lookup("y"), Some(&Value::from("outer")));
    assert_eq!(scope.lookup("missing"), None);
    assert_eq!(scope.depth(), 2);
}

#[test]
fn scope_falsy_values_are_hits() {
    let mut scope = ScopeChain::new();
    scope.write("zero", Value::from(0.0));
    scope.push();
    scope.write("empty", Value::from(""));
    scope.write("no", Value::Bool(false));
    scope.write("nothing", Value::Null);
    for name in ["zero", "empty", "no", "nothing"] {
        assert!(scope.lookup(name).is_some(), "{} should be found", name);
    }
}

#[test]
fn scope_shadowing_never_mutates_parent() {
    let mut scope = ScopeChain::new();
    scope.write("item", Value::from("parent"));
    scope.push();
    scope.write("item", Value::from("child"));
    assert_eq!(scope.lookup("item"), Some(&Value::from("child")));
    let popped = scope.pop().unwrap();
    assert_eq!(popped.get("item"), Some(&Value::from("child")));
    assert_eq!(scope.lookup("item"), Some(&Value::from("parent")));
}

#[test]
fn scope_clone_is_independent() {
    let mut original = ScopeChain::new();
    original.write("a", Value::from(1.0));
    let mut copy = original.clone();
    copy.write("a", Value::from(2.0));
    assert_eq!(original.lookup("a"), Some(&Value::from(1.0)));
}

#[test]
fn popping_root_frame_fails() {
    let mut scope = ScopeChain::new();
    assert_eq!(scope.pop(), Err(ScopeError::EmptyChain));
    scope.push();
    assert!(scope.pop().is_ok());
    assert_eq!(scope.pop(), Err(ScopeError::EmptyChain));
}

// ── Values ──────────────────────────────────────────────────

#[test]
fn truthiness() {
    assert!(!Value::Null.is_truthy());
    assert!(!Value::from(0.0).is_truthy());
    assert!(!Value::Number(f64::NAN).is_truthy());
    assert!(!Value::from("").is_truthy());
    assert!(Value::List(vec![]).is_truthy());
    assert!(Value::Object(Map::new()).is_truthy());
}

#[test]
fn number_display() {
    assert_eq!(Value::from(3.0).to_string(), "3");
    assert_eq!(Value::from(2.5).to_string(), "2.5");
    assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
}

#[test]
fn set_path_creates_nested_objects() {
    let mut root = Map::new();
    root.insert("user".to_string(), Value::from("not an object"));
    set_path(&mut root, "user.name", Value::from("ada"));
    set_path(&mut root, "user.age", Value::from(36.0));
    let user = root.get("user").unwrap();
    assert_eq!(user.get("name"), Some(&Value::from("ada")));
    assert_eq!(user.get("age"), Some(&Value::from(36.0)));
}

#[test]
fn json_round_trip_keeps_integers_integral() {
    let value = Value::from_json(&serde_json::json!({"n": 3, "xs": [1.5, "a", null]}));
    assert_eq!(serde_json::to_string(&value.to_json()).unwrap(), r#"{"n":3,"xs":[1.5,"a",null]}"#);
}

// ── Evaluator: resolution ───────────────────────────────────

#[tokio::test]
async fn identifier_prefers_scope_over_data() {
    let mut ctx = ExecutionContext::new().with_data(data(&[("name", Value::from("data"))]));
    assert_eq!(eval_in("name", &ctx).await.unwrap(), Value::from("data"));
    ctx.scope.write("name", Value::from("scope"));
    assert_eq!(eval_in("name", &ctx).await.unwrap(), Value::from("scope"));
}

#[tokio::test]
async fn missing_identifier_is_null() {
    assert_eq!(eval("nobody").await, Value::Null);
}

#[tokio::test]
async fn scope_root_never_reads_data() {
    let mut ctx = ExecutionContext::new().with_data(data(&[("a", Value::from("data"))]));
    assert_eq!(eval_in("scope.a", &ctx).await.unwrap(), Value::Null);
    ctx.scope
        .write("a", Value::object([("b", Value::from(7.0))]));
    assert_eq!(eval_in("scope.a.b", &ctx).await.unwrap(), Value::from(7.0));
}

#[tokio::test]
async fn store_root_uses_provider() {
    let store = MemoryStore::new(data(&[(
        "settings",
        Value::object([("theme", Value::from("dark"))]),
    )]));
    let ctx = ExecutionContext::new().with_store(Arc::new(store));
    assert_eq!(eval_in("store.settings.theme", &ctx).await.unwrap(), Value::from("dark"));
    assert_eq!(eval_in("store.settings.missing", &ctx).await.unwrap(), Value::Null);
    assert_eq!(eval("store.anything").await, Value::Null);
}

#[tokio::test]
async fn member_navigation_is_lenient() {
    let ctx = ExecutionContext::new().with_data(data(&[
        ("user", Value::object([("name", Value::from("ada"))])),
        ("items", Value::List(vec![Value::from("a"), Value::from("b")])),
    ]));
    assert_eq!(eval_in("user.address.city", &ctx).await.unwrap(), Value::Null);
    assert_eq!(eval_in("missing.deep.path", &ctx).await.unwrap(), Value::Null);
    assert_eq!(eval_in("items[1]", &ctx).await.unwrap(), Value::from("b"));
    assert_eq!(eval_in("items.length", &ctx).await.unwrap(), Value::from(2.0));
    assert_eq!(eval_in("user[\"name\"]", &ctx).await.unwrap(), Value::from("ada"));
}

// ── Evaluator: operators ────────────────────────────────────

#[tokio::test]
async fn arithmetic() {
    assert_eq!(eval("1 + 2 * 3").await, Value::from(7.0));
    assert_eq!(eval("(1 + 2) * 3").await, Value::from(9.0));
    assert_eq!(eval("7 % 4").await, Value::from(3.0));
    assert_eq!(eval("1 / 0").await, Value::Number(f64::INFINITY));
    assert_eq!(eval("-1 / 0").await, Value::Number(f64::NEG_INFINITY));
}

#[tokio::test]
async fn string_and_list_concatenation() {
    assert_eq!(eval("\"n=\" + 4").await, Value::from("n=4"));
    assert_eq!(eval("[1] + [2, 3]").await, list(&[1.0, 2.0, 3.0]));
}

#[tokio::test]
async fn equality_is_strict() {
    assert_eq!(eval("1 == \"1\"").await, Value::Bool(false));
    assert_eq!(eval("null == false").await, Value::Bool(false));
    assert_eq!(eval("[1, 2] == [1, 2]").await, Value::Bool(true));
    assert_eq!(eval("\"a\" != \"b\"").await, Value::Bool(true));
}

#[tokio::test]
async fn ordering_does_not_coerce() {
    assert_eq!(eval("\"apple\" < \"banana\"").await, Value::Bool(true));
    assert_eq!(eval("2 >= 2").await, Value::Bool(true));
    let err = eval_in("1 < \"2\"", &ExecutionContext::new()).await.unwrap_err();
    assert_eq!(err.kind, "binary");
    assert!(err.message.contains("Cannot compare number with string"));
}

#[tokio::test]
async fn logical_operators_return_operands() {
    assert_eq!(eval("null || \"fallback\"").await, Value::from("fallback"));
    assert_eq!(eval("0 && missing.call").await, Value::from(0.0));
    assert_eq!(eval("\"x\" && 5").await, Value::from(5.0));
}

#[tokio::test]
async fn unary_operators() {
    assert_eq!(eval("!0").await, Value::Bool(true));
    assert_eq!(eval("+\"42\"").await, Value::from(42.0));
    assert_eq!(eval("+true").await, Value::from(1.0));
    assert!(matches!(eval("+\"abc\"").await, Value::Number(n) if n.is_nan()));
    let err = eval_in("-\"x\"", &ExecutionContext::new()).await.unwrap_err();
    assert_eq!(err.kind, "unary");
}

#[tokio::test]
async fn array_literal_preserves_order() {
    let ctx = ExecutionContext::new().with_data(data(&[("b", Value::from(2.0))]));
    assert_eq!(eval_in("[3, b, 1]", &ctx).await.unwrap(), list(&[3.0, 2.0, 1.0]));
}

// ── Evaluator: pipes and mappers ────────────────────────────

#[tokio::test]
async fn unique_keeps_first_occurrence() {
    assert_eq!(eval("[3, 1, 2, 1, 3] | unique").await, list(&[3.0, 1.0, 2.0]));
}

#[tokio::test]
async fn pipe_chain_threads_values() {
    assert_eq!(eval("[\"b\", \"a\", \"b\"] | unique | sort | join(\"-\")").await, Value::from("a-b"));
    assert_eq!(eval("\"a,b,c\" | split(\",\") | length").await, Value::from(3.0));
    assert_eq!(eval("[1, 2, 3.5] | sum").await, Value::from(6.5));
    assert_eq!(eval("missing | default(\"none\")").await, Value::from("none"));
    assert_eq!(eval("\" Hi \" | trim | upper").await, Value::from("HI"));
    assert_eq!(eval("\"abc-123\" | matches(\"^[a-z]+-[0-9]+$\")").await, Value::Bool(true));
}

#[tokio::test]
async fn unknown_pipe_is_an_evaluation_error() {
    let err = eval_in("[1] | frobnicate", &ExecutionContext::new()).await.unwrap_err();
    assert_eq!(err.kind, "pipe-expression");
    assert!(err.message.contains("frobnicate"));
    assert!(matches!(err.node, Expr::Pipe { .. }));
}

#[tokio::test]
async fn pipe_without_resolver_fails() {
    let err = Evaluator::new(None)
        .evaluate(&expr("[1] | unique"), &ExecutionContext::new())
        .await
        .unwrap_err();
    assert!(err.message.contains("No pipe resolver"));
}

#[tokio::test]
async fn failing_pipe_reports_its_name() {
    let err = eval_in("\"text\" | sum", &ExecutionContext::new()).await.unwrap_err();
    assert!(err.message.contains("Pipe 'sum' failed"));
}

#[tokio::test]
async fn mapper_plucks_fields() {
    let ctx = ExecutionContext::new().with_data(data(&[(
        "users",
        Value::List(vec![
            Value::object([("name", Value::from("ada"))]),
            Value::object([("age", Value::from(3.0))]),
        ]),
    )]));
    assert_eq!(
        eval_in("users -> \"name\"", &ctx).await.unwrap(),
        Value::List(vec![Value::from("ada"), Value::Null])
    );
    assert_eq!(eval_in("users[0] -> name", &ctx).await.unwrap(), Value::from("ada"));
    assert_eq!(eval_in("42 -> name", &ctx).await.unwrap(), Value::Null);
}

// ── Registries ──────────────────────────────────────────────

#[test]
fn builtin_registries_load() {
    let commands = command_registry().unwrap();
    for id in ["@core/set", "@core/log", "@flow/goto", "@flow/exit", "@flow/return", "@human/validate", "@human/select"] {
        assert!(commands.contains(id), "{} missing", id);
    }
    assert_eq!(commands.bundle_of("@flow/exit"), Some("flow"));
    assert!(pipe_registry().unwrap().contains("unique"));
}

#[test]
fn conflicting_bundle_is_rejected_atomically() {
    let mut registry = command_registry().unwrap();
    let before = registry.len();
    let set = core_commands().entries.remove(0).1;
    let bundle: Bundle<Arc<dyn CommandHandler>> = Bundle::new("extra")
        .with("@extra/new", set.clone())
        .with("@core/set", set);
    let err = registry.load_bundle(bundle).unwrap_err();
    assert_eq!(
        err,
        RegistryError::Conflict {
            kind: "command",
            key: "@core/set".to_string(),
            existing: "core".to_string(),
            incoming: "extra".to_string(),
        }
    );
    assert_eq!(registry.len(), before);
    assert!(!registry.contains("@extra/new"));
}

#[test]
fn duplicate_key_inside_one_bundle() {
    let pipe: Arc<dyn Pipe> = Arc::new(FnPipe(|input: Value, _args: Vec<Value>| -> Result<Value, String> { Ok(input) }));
    let mut registry: Registry<Arc<dyn Pipe>> = Registry::new("pipe");
    let bundle = Bundle::new("twice").with("id", pipe.clone()).with("id", pipe);
    assert!(matches!(
        registry.load_bundle(bundle),
        Err(RegistryError::Conflict { ref key, .. }) if key == "id"
    ));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn custom_pipe_bundle() {
    let mut registry = pipe_registry().unwrap();
    let double: Arc<dyn Pipe> = Arc::new(FnPipe(|input: Value, _args: Vec<Value>| match input {
        Value::Number(n) => Ok(Value::Number(n * 2.0)),
        other => Err(format!("cannot double {}", other.type_name())),
    }));
    registry.load_bundle(Bundle::new("math").with("double", double)).unwrap();
    let resolver: &dyn PipeResolver = &registry;
    let value = Evaluator::new(Some(resolver))
        .evaluate(&expr("21 | double"), &ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(value, Value::from(42.0));
}

// ── Config ──────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = RunConfig::from_lookup(|_| None).unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.applet_host, "127.0.0.1");
    assert_eq!(config.applet_timeout, Duration::from_secs(300));
    assert_eq!(config.log_filter, "oto=info");
}

#[test]
fn config_from_environment() {
    let config = RunConfig::from_lookup(|var| match var {
        "OTO_APPLET_HOST" => Some("0.0.0.0".to_string()),
        "OTO_APPLET_TIMEOUT_SECS" => Some("45".to_string()),
        "OTO_LOG" => Some("oto=debug".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.applet_host, "0.0.0.0");
    assert_eq!(config.applet_timeout, Duration::from_secs(45));
    assert_eq!(config.log_filter, "oto=debug");
}

#[test]
fn config_rejects_bad_timeout() {
    let err = RunConfig::from_lookup(|var| (var == "OTO_APPLET_TIMEOUT_SECS").then(|| "soon".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidTimeout { ref value, .. } if value == "soon"));
}

#[test]
fn config_rejects_a_zero_timeout_override() {
    let err = RunConfig::default().with_timeout_secs(0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "--timeout must be a positive number of seconds, got '0'"
    );
    let config = RunConfig::default().with_timeout_secs(12).unwrap();
    assert_eq!(config.applet_timeout, Duration::from_secs(12));
}
