//! Built-in pipes for `{value | name(args)}` expressions.

use std::sync::Arc;

use regex::Regex;

use crate::registry::{Bundle, FnPipe, Pipe};
use crate::runtime::Value;

type PipeResult = Result<Value, String>;

fn entry<F>(f: F) -> Arc<dyn Pipe>
where
    F: Fn(Value, Vec<Value>) -> PipeResult + Send + Sync + 'static,
{
    Arc::new(FnPipe(f))
}

pub fn core_pipes() -> Bundle<Arc<dyn Pipe>> {
    Bundle::new("core")
        .with("unique", entry(unique))
        .with("length", entry(length))
        .with("upper", entry(upper))
        .with("lower", entry(lower))
        .with("trim", entry(trim))
        .with("reverse", entry(reverse))
        .with("sort", entry(sort))
        .with("join", entry(join))
        .with("split", entry(split))
        .with("first", entry(first))
        .with("last", entry(last))
        .with("keys", entry(keys))
        .with("sum", entry(sum))
        .with("default", entry(default))
        .with("json", entry(json))
        .with("matches", entry(matches))
}

fn expect_list(name: &str, input: Value) -> Result<Vec<Value>, String> {
    match input {
        Value::List(items) => Ok(items),
        other => Err(format!("{} expects an array, got {}", name, other.type_name())),
    }
}

fn expect_str(name: &str, input: &Value) -> Result<String, String> {
    match input {
        Value::Str(s) => Ok(s.clone()),
        other => Err(format!("{} expects a string, got {}", name, other.type_name())),
    }
}

fn str_arg(args: &[Value], idx: usize, default: &str) -> Result<String, String> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "argument {} must be a string, got {}",
            idx + 1,
            other.type_name()
        )),
    }
}

/// Keeps the first occurrence of each element.
fn unique(input: Value, _args: Vec<Value>) -> PipeResult {
    let items = expect_list("unique", input)?;
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    Ok(Value::List(kept))
}

fn length(input: Value, _args: Vec<Value>) -> PipeResult {
    match input {
        Value::List(items) => Ok(Value::from(items.len())),
        Value::Str(s) => Ok(Value::from(s.chars().count())),
        Value::Object(fields) => Ok(Value::from(fields.len())),
        Value::Null => Ok(Value::from(0usize)),
        other => Err(format!("length is undefined for {}", other.type_name())),
    }
}

fn upper(input: Value, _args: Vec<Value>) -> PipeResult {
    Ok(Value::Str(expect_str("upper", &input)?.to_uppercase()))
}

fn lower(input: Value, _args: Vec<Value>) -> PipeResult {
    Ok(Value::Str(expect_str("lower", &input)?.to_lowercase()))
}

fn trim(input: Value, _args: Vec<Value>) -> PipeResult {
    Ok(Value::Str(expect_str("trim", &input)?.trim().to_string()))
}

fn reverse(input: Value, _args: Vec<Value>) -> PipeResult {
    match input {
        Value::List(mut items) => {
            items.reverse();
            Ok(Value::List(items))
        }
        Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
        other => Err(format!("reverse expects an array or string, got {}", other.type_name())),
    }
}

/// Numbers ascending or strings lexicographic; mixed arrays are rejected.
fn sort(input: Value, _args: Vec<Value>) -> PipeResult {
    let mut items = expect_list("sort", input)?;
    if items.iter().all(|v| matches!(v, Value::Number(_))) {
        items.sort_by(|a, b| {
            let (a, b) = (a.as_number().unwrap_or(0.0), b.as_number().unwrap_or(0.0));
            a.total_cmp(&b)
        });
    } else if items.iter().all(|v| matches!(v, Value::Str(_))) {
        items.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else {
        return Err("sort needs an array of only numbers or only strings".to_string());
    }
    Ok(Value::List(items))
}

fn join(input: Value, args: Vec<Value>) -> PipeResult {
    let items = expect_list("join", input)?;
    let sep = str_arg(&args, 0, ",")?;
    let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    Ok(Value::Str(parts.join(&sep)))
}

fn split(input: Value, args: Vec<Value>) -> PipeResult {
    let s = expect_str("split", &input)?;
    let delim = str_arg(&args, 0, ",")?;
    if delim.is_empty() {
        return Ok(Value::List(s.chars().map(|c| Value::Str(c.to_string())).collect()));
    }
    Ok(Value::List(s.split(delim.as_str()).map(Value::from).collect()))
}

fn first(input: Value, _args: Vec<Value>) -> PipeResult {
    let items = expect_list("first", input)?;
    Ok(items.into_iter().next().unwrap_or(Value::Null))
}

fn last(input: Value, _args: Vec<Value>) -> PipeResult {
    let items = expect_list("last", input)?;
    Ok(items.into_iter().last().unwrap_or(Value::Null))
}

fn keys(input: Value, _args: Vec<Value>) -> PipeResult {
    match input {
        Value::Object(fields) => Ok(Value::List(fields.into_keys().map(Value::Str).collect())),
        other => Err(format!("keys expects an object, got {}", other.type_name())),
    }
}

fn sum(input: Value, _args: Vec<Value>) -> PipeResult {
    let items = expect_list("sum", input)?;
    let mut total = 0.0;
    for item in &items {
        match item {
            Value::Number(n) => total += n,
            other => return Err(format!("sum expects numbers, got {}", other.type_name())),
        }
    }
    Ok(Value::Number(total))
}

/// Replaces `null` with the first argument.
fn default(input: Value, args: Vec<Value>) -> PipeResult {
    if input.is_null() {
        Ok(args.into_iter().next().unwrap_or(Value::Null))
    } else {
        Ok(input)
    }
}

fn json(input: Value, _args: Vec<Value>) -> PipeResult {
    serde_json::to_string(&input.to_json())
        .map(Value::Str)
        .map_err(|e| format!("json: {}", e))
}

fn matches(input: Value, args: Vec<Value>) -> PipeResult {
    let s = expect_str("matches", &input)?;
    let pattern = match args.first() {
        Some(Value::Str(p)) => p,
        _ => return Err("matches needs a pattern string".to_string()),
    };
    let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
    Ok(Value::Bool(re.is_match(&s)))
}
