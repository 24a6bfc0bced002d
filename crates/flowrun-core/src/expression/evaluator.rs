//! JEXL evaluation of a single `{{ }}` segment.
//!
//! Wraps `jexl_eval::Evaluator` with the standard string transforms plus
//! node data transforms that read lazily from a [`WorkflowData`]:
//!
//! - `"Fetch"|items(output?, run?)` all items of a node's output
//! - `"Fetch"|item(index?)` one item, default the current index
//! - `"Fetch"|first` / `"Fetch"|last`
//! - `"Fetch"|pairedItem(index?)` lineage of the current input item
//!
//! Transforms cannot return typed errors, so failures are parked in a mutex
//! and surfaced after evaluation.

use std::sync::{Mutex, PoisonError};

use flowrun_types::run::Item;
use serde_json::{json, Value};

use super::data::WorkflowData;
use super::error::{ExpressionError, ExpressionErrorKind};

/// Evaluate already-rewritten JEXL source against `context`.
pub(crate) fn evaluate(
    source: &str,
    context: &Value,
    data: &WorkflowData<'_>,
) -> Result<Value, ExpressionError> {
    let failure: Mutex<Option<ExpressionError>> = Mutex::new(None);
    let evaluator = node_transforms(standard_transforms(jexl_eval::Evaluator::new()), data, &failure);

    let result = evaluator.eval_in_context(source, context);
    let parked = failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(err) = parked {
        return Err(err);
    }
    result.map_err(|e| {
        data.located(ExpressionError::new(
            ExpressionErrorKind::EvaluationFailed,
            format!("Expression evaluation failed: {e}"),
        ))
    })
}

/// JSON shape of an item as seen from expressions.
pub(crate) fn item_value(item: &Item) -> Value {
    let binary = item
        .binary
        .as_ref()
        .and_then(|b| serde_json::to_value(b).ok())
        .unwrap_or_else(|| json!({}));
    json!({ "json": item.json, "binary": binary })
}

fn index_arg(args: &[Value], position: usize) -> Option<usize> {
    let value = args.get(position)?;
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_f64().filter(|n| *n >= 0.0).map(|n| n as usize))
}

fn node_name(args: &[Value]) -> &str {
    args.first().and_then(Value::as_str).unwrap_or("")
}

fn node_transforms<'e>(
    evaluator: jexl_eval::Evaluator<'e>,
    data: &'e WorkflowData<'_>,
    failure: &'e Mutex<Option<ExpressionError>>,
) -> jexl_eval::Evaluator<'e> {
    let park = move |result: Result<Value, ExpressionError>| match result {
        Ok(value) => value,
        Err(err) => {
            failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(err);
            Value::Null
        }
    };

    evaluator
        .with_transform("items", move |args: &[Value]| {
            let result = data
                .node_output(node_name(args), index_arg(args, 1), index_arg(args, 2))
                .map(|items| Value::Array(items.iter().map(item_value).collect()));
            Ok(park(result))
        })
        .with_transform("item", move |args: &[Value]| {
            let result = data
                .node_item(node_name(args), index_arg(args, 1), None, None)
                .map(item_value);
            Ok(park(result))
        })
        .with_transform("first", move |args: &[Value]| {
            let result = data
                .node_output(node_name(args), None, None)
                .map(|items| items.first().map(item_value).unwrap_or(Value::Null));
            Ok(park(result))
        })
        .with_transform("last", move |args: &[Value]| {
            let result = data
                .node_output(node_name(args), None, None)
                .map(|items| items.last().map(item_value).unwrap_or(Value::Null));
            Ok(park(result))
        })
        .with_transform("pairedItem", move |args: &[Value]| {
            let result = data
                .paired_item(node_name(args), index_arg(args, 1))
                .map(item_value);
            Ok(park(result))
        })
}

fn standard_transforms(evaluator: jexl_eval::Evaluator<'_>) -> jexl_eval::Evaluator<'_> {
    evaluator
        // String transforms
        .with_transform("lower", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_lowercase()))
        })
        .with_transform("upper", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_uppercase()))
        })
        .with_transform("trim", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.trim()))
        })
        .with_transform("split", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
            let parts: Vec<&str> = s.split(delimiter).collect();
            Ok(json!(parts))
        })
        .with_transform("contains", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.contains(search)))
        })
        .with_transform("startsWith", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.starts_with(prefix)))
        })
        .with_transform("endsWith", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.ends_with(suffix)))
        })
        // Boolean transforms
        .with_transform("not", |args: &[Value]| {
            let val = args.first().cloned().unwrap_or(Value::Null);
            Ok(json!(!is_truthy(&val)))
        })
        // Works on strings, arrays, and objects
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                Some(Value::Object(o)) => o.len(),
                _ => 0,
            };
            Ok(json!(len))
        })
        // Dotted path lookup: `value|get('a.b.0')`
        .with_transform("get", |args: &[Value]| {
            let subject = args.first().cloned().unwrap_or(Value::Null);
            let path = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(crate::router::path::get_path(&subject, path)
                .cloned()
                .unwrap_or(Value::Null))
        })
}

/// JavaScript-like truthiness.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
