//! Template resolution against a [`WorkflowData`] view.
//!
//! Only the roots an expression mentions are materialised, so a reference to
//! `$json` never touches `$node` data and an unexecuted node only fails the
//! expressions that actually name it.

use chrono::{Timelike, Utc};
use serde_json::{json, Map, Value};

use super::data::WorkflowData;
use super::error::ExpressionError;
use super::evaluator::{evaluate, item_value};
use super::template::{self, RootAccess, Rewritten, Segment};

/// Resolve a parameter expression.
///
/// A leading `=` is optional. A template made of exactly one `{{ }}` segment
/// yields the raw value; anything else is concatenated into a string.
pub fn resolve(expression: &str, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let _guard = data.descend()?;
    let body = expression
        .strip_prefix(template::EXPRESSION_SENTINEL)
        .unwrap_or(expression);
    let segments = template::split_template(body).map_err(|e| data.located(e))?;

    if let [Segment::Expression(source)] = segments.as_slice() {
        return evaluate_segment(source, data);
    }

    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expression(source) => match evaluate_segment(source, data)? {
                Value::Null => {}
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            },
        }
    }
    Ok(Value::String(out))
}

/// Resolve every expression string nested anywhere in `value`.
pub fn resolve_value(value: &Value, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) if template::is_expression(s) => resolve(s, data),
        Value::Array(values) => values
            .iter()
            .map(|v| resolve_value(v, data))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                out.insert(key.clone(), resolve_value(v, data)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn evaluate_segment(source: &str, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let rewritten = template::rewrite(source);
    let context = build_context(&rewritten, data)?;
    evaluate(&rewritten.source, &context, data)
}

fn build_context(rewritten: &Rewritten, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let mut context = Map::new();
    for (root, access) in &rewritten.roots {
        if let Some(value) = build_root(root, access, data)? {
            context.insert(root.clone(), value);
        }
    }
    Ok(Value::Object(context))
}

fn build_root(
    root: &str,
    access: &RootAccess,
    data: &WorkflowData<'_>,
) -> Result<Option<Value>, ExpressionError> {
    if let Some(value) = data.additional_key(root) {
        return Ok(Some(value.clone()));
    }

    let value = match root {
        "json" => data.json()?.clone(),
        "binary" => {
            let item = data.current_item()?;
            item_value(item)["binary"].clone()
        }
        "input" => input_root(data),
        "parameter" => parameter_root(access, data)?,
        "node" => node_root(access, data)?,
        "env" => json!(data.env_vars()),
        "workflow" => data.workflow_meta(),
        "runIndex" => json!(data.run_index()),
        "itemIndex" | "position" | "thisItemIndex" => json!(data.item_index()),
        "mode" => json!(data.mode().to_string()),
        "now" => json!(data.now().to_rfc3339()),
        "today" => {
            let today = data
                .now()
                .with_hour(0)
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or_else(Utc::now);
            json!(today.to_rfc3339())
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn input_root(data: &WorkflowData<'_>) -> Value {
    let items = data.input_items();
    json!({
        "all": items.iter().map(item_value).collect::<Vec<_>>(),
        "first": items.first().map(item_value),
        "last": items.last().map(item_value),
        "item": items.get(data.item_index()).map(item_value),
    })
}

fn parameter_root(access: &RootAccess, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let mut out = Map::new();
    for name in data.active_node().parameters.keys() {
        if access.wants(name) {
            out.insert(name.clone(), data.parameter(name)?);
        }
    }
    Ok(Value::Object(out))
}

/// `$node["Name"]` entries. Named nodes must resolve; a whole-root reference
/// includes whichever executed nodes have an item at the current index.
fn node_root(access: &RootAccess, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let mut out = Map::new();
    match access {
        RootAccess::Keys(names) => {
            for name in names {
                out.insert(name.clone(), node_entry(name, data)?);
            }
        }
        RootAccess::Whole => {
            for node in &data.graph().nodes {
                if let Ok(entry) = node_entry(&node.name, data) {
                    out.insert(node.name.clone(), entry);
                }
            }
        }
    }
    Ok(Value::Object(out))
}

fn node_entry(name: &str, data: &WorkflowData<'_>) -> Result<Value, ExpressionError> {
    let item = data.node_item(name, None, None, None)?;
    let run_index = data.node_run_count(name).saturating_sub(1);
    let parameters = data
        .graph()
        .node(name)
        .map(|n| Value::Object(n.parameters.clone()))
        .unwrap_or(Value::Null);
    let mut entry = item_value(item);
    if let Value::Object(map) = &mut entry {
        map.insert("runIndex".to_string(), json!(run_index));
        map.insert("parameter".to_string(), parameters);
    }
    Ok(entry)
}
