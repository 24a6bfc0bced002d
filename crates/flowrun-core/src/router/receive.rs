//! Response -> items conversion.

use std::collections::BTreeMap;

use base64::Engine as _;
use flowrun_types::run::{BinaryRef, Item};
use serde_json::{json, Map, Value};

use super::error::RequestError;
use super::path::get_path;
use super::schema::PostReceive;
use super::transport::HttpResponse;
use crate::expression::{is_truthy, resolve_value, WorkflowData};

/// Items for a response body when no post-receive action reshapes it.
///
/// Arrays yield one item per element, objects a single item, scalars a
/// single item under `data`, and an empty body a single empty item.
pub fn response_items(response: &HttpResponse) -> Vec<Item> {
    match &response.body {
        Value::Array(values) => values.iter().cloned().map(Item::new).collect(),
        Value::Object(_) => vec![Item::new(response.body.clone())],
        Value::Null => vec![Item::new(json!({}))],
        scalar => vec![Item::new(json!({ "data": scalar }))],
    }
}

/// Convert a response and run the post-receive actions in order.
///
/// `data` must already expose the response as `$response`.
pub fn receive(
    actions: &[PostReceive],
    response: &HttpResponse,
    data: &WorkflowData<'_>,
) -> Result<Vec<Item>, RequestError> {
    actions
        .iter()
        .try_fold(response_items(response), |items, action| {
            apply(action, items, response, data)
        })
}

fn apply(
    action: &PostReceive,
    items: Vec<Item>,
    response: &HttpResponse,
    data: &WorkflowData<'_>,
) -> Result<Vec<Item>, RequestError> {
    match action {
        PostReceive::RootProperty { property } => {
            let mut out = Vec::new();
            for item in &items {
                match get_path(&item.json, property) {
                    Some(Value::Array(values)) => out.extend(values.iter().cloned().map(Item::new)),
                    _ => {
                        return Err(RequestError::InvalidRouting(format!(
                            "The rootProperty \"{property}\" could not be found on item or is not an Array."
                        )));
                    }
                }
            }
            Ok(out)
        }
        PostReceive::Set { value } => Ok(vec![Item::new(resolve_value(value, data)?)]),
        PostReceive::SetKeyValue { fields } => items
            .iter()
            .map(|item| {
                let view = data.scoped([("responseItem", item.json.clone())]);
                let mut json = Map::new();
                for (key, expr) in fields {
                    json.insert(key.clone(), resolve_value(expr, &view)?);
                }
                Ok(Item::new(Value::Object(json)))
            })
            .collect(),
        PostReceive::Filter { pass } => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                let view = data.scoped([("responseItem", item.json.clone())]);
                if is_truthy(&resolve_value(pass, &view)?) {
                    kept.push(item);
                }
            }
            Ok(kept)
        }
        PostReceive::Limit { max_results } => {
            let mut items = items;
            items.truncate(*max_results);
            Ok(items)
        }
        PostReceive::BinaryData {
            destination_property,
        } => {
            let property = match resolve_value(&json!(destination_property), data)? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let binary = BinaryRef {
                data: base64::engine::general_purpose::STANDARD.encode(&response.raw),
                mime_type: response
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string(),
                file_name: None,
                file_size: response.raw.len(),
            };
            Ok(vec![Item {
                binary: Some(BTreeMap::from([(property, binary)])),
                ..Item::new(json!({}))
            }])
        }
        PostReceive::Custom(hook) => hook.apply(items, response),
    }
}
