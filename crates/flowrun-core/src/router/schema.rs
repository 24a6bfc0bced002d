//! Declarative node descriptions.
//!
//! A node type describes its parameters as a tree of [`FieldDefinition`]s.
//! Fields may carry [`FieldRouting`] that says how their value shapes the
//! outbound request (query/body placement, request overrides, pagination)
//! and how the response becomes items.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use flowrun_types::run::Item;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use super::error::RequestError;
use super::request::RequestOptions;
use super::transport::HttpResponse;
use crate::expression::WorkflowData;

// ---------------------------------------------------------------------------
// Node description
// ---------------------------------------------------------------------------

/// Everything the router needs to know about a declarative node type.
#[derive(Debug, Clone, Default)]
pub struct NodeDescription {
    pub node_type: String,
    /// Credential type looked up in the node's `credentials` map.
    pub credential_type: Option<String>,
    /// Partial request (`base_url`, `url`, `method`, `headers`, `query`,
    /// `body`) applied before any field. Values may be expressions.
    pub request_defaults: Option<Value>,
    /// Node-wide pagination strategy. Fields may override it.
    pub pagination: Option<Pagination>,
    pub fields: Vec<FieldDefinition>,
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// One parameter of a node type.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    /// Used when the node's parameters have no value for the field.
    pub default: Value,
    pub display: Option<DisplayOptions>,
    pub routing: Option<FieldRouting>,
}

/// Shape of a field and how the schema walk descends into it.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A leaf value.
    Scalar,
    /// An object of optional sub-fields; only sub-fields present in the
    /// value are visited.
    Group { fields: Vec<FieldDefinition> },
    /// One of several options; only the selected option is visited. Its
    /// sub-fields read sibling parameters.
    Choice { options: Vec<ChoiceOption> },
    /// Named groups of sub-fields, each possibly repeated.
    Repeatable {
        groups: Vec<RepeatableGroup>,
        multiple_values: bool,
    },
}

/// One selectable option of a [`FieldKind::Choice`].
#[derive(Debug, Clone)]
pub struct ChoiceOption {
    pub value: Value,
    pub routing: Option<FieldRouting>,
    pub fields: Vec<FieldDefinition>,
}

/// One named group of a [`FieldKind::Repeatable`].
#[derive(Debug, Clone)]
pub struct RepeatableGroup {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

/// Conditions on root parameters that decide whether a field exists.
#[derive(Debug, Clone, Default)]
pub struct DisplayOptions {
    /// Every listed parameter must hold one of the listed values.
    pub show: BTreeMap<String, Vec<Value>>,
    /// Any listed parameter holding a listed value hides the field.
    pub hide: BTreeMap<String, Vec<Value>>,
}

impl DisplayOptions {
    pub fn is_visible(&self, parameters: &Map<String, Value>) -> bool {
        let value_of = |name: &String| parameters.get(name).unwrap_or(&Value::Null);
        let shown = self
            .show
            .iter()
            .all(|(name, allowed)| allowed.contains(value_of(name)));
        let hidden = self
            .hide
            .iter()
            .any(|(name, denied)| denied.contains(value_of(name)));
        shown && !hidden
    }
}

impl FieldDefinition {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Value::Null,
            display: None,
            routing: None,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Scalar)
    }

    pub fn group(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self::with_kind(name, FieldKind::Group { fields })
    }

    pub fn choice(name: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Self::with_kind(name, FieldKind::Choice { options })
    }

    pub fn repeatable(
        name: impl Into<String>,
        groups: Vec<RepeatableGroup>,
        multiple_values: bool,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::Repeatable {
                groups,
                multiple_values,
            },
        )
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_routing(mut self, routing: FieldRouting) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Show the field only while `parameter` holds one of `values`.
    pub fn shown_when(mut self, parameter: impl Into<String>, values: Vec<Value>) -> Self {
        self.display
            .get_or_insert_with(DisplayOptions::default)
            .show
            .insert(parameter.into(), values);
        self
    }
}

impl ChoiceOption {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            routing: None,
            fields: Vec::new(),
        }
    }

    pub fn with_routing(mut self, routing: FieldRouting) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.fields = fields;
        self
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// How a field's value contributes to the request and the response handling.
#[derive(Debug, Clone, Default)]
pub struct FieldRouting {
    /// Partial request merged into the accumulated request.
    pub request: Option<Value>,
    pub send: Option<SendRouting>,
    pub output: Option<OutputRouting>,
    pub pagination: Option<Pagination>,
}

impl FieldRouting {
    pub fn send(send: SendRouting) -> Self {
        Self {
            send: Some(send),
            ..Self::default()
        }
    }

    pub fn request(request: Value) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }

    pub fn output(output: OutputRouting) -> Self {
        Self {
            output: Some(output),
            ..Self::default()
        }
    }
}

/// Where a request fragment goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    Query,
    Body,
}

/// Placement of a field's value into the query or body.
#[derive(Debug, Clone)]
pub struct SendRouting {
    pub target: SendTarget,
    /// Destination key; may be an expression. Without a property an object
    /// value is merged into the target as a whole.
    pub property: Option<String>,
    /// Value to send instead of the field's own value (`$value`).
    pub value: Option<Value>,
    /// Treat dots in `property` as nesting.
    pub property_in_dot_notation: bool,
    /// Whether this field switches pagination on; may be an expression.
    pub paginate: Option<Value>,
    pub pre_send: Vec<Arc<dyn PreSendHook>>,
}

impl SendRouting {
    fn to(target: SendTarget, property: Option<String>) -> Self {
        Self {
            target,
            property,
            value: None,
            property_in_dot_notation: true,
            paginate: None,
            pre_send: Vec::new(),
        }
    }

    pub fn query(property: impl Into<String>) -> Self {
        Self::to(SendTarget::Query, Some(property.into()))
    }

    pub fn body(property: impl Into<String>) -> Self {
        Self::to(SendTarget::Body, Some(property.into()))
    }

    /// A send routing that contributes nothing but the pagination switch.
    pub fn paginate(flag: Value) -> Self {
        Self {
            paginate: Some(flag),
            ..Self::to(SendTarget::Query, None)
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_pre_send(mut self, hook: Arc<dyn PreSendHook>) -> Self {
        self.pre_send.push(hook);
        self
    }
}

/// Response handling contributed by a field.
#[derive(Debug, Clone, Default)]
pub struct OutputRouting {
    /// Cap on returned items; may be an expression.
    pub max_results: Option<Value>,
    pub post_receive: Vec<PostReceive>,
}

/// A response transformation, applied in declaration order.
#[derive(Debug, Clone)]
pub enum PostReceive {
    /// Replace each item with the elements found under `property`.
    RootProperty { property: String },
    /// Replace all items with one item holding `value` (may use `$response`).
    Set { value: Value },
    /// Rebuild each item from `fields` (may use `$responseItem`).
    SetKeyValue { fields: Map<String, Value> },
    /// Keep items for which `pass` is truthy (may use `$responseItem`).
    Filter { pass: Value },
    /// Keep at most `max_results` items.
    Limit { max_results: usize },
    /// Replace all items with one item carrying the raw body as binary.
    BinaryData { destination_property: String },
    Custom(Arc<dyn PostReceiveHook>),
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// How paginated requests are issued.
#[derive(Debug, Clone)]
pub enum Pagination {
    Offset(OffsetPagination),
    /// The strategy drives the whole request/accumulate loop itself.
    Custom(Arc<dyn CustomPagination>),
}

/// Limit/offset paging.
#[derive(Debug, Clone)]
pub struct OffsetPagination {
    pub limit_parameter: String,
    pub offset_parameter: String,
    pub page_size: usize,
    pub target: SendTarget,
    /// Items of a page live under this property of the first response item.
    pub root_property: Option<String>,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Rewrites the request before it is sent.
pub trait PreSendHook: Send + Sync + fmt::Debug {
    fn apply(
        &self,
        options: RequestOptions,
        data: &WorkflowData<'_>,
    ) -> Result<RequestOptions, RequestError>;
}

/// Custom response transformation.
pub trait PostReceiveHook: Send + Sync + fmt::Debug {
    fn apply(&self, items: Vec<Item>, response: &HttpResponse) -> Result<Vec<Item>, RequestError>;
}

/// Issues one request and turns the response into items, post-receive
/// transformations included.
pub trait PageFetcher: Send + Sync {
    fn fetch_page(&self, options: RequestOptions) -> BoxFuture<'_, Result<Vec<Item>, RequestError>>;
}

/// A pagination strategy that owns the request/accumulate loop.
pub trait CustomPagination: Send + Sync + fmt::Debug {
    fn paginate<'a>(
        &'a self,
        options: RequestOptions,
        fetcher: &'a dyn PageFetcher,
    ) -> BoxFuture<'a, Result<Vec<Item>, RequestError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_options_show_and_hide() {
        let params = json!({ "resource": "user", "operation": "get" })
            .as_object()
            .cloned()
            .unwrap();

        let shown = DisplayOptions {
            show: BTreeMap::from([("resource".to_string(), vec![json!("user")])]),
            hide: BTreeMap::new(),
        };
        assert!(shown.is_visible(&params));

        let hidden = DisplayOptions {
            show: BTreeMap::new(),
            hide: BTreeMap::from([("operation".to_string(), vec![json!("get")])]),
        };
        assert!(!hidden.is_visible(&params));

        let missing = DisplayOptions {
            show: BTreeMap::from([("mode".to_string(), vec![json!("advanced")])]),
            hide: BTreeMap::new(),
        };
        assert!(!missing.is_visible(&params));
    }

    #[test]
    fn builders_compose() {
        let field = FieldDefinition::scalar("limit")
            .with_default(json!(50))
            .shown_when("returnAll", vec![json!(false)])
            .with_routing(FieldRouting::send(SendRouting::query("limit")));
        assert_eq!(field.default, json!(50));
        assert!(field.display.is_some());
        let send = field.routing.unwrap().send.unwrap();
        assert_eq!(send.target, SendTarget::Query);
        assert!(send.property_in_dot_notation);
    }
}
