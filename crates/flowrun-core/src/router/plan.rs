//! Schema walk: node description + parameters -> request plan.
//!
//! The walk is depth first in declaration order. Merge precedence when
//! several fields contribute the same setting:
//!
//! - `paginate`: the first field that sets it wins.
//! - `max_results`, pagination strategy, `url`, `base_url`, `method`: the
//!   last (deepest) definition wins.
//! - pre-send and post-receive hooks: concatenated in walk order.
//! - `headers`, `query`, `body`: deep-merged, later values win on conflict.

use std::sync::Arc;

use serde_json::{json, Value};

use super::error::RequestError;
use super::path::{get_path, merge_maps, set_path};
use super::request::RequestOptions;
use super::schema::{
    FieldDefinition, FieldKind, FieldRouting, NodeDescription, Pagination, PostReceive,
    PreSendHook, SendRouting,
};
use crate::expression::{is_truthy, resolve_value, WorkflowData};

/// Everything needed to issue the request(s) for one input item.
#[derive(Debug, Clone, Default)]
pub struct RoutingPlan {
    pub options: RequestOptions,
    pub pre_send: Vec<Arc<dyn PreSendHook>>,
    pub post_receive: Vec<PostReceive>,
    pub paginate: Option<bool>,
    pub pagination: Option<Pagination>,
    pub max_results: Option<usize>,
}

impl RoutingPlan {
    /// The pagination strategy to use, if any field switched it on.
    pub fn active_pagination(&self) -> Option<&Pagination> {
        match self.paginate {
            Some(true) => self.pagination.as_ref(),
            _ => None,
        }
    }

    /// Run the pre-send hooks in registration order.
    pub fn finish(self, data: &WorkflowData<'_>) -> Result<RequestOptions, RequestError> {
        self.pre_send
            .iter()
            .try_fold(self.options, |options, hook| hook.apply(options, data))
    }
}

/// Walk `description` against the active node's parameters.
pub fn build_plan(
    description: &NodeDescription,
    data: &WorkflowData<'_>,
) -> Result<RoutingPlan, RequestError> {
    let mut walker = Walker {
        parameters: Value::Object(data.active_node().parameters.clone()),
        plan: RoutingPlan {
            pagination: description.pagination.clone(),
            ..RoutingPlan::default()
        },
    };

    if let Some(defaults) = &description.request_defaults {
        let resolved = resolve_value(defaults, data)?;
        walker.plan.options.merge(RequestOptions::from_value(&resolved)?);
    }

    walker.visit_fields(&description.fields, "", data)?;
    Ok(walker.plan)
}

struct Walker {
    parameters: Value,
    plan: RoutingPlan,
}

impl Walker {
    fn visit_fields(
        &mut self,
        fields: &[FieldDefinition],
        base: &str,
        scope: &WorkflowData<'_>,
    ) -> Result<(), RequestError> {
        fields
            .iter()
            .try_for_each(|field| self.visit_field(field, base, scope))
    }

    fn visit_field(
        &mut self,
        field: &FieldDefinition,
        base: &str,
        scope: &WorkflowData<'_>,
    ) -> Result<(), RequestError> {
        if let Some(display) = &field.display {
            if !display.is_visible(&scope.active_node().parameters) {
                return Ok(());
            }
        }

        let path = join(base, &field.name);
        let raw = get_path(&self.parameters, &path)
            .cloned()
            .unwrap_or_else(|| field.default.clone());
        // Repeatable entries may reference `$index`/`$parent`, which only
        // exist once the walk is inside a repetition.
        let value = match field.kind {
            FieldKind::Repeatable { .. } => raw,
            _ => resolve_value(&raw, scope)?,
        };
        let view = scope.scoped([("value", value.clone())]);

        if let Some(routing) = &field.routing {
            self.apply_routing(routing, &value, &view)?;
        }

        match &field.kind {
            FieldKind::Scalar => {}
            FieldKind::Group { fields } => {
                let Value::Object(present) = &value else {
                    return Ok(());
                };
                for sub in fields.iter().filter(|f| present.contains_key(&f.name)) {
                    self.visit_field(sub, &path, scope)?;
                }
            }
            FieldKind::Choice { options } => {
                if let Some(option) = options.iter().find(|o| o.value == value) {
                    if let Some(routing) = &option.routing {
                        self.apply_routing(routing, &value, &view)?;
                    }
                    self.visit_fields(&option.fields, base, scope)?;
                }
            }
            FieldKind::Repeatable {
                groups,
                multiple_values,
            } => {
                for group in groups {
                    let group_path = join(&path, &group.name);
                    let Some(entries) = value.get(&group.name) else {
                        continue;
                    };
                    match (entries, multiple_values) {
                        (Value::Array(entries), true) => {
                            for (index, entry) in entries.iter().enumerate() {
                                let nested = scope
                                    .scoped([("index", json!(index)), ("parent", entry.clone())]);
                                let entry_path = format!("{group_path}[{index}]");
                                self.visit_fields(&group.fields, &entry_path, &nested)?;
                            }
                        }
                        (entry, _) => {
                            let nested =
                                scope.scoped([("index", json!(0)), ("parent", entry.clone())]);
                            self.visit_fields(&group.fields, &group_path, &nested)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_routing(
        &mut self,
        routing: &FieldRouting,
        value: &Value,
        view: &WorkflowData<'_>,
    ) -> Result<(), RequestError> {
        if let Some(request) = &routing.request {
            let resolved = resolve_value(request, view)?;
            self.plan.options.merge(RequestOptions::from_value(&resolved)?);
        }

        if let Some(send) = &routing.send {
            self.apply_send(send, value, view)?;
        }

        if let Some(output) = &routing.output {
            if let Some(max) = &output.max_results {
                let resolved = resolve_value(max, view)?;
                if let Some(max) = as_count(&resolved)? {
                    self.plan.max_results = Some(max);
                }
            }
            self.plan
                .post_receive
                .extend(output.post_receive.iter().cloned());
        }

        if let Some(pagination) = &routing.pagination {
            self.plan.pagination = Some(pagination.clone());
        }
        Ok(())
    }

    fn apply_send(
        &mut self,
        send: &SendRouting,
        value: &Value,
        view: &WorkflowData<'_>,
    ) -> Result<(), RequestError> {
        if let (Some(flag), None) = (&send.paginate, self.plan.paginate) {
            self.plan.paginate = Some(is_truthy(&resolve_value(flag, view)?));
        }

        // A bare pagination switch places nothing.
        let places_value = send.property.is_some() || send.paginate.is_none();
        if places_value {
            let sent = match &send.value {
                Some(expr) => resolve_value(expr, view)?,
                None => value.clone(),
            };
            if !sent.is_null() {
                self.place(send, sent, view)?;
            }
        }

        self.plan.pre_send.extend(send.pre_send.iter().cloned());
        Ok(())
    }

    fn place(
        &mut self,
        send: &SendRouting,
        sent: Value,
        view: &WorkflowData<'_>,
    ) -> Result<(), RequestError> {
        let property = match &send.property {
            Some(property) => Some(match resolve_value(&json!(property), view)? {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            None => None,
        };

        let target = self.plan.options.target_mut(send.target);
        match (property, sent) {
            (Some(key), sent) if send.property_in_dot_notation => set_path(target, &key, sent),
            (Some(key), sent) => {
                target.insert(key, sent);
            }
            (None, Value::Object(map)) => merge_maps(target, map),
            (None, other) => {
                return Err(RequestError::InvalidRouting(format!(
                    "send without a property needs an object value, got {other}"
                )));
            }
        }
        Ok(())
    }
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

fn as_count(value: &Value) -> Result<Option<usize>, RequestError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| Some(n as usize))
            .ok_or_else(|| RequestError::InvalidRouting(format!("invalid max results: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RequestError::InvalidRouting(format!("invalid max results: {s}"))),
        other => Err(RequestError::InvalidRouting(format!(
            "invalid max results: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::schema::{
        ChoiceOption, OffsetPagination, OutputRouting, RepeatableGroup, SendTarget,
    };
    use flowrun_types::graph::{Graph, Node};

    fn graph_with(parameters: Value) -> Graph {
        Graph {
            id: "wf".to_string(),
            name: "router".to_string(),
            active: true,
            nodes: vec![Node::new("Api", "test.api").with_parameters(parameters)],
            connections: Vec::new(),
        }
    }

    fn plan_for(description: &NodeDescription, parameters: Value) -> RoutingPlan {
        let graph = graph_with(parameters);
        let data = WorkflowData::new(&graph, "Api").unwrap();
        build_plan(description, &data).unwrap()
    }

    fn offset(page_size: usize) -> Pagination {
        Pagination::Offset(OffsetPagination {
            limit_parameter: "limit".to_string(),
            offset_parameter: "offset".to_string(),
            page_size,
            target: SendTarget::Query,
            root_property: None,
        })
    }

    #[test]
    fn choice_only_visits_selected_branch() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::choice(
                "lookup",
                vec![
                    ChoiceOption::new(json!("byId"))
                        .with_fields(vec![FieldDefinition::scalar("id")
                            .with_routing(FieldRouting::send(SendRouting::query("id")))]),
                    ChoiceOption::new(json!("byEmail"))
                        .with_fields(vec![FieldDefinition::scalar("email")
                            .with_routing(FieldRouting::send(SendRouting::query("email")))]),
                ],
            )],
            ..NodeDescription::default()
        };

        let plan = plan_for(
            &description,
            json!({ "lookup": "byId", "id": 42, "email": "a@b.c" }),
        );
        assert_eq!(Value::Object(plan.options.query), json!({ "id": 42 }));
    }

    #[test]
    fn choice_option_routing_sees_value() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::choice(
                "operation",
                vec![ChoiceOption::new(json!("get")).with_routing(FieldRouting::request(
                    json!({ "method": "GET", "url": "=/things/{{ $value }}" }),
                ))],
            )],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "operation": "get" }));
        assert_eq!(plan.options.url.as_deref(), Some("/things/get"));
        assert_eq!(plan.options.method.as_deref(), Some("GET"));
    }

    #[test]
    fn group_visits_only_present_sub_fields() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::group(
                "filters",
                vec![
                    FieldDefinition::scalar("status")
                        .with_routing(FieldRouting::send(SendRouting::query("status"))),
                    FieldDefinition::scalar("owner")
                        .with_default(json!("me"))
                        .with_routing(FieldRouting::send(SendRouting::query("owner"))),
                ],
            )],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "filters": { "status": "open" } }));
        assert_eq!(Value::Object(plan.options.query), json!({ "status": "open" }));
    }

    #[test]
    fn repeatable_exposes_index_and_parent() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::repeatable(
                "headers",
                vec![RepeatableGroup {
                    name: "entry".to_string(),
                    fields: vec![FieldDefinition::scalar("value").with_routing(
                        FieldRouting::send(
                            SendRouting::body("=h{{ $index }}")
                                .with_value(json!("={{ $parent.name }}={{ $value }}")),
                        ),
                    )],
                }],
                true,
            )],
            ..NodeDescription::default()
        };
        let plan = plan_for(
            &description,
            json!({ "headers": { "entry": [
                { "name": "a", "value": 1 },
                { "name": "b", "value": 2 }
            ] } }),
        );
        assert_eq!(
            Value::Object(plan.options.body),
            json!({ "h0": "a=1", "h1": "b=2" })
        );
    }

    #[test]
    fn dot_notation_flag_controls_placement() {
        let mut flat = SendRouting::body("user.id");
        flat.property_in_dot_notation = false;
        let description = NodeDescription {
            fields: vec![
                FieldDefinition::scalar("nested")
                    .with_routing(FieldRouting::send(SendRouting::body("user.name"))),
                FieldDefinition::scalar("flat").with_routing(FieldRouting::send(flat)),
            ],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "nested": "ann", "flat": 7 }));
        assert_eq!(
            Value::Object(plan.options.body),
            json!({ "user": { "name": "ann" }, "user.id": 7 })
        );
    }

    #[test]
    fn hidden_fields_contribute_nothing() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::scalar("limit")
                .shown_when("returnAll", vec![json!(false)])
                .with_routing(FieldRouting::send(SendRouting::query("limit")))],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "returnAll": true, "limit": 5 }));
        assert!(plan.options.query.is_empty());
    }

    #[test]
    fn paginate_first_set_wins_and_max_results_last_set_wins() {
        let description = NodeDescription {
            pagination: Some(offset(10)),
            fields: vec![
                FieldDefinition::scalar("returnAll").with_routing(FieldRouting {
                    send: Some(SendRouting::paginate(json!("={{ $value }}"))),
                    output: Some(OutputRouting {
                        max_results: Some(json!(100)),
                        post_receive: Vec::new(),
                    }),
                    ..FieldRouting::default()
                }),
                FieldDefinition::scalar("override").with_routing(FieldRouting {
                    send: Some(SendRouting::paginate(json!(false))),
                    output: Some(OutputRouting {
                        max_results: Some(json!("={{ $value }}")),
                        post_receive: Vec::new(),
                    }),
                    ..FieldRouting::default()
                }),
            ],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "returnAll": true, "override": 25 }));
        assert_eq!(plan.paginate, Some(true));
        assert_eq!(plan.max_results, Some(25));
        assert!(plan.active_pagination().is_some());
        // Bare pagination switches place nothing.
        assert!(plan.options.query.is_empty());
    }

    #[test]
    fn request_defaults_resolve_expressions() {
        let description = NodeDescription {
            request_defaults: Some(json!({
                "base_url": "https://api.example.com",
                "headers": { "Accept": "application/json" },
                "url": "=/{{ $parameter.resource }}"
            })),
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "resource": "users" }));
        let request = plan.options.into_request().unwrap();
        assert_eq!(request.url, "https://api.example.com/users");
        assert_eq!(
            request.headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn send_without_property_merges_objects() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::scalar("extra").with_routing(FieldRouting::send(
                SendRouting {
                    property: None,
                    ..SendRouting::body("unused")
                },
            ))],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({ "extra": { "a": 1, "b": { "c": 2 } } }));
        assert_eq!(
            Value::Object(plan.options.body),
            json!({ "a": 1, "b": { "c": 2 } })
        );
    }

    #[test]
    fn null_values_are_not_sent() {
        let description = NodeDescription {
            fields: vec![FieldDefinition::scalar("missing")
                .with_routing(FieldRouting::send(SendRouting::query("missing")))],
            ..NodeDescription::default()
        };
        let plan = plan_for(&description, json!({}));
        assert!(plan.options.query.is_empty());
    }
}
