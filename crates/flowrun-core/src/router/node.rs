//! Per-invocation driver: one routed request (or page loop) per input item.

use std::collections::BTreeMap;

use flowrun_types::credential::CredentialData;
use flowrun_types::graph::{Graph, Node};
use flowrun_types::run::{ExecutionMode, Item, PairedItem, PairedItemRef, RunExecutionData, SourceRef};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use super::error::RequestError;
use super::pagination::fetch_all;
use super::plan::build_plan;
use super::receive::receive;
use super::request::RequestOptions;
use super::schema::{NodeDescription, PageFetcher, PostReceive};
use super::transport::{AuthScheme, HttpTransport};
use crate::expression::{ExpressionError, WorkflowData};
use crate::repository::credential::CredentialProvider;

/// The run coordinates a node invocation is routed from.
#[derive(Debug, Clone, Copy)]
pub struct RoutingInput<'a> {
    pub graph: &'a Graph,
    pub node_name: &'a str,
    pub run_data: &'a RunExecutionData,
    /// Items on the node's main input.
    pub items: &'a [Item],
    pub source: &'a [Option<SourceRef>],
    pub run_index: usize,
    pub mode: ExecutionMode,
    pub env: &'a BTreeMap<String, String>,
}

impl<'a> RoutingInput<'a> {
    /// Expression view for input item `item_index` with extra `$key` roots.
    pub fn view(
        &self,
        item_index: usize,
        extra: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Result<WorkflowData<'a>, ExpressionError> {
        let mut data = WorkflowData::new(self.graph, self.node_name)?
            .with_run_data(self.run_data)
            .with_input(self.items, self.source)
            .at(self.run_index, item_index)
            .with_mode(self.mode)
            .with_env(self.env);
        for (key, value) in extra {
            data = data.with_additional_key(key, value);
        }
        Ok(data)
    }
}

/// Executes declarative nodes over HTTP.
pub struct RequestRouter<T, C> {
    transport: T,
    credentials: C,
}

impl<T: HttpTransport, C: CredentialProvider> RequestRouter<T, C> {
    pub fn new(transport: T, credentials: C) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Route every input item of one node invocation, sequentially.
    ///
    /// Output items are paired to the input item they were produced for.
    /// With `continue_on_fail` a failing item yields one error item instead
    /// of aborting the invocation.
    pub async fn route(
        &self,
        description: &NodeDescription,
        input: &RoutingInput<'_>,
    ) -> Result<Vec<Item>, RequestError> {
        let node = input.graph.node(input.node_name).ok_or_else(|| {
            RequestError::InvalidRouting(format!("unknown node \"{}\"", input.node_name))
        })?;

        let credential = self.load_credential(description, node).await?;
        let auth = credential
            .as_ref()
            .map(AuthScheme::from_credential)
            .transpose()?;
        let credentials_value = credential
            .as_ref()
            .map(|c| json!(c.fields()))
            .unwrap_or(Value::Null);

        let mut output = Vec::new();
        for index in 0..input.items.len() {
            let routed = self
                .route_item(description, input, index, auth.as_ref(), &credentials_value)
                .await;
            match routed {
                Ok(items) => {
                    tracing::debug!(node = %node.name, item = index, produced = items.len(), "routed item");
                    output.extend(items.into_iter().map(|item| Item {
                        paired_item: Some(PairedItem::Single(PairedItemRef::new(index))),
                        ..item
                    }));
                }
                Err(err) if node.continue_on_fail => {
                    tracing::warn!(node = %node.name, item = index, error = %err, "item failed, continuing");
                    output.push(Item {
                        error: Some(err.task_error(&node.name).message),
                        ..Item::new(json!({}))
                    }
                    .paired_with(index));
                }
                Err(err) => {
                    tracing::error!(node = %node.name, item = index, error = %err, "item failed");
                    return Err(err);
                }
            }
        }
        Ok(output)
    }

    async fn load_credential(
        &self,
        description: &NodeDescription,
        node: &Node,
    ) -> Result<Option<CredentialData>, RequestError> {
        let Some(credential_type) = &description.credential_type else {
            return Ok(None);
        };
        let name = node.credentials.get(credential_type).ok_or_else(|| {
            RequestError::Credentials(format!(
                "node \"{}\" has no credential of type \"{credential_type}\"",
                node.name
            ))
        })?;
        let credential = self
            .credentials
            .get(name)
            .await
            .map_err(|e| RequestError::Credentials(e.to_string()))?
            .ok_or_else(|| RequestError::Credentials(format!("credential \"{name}\" not found")))?;
        Ok(Some(credential))
    }

    async fn route_item(
        &self,
        description: &NodeDescription,
        input: &RoutingInput<'_>,
        index: usize,
        auth: Option<&AuthScheme>,
        credentials: &Value,
    ) -> Result<Vec<Item>, RequestError> {
        // Everything expression-dependent is resolved before the first send.
        let (options, plan_pagination, post_receive, max_results) = {
            let data = input.view(index, [("credentials", credentials.clone())])?;
            let plan = build_plan(description, &data)?;
            let pagination = plan.active_pagination().cloned();
            let post_receive = plan.post_receive.clone();
            let max_results = plan.max_results;
            (plan.finish(&data)?, pagination, post_receive, max_results)
        };

        let fetcher = ItemFetcher {
            transport: &self.transport,
            auth,
            input,
            index,
            credentials,
            post_receive: &post_receive,
        };
        fetch_all(options, plan_pagination.as_ref(), max_results, &fetcher).await
    }
}

/// Sends one page for one item and converts the response.
struct ItemFetcher<'r, 'a, T> {
    transport: &'r T,
    auth: Option<&'r AuthScheme>,
    input: &'r RoutingInput<'a>,
    index: usize,
    credentials: &'r Value,
    post_receive: &'r [PostReceive],
}

impl<T: HttpTransport> PageFetcher for ItemFetcher<'_, '_, T> {
    fn fetch_page(&self, options: RequestOptions) -> BoxFuture<'_, Result<Vec<Item>, RequestError>> {
        async move {
            let request = options.into_request()?;
            tracing::debug!(method = %request.method, url = %request.url, "sending request");
            let response = self.transport.send(request, self.auth).await?;
            if !response.is_success() {
                return Err(RequestError::status(response.status, response.body));
            }

            let data = self.input.view(
                self.index,
                [
                    ("credentials", self.credentials.clone()),
                    ("response", response.to_value()),
                ],
            )?;
            receive(self.post_receive, &response, &data)
        }
        .boxed()
    }
}
