//! Declarative request routing.
//!
//! A [`NodeDescription`] declares a node's fields and how each one shapes an
//! HTTP request. [`RequestRouter`] walks that schema for every input item,
//! sends the request through an [`HttpTransport`] (paging if asked to) and
//! converts the response back into items.

pub mod error;
pub mod node;
pub mod pagination;
pub mod path;
pub mod plan;
pub mod receive;
pub mod request;
pub mod schema;
pub mod transport;

pub use error::RequestError;
pub use node::{RequestRouter, RoutingInput};
pub use plan::{build_plan, RoutingPlan};
pub use request::{HttpRequest, RequestOptions};
pub use schema::{
    ChoiceOption, CustomPagination, DisplayOptions, FieldDefinition, FieldKind, FieldRouting,
    NodeDescription, OffsetPagination, OutputRouting, PageFetcher, Pagination, PostReceive,
    PostReceiveHook, PreSendHook, RepeatableGroup, SendRouting, SendTarget,
};
pub use transport::{AuthScheme, HttpResponse, HttpTransport};
