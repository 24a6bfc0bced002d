//! HTTP adapters: the outbound transport used by the request router and the
//! client that hands resumed runs to the graph runner.

pub mod runner;
pub mod transport;

pub use runner::WebhookRunner;
pub use transport::ReqwestTransport;
