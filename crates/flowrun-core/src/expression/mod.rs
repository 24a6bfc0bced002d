//! Lineage-aware expression resolution.
//!
//! Parameter values starting with `=` are templates whose `{{ }}` segments
//! are JEXL expressions evaluated against a [`WorkflowData`] view of the run:
//! the current item, other nodes' outputs, node parameters, environment and
//! workflow metadata. Lineage lookups (`pairedItem`) trace an item back
//! through the graph to the upstream item it derives from.

pub mod data;
pub mod error;
mod evaluator;
pub mod lineage;
pub mod resolver;
pub mod template;

pub use data::WorkflowData;
pub use error::{ExpressionError, ExpressionErrorKind};
pub(crate) use evaluator::is_truthy;
pub use resolver::{resolve, resolve_value};
