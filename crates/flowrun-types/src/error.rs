use thiserror::Error;

/// Errors from repository operations (used by the port traits in flowrun-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Structural problems in a workflow graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("connection references unknown node '{0}'")]
    UnknownNode(String),
}
