//! The single error type raised while resolving expressions.

use std::fmt;

use flowrun_types::run::TerminalDiagnostic;

/// Machine-readable classification of an [`ExpressionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionErrorKind {
    /// The run has no execution data at all.
    NoExecutionData,
    /// The node exists in the graph but has not run.
    NodeNotExecuted,
    /// No node of that name exists in the graph.
    UnknownNode,
    /// The requested run index is past the node's recorded runs.
    RunNotFound,
    /// The node's run recorded no output.
    NoOutputData,
    /// The requested node does not feed the active node.
    NotConnected,
    /// The node has no output slot with that index.
    NoOutputBranch,
    /// The requested item index does not exist.
    ItemNotFound,
    /// An item on the lineage path carries no pairedItem annotation.
    PairedItemMissing,
    /// Several lineage candidates resolved.
    PairedItemAmbiguous,
    /// The lineage walk ran out of source pointers or candidates.
    PairedItemUnresolved,
    /// The active node has no input source to start a lineage walk from.
    SourceMissing,
    /// Unbalanced `{{ }}` or similar template problems.
    InvalidSyntax,
    /// The expression engine rejected or failed to evaluate the expression.
    EvaluationFailed,
    /// Parameters referencing each other too deeply.
    RecursionLimit,
}

/// An expression could not be resolved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct ExpressionError {
    pub kind: ExpressionErrorKind,
    pub message: String,
    pub description: Option<String>,
    pub run_index: Option<usize>,
    pub item_index: Option<usize>,
    pub is_paired_item_error: bool,
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(description) = &self.description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}

impl ExpressionError {
    pub fn new(kind: ExpressionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            description: None,
            run_index: None,
            item_index: None,
            is_paired_item_error: false,
        }
    }

    /// A lineage failure.
    pub fn paired(kind: ExpressionErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_paired_item_error: true,
            ..Self::new(kind, message)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The user-visible diagnostic for a lineage failure inside `node`.
    /// `None` for errors that are not about lineage.
    pub fn diagnostic(&self, node: &str) -> Option<TerminalDiagnostic> {
        self.is_paired_item_error
            .then(|| TerminalDiagnostic::LineageUnresolved {
                node: node.to_string(),
                detail: self.to_string(),
            })
    }

    /// Record where the failing evaluation happened, unless already recorded.
    pub fn at(mut self, run_index: usize, item_index: usize) -> Self {
        self.run_index.get_or_insert(run_index);
        self.item_index.get_or_insert(item_index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_description() {
        let err = ExpressionError::new(ExpressionErrorKind::UnknownNode, "No node called \"X\"")
            .with_description("check the node name");
        assert_eq!(err.to_string(), "No node called \"X\" (check the node name)");
    }

    #[test]
    fn at_keeps_innermost_position() {
        let err = ExpressionError::paired(ExpressionErrorKind::PairedItemMissing, "missing")
            .at(0, 3)
            .at(1, 5);
        assert_eq!(err.run_index, Some(0));
        assert_eq!(err.item_index, Some(3));
        assert!(err.is_paired_item_error);
    }

    #[test]
    fn only_lineage_failures_carry_a_diagnostic() {
        let err = ExpressionError::paired(ExpressionErrorKind::PairedItemAmbiguous, "two matches");
        assert_eq!(
            err.diagnostic("Merge"),
            Some(TerminalDiagnostic::LineageUnresolved {
                node: "Merge".to_string(),
                detail: "two matches".to_string(),
            })
        );

        let err = ExpressionError::new(ExpressionErrorKind::UnknownNode, "no node");
        assert_eq!(err.diagnostic("Merge"), None);
    }
}
