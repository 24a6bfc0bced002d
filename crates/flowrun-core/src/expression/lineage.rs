//! Item lineage: tracing an item back to the upstream item it derives from.
//!
//! Every hop reads the `pairedItem` annotation of the item the previous hop
//! landed on and follows the producing node's source pointer for that input
//! slot. An item with several candidate annotations resolves only when
//! exactly one candidate reaches the destination.

use flowrun_types::run::{Item, PairedItem, PairedItemRef, SourceRef, TaskData};

use super::data::WorkflowData;
use super::error::{ExpressionError, ExpressionErrorKind};

/// Upper bound on hops across one lineage lookup, branches included.
pub const MAX_LINEAGE_HOPS: usize = 10_000;

impl<'a> WorkflowData<'a> {
    /// The item of `destination` that the active node's input item
    /// `item_index` (default: the current item) derives from.
    pub fn paired_item(
        &self,
        destination: &str,
        item_index: Option<usize>,
    ) -> Result<&'a Item, ExpressionError> {
        let index = item_index.unwrap_or(self.item_index());
        if self.graph().node(destination).is_none() {
            return Err(self.located(ExpressionError::new(
                ExpressionErrorKind::UnknownNode,
                format!("No node called \"{destination}\" in this workflow"),
            )));
        }
        if index >= self.input_items().len() {
            return Err(self.located(ExpressionError::paired(
                ExpressionErrorKind::PairedItemMissing,
                "Could not resolve, as pairedItem data is missing",
            )));
        }
        let source = self
            .input_source()
            .first()
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                self.located(ExpressionError::paired(
                    ExpressionErrorKind::SourceMissing,
                    "Could not resolve, as source data is missing",
                ))
            })?;

        self.resolve_paired_item(destination, Some(source), PairedItemRef::new(index))
    }

    /// Walk from `source`/`paired` back to the item of `destination`.
    pub fn resolve_paired_item(
        &self,
        destination: &str,
        source: Option<&'a SourceRef>,
        paired: PairedItemRef,
    ) -> Result<&'a Item, ExpressionError> {
        let mut hops = 0;
        self.walk(destination, source, paired, &mut hops)
            .map_err(|e| self.located(e))
    }

    /// Resolve a recorded output item of any node back to `destination`.
    pub fn item_lineage(
        &self,
        node: &str,
        run: Option<usize>,
        output: usize,
        item_index: usize,
        destination: &str,
    ) -> Result<&'a Item, ExpressionError> {
        let task = self.node_task(node, run)?;
        let item = task
            .output(output)
            .and_then(|items| items.get(item_index))
            .ok_or_else(|| self.located(missing_item(node, item_index)))?;
        if node == destination {
            return Ok(item);
        }
        let mut hops = 0;
        self.follow(destination, node, item, task, &mut hops)
            .map_err(|e| self.located(e))
    }

    fn walk(
        &self,
        destination: &str,
        mut source: Option<&'a SourceRef>,
        mut paired: PairedItemRef,
        hops: &mut usize,
    ) -> Result<&'a Item, ExpressionError> {
        loop {
            let Some(src) = source else {
                return Err(ExpressionError::paired(
                    ExpressionErrorKind::PairedItemUnresolved,
                    "Could not resolve, probably no pairedItem exists",
                ));
            };

            *hops += 1;
            if *hops > MAX_LINEAGE_HOPS {
                return Err(ExpressionError::paired(
                    ExpressionErrorKind::PairedItemUnresolved,
                    "Could not resolve, as the lineage path is too long",
                ));
            }

            let task = self
                .run_data()
                .and_then(|data| data.tasks(&src.previous_node).get(src.previous_node_run))
                .ok_or_else(|| {
                    ExpressionError::paired(
                        ExpressionErrorKind::PairedItemUnresolved,
                        format!(
                            "Could not resolve, as run {} of node \"{}\" has no data",
                            src.previous_node_run, src.previous_node
                        ),
                    )
                })?;
            let item = task
                .output(src.previous_node_output)
                .and_then(|items| items.get(paired.item))
                .ok_or_else(|| missing_item(&src.previous_node, paired.item))?;

            tracing::trace!(node = %src.previous_node, item = paired.item, "lineage hop");

            if src.previous_node == destination {
                return Ok(item);
            }

            match next_hop(&src.previous_node, item, task)? {
                Hop::Single(next_source, next_paired) => {
                    source = next_source;
                    paired = next_paired;
                }
                Hop::Fork(_) => return self.follow(destination, &src.previous_node, item, task, hops),
            }
        }
    }

    /// Continue the walk from an item recorded by `node` in `task`.
    fn follow(
        &self,
        destination: &str,
        node: &str,
        item: &'a Item,
        task: &'a TaskData,
        hops: &mut usize,
    ) -> Result<&'a Item, ExpressionError> {
        match next_hop(node, item, task)? {
            Hop::Single(source, paired) => self.walk(destination, source, paired, hops),
            Hop::Fork(candidates) => {
                let mut resolved = Vec::new();
                for (source, paired) in candidates {
                    if let Ok(found) = self.walk(destination, source, paired, hops) {
                        resolved.push(found);
                    }
                }
                match resolved.as_slice() {
                    [only] => Ok(*only),
                    [] => Err(ExpressionError::paired(
                        ExpressionErrorKind::PairedItemUnresolved,
                        "Could not resolve, as no definitive match could be found",
                    )
                    .with_description("none of the candidate items lead to the requested node")),
                    _ => Err(ExpressionError::paired(
                        ExpressionErrorKind::PairedItemAmbiguous,
                        "Could not resolve, as no definitive match could be found",
                    )
                    .with_description(format!(
                        "{} candidate items lead to the requested node",
                        resolved.len()
                    ))),
                }
            }
        }
    }
}

enum Hop<'a> {
    Single(Option<&'a SourceRef>, PairedItemRef),
    Fork(Vec<(Option<&'a SourceRef>, PairedItemRef)>),
}

fn next_hop<'a>(node: &str, item: &Item, task: &'a TaskData) -> Result<Hop<'a>, ExpressionError> {
    let source_for = |slot: usize| task.source.get(slot).and_then(Option::as_ref);
    match &item.paired_item {
        None => Err(ExpressionError::paired(
            ExpressionErrorKind::PairedItemMissing,
            format!("Could not resolve, as pairedItem data is missing on node \"{node}\""),
        )),
        Some(PairedItem::Index(index)) => Ok(Hop::Single(source_for(0), PairedItemRef::new(*index))),
        Some(PairedItem::Single(r)) => Ok(Hop::Single(source_for(r.input_slot()), *r)),
        Some(PairedItem::Multiple(refs)) => Ok(Hop::Fork(
            refs.iter().map(|r| (source_for(r.input_slot()), *r)).collect(),
        )),
    }
}

fn missing_item(node: &str, item: usize) -> ExpressionError {
    ExpressionError::paired(
        ExpressionErrorKind::PairedItemUnresolved,
        format!("Could not resolve, as item {item} of node \"{node}\" does not exist"),
    )
}
