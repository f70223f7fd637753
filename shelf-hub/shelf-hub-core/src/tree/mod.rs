//! Conversion between the nested editor form of a block group and the flat
//! parent-pointer records it is stored as.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::block::EditorBlock;
use crate::error::{HubError, Result};
use crate::limits::Limits;

/// A block as the editor sends it: props and content are still raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArborizedBlock {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "empty_props")]
    pub props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default)]
    pub children: Vec<ArborizedBlock>,
}

fn empty_props() -> Value {
    Value::Object(Default::default())
}

/// Tree input accepted over the wire: a single root or a list of top-level blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTreeInput {
    One(Box<ArborizedBlock>),
    Many(Vec<ArborizedBlock>),
}

impl BlockTreeInput {
    pub fn into_roots(self) -> Vec<ArborizedBlock> {
        match self {
            BlockTreeInput::One(root) => vec![*root],
            BlockTreeInput::Many(roots) => roots,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedBlock {
    pub id: Uuid,
    pub parent_block_id: Option<Uuid>,
    pub block: EditorBlock,
}

/// Flatten a block group's top-level blocks into pre-order records.
///
/// Every node is validated through the block codec. The group must have
/// exactly one top-level block; ids must be unique; nesting is bounded by
/// `max_block_depth`. The token is checked between blocks.
pub fn flatten_to_raw(
    roots: &[ArborizedBlock],
    limits: &Limits,
    cancel: &CancellationToken,
) -> Result<Vec<FlattenedBlock>> {
    match roots.len() {
        0 => return Err(HubError::InvalidBlockTree("block group has no root block".into())),
        1 => {}
        n => return Err(HubError::RepeatedRootBlockInBlockGroup(n)),
    }

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(&ArborizedBlock, Option<Uuid>, usize)> =
        roots.iter().rev().map(|root| (root, None, 1)).collect();

    while let Some((node, parent, depth)) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }
        if depth > limits.max_block_depth {
            return Err(HubError::InvalidBlockTree(format!(
                "blocks nest deeper than {}",
                limits.max_block_depth
            )));
        }
        if !seen.insert(node.id) {
            return Err(HubError::DuplicateBlockId(node.id));
        }
        let block = EditorBlock::decode(&node.kind, &node.props, node.content.as_ref(), limits)?;
        out.push(FlattenedBlock {
            id: node.id,
            parent_block_id: parent,
            block,
        });
        for child in node.children.iter().rev() {
            stack.push((child, Some(node.id), depth + 1));
        }
    }
    Ok(out)
}

/// Rebuild the nested form of `root` from records grouped by parent id.
/// Children keep the order they have in their vectors.
pub fn arborize_raw_to_raw(
    root: &FlattenedBlock,
    children_by_parent: &HashMap<Uuid, Vec<FlattenedBlock>>,
) -> Result<ArborizedBlock> {
    let mut visited = HashSet::new();
    build(root, children_by_parent, &mut visited)
}

fn build(
    node: &FlattenedBlock,
    children_by_parent: &HashMap<Uuid, Vec<FlattenedBlock>>,
    visited: &mut HashSet<Uuid>,
) -> Result<ArborizedBlock> {
    if !visited.insert(node.id) {
        return Err(HubError::InvalidBlockTree(format!(
            "block {} is reachable twice",
            node.id
        )));
    }
    let children = match children_by_parent.get(&node.id) {
        Some(children) => children
            .iter()
            .map(|child| build(child, children_by_parent, visited))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(ArborizedBlock {
        id: node.id,
        kind: node.block.kind.as_str().to_string(),
        props: node.block.props_value()?,
        content: node.block.content_value()?,
        children,
    })
}

/// Rebuild a whole block group from its stored records.
pub fn arborize_group(records: Vec<FlattenedBlock>) -> Result<ArborizedBlock> {
    let total = records.len();
    let mut ids = HashSet::with_capacity(total);
    for record in &records {
        if !ids.insert(record.id) {
            return Err(HubError::DuplicateBlockId(record.id));
        }
    }

    let mut roots = Vec::new();
    let mut children_by_parent: HashMap<Uuid, Vec<FlattenedBlock>> = HashMap::new();
    let mut order = Vec::with_capacity(total);
    for record in records {
        order.push(record.id);
        match record.parent_block_id {
            None => roots.push(record),
            Some(parent) => children_by_parent.entry(parent).or_default().push(record),
        }
    }

    let root = match roots.len() {
        0 => return Err(HubError::InvalidBlockTree("block group has no root block".into())),
        1 => roots.remove(0),
        n => return Err(HubError::RepeatedRootBlockInBlockGroup(n)),
    };

    let mut visited = HashSet::with_capacity(total);
    let tree = build(&root, &children_by_parent, &mut visited)?;
    if visited.len() != total {
        if let Some(orphan) = order.into_iter().find(|id| !visited.contains(id)) {
            return Err(HubError::OrphanBlock(orphan));
        }
    }
    Ok(tree)
}

/// Number of blocks in a nested tree.
pub fn count_blocks(roots: &[ArborizedBlock]) -> usize {
    roots
        .iter()
        .map(|root| 1 + count_blocks(&root.children))
        .sum()
}
