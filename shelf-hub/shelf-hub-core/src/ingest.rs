//! Parallel validation of editor block trees ahead of ingestion.
//!
//! Workers run on the blocking pool, pull tree indexes from a shared counter
//! and report `(index, outcome)` over a channel. They never see the
//! database; the coordinator alone writes what they accepted.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::limits::Limits;
use crate::tree::{flatten_to_raw, ArborizedBlock, FlattenedBlock};

struct TreeOutcome {
    index: usize,
    result: Result<Vec<FlattenedBlock>>,
}

/// Flatten every tree with at most `max_workers` blocking workers.
///
/// The returned vector is index-aligned with `trees`. Cancellation stops the
/// workers between blocks and fails the whole call.
pub async fn validate_block_trees(
    trees: Vec<Vec<ArborizedBlock>>,
    limits: Arc<Limits>,
    cancel: CancellationToken,
) -> Result<Vec<Result<Vec<FlattenedBlock>>>> {
    let total = trees.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let worker_count = total.min(limits.max_workers.max(1));
    let trees = Arc::new(trees);
    let next = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::channel::<TreeOutcome>(total);
    debug!(trees = total, workers = worker_count, "validating block trees");

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let trees = Arc::clone(&trees);
        let next = Arc::clone(&next);
        let limits = Arc::clone(&limits);
        let cancel = cancel.clone();
        let tx = tx.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut handled = 0usize;
            while !cancel.is_cancelled() {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(roots) = trees.get(index) else {
                    break;
                };
                let result = flatten_to_raw(roots, &limits, &cancel);
                handled += 1;
                if tx.blocking_send(TreeOutcome { index, result }).is_err() {
                    break;
                }
            }
            debug!(worker_id, handled, "validation worker finished");
        }));
    }
    drop(tx);

    let mut slots: Vec<Option<Result<Vec<FlattenedBlock>>>> = (0..total).map(|_| None).collect();
    while let Some(outcome) = rx.recv().await {
        slots[outcome.index] = Some(outcome.result);
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| HubError::Internal(format!("validation worker failed: {e}")))?;
    }
    if cancel.is_cancelled() {
        return Err(HubError::Cancelled);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| HubError::Internal(format!("block tree {index} was never validated")))
        })
        .collect()
}

/// Accepted trees and rejected indexes, both ascending.
#[derive(Debug, Default)]
pub struct Partition {
    pub accepted: Vec<(usize, Vec<FlattenedBlock>)>,
    pub failed_indexes: Vec<usize>,
}

impl Partition {
    pub fn success_indexes(&self) -> Vec<usize> {
        self.accepted.iter().map(|(index, _)| *index).collect()
    }
}

/// Split validation results. A tree reusing a block id of an earlier
/// accepted tree is rejected as well.
pub fn partition(results: Vec<Result<Vec<FlattenedBlock>>>) -> Partition {
    let mut partition = Partition::default();
    let mut seen = HashSet::new();
    for (index, result) in results.into_iter().enumerate() {
        let result = result.and_then(|blocks| {
            match blocks.iter().find(|b| seen.contains(&b.id)) {
                Some(reused) => Err(HubError::DuplicateBlockId(reused.id)),
                None => Ok(blocks),
            }
        });
        match result {
            Ok(blocks) => {
                seen.extend(blocks.iter().map(|b| b.id));
                partition.accepted.push((index, blocks));
            }
            Err(e) => {
                warn!(index, kind = %e.kind(), error = %e, "rejecting block tree");
                partition.failed_indexes.push(index);
            }
        }
    }
    partition
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroupAndBlockIds {
    pub block_group_id: Uuid,
    pub block_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paragraph(id: Uuid, children: Vec<ArborizedBlock>) -> ArborizedBlock {
        ArborizedBlock {
            id,
            kind: "paragraph".into(),
            props: json!({}),
            content: Some(json!([{"type": "text", "text": "hi"}])),
            children,
        }
    }

    fn single(children: usize) -> Vec<ArborizedBlock> {
        let kids = (0..children)
            .map(|_| paragraph(Uuid::new_v4(), vec![]))
            .collect();
        vec![paragraph(Uuid::new_v4(), kids)]
    }

    #[tokio::test]
    async fn results_stay_aligned_with_input() {
        let trees = vec![
            single(2),
            vec![paragraph(Uuid::new_v4(), vec![]), paragraph(Uuid::new_v4(), vec![])],
            single(0),
            single(5),
        ];
        let limits = Arc::new(Limits {
            max_workers: 2,
            ..Limits::default()
        });
        let results = validate_block_trees(trees, limits, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().len(), 3);
        assert!(matches!(
            results[1],
            Err(HubError::RepeatedRootBlockInBlockGroup(2))
        ));
        assert_eq!(results[3].as_ref().unwrap().len(), 6);

        let split = partition(results);
        assert_eq!(split.failed_indexes, vec![1]);
        assert_eq!(split.success_indexes(), vec![0, 2, 3]);
    }

    #[test]
    fn trees_sharing_block_ids_are_rejected() {
        let tree = single(1);
        let limits = Limits::default();
        let cancel = CancellationToken::new();
        let first = flatten_to_raw(&tree, &limits, &cancel);
        let again = flatten_to_raw(&tree, &limits, &cancel);
        let split = partition(vec![first, again]);
        assert_eq!(split.success_indexes(), vec![0]);
        assert_eq!(split.failed_indexes, vec![1]);
    }

    #[tokio::test]
    async fn cancellation_fails_the_batch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = validate_block_trees(vec![single(3)], Arc::new(Limits::default()), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Cancelled));
    }

    #[tokio::test]
    async fn empty_input_spawns_nothing() {
        let results = validate_block_trees(vec![], Arc::new(Limits::default()), CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
