//! Pure move planning. Plans are computed from rows already read inside the
//! operation's transaction and applied by the store.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::store::SubShelf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubShelfMovePlan {
    pub source_id: Uuid,
    pub source_root_shelf_id: Uuid,
    pub destination_root_shelf_id: Uuid,
    pub new_prev_sub_shelf_id: Option<Uuid>,
    pub new_path: Vec<Uuid>,
    /// Rewritten path of every descendant of the source.
    pub descendant_paths: Vec<(Uuid, Vec<Uuid>)>,
}

impl SubShelfMovePlan {
    pub fn crosses_root_shelves(&self) -> bool {
        self.source_root_shelf_id != self.destination_root_shelf_id
    }
}

/// Plan moving `source` (with its `descendants`) under `destination`, or
/// directly under `destination_root_shelf_id` when `destination` is `None`.
pub fn plan_sub_shelf_move(
    source: &SubShelf,
    descendants: &[SubShelf],
    destination_root_shelf_id: Uuid,
    destination: Option<&SubShelf>,
    max_depth: usize,
) -> Result<SubShelfMovePlan> {
    let destination_id = destination.map(|d| d.id);
    if destination_id == Some(source.id) {
        return Err(HubError::NoChanges(format!(
            "sub-shelf {} cannot be moved into itself",
            source.id
        )));
    }
    if source.prev_sub_shelf_id == destination_id
        && source.root_shelf_id == destination_root_shelf_id
    {
        return Err(HubError::NoChanges(format!(
            "sub-shelf {} is already there",
            source.id
        )));
    }

    let new_path = destination.map(SubShelf::child_path).unwrap_or_default();
    let depth = source.path.len() + new_path.len();
    if depth > max_depth {
        return Err(HubError::MaximumDepthExceeded {
            depth,
            max: max_depth,
        });
    }

    if let Some(destination) = destination {
        if destination.path.contains(&source.id) {
            return Err(HubError::InsertParentIntoItsChildren {
                source_id: source.id,
                destination_id: destination.id,
            });
        }
    }

    let mut descendant_paths = Vec::with_capacity(descendants.len());
    for descendant in descendants {
        let Some(pos) = descendant.path.iter().position(|id| *id == source.id) else {
            continue;
        };
        let mut path = new_path.clone();
        path.push(source.id);
        path.extend_from_slice(&descendant.path[pos + 1..]);
        if path.len() > max_depth {
            return Err(HubError::MaximumDepthExceeded {
                depth: path.len(),
                max: max_depth,
            });
        }
        descendant_paths.push((descendant.id, path));
    }

    Ok(SubShelfMovePlan {
        source_id: source.id,
        source_root_shelf_id: source.root_shelf_id,
        destination_root_shelf_id,
        new_prev_sub_shelf_id: destination_id,
        new_path,
        descendant_paths,
    })
}

/// Order of a block-group chain with `moving` re-inserted after `new_prev`
/// (or at the head).
pub fn plan_block_group_move(
    order: &[Uuid],
    moving: Uuid,
    new_prev: Option<Uuid>,
) -> Result<Vec<Uuid>> {
    let Some(index) = order.iter().position(|id| *id == moving) else {
        return Err(HubError::not_found("BlockGroup", moving));
    };
    let current_prev = index.checked_sub(1).map(|i| order[i]);
    if new_prev == Some(moving) || new_prev == current_prev {
        return Err(HubError::NoChanges(format!(
            "block group {moving} is already there"
        )));
    }
    let mut next: Vec<Uuid> = order.iter().copied().filter(|id| *id != moving).collect();
    insert_after(&mut next, moving, new_prev)?;
    Ok(next)
}

/// Insert `id` after `prev` in a chain order, or at the head for `None`.
pub fn insert_after(order: &mut Vec<Uuid>, id: Uuid, prev: Option<Uuid>) -> Result<()> {
    let at = match prev {
        None => 0,
        Some(prev) => match order.iter().position(|other| *other == prev) {
            Some(i) => i + 1,
            None => return Err(HubError::not_found("BlockGroup", prev)),
        },
    };
    order.insert(at, id);
    Ok(())
}

/// Prev pointers that differ between two orderings of the same chain.
pub fn chain_updates(old: &[Uuid], new: &[Uuid]) -> Vec<(Uuid, Option<Uuid>)> {
    let prevs = |order: &[Uuid]| -> HashMap<Uuid, Option<Uuid>> {
        order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i.checked_sub(1).map(|p| order[p])))
            .collect()
    };
    let before = prevs(old);
    new.iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let prev = i.checked_sub(1).map(|p| new[p]);
            match before.get(id) {
                Some(old_prev) if *old_prev == prev => None,
                _ => Some((*id, prev)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn shelf(root: Uuid, path: Vec<Uuid>) -> SubShelf {
        SubShelf {
            id: Uuid::new_v4(),
            name: "s".into(),
            root_shelf_id: root,
            prev_sub_shelf_id: path.last().copied(),
            path,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn moving_under_a_sibling_rewrites_descendants() {
        let root = Uuid::new_v4();
        let a = shelf(root, vec![]);
        let b = shelf(root, vec![]);
        let a1 = shelf(root, vec![a.id]);
        let a2 = shelf(root, vec![a.id, a1.id]);

        let plan = plan_sub_shelf_move(&a, &[a1.clone(), a2.clone()], root, Some(&b), 32).unwrap();
        assert_eq!(plan.new_path, vec![b.id]);
        assert_eq!(plan.new_prev_sub_shelf_id, Some(b.id));
        assert_eq!(
            plan.descendant_paths,
            vec![(a1.id, vec![b.id, a.id]), (a2.id, vec![b.id, a.id, a1.id])]
        );
        assert!(!plan.crosses_root_shelves());
    }

    #[test]
    fn same_parent_is_no_change() {
        let root = Uuid::new_v4();
        let p = shelf(root, vec![]);
        let s = shelf(root, vec![p.id]);
        let err = plan_sub_shelf_move(&s, &[], root, Some(&p), 32).unwrap_err();
        assert!(matches!(err, HubError::NoChanges(_)));

        let top = shelf(root, vec![]);
        let err = plan_sub_shelf_move(&top, &[], root, None, 32).unwrap_err();
        assert!(matches!(err, HubError::NoChanges(_)));
    }

    #[test]
    fn top_level_move_to_another_root_is_allowed() {
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        let s = shelf(r1, vec![]);
        let plan = plan_sub_shelf_move(&s, &[], r2, None, 32).unwrap();
        assert!(plan.crosses_root_shelves());
        assert!(plan.new_path.is_empty());
    }

    #[test]
    fn cannot_move_into_own_subtree() {
        let root = Uuid::new_v4();
        let a = shelf(root, vec![]);
        let child = shelf(root, vec![a.id]);
        let err = plan_sub_shelf_move(&a, &[child.clone()], root, Some(&child), 32).unwrap_err();
        assert!(matches!(err, HubError::InsertParentIntoItsChildren { .. }));
    }

    #[test]
    fn moving_into_itself_is_no_change_before_depth() {
        let root = Uuid::new_v4();
        let s = shelf(root, vec![]);
        let err = plan_sub_shelf_move(&s, &[], root, Some(&s), 32).unwrap_err();
        assert!(matches!(err, HubError::NoChanges(_)));

        let deep = shelf(root, vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()]);
        let err = plan_sub_shelf_move(&deep, &[], root, Some(&deep), 3).unwrap_err();
        assert!(matches!(err, HubError::NoChanges(_)));
    }

    #[test]
    fn depth_is_bounded() {
        let root = Uuid::new_v4();
        let deep = shelf(root, vec![Uuid::new_v4(), Uuid::new_v4()]);
        let source = shelf(root, vec![Uuid::new_v4()]);
        let err = plan_sub_shelf_move(&source, &[], root, Some(&deep), 3).unwrap_err();
        assert!(matches!(err, HubError::MaximumDepthExceeded { depth: 4, max: 3 }));

        let shallow = shelf(root, vec![]);
        let top = shelf(root, vec![]);
        let below = shelf(root, vec![top.id, Uuid::new_v4(), Uuid::new_v4()]);
        let err = plan_sub_shelf_move(&top, &[below], root, Some(&shallow), 3).unwrap_err();
        assert!(matches!(err, HubError::MaximumDepthExceeded { .. }));
    }

    #[test]
    fn block_group_relinking() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let moved = plan_block_group_move(&ids, ids[3], Some(ids[0])).unwrap();
        assert_eq!(moved, vec![ids[0], ids[3], ids[1], ids[2]]);
        let updates = chain_updates(&ids, &moved);
        assert_eq!(updates, vec![(ids[3], Some(ids[0])), (ids[1], Some(ids[3]))]);

        let to_head = plan_block_group_move(&ids, ids[2], None).unwrap();
        assert_eq!(to_head[0], ids[2]);

        assert!(matches!(
            plan_block_group_move(&ids, ids[2], Some(ids[1])),
            Err(HubError::NoChanges(_))
        ));
        assert!(matches!(
            plan_block_group_move(&ids, ids[0], None),
            Err(HubError::NoChanges(_))
        ));
    }
}
