use super::*;
use crate::access::Permission;
use crate::clock::{FixedClock, SystemClock};
use crate::error::ErrorKind;
use crate::search::SearchInput;
use crate::store::{MaterialType, NewBlockPack, NewMaterial, SubShelf};
use crate::tree::{ArborizedBlock, BlockTreeInput};
use chrono::{Duration, TimeZone};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn service() -> ShelfService {
    let db = Arc::new(Db::open_in_memory().unwrap());
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    ShelfService::new(
        db,
        Arc::new(Limits::default()),
        Arc::new(FixedClock::new(start, Duration::milliseconds(5))),
    )
}

async fn user(svc: &ShelfService, name: &str) -> RequestContext {
    let user = svc
        .create_user(&NewUser {
            name: name.into(),
            display_name: name.to_uppercase(),
            email: format!("{name}@example.com"),
            ..Default::default()
        })
        .await
        .unwrap();
    RequestContext::new(user.id)
}

fn paragraph(id: Uuid, children: Vec<ArborizedBlock>) -> ArborizedBlock {
    ArborizedBlock {
        id,
        kind: "paragraph".into(),
        props: json!({}),
        content: Some(json!([{"type": "text", "text": "body", "styles": {}}])),
        children,
    }
}

fn tree(children: usize) -> BlockTreeInput {
    let kids = (0..children)
        .map(|_| paragraph(Uuid::new_v4(), vec![]))
        .collect();
    BlockTreeInput::One(Box::new(paragraph(Uuid::new_v4(), kids)))
}

fn content(tree: BlockTreeInput) -> BlockGroupContentInput {
    BlockGroupContentInput {
        prev_block_group_id: None,
        arborized_editable_block: tree,
    }
}

async fn pack_under(svc: &ShelfService, ctx: &RequestContext, parent: Uuid) -> Uuid {
    svc.create_block_pack(
        ctx,
        &NewBlockPack {
            parent_sub_shelf_id: parent,
            name: "Lecture".into(),
            icon: None,
            header_background_url: None,
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn creating_shelves_persists_paths() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let s1 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "S1")
        .await
        .unwrap();
    assert!(s1.path.is_empty());

    let stored = svc.get_my_sub_shelf_by_id(&u1, s1.id).await.unwrap();
    assert!(stored.path.is_empty());
    assert_eq!(stored.root_shelf_id, root.id);
}

#[tokio::test]
async fn moving_a_child_to_the_top_clears_its_path() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let s1 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "S1")
        .await
        .unwrap();
    let s2 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, Some(s1.id), "S2")
        .await
        .unwrap();
    assert_eq!(s2.path, vec![s1.id]);

    svc.move_my_sub_shelf(
        &u1,
        &MoveSubShelfInput {
            source_root_shelf_id: root.id,
            source_sub_shelf_id: s2.id,
            destination_root_shelf_id: root.id,
            destination_sub_shelf_id: None,
        },
    )
    .await
    .unwrap();

    let moved = svc.get_my_sub_shelf_by_id(&u1, s2.id).await.unwrap();
    assert!(moved.path.is_empty());
    assert_eq!(moved.prev_sub_shelf_id, None);
}

#[tokio::test]
async fn moving_a_parent_into_its_child_changes_nothing() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let s1 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "S1")
        .await
        .unwrap();
    let s2 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, Some(s1.id), "S2")
        .await
        .unwrap();

    let err = svc
        .move_my_sub_shelf(
            &u1,
            &MoveSubShelfInput {
                source_root_shelf_id: root.id,
                source_sub_shelf_id: s1.id,
                destination_root_shelf_id: root.id,
                destination_sub_shelf_id: Some(s2.id),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsertParentIntoItsChildren);

    let s1_after = svc.get_my_sub_shelf_by_id(&u1, s1.id).await.unwrap();
    let s2_after = svc.get_my_sub_shelf_by_id(&u1, s2.id).await.unwrap();
    assert_eq!(s1_after, s1);
    assert_eq!(s2_after, s2);
}

#[tokio::test]
async fn moving_a_sub_shelf_into_itself_changes_nothing() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let parent = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "P")
        .await
        .unwrap();
    let s = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, Some(parent.id), "S")
        .await
        .unwrap();

    let err = svc
        .move_my_sub_shelf(
            &u1,
            &MoveSubShelfInput {
                source_root_shelf_id: root.id,
                source_sub_shelf_id: s.id,
                destination_root_shelf_id: root.id,
                destination_sub_shelf_id: Some(s.id),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoChanges);
    assert_eq!(svc.get_my_sub_shelf_by_id(&u1, s.id).await.unwrap(), s);
}

#[tokio::test]
async fn ingestion_commits_only_valid_trees() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let shelf = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "Course")
        .await
        .unwrap();
    let pack = pack_under(&svc, &u1, shelf.id).await;

    let two_roots = BlockTreeInput::Many(vec![
        paragraph(Uuid::new_v4(), vec![]),
        paragraph(Uuid::new_v4(), vec![]),
    ]);
    let report = svc
        .insert_block_groups_and_their_blocks_by_block_pack_id(
            &u1,
            pack,
            vec![content(tree(2)), content(two_roots), content(tree(1))],
        )
        .await
        .unwrap();
    assert!(!report.is_all_success);
    assert_eq!(report.failed_indexes, vec![1]);
    assert_eq!(report.success_indexes, vec![0, 2]);
    assert_eq!(report.success_block_group_and_block_ids.len(), 2);
    assert_eq!(report.success_block_group_and_block_ids[0].block_ids.len(), 3);
    assert_eq!(report.success_block_group_and_block_ids[1].block_ids.len(), 2);

    let listing = svc
        .get_my_block_pack_and_its_block_groups(&u1, pack)
        .await
        .unwrap();
    assert_eq!(listing.block_pack.block_count, 5);
    let group_ids: Vec<Uuid> = listing
        .block_groups
        .iter()
        .map(|g| g.block_group.id)
        .collect();
    let created: Vec<Uuid> = report
        .success_block_group_and_block_ids
        .iter()
        .map(|g| g.block_group_id)
        .collect();
    assert_eq!(group_ids, created);
    assert!(listing
        .block_groups
        .iter()
        .all(|g| g.arborized_editable_block.is_some() && g.block_group.mega_byte_size > 0.0));
}

#[tokio::test]
async fn ingestion_with_no_valid_tree_fails() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let shelf = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "Course")
        .await
        .unwrap();
    let pack = pack_under(&svc, &u1, shelf.id).await;

    let err = svc
        .insert_block_groups_and_their_blocks_by_block_pack_id(
            &u1,
            pack,
            vec![content(BlockTreeInput::Many(vec![]))],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedToCreate);

    let listing = svc
        .get_my_block_pack_and_its_block_groups(&u1, pack)
        .await
        .unwrap();
    assert!(listing.block_groups.is_empty());
}

#[tokio::test]
async fn restoring_a_root_leaves_deleted_children_hidden() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let s1 = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "S1")
        .await
        .unwrap();
    svc.delete_my_sub_shelf_by_id(&u1, s1.id).await.unwrap();
    svc.delete_my_root_shelf_by_id(&u1, root.id).await.unwrap();

    let found = svc
        .search_recent_root_shelves(&u1, &SearchInput::default())
        .await
        .unwrap();
    assert!(found.search_edges.iter().all(|e| e.node.id != root.id));
    assert_eq!(svc.list_my_trash(&u1).await.unwrap().root_shelves.len(), 1);

    svc.restore_my_root_shelf_by_id(&u1, root.id).await.unwrap();
    let restored = svc.get_my_root_shelf_by_id(&u1, root.id).await.unwrap();
    assert_eq!(restored.id, root.id);
    let children = svc
        .list_my_root_shelf_children(&u1, root.id, None)
        .await
        .unwrap();
    assert!(children.sub_shelves.is_empty());
    let err = svc.get_my_sub_shelf_by_id(&u1, s1.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityNotFound);
}

#[tokio::test]
async fn outsiders_are_denied() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let u2 = user(&svc, "u2").await;
    let root = svc.create_root_shelf(&u1, "Private").await.unwrap();

    let err = svc.get_my_root_shelf_by_id(&u2, root.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = svc
        .create_sub_shelf_by_root_shelf_id(&u2, root.id, None, "Intrusion")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let found = svc
        .search_recent_root_shelves(&u2, &SearchInput::default())
        .await
        .unwrap();
    assert_eq!(found.total_count, 0);
}

#[tokio::test]
async fn sharing_follows_the_permission_order() {
    let svc = service();
    let owner = user(&svc, "owner").await;
    let admin = user(&svc, "admin").await;
    let writer = user(&svc, "writer").await;
    let root = svc.create_root_shelf(&owner, "Team").await.unwrap();

    svc.share_my_root_shelf(
        &owner,
        root.id,
        &ShareInput {
            user_id: admin.user_id,
            permission: Permission::Admin,
        },
    )
    .await
    .unwrap();
    let member = svc
        .share_my_root_shelf(
            &admin,
            root.id,
            &ShareInput {
                user_id: writer.user_id,
                permission: Permission::Write,
            },
        )
        .await
        .unwrap();
    assert_eq!(member.permission, Permission::Write);
    assert_eq!(member.display_name, "WRITER");

    let err = svc
        .share_my_root_shelf(
            &admin,
            root.id,
            &ShareInput {
                user_id: writer.user_id,
                permission: Permission::Admin,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = svc
        .share_my_root_shelf(
            &owner,
            root.id,
            &ShareInput {
                user_id: writer.user_id,
                permission: Permission::Write,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoChanges);

    let err = svc
        .unshare_my_root_shelf(&admin, root.id, owner.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    svc.unshare_my_root_shelf(&writer, root.id, writer.user_id)
        .await
        .unwrap();
    let members = svc.list_my_root_shelf_members(&owner, root.id).await.unwrap();
    assert_eq!(members.len(), 2);
    let err = svc.get_my_root_shelf_by_id(&writer, root.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn batch_move_keeps_the_valid_sources() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let a = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "A")
        .await
        .unwrap();
    let b = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "B")
        .await
        .unwrap();
    let target = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "Target")
        .await
        .unwrap();

    let outcome = svc
        .move_my_sub_shelves(
            &u1,
            &MoveSubShelvesInput {
                source_sub_shelf_ids: vec![a.id, target.id, Uuid::new_v4(), b.id],
                destination_root_shelf_id: root.id,
                destination_sub_shelf_id: Some(target.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.moved_ids, vec![a.id, b.id]);

    let children = svc
        .list_my_root_shelf_children(&u1, root.id, Some(target.id))
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = children.sub_shelves.iter().map(|s: &SubShelf| s.id).collect();
    ids.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn materials_move_across_root_shelves() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let first = svc.create_root_shelf(&u1, "First").await.unwrap();
    let second = svc.create_root_shelf(&u1, "Second").await.unwrap();
    let from = svc
        .create_sub_shelf_by_root_shelf_id(&u1, first.id, None, "From")
        .await
        .unwrap();
    let to = svc
        .create_sub_shelf_by_root_shelf_id(&u1, second.id, None, "To")
        .await
        .unwrap();
    let material = svc
        .create_material(
            &u1,
            &NewMaterial {
                parent_sub_shelf_id: from.id,
                name: "Syllabus".into(),
                kind: MaterialType::Textbook,
                content_url: "https://files.example.com/syllabus.pdf".into(),
                content_type: "application/pdf".into(),
            },
        )
        .await
        .unwrap();

    let outcome = svc
        .move_my_materials(
            &u1,
            &MoveItemsInput {
                ids: vec![material.id, Uuid::new_v4()],
                destination_sub_shelf_id: to.id,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.moved_ids, vec![material.id]);

    let moved = svc.get_my_material_by_id(&u1, material.id).await.unwrap();
    assert_eq!(moved.root_shelf_id, second.id);
    assert_eq!(moved.parent_sub_shelf_id, to.id);
    let first = svc.get_my_root_shelf_by_id(&u1, first.id).await.unwrap();
    let second = svc.get_my_root_shelf_by_id(&u1, second.id).await.unwrap();
    assert_eq!(first.total_materials, 0);
    assert_eq!(second.total_materials, 1);
}

#[tokio::test]
async fn syncing_a_group_reports_each_change() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let root = svc.create_root_shelf(&u1, "Notes").await.unwrap();
    let shelf = svc
        .create_sub_shelf_by_root_shelf_id(&u1, root.id, None, "Course")
        .await
        .unwrap();
    let pack = pack_under(&svc, &u1, shelf.id).await;
    let (r, x) = (Uuid::new_v4(), Uuid::new_v4());
    let original = BlockTreeInput::One(Box::new(paragraph(r, vec![paragraph(x, vec![])])));
    let report = svc
        .insert_block_groups_and_their_blocks_by_block_pack_id(&u1, pack, vec![content(original.clone())])
        .await
        .unwrap();
    let group = report.success_block_group_and_block_ids[0].block_group_id;

    let err = svc
        .sync_my_block_group_by_id(&u1, group, original)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoChanges);

    let y = Uuid::new_v4();
    let edited = BlockTreeInput::One(Box::new(paragraph(r, vec![paragraph(y, vec![])])));
    let sync = svc.sync_my_block_group_by_id(&u1, group, edited).await.unwrap();
    assert_eq!(sync.inserted_ids, vec![y]);
    assert_eq!(sync.deleted_ids, vec![x]);

    let fetched = svc
        .get_my_block_group_and_its_blocks_by_id(&u1, group)
        .await
        .unwrap();
    let root_block = fetched.arborized_editable_block.unwrap();
    assert_eq!(root_block.id, r);
    assert_eq!(root_block.children.len(), 1);
    assert_eq!(root_block.children[0].id, y);
}

#[tokio::test]
async fn cancelled_requests_write_nothing() {
    let svc = ShelfService::new(
        Arc::new(Db::open_in_memory().unwrap()),
        Arc::new(Limits::default()),
        Arc::new(SystemClock),
    );
    let u1 = user(&svc, "u1").await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = RequestContext::with_cancel(u1.user_id, cancel);

    let err = svc.create_root_shelf(&cancelled, "Never").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let found = svc
        .search_recent_root_shelves(&u1, &SearchInput::default())
        .await
        .unwrap();
    assert_eq!(found.total_count, 0);
}

#[tokio::test]
async fn batch_bounds_are_enforced() {
    let svc = service();
    let u1 = user(&svc, "u1").await;
    let err = svc
        .move_my_materials(
            &u1,
            &MoveItemsInput {
                ids: vec![],
                destination_sub_shelf_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);

    let too_many: Vec<Uuid> = (0..=svc.limits().max_batch_size).map(|_| Uuid::new_v4()).collect();
    let err = svc.delete_my_sub_shelves_by_ids(&u1, &too_many).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_the_on_disk_pool() {
    let dir = tempfile::tempdir().unwrap();
    let svc = ShelfService::new(
        Arc::new(Db::open(&dir.path().join("shelves.db")).unwrap()),
        Arc::new(Limits::default()),
        Arc::new(SystemClock),
    );
    let owner = user(&svc, "owner").await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let svc = svc.clone();
            let ctx = owner.clone();
            tokio::spawn(async move {
                svc.create_root_shelf(&ctx, &format!("Shelf {i}")).await.unwrap();
                svc.search_recent_root_shelves(&ctx, &SearchInput::default())
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let all = svc
        .search_recent_root_shelves(
            &owner,
            &SearchInput {
                first: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(all.total_count, 16);
}

#[tokio::test]
async fn on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelves.db");
    let limits = Arc::new(Limits::default());
    let (owner, root_id) = {
        let svc = ShelfService::new(
            Arc::new(Db::open(&path).unwrap()),
            Arc::clone(&limits),
            Arc::new(SystemClock),
        );
        let owner = user(&svc, "owner").await;
        let root = svc.create_root_shelf(&owner, "Kept").await.unwrap();
        (owner, root.id)
    };

    let svc = ShelfService::new(Arc::new(Db::open(&path).unwrap()), limits, Arc::new(SystemClock));
    let root = svc.get_my_root_shelf_by_id(&owner, root_id).await.unwrap();
    assert_eq!(root.name, "Kept");
    assert_eq!(svc.get_me(&owner).await.unwrap().name, "owner");
}
