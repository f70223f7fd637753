use super::*;
use crate::error::ErrorKind;
use proptest::prelude::*;
use serde_json::json;

fn paragraph(id: Uuid, text: &str, children: Vec<ArborizedBlock>) -> ArborizedBlock {
    ArborizedBlock {
        id,
        kind: "paragraph".into(),
        props: json!({}),
        content: Some(json!([{"type": "text", "text": text, "styles": {}}])),
        children,
    }
}

fn flatten(roots: &[ArborizedBlock]) -> Result<Vec<FlattenedBlock>> {
    flatten_to_raw(roots, &Limits::default(), &CancellationToken::new())
}

#[test]
fn flatten_emits_pre_order_with_parent_links() {
    let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let tree = paragraph(
        a,
        "a",
        vec![paragraph(b, "b", vec![paragraph(c, "c", vec![])]), paragraph(d, "d", vec![])],
    );
    let flat = flatten(&[tree]).unwrap();
    let ids: Vec<_> = flat.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![a, b, c, d]);
    let parents: Vec<_> = flat.iter().map(|r| r.parent_block_id).collect();
    assert_eq!(parents, vec![None, Some(a), Some(b), Some(a)]);
}

#[test]
fn flatten_rejects_duplicates_and_multiple_roots() {
    let a = Uuid::new_v4();
    let tree = paragraph(a, "a", vec![paragraph(a, "again", vec![])]);
    assert_eq!(flatten(&[tree]).unwrap_err().kind(), ErrorKind::DuplicateBlockId);

    let two = vec![
        paragraph(Uuid::new_v4(), "x", vec![]),
        paragraph(Uuid::new_v4(), "y", vec![]),
    ];
    assert_eq!(
        flatten(&two).unwrap_err().kind(),
        ErrorKind::RepeatedRootBlockInBlockGroup
    );
    assert_eq!(flatten(&[]).unwrap_err().kind(), ErrorKind::InvalidBlockTree);
}

#[test]
fn flatten_bounds_depth() {
    let limits = Limits {
        max_block_depth: 3,
        ..Limits::default()
    };
    let mut node = paragraph(Uuid::new_v4(), "leaf", vec![]);
    for _ in 0..3 {
        node = paragraph(Uuid::new_v4(), "n", vec![node]);
    }
    let err = flatten_to_raw(&[node], &limits, &CancellationToken::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBlockTree);
}

#[test]
fn flatten_stops_when_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let tree = paragraph(Uuid::new_v4(), "a", vec![]);
    let err = flatten_to_raw(&[tree], &Limits::default(), &cancel).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn flatten_reports_codec_failures() {
    let mut tree = paragraph(Uuid::new_v4(), "a", vec![]);
    tree.kind = "mermaid".into();
    assert_eq!(flatten(&[tree]).unwrap_err().kind(), ErrorKind::BlockKindUnknown);
}

#[test]
fn arborize_detects_orphans_and_repeated_roots() {
    let (a, b, ghost) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut flat = flatten(&[paragraph(a, "a", vec![paragraph(b, "b", vec![])])]).unwrap();
    let mut orphan = flat[1].clone();
    orphan.id = Uuid::new_v4();
    orphan.parent_block_id = Some(ghost);
    flat.push(orphan.clone());
    match arborize_group(flat.clone()) {
        Err(HubError::OrphanBlock(id)) => assert_eq!(id, orphan.id),
        other => panic!("expected orphan, got {other:?}"),
    }

    let mut second_root = flat[0].clone();
    second_root.id = Uuid::new_v4();
    let records = vec![flat[0].clone(), second_root];
    assert_eq!(
        arborize_group(records).unwrap_err().kind(),
        ErrorKind::RepeatedRootBlockInBlockGroup
    );
    assert_eq!(arborize_group(vec![]).unwrap_err().kind(), ErrorKind::InvalidBlockTree);
}

#[test]
fn tree_input_accepts_one_or_many() {
    let one: BlockTreeInput = serde_json::from_value(json!({
        "id": Uuid::new_v4(), "type": "paragraph", "props": {}, "content": [], "children": []
    }))
    .unwrap();
    assert_eq!(one.into_roots().len(), 1);
    let many: BlockTreeInput = serde_json::from_value(json!([
        {"id": Uuid::new_v4(), "type": "paragraph", "props": {}, "content": [], "children": []},
        {"id": Uuid::new_v4(), "type": "quote", "props": {}, "content": [], "children": []}
    ]))
    .unwrap();
    assert_eq!(many.into_roots().len(), 2);
}

#[test]
fn omitted_props_default_to_an_empty_object() {
    let block: ArborizedBlock = serde_json::from_value(json!({
        "id": Uuid::new_v4(), "type": "paragraph", "children": []
    }))
    .unwrap();
    assert_eq!(block.props, json!({}));

    let explicit_null: ArborizedBlock = serde_json::from_value(json!({
        "id": Uuid::new_v4(), "type": "paragraph", "props": null, "children": []
    }))
    .unwrap();
    let err = flatten(&[explicit_null]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);
}

/// Builds a random tree where node `i` hangs below node `parents[i] % i`.
fn build_tree(parents: &[usize], texts: &[String]) -> ArborizedBlock {
    let ids: Vec<Uuid> = (0..texts.len()).map(|_| Uuid::new_v4()).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); texts.len()];
    for i in 1..texts.len() {
        children[parents[i - 1] % i].push(i);
    }
    fn make(i: usize, ids: &[Uuid], texts: &[String], children: &[Vec<usize>]) -> ArborizedBlock {
        let kids = children[i]
            .iter()
            .map(|&c| make(c, ids, texts, children))
            .collect();
        let kind = if i % 3 == 1 { "bulletListItem" } else { "paragraph" };
        ArborizedBlock {
            id: ids[i],
            kind: kind.into(),
            props: json!({"textAlignment": "left"}),
            content: Some(json!([{"type": "text", "text": texts[i], "styles": {"bold": true}}])),
            children: kids,
        }
    }
    make(0, &ids, texts, &children)
}

proptest! {
    #[test]
    fn arborize_after_flatten_is_identity(
        texts in prop::collection::vec("[a-z ]{0,12}", 1..40),
        parents in prop::collection::vec(any::<usize>(), 40),
    ) {
        let tree = build_tree(&parents, &texts);
        let flat = flatten(std::slice::from_ref(&tree)).unwrap();
        prop_assert_eq!(flat.len(), texts.len());
        let rebuilt = arborize_group(flat).unwrap();
        prop_assert_eq!(rebuilt, tree);
    }

    #[test]
    fn flatten_after_arborize_is_identity(
        texts in prop::collection::vec("[a-z]{0,8}", 1..30),
        parents in prop::collection::vec(any::<usize>(), 30),
    ) {
        let tree = build_tree(&parents, &texts);
        let flat = flatten(&[tree]).unwrap();
        let again = flatten(&[arborize_group(flat.clone()).unwrap()]).unwrap();
        prop_assert_eq!(again, flat);
    }
}
