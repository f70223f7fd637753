use super::*;
use crate::error::ErrorKind;
use serde_json::json;

fn limits() -> Limits {
    Limits::default()
}

#[test]
fn unknown_block_type_is_reported() {
    let err = EditorBlock::decode("kanban", &json!({}), None, &limits()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BlockKindUnknown);
}

#[test]
fn null_props_are_rejected_and_empty_props_stay_empty() {
    let err = EditorBlock::decode("paragraph", &json!(null), None, &limits()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);

    let block = EditorBlock::decode("paragraph", &json!({}), None, &limits()).unwrap();
    assert_eq!(block.props_value().unwrap(), json!({}));
}

#[test]
fn every_type_round_trips_its_name() {
    for kind in BlockType::ALL {
        assert_eq!(kind.as_str().parse::<BlockType>().unwrap(), kind);
        assert_eq!(
            serde_json::to_value(kind).unwrap(),
            json!(kind.as_str())
        );
    }
}

#[test]
fn heading_props_are_decoded_and_bounded() {
    let block = EditorBlock::decode(
        "heading",
        &json!({"level": 2, "textColor": "red", "textAlignment": "center"}),
        Some(&json!([{"type": "text", "text": "Title", "styles": {"bold": true}}])),
        &limits(),
    )
    .unwrap();
    match &block.props {
        BlockProps::Heading(p) => assert_eq!(p.level, Some(2)),
        other => panic!("unexpected props {other:?}"),
    }

    let err = EditorBlock::decode("heading", &json!({"level": 9}), None, &limits()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);
}

#[test]
fn unknown_prop_keys_are_rejected() {
    let err = EditorBlock::decode("paragraph", &json!({"fontSize": 12}), None, &limits())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDto);
}

#[test]
fn content_must_match_the_type() {
    let table = json!({"type": "tableContent", "rows": [{"cells": [[{"type": "text", "text": "a"}]]}]});
    assert!(EditorBlock::decode("table", &json!({}), Some(&table), &limits()).is_ok());
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&table), &limits()).is_err());
    assert!(EditorBlock::decode("table", &json!({}), None, &limits()).is_err());
    assert!(EditorBlock::decode(
        "image",
        &json!({"url": "https://example.com/cat.png"}),
        Some(&json!([])),
        &limits()
    )
    .is_err());
    assert!(EditorBlock::decode(
        "image",
        &json!({"url": "https://example.com/cat.png", "previewWidth": 512}),
        None,
        &limits()
    )
    .is_ok());
}

#[test]
fn detection_uses_the_first_byte() {
    assert!(BlockContent::decode_str("").unwrap().is_none());
    assert!(BlockContent::decode_str("  null ").unwrap().is_none());
    assert!(matches!(
        BlockContent::decode_str("  [ ]").unwrap(),
        Some(BlockContent::Inline(items)) if items.is_empty()
    ));
    assert!(matches!(
        BlockContent::decode_str(r#"{"type":"tableContent","rows":[]}"#).unwrap(),
        Some(BlockContent::Table(_))
    ));
    assert!(BlockContent::decode_str("42").is_err());
}

#[test]
fn style_colors_must_be_hex() {
    let ok = json!([{"type": "text", "text": "x", "styles": {"textColor": "#ff0000"}}]);
    let bad = json!([{"type": "text", "text": "x", "styles": {"textColor": "red"}}]);
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&ok), &limits()).is_ok());
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&bad), &limits()).is_err());
}

#[test]
fn links_need_valid_hrefs_and_do_not_nest() {
    let ok = json!([{"type": "link", "href": "https://example.com", "content": [{"type": "text", "text": "site"}]}]);
    let bad_href = json!([{"type": "link", "href": "nope", "content": []}]);
    let nested = json!([{"type": "link", "href": "https://a.io", "content": [
        {"type": "link", "href": "https://b.io", "content": []}
    ]}]);
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&ok), &limits()).is_ok());
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&bad_href), &limits()).is_err());
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&nested), &limits()).is_err());
}

#[test]
fn long_styled_text_is_rejected() {
    let text = "a".repeat(limits().max_styled_text_length + 1);
    let content = json!([{"type": "text", "text": text}]);
    assert!(EditorBlock::decode("paragraph", &json!({}), Some(&content), &limits()).is_err());
}

#[test]
fn encoding_preserves_the_decoded_json() {
    let props = json!({"backgroundColor": "default", "showPreview": true, "previewWidth": 512, "url": "https://example.com/v.mp4"});
    let block = EditorBlock::decode("video", &props, None, &limits()).unwrap();
    assert_eq!(block.props_value().unwrap(), props);
    assert!(block.content_value().unwrap().is_none());

    let content = json!([
        {"type": "text", "text": "hello ", "styles": {}},
        {"type": "link", "href": "https://example.com/", "content": [{"type": "text", "text": "world", "styles": {"italic": true}}]}
    ]);
    let block = EditorBlock::decode("paragraph", &json!({}), Some(&content), &limits()).unwrap();
    assert_eq!(block.content_value().unwrap(), Some(content.clone()));

    let stored = EditorBlock::decode_stored(
        "paragraph",
        "{}",
        Some(&serde_json::to_string(&content).unwrap()),
        &limits(),
    )
    .unwrap();
    assert_eq!(stored, block);
}
