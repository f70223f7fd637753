//! Block schema and codec: the closed set of block types, their props
//! schemas and content variants, and conversion to and from JSON.

pub mod content;
pub mod props;
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub use content::{BlockContent, ContentKind, InlineContent, Link, StyledText, Styles, TableContent};
pub use props::BlockProps;

use crate::error::{HubError, Result};
use crate::limits::Limits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "heading")]
    Heading,
    #[serde(rename = "quote")]
    Quote,
    #[serde(rename = "bulletListItem")]
    BulletListItem,
    #[serde(rename = "numberedListItem")]
    NumberedListItem,
    #[serde(rename = "checkListItem")]
    CheckListItem,
    #[serde(rename = "toggleListItemBlock")]
    ToggleListItem,
    #[serde(rename = "table")]
    Table,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "codeBlock")]
    CodeBlock,
}

impl BlockType {
    pub const ALL: [BlockType; 13] = [
        BlockType::Paragraph,
        BlockType::Heading,
        BlockType::Quote,
        BlockType::BulletListItem,
        BlockType::NumberedListItem,
        BlockType::CheckListItem,
        BlockType::ToggleListItem,
        BlockType::Table,
        BlockType::File,
        BlockType::Image,
        BlockType::Video,
        BlockType::Audio,
        BlockType::CodeBlock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::Quote => "quote",
            BlockType::BulletListItem => "bulletListItem",
            BlockType::NumberedListItem => "numberedListItem",
            BlockType::CheckListItem => "checkListItem",
            BlockType::ToggleListItem => "toggleListItemBlock",
            BlockType::Table => "table",
            BlockType::File => "file",
            BlockType::Image => "image",
            BlockType::Video => "video",
            BlockType::Audio => "audio",
            BlockType::CodeBlock => "codeBlock",
        }
    }

    /// Which content variant a block of this type may carry.
    pub fn content_kind(self) -> ContentKind {
        match self {
            BlockType::Table => ContentKind::Table,
            BlockType::File | BlockType::Image | BlockType::Video | BlockType::Audio => {
                ContentKind::None
            }
            _ => ContentKind::Inline,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        BlockType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HubError::BlockKindUnknown(s.to_string()))
    }
}

/// A validated block without its position in a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorBlock {
    pub kind: BlockType,
    pub props: BlockProps,
    pub content: Option<BlockContent>,
}

impl EditorBlock {
    /// Decode a block from client JSON values.
    pub fn decode(
        type_name: &str,
        props: &Value,
        content: Option<&Value>,
        limits: &Limits,
    ) -> Result<Self> {
        let kind = BlockType::from_str(type_name)?;
        let props = BlockProps::decode(kind, props, limits)?;
        let content = match content {
            Some(value) => BlockContent::decode_value(value)?,
            None => None,
        };
        Self::checked(kind, props, content, limits)
    }

    /// Decode a block from the JSON text columns it is stored in.
    pub fn decode_stored(
        type_name: &str,
        props: &str,
        content: Option<&str>,
        limits: &Limits,
    ) -> Result<Self> {
        let kind = BlockType::from_str(type_name)?;
        let props: Value = serde_json::from_str(props)?;
        let props = BlockProps::decode(kind, &props, limits)?;
        let content = match content {
            Some(raw) => BlockContent::decode_str(raw)?,
            None => None,
        };
        Self::checked(kind, props, content, limits)
    }

    fn checked(
        kind: BlockType,
        props: BlockProps,
        content: Option<BlockContent>,
        limits: &Limits,
    ) -> Result<Self> {
        match (kind.content_kind(), content.as_ref().map(BlockContent::kind)) {
            (_, None) if kind.content_kind() != ContentKind::Table => {}
            (ContentKind::Inline, Some(ContentKind::Inline)) => {}
            (ContentKind::Table, Some(ContentKind::Table)) => {}
            (expected, found) => {
                return Err(HubError::InvalidDto(format!(
                    "{kind} blocks take {expected:?} content, got {found:?}"
                )))
            }
        }
        if let Some(content) = &content {
            content.validate(limits)?;
        }
        Ok(Self {
            kind,
            props,
            content,
        })
    }

    pub fn props_value(&self) -> Result<Value> {
        self.props.to_value()
    }

    pub fn content_value(&self) -> Result<Option<Value>> {
        self.content.as_ref().map(BlockContent::to_value).transpose()
    }

    /// Size of the encoded props and content in bytes.
    pub fn encoded_len(&self) -> Result<usize> {
        let props = serde_json::to_vec(&self.props)?.len();
        let content = match &self.content {
            Some(content) => serde_json::to_vec(content)?.len(),
            None => 0,
        };
        Ok(props + content)
    }
}
