use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{HubError, Result};
use crate::limits::Limits;
use crate::validation::{is_hex_color, validate_url};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Styles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyledText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Styles>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    pub href: String,
    /// Text runs only; links do not nest.
    pub content: Vec<InlineContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InlineContent {
    Text(StyledText),
    Link(Link),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableContentTag {
    #[serde(rename = "tableContent")]
    TableContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRow {
    pub cells: Vec<Vec<InlineContent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableContent {
    #[serde(rename = "type")]
    pub tag: TableContentTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_widths: Option<Vec<Option<Number>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_cols: Option<u32>,
    pub rows: Vec<TableRow>,
}

/// Block content. Absent content is represented by `Option::None` at the block level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockContent {
    Inline(Vec<InlineContent>),
    Table(TableContent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Inline,
    Table,
    None,
}

impl BlockContent {
    /// Decode stored JSON text, picking the variant from the first non-whitespace byte.
    pub fn decode_str(raw: &str) -> Result<Option<Self>> {
        let trimmed = raw.trim_start();
        match trimmed.as_bytes().first() {
            None => Ok(None),
            Some(b'[') => serde_json::from_str::<Vec<InlineContent>>(trimmed)
                .map(|c| Some(BlockContent::Inline(c)))
                .map_err(|e| HubError::InvalidDto(format!("invalid inline content: {e}"))),
            Some(b'{') => serde_json::from_str::<TableContent>(trimmed)
                .map(|c| Some(BlockContent::Table(c)))
                .map_err(|e| HubError::InvalidDto(format!("invalid table content: {e}"))),
            Some(b'n') if trimmed.trim_end() == "null" => Ok(None),
            Some(_) => Err(HubError::InvalidDto(
                "content must be an array, an object or null".into(),
            )),
        }
    }

    pub fn decode_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Array(_) => Vec::<InlineContent>::deserialize(value)
                .map(|c| Some(BlockContent::Inline(c)))
                .map_err(|e| HubError::InvalidDto(format!("invalid inline content: {e}"))),
            Value::Object(_) => TableContent::deserialize(value)
                .map(|c| Some(BlockContent::Table(c)))
                .map_err(|e| HubError::InvalidDto(format!("invalid table content: {e}"))),
            _ => Err(HubError::InvalidDto(
                "content must be an array, an object or null".into(),
            )),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            BlockContent::Inline(_) => ContentKind::Inline,
            BlockContent::Table(_) => ContentKind::Table,
        }
    }

    pub fn validate(&self, limits: &Limits) -> Result<()> {
        match self {
            BlockContent::Inline(items) => validate_inline(items, limits, true),
            BlockContent::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        validate_inline(cell, limits, true)?;
                    }
                }
                Ok(())
            }
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn validate_inline(items: &[InlineContent], limits: &Limits, allow_links: bool) -> Result<()> {
    for item in items {
        match item {
            InlineContent::Text(text) => validate_text(text, limits)?,
            InlineContent::Link(link) => {
                if !allow_links {
                    return Err(HubError::InvalidDto("links cannot be nested".into()));
                }
                validate_url("href", &link.href, limits.max_url_length)?;
                validate_inline(&link.content, limits, false)?;
            }
        }
    }
    Ok(())
}

fn validate_text(text: &StyledText, limits: &Limits) -> Result<()> {
    if text.text.chars().count() > limits.max_styled_text_length {
        return Err(HubError::InvalidDto(format!(
            "styled text must be at most {} characters",
            limits.max_styled_text_length
        )));
    }
    if let Some(styles) = &text.styles {
        for color in [&styles.text_color, &styles.background_color].into_iter().flatten() {
            if !is_hex_color(color) {
                return Err(HubError::InvalidDto(format!(
                    "style color {color:?} is not a hex color"
                )));
            }
        }
    }
    Ok(())
}
