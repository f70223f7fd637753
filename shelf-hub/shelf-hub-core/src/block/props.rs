//! Per-type props schemas. Every key is optional and unknown keys are rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::BlockType;
use crate::error::{HubError, Result};
use crate::limits::Limits;
use crate::validation::{is_prop_color, validate_length, validate_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TextProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HeadingProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_toggleable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuoteProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NumberedListItemProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckListItemProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Shared by image and video blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_preview: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_width: Option<Number>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_preview: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CodeBlockProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Typed props; the variant always agrees with the block's [`BlockType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockProps {
    Paragraph(TextProps),
    Heading(HeadingProps),
    Quote(QuoteProps),
    BulletListItem(TextProps),
    NumberedListItem(NumberedListItemProps),
    CheckListItem(CheckListItemProps),
    ToggleListItem(TextProps),
    Table(TableProps),
    File(FileProps),
    Image(MediaProps),
    Video(MediaProps),
    Audio(AudioProps),
    CodeBlock(CodeBlockProps),
}

fn parse<T: DeserializeOwned>(kind: BlockType, value: &Value) -> Result<T> {
    match value {
        Value::Object(_) => T::deserialize(value)
            .map_err(|e| HubError::InvalidDto(format!("invalid props for {kind}: {e}"))),
        _ => Err(HubError::InvalidDto(format!(
            "props for {kind} must be an object"
        ))),
    }
}

fn check_color(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(color) if !is_prop_color(color) => Err(HubError::InvalidDto(format!(
            "{field} {color:?} is not a known color"
        ))),
        _ => Ok(()),
    }
}

fn check_colors(background: &Option<String>, text: &Option<String>) -> Result<()> {
    check_color("backgroundColor", background)?;
    check_color("textColor", text)
}

fn check_file_fields(
    name: &Option<String>,
    url: &Option<String>,
    caption: &Option<String>,
    limits: &Limits,
) -> Result<()> {
    if let Some(name) = name {
        validate_length("name", name, limits.max_file_block_name_length)?;
    }
    if let Some(url) = url {
        // editors emit an empty url before upload
        if !url.is_empty() {
            validate_url("url", url, limits.max_url_length)?;
        }
    }
    if let Some(caption) = caption {
        validate_length("caption", caption, limits.max_file_block_caption_length)?;
    }
    Ok(())
}

impl BlockProps {
    /// Decode and validate `value` against the schema registered for `kind`.
    pub fn decode(kind: BlockType, value: &Value, limits: &Limits) -> Result<Self> {
        let props = match kind {
            BlockType::Paragraph => BlockProps::Paragraph(parse(kind, value)?),
            BlockType::Heading => BlockProps::Heading(parse(kind, value)?),
            BlockType::Quote => BlockProps::Quote(parse(kind, value)?),
            BlockType::BulletListItem => BlockProps::BulletListItem(parse(kind, value)?),
            BlockType::NumberedListItem => BlockProps::NumberedListItem(parse(kind, value)?),
            BlockType::CheckListItem => BlockProps::CheckListItem(parse(kind, value)?),
            BlockType::ToggleListItem => BlockProps::ToggleListItem(parse(kind, value)?),
            BlockType::Table => BlockProps::Table(parse(kind, value)?),
            BlockType::File => BlockProps::File(parse(kind, value)?),
            BlockType::Image => BlockProps::Image(parse(kind, value)?),
            BlockType::Video => BlockProps::Video(parse(kind, value)?),
            BlockType::Audio => BlockProps::Audio(parse(kind, value)?),
            BlockType::CodeBlock => BlockProps::CodeBlock(parse(kind, value)?),
        };
        props.validate(limits)?;
        Ok(props)
    }

    fn validate(&self, limits: &Limits) -> Result<()> {
        match self {
            BlockProps::Paragraph(p) | BlockProps::BulletListItem(p) | BlockProps::ToggleListItem(p) => {
                check_colors(&p.background_color, &p.text_color)
            }
            BlockProps::Heading(p) => {
                check_colors(&p.background_color, &p.text_color)?;
                match p.level {
                    Some(level) if level == 0 || level > limits.max_heading_level => {
                        Err(HubError::InvalidDto(format!(
                            "heading level must be between 1 and {}",
                            limits.max_heading_level
                        )))
                    }
                    _ => Ok(()),
                }
            }
            BlockProps::Quote(p) => check_colors(&p.background_color, &p.text_color),
            BlockProps::NumberedListItem(p) => {
                check_colors(&p.background_color, &p.text_color)?;
                if p.start == Some(0) {
                    return Err(HubError::InvalidDto("start must be at least 1".into()));
                }
                Ok(())
            }
            BlockProps::CheckListItem(p) => check_colors(&p.background_color, &p.text_color),
            BlockProps::Table(p) => check_color("textColor", &p.text_color),
            BlockProps::File(p) => {
                check_color("backgroundColor", &p.background_color)?;
                check_file_fields(&p.name, &p.url, &p.caption, limits)
            }
            BlockProps::Image(p) | BlockProps::Video(p) => {
                check_color("backgroundColor", &p.background_color)?;
                check_file_fields(&p.name, &p.url, &p.caption, limits)
            }
            BlockProps::Audio(p) => {
                check_color("backgroundColor", &p.background_color)?;
                check_file_fields(&p.name, &p.url, &p.caption, limits)
            }
            BlockProps::CodeBlock(_) => Ok(()),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
