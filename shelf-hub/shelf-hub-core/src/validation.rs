//! Shared field validators for names, urls and colors.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{HubError, Result};

static FORBIDDEN_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("static regex"));

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$")
        .expect("static regex")
});

const PALETTE: &[&str] = &[
    "default", "gray", "brown", "red", "orange", "yellow", "green", "blue", "purple", "pink",
];

fn validate_name(field: &str, name: &str, max: usize) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HubError::InvalidDto(format!("{field} must not be blank")));
    }
    if name.chars().count() > max {
        return Err(HubError::InvalidDto(format!(
            "{field} must be at most {max} characters"
        )));
    }
    if FORBIDDEN_NAME_CHARS.is_match(name) {
        return Err(HubError::InvalidDto(format!(
            "{field} contains a forbidden character"
        )));
    }
    Ok(())
}

/// Names of root shelves and sub-shelves.
pub fn validate_shelf_name(name: &str, max: usize) -> Result<()> {
    validate_name("shelf name", name, max)
}

/// Names of block packs and materials.
pub fn validate_item_name(name: &str, max: usize) -> Result<()> {
    validate_name("item name", name, max)
}

pub fn validate_url(field: &str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(HubError::InvalidDto(format!(
            "{field} must be at most {max} bytes"
        )));
    }
    Url::parse(value).map_err(|e| HubError::InvalidDto(format!("{field} is not a valid url: {e}")))?;
    Ok(())
}

pub fn validate_length(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(HubError::InvalidDto(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn is_hex_color(value: &str) -> bool {
    HEX_COLOR.is_match(value)
}

/// Colors in block props may also be palette names.
pub fn is_prop_color(value: &str) -> bool {
    PALETTE.contains(&value) || is_hex_color(value)
}
