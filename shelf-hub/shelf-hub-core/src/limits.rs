//! Process-wide limits. Values are fixed at start-up and shared read-only.

pub const MAX_SUB_SHELVES_OF_ROOT_SHELF: usize = 32;
pub const MAX_BATCH_CREATE_BLOCK_SIZE: usize = 128;
pub const MAX_BATCH_SIZE: usize = 128;
pub const MAX_WORKERS: usize = 8;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const MAX_SHELF_NAME_LENGTH: usize = 128;
pub const MAX_ITEM_NAME_LENGTH: usize = 128;
pub const MAX_FILE_BLOCK_NAME_LENGTH: usize = 255;
pub const MAX_FILE_BLOCK_CAPTION_LENGTH: usize = 1024;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 1024;
pub const MAX_USER_AGENT_LENGTH: usize = 512;
pub const MAX_HEADING_LEVEL: u8 = 6;
pub const MAX_BLOCK_DEPTH: usize = 64;
pub const MAX_STYLED_TEXT_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum depth of the sub-shelf tree under a root shelf.
    pub max_sub_shelves_of_root_shelf: usize,
    pub max_batch_create_block_size: usize,
    /// Upper bound on ids accepted by batch trash operations.
    pub max_batch_size: usize,
    pub max_workers: usize,
    pub default_search_limit: usize,
    pub max_search_limit: usize,
    pub max_shelf_name_length: usize,
    pub max_item_name_length: usize,
    pub max_file_block_name_length: usize,
    pub max_file_block_caption_length: usize,
    pub max_url_length: usize,
    pub min_password_length: usize,
    pub max_password_length: usize,
    pub max_user_agent_length: usize,
    pub max_heading_level: u8,
    pub max_block_depth: usize,
    pub max_styled_text_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sub_shelves_of_root_shelf: MAX_SUB_SHELVES_OF_ROOT_SHELF,
            max_batch_create_block_size: MAX_BATCH_CREATE_BLOCK_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            max_workers: MAX_WORKERS,
            default_search_limit: DEFAULT_SEARCH_LIMIT,
            max_search_limit: MAX_SEARCH_LIMIT,
            max_shelf_name_length: MAX_SHELF_NAME_LENGTH,
            max_item_name_length: MAX_ITEM_NAME_LENGTH,
            max_file_block_name_length: MAX_FILE_BLOCK_NAME_LENGTH,
            max_file_block_caption_length: MAX_FILE_BLOCK_CAPTION_LENGTH,
            max_url_length: MAX_URL_LENGTH,
            min_password_length: MIN_PASSWORD_LENGTH,
            max_password_length: MAX_PASSWORD_LENGTH,
            max_user_agent_length: MAX_USER_AGENT_LENGTH,
            max_heading_level: MAX_HEADING_LEVEL,
            max_block_depth: MAX_BLOCK_DEPTH,
            max_styled_text_length: MAX_STYLED_TEXT_LENGTH,
        }
    }
}

impl Limits {
    /// Clamp a requested page size into `1..=max_search_limit`.
    pub fn search_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_search_limit)
            .min(self.max_search_limit)
            .max(1)
    }
}
