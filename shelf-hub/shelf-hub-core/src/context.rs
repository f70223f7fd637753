use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{HubError, Result};

/// Identity and cancellation for one public operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(user_id: Uuid, cancel: CancellationToken) -> Self {
        Self { user_id, cancel }
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }
        Ok(())
    }
}
