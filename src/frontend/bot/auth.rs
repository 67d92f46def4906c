//! Chat-id allow-list for the bot.

use std::collections::HashSet;

use tracing::warn;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

/// Only listed chats may trigger anything. An empty list denies everyone;
/// new chat ids are never added at runtime.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    allowed: HashSet<i64>,
}

impl AuthorizationGate {
    pub fn new(allowed: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn check(&self, chat_id: i64) -> Access {
        if self.allowed.contains(&chat_id) {
            return Access::Allowed;
        }

        if self.allowed.is_empty() {
            warn!(
                chat_id,
                "Unauthorized access attempt; no chats are allowed. \
                 Add {} to telegram.allowed_chat_ids to grant access",
                chat_id
            );
        } else {
            warn!(
                chat_id,
                "Unauthorized access attempt. Add {} to telegram.allowed_chat_ids to grant access",
                chat_id
            );
        }
        Access::Denied
    }

    pub fn authorize(&self, chat_id: i64) -> Result<(), EngineError> {
        match self.check(chat_id) {
            Access::Allowed => Ok(()),
            Access::Denied => Err(EngineError::Unauthorized(chat_id)),
        }
    }
}
