//! One-shot user-facing messages carried across redirects.

use tower_sessions::Session;

use crate::models::{FlashLevel, FlashMessage, session_keys};

/// Queue a message for the next page.
///
/// # Errors
///
/// Returns error if the session store fails.
pub async fn push(
    session: &Session,
    level: FlashLevel,
    text: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    let mut queue: Vec<FlashMessage> = session.get(session_keys::FLASH).await?.unwrap_or_default();
    queue.push(FlashMessage {
        level,
        text: text.into(),
    });
    session.insert(session_keys::FLASH, queue).await
}

/// Drain every queued message.
///
/// An unreadable queue is dropped rather than reported.
///
/// # Errors
///
/// Returns error if the session store fails.
pub async fn take(session: &Session) -> Result<Vec<FlashMessage>, tower_sessions::session::Error> {
    let Some(value) = session.remove_value(session_keys::FLASH).await? else {
        return Ok(Vec::new());
    };
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Discarding unreadable flash messages");
        Vec::new()
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_messages_are_shown_once_in_order() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        push(&session, FlashLevel::Error, "first").await.unwrap();
        push(&session, FlashLevel::Success, "second").await.unwrap();

        let messages = take(&session).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].level, FlashLevel::Success);

        assert!(take(&session).await.unwrap().is_empty());
    }
}
