//! The messaging-platform client interface (external collaborator). As with
//! [`crate::source_client`], only the contract the
//! delivery worker (C5) depends on is defined here.

use async_trait::async_trait;

use crate::error::Result;

/// A sent message, identified so later messages can reply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub id: i64,
}

/// How an album item's bytes are obtained: a bare URL the messaging
/// platform fetches itself, or bytes the worker already downloaded (audio,
/// and short source-hosted video).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Url(String),
    Bytes(Vec<u8>),
}

/// The messaging platform's own attachment grouping: albums may only mix
/// items of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaGroupKind {
    PhotoVideo,
    Audio,
    Document,
}

/// One item in an album send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub kind: MediaGroupKind,
    pub source: MediaSource,
    pub caption: Option<String>,
    pub title: Option<String>,
    pub performer: Option<String>,
}

/// The contract the delivery worker (C5) depends on.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Sends `html` as a plain text message, optionally as a reply.
    async fn send_text(
        &self,
        chat: i64,
        html: &str,
        reply_to: Option<i64>,
    ) -> Result<SentMessage>;

    /// Sends a same-kind group of media as one album, with an optional
    /// caption on the first item.
    async fn send_album(
        &self,
        chat: i64,
        items: &[AlbumItem],
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<SentMessage>;

    /// Resolves `@username` or a numeric id string to a chat id.
    async fn resolve_chat(&self, username_or_id: &str) -> Result<i64>;

    /// Lists the user ids with admin rights on `chat`.
    async fn list_admins(&self, chat: i64) -> Result<Vec<i64>>;
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Records every call it receives; unit and integration tests assert
    /// against `sent`.
    #[derive(Default)]
    pub struct FakeMessagingClient {
        pub sent: Mutex<Vec<SentRecord>>,
        pub admins: std::collections::HashMap<i64, Vec<i64>>,
        pub chat_by_username: std::collections::HashMap<String, i64>,
        next_id: std::sync::atomic::AtomicI64,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SentRecord {
        Text {
            chat: i64,
            html: String,
            reply_to: Option<i64>,
        },
        Album {
            chat: i64,
            count: usize,
            caption: Option<String>,
            reply_to: Option<i64>,
        },
    }

    #[async_trait]
    impl MessagingClient for FakeMessagingClient {
        async fn send_text(&self, chat: i64, html: &str, reply_to: Option<i64>) -> Result<SentMessage> {
            let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.sent.lock().unwrap().push(SentRecord::Text {
                chat,
                html: html.to_string(),
                reply_to,
            });
            Ok(SentMessage { id })
        }

        async fn send_album(
            &self,
            chat: i64,
            items: &[AlbumItem],
            caption: Option<&str>,
            reply_to: Option<i64>,
        ) -> Result<SentMessage> {
            let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.sent.lock().unwrap().push(SentRecord::Album {
                chat,
                count: items.len(),
                caption: caption.map(str::to_string),
                reply_to,
            });
            Ok(SentMessage { id })
        }

        async fn resolve_chat(&self, username_or_id: &str) -> Result<i64> {
            if let Ok(id) = username_or_id.parse::<i64>() {
                return Ok(id);
            }
            self.chat_by_username
                .get(username_or_id)
                .copied()
                .ok_or_else(|| crate::error::UserError::NoSuchDestination(username_or_id.to_string()).into())
        }

        async fn list_admins(&self, chat: i64) -> Result<Vec<i64>> {
            Ok(self.admins.get(&chat).cloned().unwrap_or_default())
        }
    }
}
