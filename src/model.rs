//! Entities shared by the store, registry and delivery worker.
//!
//! `source_id`'s sign encodes kind: positive is a user wall, negative a
//! group wall (the absolute value is the platform object id). This mirrors
//! `examples/original_source/core.go`'s `resolveVkName`, which returns a
//! negated id for groups.

use serde::{Deserialize, Serialize};

/// Per-link feature bits. Only one bit is defined today; the type is a
/// bitset so new behavior flags don't require a schema migration.
pub type Flags = u64;

/// When set, delivered messages include a formatted back-link to the
/// originating post.
pub const ADD_LINK_TO_POST: Flags = 1 << 0;

/// A source page: a user or group wall, identified by a signed object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publisher {
    pub source_id: i64,
    pub last_post_ts: i64,
}

/// A destination chat on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub dest_id: i64,
    pub flags: Flags,
}

/// A persistent `(source, destination, flags)` mapping created by an
/// operator. Unique on `(source_id, dest_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub link_id: i64,
    pub owner_id: i64,
    pub source_id: i64,
    pub dest_id: i64,
    pub flags: Flags,
}

/// A formatted pointer back to the originating post, appended to outgoing
/// messages when [`ADD_LINK_TO_POST`] is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackLink {
    /// `[target|rendered]` markup, e.g. `[https://vk.com/wall-7_1|Group]`,
    /// in the same form as body text so it splits and renders consistently
    /// with the rest of the post (see `splitter::split`/`render_markup_as_html`).
    pub formatted: String,
    /// The raw URL, used only for log messages on send failure.
    pub raw_url: String,
    /// Rendered length of `formatted`, precomputed so callers don't need to
    /// re-measure it on every size check.
    pub rendered_len: usize,
}

/// One piece of non-text content attached to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Referenced by URL; the messaging client fetches it itself.
    Photo { url: String },
    /// Downloaded once by the poller (via `SourceClient::fetch_audio`),
    /// then uploaded inline by the worker rather than re-fetched per
    /// destination.
    Audio {
        bytes: Vec<u8>,
        title: String,
        performer: String,
    },
    /// A video hosted on the source network, short enough to re-upload;
    /// bytes already fetched by the poller.
    VideoInline { bytes: Vec<u8> },
    /// A video too long to re-upload, or hosted off the source network;
    /// appended as a plain link instead.
    VideoLink { url: String },
    Doc { url: String },
}

/// Attachments grouped the way the messaging platform wants them: one album
/// per kind, plus any links that couldn't be inlined (external videos).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedAttachments {
    pub photo_video: Vec<Attachment>,
    pub audio: Vec<Attachment>,
    pub doc: Vec<Attachment>,
    pub links: Vec<String>,
}

impl PreparedAttachments {
    pub fn is_empty(&self) -> bool {
        self.photo_video.is_empty()
            && self.audio.is_empty()
            && self.doc.is_empty()
            && self.links.is_empty()
    }
}

/// A post ready for delivery: text, grouped attachments, its own back-link,
/// and (oldest-first) the chain of posts it reposts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPost {
    pub owner_id: i64,
    pub post_id: i64,
    pub text: String,
    pub attachments: PreparedAttachments,
    pub copy_history: Vec<PreparedPost>,
    pub link: BackLink,
}

/// A unit of work delivered on a destination's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub posts: Vec<PreparedPost>,
    pub flags: Flags,
}
