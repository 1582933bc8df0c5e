//! The source-network client interface (external collaborator). The real
//! fetcher (page/post/media retrieval, batched script
//! execution) lives outside this crate; only the contract it must satisfy
//! is defined here, mirroring how `roslibrust_common` defines `RosMessageType`
//! and `ServiceFn` as the seam its backends implement against rather than
//! shipping a transport itself.

use async_trait::async_trait;

use crate::error::Result;

/// Whether a source page is a user wall or a group wall. The sign of
/// `source_id` already encodes this (positive user, negative group); this
/// type exists for the resolve step, before a signed id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceObjectKind {
    User,
    Group,
}

/// A single piece of non-text content as reported by the source, prior to
/// any normalization into [`crate::model::Attachment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAttachment {
    Photo { url: String },
    Audio { owner_id: i64, id: i64 },
    Video { owner_id: i64, id: i64, access_key: Option<String> },
    Doc { url: String },
}

/// A post as returned by the source, before attachment resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub id: i64,
    pub owner_id: i64,
    pub date: i64,
    pub text: String,
    pub marked_as_ads: bool,
    pub attachments: Vec<RawAttachment>,
    /// Oldest-first repost chain, one level deep.
    pub copy_history: Vec<RawPost>,
}

/// One `(source_id, watermark)` pair submitted to a batched poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchItem {
    pub source_id: i64,
    pub last_post_ts: i64,
}

/// What a batched poll returns for a single source: its new watermark (the
/// max post timestamp in the batch) and the ad-filtered posts newer than
/// the previous watermark. Absent from the result entirely if nothing new
/// was found for a source, it is simply absent from the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub source_id: i64,
    pub new_watermark: i64,
    pub posts: Vec<RawPost>,
}

/// A resolved audio attachment, already fetched so the worker can upload it
/// inline rather than re-download per destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub title: String,
    pub performer: String,
    pub bytes: Vec<u8>,
}

/// A resolved video attachment: either bytes to re-upload (short clip
/// hosted on the source network) or a normalized link (long clip, or
/// hosted on an external platform).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVideo {
    Inline { bytes: Vec<u8> },
    Link { url: String },
}

/// The contract the poller (C6) and orchestrator (C7) depend on. Spec.md
/// §1 treats the concrete implementation as an external collaborator; this
/// crate ships only this trait plus a fake for tests (see `fakes` module).
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Batched poll: for every item, returns the newest posts strictly
    /// newer than `last_post_ts`, ad-filtered, plus the new watermark.
    /// Sources with nothing new are simply absent from the result.
    async fn execute_batch(&self, batch: &[BatchItem], n_posts: usize) -> Result<Vec<BatchResult>>;

    /// Resolves a screen name to `(kind, object_id)`. `object_id` is always
    /// positive; the caller applies the sign convention.
    async fn resolve_screen_name(&self, name: &str) -> Result<(SourceObjectKind, i64)>;

    /// True if the page behind `source_id` exists and is publicly visible.
    async fn is_public(&self, source_id: i64) -> Result<bool>;

    /// The page's display name, used to build back-links and for `/ls`.
    async fn display_name(&self, source_id: i64) -> Result<String>;

    async fn fetch_audio(&self, owner_id: i64, id: i64) -> Result<ResolvedAudio>;

    async fn fetch_video(
        &self,
        owner_id: i64,
        id: i64,
        access_key: Option<&str>,
    ) -> Result<ResolvedVideo>;
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory `SourceClient` used by unit and integration tests: a
    /// fixed table of pages and a scripted sequence of batch results.
    #[derive(Default)]
    pub struct FakeSourceClient {
        pub names: HashMap<String, (SourceObjectKind, i64)>,
        pub display_names: HashMap<i64, String>,
        pub public: HashMap<i64, bool>,
        pub scripted_batches: Mutex<Vec<Vec<BatchResult>>>,
    }

    #[async_trait]
    impl SourceClient for FakeSourceClient {
        async fn execute_batch(&self, _batch: &[BatchItem], _n_posts: usize) -> Result<Vec<BatchResult>> {
            let mut scripted = self.scripted_batches.lock().unwrap();
            Ok(if scripted.is_empty() {
                Vec::new()
            } else {
                scripted.remove(0)
            })
        }

        async fn resolve_screen_name(&self, name: &str) -> Result<(SourceObjectKind, i64)> {
            self.names
                .get(name)
                .copied()
                .ok_or_else(|| crate::error::UserError::NoSuchSource(name.to_string()).into())
        }

        async fn is_public(&self, source_id: i64) -> Result<bool> {
            Ok(*self.public.get(&source_id).unwrap_or(&true))
        }

        async fn display_name(&self, source_id: i64) -> Result<String> {
            Ok(self
                .display_names
                .get(&source_id)
                .cloned()
                .unwrap_or_else(|| format!("source{source_id}")))
        }

        async fn fetch_audio(&self, _owner_id: i64, _id: i64) -> Result<ResolvedAudio> {
            Ok(ResolvedAudio {
                title: "t".into(),
                performer: "p".into(),
                bytes: Vec::new(),
            })
        }

        async fn fetch_video(
            &self,
            _owner_id: i64,
            _id: i64,
            _access_key: Option<&str>,
        ) -> Result<ResolvedVideo> {
            Ok(ResolvedVideo::Link {
                url: "https://example.invalid/video".into(),
            })
        }
    }
}
