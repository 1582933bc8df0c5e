//! Long-running batched poller (C6).
//!
//! Ported from `examples/original_source/crosspost.go`'s
//! `startCrossposting`/`processBatch`/`preparePosts`/`getAttachments`. The
//! registry read-lock is only ever held inside `Registry::snapshot_sources`;
//! every I/O call here runs with no lock held.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::cache::{approx_n_days_from_now, CacheMap};
use crate::model::{Attachment, PreparedAttachments, PreparedPost};
use crate::registry::Registry;
use crate::source_client::{BatchItem, BatchResult, RawAttachment, RawPost, ResolvedVideo, SourceClient};
use crate::stats::Stats;
use crate::store::Store;

/// Pause between successive batches within one iteration, to avoid bursting
/// the source API.
const BATCH_PACING: Duration = Duration::from_millis(300);
/// Display names change rarely; cache them for a few days with jitter (see
/// `approx_n_days_from_now`).
const DISPLAY_NAME_TTL_DAYS: i64 = 3;
/// Size of the display-name cache's each generation.
const NAME_CACHE_SIZE: usize = 512;

pub struct Poller {
    source: Arc<dyn SourceClient>,
    store: Arc<Store>,
    registry: Arc<Registry>,
    stats: Arc<Stats>,
    batch_size: usize,
    n_posts: usize,
    update_period: Duration,
    name_cache: CacheMap<i64, String>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn SourceClient>,
        store: Arc<Store>,
        registry: Arc<Registry>,
        stats: Arc<Stats>,
        batch_size: usize,
        n_posts: usize,
        update_period: Duration,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            stats,
            batch_size,
            n_posts,
            update_period,
            name_cache: CacheMap::new(NAME_CACHE_SIZE),
        }
    }

    /// Runs until `shutdown` reports true. One call to `poll_once` per
    /// iteration, then a sleep that's cut short if shutdown fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.poll_once().await;
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::debug!("poller observed shutdown signal");
                        return;
                    }
                }
                _ = sleep(self.update_period) => {}
            }
            if *shutdown.borrow() {
                return;
            }
        }
    }

    async fn poll_once(&self) {
        let sources = self.registry.snapshot_sources().await;
        if sources.is_empty() {
            return;
        }
        for batch in sources.chunks(self.batch_size) {
            let items: Vec<BatchItem> = batch
                .iter()
                .map(|&(source_id, last_post_ts)| BatchItem { source_id, last_post_ts })
                .collect();
            match self.source.execute_batch(&items, self.n_posts).await {
                Ok(results) => {
                    for result in results {
                        self.handle_batch_result(result).await;
                    }
                }
                Err(e) => warn!("poll batch failed: {e}"),
            }
            sleep(BATCH_PACING).await;
        }
    }

    async fn handle_batch_result(&self, result: BatchResult) {
        if result.posts.is_empty() {
            return;
        }
        self.registry
            .advance_watermark(result.source_id, result.new_watermark)
            .await;
        if let Err(e) = self.store.advance_watermark(result.source_id, result.new_watermark).await {
            log::error!("failed to persist watermark for source {}: {e}", result.source_id);
        }
        let prepared = self.prepare_posts(&result.posts).await;
        self.stats.record(prepared.len() as u64);
        self.registry.publish(result.source_id, prepared).await;
    }

    /// Expands reposts one level deep, filtering ads only at the outer
    /// level, matching the forced-attribution rule in `worker.rs`. Source posts arrive
    /// newest-first; the returned list is oldest-first, matching the
    /// ordering every downstream consumer relies on.
    async fn prepare_posts(&self, posts: &[RawPost]) -> Vec<PreparedPost> {
        let mut out = Vec::with_capacity(posts.len());
        for raw in posts.iter().rev() {
            if raw.marked_as_ads {
                continue;
            }
            let mut prepared = self.prepare_single(raw).await;
            for historical in raw.copy_history.iter().rev() {
                prepared.copy_history.push(self.prepare_single(historical).await);
            }
            out.push(prepared);
        }
        out
    }

    async fn prepare_single(&self, raw: &RawPost) -> PreparedPost {
        PreparedPost {
            owner_id: raw.owner_id,
            post_id: raw.id,
            text: raw.text.clone(),
            attachments: self.resolve_attachments(&raw.attachments).await,
            copy_history: Vec::new(),
            link: self.make_back_link(raw).await,
        }
    }

    async fn make_back_link(&self, raw: &RawPost) -> crate::model::BackLink {
        let name = self.display_name_cached(raw.owner_id).await;
        let raw_url = format!("https://vk.com/wall{}_{}", raw.owner_id, raw.id);
        // Markup form, not pre-rendered HTML: splitter::split/rendered_len
        // compute boundaries on this form, same as post body text, and
        // render_markup_as_html converts it to a real anchor at send time.
        let formatted = format!("[{raw_url}|{name}]");
        crate::model::BackLink {
            rendered_len: name.chars().count(),
            formatted,
            raw_url,
        }
    }

    async fn display_name_cached(&self, owner_id: i64) -> String {
        if let Some(name) = self.name_cache.get(&owner_id) {
            return name;
        }
        let name = match self.source.display_name(owner_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!("failed to resolve display name for {owner_id}: {e}");
                format!("id{owner_id}")
            }
        };
        self.name_cache
            .put(owner_id, name.clone(), approx_n_days_from_now(DISPLAY_NAME_TTL_DAYS));
        name
    }

    async fn resolve_attachments(&self, raw: &[RawAttachment]) -> PreparedAttachments {
        let mut out = PreparedAttachments::default();
        for att in raw {
            match att {
                RawAttachment::Photo { url } => out.photo_video.push(Attachment::Photo { url: url.clone() }),
                RawAttachment::Doc { url } => out.doc.push(Attachment::Doc { url: url.clone() }),
                RawAttachment::Audio { owner_id, id } => match self.source.fetch_audio(*owner_id, *id).await {
                    Ok(audio) => out.audio.push(Attachment::Audio {
                        bytes: audio.bytes,
                        title: audio.title,
                        performer: audio.performer,
                    }),
                    Err(e) => warn!("failed to fetch audio {owner_id}_{id}: {e}"),
                },
                RawAttachment::Video { owner_id, id, access_key } => {
                    match self.source.fetch_video(*owner_id, *id, access_key.as_deref()).await {
                        Ok(ResolvedVideo::Inline { bytes }) => out.photo_video.push(Attachment::VideoInline { bytes }),
                        Ok(ResolvedVideo::Link { url }) => out.links.push(url),
                        Err(e) => warn!("failed to fetch video {owner_id}_{id}: {e}"),
                    }
                }
            }
        }
        out
    }
}
