//! Per-destination delivery worker (C5).
//!
//! One task per destination, spawned by [`crate::registry::Registry`] via
//! `make_consumer`. Reads `Update`s from its bounded feed until the feed
//! closes, translating each `PreparedPost` into one or more messaging-client
//! calls. Grounded directly on
//! `examples/original_source/crosspost.go`'s `sendText`/`sendWithAttachments`/
//! `forwardSinglePost`/`forwardPost`/`listenAndForward`.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::messaging_client::{AlbumItem, MediaGroupKind, MediaSource, MessagingClient, SentMessage};
use crate::model::{Attachment, BackLink, Flags, PreparedAttachments, PreparedPost, Update, ADD_LINK_TO_POST};
use crate::splitter;

/// Telegram's plain-text message limit.
const MAX_MSG_SIZE: usize = 4096;
/// Telegram's media caption limit.
const CAPTION_LIMIT: usize = 1024;
/// Pause between sends, to stay well under the platform's 20
/// messages-per-minute soft cap.
const SEND_PAUSE: Duration = Duration::from_secs(3);

/// Runs one destination's delivery loop until its feed closes.
pub async fn run(dest: i64, mut feed: mpsc::Receiver<Update>, messaging: Arc<dyn MessagingClient>) {
    while let Some(update) = feed.recv().await {
        for post in &update.posts {
            forward_post(dest, post, update.flags, &*messaging).await;
        }
    }
    log::debug!("delivery worker for destination {dest} exiting, feed closed");
}

/// Sends a post's repost chain (oldest first), then the post itself.
/// Mirrors `forwardPost`: each historical item replies to the previous one;
/// the outer post replies to the last historical item sent, or is sent
/// top-level if the chain is empty or its last send failed.
async fn forward_post(dest: i64, post: &PreparedPost, flags: Flags, messaging: &dyn MessagingClient) {
    let mut reply_to = None;
    for historical in &post.copy_history {
        let mut effective_flags = flags;
        if historical.owner_id != post.owner_id {
            effective_flags |= ADD_LINK_TO_POST;
        }
        match forward_single_post(dest, historical, effective_flags, reply_to, messaging).await {
            Ok(sent) => reply_to = sent.map(|s| s.id),
            Err(e) => {
                warn!(
                    "failed to forward copy_history post {} for destination {dest}: {e}",
                    historical.post_id
                );
                // A failed historical send breaks the reply chain; the
                // outer post goes out as a fresh top-level message.
                reply_to = None;
            }
        }
    }
    if let Err(e) = forward_single_post(dest, post, flags, reply_to, messaging).await {
        warn!("failed to forward post {} for destination {dest}: {e}", post.post_id);
    }
}

fn effective_link(post: &PreparedPost, flags: Flags) -> BackLink {
    if flags & ADD_LINK_TO_POST != 0 {
        post.link.clone()
    } else {
        BackLink::default()
    }
}

async fn forward_single_post(
    dest: i64,
    post: &PreparedPost,
    flags: Flags,
    reply_to: Option<i64>,
    messaging: &dyn MessagingClient,
) -> crate::error::Result<Option<SentMessage>> {
    let link = effective_link(post, flags);
    if post.attachments.is_empty() {
        send_text(dest, &post.text, &link, reply_to, messaging).await
    } else {
        send_with_attachments(dest, post, &link, reply_to, messaging).await
    }
}

/// Chunks `text` (plus the back-link, appended to the final chunk) via C3,
/// sending each chunk as a reply to the previous one.
async fn send_text(
    dest: i64,
    text: &str,
    link: &BackLink,
    reply_to: Option<i64>,
    messaging: &dyn MessagingClient,
) -> crate::error::Result<Option<SentMessage>> {
    let mut full_text = text.to_string();
    if !link.formatted.is_empty() {
        if !full_text.is_empty() {
            full_text.push_str("\n\n");
        }
        full_text.push_str(&link.formatted);
    }
    if full_text.is_empty() {
        return Ok(None);
    }

    let chunks = splitter::split(&full_text, MAX_MSG_SIZE);
    let mut prev = reply_to;
    let mut last_sent = None;
    let total = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let html = splitter::render_markup_as_html(chunk.as_str(&full_text));
        match messaging.send_text(dest, &html, prev).await {
            Ok(sent) => {
                prev = Some(sent.id);
                last_sent = Some(sent);
            }
            Err(e) => warn!("failed to send text chunk to destination {dest}: {e}"),
        }
        if i + 1 < total {
            sleep(SEND_PAUSE).await;
        }
    }
    Ok(last_sent)
}

/// Groups attachments into one album per kind and sends the post's text
/// either as a caption on the first album or, if it would overflow the
/// caption limit, as a standalone text message the albums reply to.
/// Mirrors `sendWithAttachments`.
async fn send_with_attachments(
    dest: i64,
    post: &PreparedPost,
    link: &BackLink,
    reply_to: Option<i64>,
    messaging: &dyn MessagingClient,
) -> crate::error::Result<Option<SentMessage>> {
    let mut text = post.text.clone();
    if !post.attachments.links.is_empty() {
        text.push('\n');
        text.push_str(&post.attachments.links.join("\n"));
    }

    let mut caption_len = splitter::rendered_len(&text);
    if !link.formatted.is_empty() {
        if caption_len > 0 {
            caption_len += 2;
        }
        caption_len += link.rendered_len;
    }

    let groups = album_groups(&post.attachments);
    let mut opts_reply_to = reply_to;
    let mut caption_text: Option<String> = None;

    if caption_len > CAPTION_LIMIT || groups.is_empty() {
        let sent = send_text(dest, &text, link, opts_reply_to, messaging).await?;
        if let Some(sent) = &sent {
            opts_reply_to = Some(sent.id);
        }
    } else {
        if !text.is_empty() && !link.formatted.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&link.formatted);
        caption_text = Some(text);
    }

    let mut last_sent = opts_reply_to.map(|id| SentMessage { id });
    for (kind, attachments) in groups {
        let items = build_album_items(kind, attachments);
        let caption = caption_text
            .take()
            .map(|t| splitter::render_markup_as_html(&t));
        match messaging
            .send_album(dest, &items, caption.as_deref(), opts_reply_to)
            .await
        {
            Ok(sent) => {
                if opts_reply_to.is_none() {
                    opts_reply_to = Some(sent.id);
                }
                last_sent = Some(sent);
            }
            Err(e) => {
                warn!("failed to send album to destination {dest}: {e}");
                break;
            }
        }
        sleep(SEND_PAUSE * attachments.len() as u32).await;
    }
    Ok(last_sent)
}

/// Non-empty `(kind, items)` groups, in the fixed order photo/video, audio,
/// document (the typed order is otherwise unconstrained; this order
/// matches `getAttachments`' map insertion order in the original).
fn album_groups(attachments: &PreparedAttachments) -> Vec<(MediaGroupKind, &[Attachment])> {
    let mut groups = Vec::new();
    if !attachments.photo_video.is_empty() {
        groups.push((MediaGroupKind::PhotoVideo, attachments.photo_video.as_slice()));
    }
    if !attachments.audio.is_empty() {
        groups.push((MediaGroupKind::Audio, attachments.audio.as_slice()));
    }
    if !attachments.doc.is_empty() {
        groups.push((MediaGroupKind::Document, attachments.doc.as_slice()));
    }
    groups
}

fn build_album_items(kind: MediaGroupKind, attachments: &[Attachment]) -> Vec<AlbumItem> {
    attachments
        .iter()
        .map(|att| match att {
            Attachment::Photo { url } => AlbumItem {
                kind,
                source: MediaSource::Url(url.clone()),
                caption: None,
                title: None,
                performer: None,
            },
            Attachment::Audio { bytes, title, performer } => AlbumItem {
                kind,
                source: MediaSource::Bytes(bytes.clone()),
                caption: None,
                title: Some(title.clone()),
                performer: Some(performer.clone()),
            },
            Attachment::VideoInline { bytes } => AlbumItem {
                kind,
                source: MediaSource::Bytes(bytes.clone()),
                caption: None,
                title: None,
                performer: None,
            },
            Attachment::VideoLink { url } => AlbumItem {
                kind,
                source: MediaSource::Url(url.clone()),
                caption: None,
                title: None,
                performer: None,
            },
            Attachment::Doc { url } => AlbumItem {
                kind,
                source: MediaSource::Url(url.clone()),
                caption: None,
                title: None,
                performer: None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging_client::fakes::{FakeMessagingClient, SentRecord};

    fn sample_post(id: i64, owner: i64, text: &str) -> PreparedPost {
        PreparedPost {
            owner_id: owner,
            post_id: id,
            text: text.to_string(),
            attachments: Default::default(),
            copy_history: Vec::new(),
            link: BackLink {
                formatted: "[https://vk.com/wall-7_1|Group]".to_string(),
                raw_url: "https://vk.com/wall-7_1".to_string(),
                rendered_len: 5,
            },
        }
    }

    #[tokio::test]
    async fn text_only_post_sent_without_link_when_flag_unset() {
        let fake = FakeMessagingClient::default();
        let post = sample_post(1, -7, "hello");
        forward_post(100, &post, 0, &fake).await;
        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentRecord::Text { html, .. } => assert_eq!(html, "hello"),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_only_post_appends_back_link_when_flag_set() {
        let fake = FakeMessagingClient::default();
        let post = sample_post(1, -7, "hello");
        forward_post(100, &post, ADD_LINK_TO_POST, &fake).await;
        let sent = fake.sent.lock().unwrap();
        match &sent[0] {
            SentRecord::Text { html, .. } => assert!(html.contains("hello") && html.contains("Group")),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn repost_chain_attributes_back_link_only_to_historical_item() {
        let fake = FakeMessagingClient::default();
        let mut outer = sample_post(2, -7, "look at this");
        outer.link = BackLink {
            formatted: "[https://vk.com/wall-7_2|Group]".to_string(),
            raw_url: String::new(),
            rendered_len: 5,
        };
        let mut historical = sample_post(1, -8, "original");
        historical.link = BackLink {
            formatted: "[https://vk.com/wall-8_1|Other]".to_string(),
            raw_url: String::new(),
            rendered_len: 5,
        };
        outer.copy_history = vec![historical];

        forward_post(100, &outer, 0, &fake).await;
        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            SentRecord::Text { html, reply_to, .. } => {
                assert!(html.contains("Other"), "historical item must carry its own back-link");
                assert!(reply_to.is_none());
            }
            other => panic!("unexpected record: {other:?}"),
        }
        match &sent[1] {
            SentRecord::Text { html, reply_to, .. } => {
                assert!(!html.contains("Group"), "outer post must not carry a back-link with flags=0");
                assert!(reply_to.is_some(), "outer post replies to the historical item");
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_text_with_no_attachments_sends_nothing() {
        let fake = FakeMessagingClient::default();
        let post = sample_post(1, -7, "");
        forward_post(100, &post, 0, &fake).await;
        assert!(fake.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_with_only_photo_sends_album_with_caption() {
        let fake = FakeMessagingClient::default();
        let mut post = sample_post(1, -7, "caption text");
        post.attachments.photo_video.push(Attachment::Photo {
            url: "https://example.invalid/a.jpg".to_string(),
        });
        forward_post(100, &post, ADD_LINK_TO_POST, &fake).await;
        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentRecord::Album { count, caption, .. } => {
                assert_eq!(*count, 1);
                assert!(caption.as_deref().unwrap_or_default().contains("caption text"));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
