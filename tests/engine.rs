//! End-to-end scenarios driving the command surface, registry and delivery
//! worker together through the crate's public API, the way
//! `examples/lucasw-roslibrust/roslibrust_test` exercises its generated
//! message types against a running rosbridge server. Requires the
//! `test-fakes` feature (enabled for this crate's own tests via the
//! self-referencing dev-dependency in Cargo.toml).

use std::sync::Arc;

use crosspost::commands::Commands;
use crosspost::locale::EnglishLocale;
use crosspost::messaging_client::fakes::{FakeMessagingClient, SentRecord};
use crosspost::messaging_client::MessagingClient;
use crosspost::model::PreparedPost;
use crosspost::registry::Registry;
use crosspost::source_client::fakes::FakeSourceClient;
use crosspost::source_client::{BatchResult, SourceObjectKind};
use crosspost::stats::Stats;
use crosspost::store::Store;

fn raw_post(id: i64, owner_id: i64, date: i64, text: &str) -> crosspost::source_client::RawPost {
    crosspost::source_client::RawPost {
        id,
        owner_id,
        date,
        text: text.to_string(),
        marked_as_ads: false,
        attachments: Vec::new(),
        copy_history: Vec::new(),
    }
}

/// Keeps the backing temp directory alive for as long as the harness is in
/// scope; the `Store` only holds a path, not a directory handle.
struct Harness {
    commands: Commands,
    store: Arc<Store>,
    registry: Arc<Registry>,
    messaging: Arc<FakeMessagingClient>,
    _dir: tempfile::TempDir,
}

async fn harness(subs_limit: u32, source: FakeSourceClient) -> Harness {
    // `Store::open_in_memory` is `pub(crate)` and only exists for the
    // crate's own unit tests; an external integration test drives the real
    // `open` path against a throwaway file instead.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crosspost-test.db").to_string_lossy().into_owned();
    let store = Arc::new(Store::open(db_path, subs_limit).await.unwrap());
    let registry = Arc::new(Registry::new());
    let messaging = Arc::new(FakeMessagingClient::default());
    let commands = Commands::new(
        store.clone(),
        registry.clone(),
        Arc::new(source),
        messaging.clone() as Arc<dyn MessagingClient>,
        Arc::new(Stats::new()),
        vec![],
    );
    Harness {
        commands,
        store,
        registry,
        messaging,
        _dir: dir,
    }
}

#[test_log::test(tokio::test)]
async fn subscribe_then_publish_delivers_text_with_no_link_by_default() {
    let mut source = FakeSourceClient::default();
    source.names.insert("news".to_string(), (SourceObjectKind::Group, 42));
    let h = harness(10, source).await;
    let locale = EnglishLocale;

    let reply = h.commands.handle(1, "/add vk.com/news me", &locale).await;
    assert!(reply.contains("subscribed"));

    h.registry
        .publish(-42, vec![PreparedPost {
            owner_id: -42,
            post_id: 1,
            text: "hello world".to_string(),
            attachments: Default::default(),
            copy_history: Vec::new(),
            link: Default::default(),
        }])
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let sent = h.messaging.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        SentRecord::Text { html, chat, .. } => {
            assert_eq!(html, "hello world");
            assert_eq!(*chat, 1);
        }
        other => panic!("unexpected record: {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn add_link_flag_appends_back_link_to_delivered_post() {
    let mut source = FakeSourceClient::default();
    source.names.insert("news".to_string(), (SourceObjectKind::Group, 42));
    let h = harness(10, source).await;
    let locale = EnglishLocale;

    h.commands.handle(1, "/add vk.com/news me s", &locale).await;
    h.registry
        .publish(-42, vec![PreparedPost {
            owner_id: -42,
            post_id: 1,
            text: "hello".to_string(),
            attachments: Default::default(),
            copy_history: Vec::new(),
            link: crosspost::model::BackLink {
                formatted: "[https://vk.com/wall-42_1|News]".to_string(),
                raw_url: "https://vk.com/wall-42_1".to_string(),
                rendered_len: 4,
            },
        }])
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let sent = h.messaging.sent.lock().unwrap();
    match &sent[0] {
        SentRecord::Text { html, .. } => assert!(html.contains("News") && html.contains("hello")),
        other => panic!("unexpected record: {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn duplicate_subscription_and_limit_are_rejected() {
    let mut source = FakeSourceClient::default();
    source.names.insert("a".to_string(), (SourceObjectKind::Group, 1));
    source.names.insert("b".to_string(), (SourceObjectKind::Group, 2));
    let h = harness(1, source).await;
    let locale = EnglishLocale;

    let first = h.commands.handle(1, "/add vk.com/a me", &locale).await;
    assert!(first.contains("subscribed"));

    let dup = h.commands.handle(1, "/add vk.com/a me", &locale).await;
    assert_eq!(dup, locale.already_subscribed());

    let over_limit = h.commands.handle(1, "/add vk.com/b me", &locale).await;
    assert_eq!(over_limit, locale.limit_reached());
}

#[test_log::test(tokio::test)]
async fn unsubscribe_last_link_tears_down_the_destination_worker() {
    let mut source = FakeSourceClient::default();
    source.names.insert("news".to_string(), (SourceObjectKind::Group, 42));
    let h = harness(10, source).await;
    let locale = EnglishLocale;

    h.commands.handle(1, "/add vk.com/news me", &locale).await;
    assert_eq!(h.registry.worker_count().await, 1);

    h.commands.handle(1, "/del 1", &locale).await;
    assert_eq!(h.registry.worker_count().await, 0);
}

#[test_log::test(tokio::test)]
async fn private_source_is_rejected_before_any_subscription_is_created() {
    let mut source = FakeSourceClient::default();
    source.names.insert("secret".to_string(), (SourceObjectKind::Group, 7));
    source.public.insert(-7, false);
    let h = harness(10, source).await;
    let locale = EnglishLocale;

    let reply = h.commands.handle(1, "/add vk.com/secret me", &locale).await;
    assert_eq!(reply, locale.group_private("vk.com/secret"));
    assert!(h.store.list_links(1).await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn repost_chain_flows_from_poller_shaped_batch_through_to_two_sends() {
    let mut source = FakeSourceClient::default();
    source.names.insert("news".to_string(), (SourceObjectKind::Group, 42));
    let h = harness(10, source).await;
    let locale = EnglishLocale;
    h.commands.handle(1, "/add vk.com/news me", &locale).await;

    // Shaped the way `Poller::handle_batch_result` receives it from
    // `SourceClient::execute_batch`, without exercising the fake client
    // itself (its batch scripting is covered by poller.rs's own tests).
    let batch = BatchResult {
        source_id: -42,
        new_watermark: 500,
        posts: {
            let mut outer = raw_post(2, -42, 500, "look at this");
            outer.copy_history = vec![raw_post(1, -99, 100, "original source")];
            vec![outer]
        },
    };
    h.store.advance_watermark(-42, batch.new_watermark).await.unwrap();
    h.registry.advance_watermark(-42, batch.new_watermark).await;

    let prepared: Vec<PreparedPost> = batch
        .posts
        .iter()
        .map(|p| PreparedPost {
            owner_id: p.owner_id,
            post_id: p.id,
            text: p.text.clone(),
            attachments: Default::default(),
            copy_history: p
                .copy_history
                .iter()
                .map(|hist| PreparedPost {
                    owner_id: hist.owner_id,
                    post_id: hist.id,
                    text: hist.text.clone(),
                    attachments: Default::default(),
                    copy_history: Vec::new(),
                    link: Default::default(),
                })
                .collect(),
            link: Default::default(),
        })
        .collect();
    h.registry.publish(-42, prepared).await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let sent = h.messaging.sent.lock().unwrap();
    assert_eq!(sent.len(), 2, "historical item and outer post each send once");
    match &sent[0] {
        SentRecord::Text { html, .. } => assert!(html.contains("original source")),
        other => panic!("unexpected record: {other:?}"),
    }
    match &sent[1] {
        SentRecord::Text { html, reply_to, .. } => {
            assert!(html.contains("look at this"));
            assert!(reply_to.is_some(), "outer post replies to the historical send");
        }
        other => panic!("unexpected record: {other:?}"),
    }
}
