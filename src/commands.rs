//! Operator command surface. Parses the text commands a
//! bot can receive and turns each into a localized reply string; wiring the
//! reply to an actual chat transport is the out-of-scope command
//! interpreter's job.
//!
//! Regexes are grounded on `examples/original_source/core.go`'s
//! `regexAddSub`/`regexDelSub`, extended with the optional `s` suffix
//! (`ADD_LINK_TO_POST`) that `/add` accepts as an optional trailing flag.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::locale::Locale;
use crate::messaging_client::MessagingClient;
use crate::model::ADD_LINK_TO_POST;
use crate::registry::Registry;
use crate::source_client::{SourceClient, SourceObjectKind};
use crate::stats::{Stats, TableCounts};
use crate::store::{AddLinkOutcome, Store};

static ADD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^/add\s+(?:https?://)?vk\.com/([a-zA-Z0-9_.]+)\s+(@[a-zA-Z][0-9a-zA-Z_]{4,}|-?[0-9]+|me)(?:\s+(s))?\s*$",
    )
    .unwrap()
});
static DEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/del\s+(\d{1,9})\s*$").unwrap());

pub struct Commands {
    store: Arc<Store>,
    registry: Arc<Registry>,
    source: Arc<dyn SourceClient>,
    messaging: Arc<dyn MessagingClient>,
    stats: Arc<Stats>,
    bot_admins: Vec<i64>,
}

impl Commands {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<Registry>,
        source: Arc<dyn SourceClient>,
        messaging: Arc<dyn MessagingClient>,
        stats: Arc<Stats>,
        bot_admins: Vec<i64>,
    ) -> Self {
        Self {
            store,
            registry,
            source,
            messaging,
            stats,
            bot_admins,
        }
    }

    /// Dispatches one line of operator input to a localized reply.
    /// `caller_id` identifies the operator; `/add ... me` subscribes that
    /// same id as the destination (a direct message with the bot).
    pub async fn handle(&self, caller_id: i64, text: &str, locale: &dyn Locale) -> String {
        let text = text.trim();
        if let Some(caps) = ADD_RE.captures(text) {
            return self.handle_add(caller_id, &caps, locale).await;
        }
        if let Some(caps) = DEL_RE.captures(text) {
            return self.handle_del(caller_id, &caps, locale).await;
        }
        match text.split_whitespace().next().unwrap_or("") {
            "/ls" => self.handle_ls(caller_id, locale).await,
            "/help" | "/start" => locale.help_msg().to_string(),
            "/stats" => self.handle_stats(caller_id, locale).await,
            _ => locale.invalid_request().to_string(),
        }
    }

    async fn caller_is_admin(&self, caller_id: i64, chat: i64) -> bool {
        matches!(self.messaging.list_admins(chat).await, Ok(admins) if admins.contains(&caller_id))
    }

    async fn handle_add(&self, caller_id: i64, caps: &Captures<'_>, locale: &dyn Locale) -> String {
        let vk_name = &caps[1];
        let dest_raw = &caps[2];
        let add_link = caps.get(3).is_some();

        let (kind, object_id) = match self.source.resolve_screen_name(vk_name).await {
            Ok(v) => v,
            Err(_) => return locale.no_such_group(&format!("vk.com/{vk_name}")),
        };
        let source_id = match kind {
            SourceObjectKind::Group => -object_id,
            SourceObjectKind::User => object_id,
        };

        match self.source.is_public(source_id).await {
            Ok(true) => {}
            Ok(false) => {
                return match kind {
                    SourceObjectKind::Group => locale.group_private(&format!("vk.com/{vk_name}")),
                    SourceObjectKind::User => locale.user_private(&format!("vk.com/{vk_name}")),
                };
            }
            Err(_) => return locale.query_failed().to_string(),
        }

        let (dest_id, dest_label) = if dest_raw == "me" {
            (caller_id, "you".to_string())
        } else if let Ok(id) = dest_raw.parse::<i64>() {
            if !self.caller_is_admin(caller_id, id).await {
                return locale.not_admin().to_string();
            }
            (id, id.to_string())
        } else {
            match self.messaging.resolve_chat(dest_raw).await {
                Ok(id) => {
                    if !self.caller_is_admin(caller_id, id).await {
                        return locale.not_admin().to_string();
                    }
                    (id, dest_raw.to_string())
                }
                Err(_) => return locale.no_such_channel(dest_raw),
            }
        };

        let flags = if add_link { ADD_LINK_TO_POST } else { 0 };
        match self.store.add_link(caller_id, source_id, dest_id, flags).await {
            Ok(AddLinkOutcome::Created { .. }) => {
                let messaging = self.messaging.clone();
                self.registry
                    .subscribe(dest_id, source_id, flags, move |rx| {
                        crate::worker::run(dest_id, rx, messaging)
                    })
                    .await;
                locale.ok_added(&dest_label, &format!("vk.com/{vk_name}"))
            }
            Ok(AddLinkOutcome::DuplicatePair) => locale.already_subscribed().to_string(),
            Ok(AddLinkOutcome::LimitReached) => locale.limit_reached().to_string(),
            Err(e) => {
                log::error!("add_link failed: {e}");
                locale.query_failed().to_string()
            }
        }
    }

    async fn handle_del(&self, caller_id: i64, caps: &Captures<'_>, locale: &dyn Locale) -> String {
        let Ok(link_id) = caps[1].parse::<i64>() else {
            return locale.invalid_request().to_string();
        };
        match self.store.remove_link(caller_id, link_id).await {
            Ok(Some((source_id, dest_id))) => {
                self.registry.unsubscribe(dest_id, source_id).await;
                locale.del_success(link_id)
            }
            Ok(None) => locale.no_such_sub().to_string(),
            Err(e) => {
                log::error!("remove_link failed: {e}");
                locale.query_failed().to_string()
            }
        }
    }

    async fn handle_ls(&self, caller_id: i64, locale: &dyn Locale) -> String {
        match self.store.list_links(caller_id).await {
            Ok(links) if links.is_empty() => locale.no_subs().to_string(),
            Ok(links) => links
                .into_iter()
                .map(|(link_id, source_id, dest_id)| format!("[{link_id}] {source_id} => {dest_id}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                log::error!("list_links failed: {e}");
                locale.query_failed().to_string()
            }
        }
    }

    async fn handle_stats(&self, caller_id: i64, locale: &dyn Locale) -> String {
        if !self.bot_admins.contains(&caller_id) {
            return locale.not_admin().to_string();
        }
        match self.store.table_counts().await {
            Ok((publishers, subscribers, links)) => {
                let snapshot = self.stats.snapshot(TableCounts {
                    publishers,
                    subscribers,
                    links,
                });
                format!(
                    "uptime: {}s\ntotal posts: {}\nposts last hour: {}\npublishers: {}\nsubscribers: {}\nlinks: {}",
                    snapshot.uptime_secs,
                    snapshot.total_posts,
                    snapshot.posts_last_hour,
                    snapshot.table_counts.publishers,
                    snapshot.table_counts.subscribers,
                    snapshot.table_counts.links,
                )
            }
            Err(e) => {
                log::error!("table_counts failed: {e}");
                locale.query_failed().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::EnglishLocale;
    use crate::messaging_client::fakes::FakeMessagingClient;
    use crate::source_client::fakes::FakeSourceClient;
    use crate::source_client::SourceObjectKind;

    async fn make_commands(subs_limit: u32, source: FakeSourceClient, messaging: FakeMessagingClient) -> (Commands, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory(subs_limit).await.unwrap());
        let registry = Arc::new(Registry::new());
        let commands = Commands::new(
            store.clone(),
            registry,
            Arc::new(source),
            Arc::new(messaging),
            Arc::new(Stats::new()),
            vec![9],
        );
        (commands, store)
    }

    #[tokio::test]
    async fn add_then_duplicate_add_is_rejected() {
        let mut source = FakeSourceClient::default();
        source.names.insert("foo".to_string(), (SourceObjectKind::Group, 7));
        let (commands, _store) = make_commands(10, source, FakeMessagingClient::default()).await;
        let locale = EnglishLocale;

        let first = commands.handle(1, "/add vk.com/foo me", &locale).await;
        assert!(first.contains("subscribed"));
        let second = commands.handle(1, "/add vk.com/foo me", &locale).await;
        assert_eq!(second, locale.already_subscribed());
    }

    #[tokio::test]
    async fn add_past_limit_is_rejected() {
        let mut source = FakeSourceClient::default();
        source.names.insert("a".to_string(), (SourceObjectKind::Group, 1));
        source.names.insert("b".to_string(), (SourceObjectKind::Group, 2));
        let (commands, _store) = make_commands(1, source, FakeMessagingClient::default()).await;
        let locale = EnglishLocale;

        let first = commands.handle(1, "/add vk.com/a me", &locale).await;
        assert!(first.contains("subscribed"));
        let second = commands.handle(1, "/add vk.com/b me", &locale).await;
        assert_eq!(second, locale.limit_reached());
    }

    #[tokio::test]
    async fn ls_then_del_round_trip() {
        let mut source = FakeSourceClient::default();
        source.names.insert("foo".to_string(), (SourceObjectKind::Group, 7));
        let (commands, _store) = make_commands(10, source, FakeMessagingClient::default()).await;
        let locale = EnglishLocale;

        commands.handle(1, "/add vk.com/foo me", &locale).await;
        let listed = commands.handle(1, "/ls", &locale).await;
        assert!(listed.starts_with("[1] -7 => 1"));

        let deleted = commands.handle(1, "/del 1", &locale).await;
        assert_eq!(deleted, locale.del_success(1));
        let listed_after = commands.handle(1, "/ls", &locale).await;
        assert_eq!(listed_after, locale.no_subs());
    }

    #[tokio::test]
    async fn stats_restricted_to_bot_admins() {
        let (commands, _store) = make_commands(10, FakeSourceClient::default(), FakeMessagingClient::default()).await;
        let locale = EnglishLocale;
        let denied = commands.handle(1, "/stats", &locale).await;
        assert_eq!(denied, locale.not_admin());
        let allowed = commands.handle(9, "/stats", &locale).await;
        assert!(allowed.contains("uptime"));
    }
}
