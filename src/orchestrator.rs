//! Composition root (C7). Wires store, registry, poller and command surface
//! together in a fixed boot/shutdown order. Grounded on
//! `examples/original_source/main.go`'s top-level wiring and
//! `roslibrust_test/src/main.rs`'s "build dependencies, spawn long-running
//! tasks, hand back a handle" shape.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::commands::Commands;
use crate::config::Config;
use crate::error::Result;
use crate::messaging_client::MessagingClient;
use crate::poller::Poller;
use crate::registry::Registry;
use crate::source_client::SourceClient;
use crate::stats::Stats;
use crate::store::Store;

/// Owns every long-lived piece of the running engine and the handles needed
/// to shut it down cleanly.
pub struct Crossposter {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub commands: Arc<Commands>,
    pub stats: Arc<Stats>,
    shutdown_tx: watch::Sender<bool>,
    poller_handle: JoinHandle<()>,
}

impl Crossposter {
    /// Startup order: open the store (creates/migrates tables and
    /// re-installs the subscription-cap trigger), rebuild the in-memory
    /// registry from it, start the poller, then hand back the command
    /// surface for the caller's transport to drive.
    pub async fn start(
        config: &Config,
        source: Arc<dyn SourceClient>,
        messaging: Arc<dyn MessagingClient>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(config.db_name.clone(), config.subs_limit).await?);
        let registry = Arc::new(Self::rebuild_registry(&store, messaging.clone()).await?);
        let stats = Arc::new(Stats::new());

        let poller = Arc::new(Poller::new(
            source.clone(),
            store.clone(),
            registry.clone(),
            stats.clone(),
            config.batch_size,
            config.n_posts_to_fetch,
            Duration::from_secs(config.update_period_minutes * 60),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller_handle = tokio::spawn(async move {
            poller.run(shutdown_rx).await;
        });

        let commands = Arc::new(Commands::new(
            store.clone(),
            registry.clone(),
            source,
            messaging,
            stats.clone(),
            config.bot_admins.clone(),
        ));

        Ok(Self {
            store,
            registry,
            commands,
            stats,
            shutdown_tx,
            poller_handle,
        })
    }

    /// Loads every publisher/subscriber/link row and replays it into a
    /// fresh registry via the non-locking startup variants.
    async fn rebuild_registry(store: &Store, messaging: Arc<dyn MessagingClient>) -> Result<Registry> {
        let loaded = store.load_all().await?;
        let mut registry = Registry::new();
        for (source_id, watermark) in loaded.publishers {
            registry.add_publisher_unlocked(source_id, watermark);
        }
        for dest_id in loaded.subscribers {
            let messaging = messaging.clone();
            registry.add_subscriber_unlocked(dest_id, move |rx| crate::worker::run(dest_id, rx, messaging));
        }
        for (source_id, dest_id, flags) in loaded.links {
            registry.subscribe_unlocked(dest_id, source_id, flags);
        }
        Ok(registry)
    }

    /// Shutdown order: the command transport is the
    /// caller's to stop (it lives outside this crate); from here, signal
    /// the poller, close the registry (which joins every delivery worker),
    /// then let the store close on drop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.registry.shutdown().await;
        let _ = self.poller_handle.await;
        drop(self.store);
    }
}
