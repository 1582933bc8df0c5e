//! Durable subscription store (C2).
//!
//! Three tables — `publishers`, `subscribers`, `links` — plus a
//! pre-insert trigger enforcing a per-operator subscription cap. Grounded on
//! `examples/original_source/core.go`'s `createTableIfNotExists` /
//! `prepareStatements` / `handleAdd` / `handleDel`, translated from
//! `database/sql` + `mattn/go-sqlite3` to `rusqlite`.
//!
//! `rusqlite::Connection` is not `Sync`; every operation runs on the
//! blocking thread pool via `spawn_blocking`; callers never see a blocking
//! call on the async executor.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::Flags;

/// Outcome of [`Store::add_link`], distinguishing the cases a caller needs
/// to react to differently (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddLinkOutcome {
    Created { link_id: i64 },
    DuplicatePair,
    LimitReached,
}

/// Row state as loaded at startup, used to seed the in-memory registry
/// (spec §4.2 "Load-all on startup").
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    /// `(source_id, last_post_ts)`
    pub publishers: Vec<(i64, i64)>,
    /// `dest_id`
    pub subscribers: Vec<i64>,
    /// `(source_id, dest_id, flags)`
    pub links: Vec<(i64, i64, Flags)>,
}

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (creating if necessary) the database at `path`, creates the
    /// schema if missing, and (re)installs the per-operator cap trigger so
    /// a changed `subs_limit` takes effect on every restart.
    pub async fn open(path: String, subs_limit: u32) -> Result<Self> {
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            create_schema(&conn)?;
            install_subs_limit_guard(&conn, subs_limit)?;
            Ok(conn)
        })
        .await
        .expect("store open task panicked")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub(crate) async fn open_in_memory(subs_limit: u32) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        install_subs_limit_guard(&conn, subs_limit)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = conn.lock().expect("store connection lock poisoned");
            f(&conn).map_err(Error::from)
        })
        .await
        .expect("store task panicked")
    }

    /// `INSERT OR IGNORE` publisher/subscriber, then `INSERT OR ROLLBACK`
    /// link. Atomic: the whole operation runs in one transaction.
    pub async fn add_link(
        &self,
        owner_id: i64,
        source_id: i64,
        dest_id: i64,
        flags: Flags,
    ) -> Result<AddLinkOutcome> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT link_id FROM links WHERE source_id = ?1 AND dest_id = ?2",
                    params![source_id, dest_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(AddLinkOutcome::DuplicatePair);
            }

            tx.execute(
                "INSERT OR IGNORE INTO publishers (source_id, last_post_ts) VALUES (?1, strftime('%s','now'))",
                params![source_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO subscribers (dest_id, flags) VALUES (?1, ?2)",
                params![dest_id, flags as i64],
            )?;

            let inserted = tx.execute(
                "INSERT INTO links (owner_id, source_id, dest_id, flags) VALUES (?1, ?2, ?3, ?4)",
                params![owner_id, source_id, dest_id, flags as i64],
            );

            match inserted {
                Ok(_) => {
                    let link_id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(AddLinkOutcome::Created { link_id })
                }
                Err(rusqlite::Error::SqliteFailure(e, Some(ref msg)))
                    if msg.contains("too many subscriptions") || e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    tx.rollback()?;
                    Ok(AddLinkOutcome::LimitReached)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Deletes a link owned by `owner_id`, then garbage-collects any
    /// publisher/subscriber no longer referenced. Returns whether a row was
    /// actually removed, so the caller knows whether to tell the registry
    /// to unsubscribe.
    pub async fn remove_link(&self, owner_id: i64, link_id: i64) -> Result<Option<(i64, i64)>> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let row: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT source_id, dest_id FROM links WHERE link_id = ?1 AND owner_id = ?2",
                    params![link_id, owner_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((source_id, dest_id)) = row else {
                return Ok(None);
            };
            tx.execute(
                "DELETE FROM links WHERE link_id = ?1 AND owner_id = ?2",
                params![link_id, owner_id],
            )?;
            tx.execute(
                "DELETE FROM publishers WHERE source_id NOT IN (SELECT source_id FROM links)",
                [],
            )?;
            tx.execute(
                "DELETE FROM subscribers WHERE dest_id NOT IN (SELECT dest_id FROM links)",
                [],
            )?;
            tx.commit()?;
            Ok(Some((source_id, dest_id)))
        })
        .await
    }

    /// Projects `(link_id, source_id, dest_id)` for every link owned by
    /// `owner_id`.
    pub async fn list_links(&self, owner_id: i64) -> Result<Vec<(i64, i64, i64)>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT link_id, source_id, dest_id FROM links WHERE owner_id = ?1 ORDER BY link_id",
            )?;
            let rows = stmt
                .query_map(params![owner_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// `UPDATE publishers SET last_post_ts = ? WHERE source_id = ?`.
    /// Idempotent; monotonicity is the caller's responsibility (the poller
    /// never passes a value smaller than the previous one).
    pub async fn advance_watermark(&self, source_id: i64, new_ts: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE publishers SET last_post_ts = ?1 WHERE source_id = ?2",
                params![new_ts, source_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Enumerates publishers, subscribers and links. Must be called
    /// exactly once, at boot, before any other task touches the registry.
    pub async fn load_all(&self) -> Result<LoadedState> {
        self.with_conn(move |conn| {
            let mut publishers = Vec::new();
            let mut stmt = conn.prepare("SELECT source_id, last_post_ts FROM publishers")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            for row in rows {
                publishers.push(row?);
            }

            let mut subscribers = Vec::new();
            let mut stmt = conn.prepare("SELECT dest_id FROM subscribers")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            for row in rows {
                subscribers.push(row?);
            }

            let mut links = Vec::new();
            let mut stmt = conn.prepare("SELECT source_id, dest_id, flags FROM links")?;
            let rows = stmt.query_map([], |row| {
                let flags: i64 = row.get(2)?;
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, flags as Flags))
            })?;
            for row in rows {
                links.push(row?);
            }

            Ok(LoadedState {
                publishers,
                subscribers,
                links,
            })
        })
        .await
    }

    /// Row counts for every table, used by `/stats`.
    pub async fn table_counts(&self) -> Result<(i64, i64, i64)> {
        self.with_conn(|conn| {
            let publishers: i64 = conn.query_row("SELECT COUNT(*) FROM publishers", [], |r| r.get(0))?;
            let subscribers: i64 = conn.query_row("SELECT COUNT(*) FROM subscribers", [], |r| r.get(0))?;
            let links: i64 = conn.query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))?;
            Ok((publishers, subscribers, links))
        })
        .await
    }
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS publishers (
            source_id INTEGER PRIMARY KEY,
            last_post_ts INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS subscribers (
            dest_id INTEGER PRIMARY KEY,
            flags INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS links (
            link_id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            source_id INTEGER NOT NULL,
            dest_id INTEGER NOT NULL,
            flags INTEGER NOT NULL,
            UNIQUE(source_id, dest_id),
            FOREIGN KEY(source_id) REFERENCES publishers(source_id),
            FOREIGN KEY(dest_id) REFERENCES subscribers(dest_id)
        );
        CREATE INDEX IF NOT EXISTS links_source_idx ON links(source_id);
        CREATE INDEX IF NOT EXISTS links_dest_idx ON links(dest_id);
        CREATE INDEX IF NOT EXISTS links_owner_idx ON links(owner_id);",
    )
}

/// Drops and recreates the pre-insert cap trigger so a changed
/// `subs_limit` always takes effect on restart.
fn install_subs_limit_guard(conn: &Connection, subs_limit: u32) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TRIGGER IF EXISTS enforce_subs_limit;")?;
    let sql = format!(
        "CREATE TRIGGER enforce_subs_limit
         BEFORE INSERT ON links
         BEGIN
             SELECT CASE WHEN (SELECT COUNT(*) FROM links WHERE owner_id = NEW.owner_id) >= {subs_limit}
             THEN RAISE(ROLLBACK, 'too many subscriptions') END;
         END;"
    );
    conn.execute_batch(&sql)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn add_link_created_then_duplicate_rejected() {
        let store = Store::open_in_memory(10).await.unwrap();
        let first = store.add_link(1, -7, 100, 0).await.unwrap();
        assert!(matches!(first, AddLinkOutcome::Created { .. }));
        let second = store.add_link(1, -7, 100, 0).await.unwrap();
        assert_eq!(second, AddLinkOutcome::DuplicatePair);
    }

    #[tokio::test]
    async fn add_link_enforces_operator_cap() {
        let store = Store::open_in_memory(2).await.unwrap();
        assert!(matches!(
            store.add_link(1, -1, 100, 0).await.unwrap(),
            AddLinkOutcome::Created { .. }
        ));
        assert!(matches!(
            store.add_link(1, -2, 100, 0).await.unwrap(),
            AddLinkOutcome::Created { .. }
        ));
        assert_eq!(
            store.add_link(1, -3, 100, 0).await.unwrap(),
            AddLinkOutcome::LimitReached
        );
    }

    #[tokio::test]
    async fn remove_link_garbage_collects_orphan_rows() {
        let store = Store::open_in_memory(10).await.unwrap();
        store.add_link(1, -7, 100, 0).await.unwrap();
        let removed = store.remove_link(1, 1).await.unwrap();
        assert_eq!(removed, Some((-7, 100)));
        let (publishers, subscribers, links) = store.table_counts().await.unwrap();
        assert_eq!((publishers, subscribers, links), (0, 0, 0));
    }

    #[tokio::test]
    async fn remove_link_rejects_non_owner() {
        let store = Store::open_in_memory(10).await.unwrap();
        store.add_link(1, -7, 100, 0).await.unwrap();
        let removed = store.remove_link(2, 1).await.unwrap();
        assert_eq!(removed, None);
        let (_, _, links) = store.table_counts().await.unwrap();
        assert_eq!(links, 1);
    }

    #[tokio::test]
    async fn load_all_reflects_inserted_rows() {
        let store = Store::open_in_memory(10).await.unwrap();
        store.add_link(1, -7, 100, 0).await.unwrap();
        store.add_link(1, -8, 100, 0).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.publishers.len(), 2);
        assert_eq!(loaded.subscribers.len(), 1);
        assert_eq!(loaded.links.len(), 2);
    }
}
