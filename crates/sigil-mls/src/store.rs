//! SQLite-backed group and message store.
//!
//! Holds the local view of every MLS group plus decrypted application
//! messages, so list models can re-project after a restart. The
//! database has exactly one writer: the [`GroupEngineAdapter`]. Opening
//! the same path twice in one process returns
//! [`MlsError::AlreadyInitialized`].
//!
//! [`GroupEngineAdapter`]: crate::adapter::GroupEngineAdapter

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use rusqlite::{params, Connection, OptionalExtension};

use sigil_types::group::{GroupInfo, GroupStatus};

use crate::{MlsError, Result};

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: u32 = 1;

/// Paths currently open in this process; enforces the single-writer
/// policy.
fn open_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    PATHS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A stored decrypted application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// Inner event id, lowercase hex.
    pub event_id: String,
    pub group_id: String,
    pub author_pubkey: String,
    pub created_at: u64,
    pub event_json: String,
}

/// Durable local view of groups and their messages.
pub struct GroupStore {
    conn: Mutex<Connection>,
    /// `None` for in-memory stores, which skip the open registry.
    path: Option<PathBuf>,
}

impl GroupStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let canonical = path
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .map(|p| p.join(path.file_name().unwrap_or_default()))
            .unwrap_or_else(|| path.to_path_buf());

        {
            let mut paths = lock_registry();
            if !paths.insert(canonical.clone()) {
                return Err(MlsError::AlreadyInitialized);
            }
        }

        let conn = Connection::open(path).map_err(store_err);
        let conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                lock_registry().remove(&canonical);
                return Err(e);
            }
        };
        if let Err(e) = configure(&conn).and_then(|()| migrate(&conn)) {
            lock_registry().remove(&canonical);
            return Err(e);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(canonical),
        })
    }

    /// Open an in-memory store (tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        configure(&conn)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Insert or replace a group's local view.
    pub fn upsert_group(&self, group: &GroupInfo) -> Result<()> {
        let admins = serde_json::to_string(&group.admin_pubkeys).map_err(json_err)?;
        let relays = serde_json::to_string(&group.relay_urls).map_err(json_err)?;
        self.lock_conn()
            .execute(
                "INSERT OR REPLACE INTO groups
                 (mls_group_id, name, description, epoch, status, admin_pubkeys, relay_urls)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    group.mls_group_id,
                    group.name,
                    group.description,
                    group.epoch as i64,
                    status_str(group.status),
                    admins,
                    relays,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Advance a group's epoch. Epochs never move backwards.
    pub fn set_epoch(&self, group_id: &str, epoch: u64) -> Result<()> {
        let changed = self
            .lock_conn()
            .execute(
                "UPDATE groups SET epoch = ?2 WHERE mls_group_id = ?1 AND epoch <= ?2",
                params![group_id, epoch as i64],
            )
            .map_err(store_err)?;
        if changed == 0 {
            // Either unknown group or a stale epoch; stale is fine.
            let exists = self.group_by_id(group_id)?.is_some();
            if !exists {
                return Err(MlsError::GroupNotFound(group_id.to_string()));
            }
        }
        Ok(())
    }

    pub fn set_status(&self, group_id: &str, status: GroupStatus) -> Result<()> {
        let changed = self
            .lock_conn()
            .execute(
                "UPDATE groups SET status = ?2 WHERE mls_group_id = ?1",
                params![group_id, status_str(status)],
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Err(MlsError::GroupNotFound(group_id.to_string()));
        }
        Ok(())
    }

    pub fn group_by_id(&self, group_id: &str) -> Result<Option<GroupInfo>> {
        self.lock_conn()
            .query_row(
                "SELECT mls_group_id, name, description, epoch, status, admin_pubkeys, relay_urls
                 FROM groups WHERE mls_group_id = ?1",
                params![group_id],
                row_to_group,
            )
            .optional()
            .map_err(store_err)
    }

    /// The most recently created active group with this exact name.
    pub fn active_group_by_name(&self, name: &str) -> Result<Option<GroupInfo>> {
        self.lock_conn()
            .query_row(
                "SELECT mls_group_id, name, description, epoch, status, admin_pubkeys, relay_urls
                 FROM groups WHERE name = ?1 AND status = 'active'
                 ORDER BY rowid DESC LIMIT 1",
                params![name],
                row_to_group,
            )
            .optional()
            .map_err(store_err)
    }

    /// All groups, optionally filtered by status.
    pub fn list_groups(&self, status: Option<GroupStatus>) -> Result<Vec<GroupInfo>> {
        let conn = self.lock_conn();
        let mut rows = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT mls_group_id, name, description, epoch, status, admin_pubkeys,
                                relay_urls
                         FROM groups WHERE status = ?1 ORDER BY rowid",
                    )
                    .map_err(store_err)?;
                let iter = stmt
                    .query_map(params![status_str(status)], row_to_group)
                    .map_err(store_err)?;
                for row in iter {
                    rows.push(row.map_err(store_err)?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT mls_group_id, name, description, epoch, status, admin_pubkeys,
                                relay_urls
                         FROM groups ORDER BY rowid",
                    )
                    .map_err(store_err)?;
                let iter = stmt.query_map([], row_to_group).map_err(store_err)?;
                for row in iter {
                    rows.push(row.map_err(store_err)?);
                }
            }
        }
        Ok(rows)
    }

    /// Record a decrypted application message. Duplicate event ids are
    /// ignored (relays echo).
    pub fn insert_message(&self, message: &StoredMessage) -> Result<bool> {
        let inserted = self
            .lock_conn()
            .execute(
                "INSERT OR IGNORE INTO messages
                 (event_id, mls_group_id, author_pubkey, created_at, event_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.event_id,
                    message.group_id,
                    message.author_pubkey,
                    message.created_at as i64,
                    message.event_json,
                ],
            )
            .map_err(store_err)?;
        Ok(inserted > 0)
    }

    /// Messages for a group in arrival order.
    pub fn messages(&self, group_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.lock_conn();
        let mut stmt = conn
            .prepare(
                "SELECT event_id, mls_group_id, author_pubkey, created_at, event_json
                 FROM messages WHERE mls_group_id = ?1 ORDER BY rowid",
            )
            .map_err(store_err)?;
        let iter = stmt
            .query_map(params![group_id], |row| {
                Ok(StoredMessage {
                    event_id: row.get(0)?,
                    group_id: row.get(1)?,
                    author_pubkey: row.get(2)?,
                    created_at: row.get::<_, i64>(3)? as u64,
                    event_json: row.get(4)?,
                })
            })
            .map_err(store_err)?;
        let mut rows = Vec::new();
        for row in iter {
            rows.push(row.map_err(store_err)?);
        }
        Ok(rows)
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for GroupStore {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            lock_registry().remove(path);
        }
    }
}

fn lock_registry() -> std::sync::MutexGuard<'static, HashSet<PathBuf>> {
    match open_paths().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(store_err)
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(store_err)?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS groups (
             mls_group_id  TEXT PRIMARY KEY,
             name          TEXT NOT NULL,
             description   TEXT NOT NULL DEFAULT '',
             epoch         INTEGER NOT NULL DEFAULT 0,
             status        TEXT NOT NULL,
             admin_pubkeys TEXT NOT NULL DEFAULT '[]',
             relay_urls    TEXT NOT NULL DEFAULT '[]'
         );
         CREATE INDEX IF NOT EXISTS idx_groups_name ON groups(name);

         CREATE TABLE IF NOT EXISTS messages (
             event_id      TEXT PRIMARY KEY,
             mls_group_id  TEXT NOT NULL REFERENCES groups(mls_group_id),
             author_pubkey TEXT NOT NULL,
             created_at    INTEGER NOT NULL,
             event_json    TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_messages_group ON messages(mls_group_id);

         PRAGMA user_version = 1;",
    )
    .map_err(store_err)
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupInfo> {
    let status: String = row.get(4)?;
    let admins: String = row.get(5)?;
    let relays: String = row.get(6)?;
    Ok(GroupInfo {
        mls_group_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        epoch: row.get::<_, i64>(3)? as u64,
        status: parse_status(&status),
        admin_pubkeys: serde_json::from_str(&admins).unwrap_or_default(),
        relay_urls: serde_json::from_str(&relays).unwrap_or_default(),
    })
}

fn status_str(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Active => "active",
        GroupStatus::Inactive => "inactive",
        GroupStatus::Pending => "pending",
    }
}

fn parse_status(s: &str) -> GroupStatus {
    match s {
        "active" => GroupStatus::Active,
        "inactive" => GroupStatus::Inactive,
        _ => GroupStatus::Pending,
    }
}

fn store_err(e: rusqlite::Error) -> MlsError {
    MlsError::Store(e.to_string())
}

fn json_err(e: serde_json::Error) -> MlsError {
    MlsError::Store(e.to_string())
}
