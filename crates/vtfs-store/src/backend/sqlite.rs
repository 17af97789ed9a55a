//! SQLite persistence for inodes, name bindings and content chunks.
//!
//! Every table leads with the tenant token, so each tenant is a key range
//! of the same three tables.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;

use super::{Backend, Txn};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::types::{Binding, Chunk, DirEntry, Ino, Inode};

const SCHEMA: &str = r#"
-- Inodes (mode, link count and size live here, once per inode)
CREATE TABLE IF NOT EXISTS inodes (
    token TEXT NOT NULL,
    ino INTEGER NOT NULL,
    mode INTEGER NOT NULL,
    nlink INTEGER NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (token, ino)
);

-- Name bindings (directory entries; several may share one inode)
CREATE TABLE IF NOT EXISTS bindings (
    token TEXT NOT NULL,
    parent_ino INTEGER NOT NULL,
    name TEXT NOT NULL,
    ino INTEGER NOT NULL,
    PRIMARY KEY (token, parent_ino, name),
    FOREIGN KEY (token, ino) REFERENCES inodes(token, ino)
);
CREATE INDEX IF NOT EXISTS idx_bindings_ino ON bindings(token, ino);

-- Content chunks (non-overlapping byte runs per inode)
CREATE TABLE IF NOT EXISTS chunks (
    token TEXT NOT NULL,
    ino INTEGER NOT NULL,
    byte_offset INTEGER NOT NULL,
    data BLOB NOT NULL CHECK (length(data) > 0),
    PRIMARY KEY (token, ino, byte_offset)
);
"#;

/// SQLite-backed store.
///
/// One connection behind a mutex; every transaction begins `IMMEDIATE`, so
/// writers are serialized.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("conn", &"<locked>")
            .finish()
    }
}

impl SqliteBackend {
    /// Open or create the database named by `config`.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.database_path();
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::internal(format!("create {}: {e}", parent.display()))
            })?;
        }
        Self::open_path(&path, Duration::from_millis(config.busy_timeout_ms))
    }

    /// Open or create a database at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("vtfs schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Backend for SqliteBackend {
    fn transaction<T, F>(&self, token: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn Txn) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = {
            let mut txn = SqliteTxn { conn: &tx, token };
            f(&mut txn)
        };
        // Dropping an uncommitted transaction rolls it back.
        let value = result?;
        tx.commit()?;
        Ok(value)
    }
}

/// Token-scoped view of an open transaction.
struct SqliteTxn<'a> {
    conn: &'a Connection,
    token: &'a str,
}

impl Txn for SqliteTxn<'_> {
    // =========================================================================
    // Inodes
    // =========================================================================

    fn inode(&mut self, ino: Ino) -> StoreResult<Option<Inode>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ino, mode, nlink, size FROM inodes WHERE token = ?1 AND ino = ?2",
        )?;
        let inode = stmt
            .query_row(params![self.token, ino], |row| {
                Ok(Inode {
                    ino: row.get(0)?,
                    mode: row.get(1)?,
                    nlink: row.get(2)?,
                    size: row.get(3)?,
                })
            })
            .optional()?;
        Ok(inode)
    }

    fn put_inode(&mut self, inode: &Inode) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO inodes (token, ino, mode, nlink, size) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (token, ino) DO UPDATE
             SET mode = excluded.mode, nlink = excluded.nlink, size = excluded.size",
        )?;
        stmt.execute(params![
            self.token,
            inode.ino,
            inode.mode,
            inode.nlink,
            inode.size
        ])?;
        Ok(())
    }

    fn remove_inode(&mut self, ino: Ino) -> StoreResult<()> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM inodes WHERE token = ?1 AND ino = ?2")?;
        stmt.execute(params![self.token, ino])?;
        Ok(())
    }

    fn max_ino(&mut self) -> StoreResult<Option<Ino>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT MAX(ino) FROM inodes WHERE token = ?1")?;
        Ok(stmt.query_row(params![self.token], |row| row.get(0))?)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    fn binding(&mut self, parent: Ino, name: &str) -> StoreResult<Option<Binding>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT parent_ino, name, ino FROM bindings
             WHERE token = ?1 AND parent_ino = ?2 AND name = ?3",
        )?;
        let binding = stmt
            .query_row(params![self.token, parent, name], |row| {
                Ok(Binding {
                    parent: row.get(0)?,
                    name: row.get(1)?,
                    ino: row.get(2)?,
                })
            })
            .optional()?;
        Ok(binding)
    }

    fn has_children(&mut self, parent: Ino) -> StoreResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT EXISTS (SELECT 1 FROM bindings WHERE token = ?1 AND parent_ino = ?2)",
        )?;
        Ok(stmt.query_row(params![self.token, parent], |row| row.get(0))?)
    }

    fn entries(&mut self, parent: Ino) -> StoreResult<Vec<DirEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT b.parent_ino, b.name, i.ino, i.mode, i.nlink, i.size
             FROM bindings b
             JOIN inodes i ON i.token = b.token AND i.ino = b.ino
             WHERE b.token = ?1 AND b.parent_ino = ?2
             ORDER BY b.name",
        )?;
        let rows = stmt.query_map(params![self.token, parent], |row| {
            Ok(DirEntry {
                parent: row.get(0)?,
                name: row.get(1)?,
                ino: row.get(2)?,
                mode: row.get(3)?,
                nlink: row.get(4)?,
                size: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn bindings_of(&mut self, ino: Ino) -> StoreResult<Vec<Binding>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT parent_ino, name, ino FROM bindings
             WHERE token = ?1 AND ino = ?2
             ORDER BY parent_ino, name",
        )?;
        let rows = stmt.query_map(params![self.token, ino], |row| {
            Ok(Binding {
                parent: row.get(0)?,
                name: row.get(1)?,
                ino: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn insert_binding(&mut self, binding: &Binding) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO bindings (token, parent_ino, name, ino) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![
            self.token,
            binding.parent,
            binding.name,
            binding.ino
        ])?;
        Ok(())
    }

    fn remove_binding(&mut self, parent: Ino, name: &str) -> StoreResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            "DELETE FROM bindings WHERE token = ?1 AND parent_ino = ?2 AND name = ?3",
        )?;
        Ok(stmt.execute(params![self.token, parent, name])? > 0)
    }

    fn remove_bindings_of(&mut self, ino: Ino) -> StoreResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM bindings WHERE token = ?1 AND ino = ?2")?;
        Ok(stmt.execute(params![self.token, ino])?)
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    fn chunks_in_range(&mut self, ino: Ino, start: u64, end: u64) -> StoreResult<Vec<Chunk>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT byte_offset, data FROM chunks
             WHERE token = ?1 AND ino = ?2
               AND byte_offset < ?4 AND byte_offset + length(data) > ?3
             ORDER BY byte_offset",
        )?;
        let rows = stmt.query_map(params![self.token, ino, start, end], |row| {
            Ok(Chunk {
                offset: row.get(0)?,
                data: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn insert_chunk(&mut self, ino: Ino, offset: u64, data: &[u8]) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO chunks (token, ino, byte_offset, data) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![self.token, ino, offset, data])?;
        Ok(())
    }

    fn remove_chunk(&mut self, ino: Ino, offset: u64) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "DELETE FROM chunks WHERE token = ?1 AND ino = ?2 AND byte_offset = ?3",
        )?;
        stmt.execute(params![self.token, ino, offset])?;
        Ok(())
    }

    fn remove_chunks(&mut self, ino: Ino) -> StoreResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM chunks WHERE token = ?1 AND ino = ?2")?;
        Ok(stmt.execute(params![self.token, ino])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ROOT_INO, S_IFREG};

    fn file(ino: Ino) -> Inode {
        Inode::new(ino, S_IFREG | 0o644)
    }

    #[test]
    fn test_inode_upsert() {
        let db = SqliteBackend::in_memory().unwrap();
        db.transaction("t", |txn| {
            txn.put_inode(&file(200))?;
            let mut inode = txn.inode(200)?.unwrap();
            inode.nlink = 3;
            inode.size = 99;
            txn.put_inode(&inode)?;
            Ok(())
        })
        .unwrap();

        let inode = db.transaction("t", |txn| txn.inode(200)).unwrap().unwrap();
        assert_eq!(inode.nlink, 3);
        assert_eq!(inode.size, 99);
    }

    #[test]
    fn test_tokens_are_isolated() {
        let db = SqliteBackend::in_memory().unwrap();
        db.transaction("a", |txn| {
            txn.put_inode(&file(200))?;
            txn.insert_binding(&Binding::new(ROOT_INO, "x", 200))
        })
        .unwrap();

        db.transaction("b", |txn| {
            assert!(txn.inode(200)?.is_none());
            assert!(txn.binding(ROOT_INO, "x")?.is_none());
            assert_eq!(txn.max_ino()?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_entries_join_inode_fields() {
        let db = SqliteBackend::in_memory().unwrap();
        let entries = db
            .transaction("t", |txn| {
                let mut inode = file(201);
                inode.nlink = 2;
                inode.size = 5;
                txn.put_inode(&inode)?;
                txn.insert_binding(&Binding::new(ROOT_INO, "b", 201))?;
                txn.insert_binding(&Binding::new(ROOT_INO, "a", 201))?;
                txn.entries(ROOT_INO)
            })
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[1].name, "b");
        assert!(entries.iter().all(|e| e.nlink == 2 && e.size == 5));
    }

    #[test]
    fn test_chunk_range_query() {
        let db = SqliteBackend::in_memory().unwrap();
        let found = db
            .transaction("t", |txn| {
                txn.insert_chunk(200, 0, &[1; 10])?;
                txn.insert_chunk(200, 20, &[2; 10])?;
                txn.insert_chunk(200, 40, &[3; 10])?;
                txn.chunks_in_range(200, 5, 21)
            })
            .unwrap();

        let offsets: Vec<_> = found.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 20]);
    }

    #[test]
    fn test_chunk_range_excludes_adjacent() {
        let db = SqliteBackend::in_memory().unwrap();
        let found = db
            .transaction("t", |txn| {
                txn.insert_chunk(200, 10, &[1; 10])?;
                txn.chunks_in_range(200, 0, 10)
            })
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_empty_chunk_rejected() {
        let db = SqliteBackend::in_memory().unwrap();
        let result = db.transaction("t", |txn| txn.insert_chunk(200, 0, &[]));
        assert!(result.unwrap_err().is_internal());
    }

    #[test]
    fn test_error_rolls_back() {
        let db = SqliteBackend::in_memory().unwrap();
        let result: StoreResult<()> = db.transaction("t", |txn| {
            txn.put_inode(&file(200))?;
            Err(StoreError::ino_not_found(200))
        });
        assert!(result.is_err());

        let inode = db.transaction("t", |txn| txn.inode(200)).unwrap();
        assert!(inode.is_none());
    }

    #[test]
    fn test_binding_requires_inode() {
        let db = SqliteBackend::in_memory().unwrap();
        let result = db.transaction("t", |txn| {
            txn.insert_binding(&Binding::new(ROOT_INO, "dangling", 999))
        });
        assert!(result.unwrap_err().is_internal());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default().with_database(dir.path().join("nested/vtfs.db"));

        {
            let db = SqliteBackend::open(&config).unwrap();
            db.transaction("t", |txn| txn.put_inode(&file(200))).unwrap();
        }

        let db = SqliteBackend::open(&config).unwrap();
        let inode = db.transaction("t", |txn| txn.inode(200)).unwrap();
        assert_eq!(inode, Some(file(200)));
    }
}
