//! Persistence backends.
//!
//! A [`Backend`] runs a closure against a tenant-scoped [`Txn`] and commits
//! everything the closure did, or nothing if it returned an error. The
//! namespace and file I/O routines only ever speak [`Txn`].

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::StoreResult;
use crate::types::{Binding, Chunk, DirEntry, Ino, Inode};

/// Primitive row operations available inside one transaction.
///
/// Every method is implicitly scoped to the token the transaction was
/// opened for.
pub trait Txn {
    // ========================================================================
    // Inode table
    // ========================================================================

    /// Point lookup by inode number.
    fn inode(&mut self, ino: Ino) -> StoreResult<Option<Inode>>;

    /// Insert or replace an inode row.
    fn put_inode(&mut self, inode: &Inode) -> StoreResult<()>;

    /// Remove an inode row.
    fn remove_inode(&mut self, ino: Ino) -> StoreResult<()>;

    /// Largest inode number stored for the tenant.
    fn max_ino(&mut self) -> StoreResult<Option<Ino>>;

    // ========================================================================
    // Name bindings
    // ========================================================================

    /// Point lookup by (parent, name).
    fn binding(&mut self, parent: Ino, name: &str) -> StoreResult<Option<Binding>>;

    /// Returns true if any binding has `parent` as its parent.
    fn has_children(&mut self, parent: Ino) -> StoreResult<bool>;

    /// Children of `parent` joined with their inodes, ordered by name.
    fn entries(&mut self, parent: Ino) -> StoreResult<Vec<DirEntry>>;

    /// All bindings referencing `ino`, ordered by (parent, name).
    fn bindings_of(&mut self, ino: Ino) -> StoreResult<Vec<Binding>>;

    /// Insert a binding. The (parent, name) key must be free.
    fn insert_binding(&mut self, binding: &Binding) -> StoreResult<()>;

    /// Remove one binding by key. Returns false if it did not exist.
    fn remove_binding(&mut self, parent: Ino, name: &str) -> StoreResult<bool>;

    /// Remove every binding referencing `ino`. Returns how many went.
    fn remove_bindings_of(&mut self, ino: Ino) -> StoreResult<usize>;

    // ========================================================================
    // Chunks
    // ========================================================================

    /// Chunks of `ino` intersecting `[start, end)`, in ascending offset order.
    fn chunks_in_range(&mut self, ino: Ino, start: u64, end: u64) -> StoreResult<Vec<Chunk>>;

    /// Insert a chunk. Its range must not overlap any stored chunk.
    fn insert_chunk(&mut self, ino: Ino, offset: u64, data: &[u8]) -> StoreResult<()>;

    /// Remove the chunk starting at `offset`.
    fn remove_chunk(&mut self, ino: Ino, offset: u64) -> StoreResult<()>;

    /// Remove all chunks of `ino`. Returns how many went.
    fn remove_chunks(&mut self, ino: Ino) -> StoreResult<usize>;
}

/// A transactional store of inodes, bindings and chunks.
pub trait Backend: Send + Sync + 'static {
    /// Run `f` inside one all-or-nothing transaction for `token`.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise.
    fn transaction<T, F>(&self, token: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn Txn) -> StoreResult<T>;
}
