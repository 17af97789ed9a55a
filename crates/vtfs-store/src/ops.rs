//! Store operations trait.
//!
//! The surface a request transport drives: inode-addressed, tenant-scoped,
//! explicit offset/length, no handle state.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{DirEntry, Ino, Inode};

/// Core store operations.
///
/// Every call runs as one atomic unit of work against the backing store and
/// is scoped to `token`; tenants never see each other's inodes.
#[async_trait]
pub trait StoreOps: Send + Sync {
    // ========================================================================
    // Namespace
    // ========================================================================

    /// Entries whose parent is `parent`, ordered by name.
    ///
    /// A directory with no children, or one that does not exist, lists as
    /// empty.
    async fn list(&self, token: &str, parent: Ino) -> StoreResult<Vec<DirEntry>>;

    /// Resolve one name in a directory.
    async fn lookup(&self, token: &str, parent: Ino, name: &str) -> StoreResult<DirEntry>;

    /// Get inode attributes.
    async fn getattr(&self, token: &str, ino: Ino) -> StoreResult<Inode>;

    /// Create a new inode bound at (parent, name).
    ///
    /// Besides `AlreadyExists`, fails with `NotFound` when `parent` does not
    /// exist and `NotADirectory` when it is not a directory.
    async fn create(&self, token: &str, parent: Ino, name: &str, mode: u32)
        -> StoreResult<DirEntry>;

    /// Create a new directory. The directory bit is forced into `mode`.
    ///
    /// Fails like [`StoreOps::create`].
    async fn mkdir(&self, token: &str, parent: Ino, name: &str, mode: u32) -> StoreResult<DirEntry>;

    /// Remove an inode and every name bound to it.
    async fn delete(&self, token: &str, ino: Ino) -> StoreResult<()>;

    /// Remove an empty directory. Same semantics as [`StoreOps::delete`].
    async fn rmdir(&self, token: &str, ino: Ino) -> StoreResult<()> {
        self.delete(token, ino).await
    }

    /// Add a hard link to `old_ino` at (parent, name).
    ///
    /// `old_ino` must be a file (`IsADirectory` otherwise) and `parent` an
    /// existing directory (`NotFound` / `NotADirectory`).
    async fn link(&self, token: &str, old_ino: Ino, parent: Ino, name: &str)
        -> StoreResult<DirEntry>;

    /// Remove one name of `ino`. Which one is unspecified when it has several;
    /// use [`StoreOps::unlink_at`] to pick.
    ///
    /// Directories are refused with `IsADirectory`; remove them with
    /// [`StoreOps::rmdir`]. The root fails with `Busy`.
    async fn unlink(&self, token: &str, ino: Ino) -> StoreResult<()>;

    /// Remove the name at (parent, name). Directories fail with `IsADirectory`.
    async fn unlink_at(&self, token: &str, parent: Ino, name: &str) -> StoreResult<()>;

    // ========================================================================
    // Content
    // ========================================================================

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// Returns fewer bytes at end of file, and an empty buffer at or past it.
    /// Holes read as zero.
    async fn read(&self, token: &str, ino: Ino, offset: u64, length: u64) -> StoreResult<Vec<u8>>;

    /// Write `data` at `offset`.
    async fn write(&self, token: &str, ino: Ino, offset: u64, data: &[u8]) -> StoreResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if an inode exists.
    async fn exists(&self, token: &str, ino: Ino) -> bool {
        self.getattr(token, ino).await.is_ok()
    }

    /// Read from `offset` to end of file.
    ///
    /// Issues as many reads as the per-read clamp requires. Each read is its
    /// own transaction, so a concurrent writer may be observed part way.
    async fn read_to_end(&self, token: &str, ino: Ino, offset: u64) -> StoreResult<Vec<u8>> {
        let size = self.getattr(token, ino).await?.size;
        let mut buf = Vec::new();
        let mut pos = offset;
        while pos < size {
            let part = self.read(token, ino, pos, size - pos).await?;
            if part.is_empty() {
                break;
            }
            pos += part.len() as u64;
            buf.extend_from_slice(&part);
        }
        Ok(buf)
    }

    /// Read entire file contents.
    async fn read_all(&self, token: &str, ino: Ino) -> StoreResult<Vec<u8>> {
        self.read_to_end(token, ino, 0).await
    }
}
