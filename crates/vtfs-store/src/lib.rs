//! # vtfs-store
//!
//! Multi-tenant virtual inode store.
//!
//! Each tenant, identified by an opaque token, owns an isolated tree of
//! inodes under a fixed root. The store provides:
//!
//! - [`StoreOps`] - Inode-addressed namespace and content operations
//! - [`VirtualStore`] - Runs each operation as one backend transaction
//! - [`SqliteBackend`] - Durable storage in a single SQLite file
//! - [`MemoryBackend`] - Ephemeral storage (for testing)
//!
//! ## Design Decisions
//!
//! - **Inodes and bindings are separate**: mode, link count and size live
//!   once on the inode; a hard link is just another (parent, name) binding.
//! - **Sparse chunked content**: a write stores one chunk; unwritten gaps
//!   read as zero.
//! - **Root is implicit**: inode [`ROOT_INO`] exists for every tenant and is
//!   never stored.

pub mod alloc;
pub mod backend;
pub mod config;
mod error;
pub mod file_io;
pub mod namespace;
mod ops;
mod store;
mod types;

pub use backend::{Backend, MemoryBackend, SqliteBackend, Txn};
pub use config::{ConfigError, OverlapPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use ops::StoreOps;
pub use store::VirtualStore;
pub use types::{
    Binding, Chunk, DirEntry, FIRST_INO, FileKind, Ino, Inode, MAX_NAME_LEN, ROOT_INO, S_IFDIR,
    S_IFREG,
};
