//! The tenant-scoped store.
//!
//! [`VirtualStore`] runs each operation as one backend transaction on the
//! blocking pool, so SQLite work never stalls the async runtime.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::backend::{Backend, MemoryBackend, SqliteBackend, Txn};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::file_io;
use crate::namespace;
use crate::ops::StoreOps;
use crate::types::{DirEntry, Ino, Inode};

/// Inode store over a transactional backend.
pub struct VirtualStore<B> {
    backend: Arc<B>,
    config: Arc<StoreConfig>,
}

impl<B> Clone for VirtualStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
        }
    }
}

impl<B> std::fmt::Debug for VirtualStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VirtualStore<SqliteBackend> {
    /// Open the SQLite store named by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let backend = SqliteBackend::open(&config)?;
        tracing::info!(path = %config.database_path().display(), "opened vtfs store");
        Ok(Self::new(backend, config))
    }
}

impl VirtualStore<MemoryBackend> {
    /// Ephemeral store with default settings.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), StoreConfig::default())
    }
}

impl<B: Backend> VirtualStore<B> {
    pub fn new(backend: B, config: StoreConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
        }
    }

    /// Same backend, different settings.
    pub fn with_config(&self, config: StoreConfig) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn run<T, F>(&self, op: &'static str, token: &str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Txn) -> StoreResult<T> + Send + 'static,
    {
        if token.is_empty() {
            return Err(StoreError::invalid_argument("empty tenant token"));
        }
        let backend = Arc::clone(&self.backend);
        let token = token.to_owned();
        let result = tokio::task::spawn_blocking(move || backend.transaction(&token, f)).await?;

        if let Err(e) = &result {
            if e.is_internal() {
                error!(op, error = %e, "store operation failed");
            } else {
                debug!(op, error = %e, "store operation refused");
            }
        }
        result
    }
}

#[async_trait]
impl<B: Backend> StoreOps for VirtualStore<B> {
    #[tracing::instrument(skip(self), name = "store.list")]
    async fn list(&self, token: &str, parent: Ino) -> StoreResult<Vec<DirEntry>> {
        self.run("list", token, move |txn| namespace::list(txn, parent))
            .await
    }

    #[tracing::instrument(skip(self), name = "store.lookup")]
    async fn lookup(&self, token: &str, parent: Ino, name: &str) -> StoreResult<DirEntry> {
        let name = name.to_owned();
        self.run("lookup", token, move |txn| {
            namespace::lookup(txn, parent, &name)
        })
        .await
    }

    #[tracing::instrument(skip(self), name = "store.getattr")]
    async fn getattr(&self, token: &str, ino: Ino) -> StoreResult<Inode> {
        self.run("getattr", token, move |txn| namespace::getattr(txn, ino))
            .await
    }

    #[tracing::instrument(skip(self), name = "store.create")]
    async fn create(
        &self,
        token: &str,
        parent: Ino,
        name: &str,
        mode: u32,
    ) -> StoreResult<DirEntry> {
        let name = name.to_owned();
        self.run("create", token, move |txn| {
            namespace::create(txn, parent, &name, mode)
        })
        .await
    }

    #[tracing::instrument(skip(self), name = "store.mkdir")]
    async fn mkdir(&self, token: &str, parent: Ino, name: &str, mode: u32) -> StoreResult<DirEntry> {
        let name = name.to_owned();
        self.run("mkdir", token, move |txn| {
            namespace::mkdir(txn, parent, &name, mode)
        })
        .await
    }

    #[tracing::instrument(skip(self), name = "store.delete")]
    async fn delete(&self, token: &str, ino: Ino) -> StoreResult<()> {
        self.run("delete", token, move |txn| namespace::delete(txn, ino))
            .await
    }

    #[tracing::instrument(skip(self), name = "store.rmdir")]
    async fn rmdir(&self, token: &str, ino: Ino) -> StoreResult<()> {
        self.run("rmdir", token, move |txn| namespace::delete(txn, ino))
            .await
    }

    #[tracing::instrument(skip(self), name = "store.link")]
    async fn link(
        &self,
        token: &str,
        old_ino: Ino,
        parent: Ino,
        name: &str,
    ) -> StoreResult<DirEntry> {
        let name = name.to_owned();
        self.run("link", token, move |txn| {
            namespace::link(txn, old_ino, parent, &name)
        })
        .await
    }

    #[tracing::instrument(skip(self), name = "store.unlink")]
    async fn unlink(&self, token: &str, ino: Ino) -> StoreResult<()> {
        self.run("unlink", token, move |txn| namespace::unlink(txn, ino))
            .await
    }

    #[tracing::instrument(skip(self), name = "store.unlink_at")]
    async fn unlink_at(&self, token: &str, parent: Ino, name: &str) -> StoreResult<()> {
        let name = name.to_owned();
        self.run("unlink_at", token, move |txn| {
            namespace::unlink_at(txn, parent, &name)
        })
        .await
    }

    #[tracing::instrument(skip(self), name = "store.read")]
    async fn read(&self, token: &str, ino: Ino, offset: u64, length: u64) -> StoreResult<Vec<u8>> {
        let max_len = self.config.max_read_len;
        self.run("read", token, move |txn| {
            file_io::read(txn, ino, offset, length, max_len)
        })
        .await
    }

    #[tracing::instrument(skip(self, data), fields(len = data.len()), name = "store.write")]
    async fn write(&self, token: &str, ino: Ino, offset: u64, data: &[u8]) -> StoreResult<()> {
        let policy = self.config.overlap_policy;
        let data = data.to_vec();
        self.run("write", token, move |txn| {
            file_io::write(txn, ino, offset, &data, policy)
        })
        .await
    }
}
