//! In-memory backend.
//!
//! Used for testing and scratch stores. All data is ephemeral.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use super::{Backend, Txn};
use crate::error::{StoreError, StoreResult};
use crate::types::{Binding, Chunk, DirEntry, Ino, Inode};

/// One tenant's tables.
#[derive(Debug, Default)]
struct Tenant {
    inodes: BTreeMap<Ino, Inode>,
    /// (parent, name) → ino
    bindings: BTreeMap<(Ino, String), Ino>,
    /// (ino, offset) → data
    chunks: BTreeMap<(Ino, u64), Vec<u8>>,
}

impl Tenant {
    fn children(&self, parent: Ino) -> impl Iterator<Item = (&(Ino, String), &Ino)> {
        self.bindings
            .range((parent, String::new())..)
            .take_while(move |((p, _), _)| *p == parent)
    }
}

/// In-memory backend.
///
/// Transactions write the tenant's tables in place and keep an undo log;
/// on error (or panic) the log is replayed backwards. The lock is held for
/// the whole transaction, so cost follows the rows touched, not the tenant
/// size.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tenants: Mutex<HashMap<String, Tenant>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn transaction<T, F>(&self, token: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn Txn) -> StoreResult<T>,
    {
        let mut tenants = self.tenants.lock();
        let tenant = tenants.entry(token.to_owned()).or_default();
        let mut txn = MemoryTxn {
            tenant,
            undo: Vec::new(),
            committed: false,
        };
        let value = f(&mut txn)?;
        txn.committed = true;
        Ok(value)
    }
}

/// Prior value of one row, restored on rollback.
enum Undo {
    Inode(Ino, Option<Inode>),
    Binding((Ino, String), Option<Ino>),
    Chunk((Ino, u64), Option<Vec<u8>>),
}

struct MemoryTxn<'a> {
    tenant: &'a mut Tenant,
    undo: Vec<Undo>,
    committed: bool,
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Inode(ino, Some(inode)) => {
                    self.tenant.inodes.insert(ino, inode);
                }
                Undo::Inode(ino, None) => {
                    self.tenant.inodes.remove(&ino);
                }
                Undo::Binding(key, Some(ino)) => {
                    self.tenant.bindings.insert(key, ino);
                }
                Undo::Binding(key, None) => {
                    self.tenant.bindings.remove(&key);
                }
                Undo::Chunk(key, Some(data)) => {
                    self.tenant.chunks.insert(key, data);
                }
                Undo::Chunk(key, None) => {
                    self.tenant.chunks.remove(&key);
                }
            }
        }
    }
}

impl Txn for MemoryTxn<'_> {
    fn inode(&mut self, ino: Ino) -> StoreResult<Option<Inode>> {
        Ok(self.tenant.inodes.get(&ino).cloned())
    }

    fn put_inode(&mut self, inode: &Inode) -> StoreResult<()> {
        let prior = self.tenant.inodes.insert(inode.ino, inode.clone());
        self.undo.push(Undo::Inode(inode.ino, prior));
        Ok(())
    }

    fn remove_inode(&mut self, ino: Ino) -> StoreResult<()> {
        if let Some(prior) = self.tenant.inodes.remove(&ino) {
            self.undo.push(Undo::Inode(ino, Some(prior)));
        }
        Ok(())
    }

    fn max_ino(&mut self) -> StoreResult<Option<Ino>> {
        Ok(self.tenant.inodes.keys().next_back().copied())
    }

    fn binding(&mut self, parent: Ino, name: &str) -> StoreResult<Option<Binding>> {
        Ok(self
            .tenant
            .bindings
            .get(&(parent, name.to_owned()))
            .map(|&ino| Binding::new(parent, name, ino)))
    }

    fn has_children(&mut self, parent: Ino) -> StoreResult<bool> {
        Ok(self.tenant.children(parent).next().is_some())
    }

    fn entries(&mut self, parent: Ino) -> StoreResult<Vec<DirEntry>> {
        self.tenant
            .children(parent)
            .map(|((parent, name), ino)| {
                let inode = self
                    .tenant
                    .inodes
                    .get(ino)
                    .ok_or_else(|| StoreError::internal(format!("dangling binding {name:?}")))?;
                Ok(DirEntry::from_parts(Binding::new(*parent, name.clone(), *ino), inode))
            })
            .collect()
    }

    fn bindings_of(&mut self, ino: Ino) -> StoreResult<Vec<Binding>> {
        Ok(self
            .tenant
            .bindings
            .iter()
            .filter(|(_, target)| **target == ino)
            .map(|((parent, name), &ino)| Binding::new(*parent, name.clone(), ino))
            .collect())
    }

    fn insert_binding(&mut self, binding: &Binding) -> StoreResult<()> {
        if !self.tenant.inodes.contains_key(&binding.ino) {
            return Err(StoreError::internal(format!(
                "binding {:?} references missing ino {}",
                binding.name, binding.ino
            )));
        }
        let key = (binding.parent, binding.name.clone());
        if self.tenant.bindings.contains_key(&key) {
            return Err(StoreError::internal(format!(
                "duplicate binding {:?} in {}",
                binding.name, binding.parent
            )));
        }
        self.tenant.bindings.insert(key.clone(), binding.ino);
        self.undo.push(Undo::Binding(key, None));
        Ok(())
    }

    fn remove_binding(&mut self, parent: Ino, name: &str) -> StoreResult<bool> {
        let key = (parent, name.to_owned());
        match self.tenant.bindings.remove(&key) {
            Some(ino) => {
                self.undo.push(Undo::Binding(key, Some(ino)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_bindings_of(&mut self, ino: Ino) -> StoreResult<usize> {
        let keys: Vec<_> = self
            .tenant
            .bindings
            .iter()
            .filter(|(_, target)| **target == ino)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.tenant.bindings.remove(key);
            self.undo.push(Undo::Binding(key.clone(), Some(ino)));
        }
        Ok(keys.len())
    }

    fn chunks_in_range(&mut self, ino: Ino, start: u64, end: u64) -> StoreResult<Vec<Chunk>> {
        Ok(self
            .tenant
            .chunks
            .range((ino, 0)..(ino, end))
            .map(|(&(_, offset), data)| Chunk::new(offset, data.clone()))
            .filter(|chunk| chunk.overlaps(start, end))
            .collect())
    }

    fn insert_chunk(&mut self, ino: Ino, offset: u64, data: &[u8]) -> StoreResult<()> {
        if data.is_empty() {
            return Err(StoreError::internal("empty chunk"));
        }
        if self.tenant.chunks.contains_key(&(ino, offset)) {
            return Err(StoreError::internal(format!(
                "duplicate chunk at {offset} for ino {ino}"
            )));
        }
        self.tenant.chunks.insert((ino, offset), data.to_vec());
        self.undo.push(Undo::Chunk((ino, offset), None));
        Ok(())
    }

    fn remove_chunk(&mut self, ino: Ino, offset: u64) -> StoreResult<()> {
        if let Some(prior) = self.tenant.chunks.remove(&(ino, offset)) {
            self.undo.push(Undo::Chunk((ino, offset), Some(prior)));
        }
        Ok(())
    }

    fn remove_chunks(&mut self, ino: Ino) -> StoreResult<usize> {
        let offsets: Vec<u64> = self
            .tenant
            .chunks
            .range((ino, 0)..=(ino, u64::MAX))
            .map(|(&(_, offset), _)| offset)
            .collect();
        for &offset in &offsets {
            if let Some(prior) = self.tenant.chunks.remove(&(ino, offset)) {
                self.undo.push(Undo::Chunk((ino, offset), Some(prior)));
            }
        }
        Ok(offsets.len())
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
    fn test_commit_and_isolation() {
        let mem = MemoryBackend::new();
        mem.transaction("a", |txn| {
            txn.put_inode(&file(200))?;
            txn.insert_binding(&Binding::new(ROOT_INO, "x", 200))
        })
        .unwrap();

        let (in_a, in_b) = (
            mem.transaction("a", |txn| txn.binding(ROOT_INO, "x")).unwrap(),
            mem.transaction("b", |txn| txn.binding(ROOT_INO, "x")).unwrap(),
        );
        assert_eq!(in_a, Some(Binding::new(ROOT_INO, "x", 200)));
        assert!(in_b.is_none());
    }

    #[test]
    fn test_error_rolls_back_inserts() {
        let mem = MemoryBackend::new();
        let result: StoreResult<()> = mem.transaction("t", |txn| {
            txn.put_inode(&file(200))?;
            txn.insert_chunk(200, 0, b"data")?;
            Err(StoreError::internal("abort"))
        });
        assert!(result.is_err());

        mem.transaction("t", |txn| {
            assert!(txn.inode(200)?.is_none());
            assert!(txn.chunks_in_range(200, 0, 100)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_error_restores_overwritten_and_removed_rows() {
        let mem = MemoryBackend::new();
        mem.transaction("t", |txn| {
            txn.put_inode(&file(200))?;
            txn.insert_binding(&Binding::new(ROOT_INO, "a", 200))?;
            txn.insert_binding(&Binding::new(ROOT_INO, "b", 200))?;
            txn.insert_chunk(200, 0, b"head")?;
            txn.insert_chunk(200, 4, b"tail")
        })
        .unwrap();

        let result: StoreResult<()> = mem.transaction("t", |txn| {
            let mut grown = file(200);
            grown.size = 99;
            txn.put_inode(&grown)?;
            assert_eq!(txn.remove_bindings_of(200)?, 2);
            assert_eq!(txn.remove_chunks(200)?, 2);
            txn.insert_chunk(200, 0, b"new")?;
            txn.remove_inode(200)?;
            Err(StoreError::internal("abort"))
        });
        assert!(result.is_err());

        mem.transaction("t", |txn| {
            assert_eq!(txn.inode(200)?.map(|i| i.size), Some(0));
            assert_eq!(txn.bindings_of(200)?.len(), 2);
            let chunks = txn.chunks_in_range(200, 0, 8)?;
            let data: Vec<_> = chunks.iter().map(|c| c.data.as_slice()).collect();
            assert_eq!(data, vec![&b"head"[..], &b"tail"[..]]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_panic_rolls_back() {
        let mem = MemoryBackend::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mem.transaction("t", |txn| -> StoreResult<()> {
                txn.put_inode(&file(200))?;
                panic!("mid-transaction");
            })
        }));
        assert!(outcome.is_err());

        let ino = mem.transaction("t", |txn| txn.inode(200)).unwrap();
        assert!(ino.is_none());
    }

    #[test]
    fn test_children_do_not_leak_across_parents() {
        let mem = MemoryBackend::new();
        let entries = mem
            .transaction("t", |txn| {
                txn.put_inode(&file(200))?;
                txn.put_inode(&file(201))?;
                txn.put_inode(&file(202))?;
                txn.insert_binding(&Binding::new(ROOT_INO - 1, "before", 200))?;
                txn.insert_binding(&Binding::new(ROOT_INO, "inside", 201))?;
                txn.insert_binding(&Binding::new(ROOT_INO + 1, "after", 202))?;
                txn.entries(ROOT_INO)
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "inside");
    }

    #[test]
    fn test_chunk_range_and_bulk_remove() {
        let mem = MemoryBackend::new();
        mem.transaction("t", |txn| {
            txn.insert_chunk(200, 0, &[1; 10])?;
            txn.insert_chunk(200, 20, &[2; 10])?;
            txn.insert_chunk(201, 0, &[3; 10])?;

            let hit: Vec<_> = txn
                .chunks_in_range(200, 9, 20)?
                .into_iter()
                .map(|c| c.offset)
                .collect();
            assert_eq!(hit, vec![0]);

            assert_eq!(txn.remove_chunks(200)?, 2);
            assert_eq!(txn.chunks_in_range(201, 0, 10)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_bindings_of_ordered() {
        let mem = MemoryBackend::new();
        let bindings = mem
            .transaction("t", |txn| {
                txn.put_inode(&file(200))?;
                txn.insert_binding(&Binding::new(300, "z", 200))?;
                txn.insert_binding(&Binding::new(ROOT_INO, "b", 200))?;
                txn.insert_binding(&Binding::new(ROOT_INO, "a", 200))?;
                txn.bindings_of(200)
            })
            .unwrap();
        let names: Vec<_> = bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "z"]);
    }
}
