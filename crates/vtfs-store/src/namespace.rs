//! Directory and hard-link operations.
//!
//! Each function runs inside one backend transaction. Mode, link count and
//! size are stored once on the inode, so every binding of an inode sees
//! the same values without rewriting siblings.

use crate::alloc;
use crate::backend::Txn;
use crate::error::{StoreError, StoreResult};
use crate::types::{Binding, DirEntry, Ino, Inode, MAX_NAME_LEN, ROOT_INO, dir_mode};

/// Check a single path component.
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StoreError::invalid_argument(format!("bad name {name:?}")));
    }
    if name.contains(['/', '\0']) {
        return Err(StoreError::invalid_argument(format!(
            "name contains a separator: {name:?}"
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::NameTooLong);
    }
    Ok(())
}

/// Resolve an inode number. The root always resolves.
pub fn getattr(txn: &mut dyn Txn, ino: Ino) -> StoreResult<Inode> {
    if ino == ROOT_INO {
        return Ok(Inode::root());
    }
    txn.inode(ino)?.ok_or_else(|| StoreError::ino_not_found(ino))
}

/// Resolve an inode that must be a directory.
fn directory(txn: &mut dyn Txn, ino: Ino) -> StoreResult<Inode> {
    let inode = getattr(txn, ino)?;
    if !inode.is_dir() {
        return Err(StoreError::not_a_directory(ino));
    }
    Ok(inode)
}

/// Children of `parent`. A missing or empty directory lists as empty.
pub fn list(txn: &mut dyn Txn, parent: Ino) -> StoreResult<Vec<DirEntry>> {
    txn.entries(parent)
}

/// Resolve one name in a directory.
pub fn lookup(txn: &mut dyn Txn, parent: Ino, name: &str) -> StoreResult<DirEntry> {
    validate_name(name)?;
    let binding = txn
        .binding(parent, name)?
        .ok_or_else(|| StoreError::entry_not_found(parent, name))?;
    let inode = txn.inode(binding.ino)?.ok_or_else(|| {
        StoreError::internal(format!("binding {name:?} in {parent} has no inode"))
    })?;
    Ok(DirEntry::from_parts(binding, &inode))
}

/// Bind a fresh inode with `mode` at (parent, name).
pub fn create(txn: &mut dyn Txn, parent: Ino, name: &str, mode: u32) -> StoreResult<DirEntry> {
    validate_name(name)?;
    directory(txn, parent)?;
    if txn.binding(parent, name)?.is_some() {
        return Err(StoreError::already_exists(parent, name));
    }

    let inode = Inode::new(alloc::allocate(txn)?, mode);
    let binding = Binding::new(parent, name, inode.ino);
    txn.put_inode(&inode)?;
    txn.insert_binding(&binding)?;

    tracing::debug!(parent, name, ino = inode.ino, mode, "created");
    Ok(DirEntry::from_parts(binding, &inode))
}

/// [`create`] with the directory bit forced into `mode`.
pub fn mkdir(txn: &mut dyn Txn, parent: Ino, name: &str, mode: u32) -> StoreResult<DirEntry> {
    create(txn, parent, name, dir_mode(mode))
}

/// Remove an inode and every name bound to it.
///
/// Backs both delete and rmdir. Directories must have no children.
pub fn delete(txn: &mut dyn Txn, ino: Ino) -> StoreResult<()> {
    if ino == ROOT_INO {
        return Err(StoreError::busy(ino));
    }
    let inode = txn.inode(ino)?.ok_or_else(|| StoreError::ino_not_found(ino))?;
    if inode.is_dir() && txn.has_children(ino)? {
        return Err(StoreError::not_empty(ino));
    }

    let bindings = txn.remove_bindings_of(ino)?;
    txn.remove_inode(ino)?;
    let chunks = if inode.is_dir() {
        0
    } else {
        txn.remove_chunks(ino)?
    };

    tracing::debug!(ino, bindings, chunks, "deleted");
    Ok(())
}

/// Bind an existing file inode at (parent, name).
pub fn link(txn: &mut dyn Txn, old_ino: Ino, parent: Ino, name: &str) -> StoreResult<DirEntry> {
    validate_name(name)?;
    let mut inode = getattr(txn, old_ino)?;
    if inode.is_dir() {
        return Err(StoreError::is_a_directory(old_ino));
    }
    directory(txn, parent)?;
    if txn.binding(parent, name)?.is_some() {
        return Err(StoreError::already_exists(parent, name));
    }

    let binding = Binding::new(parent, name, old_ino);
    txn.insert_binding(&binding)?;
    inode.nlink += 1;
    txn.put_inode(&inode)?;

    tracing::debug!(ino = old_ino, parent, name, nlink = inode.nlink, "linked");
    Ok(DirEntry::from_parts(binding, &inode))
}

/// Remove one name of `ino`.
///
/// Callers identify the file only by inode number, so when it has several
/// names the first in (parent, name) order is removed.
pub fn unlink(txn: &mut dyn Txn, ino: Ino) -> StoreResult<()> {
    if ino == ROOT_INO {
        return Err(StoreError::busy(ino));
    }
    let inode = txn.inode(ino)?.ok_or_else(|| StoreError::ino_not_found(ino))?;
    if inode.is_dir() {
        return Err(StoreError::is_a_directory(ino));
    }
    let bindings = txn.bindings_of(ino)?;
    let target = bindings
        .first()
        .ok_or_else(|| StoreError::ino_not_found(ino))?;
    txn.remove_binding(target.parent, &target.name)?;
    release(txn, inode, bindings.len() - 1)
}

/// Remove the binding at (parent, name).
pub fn unlink_at(txn: &mut dyn Txn, parent: Ino, name: &str) -> StoreResult<()> {
    let entry = lookup(txn, parent, name)?;
    if entry.is_dir() {
        return Err(StoreError::is_a_directory(entry.ino));
    }
    let inode = Inode {
        ino: entry.ino,
        mode: entry.mode,
        nlink: entry.nlink,
        size: entry.size,
    };
    let remaining = txn.bindings_of(entry.ino)?.len().saturating_sub(1);
    txn.remove_binding(parent, name)?;
    release(txn, inode, remaining)
}

/// Settle an inode after one of its bindings went away.
fn release(txn: &mut dyn Txn, mut inode: Inode, remaining: usize) -> StoreResult<()> {
    let expected = inode.nlink.saturating_sub(1) as usize;
    if remaining != expected {
        tracing::warn!(
            ino = inode.ino,
            nlink = inode.nlink,
            remaining,
            "link count drifted from bindings; using binding count"
        );
    }

    if remaining > 0 {
        inode.nlink = u32::try_from(remaining)
            .map_err(|_| StoreError::internal(format!("ino {} has too many links", inode.ino)))?;
        txn.put_inode(&inode)?;
        tracing::debug!(ino = inode.ino, nlink = inode.nlink, "unlinked");
    } else {
        txn.remove_inode(inode.ino)?;
        let chunks = txn.remove_chunks(inode.ino)?;
        tracing::debug!(ino = inode.ino, chunks, "unlinked last name");
    }
    Ok(())
}
