//! Sparse chunked file content.
//!
//! Content is a set of non-overlapping chunks per inode. Reads overlay the
//! chunks onto a zeroed buffer, so holes read as zero. Writes replace every
//! chunk they touch with one new chunk; see [`OverlapPolicy`] for what
//! happens to the untouched remainder of those chunks.

use crate::backend::Txn;
use crate::config::OverlapPolicy;
use crate::error::{StoreError, StoreResult};
use crate::namespace;
use crate::types::{Ino, Inode};

/// Largest byte offset the chunk table can hold.
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Resolve an inode that must hold content.
fn file(txn: &mut dyn Txn, ino: Ino) -> StoreResult<Inode> {
    let inode = namespace::getattr(txn, ino)?;
    if inode.is_dir() {
        return Err(StoreError::is_a_directory(ino));
    }
    Ok(inode)
}

/// Read up to `length` bytes at `offset`, clamped to the file size and to
/// `max_len`.
pub fn read(
    txn: &mut dyn Txn,
    ino: Ino,
    offset: u64,
    length: u64,
    max_len: u64,
) -> StoreResult<Vec<u8>> {
    let inode = file(txn, ino)?;
    if offset >= inode.size {
        return Ok(Vec::new());
    }

    let end = offset.saturating_add(length.min(max_len)).min(inode.size);
    let len = usize::try_from(end - offset).map_err(|_| StoreError::FileTooLarge)?;
    let mut buf = vec![0u8; len];

    for chunk in txn.chunks_in_range(ino, offset, end)? {
        let start = chunk.offset.max(offset);
        let stop = chunk.end().min(end);
        let src = (start - chunk.offset) as usize;
        let dst = (start - offset) as usize;
        let n = (stop - start) as usize;
        buf[dst..dst + n].copy_from_slice(&chunk.data[src..src + n]);
    }

    Ok(buf)
}

/// Store `data` at `offset`, growing the file if it ends past the size.
pub fn write(
    txn: &mut dyn Txn,
    ino: Ino,
    offset: u64,
    data: &[u8],
    policy: OverlapPolicy,
) -> StoreResult<()> {
    let mut inode = file(txn, ino)?;
    if data.is_empty() {
        return Ok(());
    }
    let write_end = offset
        .checked_add(data.len() as u64)
        .filter(|end| *end <= MAX_OFFSET)
        .ok_or(StoreError::FileTooLarge)?;

    let mut discarded = 0u64;
    for chunk in txn.chunks_in_range(ino, offset, write_end)? {
        txn.remove_chunk(ino, chunk.offset)?;
        let head = offset.saturating_sub(chunk.offset);
        let tail = chunk.end().saturating_sub(write_end);
        match policy {
            OverlapPolicy::Discard => discarded += head + tail,
            OverlapPolicy::Splice => {
                if head > 0 {
                    txn.insert_chunk(ino, chunk.offset, &chunk.data[..head as usize])?;
                }
                if tail > 0 {
                    let cut = (write_end - chunk.offset) as usize;
                    txn.insert_chunk(ino, write_end, &chunk.data[cut..])?;
                }
            }
        }
    }
    txn.insert_chunk(ino, offset, data)?;

    if write_end > inode.size {
        inode.size = write_end;
        txn.put_inode(&inode)?;
    }

    tracing::debug!(ino, offset, len = data.len(), size = inode.size, discarded, "wrote");
    Ok(())
}
