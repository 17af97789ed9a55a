//! Inode number allocation.
//!
//! Allocation reads the tenant's current maximum inside the caller's
//! transaction, so it is serialized with the insert that consumes the
//! number. The inode table's (token, ino) key rejects any duplicate.

use crate::backend::Txn;
use crate::error::{StoreError, StoreResult};
use crate::types::{FIRST_INO, Ino};

/// Next free inode number: one past the tenant's maximum, or [`FIRST_INO`].
pub fn allocate(txn: &mut dyn Txn) -> StoreResult<Ino> {
    match txn.max_ino()? {
        None => Ok(FIRST_INO),
        Some(max) => max
            .checked_add(1)
            .map(|next| next.max(FIRST_INO))
            .ok_or_else(|| StoreError::internal("inode numbers exhausted")),
    }
}
