//! Core store types.
//!
//! An [`Inode`] owns mode, link count and size. A [`Binding`] maps a
//! (parent, name) pair to an inode; several bindings may share one inode
//! (hard links). [`DirEntry`] is the joined view handed back to callers.

use serde::{Deserialize, Serialize};

/// Inode number.
pub type Ino = u64;

/// Root inode, pre-provisioned for every tenant.
pub const ROOT_INO: Ino = 100;

/// First inode number handed out to a tenant with no inodes.
pub const FIRST_INO: Ino = 200;

/// Maximum length of a single name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Directory type bit.
pub const S_IFDIR: u32 = 0o040000;

/// Regular file type bit.
pub const S_IFREG: u32 = 0o100000;

/// Permission bits.
pub const PERM_MASK: u32 = 0o777;

/// Mode used for the synthesized root directory.
pub const ROOT_MODE: u32 = S_IFDIR | 0o755;

/// File type, derived from the mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileKind {
    /// Classify a mode. Anything without the directory bit holds content.
    pub fn from_mode(mode: u32) -> Self {
        if mode & S_IFDIR != 0 {
            FileKind::Directory
        } else {
            FileKind::File
        }
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// Mode for a new directory: permission bits kept, directory bit forced.
pub fn dir_mode(mode: u32) -> u32 {
    (mode & PERM_MASK) | S_IFDIR
}

/// Per-tenant inode record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub ino: Ino,
    /// POSIX mode bits (type + permissions).
    pub mode: u32,
    /// Number of bindings referencing this inode.
    pub nlink: u32,
    /// Logical size in bytes; always 0 for directories.
    pub size: u64,
}

impl Inode {
    /// A fresh inode with one link and no content.
    pub fn new(ino: Ino, mode: u32) -> Self {
        Self {
            ino,
            mode,
            nlink: 1,
            size: 0,
        }
    }

    /// The tenant root. Never stored.
    pub fn root() -> Self {
        Self::new(ROOT_INO, ROOT_MODE)
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }
}

/// A (parent, name) → inode association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub parent: Ino,
    pub name: String,
    pub ino: Ino,
}

impl Binding {
    pub fn new(parent: Ino, name: impl Into<String>, ino: Ino) -> Self {
        Self {
            parent,
            name: name.into(),
            ino,
        }
    }
}

/// Directory entry: a binding joined with its inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub parent: Ino,
    /// Entry name (not a path).
    pub name: String,
    pub ino: Ino,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
}

impl DirEntry {
    /// Join a binding with the inode it references.
    pub fn from_parts(binding: Binding, inode: &Inode) -> Self {
        Self {
            parent: binding.parent,
            name: binding.name,
            ino: inode.ino,
            mode: inode.mode,
            nlink: inode.nlink,
            size: inode.size,
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }
}

/// A stored contiguous byte run of one inode's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(offset: u64, data: Vec<u8>) -> Self {
        Self { offset, data }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// Returns true if this chunk intersects `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.offset < end && self.end() > start
    }
}
