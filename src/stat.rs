//! Value types shared across operations: [`Kind`], [`Stat`], [`StatfsResult`],
//! [`DirectoryEntry`], [`IoRequest`], [`ExtentList`] and [`LockRequest`] (§3).

use std::time::SystemTime;

use smallvec::SmallVec;

use crate::flags::{MetadataFlags, VolumeFeatures};
use crate::handle::DeviceId;
use crate::handle::Handle;
use crate::handle::InodeId;

/// The kind of filesystem entity a [`Stat`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    /// Regular file.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Named pipe (FIFO).
    NamedPipe,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Unix domain socket.
    Socket,
}

impl Kind {
    /// Converts a `std::fs::FileType` to a [`Kind`], where representable.
    pub fn from_std(file_type: std::fs::FileType) -> Option<Self> {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_file() {
            Some(Kind::RegularFile)
        } else if file_type.is_dir() {
            Some(Kind::Directory)
        } else if file_type.is_symlink() {
            Some(Kind::Symlink)
        } else if file_type.is_fifo() {
            Some(Kind::NamedPipe)
        } else if file_type.is_socket() {
            Some(Kind::Socket)
        } else if file_type.is_char_device() {
            Some(Kind::CharDevice)
        } else if file_type.is_block_device() {
            Some(Kind::BlockDevice)
        } else {
            None
        }
    }
}

/// Filesystem metadata for a single entity. Implementations populate only the fields named
/// in the caller's [`MetadataFlags`] request, though they may over-report.
#[derive(Clone, Debug, Default)]
pub struct Stat {
    /// Which fields below are authoritative.
    pub have: MetadataFlags,
    pub dev: Option<DeviceId>,
    pub ino: Option<InodeId>,
    pub kind: Option<Kind>,
    pub perms: Option<u32>,
    pub nlink: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub rdev: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
    pub birthtime: Option<SystemTime>,
    pub size: Option<u64>,
    pub allocated_size: Option<u64>,
    pub blocks: Option<u64>,
    pub blksize: Option<u32>,
    pub flags: Option<u32>,
    pub gen: Option<u64>,
    pub sparse: Option<bool>,
    pub compressed: Option<bool>,
    pub reparse_point: Option<bool>,
}

/// A single directory entry returned by directory enumeration.
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    /// The entry's leaf name, relative to the enumerated directory.
    pub leafname: std::ffi::OsString,
    /// Whatever metadata the enumeration primitive could cheaply report.
    pub stat: Stat,
}

/// Volume-level statistics and feature flags (§4.G/Statfs).
#[derive(Clone, Debug, Default)]
pub struct StatfsResult {
    pub bsize: Option<u64>,
    pub iosize: Option<u64>,
    pub blocks: Option<u64>,
    pub bfree: Option<u64>,
    pub bavail: Option<u64>,
    pub files: Option<u64>,
    pub ffree: Option<u64>,
    pub namemax: Option<u64>,
    pub fstypename: Option<String>,
    pub mntfromname: Option<String>,
    pub mntonname: Option<String>,
    pub features: VolumeFeatures,
}

/// Direction of an [`IoRequest`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

/// One scatter/gather span: either a writable destination or a readable source buffer.
#[derive(Debug)]
pub enum IoSpan<'a> {
    /// A destination for a read.
    ReadInto(&'a mut [u8]),
    /// A source for a write.
    WriteFrom(&'a [u8]),
}

impl IoSpan<'_> {
    /// The length, in bytes, of this span.
    pub fn len(&self) -> usize {
        match self {
            IoSpan::ReadInto(b) => b.len(),
            IoSpan::WriteFrom(b) => b.len(),
        }
    }

    /// Whether this span is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A scatter/gather I/O request: a handle, a starting offset, and an ordered list of spans.
///
/// Most requests touch one to a handful of buffers, so the list is inlined up to three spans
/// before spilling to the heap (mirroring the small-vector-of-iovecs pattern used when
/// concatenating writev buffers).
pub struct IoRequest<'a> {
    pub handle: Handle,
    pub offset: u64,
    pub buffers: SmallVec<[IoSpan<'a>; 3]>,
    pub direction: Direction,
}

impl<'a> IoRequest<'a> {
    /// Builds a read request into the given destination buffers.
    pub fn read(handle: Handle, offset: u64, buffers: Vec<&'a mut [u8]>) -> Self {
        Self {
            handle,
            offset,
            buffers: buffers.into_iter().map(IoSpan::ReadInto).collect(),
            direction: Direction::Read,
        }
    }

    /// Builds a write request from the given source buffers.
    pub fn write(handle: Handle, offset: u64, buffers: Vec<&'a [u8]>) -> Self {
        Self {
            handle,
            offset,
            buffers: buffers.into_iter().map(IoSpan::WriteFrom).collect(),
            direction: Direction::Write,
        }
    }

    /// Total length, in bytes, across all spans.
    pub fn total_len(&self) -> usize {
        self.buffers.iter().map(IoSpan::len).sum()
    }
}

/// A contiguous allocated range within a file, as reported by extent enumeration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Extent {
    pub offset: u64,
    pub length: u64,
}

/// An ordered, non-overlapping, coalesced list of [`Extent`]s.
#[derive(Clone, Debug, Default)]
pub struct ExtentList(pub Vec<Extent>);

impl ExtentList {
    /// Inserts extents in order and coalesces any that are already adjacent and ordered.
    pub fn from_sorted(mut extents: Vec<Extent>) -> Self {
        extents.sort_by_key(|e| e.offset);
        let mut out: Vec<Extent> = Vec::with_capacity(extents.len());
        for e in extents {
            if let Some(last) = out.last_mut() {
                if last.offset + last.length == e.offset {
                    last.length += e.length;
                    continue;
                }
            }
            out.push(e);
        }
        ExtentList(out)
    }
}

/// The three byte-range lock operation types (§3, §4.H).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockType {
    Read,
    Write,
    Unlock,
}

/// A byte-range lock request against a handle.
#[derive(Debug)]
pub struct LockRequest {
    pub handle: Handle,
    pub offset: u64,
    pub length: u64,
    pub lock_type: LockType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_list_coalesces_adjacent() {
        let extents = vec![
            Extent { offset: 0, length: 10 },
            Extent { offset: 10, length: 5 },
            Extent { offset: 20, length: 4 },
        ];
        let coalesced = ExtentList::from_sorted(extents).0;
        assert_eq!(
            coalesced,
            vec![
                Extent { offset: 0, length: 15 },
                Extent { offset: 20, length: 4 },
            ]
        );
    }

    #[test]
    fn extent_list_keeps_gaps() {
        let extents = vec![Extent { offset: 0, length: 4 }, Extent { offset: 100, length: 4 }];
        let coalesced = ExtentList::from_sorted(extents).0;
        assert_eq!(coalesced.len(), 2);
    }
}
