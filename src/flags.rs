//! Recognized flag sets (§6): open flags, metadata request masks, and per-op dispatch flags.

use bitflags::bitflags;

bitflags! {
    /// Flags recognized by the open-kind operations (file, directory, symlink).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileFlags: u32 {
        /// Request read access.
        const READ = 1 << 0;
        /// Request write access.
        const WRITE = 1 << 1;
        /// All writes extend the file regardless of offset.
        const APPEND = 1 << 2;
        /// Existing file is truncated to zero on open.
        const TRUNCATE = 1 << 3;
        /// Create the entity if it does not already exist.
        const CREATE = 1 << 4;
        /// Fail with `already_exists` if the entity is present.
        const CREATE_ONLY_IF_NOT_EXIST = 1 << 5;
        /// On supporting filesystems, create as transparently compressed.
        const CREATE_COMPRESSED = 1 << 6;
        /// Every write is persisted before the write operation completes.
        const ALWAYS_SYNC = 1 << 7;
        /// fsync at close if any writes occurred.
        const SYNC_ON_CLOSE = 1 << 8;
        /// Request unbuffered I/O; alignment constraints apply (§8).
        const OS_DIRECT = 1 << 9;
        /// Open the sidecar lock file instead of the target itself.
        const OS_LOCKABLE = 1 << 10;
        /// Remove the entity on last handle close.
        const DELETE_ON_CLOSE = 1 << 11;
        /// Hint that the file is ephemeral.
        const TEMPORARY_FILE = 1 << 12;
        /// Access-pattern hint: the file will be read/written sequentially.
        const WILL_BE_SEQUENTIALLY_ACCESSED = 1 << 13;
        /// Access-pattern hint: the file will be accessed in random order.
        const WILL_BE_RANDOMLY_ACCESSED = 1 << 14;
        /// Keep the containing directory's handle alive for this handle's lifetime.
        const HOLD_PARENT_OPEN = 1 << 15;
        /// Opt out of the dev/ino race-protection protocol.
        const NO_RACE_PROTECTION = 1 << 16;
        /// Do not publish this directory handle into the shared directory cache.
        const UNIQUE_DIRECTORY_HANDLE = 1 << 17;
        /// Do not mark newly created files as sparse.
        const NO_SPARSE = 1 << 18;
        /// Internal: the handle is being opened as a directory.
        const INT_OPENING_AS_DIR = 1 << 24;
        /// Internal: the handle is being opened as a symlink (no-follow).
        const INT_OPENING_AS_LINK = 1 << 25;
        /// Internal: request share-delete semantics to match POSIX unlink-while-open.
        const INT_FILE_SHARE_DELETE = 1 << 26;
        /// Internal: this open is a nested nameless reopen of an already-open parent.
        const INT_PARENT_OPEN_NESTED = 1 << 27;
    }
}

impl FileFlags {
    /// The creation policy implied by this flag set, used by the open implementation (§4.G).
    pub fn creation_policy(self) -> CreationPolicy {
        if self.contains(FileFlags::CREATE_ONLY_IF_NOT_EXIST) {
            CreationPolicy::OnlyIfNotExist
        } else if self.contains(FileFlags::TRUNCATE) {
            CreationPolicy::TruncateExisting
        } else if self.contains(FileFlags::CREATE) {
            CreationPolicy::CreateIfNeeded
        } else {
            CreationPolicy::OpenExisting
        }
    }
}

/// The four open-time creation policies named in §4.G.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CreationPolicy {
    /// Race-safe "create if not exists"; falls back to opening the existing entry.
    CreateIfNeeded,
    /// Fails with `already_exists` if the entity is present.
    OnlyIfNotExist,
    /// Opens an existing entity and truncates it; fails if missing.
    TruncateExisting,
    /// Opens an existing entity; never creates.
    OpenExisting,
}

bitflags! {
    /// Bitmask over the metadata fields a caller wants populated in a [`crate::stat::Stat`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MetadataFlags: u32 {
        const DEV = 1 << 0;
        const INO = 1 << 1;
        const TYPE = 1 << 2;
        const PERMS = 1 << 3;
        const NLINK = 1 << 4;
        const UID = 1 << 5;
        const GID = 1 << 6;
        const RDEV = 1 << 7;
        const ATIM = 1 << 8;
        const MTIM = 1 << 9;
        const CTIM = 1 << 10;
        const SIZE = 1 << 11;
        const ALLOCATED = 1 << 12;
        const BLOCKS = 1 << 13;
        const BLKSIZE = 1 << 14;
        const FLAGS = 1 << 15;
        const GEN = 1 << 16;
        const BIRTHTIM = 1 << 17;
        const SPARSE = 1 << 18;
        const COMPRESSED = 1 << 19;
        const REPARSE_POINT = 1 << 20;

        /// Minimal set needed for race-protection identity checks.
        const IDENTITY = Self::DEV.bits() | Self::INO.bits();
        /// Every field.
        const ALL = u32::MAX;
    }
}

bitflags! {
    /// Bitmask over the fields a caller wants populated in a [`crate::stat::StatfsResult`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FsMetadataFlags: u32 {
        const BSIZE = 1 << 0;
        const IOSIZE = 1 << 1;
        const BLOCKS = 1 << 2;
        const BFREE = 1 << 3;
        const BAVAIL = 1 << 4;
        const FILES = 1 << 5;
        const FFREE = 1 << 6;
        const OWNER = 1 << 7;
        const FSID = 1 << 8;
        const NAMEMAX = 1 << 9;
        const FSTYPENAME = 1 << 10;
        const MNTFROMNAME = 1 << 11;
        const MNTONNAME = 1 << 12;
        const FLAGS = 1 << 13;

        const ALL = u32::MAX;
    }
}

bitflags! {
    /// Feature flags reported inside a [`crate::stat::StatfsResult`] (§4.G/Statfs).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VolumeFeatures: u32 {
        const RDONLY = 1 << 0;
        const NOEXEC = 1 << 1;
        const NOSUID = 1 << 2;
        const ACLS = 1 << 3;
        const XATTR = 1 << 4;
        const COMPRESSION = 1 << 5;
        const EXTENTS = 1 << 6;
        const FILECOMPRESSION = 1 << 7;
    }
}

bitflags! {
    /// Dispatch behavior for an operation's task once its precondition publishes (§4.F).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AsyncOpFlags: u32 {
        /// Run the per-kind implementation synchronously on the completing thread.
        const IMMEDIATE = 1 << 0;
        /// The dispatcher does not auto-publish the future; the implementation must call
        /// `Dispatcher::complete` explicitly, typically from a kernel completion callback.
        const DETACHED_FUTURE = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_policy_precedence() {
        let f = FileFlags::CREATE | FileFlags::CREATE_ONLY_IF_NOT_EXIST;
        assert_eq!(f.creation_policy(), CreationPolicy::OnlyIfNotExist);
        assert_eq!(
            FileFlags::TRUNCATE.creation_policy(),
            CreationPolicy::TruncateExisting
        );
        assert_eq!(FileFlags::empty().creation_policy(), CreationPolicy::OpenExisting);
    }

    #[test]
    fn identity_mask_covers_dev_and_ino() {
        assert!(MetadataFlags::IDENTITY.contains(MetadataFlags::DEV));
        assert!(MetadataFlags::IDENTITY.contains(MetadataFlags::INO));
        assert!(!MetadataFlags::IDENTITY.contains(MetadataFlags::SIZE));
    }
}
