//! The race-safe handle model (§3, §4.C).
//!
//! A [`Handle`] owns zero or one native descriptor plus the bookkeeping needed to treat a
//! `(dev, ino)` pair as the arbiter of identity across concurrent renames: see
//! ["Race-safety protocol"](#race-safety-protocol) below.

use std::ffi::OsString;
use std::os::fd::BorrowedFd;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{self, AtFlags, OFlag};
use nix::sys::stat::{self, FileStat, Mode};
use nix::unistd;
use parking_lot::Mutex;

use crate::dircache::DirectoryCache;
use crate::error::{Error, ErrorKind, Result};
use crate::flags::FileFlags;
use crate::stat::{Kind, Stat};

/// A device identifier, captured once at open and never reused for comparisons after that.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DeviceId(pub u64);

/// An inode identifier, captured once at open.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct InodeId(pub u64);

/// Tri-valued open state returned by [`Handle::is_open`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenState {
    Closed,
    Open,
    OpenDirectory,
}

/// What kind of object a handle was opened against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectKind {
    File,
    Directory,
    Symlink,
}

/// A request describing where to create a hard link or perform an atomic rename.
#[derive(Debug, Clone)]
pub struct PathRequest {
    /// Destination path; interpreted relative to `base_dir` if not absolute.
    pub path: PathBuf,
    /// Directory the destination is relative to, when `path` is not absolute.
    pub base_dir: Option<Handle>,
}

impl PathRequest {
    /// A destination path with no explicit base directory (absolute, or relative to the
    /// process's current working directory).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base_dir: None,
        }
    }

    /// Attaches a base directory handle the destination path is resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: Handle) -> Self {
        self.base_dir = Some(base_dir);
        self
    }
}

/// Idempotent owner of a single native file descriptor.
///
/// Mirrors the close-once-on-drop discipline every fd wrapper in this crate needs: a
/// redundant `close()` call is a silent no-op rather than a double-close.
#[derive(Debug)]
struct RawDescriptor {
    fd: RawFd,
    closed: AtomicBool,
}

impl RawDescriptor {
    fn new(fd: RawFd) -> Self {
        Self {
            fd,
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        unistd::close(self.fd).map_err(Error::from)
    }

    fn raw(&self) -> RawFd {
        self.fd
    }
}

impl Drop for RawDescriptor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to close descriptor {}: {e}", self.fd);
        }
    }
}

struct HandleInner {
    fd: RawDescriptor,
    kind: ObjectKind,
    flags: FileFlags,
    path_cache: Mutex<Option<PathBuf>>,
    device_id: DeviceId,
    inode_id: InodeId,
    /// Strong reference to the containing directory's handle, used for `*at`-style syscalls
    /// and for `int_verify_my_inode`'s rename-race recheck.
    parent_dir_handle: Option<Handle>,
    write_count_since_sync: AtomicU64,
    delete_on_close: AtomicBool,
    sync_on_close: bool,
    unlinked: AtomicBool,
    /// Index of the next entry `readdir` should return; advanced by the enumeration
    /// implementation, reset by `restart=true` (§4.G "Directory enumeration").
    readdir_cursor: AtomicU64,
    /// Set only for a directory handle published into the directory cache (§4.D): the cache
    /// it lives in, plus the key it is currently stored under, so a rename of this handle can
    /// relocate its own cache entry instead of leaving it keyed under a stale path.
    cache_entry: Mutex<Option<(Arc<DirectoryCache>, PathBuf)>>,
}

/// A race-safe reference to an opened file, directory, or symlink (§4.C).
///
/// Cloning a `Handle` is cheap: it shares the underlying descriptor and bookkeeping via
/// `Arc`. The descriptor is closed when the last clone is dropped.
#[derive(Clone)]
pub struct Handle(Arc<HandleInner>);

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.0.kind)
            .field("device_id", &self.0.device_id)
            .field("inode_id", &self.0.inode_id)
            .field("path_cache", &self.0.path_cache.lock())
            .finish()
    }
}

/// A non-owning reference to a [`Handle`], used by the directory cache (§4.D) so a cached
/// directory handle is evicted the moment its last real owner drops it.
#[derive(Clone)]
pub struct WeakHandle(std::sync::Weak<HandleInner>);

impl WeakHandle {
    /// Upgrades to a strong [`Handle`], if the underlying descriptor is still referenced
    /// somewhere else.
    pub fn upgrade(&self) -> Option<Handle> {
        self.0.upgrade().map(Handle)
    }

    /// Whether this weak reference can still be upgraded.
    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Handle {
    /// A non-owning reference suitable for caching without keeping the handle alive.
    pub(crate) fn downgrade(&self) -> WeakHandle {
        WeakHandle(Arc::downgrade(&self.0))
    }

    /// Wraps an already-open descriptor, capturing its `(dev, ino)` identity.
    ///
    /// Called exclusively by the open-kind implementations in `crate::ops::open` once the
    /// underlying `openat`/`mkdirat`/`symlinkat` syscall has succeeded.
    pub(crate) fn from_raw(
        fd: RawFd,
        kind: ObjectKind,
        flags: FileFlags,
        path: Option<PathBuf>,
        parent_dir_handle: Option<Handle>,
    ) -> Result<Self> {
        let st = stat::fstat(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }).map_err(|e| {
            Error::from(e).with_path(path.clone().unwrap_or_default())
        })?;
        let inner = HandleInner {
            fd: RawDescriptor::new(fd),
            kind,
            flags,
            path_cache: Mutex::new(path),
            device_id: DeviceId(st.st_dev as u64),
            inode_id: InodeId(st.st_ino as u64),
            parent_dir_handle,
            write_count_since_sync: AtomicU64::new(0),
            delete_on_close: AtomicBool::new(flags.contains(FileFlags::DELETE_ON_CLOSE)),
            sync_on_close: flags.contains(FileFlags::SYNC_ON_CLOSE),
            unlinked: AtomicBool::new(false),
            readdir_cursor: AtomicU64::new(0),
            cache_entry: Mutex::new(None),
        };
        Ok(Handle(Arc::new(inner)))
    }

    /// Records that this handle is the live occupant of `key` in `cache`, so a later rename of
    /// this handle can relocate its own entry. Called only for directory handles the cache
    /// just published via `DirectoryCache::get_or_insert`.
    pub(crate) fn attach_cache_entry(&self, cache: Arc<DirectoryCache>, key: PathBuf) {
        *self.0.cache_entry.lock() = Some((cache, key));
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.0.fd.raw()
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    pub(crate) fn flags(&self) -> FileFlags {
        self.0.flags
    }

    /// The `(dev, ino)` pair captured at open, used as the arbiter of identity (invariant 4).
    pub fn identity(&self) -> (DeviceId, InodeId) {
        (self.0.device_id, self.0.inode_id)
    }

    pub(crate) fn note_write(&self) {
        self.0.write_count_since_sync.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_sync(&self) {
        self.0.write_count_since_sync.store(0, Ordering::Relaxed);
    }

    pub(crate) fn dirty_since_sync(&self) -> bool {
        self.0.write_count_since_sync.load(Ordering::Relaxed) > 0
    }

    pub(crate) fn readdir_cursor(&self) -> u64 {
        self.0.readdir_cursor.load(Ordering::Relaxed)
    }

    pub(crate) fn set_readdir_cursor(&self, value: u64) {
        self.0.readdir_cursor.store(value, Ordering::Relaxed);
    }

    pub(crate) fn set_delete_on_close(&self, value: bool) {
        self.0.delete_on_close.store(value, Ordering::Relaxed);
    }

    fn race_protected(&self) -> bool {
        !self.0.flags.contains(FileFlags::NO_RACE_PROTECTION)
    }

    /// Tri-valued open state: a handle is considered closed only once `close()` has returned.
    pub fn is_open(&self) -> OpenState {
        if self.0.fd.closed.load(Ordering::SeqCst) {
            OpenState::Closed
        } else if self.0.kind == ObjectKind::Directory {
            OpenState::OpenDirectory
        } else {
            OpenState::Open
        }
    }

    /// Closes the handle. Idempotent: closing an already-closed handle returns `Ok(())`.
    ///
    /// Applies `sync_on_close`/`delete_on_close` policy before releasing the descriptor.
    pub fn close(&self) -> Result<()> {
        if self.0.fd.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.0.sync_on_close && self.dirty_since_sync() {
            if let Err(e) = unistd::fsync(self.borrowed_fd()) {
                log::error!("sync-on-close failed for {:?}: {e}", self.path(false)?);
                let _ = e;
            }
        }
        if self.0.delete_on_close.load(Ordering::Relaxed) && !self.0.unlinked.load(Ordering::Relaxed)
        {
            if let Err(e) = self.unlink() {
                log::warn!("delete-on-close unlink failed: {e}");
            }
        }
        self.0.fd.close()
    }

    pub(crate) fn borrowed_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        unsafe { std::os::fd::BorrowedFd::borrow_raw(self.0.fd.raw()) }
    }

    /// Returns the last-known path. With `refresh = true`, asks the OS to reconfirm it via
    /// `/proc/self/fd` and updates the cache (and, for directories, the directory cache's
    /// key) if it changed.
    pub fn path(&self, refresh: bool) -> Result<PathBuf> {
        if refresh {
            match std::fs::read_link(format!("/proc/self/fd/{}", self.0.fd.raw())) {
                Ok(p) => {
                    *self.0.path_cache.lock() = Some(p.clone());
                    return Ok(p);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    *self.0.path_cache.lock() = None;
                    return Ok(PathBuf::new());
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
        Ok(self.0.path_cache.lock().clone().unwrap_or_default())
    }

    /// Returns metadata containing at least the requested fields.
    pub fn direntry(&self, wanted: crate::flags::MetadataFlags) -> Result<Stat> {
        let st = stat::fstat(self.borrowed_fd()).map_err(Error::from)?;
        Ok(stat_from_native(&st, wanted))
    }

    /// For a symlink handle, returns its target path.
    pub fn target(&self) -> Result<PathBuf> {
        if self.0.kind != ObjectKind::Symlink {
            return Err(Error::new(ErrorKind::NotALink));
        }
        let path = self.path(false)?;
        let link = fcntl::readlink(&path).map_err(Error::from)?;
        Ok(PathBuf::from(OsString::from_vec(link.into_vec())))
    }

    /// Creates a hard link at `req.path`. Prefers race-free link-by-handle (`linkat` with
    /// `AT_EMPTY_PATH` via `/proc/self/fd`) and falls back to a name-based link through the
    /// captured path, whose TOCTOU window is documented in §9 Open Question 1.
    pub fn link(&self, req: PathRequest) -> Result<()> {
        if self.0.kind == ObjectKind::Directory {
            return Err(Error::new(ErrorKind::NotSupported));
        }
        let (dst_dir_fd, dst_leaf) = resolve_dest(&req)?;
        let proc_path = format!("/proc/self/fd/{}", self.0.fd.raw());
        let proc_cstr = std::ffi::CString::new(proc_path).expect("no interior NUL");
        unistd::linkat(
            fcntl::AT_FDCWD,
            proc_cstr.as_c_str(),
            at_fd(dst_dir_fd),
            dst_leaf.as_path(),
            unistd::LinkatFlags::SymlinkFollow,
        )
        .map_err(|e| Error::from(e).with_path(req.path.clone()))
    }

    /// Removes the entity named by this handle. On platforms where an open file cannot be
    /// unlinked immediately, renames it to a hidden random name in the nearest writable
    /// ancestor and marks it for deletion on final close — this crate targets POSIX, where
    /// unlink-while-open is directly supported, so that fallback only ever triggers if the
    /// direct unlink itself fails with `EPERM`/`EACCES` on an unusual mount.
    pub fn unlink(&self) -> Result<()> {
        if self.race_protected() {
            self.verify_my_inode()?;
        }
        let path = self.path(false)?;
        if path.as_os_str().is_empty() {
            self.0.unlinked.store(true, Ordering::Relaxed);
            return Ok(());
        }
        let flags = if self.0.kind == ObjectKind::Directory {
            unistd::UnlinkatFlags::RemoveDir
        } else {
            unistd::UnlinkatFlags::NoRemoveDir
        };
        match self.unlink_at(&path, flags) {
            Ok(()) => {
                self.0.unlinked.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::AccessDenied) && self.0.kind == ObjectKind::File => {
                self.hide_for_deferred_delete(&path)
            }
            Err(e) => Err(e),
        }
    }

    fn unlink_at(&self, path: &Path, flags: unistd::UnlinkatFlags) -> Result<()> {
        if let Some(parent) = &self.0.parent_dir_handle {
            let leaf = path.file_name().ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?;
            unistd::unlinkat(unsafe { BorrowedFd::borrow_raw(parent.raw_fd()) }, leaf, flags)
                .map_err(|e| Error::from(e).with_path(path.to_path_buf()))
        } else {
            unistd::unlinkat(fcntl::AT_FDCWD, path, flags).map_err(|e| Error::from(e).with_path(path.to_path_buf()))
        }
    }

    /// Renames the entity to a `.afiod`-prefixed random hidden leaf in its own directory and
    /// marks delete-on-close so the final close removes it. See the "Persisted artifacts"
    /// section (§6) for the naming pattern enumerators filter on.
    fn hide_for_deferred_delete(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?;
        let hidden = parent.join(random_delete_pending_name());
        self.atomic_relink(PathRequest::new(hidden))?;
        self.set_delete_on_close(true);
        Ok(())
    }

    /// Atomically renames this entity to `req.path`, updating the path cache on success.
    pub fn atomic_relink(&self, req: PathRequest) -> Result<()> {
        if self.race_protected() {
            self.verify_my_inode()?;
        }
        let old_path = self.path(false)?;
        let (dst_dir_fd, dst_leaf) = resolve_dest(&req)?;
        let old_dir_fd = self.0.parent_dir_handle.as_ref().map(Handle::raw_fd);
        // Relative to a parent dir fd, only the leaf name resolves correctly; with no parent
        // handle the full (absolute) path is needed since `renameat`'s `AT_FDCWD` fallback
        // would otherwise resolve a bare leaf name against the process's cwd, not this path.
        let old_component: PathBuf = match old_dir_fd {
            Some(_) => old_path
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?,
            None => old_path.clone(),
        };
        fcntl::renameat(at_fd(old_dir_fd), old_component.as_path(), at_fd(dst_dir_fd), dst_leaf.as_path())
            .map_err(|e| Error::from(e).with_path(req.path.clone()))?;
        *self.0.path_cache.lock() = Some(req.path.clone());

        let mut cache_entry = self.0.cache_entry.lock();
        if let Some((cache, old_key)) = cache_entry.as_mut() {
            let new_key = req.path.canonicalize().unwrap_or_else(|_| req.path.clone());
            cache.relocate(old_key, &new_key, self.clone());
            *old_key = new_key;
        }
        Ok(())
    }

    /// Returns a memory-mapped region descriptor, or `None` if this handle's platform or
    /// object kind cannot support mapping (directories and symlinks never can).
    pub fn map_file(&self, length: usize, offset: u64, read_only: bool) -> Result<Option<MappedRegion>> {
        if self.0.kind != ObjectKind::File {
            return Ok(None);
        }
        MappedRegion::new(self, length, offset, read_only).map(Some)
    }

    /// Implements `int_verify_my_inode()` (§4.C "Inode verification"): re-`lstat`s the leaf
    /// through the containing directory up to 10 times, matching `(dev, ino)` against the
    /// identity captured at open. Covers concurrent directory-rename races.
    fn verify_my_inode(&self) -> Result<()> {
        let path = self.path(false)?;
        let leaf = match path.file_name() {
            Some(l) => l.to_owned(),
            None => return Ok(()),
        };
        let Some(parent) = &self.0.parent_dir_handle else {
            return Ok(());
        };
        const ATTEMPTS: usize = 10;
        for attempt in 0..ATTEMPTS {
            match stat::fstatat(parent.borrowed_fd(), leaf.as_os_str(), AtFlags::AT_SYMLINK_NOFOLLOW) {
                Ok(st) if st.st_dev as u64 == self.0.device_id.0 && st.st_ino as u64 == self.0.inode_id.0 => {
                    return Ok(());
                }
                Ok(_) | Err(Errno::ENOENT) => {
                    if attempt + 1 == ATTEMPTS {
                        return Err(Error::new(ErrorKind::NotFound).with_path(path));
                    }
                    std::thread::sleep(Duration::from_millis(1 << attempt.min(6)));
                }
                Err(e) => return Err(Error::from(e).with_path(path)),
            }
        }
        Err(Error::new(ErrorKind::NotFound).with_path(path))
    }
}

/// A memory-mapped view over a file handle's contents.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: *mut libc::c_void,
    len: usize,
    read_only: bool,
}

// SAFETY: the mapping is only ever read through `as_slice`/`as_mut_slice`, which enforce
// the same aliasing rules as any other `&[u8]`/`&mut [u8]` borrow of `self`.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    fn new(handle: &Handle, length: usize, offset: u64, read_only: bool) -> Result<Self> {
        let prot = if read_only {
            libc::PROT_READ
        } else {
            libc::PROT_READ | libc::PROT_WRITE
        };
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                length,
                prot,
                libc::MAP_SHARED,
                handle.raw_fd(),
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::from(std::io::Error::last_os_error()));
        }
        Ok(Self { ptr, len: length, read_only })
    }

    /// A read-only view of the mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.cast(), self.len) }
    }

    /// A writable view of the mapped bytes, for a region opened with `read_only: false`.
    /// Returns `None` for a read-only mapping, whose `PROT_READ`-only pages would fault on write.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if self.read_only {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(self.ptr.cast(), self.len) })
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            if libc::munmap(self.ptr, self.len) != 0 {
                log::error!("munmap failed: {}", std::io::Error::last_os_error());
            }
        }
    }
}

/// Adapts this crate's `Option<RawFd>` ("no explicit dir handle" = cwd-relative) convention to
/// the `AsFd`-based directory-fd parameter nix's `*at` syscalls now take.
fn at_fd(fd: Option<RawFd>) -> BorrowedFd<'static> {
    match fd {
        Some(fd) => unsafe { BorrowedFd::borrow_raw(fd) },
        None => fcntl::AT_FDCWD,
    }
}

fn resolve_dest(req: &PathRequest) -> Result<(Option<RawFd>, PathBuf)> {
    crate::path::validate(&req.path)?;
    if req.path.is_absolute() {
        return Ok((None, req.path.clone()));
    }
    match &req.base_dir {
        Some(dir) => Ok((Some(dir.raw_fd()), req.path.clone())),
        None => Ok((None, req.path.clone())),
    }
}

fn random_delete_pending_name() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        ^ (std::process::id() as u128) << 64
        ^ (&0u8 as *const u8 as usize as u128);
    let mut s = String::with_capacity(37);
    s.push_str(".afiod");
    let mut x = seed;
    for _ in 0..32 {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        let nibble = ((x >> 60) & 0xf) as u32;
        s.push(std::char::from_digit(nibble, 16).unwrap());
    }
    s
}

/// Matches a leaf name against the delete-pending sentinel pattern `.afiod` + 32 hex chars.
pub fn is_delete_pending_name(leaf: &std::ffi::OsStr) -> bool {
    let Some(s) = leaf.to_str() else { return false };
    let Some(hex) = s.strip_prefix(".afiod") else {
        return false;
    };
    hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

pub(crate) fn stat_from_native(st: &FileStat, wanted: crate::flags::MetadataFlags) -> Stat {
    use crate::flags::MetadataFlags as M;
    let mut out = Stat {
        have: wanted,
        ..Stat::default()
    };
    out.dev = Some(DeviceId(st.st_dev as u64));
    out.ino = Some(InodeId(st.st_ino as u64));
    out.kind = mode_to_kind(st.st_mode);
    out.perms = Some((st.st_mode & 0o7777) as u32);
    out.nlink = Some(st.st_nlink as u64);
    out.uid = Some(st.st_uid);
    out.gid = Some(st.st_gid);
    out.rdev = Some(st.st_rdev as u64);
    out.size = Some(st.st_size as u64);
    out.blocks = Some(st.st_blocks as u64);
    out.allocated_size = Some(st.st_blocks as u64 * 512);
    out.blksize = Some(st.st_blksize as u32);
    out.atime = Some(system_time(st.st_atime, st.st_atime_nsec));
    out.mtime = Some(system_time(st.st_mtime, st.st_mtime_nsec));
    out.ctime = Some(system_time(st.st_ctime, st.st_ctime_nsec));
    out.have |= M::DEV | M::INO | M::TYPE | M::PERMS | M::NLINK | M::UID | M::GID | M::RDEV | M::SIZE
        | M::BLOCKS | M::ALLOCATED | M::BLKSIZE | M::ATIM | M::MTIM | M::CTIM;
    out
}

fn mode_to_kind(mode: libc::mode_t) -> Option<Kind> {
    let ifmt = mode & libc::S_IFMT;
    Some(match ifmt {
        libc::S_IFREG => Kind::RegularFile,
        libc::S_IFDIR => Kind::Directory,
        libc::S_IFLNK => Kind::Symlink,
        libc::S_IFIFO => Kind::NamedPipe,
        libc::S_IFCHR => Kind::CharDevice,
        libc::S_IFBLK => Kind::BlockDevice,
        libc::S_IFSOCK => Kind::Socket,
        _ => return None,
    })
}

fn system_time(secs: i64, nanos: i64) -> std::time::SystemTime {
    if secs >= 0 {
        std::time::UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        std::time::UNIX_EPOCH - Duration::new((-secs) as u64, 0)
    }
}

/// Translates this crate's [`crate::flags::FileFlags`] into an `nix` open mode/flags pair.
pub(crate) fn native_open_flags(flags: FileFlags) -> (OFlag, Mode) {
    let mut oflag = OFlag::empty();
    match (flags.contains(FileFlags::READ), flags.contains(FileFlags::WRITE)) {
        (true, true) => oflag |= OFlag::O_RDWR,
        (false, true) => oflag |= OFlag::O_WRONLY,
        _ => oflag |= OFlag::O_RDONLY,
    }
    if flags.contains(FileFlags::APPEND) {
        oflag |= OFlag::O_APPEND;
    }
    if flags.contains(FileFlags::OS_DIRECT) {
        oflag |= OFlag::O_DIRECT;
    }
    if flags.contains(FileFlags::INT_OPENING_AS_DIR) {
        oflag |= OFlag::O_DIRECTORY;
    }
    if flags.contains(FileFlags::INT_OPENING_AS_LINK) {
        oflag |= OFlag::O_NOFOLLOW | OFlag::O_PATH;
    }
    oflag |= OFlag::O_NOCTTY | OFlag::O_CLOEXEC;
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    (oflag, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_pending_name_roundtrip() {
        let name = random_delete_pending_name();
        assert!(is_delete_pending_name(std::ffi::OsStr::new(&name)));
        assert!(!is_delete_pending_name(std::ffi::OsStr::new("regular_file")));
        assert!(!is_delete_pending_name(std::ffi::OsStr::new(".afiodtooshort")));
    }

    #[test]
    fn native_open_flags_read_write() {
        let (oflag, _) = native_open_flags(FileFlags::READ | FileFlags::WRITE);
        assert!(oflag.contains(OFlag::O_RDWR));
        let (oflag, _) = native_open_flags(FileFlags::WRITE);
        assert!(oflag.contains(OFlag::O_WRONLY));
        let (oflag, _) = native_open_flags(FileFlags::empty());
        assert!(oflag.contains(OFlag::O_RDONLY));
    }
}
