//! Open (file / directory / symlink), §4.G "Open".

use std::os::fd::{BorrowedFd, IntoRawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::dircache::DirectoryCache;
use crate::error::{Error, ErrorKind, Result};
use crate::flags::{CreationPolicy, FileFlags};
use crate::handle::{native_open_flags, Handle, ObjectKind};

fn open_relative(dir: Option<&Handle>, path: &Path, oflag: OFlag, mode: Mode) -> std::result::Result<i32, Errno> {
    match dir {
        Some(dir) if path.is_relative() => {
            fcntl::openat(unsafe { BorrowedFd::borrow_raw(dir.raw_fd()) }, path, oflag, mode).map(IntoRawFd::into_raw_fd)
        }
        _ => fcntl::open(path, oflag, mode).map(IntoRawFd::into_raw_fd),
    }
}

/// Opens (and, per `flags.creation_policy()`, creates) a regular file.
pub(crate) fn open_file(path: &Path, flags: FileFlags, base_dir: Option<Handle>) -> Result<Handle> {
    let (mut oflag, mode) = native_open_flags(flags);
    let policy = flags.creation_policy();
    match policy {
        CreationPolicy::CreateIfNeeded => oflag |= OFlag::O_CREAT,
        CreationPolicy::OnlyIfNotExist => oflag |= OFlag::O_CREAT | OFlag::O_EXCL,
        CreationPolicy::TruncateExisting => oflag |= OFlag::O_TRUNC,
        CreationPolicy::OpenExisting => {}
    }

    let fd = match open_relative(base_dir.as_ref(), path, oflag, mode) {
        Ok(fd) => fd,
        Err(Errno::EEXIST) if policy == CreationPolicy::CreateIfNeeded => {
            // Lost the creation race: someone else created it first. Fall back to opening
            // the now-existing entry, matching the "race-safe create if not exists" policy.
            let retry_flags = oflag & !(OFlag::O_CREAT | OFlag::O_EXCL);
            open_relative(base_dir.as_ref(), path, retry_flags, mode).map_err(|e| Error::from(e).with_path(path))?
        }
        Err(e) => return Err(Error::from(e).with_path(path)),
    };

    Handle::from_raw(fd, ObjectKind::File, flags, Some(path.to_path_buf()), base_dir)
}

/// Opens (and optionally creates) a directory, publishing shareable handles into the
/// directory cache (§4.D).
pub(crate) fn open_directory(
    path: &Path,
    flags: FileFlags,
    base_dir: Option<Handle>,
    cache_enabled: bool,
    dircache: &Arc<DirectoryCache>,
) -> Result<Handle> {
    let canonical = path.canonicalize().ok();
    let shareable =
        cache_enabled && !flags.contains(FileFlags::UNIQUE_DIRECTORY_HANDLE) && flags.creation_policy() == CreationPolicy::OpenExisting;

    if shareable {
        if let Some(canonical) = &canonical {
            if let Some(cached) = dircache.get(canonical) {
                return Ok(cached);
            }
        }
    }

    let (mut oflag, mode) = native_open_flags(flags | FileFlags::INT_OPENING_AS_DIR);
    match flags.creation_policy() {
        CreationPolicy::CreateIfNeeded => {
            if let Err(e) = unistd::mkdir(path, mode) {
                if e != Errno::EEXIST {
                    return Err(Error::from(e).with_path(path));
                }
            }
        }
        CreationPolicy::OnlyIfNotExist => {
            unistd::mkdir(path, mode).map_err(|e| Error::from(e).with_path(path))?;
        }
        CreationPolicy::TruncateExisting => return Err(Error::new(ErrorKind::IsADirectory).with_path(path)),
        CreationPolicy::OpenExisting => {}
    }
    oflag |= OFlag::O_DIRECTORY;

    let fd = open_relative(base_dir.as_ref(), path, oflag, Mode::empty()).map_err(|e| Error::from(e).with_path(path))?;
    let handle = Handle::from_raw(fd, ObjectKind::Directory, flags, Some(path.to_path_buf()), base_dir)?;

    if shareable {
        if let Some(canonical) = canonical.or_else(|| path.canonicalize().ok()) {
            handle.attach_cache_entry(Arc::clone(dircache), canonical.clone());
            return Ok(dircache.get_or_insert(&canonical, handle));
        }
    }
    Ok(handle)
}

/// Creates a symlink at `path` pointing at `target` (when given), or opens an existing one.
pub(crate) fn open_symlink(path: &Path, target: Option<&Path>, flags: FileFlags, base_dir: Option<Handle>) -> Result<Handle> {
    if let Some(target) = target {
        match base_dir.as_ref() {
            Some(dir) if path.is_relative() => {
                unistd::symlinkat(target, unsafe { BorrowedFd::borrow_raw(dir.raw_fd()) }, path)
                    .map_err(|e| Error::from(e).with_path(path))?;
            }
            _ => {
                unistd::symlinkat(target, fcntl::AT_FDCWD, path).map_err(|e| Error::from(e).with_path(path))?;
            }
        }
    }

    let (mut oflag, mode) = native_open_flags(flags | FileFlags::INT_OPENING_AS_LINK);
    oflag |= OFlag::O_NOFOLLOW | OFlag::O_PATH;
    let fd = open_relative(base_dir.as_ref(), path, oflag, mode).map_err(|e| Error::from(e).with_path(path))?;
    Handle::from_raw(fd, ObjectKind::Symlink, flags, Some(path.to_path_buf()), base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_if_needed_survives_preexisting_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let handle = open_file(&path, FileFlags::READ | FileFlags::CREATE, None).unwrap();
        assert_eq!(handle.kind(), ObjectKind::File);
    }

    #[test]
    fn create_only_if_not_exist_fails_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let err = open_file(
            &path,
            FileFlags::READ | FileFlags::WRITE | FileFlags::CREATE_ONLY_IF_NOT_EXIST,
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn open_directory_shares_cached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("d");
        std::fs::create_dir(&sub).unwrap();
        let cache = Arc::new(DirectoryCache::new());
        let a = open_directory(&sub, FileFlags::READ, None, true, &cache).unwrap();
        let b = open_directory(&sub, FileFlags::READ, None, true, &cache).unwrap();
        assert_eq!(a.identity(), b.identity());
    }
}
