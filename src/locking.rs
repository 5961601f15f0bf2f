//! The locking sub-registry (§4.H): a uniform advisory byte-range lock model built on a
//! sidecar `<target>.lockfile`, since native byte-range lock semantics diverge too much across
//! platforms (POSIX locks are per-process and vanish on any descriptor close; Windows locks
//! are mandatory) to expose directly.
//!
//! A magic byte at offset `(1 << 62) - 1` in the sidecar acts as a process-wide reference
//! count: every participant holds a shared (read) lock on it for as long as it references the
//! sidecar; the last participant to drop its reference attempts to upgrade to an exclusive
//! (write) lock on that same byte, and success means it is safe to unlink the sidecar.

use std::collections::HashMap;
use std::os::fd::{BorrowedFd, IntoRawFd};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use parking_lot::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::stat::LockType;

/// The magic byte offset reserved for the reference-count lock; straddling requests are
/// clamped away from it.
const MAGIC_OFFSET: u64 = (1u64 << 62) - 1;

struct Sidecar {
    fd: RawFd,
    path: PathBuf,
    refcount: usize,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.fd);
    }
}

/// Process-wide registry of sidecar lock files, one per locked target path.
pub struct LockingRegistry {
    sidecars: Mutex<HashMap<PathBuf, Arc<Mutex<Sidecar>>>>,
}

impl LockingRegistry {
    pub fn new() -> Self {
        Self {
            sidecars: Mutex::new(HashMap::new()),
        }
    }

    fn sidecar_path(target: &Path) -> PathBuf {
        let mut os = target.as_os_str().to_owned();
        os.push(".lockfile");
        PathBuf::from(os)
    }

    fn open_or_join(&self, target: &Path) -> Result<Arc<Mutex<Sidecar>>> {
        let sidecar_path = Self::sidecar_path(target);
        let mut sidecars = self.sidecars.lock();
        if let Some(existing) = sidecars.get(&sidecar_path) {
            existing.lock().refcount += 1;
            return Ok(Arc::clone(existing));
        }
        let fd = fcntl::open(
            &sidecar_path,
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_CLOEXEC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| Error::from(e).with_path(sidecar_path.clone()))?
        .into_raw_fd();
        take_refcount_lock(fd, &sidecar_path)?;
        let sidecar = Arc::new(Mutex::new(Sidecar {
            fd,
            path: sidecar_path.clone(),
            refcount: 1,
        }));
        sidecars.insert(sidecar_path, Arc::clone(&sidecar));
        Ok(sidecar)
    }

    /// Acquires or releases a byte-range lock on `target`, opening (and reference-counting)
    /// the sidecar lock file as needed. Requests straddling the reference-count byte are
    /// clamped away from it.
    pub fn request(&self, target: &Path, mut offset: u64, mut length: u64, lock_type: LockType) -> Result<()> {
        if offset <= MAGIC_OFFSET && offset + length > MAGIC_OFFSET {
            length = MAGIC_OFFSET - offset;
        }
        if length == 0 {
            offset = offset.min(MAGIC_OFFSET.saturating_sub(1));
        }
        match lock_type {
            LockType::Unlock => {
                let Some(fd) = self.existing_fd(target) else {
                    return Ok(());
                };
                unlock_range(fd, offset, length)
            }
            LockType::Read => {
                let fd = self.open_or_join(target)?.lock().fd;
                lock_range(fd, offset, length, false)
            }
            LockType::Write => {
                let fd = self.open_or_join(target)?.lock().fd;
                lock_range(fd, offset, length, true)
            }
        }
    }

    /// The fd of an already-joined sidecar, without joining a new reference. Used by `Unlock`,
    /// which rides the reference the initiating `Read`/`Write` already took.
    fn existing_fd(&self, target: &Path) -> Option<RawFd> {
        let sidecar_path = Self::sidecar_path(target);
        let sidecars = self.sidecars.lock();
        sidecars.get(&sidecar_path).map(|entry| entry.lock().fd)
    }

    /// Releases this participant's reference to `target`'s sidecar. When the last reference
    /// drops, attempts the refcount-byte upgrade and, on success, unlinks the sidecar.
    pub fn release(&self, target: &Path) {
        let sidecar_path = Self::sidecar_path(target);
        let mut sidecars = self.sidecars.lock();
        let Some(entry) = sidecars.get(&sidecar_path).cloned() else {
            return;
        };
        let should_retire = {
            let mut guard = entry.lock();
            guard.refcount -= 1;
            guard.refcount == 0
        };
        if !should_retire {
            return;
        }
        sidecars.remove(&sidecar_path);
        drop(sidecars);
        let guard = entry.lock();
        if try_upgrade_refcount_lock(guard.fd) {
            if let Err(e) = std::fs::remove_file(&guard.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to remove sidecar {}: {e}", guard.path.display());
                }
            }
        }
    }
}

impl Default for LockingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn take_refcount_lock(fd: RawFd, path: &Path) -> Result<()> {
    retry_eintr(|| {
        fcntl::fcntl(
            unsafe { BorrowedFd::borrow_raw(fd) },
            fcntl::FcntlArg::F_SETLK(&flock(libc::F_RDLCK as libc::c_short, MAGIC_OFFSET as i64, 1)),
        )
    })
    .map_err(|e| Error::from(e).with_path(path.to_path_buf()))
    .map(|_| ())
}

fn try_upgrade_refcount_lock(fd: RawFd) -> bool {
    retry_eintr(|| {
        fcntl::fcntl(
            unsafe { BorrowedFd::borrow_raw(fd) },
            fcntl::FcntlArg::F_SETLK(&flock(libc::F_WRLCK as libc::c_short, MAGIC_OFFSET as i64, 1)),
        )
    })
    .is_ok()
}

fn lock_range(fd: RawFd, offset: u64, length: u64, exclusive: bool) -> Result<()> {
    let kind = if exclusive { libc::F_WRLCK } else { libc::F_RDLCK };
    retry_eintr(|| {
        fcntl::fcntl(
            unsafe { BorrowedFd::borrow_raw(fd) },
            fcntl::FcntlArg::F_SETLKW(&flock(kind as libc::c_short, offset as i64, length as i64)),
        )
    })
    .map_err(Error::from)
    .map(|_| ())
}

fn unlock_range(fd: RawFd, offset: u64, length: u64) -> Result<()> {
    // Unlocking a never-locked range succeeds silently (§4.H).
    retry_eintr(|| {
        fcntl::fcntl(
            unsafe { BorrowedFd::borrow_raw(fd) },
            fcntl::FcntlArg::F_SETLK(&flock(libc::F_UNLCK as libc::c_short, offset as i64, length as i64)),
        )
    })
    .map_err(Error::from)
    .map(|_| ())
}

fn flock(kind: libc::c_short, start: libc::off_t, len: libc::off_t) -> libc::flock {
    libc::flock {
        l_type: kind,
        l_whence: libc::SEEK_SET as libc::c_short,
        l_start: start,
        l_len: len,
        l_pid: 0,
    }
}

fn retry_eintr<T>(mut f: impl FnMut() -> std::result::Result<T, Errno>) -> std::result::Result<T, Errno> {
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// A "locking is not supported for this kind of handle" error, used by directory/symlink
/// handles that forward lock requests they cannot honor.
pub fn unsupported() -> Error {
    Error::new(ErrorKind::NotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_suffix() {
        let p = LockingRegistry::sidecar_path(Path::new("/tmp/foo"));
        assert_eq!(p, PathBuf::from("/tmp/foo.lockfile"));
    }

    #[test]
    fn lock_then_unlock_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::write(&target, b"data").unwrap();
        let registry = LockingRegistry::new();
        registry.request(&target, 0, 4, LockType::Write).unwrap();
        registry.request(&target, 0, 4, LockType::Unlock).unwrap();
        registry.release(&target);
        assert!(!dir.path().join("target.lockfile").exists());
    }
}
