//! Immutable filesystem path values.
//!
//! A [`NativePath`] wraps a platform path with two normalization modes: a *direct* form
//! (as supplied, minimally validated) and a *canonical* form (resolved via the OS, suitable
//! for identity comparisons and directory-cache keys). Comparisons are always exact; no case
//! folding is performed.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// An immutable filesystem path, held in its as-supplied (direct) form.
///
/// Construction is pure and reentrant beyond validating that the path contains no interior
/// NUL byte, which every `*at`-style syscall this crate issues would otherwise reject.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct NativePath(PathBuf);

impl NativePath {
    /// Wraps `path` as a direct-form [`NativePath`].
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument).with_path(path));
        }
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            if path.as_os_str().as_bytes().contains(&0) {
                return Err(Error::new(ErrorKind::InvalidArgument).with_path(path));
            }
        }
        Ok(Self(path))
    }

    /// The direct form, as supplied by the caller.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Whether this path is absolute.
    pub fn is_absolute(&self) -> bool {
        self.0.is_absolute()
    }

    /// The final path component, if any.
    pub fn leaf(&self) -> Option<&std::ffi::OsStr> {
        self.0.file_name()
    }

    /// The parent of this path, if any.
    pub fn parent(&self) -> Option<&Path> {
        self.0.parent()
    }

    /// Resolves the platform-native canonical form of this path by asking the OS to resolve
    /// every symlink and `.`/`..` component. Pure with respect to process state: it may call
    /// into the OS but never mutates any global.
    ///
    /// # Errors
    /// Returns [`ErrorKind::NotFound`] if any path component does not exist.
    pub fn canonicalize(&self) -> Result<PathBuf> {
        self.0
            .canonicalize()
            .map_err(|e| Error::from(e).with_path(self.0.clone()))
    }

    /// Joins a single relative leaf component onto this path, for building a `(parent, leaf)`
    /// pair suitable for an `*at`-style syscall.
    pub fn join_leaf(&self, leaf: impl AsRef<Path>) -> PathBuf {
        self.0.join(leaf)
    }
}

/// Validates `path` at a system boundary (operation submission): rejects the empty path and
/// interior NULs the way [`NativePath::new`] does, without requiring callers to thread a
/// `NativePath` through every signature that currently takes a plain `PathBuf`.
pub(crate) fn validate(path: &Path) -> Result<()> {
    NativePath::new(path.to_path_buf()).map(|_| ())
}

impl fmt::Debug for NativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for NativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.display(), f)
    }
}

impl AsRef<Path> for NativePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(NativePath::new("").is_err());
    }

    #[test]
    fn rejects_interior_nul() {
        use std::os::unix::ffi::OsStrExt;
        let bytes = b"foo\0bar";
        let os = std::ffi::OsStr::from_bytes(bytes);
        assert!(NativePath::new(PathBuf::from(os)).is_err());
    }

    #[test]
    fn leaf_and_parent() {
        let p = NativePath::new("/a/b/c").unwrap();
        assert_eq!(p.leaf().unwrap(), "c");
        assert_eq!(p.parent().unwrap(), Path::new("/a/b"));
    }
}
