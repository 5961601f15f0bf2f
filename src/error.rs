//! Crate-wide error type.
//!
//! Every public operation either succeeds with a value or fails with a typed [`Error`]
//! carrying an [`ErrorKind`], the path involved (when known), and the underlying OS error.

use std::fmt;
use std::path::PathBuf;

/// Abstract error kinds, mapped from platform-specific error codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The named entity does not exist.
    NotFound,
    /// The entity already exists and the operation required it not to.
    AlreadyExists,
    /// The operation is not permitted under the current access controls.
    AccessDenied,
    /// A directory was not empty when an operation required it to be.
    NotEmpty,
    /// A non-directory was used where a directory was required.
    NotADirectory,
    /// A directory was used where a non-directory was required.
    IsADirectory,
    /// The handle does not refer to a symbolic link.
    NotALink,
    /// The source and destination straddle distinct filesystems/devices.
    CrossDevice,
    /// The underlying filesystem or platform does not support the operation.
    NotSupported,
    /// The arguments supplied to the operation are invalid.
    InvalidArgument,
    /// The handle is closed or otherwise unusable.
    BadHandle,
    /// A low-level I/O failure occurred.
    IoFailure,
    /// A read or write transferred fewer bytes than requested.
    TruncatedIo,
    /// The system is out of memory or file descriptors.
    OutOfMemory,
    /// The operation did not complete within the requested time.
    TimedOut,
    /// The operation would block and was requested not to.
    WouldBlock,
    /// The operation was interrupted and should usually be retried.
    Interrupted,
    /// Any other, unclassified failure.
    Unknown,
}

impl ErrorKind {
    /// Maps a raw POSIX errno to an abstract [`ErrorKind`].
    pub fn from_errno(errno: nix::errno::Errno) -> Self {
        use nix::errno::Errno;
        match errno {
            Errno::ENOENT => ErrorKind::NotFound,
            Errno::EEXIST => ErrorKind::AlreadyExists,
            Errno::EACCES | Errno::EPERM => ErrorKind::AccessDenied,
            Errno::ENOTEMPTY => ErrorKind::NotEmpty,
            Errno::ENOTDIR => ErrorKind::NotADirectory,
            Errno::EISDIR => ErrorKind::IsADirectory,
            Errno::EINVAL => ErrorKind::InvalidArgument,
            Errno::EXDEV => ErrorKind::CrossDevice,
            Errno::ENOSYS | Errno::EOPNOTSUPP => ErrorKind::NotSupported,
            Errno::EBADF => ErrorKind::BadHandle,
            Errno::ENOMEM | Errno::ENOSPC => ErrorKind::OutOfMemory,
            Errno::ETIMEDOUT => ErrorKind::TimedOut,
            Errno::EAGAIN | Errno::EWOULDBLOCK => ErrorKind::WouldBlock,
            Errno::EINTR => ErrorKind::Interrupted,
            _ => ErrorKind::IoFailure,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::NotEmpty => "directory not empty",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::IsADirectory => "is a directory",
            ErrorKind::NotALink => "not a symbolic link",
            ErrorKind::CrossDevice => "cross-device operation",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::BadHandle => "bad handle",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::TruncatedIo => "truncated I/O",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::WouldBlock => "would block",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// A typed, path-aware error produced by a dispatcher operation.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    path: Option<PathBuf>,
    source: Option<std::io::Error>,
}

impl Error {
    /// Builds an error carrying just a kind, with no path or OS cause.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            source: None,
        }
    }

    /// Attaches the path involved in the failing operation.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches the underlying OS error that produced this failure.
    #[must_use]
    pub fn with_source(mut self, source: std::io::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Builds an error from a raw `nix` errno, classifying it via [`ErrorKind::from_errno`].
    pub fn from_errno(errno: nix::errno::Errno) -> Self {
        Self::new(ErrorKind::from_errno(errno)).with_source(std::io::Error::from(errno))
    }

    /// The abstract kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The path involved in the operation, if known.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }
}

impl Clone for Error {
    /// Clones the kind and path; the underlying OS error (if any) is not `Clone` so it is
    /// summarized as an [`ErrorKind::Unknown`]-flavored `io::Error` built from the same kind.
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            path: self.path.clone(),
            source: self.source.as_ref().map(|e| std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", self.kind, path.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(errno: nix::errno::Errno) -> Self {
        Error::from_errno(errno)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = err
            .raw_os_error()
            .map(|raw| ErrorKind::from_errno(nix::errno::Errno::from_raw(raw)))
            .unwrap_or(ErrorKind::Unknown);
        Error::new(kind).with_source(err)
    }
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
