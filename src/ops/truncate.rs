//! Truncate (§4.G "Truncate").

use nix::unistd;

use crate::error::{Error, Result};
use crate::handle::Handle;

/// Sets `handle`'s length to exactly `new_size` bytes.
pub(crate) fn truncate(handle: &Handle, new_size: u64) -> Result<()> {
    unistd::ftruncate(handle.borrowed_fd(), new_size as i64).map_err(Error::from)
}
