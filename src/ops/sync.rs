//! Sync (§4.G "Sync").

use nix::unistd;

use crate::error::{Error, Result};
use crate::handle::Handle;

/// Persists `handle`'s writes via `fsync` and resets its dirty-since-sync counter.
pub(crate) fn sync(handle: &Handle) -> Result<()> {
    unistd::fsync(handle.borrowed_fd()).map_err(Error::from)?;
    handle.note_sync();
    Ok(())
}
