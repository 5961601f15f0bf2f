//! Byte-range locking (§4.H). Thin adapter between a [`LockRequest`] and the
//! path-keyed [`LockingRegistry`]: lock/unlock acquire or drop a sidecar reference per call,
//! matching the registry's own refcounting (callers balance `Write`/`Read` against `Unlock`,
//! mirroring flock's "last close releases" semantics applied to byte ranges instead of whole
//! files).

use crate::error::Result;
use crate::locking::LockingRegistry;
use crate::stat::{LockRequest, LockType};

pub(crate) fn lock(locking: &LockingRegistry, req: &LockRequest) -> Result<()> {
    let path = req.handle.path(false)?;
    let result = locking.request(&path, req.offset, req.length, req.lock_type);
    if req.lock_type == LockType::Unlock {
        locking.release(&path);
    }
    result
}
