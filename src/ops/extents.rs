//! Extent enumeration (§4.G "Extent enumeration").

use nix::errno::Errno;
use nix::unistd::{lseek, Whence};

use crate::error::{Error, ErrorKind, Result};
use crate::handle::Handle;
use crate::stat::{Extent, ExtentList};

/// Walks `handle` alternating between `SEEK_DATA` and `SEEK_HOLE`, coalescing the resulting
/// extents. Falls back to a single extent spanning `[0, size)` if the filesystem rejects the
/// query outright (`EINVAL`), matching a volume with no native extent query support.
pub(crate) fn extents(handle: &Handle) -> Result<ExtentList> {
    let size = file_size(handle)?;
    if size == 0 {
        return Ok(ExtentList::default());
    }

    let fd = handle.borrowed_fd();
    let mut extents = Vec::new();
    let mut pos: i64 = 0;
    loop {
        if pos >= size as i64 {
            break;
        }
        let data_start = match lseek(fd, pos, Whence::SeekData) {
            Ok(off) => off,
            Err(Errno::ENXIO) => break,
            Err(Errno::EINVAL) => return Ok(ExtentList(vec![Extent { offset: 0, length: size }])),
            Err(e) => return Err(Error::from(e)),
        };
        let data_end = match lseek(fd, data_start, Whence::SeekHole) {
            Ok(off) => off,
            Err(e) => return Err(Error::from(e)),
        };
        extents.push(Extent {
            offset: data_start as u64,
            length: (data_end - data_start) as u64,
        });
        pos = data_end;
    }
    // Restore the file position; `lseek` above moved it as a side effect of the query.
    let _ = lseek(fd, 0, Whence::SeekSet);
    Ok(ExtentList::from_sorted(extents))
}

fn file_size(handle: &Handle) -> Result<u64> {
    let st = nix::sys::stat::fstat(handle.borrowed_fd()).map_err(Error::from)?;
    if st.st_size < 0 {
        return Err(Error::new(ErrorKind::IoFailure));
    }
    Ok(st.st_size as u64)
}
