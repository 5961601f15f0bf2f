//! Zero / punch-hole (§4.G "Zero / punch-hole").

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::stat::{Extent, ExtentList};

const ZERO_CHUNK: usize = 64 * 1024;

/// Deallocates (or, failing that, zero-fills) each `(offset, length)` range. Ranges are
/// coalesced first if already ordered and touching (§4.G).
pub(crate) fn zero_range(handle: &Handle, ranges: &[(u64, u64)]) -> Result<()> {
    let extents: Vec<Extent> = ranges.iter().map(|&(offset, length)| Extent { offset, length }).collect();
    let ExtentList(coalesced) = ExtentList::from_sorted(extents);

    for extent in coalesced {
        if try_punch_hole(handle, extent.offset, extent.length).is_err() {
            zero_fill(handle, extent.offset, extent.length)?;
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn try_punch_hole(handle: &Handle, offset: u64, length: u64) -> std::result::Result<(), ()> {
    let ret = unsafe {
        libc::fallocate(
            handle.raw_fd(),
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            length as libc::off_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(not(target_os = "linux"))]
fn try_punch_hole(_handle: &Handle, _offset: u64, _length: u64) -> std::result::Result<(), ()> {
    Err(())
}

fn zero_fill(handle: &Handle, offset: u64, length: u64) -> Result<()> {
    let zeros = vec![0u8; ZERO_CHUNK.min(length.max(1) as usize)];
    let mut remaining = length;
    let mut pos = offset;
    while remaining > 0 {
        let chunk = remaining.min(zeros.len() as u64) as usize;
        let buffers = vec![std::io::IoSlice::new(&zeros[..chunk])];
        let fd = handle.borrowed_fd();
        let written = nix::sys::uio::pwritev(fd, &buffers, pos as i64).map_err(Error::from)?;
        pos += written as u64;
        remaining -= written as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fill_writes_requested_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![0xffu8; 4096]).unwrap();
        let fd = nix::fcntl::open(&path, nix::fcntl::OFlag::O_RDWR, nix::sys::stat::Mode::empty())
            .unwrap()
            .into_raw_fd();
        let handle = Handle::from_raw(
            fd,
            crate::handle::ObjectKind::File,
            crate::flags::FileFlags::READ | crate::flags::FileFlags::WRITE,
            Some(path.clone()),
            None,
        )
        .unwrap();
        zero_fill(&handle, 0, 4096).unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert!(contents.iter().all(|&b| b == 0));
    }
}
