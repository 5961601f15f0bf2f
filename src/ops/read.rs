//! Scatter read (§4.G "Read").

use std::io::IoSliceMut;
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::sys::uio::preadv;

use crate::error::{Error, ErrorKind, Result};
use crate::handle::Handle;
use crate::stat::{Direction, IoRequest, IoSpan};

/// The platform's `IOV_MAX`-equivalent chunk size for a single scatter syscall.
const IOV_MAX: usize = 1024;

/// Reads `req.buffers` starting at `req.offset`, iterating by `IOV_MAX`-sized chunks,
/// retrying transient `EINTR`, and failing as [`ErrorKind::TruncatedIo`] if fewer bytes were
/// transferred than requested. Invokes `on_buffer` after each per-buffer transfer.
pub(crate) fn read(
    req: &mut IoRequest<'_>,
    mut on_buffer: impl FnMut(Direction, &Handle, u64, usize, usize, Option<&Error>, usize),
) -> Result<()> {
    let total_requested = req.total_len();
    let handle = req.handle.clone();
    let buffers_total = req.buffers.len();
    let mut offset = req.offset;
    let mut transferred_total = 0usize;

    let mut index = 0;
    while index < req.buffers.len() {
        let chunk_end = (index + IOV_MAX).min(req.buffers.len());
        let mut iovecs: Vec<IoSliceMut<'_>> = req.buffers[index..chunk_end]
            .iter_mut()
            .map(|span| match span {
                IoSpan::ReadInto(buf) => IoSliceMut::new(buf),
                IoSpan::WriteFrom(_) => unreachable!("read() called with a write-direction IoRequest"),
            })
            .collect();

        let fd = unsafe { BorrowedFd::borrow_raw(handle.raw_fd()) };
        let transferred = loop {
            match preadv(fd, &mut iovecs, offset as i64) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    let err = Error::from(e);
                    on_buffer(Direction::Read, &handle, offset, index, buffers_total, Some(&err), 0);
                    return Err(err);
                }
            }
        };

        let chunk_len: usize = iovecs.iter().map(|s| s.len()).sum();
        for (i, span_index) in (index..chunk_end).enumerate() {
            let span_len = iovecs[i].len();
            on_buffer(Direction::Read, &handle, offset, span_index, buffers_total, None, span_len);
        }

        offset += transferred as u64;
        transferred_total += transferred;
        if transferred < chunk_len {
            break;
        }
        index = chunk_end;
    }

    if transferred_total < total_requested {
        return Err(Error::new(ErrorKind::TruncatedIo));
    }
    Ok(())
}
