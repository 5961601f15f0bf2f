//! Scatter/gather write (§4.G "Write").

use std::io::IoSlice;
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::sys::uio::{pwritev, writev};
use nix::unistd;

use crate::error::{Error, ErrorKind, Result};
use crate::flags::FileFlags;
use crate::handle::Handle;
use crate::stat::{Direction, IoRequest, IoSpan};

const IOV_MAX: usize = 1024;

/// Writes `req.buffers` starting at `req.offset`. If the handle is in append mode, uses the
/// non-positioned `writev` primitive instead of `pwritev` — not every platform honors
/// positional writes on append-mode descriptors.
pub(crate) fn write(
    req: &IoRequest<'_>,
    mut on_buffer: impl FnMut(Direction, &Handle, u64, usize, usize, Option<&Error>, usize),
) -> Result<()> {
    let total_requested = req.total_len();
    let handle = req.handle.clone();
    let buffers_total = req.buffers.len();
    let append = handle.flags().contains(FileFlags::APPEND);
    let mut offset = req.offset;
    let mut transferred_total = 0usize;

    let mut index = 0;
    while index < req.buffers.len() {
        let chunk_end = (index + IOV_MAX).min(req.buffers.len());
        let iovecs: Vec<IoSlice<'_>> = req.buffers[index..chunk_end]
            .iter()
            .map(|span| match span {
                IoSpan::WriteFrom(buf) => IoSlice::new(buf),
                IoSpan::ReadInto(_) => unreachable!("write() called with a read-direction IoRequest"),
            })
            .collect();
        let chunk_len: usize = iovecs.iter().map(|s| s.len()).sum();

        let fd = unsafe { BorrowedFd::borrow_raw(handle.raw_fd()) };
        let transferred = loop {
            let result = if append {
                writev(fd, &iovecs)
            } else {
                pwritev(fd, &iovecs, offset as i64)
            };
            match result {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    let err = Error::from(e);
                    on_buffer(Direction::Write, &handle, offset, index, buffers_total, Some(&err), 0);
                    return Err(err);
                }
            }
        };

        for (i, span_index) in (index..chunk_end).enumerate() {
            on_buffer(Direction::Write, &handle, offset, span_index, buffers_total, None, iovecs[i].len());
        }

        handle.note_write();
        if handle.flags().contains(FileFlags::ALWAYS_SYNC) {
            nix::unistd::fsync(fd).map_err(Error::from)?;
            handle.note_sync();
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
