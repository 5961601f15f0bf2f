//! The operation record (§4.E): a monotonic id, a kind tag, a task, a result slot, and the
//! list of completions chained against it.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::error::Error;
use crate::flags::AsyncOpFlags;
use crate::handle::Handle;
use crate::stat::{DirectoryEntry, ExtentList, Stat, StatfsResult};

/// A process-wide monotonically increasing operation id (invariant 1). Wraps safely over
/// decades of sustained allocation, matching the 64-bit counter the spec calls for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OperationId(pub u64);

pub(crate) struct IdAllocator(AtomicU64);

impl IdAllocator {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> OperationId {
        OperationId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// The tag identifying what kind of work an operation performs. Used to match whole-op
/// filters (§4.F) by kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpKind {
    OpenFile,
    OpenDirectory,
    OpenSymlink,
    Close,
    Read,
    Write,
    Truncate,
    ZeroRange,
    Sync,
    Extents,
    ReadDir,
    Statfs,
    Lock,
    Barrier,
    UserCompletion,
}

/// The result published to an op's future: either one of the per-kind success payloads, or a
/// typed error.
#[derive(Clone, Debug)]
pub enum OpOutcome {
    /// A newly opened (or reused) handle.
    Handle(Handle),
    /// Metadata returned by `direntry`.
    Stat(Stat),
    /// Allocated-extent list returned by extent enumeration.
    Extents(ExtentList),
    /// One page of directory entries plus whether more remain.
    Entries(Vec<DirectoryEntry>, bool),
    /// Volume statistics returned by `statfs`.
    Statfs(StatfsResult),
    /// Success with no payload (close, write, truncate, zero-range, sync, lock).
    Unit,
    /// A failed operation.
    Error(Error),
}

impl OpOutcome {
    pub fn is_err(&self) -> bool {
        matches!(self, OpOutcome::Error(_))
    }

    /// The error carried by this outcome, if any.
    pub fn err(&self) -> Option<&Error> {
        match self {
            OpOutcome::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Unwraps a handle payload, if this outcome carries one.
    pub fn into_handle(self) -> Option<Handle> {
        match self {
            OpOutcome::Handle(h) => Some(h),
            _ => None,
        }
    }
}

/// A registered continuation: the dependent op's id plus enough to re-enqueue it.
pub(crate) struct Completion {
    pub(crate) id: OperationId,
    pub(crate) flags: AsyncOpFlags,
    pub(crate) run: Box<dyn FnOnce(OpOutcome) + Send>,
}

/// An in-flight operation record (§3, §4.E).
pub(crate) struct Operation {
    pub(crate) id: OperationId,
    pub(crate) kind: OpKind,
    pub(crate) flags: AsyncOpFlags,
    pub(crate) completions: Vec<Completion>,
    pub(crate) result_tx: Option<oneshot::Sender<OpOutcome>>,
}

/// The consumer-facing handle to an operation's eventual result (§4.E, §5 "Timeouts").
pub struct OpFuture {
    pub(crate) id: OperationId,
    pub(crate) rx: oneshot::Receiver<OpOutcome>,
}

/// Outcome of [`OpFuture::wait_for`].
#[derive(Debug)]
pub enum WaitResult {
    Ready(OpOutcome),
    TimedOut,
    /// The operation was dropped from the graph without publishing (dispatcher shutdown).
    Deferred,
}

impl OpFuture {
    /// The id of the operation this future observes.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Awaits the operation's result.
    pub async fn wait(self) -> OpOutcome {
        self.rx.await.unwrap_or_else(|_| {
            OpOutcome::Error(Error::new(crate::error::ErrorKind::Unknown).with_path(""))
        })
    }

    /// Awaits the operation's result, bounded by `duration` (§5 "Timeouts": observation only,
    /// not a kernel-level cancellation — the underlying op keeps running either way).
    pub async fn wait_for(self, duration: std::time::Duration) -> WaitResult {
        match tokio::time::timeout(duration, self.rx).await {
            Ok(Ok(outcome)) => WaitResult::Ready(outcome),
            Ok(Err(_)) => WaitResult::Deferred,
            Err(_) => WaitResult::TimedOut,
        }
    }
}
