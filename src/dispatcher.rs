//! The dispatcher (§4.F): owns the operation table, wires preconditions to completions,
//! invokes the thread source, calls the per-kind implementations, and publishes results.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::DispatcherConfig;
use crate::dircache::DirectoryCache;
use crate::error::{Error, ErrorKind};
use crate::flags::{AsyncOpFlags, FileFlags, FsMetadataFlags, MetadataFlags};
use crate::handle::Handle;
use crate::locking::LockingRegistry;
use crate::op::{Completion, IdAllocator, OpFuture, OpKind, OpOutcome, Operation, OperationId};
use crate::ops;
use crate::pool::ThreadSource;
use crate::stat::{Direction, IoRequest, LockRequest};

type WholeOpFilter = Box<dyn Fn(OperationId, &OpOutcome) + Send + Sync>;
type BufferFilter = Box<dyn Fn(Direction, &Handle, u64, usize, usize, Option<&Error>, usize) + Send + Sync>;

/// The operation graph engine and its collaborators (thread pool, directory cache, locking
/// sub-registry). Construct one per process (or per isolated workload) via [`Dispatcher::new`];
/// every method that can run work on the pool takes `self: &Arc<Dispatcher>` so completions can
/// safely reach back into it after the call returns.
pub struct Dispatcher {
    ids: IdAllocator,
    graph: Mutex<HashMap<OperationId, Operation>>,
    pool: ThreadSource,
    dircache: Arc<DirectoryCache>,
    locking: LockingRegistry,
    config: DispatcherConfig,
    whole_op_filters: Mutex<Vec<(OpKind, WholeOpFilter)>>,
    buffer_filters: Mutex<Vec<BufferFilter>>,
}

impl Dispatcher {
    /// Builds a dispatcher with its own worker pool, directory cache, and locking registry.
    pub fn new(config: DispatcherConfig) -> Arc<Self> {
        let pool = ThreadSource::new(config.worker_threads);
        Arc::new(Self {
            ids: IdAllocator::new(),
            graph: Mutex::new(HashMap::new()),
            pool,
            dircache: Arc::new(DirectoryCache::new()),
            locking: LockingRegistry::new(),
            config,
            whole_op_filters: Mutex::new(Vec::new()),
            buffer_filters: Mutex::new(Vec::new()),
        })
    }

    /// Diagnostic: number of operations currently live in the graph (§4.J).
    pub fn pending_operations(&self) -> usize {
        self.graph.lock().len()
    }

    /// Diagnostic: number of tasks queued or running in the thread source (§4.J).
    pub fn pool_depth(&self) -> usize {
        self.pool.depth()
    }

    /// Drops every directory-cache entry whose last strong reference has already gone away.
    pub fn prune_directory_cache(&self) {
        self.dircache.prune();
    }

    /// Registers a whole-op filter, invoked after every `complete()` of a matching kind.
    /// Not thread-safe to call once any operation has been submitted (§4.F).
    pub fn install_whole_op_filter(
        &self,
        kind: OpKind,
        filter: impl Fn(OperationId, &OpOutcome) + Send + Sync + 'static,
    ) {
        self.whole_op_filters.lock().push((kind, Box::new(filter)));
    }

    /// Registers a read/write buffer filter, invoked after each per-buffer transfer.
    pub fn install_buffer_filter(
        &self,
        filter: impl Fn(Direction, &Handle, u64, usize, usize, Option<&Error>, usize) + Send + Sync + 'static,
    ) {
        self.buffer_filters.lock().push(Box::new(filter));
    }

    fn run_buffer_filters(
        &self,
        direction: Direction,
        handle: &Handle,
        offset: u64,
        buffer_index: usize,
        buffers_total: usize,
        error: Option<&Error>,
        bytes_transferred: usize,
    ) {
        for filter in self.buffer_filters.lock().iter() {
            filter(direction, handle, offset, buffer_index, buffers_total, error, bytes_transferred);
        }
    }

    /// Core submission algorithm (§4.F "Operation submission"). `work` receives the
    /// precondition's outcome (`None` if there was no precondition) and produces this
    /// operation's own outcome.
    pub fn submit<F>(self: &Arc<Self>, kind: OpKind, precondition: Option<OpFuture>, flags: AsyncOpFlags, work: F) -> OpFuture
    where
        F: FnOnce(Option<OpOutcome>) -> OpOutcome + Send + 'static,
    {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        self.graph.lock().insert(
            id,
            Operation {
                id,
                kind,
                flags,
                completions: Vec::new(),
                result_tx: Some(tx),
            },
        );

        let Some(mut precondition) = precondition else {
            self.dispatch(id, None, flags, Box::new(work));
            return OpFuture { id, rx };
        };

        loop {
            match precondition.rx.try_recv() {
                Ok(outcome) => {
                    self.dispatch(id, Some(outcome), flags, Box::new(work));
                    break;
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    let mut graph = self.graph.lock();
                    if let Some(pre_op) = graph.get_mut(&precondition.id) {
                        let this = Arc::clone(self);
                        pre_op.completions.push(Completion {
                            id,
                            flags,
                            run: Box::new(move |outcome| {
                                this.dispatch(id, Some(outcome), flags, Box::new(work));
                            }),
                        });
                        break;
                    }
                    // The precondition published and was removed between our try_recv and
                    // taking the lock; loop around and observe its now-ready channel.
                    continue;
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    let err = OpOutcome::Error(Error::new(ErrorKind::Unknown));
                    self.dispatch(id, Some(err), flags, Box::new(work));
                    break;
                }
            }
        }
        OpFuture { id, rx }
    }

    fn dispatch(
        self: &Arc<Self>,
        id: OperationId,
        precondition_outcome: Option<OpOutcome>,
        flags: AsyncOpFlags,
        work: Box<dyn FnOnce(Option<OpOutcome>) -> OpOutcome + Send>,
    ) {
        if flags.contains(AsyncOpFlags::IMMEDIATE) {
            let outcome = work(precondition_outcome);
            if !flags.contains(AsyncOpFlags::DETACHED_FUTURE) {
                self.complete(id, outcome);
            }
            return;
        }
        let this = Arc::clone(self);
        self.pool.submit(move || {
            let outcome = work(precondition_outcome);
            if !flags.contains(AsyncOpFlags::DETACHED_FUTURE) {
                this.complete(id, outcome);
            }
        });
    }

    /// `complete()` (§4.F): publish a result and run registered completions/filters. Public so
    /// an operation submitted with `AsyncOpFlags::DETACHED_FUTURE` (whose dispatch skipped the
    /// automatic publish) can be completed explicitly, typically from an OS completion callback,
    /// using the id from its [`OpFuture::id`].
    pub fn complete(self: &Arc<Self>, id: OperationId, outcome: OpOutcome) {
        let op = self.graph.lock().remove(&id);
        let Some(mut op) = op else {
            log::error!("complete() called for unknown operation {}", id.0);
            return;
        };
        if let Some(tx) = op.result_tx.take() {
            let _ = tx.send(outcome.clone());
        }
        for (kind, filter) in self.whole_op_filters.lock().iter() {
            if *kind == op.kind {
                filter(id, &outcome);
            }
        }

        let mut immediate_queue: Vec<Box<dyn FnOnce(OpOutcome) + Send>> = Vec::new();
        for completion in op.completions.drain(..) {
            if completion.flags.contains(AsyncOpFlags::IMMEDIATE) {
                immediate_queue.push(completion.run);
            } else {
                let outcome = outcome.clone();
                self.pool.submit(move || (completion.run)(outcome));
            }
        }
        for run in immediate_queue {
            run(outcome.clone());
        }
    }

    /// `barrier()` (§4.F): N inputs fan in to N outputs that each inherit their corresponding
    /// input's result but all publish only once every input has completed.
    pub fn barrier(self: &Arc<Self>, inputs: Vec<OpFuture>) -> Vec<OpFuture> {
        let n = inputs.len();
        let mut output_ids = Vec::with_capacity(n);
        let mut output_futs = Vec::with_capacity(n);
        {
            let mut graph = self.graph.lock();
            for _ in 0..n {
                let id = self.ids.next();
                let (tx, rx) = oneshot::channel();
                graph.insert(
                    id,
                    Operation {
                        id,
                        kind: OpKind::Barrier,
                        flags: AsyncOpFlags::empty(),
                        completions: Vec::new(),
                        result_tx: Some(tx),
                    },
                );
                output_ids.push(id);
                output_futs.push(rx);
            }
        }

        let togo = Arc::new(Mutex::new((n, vec![None; n])));
        for (index, input) in inputs.into_iter().enumerate() {
            let output_ids = output_ids.clone();
            let togo = Arc::clone(&togo);
            let this = Arc::clone(self);
            self.on_complete(input, move |outcome| {
                let ready = {
                    let mut guard = togo.lock();
                    guard.1[index] = Some(outcome);
                    guard.0 -= 1;
                    guard.0 == 0
                };
                if ready {
                    let mut guard = togo.lock();
                    for (i, id) in output_ids.iter().enumerate() {
                        let outcome = guard.1[i].take().unwrap_or(OpOutcome::Unit);
                        this.complete(*id, outcome);
                    }
                }
            });
        }

        output_futs
            .into_iter()
            .zip(output_ids)
            .map(|(rx, id)| OpFuture { id, rx })
            .collect()
    }

    /// `completion()` (§4.F "User-completion"): a user-defined continuation run against an
    /// input's result, without allocating its own graph-visible operation id.
    fn on_complete(self: &Arc<Self>, mut future: OpFuture, callback: impl FnOnce(OpOutcome) + Send + 'static) {
        loop {
            match future.rx.try_recv() {
                Ok(outcome) => {
                    callback(outcome);
                    return;
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    let mut graph = self.graph.lock();
                    if let Some(pre_op) = graph.get_mut(&future.id) {
                        pre_op.completions.push(Completion {
                            id: future.id,
                            flags: AsyncOpFlags::empty(),
                            run: Box::new(callback),
                        });
                        return;
                    }
                    continue;
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    callback(OpOutcome::Error(Error::new(ErrorKind::Unknown)));
                    return;
                }
            }
        }
    }

    /// `completion(ops, callbacks)` (§4.F "User-completion"): pairs each input with a callback
    /// deciding, from that input's outcome, this step's own outcome.
    pub fn completion(
        self: &Arc<Self>,
        inputs: Vec<OpFuture>,
        callbacks: Vec<impl FnOnce(OperationId, OpOutcome) -> OpOutcome + Send + 'static>,
    ) -> Vec<OpFuture> {
        inputs
            .into_iter()
            .zip(callbacks)
            .map(|(input, callback)| {
                let id = self.ids.next();
                let (tx, rx) = oneshot::channel();
                self.graph.lock().insert(
                    id,
                    Operation {
                        id,
                        kind: OpKind::UserCompletion,
                        flags: AsyncOpFlags::empty(),
                        completions: Vec::new(),
                        result_tx: Some(tx),
                    },
                );
                let this = Arc::clone(self);
                let precondition_id = input.id;
                self.on_complete(input, move |outcome| {
                    let result = callback(precondition_id, outcome);
                    this.complete(id, result);
                });
                OpFuture { id, rx }
            })
            .collect()
    }

    // ---- Per-kind public entry points (§4.G) -------------------------------------------

    /// Opens (and, per `flags.creation_policy()`, creates) a file. `op_flags` governs this
    /// submission's own scheduling (§4.F: `IMMEDIATE` to run inline, `DETACHED_FUTURE` to
    /// suppress auto-publish and complete it explicitly via [`Dispatcher::complete`]).
    pub fn open_file(
        self: &Arc<Self>,
        path: PathBuf,
        flags: FileFlags,
        base_dir: Option<Handle>,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        let flags = self.seed_race_protection(flags);
        self.submit(OpKind::OpenFile, precondition, op_flags, move |_| {
            if let Err(e) = crate::path::validate(&path) {
                return OpOutcome::Error(e);
            }
            match ops::open::open_file(&path, flags, base_dir) {
                Ok(handle) => OpOutcome::Handle(handle),
                Err(e) => OpOutcome::Error(e.with_path(path)),
            }
        })
    }

    /// Applies `config.default_race_protection` to `flags` when the caller hasn't already
    /// opted out via `NO_RACE_PROTECTION` (§4.I): a `false` default seeds that bit so handles
    /// opened through this dispatcher skip race protection unless asked for explicitly.
    fn seed_race_protection(&self, flags: FileFlags) -> FileFlags {
        if self.config.default_race_protection {
            flags
        } else {
            flags | FileFlags::NO_RACE_PROTECTION
        }
    }

    /// Opens (and optionally creates) a directory. On success, shareable directory handles
    /// (no `unique_directory_handle`) are published into the directory cache (§4.D).
    pub fn open_directory(
        self: &Arc<Self>,
        path: PathBuf,
        flags: FileFlags,
        base_dir: Option<Handle>,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        let this = Arc::clone(self);
        let flags = self.seed_race_protection(flags);
        self.submit(OpKind::OpenDirectory, precondition, op_flags, move |_| {
            if let Err(e) = crate::path::validate(&path) {
                return OpOutcome::Error(e);
            }
            match ops::open::open_directory(&path, flags, base_dir, this.config.directory_cache_enabled, &this.dircache) {
                Ok(handle) => OpOutcome::Handle(handle),
                Err(e) => OpOutcome::Error(e.with_path(path)),
            }
        })
    }

    /// Creates a symlink at `path` pointing at `target`, or opens an existing one.
    pub fn open_symlink(
        self: &Arc<Self>,
        path: PathBuf,
        target: Option<PathBuf>,
        flags: FileFlags,
        base_dir: Option<Handle>,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        let flags = self.seed_race_protection(flags);
        self.submit(OpKind::OpenSymlink, precondition, op_flags, move |_| {
            if let Err(e) = crate::path::validate(&path) {
                return OpOutcome::Error(e);
            }
            match ops::open::open_symlink(&path, target.as_deref(), flags, base_dir) {
                Ok(handle) => OpOutcome::Handle(handle),
                Err(e) => OpOutcome::Error(e.with_path(path)),
            }
        })
    }

    /// Closes `handle`, applying `sync_on_close`/`delete_on_close` policy.
    pub fn close(self: &Arc<Self>, handle: Handle, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        self.submit(OpKind::Close, precondition, op_flags, move |_| match handle.close() {
            Ok(()) => OpOutcome::Unit,
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Scatter/gather read (§4.G "Read"). Runs registered buffer filters per span.
    pub fn read(self: &Arc<Self>, mut req: IoRequest<'static>, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        let this = Arc::clone(self);
        self.submit(OpKind::Read, precondition, op_flags, move |_| {
            match ops::read::read(&mut req, |d, h, o, i, n, e, b| this.run_buffer_filters(d, h, o, i, n, e, b)) {
                Ok(()) => OpOutcome::Unit,
                Err(e) => OpOutcome::Error(e),
            }
        })
    }

    /// Scatter/gather write (§4.G "Write"). Runs registered buffer filters per span.
    pub fn write(self: &Arc<Self>, req: IoRequest<'static>, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        let this = Arc::clone(self);
        self.submit(OpKind::Write, precondition, op_flags, move |_| {
            match ops::write::write(&req, |d, h, o, i, n, e, b| this.run_buffer_filters(d, h, o, i, n, e, b)) {
                Ok(()) => OpOutcome::Unit,
                Err(e) => OpOutcome::Error(e),
            }
        })
    }

    /// Truncates `handle` to `new_size` bytes.
    pub fn truncate(
        self: &Arc<Self>,
        handle: Handle,
        new_size: u64,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        self.submit(OpKind::Truncate, precondition, op_flags, move |_| match ops::truncate::truncate(&handle, new_size) {
            Ok(()) => OpOutcome::Unit,
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Deallocates (or zero-fills) the given byte ranges (§4.G "Zero / punch-hole").
    pub fn zero_range(
        self: &Arc<Self>,
        handle: Handle,
        ranges: Vec<(u64, u64)>,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        self.submit(OpKind::ZeroRange, precondition, op_flags, move |_| match ops::zero::zero_range(&handle, &ranges) {
            Ok(()) => OpOutcome::Unit,
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Persists `handle`'s writes via `fsync`.
    pub fn sync(self: &Arc<Self>, handle: Handle, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        self.submit(OpKind::Sync, precondition, op_flags, move |_| match ops::sync::sync(&handle) {
            Ok(()) => OpOutcome::Unit,
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Enumerates `handle`'s allocated extents.
    pub fn extents(self: &Arc<Self>, handle: Handle, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        self.submit(OpKind::Extents, precondition, op_flags, move |_| match ops::extents::extents(&handle) {
            Ok(list) => OpOutcome::Extents(list),
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Enumerates up to `max_items` directory entries, optionally filtered by `glob`, hiding
    /// delete-pending sentinel names when `hide_deleted` is set. Callers loop, passing
    /// `restart=false`, until the returned `more_available` is false.
    #[allow(clippy::too_many_arguments)]
    pub fn readdir(
        self: &Arc<Self>,
        handle: Handle,
        max_items: usize,
        restart: bool,
        glob: Option<String>,
        wanted: MetadataFlags,
        hide_deleted: bool,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        self.submit(OpKind::ReadDir, precondition, op_flags, move |_| {
            if restart {
                handle.set_readdir_cursor(0);
            }
            match ops::readdir::readdir(&handle, max_items, glob.as_deref(), wanted, hide_deleted) {
                Ok((entries, more)) => OpOutcome::Entries(entries, more),
                Err(e) => OpOutcome::Error(e),
            }
        })
    }

    /// Queries volume statistics for the filesystem backing `handle`.
    pub fn statfs(
        self: &Arc<Self>,
        handle: Handle,
        wanted: FsMetadataFlags,
        op_flags: AsyncOpFlags,
        precondition: Option<OpFuture>,
    ) -> OpFuture {
        self.submit(OpKind::Statfs, precondition, op_flags, move |_| match ops::statfs::statfs(&handle, wanted) {
            Ok(result) => OpOutcome::Statfs(result),
            Err(e) => OpOutcome::Error(e),
        })
    }

    /// Forwards a byte-range lock request to the locking sub-registry (§4.H).
    pub fn lock(self: &Arc<Self>, req: LockRequest, op_flags: AsyncOpFlags, precondition: Option<OpFuture>) -> OpFuture {
        let this = Arc::clone(self);
        self.submit(OpKind::Lock, precondition, op_flags, move |_| match ops::lock::lock(&this.locking, &req) {
            Ok(()) => OpOutcome::Unit,
            Err(e) => OpOutcome::Error(e),
        })
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.graph.lock().len() > 0 {
            log::warn!(
                "dispatcher dropped with {} operation(s) still outstanding",
                self.graph.lock().len()
            );
        }
    }
}
