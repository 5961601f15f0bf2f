//! Asynchronous native file I/O dispatcher.
//!
//! This crate schedules native, race-safe filesystem operations (open, read, write, truncate,
//! zero/punch-hole, sync, extent and directory enumeration, statfs, byte-range locking) across
//! a fixed worker pool, chaining them through an operation graph instead of a kernel-facing
//! request/reply protocol. Callers build up a dependency graph with [`Dispatcher::submit`] and
//! its per-kind wrappers, wait on the resulting [`OpFuture`]s, and combine them with
//! [`Dispatcher::barrier`] or [`Dispatcher::completion`].

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

mod config;
mod dircache;
mod dispatcher;
mod error;
mod flags;
mod handle;
mod locking;
mod op;
mod ops;
mod path;
mod pool;
mod stat;

pub use crate::config::DispatcherConfig;
pub use crate::dispatcher::Dispatcher;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::flags::{AsyncOpFlags, FileFlags, FsMetadataFlags, MetadataFlags, VolumeFeatures};
pub use crate::handle::{DeviceId, Handle, InodeId, PathRequest};
pub use crate::op::{OpFuture, OpKind, OpOutcome, OperationId, WaitResult};
pub use crate::path::NativePath;
pub use crate::stat::{
    DirectoryEntry, Direction, Extent, ExtentList, IoRequest, IoSpan, Kind, LockRequest, LockType, Stat, StatfsResult,
};
