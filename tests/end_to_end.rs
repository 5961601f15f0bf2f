//! End-to-end scenarios exercising the dispatcher against a real filesystem.

use std::sync::Arc;

use nativeio::{
    AsyncOpFlags, DispatcherConfig, FileFlags, IoRequest, LockRequest, LockType, MetadataFlags, OpOutcome, PathRequest,
};

fn dispatcher() -> Arc<nativeio::Dispatcher> {
    nativeio::Dispatcher::new(DispatcherConfig::new().worker_threads(4))
}

/// `IoRequest<'static>` requires its buffers to outlive the request, so tests hand it leaked
/// boxes. `LeakedBuf` remembers the raw allocation so the buffer's contents can be recovered
/// once the operation — and the borrow the dispatcher took on it — has completed.
struct LeakedBuf {
    ptr: *mut u8,
    len: usize,
}

impl LeakedBuf {
    fn new(len: usize) -> (&'static mut [u8], Self) {
        let leaked: &'static mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());
        let info = LeakedBuf {
            ptr: leaked.as_mut_ptr(),
            len: leaked.len(),
        };
        (leaked, info)
    }

    fn reclaim(self) -> Vec<u8> {
        unsafe { Vec::from_raw_parts(self.ptr, self.len, self.len) }
    }
}

#[tokio::test]
async fn create_write_read_close_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.txt");
    let disp = dispatcher();

    let open = disp.open_file(
        path.clone(),
        FileFlags::READ | FileFlags::WRITE | FileFlags::CREATE,
        None,
        AsyncOpFlags::empty(),
        None,
    );
    let handle = open.wait().await.into_handle().expect("open succeeded");

    let source: &'static [u8] = Box::leak(b"hello world".to_vec().into_boxed_slice());
    let write = disp.write(IoRequest::write(handle.clone(), 0, vec![source]), AsyncOpFlags::empty(), None);
    assert!(!write.wait().await.is_err());

    let (dest, dest_info) = LeakedBuf::new(11);
    let read = disp.read(IoRequest::read(handle.clone(), 0, vec![dest]), AsyncOpFlags::empty(), None);
    assert!(!read.wait().await.is_err());
    assert_eq!(dest_info.reclaim(), b"hello world");

    let close = disp.close(handle.clone(), AsyncOpFlags::empty(), None);
    assert!(!close.wait().await.is_err());

    assert!(handle.unlink().is_ok());
    assert!(!path.exists());
}

#[tokio::test]
async fn hard_link_relink_and_enumerate() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("original.bin");
    let linked = dir.path().join("linked.bin");
    let linked_again = dir.path().join("linked-again.bin");
    let renamed = dir.path().join("renamed.bin");
    let disp = dispatcher();

    let handle = disp
        .open_file(original.clone(), FileFlags::WRITE | FileFlags::CREATE, None, AsyncOpFlags::empty(), None)
        .wait()
        .await
        .into_handle()
        .unwrap();

    handle.link(PathRequest::new(linked.clone())).unwrap();
    assert!(linked.exists());
    handle.link(PathRequest::new(linked_again.clone())).unwrap();
    assert!(linked_again.exists());

    handle.atomic_relink(PathRequest::new(renamed.clone())).unwrap();
    assert_eq!(handle.path(true).unwrap(), renamed);

    let stat = handle.direntry(MetadataFlags::NLINK).unwrap();
    assert_eq!(stat.nlink, Some(3));

    let parent = disp
        .open_directory(dir.path().to_path_buf(), FileFlags::READ, None, AsyncOpFlags::empty(), None)
        .wait()
        .await
        .into_handle()
        .unwrap();
    let outcome = disp
        .readdir(parent, 64, false, None, MetadataFlags::TYPE, true, AsyncOpFlags::empty(), None)
        .wait()
        .await;
    let OpOutcome::Entries(entries, more) = outcome else {
        panic!("expected directory entries");
    };
    assert!(!more);
    let names: Vec<String> = entries.iter().map(|e| e.leafname.to_string_lossy().into_owned()).collect();
    assert!(names.contains(&"linked.bin".to_string()));
    assert!(names.contains(&"linked-again.bin".to_string()));
    assert!(names.contains(&"renamed.bin".to_string()));

    for path in [&linked, &linked_again, &renamed] {
        let other = disp
            .open_file(path.clone(), FileFlags::READ, None, AsyncOpFlags::empty(), None)
            .wait()
            .await
            .into_handle()
            .unwrap();
        assert_eq!(other.identity(), handle.identity());
    }
}

#[tokio::test]
async fn scatter_write_gather_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scattered.bin");
    let disp = dispatcher();

    let handle = disp
        .open_file(
            path.clone(),
            FileFlags::READ | FileFlags::WRITE | FileFlags::CREATE,
            None,
            AsyncOpFlags::empty(),
            None,
        )
        .wait()
        .await
        .into_handle()
        .unwrap();

    let part_a: &'static [u8] = Box::leak(b"0123456789".to_vec().into_boxed_slice());
    let part_b: &'static [u8] = Box::leak(b"abcdefghij".to_vec().into_boxed_slice());
    let write = disp.write(
        IoRequest::write(handle.clone(), 0, vec![part_a, part_b]),
        AsyncOpFlags::empty(),
        None,
    );
    assert!(!write.wait().await.is_err());

    let (first, first_info) = LeakedBuf::new(10);
    let (second, second_info) = LeakedBuf::new(10);
    let read = disp.read(IoRequest::read(handle, 0, vec![first, second]), AsyncOpFlags::empty(), None);
    assert!(!read.wait().await.is_err());

    assert_eq!(first_info.reclaim(), b"0123456789");
    assert_eq!(second_info.reclaim(), b"abcdefghij");
}

#[tokio::test]
async fn barrier_over_many_creates() {
    let dir = tempfile::tempdir().unwrap();
    let disp = dispatcher();

    let opens: Vec<_> = (0..256)
        .map(|i| {
            disp.open_file(
                dir.path().join(format!("f{i}.bin")),
                FileFlags::WRITE | FileFlags::CREATE,
                None,
                AsyncOpFlags::empty(),
                None,
            )
        })
        .collect();

    let joined = disp.barrier(opens);
    for fut in joined {
        assert!(!fut.wait().await.is_err());
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 256);
}

#[tokio::test]
async fn concurrent_rename_race_is_detected_or_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("contended.bin");
    let disp = dispatcher();

    let handle = disp
        .open_file(original.clone(), FileFlags::WRITE | FileFlags::CREATE, None, AsyncOpFlags::empty(), None)
        .wait()
        .await
        .into_handle()
        .unwrap();

    let renamed_externally = dir.path().join("contended-renamed.bin");
    std::fs::rename(&original, &renamed_externally).unwrap();

    // The handle's own rename races the external one; either it lands cleanly or the
    // identity check rejects it, never silently writing through a stale path.
    let result = handle.atomic_relink(PathRequest::new(dir.path().join("contended-final.bin")));
    match result {
        Ok(()) => assert_eq!(handle.path(true).unwrap(), dir.path().join("contended-final.bin")),
        Err(e) => assert_ne!(e.kind(), nativeio::ErrorKind::Unknown),
    }
}

#[tokio::test]
async fn zero_range_reduces_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse.bin");
    let disp = dispatcher();

    let handle = disp
        .open_file(
            path.clone(),
            FileFlags::READ | FileFlags::WRITE | FileFlags::CREATE,
            None,
            AsyncOpFlags::empty(),
            None,
        )
        .wait()
        .await
        .into_handle()
        .unwrap();

    let chunk: &'static [u8] = Box::leak(vec![0xAAu8; 64 * 1024].into_boxed_slice());
    disp.write(IoRequest::write(handle.clone(), 0, vec![chunk]), AsyncOpFlags::empty(), None)
        .wait()
        .await;

    let zero = disp.zero_range(handle.clone(), vec![(0, 64 * 1024)], AsyncOpFlags::empty(), None);
    assert!(!zero.wait().await.is_err());

    let (readback, readback_info) = LeakedBuf::new(64 * 1024);
    disp.read(IoRequest::read(handle, 0, vec![readback]), AsyncOpFlags::empty(), None)
        .wait()
        .await;
    assert!(readback_info.reclaim().iter().all(|&b| b == 0));
}

#[tokio::test]
async fn byte_range_lock_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.bin");
    let disp = dispatcher();

    let handle = disp
        .open_file(
            path.clone(),
            FileFlags::READ | FileFlags::WRITE | FileFlags::CREATE,
            None,
            AsyncOpFlags::empty(),
            None,
        )
        .wait()
        .await
        .into_handle()
        .unwrap();

    let lock = disp.lock(
        LockRequest {
            handle: handle.clone(),
            offset: 0,
            length: 4096,
            lock_type: LockType::Write,
        },
        AsyncOpFlags::empty(),
        None,
    );
    assert!(!lock.wait().await.is_err());

    let unlock = disp.lock(
        LockRequest {
            handle,
            offset: 0,
            length: 4096,
            lock_type: LockType::Unlock,
        },
        AsyncOpFlags::empty(),
        None,
    );
    assert!(!unlock.wait().await.is_err());
}

#[tokio::test]
async fn detached_future_requires_explicit_complete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detached.bin");
    let disp = dispatcher();

    let open = disp.open_file(
        path.clone(),
        FileFlags::WRITE | FileFlags::CREATE,
        None,
        AsyncOpFlags::DETACHED_FUTURE,
        None,
    );
    let id = open.id();

    // The pool runs the work, but a detached submission must not auto-publish: the record
    // stays live in the graph until something completes it explicitly.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(disp.pending_operations(), 1);

    disp.complete(id, OpOutcome::Unit);
    assert!(!open.wait().await.is_err());
}
