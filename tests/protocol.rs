//! Integration tests for the try/throw/defer protocol.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use recoil::{
    defer, guard_count, open_file, scope_depth, throw, try_region, ErrorCode, ErrorValue, Handle,
};

unsafe fn bump(handle: Handle) {
    let counter = &*handle.as_ptr::<AtomicUsize>().cast_const();
    counter.fetch_add(1, Ordering::SeqCst);
}

fn counter_handle(counter: &'static AtomicUsize) -> Handle {
    Handle::from_ptr(counter as *const AtomicUsize as *mut AtomicUsize)
}

/// Build `levels` nested regions and throw at the bottom: only the innermost
/// region sees the error.
fn nested(levels: usize) -> &'static str {
    if levels == 0 {
        let inner: Result<(), _> = try_region(|| {
            recoil::throw!(ErrorCode::Invalid, "innermost failure");
        });
        let err = inner.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Invalid.as_i32());
        assert_eq!(err.message(), "innermost failure");
        "caught at the bottom"
    } else {
        try_region(|| nested(levels - 1)).unwrap()
    }
}

#[test]
fn deep_nesting_catches_at_innermost() {
    assert_eq!(nested(60), "caught at the bottom");
    assert_eq!(scope_depth(), 0);
}

#[test]
fn rethrow_walks_outward_one_region_at_a_time() {
    fn relay(levels: usize, hops: &Mutex<Vec<usize>>) {
        if levels == 0 {
            throw(ErrorValue::new(ErrorCode::File, "origin"));
        }
        let inner = try_region(|| relay(levels - 1, hops));
        if let Err(err) = inner {
            hops.lock().unwrap().push(levels);
            throw(err);
        }
    }

    let hops = Mutex::new(Vec::new());
    let outcome = try_region(|| relay(5, &hops));
    let err = outcome.unwrap_err();
    assert_eq!(err.message(), "origin");
    // Every intermediate region observed the error once, inside out.
    assert_eq!(*hops.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn guards_release_lifo_exactly_once() {
    static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    unsafe fn record(handle: Handle) {
        ORDER.lock().unwrap().push(handle.as_raw());
    }

    let outcome: Result<(), _> = try_region(|| unsafe {
        for resource in 1..=8 {
            defer(record, Handle::from_raw(resource));
        }
        recoil::throw!(ErrorCode::Invalid, "unwind");
    });
    assert!(outcome.is_err());
    assert_eq!(*ORDER.lock().unwrap(), vec![8, 7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn normal_completion_releases_nothing() {
    static HITS: AtomicUsize = AtomicUsize::new(0);

    let outcome = try_region(|| unsafe {
        defer(bump, counter_handle(&HITS));
        defer(bump, counter_handle(&HITS));
        "done"
    });
    assert_eq!(outcome.unwrap(), "done");
    assert_eq!(HITS.load(Ordering::SeqCst), 0);

    // The equivalent erroring path does release.
    let outcome: Result<(), _> = try_region(|| unsafe {
        defer(bump, counter_handle(&HITS));
        defer(bump, counter_handle(&HITS));
        recoil::throw!(ErrorCode::Invalid, "release them");
    });
    assert!(outcome.is_err());
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
}

#[test]
fn pool_exhaustion_raises_catchable_limit() {
    static HITS: AtomicUsize = AtomicUsize::new(0);

    let outcome: Result<(), _> = try_region(|| unsafe {
        for _ in 0..recoil::GUARD_POOL_CAPACITY {
            defer(bump, counter_handle(&HITS));
        }
        defer(bump, counter_handle(&HITS));
        unreachable!("the defer past capacity must throw");
    });
    let err = outcome.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Limit.as_i32());
    assert_eq!(err.message(), "resource limit exceeded");
    // All registered guards survived the overflow and ran exactly once.
    assert_eq!(HITS.load(Ordering::SeqCst), recoil::GUARD_POOL_CAPACITY);
}

#[test]
fn threads_never_observe_each_other() {
    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2u8)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let released: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));
                barrier.wait();
                for round in 0..100usize {
                    let guards = 1 + (usize::from(id) + round) % 7;
                    let outcome: Result<(), _> = try_region(|| {
                        for _ in 0..guards {
                            // SAFETY: the counter is leaked, so it outlives
                            // any release.
                            unsafe { defer(bump, counter_handle(released)) };
                        }
                        assert_eq!(guard_count(), guards);
                        assert_eq!(scope_depth(), 1);

                        let inner: Result<(), _> = try_region(|| {
                            assert_eq!(scope_depth(), 2);
                            assert_eq!(guard_count(), 0);
                            recoil::throw!(ErrorCode::Parse, "worker {} round {}", id, round);
                        });
                        let err = inner.unwrap_err();
                        assert!(err.message().contains(&format!("worker {id}")));
                        assert_eq!(scope_depth(), 1);
                        recoil::throw!(ErrorCode::Invalid, "drain worker {}", id);
                    });
                    assert!(outcome.is_err());
                    assert_eq!(scope_depth(), 0);
                }
                // Seven-cycle of guard counts over 100 rounds, all released
                // on this thread and no other.
                released.load(Ordering::SeqCst)
            })
        })
        .collect();

    let totals: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let expected: Vec<usize> = (0..2usize)
        .map(|id| (0..100).map(|round| 1 + (id + round) % 7).sum())
        .collect();
    assert_eq!(totals, expected);
}

#[test]
fn missing_file_error_names_path_and_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-there.txt");
    let shown = path.display().to_string();

    let outcome = try_region(|| {
        open_file(&path, "r");
    });
    let err = outcome.unwrap_err();
    assert_eq!(err.code(), ErrorCode::File.as_i32());
    assert!(err.message().contains(&shown));
    assert!(err.message().contains("'r'"));
}

#[test]
fn open_file_guard_waits_for_a_later_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.txt");

    let outcome: Result<(), _> = try_region(|| {
        let file = open_file(&path, "w");
        assert_eq!(guard_count(), 1);
        // SAFETY: the file is live until this region unwinds.
        let mut writer = unsafe { file.as_ref() };
        writeln!(writer, "entry one").unwrap();

        // A later failure elsewhere in the same region closes the file.
        recoil::throw!(ErrorCode::Parse, "journal corrupt");
    });
    assert!(outcome.is_err());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("entry one"));
}

#[test]
fn open_file_success_leaves_guard_unreleased() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kept.txt");

    let registered = try_region(|| {
        let file = open_file(&path, "w");
        // SAFETY: the file is live; the region completes normally, so the
        // close guard never fires and the handle is deliberately leaked.
        let mut writer = unsafe { file.as_ref() };
        writeln!(writer, "kept open").unwrap();
        writer.flush().unwrap();
        guard_count()
    });
    assert_eq!(registered.unwrap(), 1);
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("kept open"));
}
