//! Watch sessions driven by real filesystem events.
//!
//! Event delivery timing depends on the platform backend, so every wait is a
//! poll with a generous deadline rather than a fixed sleep.

use filesmith::plugin::sync;
use filesmith::watch::REBUILD_BACKLOG;
use filesmith::{Filesmith, Rebuild, WatchHandle, WatchOptions};
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(10);

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn options() -> WatchOptions {
    WatchOptions::default().debounce(Duration::from_millis(30))
}

/// Wait for a successful rebuild satisfying `done`, skipping any others.
fn wait_for(handle: &WatchHandle, done: impl Fn(&Rebuild) -> bool) -> Rebuild {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if let Some(Ok(rebuild)) = handle.next_rebuild(Duration::from_millis(100))
            && done(&rebuild)
        {
            return rebuild;
        }
    }
    panic!("no matching rebuild within {DEADLINE:?}");
}

#[test]
fn initial_rebuild_is_delivered_first() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    let handle = Filesmith::new(tmp.path()).watch(options()).unwrap();

    let initial = handle
        .next_rebuild(Duration::from_secs(1))
        .unwrap()
        .unwrap();
    assert!(initial.full);
    assert_eq!(initial.changes.added, vec!["a.txt"]);
    assert_eq!(fs::read(tmp.path().join("build/a.txt")).unwrap(), b"a");
    handle.stop();
}

#[test]
fn new_file_is_written_without_touching_others() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    let handle = Filesmith::new(tmp.path())
        .clean(false)
        .watch(options())
        .unwrap();
    wait_for(&handle, |r| r.full);

    write(tmp.path(), "build/a.txt", "marker");
    // Renamed in whole so no event sees a half-written file.
    write(tmp.path(), "staging/new.txt", "fresh");
    fs::rename(tmp.path().join("staging/new.txt"), tmp.path().join("src/new.txt")).unwrap();
    let rebuild = wait_for(&handle, |r| r.changes.added == ["new.txt"]);

    assert!(!rebuild.full);
    assert_eq!(fs::read(tmp.path().join("build/new.txt")).unwrap(), b"fresh");
    assert_eq!(fs::read(tmp.path().join("build/a.txt")).unwrap(), b"marker");
    handle.stop();
}

#[test]
fn deleted_file_is_removed_from_output() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    write(tmp.path(), "src/gone.txt", "g");
    let handle = Filesmith::new(tmp.path())
        .clean(false)
        .watch(options())
        .unwrap();
    wait_for(&handle, |r| r.full);

    fs::remove_file(tmp.path().join("src/gone.txt")).unwrap();
    let rebuild = wait_for(&handle, |r| r.changes.removed == ["gone.txt"]);

    assert!(!rebuild.files.contains_key("gone.txt"));
    assert!(!tmp.path().join("build/gone.txt").exists());
    assert!(tmp.path().join("build/a.txt").exists());
    handle.stop();
}

#[test]
fn stop_returns_promptly_mid_debounce() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    let handle = Filesmith::new(tmp.path())
        .watch(WatchOptions::default().debounce(Duration::from_secs(30)))
        .unwrap();
    write(tmp.path(), "src/b.txt", "b");
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    handle.stop();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn stop_mid_rebuild_returns_its_report() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    let (started_tx, started) = mpsc::channel();
    let handle = Filesmith::new(tmp.path())
        .clean(false)
        .plugin(sync(move |files, _ctx| {
            if files.contains_key("slow.txt") {
                let _ = started_tx.send(());
                thread::sleep(Duration::from_millis(500));
            }
            Ok(())
        }))
        .watch(options())
        .unwrap();
    wait_for(&handle, |r| r.full);

    write(tmp.path(), "staging/slow.txt", "s");
    fs::rename(tmp.path().join("staging/slow.txt"), tmp.path().join("src/slow.txt")).unwrap();
    started.recv_timeout(DEADLINE).unwrap();

    let remaining = handle.stop();
    assert!(
        remaining
            .iter()
            .any(|r| matches!(r, Ok(rebuild) if rebuild.changes.added == ["slow.txt"]))
    );
    assert_eq!(fs::read(tmp.path().join("build/slow.txt")).unwrap(), b"s");
}

#[test]
fn undrained_reports_are_bounded_and_returned_on_stop() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    let handle = Filesmith::new(tmp.path())
        .clean(false)
        .watch(options())
        .unwrap();

    // More rebuilds than the backlog holds, none of them received.
    for i in 0..REBUILD_BACKLOG + 3 {
        write(tmp.path(), &format!("staging/f{i}.txt"), "x");
        fs::rename(
            tmp.path().join(format!("staging/f{i}.txt")),
            tmp.path().join(format!("src/f{i}.txt")),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(150));
    }

    let start = Instant::now();
    let remaining = handle.stop();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(remaining.len() >= 2);
    assert!(remaining.len() <= REBUILD_BACKLOG + 1);
    assert!(matches!(&remaining[0], Ok(initial) if initial.full));
}

#[test]
fn watch_fails_when_initial_build_fails() {
    let tmp = TempDir::new().unwrap();
    let err = Filesmith::new(tmp.path()).watch(options()).err().unwrap();
    assert_eq!(err.code(), "failed_read");
}
