//! Incremental rebuilds on filesystem changes.
//!
//! [`Filesmith::watch`] does a full build, then keeps the raw read result as
//! a cache and reruns the plugins whenever watched paths change:
//!
//! ```text
//! Idle ─start─▶ Watching ─event─▶ Debouncing ─quiet─▶ Rebuilding ─▶ Watching
//!                  │                  │                    │
//!                  └──────── stop() ──┴──────── stop() ────┴──▶ Closed
//! ```
//!
//! ## One rebuild
//!
//! 1. Apply the coalesced events to the cache: a vanished path drops its key
//!    and every key below it, an existing file is re-read, an existing
//!    directory has its whole subtree re-read. Paths outside the source only
//!    trigger the rerun.
//! 2. Run the plugins on a deep copy of the cache, so plugins never mutate it.
//! 3. Clean mode: empty the destination and write everything.
//!    Incremental mode: diff content digests against the last result, delete
//!    removed outputs, write added and changed ones, touch nothing else.
//!
//! Each rebuild (including the initial build) is delivered on
//! [`WatchHandle::rebuilds`] as `Ok(Rebuild)` or `Err(Error)`. A failing
//! rebuild does not end the session. The stream holds at most
//! [`REBUILD_BACKLOG`] undelivered reports; once it is full the session
//! waits for the consumer before rebuilding again, and events arriving
//! meanwhile are coalesced into the next rebuild.
//!
//! ## Threading
//!
//! [`notify`] delivers events on its own thread; they are forwarded into a
//! channel drained by one session thread, which owns the cache. Event
//! handling and rebuilds therefore never interleave. `stop()` lets a rebuild
//! already in progress finish, discards undebounced events, drops the OS
//! watcher and joins the thread. Reports not yet received, including the one
//! from that last rebuild, are returned by `stop()`.

use crate::digest::{self, Changes, DigestMap};
use crate::error::{Error, Result};
use crate::file::{Files, Stats};
use crate::reader::{self, ReadOptions, relative_key};
use crate::smith::Filesmith;
use crate::writer;
use notify::event::{CreateKind, EventKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Quiet period that ends a burst of events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Undelivered rebuild reports held before the session waits for the
/// consumer.
pub const REBUILD_BACKLOG: usize = 4;

/// What to observe and how long to wait for events to settle.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Paths to observe, relative to the working directory unless absolute.
    /// Empty means the source directory.
    pub paths: Vec<PathBuf>,
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl WatchOptions {
    pub fn paths<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Outcome of one build or rebuild.
#[derive(Debug, Clone)]
pub struct Rebuild {
    /// Full plugin output of this run.
    pub files: Files,
    /// Output paths compared to the previous run.
    pub changes: Changes,
    /// Whether the destination was cleaned and rewritten entirely.
    pub full: bool,
}

/// A running watch session.
pub struct WatchHandle {
    rebuilds: Receiver<Result<Rebuild>>,
    control: Sender<Msg>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stream of rebuild results. Ends after the session stops.
    pub fn rebuilds(&self) -> &Receiver<Result<Rebuild>> {
        &self.rebuilds
    }

    /// Wait up to `timeout` for the next rebuild.
    pub fn next_rebuild(&self, timeout: Duration) -> Option<Result<Rebuild>> {
        self.rebuilds.recv_timeout(timeout).ok()
    }

    /// Stop watching and wait for the session thread to exit. Returns the
    /// reports not yet received, oldest first, including the result of a
    /// rebuild that was in progress.
    pub fn stop(mut self) -> Vec<Result<Rebuild>> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Vec<Result<Rebuild>> {
        let Some(thread) = self.thread.take() else {
            return Vec::new();
        };
        // A send error means the session already exited.
        let _ = self.control.send(Msg::Stop);
        // Ends when the session thread drops its sender, which also unblocks
        // a session waiting on a full backlog.
        let remaining: Vec<_> = self.rebuilds.iter().collect();
        if thread.join().is_err() {
            warn!("watch session thread panicked");
        }
        debug!(undelivered = remaining.len(), "watch session closed");
        remaining
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Msg {
    Fs(notify::Result<Event>),
    Stop,
}

pub(crate) fn start(smith: Filesmith, options: WatchOptions) -> Result<WatchHandle> {
    let (session, initial) = Session::start(smith)?;

    let watched: Vec<PathBuf> = if options.paths.is_empty() {
        vec![session.source.clone()]
    } else {
        options
            .paths
            .iter()
            .map(|p| canonical(&session.smith.path([p])))
            .collect()
    };

    let (control, inbox) = mpsc::channel();
    let forward = control.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = forward.send(Msg::Fs(res));
    })?;
    for path in &watched {
        watcher.watch(path, RecursiveMode::Recursive)?;
    }
    info!(paths = ?watched, debounce_ms = options.debounce.as_millis() as u64, "watching");

    let (out, rebuilds) = mpsc::sync_channel(REBUILD_BACKLOG);
    // The receiver is still in scope and the backlog empty, so this cannot
    // fail or block.
    let _ = out.send(Ok(initial));

    let event_loop = EventLoop {
        session,
        _watcher: watcher,
        inbox,
        out,
        debounce: options.debounce,
    };
    let thread = thread::Builder::new()
        .name("filesmith-watch".into())
        .spawn(move || event_loop.run())
        .map_err(|e| Error::Watch(notify::Error::io(e)))?;

    Ok(WatchHandle {
        rebuilds,
        control,
        thread: Some(thread),
    })
}

// ============================================================================
// Event loop
// ============================================================================

struct EventLoop {
    session: Session,
    _watcher: RecommendedWatcher,
    inbox: Receiver<Msg>,
    out: SyncSender<Result<Rebuild>>,
    debounce: Duration,
}

impl EventLoop {
    fn run(mut self) {
        while let Some(batch) = self.next_batch() {
            let mut paths = BTreeSet::new();
            for event in batch {
                match event {
                    Ok(event) => paths.extend(event_paths(&event)),
                    Err(e) => {
                        warn!(error = %e, "watch error");
                        if self.out.send(Err(Error::Watch(e))).is_err() {
                            return;
                        }
                    }
                }
            }
            if paths.is_empty() {
                continue;
            }
            let Some(result) = self.session.handle(&paths) else {
                continue;
            };
            if self.out.send(result).is_err() {
                return;
            }
        }
    }

    /// Block for the first event, then collect until the debounce window
    /// passes without a new one. `None` once stopped.
    fn next_batch(&self) -> Option<Vec<notify::Result<Event>>> {
        let mut batch = match self.inbox.recv() {
            Ok(Msg::Fs(event)) => vec![event],
            Ok(Msg::Stop) | Err(_) => return None,
        };
        loop {
            match self.inbox.recv_timeout(self.debounce) {
                Ok(Msg::Fs(event)) => batch.push(event),
                Ok(Msg::Stop) | Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => return Some(batch),
            }
        }
    }
}

/// Paths an event concerns. Access events and bare directory creation do
/// not change any file.
fn event_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(_) | EventKind::Create(CreateKind::Folder) => Vec::new(),
        _ => event.paths.clone(),
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Cache and previous digests, owned by the session thread.
struct Session {
    smith: Filesmith,
    source: PathBuf,
    destination: PathBuf,
    cache: Files,
    digests: DigestMap,
}

impl Session {
    /// Initial full build.
    fn start(smith: Filesmith) -> Result<(Self, Rebuild)> {
        let cache = smith.read()?;
        let mut session = Self {
            source: canonical(&smith.source_dir()),
            destination: smith.destination_dir(),
            smith,
            cache,
            digests: DigestMap::new(),
        };
        let files = session.smith.run(session.cache.clone())?;
        session.write_all(&files)?;
        session.destination = canonical(&session.destination);
        let digests = digest::digest_files(&files);
        let changes = digest::diff(&DigestMap::new(), &digests);
        session.digests = digests;
        Ok((
            session,
            Rebuild {
                files,
                changes,
                full: true,
            },
        ))
    }

    /// Apply changed paths, then rebuild. `None` when nothing relevant
    /// changed.
    ///
    /// Every path is applied even when one fails, so the rest of the batch
    /// still reaches the cache. The first failure is then reported instead
    /// of a rebuild; the next successful rebuild picks up all of it.
    fn handle(&mut self, paths: &BTreeSet<PathBuf>) -> Option<Result<Rebuild>> {
        let mut relevant = false;
        let mut failure = None;
        for path in paths {
            match self.apply(path) {
                Ok(touched) => relevant |= touched,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to apply change");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Some(Err(e));
        }
        relevant.then(|| self.rebuild())
    }

    /// Bring the cache in line with `path`. Returns whether the path should
    /// trigger a rebuild.
    fn apply(&mut self, path: &Path) -> Result<bool> {
        if path.starts_with(&self.destination) {
            return Ok(false);
        }
        let Some(rel) = relative_key(&self.source, path) else {
            debug!(path = %path.display(), "change outside source");
            return Ok(true);
        };
        if self.smith.ignores().covers(&rel) {
            return Ok(false);
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remove(&rel);
                return Ok(true);
            }
            Err(e) => return Err(Error::read(path, e)),
        };

        let ignore = self.smith.ignores();
        if ignore.needs_stats() && self.predicate_covers(&rel) {
            self.remove(&rel);
            return Ok(true);
        }

        let matter = self.smith.matter();
        if meta.is_dir() {
            let fresh = reader::read_subtree(
                &self.source,
                path,
                &ReadOptions {
                    ignore,
                    concurrency: self.smith.concurrency_limit(),
                    matter: matter.as_ref(),
                },
            )?;
            self.remove(&rel);
            debug!(dir = %rel, count = fresh.len(), "re-read directory");
            self.cache.extend(fresh);
        } else {
            let file = reader::read_file(path, matter.as_ref())?;
            debug!(path = %rel, "re-read file");
            self.cache.insert(rel, file);
        }
        Ok(true)
    }

    /// Whether a predicate ignores `rel` or one of its parent directories,
    /// mirroring how a full read prunes ignored directories.
    fn predicate_covers(&self, rel: &str) -> bool {
        let ignore = self.smith.ignores();
        let mut prefix = String::with_capacity(rel.len());
        for segment in rel.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            let path = self.source.join(&prefix);
            let Ok(meta) = fs::metadata(&path) else {
                return false;
            };
            let is_symlink = fs::symlink_metadata(&path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if ignore.matches_predicate(&prefix, &Stats::from_metadata(&meta, is_symlink)) {
                return true;
            }
        }
        false
    }

    /// Drop `rel` and everything below it from the cache.
    fn remove(&mut self, rel: &str) {
        if rel.is_empty() {
            self.cache.clear();
            return;
        }
        let prefix = format!("{rel}/");
        self.cache
            .retain(|key, _| key != rel && !key.starts_with(&prefix));
    }

    fn rebuild(&mut self) -> Result<Rebuild> {
        let started = Instant::now();
        let files = self.smith.run(self.cache.clone())?;
        let next = digest::digest_files(&files);
        let changes = digest::diff(&self.digests, &next);
        let full = self.smith.cleans();

        if full {
            self.write_all(&files)?;
        } else {
            for rel in &changes.removed {
                writer::remove_output(&self.destination, rel)?;
            }
            let dirty: Files = changes
                .to_write()
                .filter_map(|rel| files.get_key_value(rel))
                .map(|(rel, file)| (rel.clone(), file.clone()))
                .collect();
            self.smith.write_to(&dirty, &self.destination)?;
        }
        self.digests = next;

        info!(
            %changes,
            full,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt"
        );
        Ok(Rebuild {
            files,
            changes,
            full,
        })
    }

    fn write_all(&self, files: &Files) -> Result<()> {
        if self.smith.cleans() {
            writer::clean_dir(&self.destination)?;
        }
        self.smith.write_to(files, &self.destination)
    }
}

/// Resolve symlinks so event paths compare equal to configured ones. Paths
/// that do not exist yet are kept as given.
fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
