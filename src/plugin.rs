//! Plugins and the middleware runner.
//!
//! A plugin is one transformation stage. It receives the shared [`Files`]
//! store and a [`Context`], and either succeeds or fails with a
//! [`PluginError`]. Three completion styles are accepted and normalized into
//! the single [`Plugin::run`] contract:
//!
//! ```text
//! sync(|files, ctx| { ...; Ok(()) })                  returns when done
//! callback(|files, ctx, done| done.call(Ok(())))      signals through `done`
//! deferred(|files, ctx| Box::pin(async move { .. }))  resolves a future
//! ```
//!
//! Plain closures and any type implementing [`Plugin`] can be registered
//! directly; the adapters exist so closures get their signature inferred.
//!
//! ## Runner
//!
//! [`run_plugins`] executes plugins strictly one at a time in registration
//! order, all against the same store. The first failure stops the chain and
//! is returned as [`Error::Plugin`] carrying the plugin's own error.

use crate::error::{Error, PluginError, Result};
use crate::file::{Files, Metadata};
use crate::smith::Filesmith;
use futures::future::BoxFuture;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::mpsc;
use tracing::debug;

/// One stage of the transformation chain.
pub trait Plugin: Send + Sync {
    fn run(&self, files: &mut Files, ctx: &mut Context) -> Result<(), PluginError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Plugin for F
where
    F: Fn(&mut Files, &mut Context) -> Result<(), PluginError> + Send + Sync,
{
    fn run(&self, files: &mut Files, ctx: &mut Context) -> Result<(), PluginError> {
        self(files, ctx)
    }
}

/// Shared, type-erased plugin as stored by [`Filesmith`].
pub type BoxedPlugin = Arc<dyn Plugin>;

// ============================================================================
// Completion adapters
// ============================================================================

/// Register a closure that finishes when it returns.
pub fn sync<F>(f: F) -> F
where
    F: Fn(&mut Files, &mut Context) -> Result<(), PluginError> + Send + Sync,
{
    f
}

/// Register a closure that reports completion through a [`Done`] signal.
pub fn callback<F>(f: F) -> Callback<F>
where
    F: Fn(&mut Files, &mut Context, Done) + Send + Sync,
{
    Callback(f)
}

/// Register a closure that returns a future; the plugin is complete when the
/// future resolves.
pub fn deferred<F>(f: F) -> Deferred<F>
where
    F: for<'a> Fn(&'a mut Files, &'a mut Context) -> BoxFuture<'a, Result<(), PluginError>>
        + Send
        + Sync,
{
    Deferred(f)
}

/// Completion signal handed to callback plugins. Consumed on use, so it can
/// fire at most once; dropping it unfired fails the plugin.
pub struct Done {
    tx: mpsc::SyncSender<Result<(), PluginError>>,
}

impl Done {
    /// Settle the plugin with `result`.
    pub fn call(self, result: Result<(), PluginError>) {
        // The runner is blocked on the receiver until this send or a drop.
        let _ = self.tx.send(result);
    }

    pub fn ok(self) {
        self.call(Ok(()));
    }

    pub fn fail(self, err: impl Into<PluginError>) {
        self.call(Err(err.into()));
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Done")
    }
}

/// Failure reported when a callback plugin drops [`Done`] without calling it.
#[derive(Debug, thiserror::Error)]
#[error("plugin dropped its completion signal without calling it")]
pub struct SignalDropped;

/// Adapter for callback-style plugins. See [`callback`].
pub struct Callback<F>(F);

impl<F> Plugin for Callback<F>
where
    F: Fn(&mut Files, &mut Context, Done) + Send + Sync,
{
    fn run(&self, files: &mut Files, ctx: &mut Context) -> Result<(), PluginError> {
        let (tx, rx) = mpsc::sync_channel(1);
        (self.0)(files, ctx, Done { tx });
        rx.recv().unwrap_or_else(|_| Err(SignalDropped.into()))
    }

    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }
}

/// Adapter for future-returning plugins. See [`deferred`].
pub struct Deferred<F>(F);

impl<F> Plugin for Deferred<F>
where
    F: for<'a> Fn(&'a mut Files, &'a mut Context) -> BoxFuture<'a, Result<(), PluginError>>
        + Send
        + Sync,
{
    fn run(&self, files: &mut Files, ctx: &mut Context) -> Result<(), PluginError> {
        futures::executor::block_on((self.0)(files, ctx))
    }

    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }
}

// ============================================================================
// Context
// ============================================================================

/// What a plugin sees besides the store: the build settings (through
/// `Deref<Target = Filesmith>`) and this run's copy of the global metadata.
///
/// The metadata is copied from the build settings when the run starts, so
/// writes made by plugins are visible to later plugins of the same run but
/// never leak into the next run.
pub struct Context {
    smith: Filesmith,
    metadata: Metadata,
}

impl Context {
    pub fn new(smith: Filesmith) -> Self {
        let metadata = smith.global_metadata().clone();
        Self { smith, metadata }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn into_metadata(self) -> Metadata {
        self.metadata
    }
}

impl Deref for Context {
    type Target = Filesmith;

    fn deref(&self) -> &Filesmith {
        &self.smith
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Run `plugins` in order against `files`. Stops at the first failure.
pub fn run_plugins(files: &mut Files, plugins: &[BoxedPlugin], ctx: &mut Context) -> Result<()> {
    for (index, plugin) in plugins.iter().enumerate() {
        debug!(index, plugin = plugin.name(), files = files.len(), "running plugin");
        plugin.run(files, ctx).map_err(Error::Plugin)?;
    }
    Ok(())
}
