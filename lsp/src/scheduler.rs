//! Validation scheduling: when a document is compiled and whether the result
//! is still worth publishing.
//!
//! Every open document has a [`Slot`]; events for documents that are not open
//! are ignored and never get one. Each event for the document bumps the
//! slot's generation and spawns a validation task that remembers the
//! generation it was started for. The task:
//!
//! 1. sleeps for the debounce delay (save and change only),
//! 2. gives up if a newer event arrived meanwhile,
//! 3. takes the slot's `running` lock, so at most one compilation per document
//!    is in flight,
//! 4. validates, then takes the `publishing` lock and publishes only if its
//!    generation is still current.
//!
//! A burst of saves therefore compiles once, after the last save has been
//! quiet for the delay, and a result computed for text that has since changed
//! is never shown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tactls_types::ValidationSettings;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use url::Url;

use crate::compiler::Compiler;
use crate::documents::DocumentStore;
use crate::types::Diagnostic;
use crate::validator::Validator;

/// Where finished diagnostics go; the server's implementation sends
/// `textDocument/publishDiagnostics`.
pub trait DiagnosticsSink: Send + Sync + 'static {
    fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Default)]
struct Slot {
    generation: AtomicU64,
    running: Mutex<()>,
    publishing: Mutex<()>,
}

impl Slot {
    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Resets the sweep flag when the sweep task ends, however it ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner<C, S> {
    validator: Validator<C>,
    sink: S,
    documents: Arc<DocumentStore>,
    settings: RwLock<ValidationSettings>,
    slots: Mutex<HashMap<Url, Arc<Slot>>>,
    sweeping: AtomicBool,
}

impl<C: Compiler, S: DiagnosticsSink> Inner<C, S> {
    async fn slot(&self, uri: &Url) -> Arc<Slot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(uri.clone()).or_default())
    }

    /// Drop `slot` if it is still the one registered for `uri`.
    async fn forget(&self, uri: &Url, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock().await;
        if slots.get(uri).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(uri);
        }
    }

    async fn run(&self, uri: Url, slot: Arc<Slot>, generation: u64, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !slot.is_current(generation) {
            tracing::trace!(%uri, generation, "Validation superseded before it started");
            return;
        }

        let settings = self.settings.read().await.clone();
        if !settings.live_check() {
            tracing::trace!(%uri, "Live check disabled; not validating");
            return;
        }

        let _running = slot.running.lock().await;
        if !slot.is_current(generation) {
            tracing::trace!(%uri, generation, "Validation superseded while queued");
            return;
        }
        let Some(document) = self.documents.get(&uri).await else {
            tracing::trace!(%uri, "Document closed before validation");
            self.forget(&uri, &slot).await;
            return;
        };
        let overlay = self.documents.overlay().await;

        let started = tokio::time::Instant::now();
        let diagnostics = self.validator.validate(&document, &settings, &overlay).await;

        let _publishing = slot.publishing.lock().await;
        if !slot.is_current(generation) {
            tracing::debug!(%uri, generation, "Discarding diagnostics for outdated text");
            return;
        }
        tracing::debug!(
            %uri,
            version = document.version(),
            count = diagnostics.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Publishing diagnostics"
        );
        self.sink.publish(uri, diagnostics).await;
    }
}

pub struct ValidationScheduler<C, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C, S> Clone for ValidationScheduler<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Compiler, S: DiagnosticsSink> ValidationScheduler<C, S> {
    pub fn new(
        validator: Validator<C>,
        sink: S,
        documents: Arc<DocumentStore>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                validator,
                sink,
                documents,
                settings: RwLock::new(settings),
                slots: Mutex::new(HashMap::new()),
                sweeping: AtomicBool::new(false),
            }),
        }
    }

    pub async fn settings(&self) -> ValidationSettings {
        self.inner.settings.read().await.clone()
    }

    pub fn sink(&self) -> &S {
        &self.inner.sink
    }

    /// Spawn a validation for `uri`, or return `None` when it is not open.
    async fn schedule(&self, uri: &Url, delay: Duration) -> Option<JoinHandle<()>> {
        if self.inner.documents.get(uri).await.is_none() {
            tracing::debug!(%uri, "Ignoring event for a document that is not open");
            return None;
        }
        let slot = self.inner.slot(uri).await;
        let generation = slot.bump();
        let inner = Arc::clone(&self.inner);
        let uri = uri.clone();
        Some(tokio::spawn(async move { inner.run(uri, slot, generation, delay).await }))
    }

    /// Validate right away; opening a file should show its errors at once.
    pub async fn did_open(&self, uri: &Url) -> Option<JoinHandle<()>> {
        self.schedule(uri, Duration::ZERO).await
    }

    pub async fn did_save(&self, uri: &Url) -> Option<JoinHandle<()>> {
        let delay = self.inner.settings.read().await.delay();
        self.schedule(uri, delay).await
    }

    pub async fn did_change(&self, uri: &Url) -> Option<JoinHandle<()>> {
        let delay = self.inner.settings.read().await.delay();
        self.schedule(uri, delay).await
    }

    /// Clear the document's diagnostics. Pending and in-flight validations for
    /// it are invalidated and will not publish.
    pub async fn did_close(&self, uri: &Url) {
        let slot = self.inner.slots.lock().await.remove(uri);
        let _publishing = match &slot {
            Some(slot) => {
                slot.bump();
                Some(slot.publishing.lock().await)
            }
            None => None,
        };
        self.inner.sink.publish(uri.clone(), Vec::new()).await;
    }

    /// Replace the validation settings. Turning live checking on (or changing
    /// settings while it is on) revalidates every open document.
    pub async fn update_settings(&self, settings: ValidationSettings) -> Option<JoinHandle<()>> {
        let live = settings.live_check();
        *self.inner.settings.write().await = settings;
        if live { self.sweep() } else { None }
    }

    /// Validate every open document, one after another. Returns `None` when a
    /// sweep is already running.
    pub fn sweep(&self) -> Option<JoinHandle<()>> {
        if self
            .inner
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Validation sweep already running; skipping");
            return None;
        }

        let scheduler = self.clone();
        Some(tokio::spawn(async move {
            let _guard = SweepGuard(&scheduler.inner.sweeping);
            let uris = scheduler.inner.documents.uris().await;
            for uri in &uris {
                let Some(handle) = scheduler.schedule(uri, Duration::ZERO).await else {
                    continue;
                };
                if let Err(e) = handle.await {
                    tracing::warn!(%uri, "Validation task failed: {e}");
                }
            }
            tracing::info!(count = uris.len(), "Validated all open documents");
        }))
    }
}
