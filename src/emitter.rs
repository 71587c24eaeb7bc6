//! A lightweight named-event emitter in the spirit of Node.js'
//! `EventEmitter`, adapted to typed event kinds and payloads.
//!
//! Listeners for a single emission are snapshotted before dispatch: a
//! listener that registers or removes other listeners while running does not
//! affect the current cycle. A listener may return a future; it is spawned
//! to run to completion and an eventual error is logged without
//! propagating.

use crate::error::Error;
use crate::events::{EventKind, Payload};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, warn};

/// Error type returned by asynchronous listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The future an asynchronous listener hands back to the emitter.
pub type ListenerFuture = BoxFuture<'static, Result<(), BoxError>>;

type ListenerFn = dyn Fn(&Payload) -> Option<ListenerFuture> + Send + Sync;

/// Handle identifying a registered listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Registering a listener would exceed the cap set via
/// [`EventEmitter::set_max_listeners`].
#[derive(Debug, thiserror::Error)]
#[error("Max listeners ({limit}) exceeded for event {kind:?}")]
pub struct MaxListenersExceeded {
    /// The event that hit the cap.
    pub kind: EventKind,
    /// The configured cap.
    pub limit: usize,
}

struct Entry {
    id: u64,
    once: bool,
    callback: Arc<ListenerFn>,
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<EventKind, Vec<Entry>>,
    next_id: u64,
    max_listeners: usize,
}

/// Named multi-listener dispatch with support for one-shot and asynchronous
/// listeners.
#[derive(Default)]
pub struct EventEmitter {
    registry: Mutex<Registry>,
}

impl EventEmitter {
    /// Creates an emitter with no listeners and no listener cap.
    pub fn new() -> EventEmitter {
        EventEmitter::default()
    }

    /// Caps the number of listeners per event. `0` (the default) removes
    /// the cap.
    pub fn set_max_listeners(&self, n: usize) {
        self.registry.lock().unwrap().max_listeners = n;
    }

    fn add(
        &self,
        kind: EventKind,
        once: bool,
        callback: Arc<ListenerFn>,
    ) -> Result<ListenerId, MaxListenersExceeded> {
        let mut registry = self.registry.lock().unwrap();
        let limit = registry.max_listeners;
        let entries = registry.listeners.entry(kind).or_default();
        if limit > 0 && entries.len() >= limit {
            return Err(MaxListenersExceeded { kind, limit });
        }
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .get_mut(&kind)
            .unwrap()
            .push(Entry { id, once, callback });
        Ok(ListenerId(id))
    }

    /// Registers a synchronous listener.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.add(
            kind,
            false,
            Arc::new(move |payload| {
                listener(payload);
                None
            }),
        )
    }

    /// Registers a listener whose returned future is spawned on each
    /// delivery. The future's error is logged and does not propagate.
    pub fn on_async<F>(
        &self,
        kind: EventKind,
        listener: F,
    ) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) -> ListenerFuture + Send + Sync + 'static,
    {
        self.add(kind, false, Arc::new(move |payload| Some(listener(payload))))
    }

    /// Registers a listener that is removed after its first delivery.
    pub fn once<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.add(
            kind,
            true,
            Arc::new(move |payload| {
                listener(payload);
                None
            }),
        )
    }

    /// Removes a previously registered listener. Returns whether a listener
    /// was removed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        match registry.listeners.get_mut(&kind) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id.0);
                let removed = entries.len() != before;
                if entries.is_empty() {
                    registry.listeners.remove(&kind);
                }
                removed
            }
            None => false,
        }
    }

    /// Removes all listeners for `kind`, or every listener when `kind` is
    /// `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut registry = self.registry.lock().unwrap();
        match kind {
            Some(kind) => {
                registry.listeners.remove(&kind);
            }
            None => registry.listeners.clear(),
        }
    }

    /// Handles of the listeners currently registered for `kind`.
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.registry
            .lock()
            .unwrap()
            .listeners
            .get(&kind)
            .map(|entries| entries.iter().map(|entry| ListenerId(entry.id)).collect())
            .unwrap_or_default()
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .unwrap()
            .listeners
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers `payload` to every listener of `kind`. Returns whether at
    /// least one listener received it.
    pub fn emit(&self, kind: EventKind, payload: &Payload) -> bool {
        let snapshot: Vec<Arc<ListenerFn>> = {
            let mut registry = self.registry.lock().unwrap();
            match registry.listeners.get_mut(&kind) {
                Some(entries) => {
                    let snapshot = entries
                        .iter()
                        .map(|entry| Arc::clone(&entry.callback))
                        .collect();
                    entries.retain(|entry| !entry.once);
                    if entries.is_empty() {
                        registry.listeners.remove(&kind);
                    }
                    snapshot
                }
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            return false;
        }

        for callback in snapshot {
            if let Some(future) = callback(payload) {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Err(e) = future.await {
                                error!("Unhandled error in event listener: {}", e);
                            }
                        });
                    }
                    Err(_) => warn!("Async event listener dropped outside a runtime"),
                }
            }
        }
        true
    }

    /// Emits `kinds[i]` with `payloads[i]`; when `kinds` is longer than
    /// `payloads`, the last payload is reused for the trailing events.
    pub fn emit_many(&self, kinds: &[EventKind], payloads: &[Payload]) {
        let Some(last) = payloads.last() else {
            return;
        };
        for (index, kind) in kinds.iter().enumerate() {
            let payload = payloads.get(index).unwrap_or(last);
            self.emit(*kind, payload);
        }
    }

    /// Emits an `error` event. When nobody is listening the error is handed
    /// back to the caller so the failure can be propagated instead of
    /// silently vanishing.
    pub fn emit_error(&self, error: Arc<Error>) -> Result<(), Arc<Error>> {
        let payload = Payload::Error {
            error: Arc::clone(&error),
        };
        if self.emit(EventKind::Error, &payload) {
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Waits for the next emission of `kind`, up to `timeout`.
    pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Payload, Error> {
        self.wait_for_where(kind, |_| true, timeout).await
    }

    /// Waits for the next emission of `kind` matching `predicate`, up to
    /// `timeout`. Non-matching emissions are ignored and keep waiting.
    pub async fn wait_for_where<P>(
        &self,
        kind: EventKind,
        predicate: P,
        timeout: Duration,
    ) -> Result<Payload, Error>
    where
        P: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.add(
            kind,
            false,
            Arc::new(move |payload| {
                if predicate(payload) {
                    if let Some(tx) = slot.lock().unwrap().take() {
                        tx.send(payload.clone()).ok();
                    }
                }
                None
            }),
        )?;

        let result = tokio::time::timeout(timeout, rx).await;
        self.off(kind, id);
        match result {
            Ok(Ok(payload)) => Ok(payload),
            _ => Err(Error::CommandTimedOut(format!("{:?}", kind))),
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}
