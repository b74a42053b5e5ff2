//! Change notification: subscription handles, the per-backend subscriber
//! registry, and dispatch targets for marshaling callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use stow_types::Delta;
use tokio::sync::mpsc;

/// Callback invoked with each delivered delta.
pub type DeltaCallback<T> = Arc<dyn Fn(&Delta<T>) + Send + Sync>;

/// Lifecycle of a [`Subscription`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered; the backend for its type is not resolved yet.
    Pending,
    /// Attached to a backend; deltas are being delivered.
    Active,
    /// Terminal. Nothing is delivered.
    Disposed,
}

enum Stage {
    Pending,
    Active(Box<dyn FnOnce() + Send>),
    Disposed,
}

/// Handle to a registered delta callback.
///
/// Clones share the same registration. [`Subscription::dispose`] is safe in
/// every state; disposing a pending subscription means it is never attached.
/// Dropping a handle does not dispose it.
#[derive(Clone)]
pub struct Subscription {
    stage: Arc<Mutex<Stage>>,
}

impl Subscription {
    /// A subscription waiting for its backend.
    pub fn pending() -> Self {
        Self {
            stage: Arc::new(Mutex::new(Stage::Pending)),
        }
    }

    /// An attached subscription; `unregister` runs once on dispose.
    pub fn active(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stage: Arc::new(Mutex::new(Stage::Active(Box::new(unregister)))),
        }
    }

    /// Move a pending subscription to its next state.
    ///
    /// `attach` runs under the state lock, so a concurrent dispose either
    /// happens before (and `attach` is skipped) or after (and unregisters what
    /// `attach` returned). When `attach` yields nothing the subscription is
    /// disposed.
    pub fn activate_with(&self, attach: impl FnOnce() -> Option<Subscription>) {
        let mut stage = self.stage.lock().expect("subscription lock poisoned");
        if !matches!(*stage, Stage::Pending) {
            return;
        }
        *stage = match attach() {
            Some(inner) => Stage::Active(Box::new(move || inner.dispose())),
            None => Stage::Disposed,
        };
    }

    /// Stop delivery. Idempotent.
    pub fn dispose(&self) {
        let previous = {
            let mut stage = self.stage.lock().expect("subscription lock poisoned");
            std::mem::replace(&mut *stage, Stage::Disposed)
        };
        if let Stage::Active(unregister) = previous {
            unregister();
        }
    }

    pub fn state(&self) -> SubscriptionState {
        match *self.stage.lock().expect("subscription lock poisoned") {
            Stage::Pending => SubscriptionState::Pending,
            Stage::Active(_) => SubscriptionState::Active,
            Stage::Disposed => SubscriptionState::Disposed,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &self.state())
            .finish()
    }
}

struct Subscriber<T> {
    id: u64,
    key: Option<String>,
    callback: DeltaCallback<T>,
}

impl<T> Subscriber<T> {
    fn matches(&self, delta: &Delta<T>) -> bool {
        self.key.as_deref().map_or(true, |key| key == delta.key)
    }
}

struct RegistryInner<T> {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

/// Fan-out of deltas to whole-type and single-key subscribers.
///
/// Backends call [`SubscriptionRegistry::notify`] after each applied mutation
/// and are responsible for serializing those calls in mutation order.
pub struct SubscriptionRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T: Send + Sync + 'static> SubscriptionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a callback, optionally filtered to one key.
    pub fn subscribe(&self, key: Option<&str>, callback: DeltaCallback<T>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .expect("registry lock poisoned")
            .push(Subscriber {
                id,
                key: key.map(str::to_owned),
                callback,
            });

        let registry: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        Subscription::active(move || {
            if let Some(inner) = registry.upgrade() {
                inner
                    .subscribers
                    .write()
                    .expect("registry lock poisoned")
                    .retain(|sub| sub.id != id);
            }
        })
    }

    /// Deliver a delta to every matching subscriber, in registration order.
    ///
    /// Callbacks run outside the registry lock, so they may dispose
    /// subscriptions or register new ones.
    pub fn notify(&self, delta: &Delta<T>) {
        let targets: Vec<DeltaCallback<T>> = self
            .inner
            .subscribers
            .read()
            .expect("registry lock poisoned")
            .iter()
            .filter(|sub| sub.matches(delta))
            .map(|sub| Arc::clone(&sub.callback))
            .collect();
        for callback in targets {
            callback(delta);
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .expect("registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + Sync + 'static> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of callback work posted to a [`DispatchTarget`].
pub type Job = Box<dyn FnOnce() + Send>;

/// An execution context callbacks are marshaled onto.
///
/// Targets must run jobs in the order they were posted.
pub trait DispatchTarget: Send + Sync {
    fn post(&self, job: Job);
}

/// Runs jobs synchronously on the posting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl DispatchTarget for Immediate {
    fn post(&self, job: Job) {
        job();
    }
}

/// Posting side of an ordered job queue. See [`dispatch_queue`].
#[derive(Clone, Debug)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl DispatchTarget for DispatchQueue {
    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::debug!("dispatch worker dropped; job discarded");
        }
    }
}

/// Executing side of an ordered job queue.
///
/// Owned by whichever context the callbacks belong to, which either drives it
/// with [`DispatchWorker::run`] or pumps it with [`DispatchWorker::run_pending`].
#[derive(Debug)]
pub struct DispatchWorker {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl DispatchWorker {
    /// Run jobs until every [`DispatchQueue`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run every job queued so far without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

/// Create an ordered dispatch target and the worker that executes it.
pub fn dispatch_queue() -> (DispatchQueue, DispatchWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchQueue { tx }, DispatchWorker { rx })
}
