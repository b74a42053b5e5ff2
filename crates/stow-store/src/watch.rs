//! Higher-level delivery models built on [`Storage::subscribe`].
//!
//! Every watcher takes an optional [`DispatchTarget`]. With a target, the
//! callback is posted there; without one it runs synchronously on the task
//! that applied the mutation. Comparisons against the previously seen value
//! always happen synchronously, in mutation order, before anything is posted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use stow_types::{Delta, Entity};

use crate::error::StoreResult;
use crate::storage::Storage;
use crate::sync::{DispatchTarget, Subscription};
use crate::traits::BackendFactory;

/// Where watcher callbacks run. `None` means inline.
pub type Target = Option<Arc<dyn DispatchTarget>>;

fn deliver(target: &Target, job: impl FnOnce() + Send + 'static) {
    match target {
        Some(target) => target.post(Box::new(job)),
        None => job(),
    }
}

/// The value a delta leaves behind: the new value, or `T::default()` for
/// a removal.
fn resulting_value<T: Entity>(delta: &Delta<T>) -> T {
    delta.value.clone().unwrap_or_default()
}

struct LastSeen<T> {
    value: T,
    primed: bool,
}

impl<T: Default> LastSeen<T> {
    fn new() -> Self {
        Self {
            value: T::default(),
            primed: false,
        }
    }
}

impl<F: BackendFactory> Storage<F> {
    /// Current value for an initial delivery. Disposes `subscription` if the
    /// read fails so a failed watch leaves nothing registered.
    async fn current_value<T: Entity>(
        &self,
        key: &str,
        subscription: &Subscription,
    ) -> StoreResult<T> {
        match self.get::<T>(key).await {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(err) => {
                subscription.dispose();
                Err(err)
            }
        }
    }

    /// Whole-type watcher: every delta of `T`, marshaled onto `target`.
    pub fn watch<T: Entity>(
        &self,
        target: Target,
        callback: impl Fn(Delta<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let callback = Arc::new(callback);
        self.subscribe(move |delta: &Delta<T>| {
            let callback = Arc::clone(&callback);
            let delta = delta.clone();
            deliver(&target, move || callback(delta));
        })
    }

    /// Single-key value watcher.
    ///
    /// Delivers the current value once (or `T::default()` when absent), then
    /// the resulting value of every change to `key`. The initial delivery is
    /// skipped if a change already arrived while the current value was being
    /// fetched.
    pub async fn watch_key<T: Entity>(
        &self,
        key: &str,
        target: Target,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> StoreResult<Subscription> {
        let callback = Arc::new(callback);
        let primed = Arc::new(AtomicBool::new(false));

        let subscription = {
            let callback = Arc::clone(&callback);
            let primed = Arc::clone(&primed);
            let target = target.clone();
            self.subscribe_key(key, move |delta: &Delta<T>| {
                primed.store(true, Ordering::SeqCst);
                let callback = Arc::clone(&callback);
                let value = resulting_value(delta);
                deliver(&target, move || callback(value));
            })
        };

        let current = self.current_value::<T>(key, &subscription).await?;
        if !primed.swap(true, Ordering::SeqCst) {
            deliver(&target, move || callback(current));
        }
        Ok(subscription)
    }

    /// Single-key watcher that only fires when `projection` of the value
    /// changes.
    ///
    /// Keeps its own clone of the last seen value. The current value is
    /// delivered once up front, as with [`Storage::watch_key`].
    pub async fn watch_changed<T, P>(
        &self,
        key: &str,
        target: Target,
        projection: impl Fn(&T) -> P + Send + Sync + 'static,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> StoreResult<Subscription>
    where
        T: Entity,
        P: PartialEq,
    {
        let callback = Arc::new(callback);
        let last = Arc::new(Mutex::new(LastSeen::<T>::new()));

        let subscription = {
            let callback = Arc::clone(&callback);
            let last = Arc::clone(&last);
            let target = target.clone();
            self.subscribe_key(key, move |delta: &Delta<T>| {
                let value = resulting_value(delta);
                let changed = {
                    let mut last = last.lock().expect("watcher lock poisoned");
                    let changed = !last.primed || projection(&value) != projection(&last.value);
                    last.value = value.clone();
                    last.primed = true;
                    changed
                };
                if changed {
                    let callback = Arc::clone(&callback);
                    deliver(&target, move || callback(value));
                }
            })
        };

        let current = self.current_value::<T>(key, &subscription).await?;
        let initial = {
            let mut last = last.lock().expect("watcher lock poisoned");
            if last.primed {
                None
            } else {
                last.value = current.clone();
                last.primed = true;
                Some(current)
            }
        };
        if let Some(current) = initial {
            deliver(&target, move || callback(current));
        }
        Ok(subscription)
    }

    /// Single-key watcher delivering `(new, previous)` pairs.
    ///
    /// The first delivery is the current value paired with `T::default()`.
    pub async fn watch_pair<T: Entity>(
        &self,
        key: &str,
        target: Target,
        callback: impl Fn(T, T) + Send + Sync + 'static,
    ) -> StoreResult<Subscription> {
        let callback = Arc::new(callback);
        let last = Arc::new(Mutex::new(LastSeen::<T>::new()));

        let subscription = {
            let callback = Arc::clone(&callback);
            let last = Arc::clone(&last);
            let target = target.clone();
            self.subscribe_key(key, move |delta: &Delta<T>| {
                let value = resulting_value(delta);
                let previous = {
                    let mut last = last.lock().expect("watcher lock poisoned");
                    last.primed = true;
                    std::mem::replace(&mut last.value, value.clone())
                };
                let callback = Arc::clone(&callback);
                deliver(&target, move || callback(value, previous));
            })
        };

        let current = self.current_value::<T>(key, &subscription).await?;
        let initial = {
            let mut last = last.lock().expect("watcher lock poisoned");
            if last.primed {
                None
            } else {
                last.value = current.clone();
                last.primed = true;
                Some(current)
            }
        };
        if let Some(current) = initial {
            deliver(&target, move || callback(current, T::default()));
        }
        Ok(subscription)
    }
}
