use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use stow_types::Entity;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, BackendFactory};

/// Type-erased `Arc<dyn Backend<T>>`.
type ErasedBackend = Arc<dyn Any + Send + Sync>;

/// Deferred work that must run against a backend before it serves traffic.
type Activation = Box<dyn FnOnce(&ErasedBackend) + Send>;

/// Per-type registry slot: the once-only backend cell plus the queue of
/// activations waiting for it.
struct Slot {
    backend: OnceCell<Result<ErasedBackend, String>>,
    pending: Mutex<VecDeque<Activation>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            backend: OnceCell::new(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Run every queued activation against `backend`.
    ///
    /// The queue lock is held for the whole drain, so a concurrent caller
    /// cannot reach the backend until activations queued before it have run.
    fn drain(&self, backend: &ErasedBackend) {
        let mut pending = self.pending.lock().expect("pending queue lock poisoned");
        while let Some(activation) = pending.pop_front() {
            activation(backend);
        }
    }
}

/// Memoized, lazily constructed backends keyed by entity type.
///
/// Each type's backend is created at most once, even under concurrent first
/// access. A failed construction is remembered and reported to every later
/// caller; it is not retried.
pub struct BackendRegistry<F> {
    factory: F,
    slots: Mutex<HashMap<TypeId, Arc<Slot>>>,
}

impl<F: BackendFactory> BackendRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The backend for `T`, creating it on first use.
    ///
    /// Queued activations for `T` run before this returns.
    pub async fn resolve<T: Entity>(&self) -> StoreResult<Arc<dyn Backend<T>>> {
        let slot = self.slot::<T>();
        let type_name = std::any::type_name::<T>();
        let created = slot
            .backend
            .get_or_init(|| async {
                match self.factory.create::<T>().await {
                    Ok(backend) => {
                        info!(entity = type_name, "backend created");
                        Ok(Arc::new(backend) as ErasedBackend)
                    }
                    Err(e) => {
                        error!(entity = type_name, error = %e, "backend construction failed");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        let erased = match created {
            Ok(erased) => erased,
            Err(reason) => {
                return Err(StoreError::BackendInit {
                    type_name,
                    reason: reason.clone(),
                })
            }
        };

        slot.drain(erased);
        downcast::<T>(erased)
    }

    /// Queue `activation` to run against `T`'s backend before it serves any
    /// further operation. Runs immediately if the backend already exists.
    ///
    /// Activations queued for a type whose backend failed to construct are
    /// never run.
    pub fn enqueue<T: Entity>(
        &self,
        activation: impl FnOnce(&Arc<dyn Backend<T>>) + Send + 'static,
    ) {
        let slot = self.slot::<T>();
        let erased: Activation = Box::new(move |backend: &ErasedBackend| {
            if let Ok(backend) = downcast::<T>(backend) {
                activation(&backend);
            }
        });
        slot.pending
            .lock()
            .expect("pending queue lock poisoned")
            .push_back(erased);

        if let Some(Ok(backend)) = slot.backend.get() {
            slot.drain(backend);
        }
    }

    /// Returns `true` once `T`'s backend has been constructed successfully.
    pub fn is_resolved<T: Entity>(&self) -> bool {
        matches!(self.slot::<T>().backend.get(), Some(Ok(_)))
    }

    /// Number of activations waiting for `T`'s backend.
    pub fn pending_count<T: Entity>(&self) -> usize {
        self.slot::<T>()
            .pending
            .lock()
            .expect("pending queue lock poisoned")
            .len()
    }

    fn slot<T: 'static>(&self) -> Arc<Slot> {
        let mut slots = self.slots.lock().expect("registry lock poisoned");
        Arc::clone(
            slots
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }
}

fn downcast<T: Entity>(erased: &ErasedBackend) -> StoreResult<Arc<dyn Backend<T>>> {
    erased
        .as_ref()
        .downcast_ref::<Arc<dyn Backend<T>>>()
        .cloned()
        .ok_or_else(|| {
            StoreError::Backend(format!(
                "registry slot does not hold a backend for {}",
                std::any::type_name::<T>()
            ))
        })
}
