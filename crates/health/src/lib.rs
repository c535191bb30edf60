//! Health Registry (C3): process-wide component health, derived
//! capabilities, and the degraded-write queue. See §4.3.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use facegate_core::{Capabilities, Component, ComponentState, HealthSnapshot, QueuedRegistration, Status};

type Callback = Box<dyn Fn(&HealthSnapshot) + Send + Sync>;

struct Inner {
    components: HashMap<Component, ComponentState>,
    queue: VecDeque<QueuedRegistration>,
    callbacks: Vec<Callback>,
}

fn initial_components() -> HashMap<Component, ComponentState> {
    let mut map = HashMap::new();
    for component in [Component::FaceModel, Component::VectorIndex, Component::TokenAuthority] {
        map.insert(
            component,
            ComponentState {
                status: Status::Unavailable,
                message: "not yet initialized".to_string(),
                last_checked: Utc::now(),
                error: None,
            },
        );
    }
    map
}

/// Shared handle to the health registry. Cheap to clone (`Arc` inside).
#[derive(Clone)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        HealthRegistry {
            inner: Arc::new(RwLock::new(Inner {
                components: initial_components(),
                queue: VecDeque::new(),
                callbacks: Vec::new(),
            })),
        }
    }

    /// Record a component's status. If it differs from the previous status,
    /// registered callbacks fire asynchronously via `tokio::spawn` so a slow
    /// callback can never block the caller (§4.3/§5).
    pub fn update(&self, component: Component, status: Status, message: impl Into<String>, error: Option<String>) {
        let message = message.into();
        let (changed, snapshot) = {
            let mut inner = self.inner.write();
            let previous_status = inner.components.get(&component).map(|c| c.status);
            inner.components.insert(
                component,
                ComponentState {
                    status,
                    message,
                    last_checked: Utc::now(),
                    error,
                },
            );
            let changed = previous_status != Some(status);
            (changed, self.build_snapshot(&inner))
        };

        if changed {
            tracing::info!(component = component.as_str(), status = ?status, "component status changed");
            self.fire_callbacks(&snapshot);

            if component == Component::VectorIndex && status == Status::Healthy {
                tracing::info!("vector index recovered; queue is ready to drain");
            }
        }
    }

    fn fire_callbacks(&self, snapshot: &HealthSnapshot) {
        let callbacks_len = self.inner.read().callbacks.len();
        for i in 0..callbacks_len {
            let inner = self.inner.clone();
            let snapshot = snapshot.clone();
            let run = move || {
                let guard = inner.read();
                if let Some(cb) = guard.callbacks.get(i) {
                    cb(&snapshot);
                }
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { run() });
                }
                Err(_) => run(),
            }
        }
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&HealthSnapshot) + Send + Sync + 'static,
    {
        self.inner.write().callbacks.push(Box::new(callback));
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.read();
        self.build_snapshot(&inner)
    }

    fn build_snapshot(&self, inner: &Inner) -> HealthSnapshot {
        let overall = inner
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(Status::Unavailable);
        let face_model = inner
            .components
            .get(&Component::FaceModel)
            .map(|c| c.status)
            .unwrap_or(Status::Unavailable);
        let vector_index = inner
            .components
            .get(&Component::VectorIndex)
            .map(|c| c.status)
            .unwrap_or(Status::Unavailable);
        HealthSnapshot {
            overall,
            components: inner.components.clone(),
            capabilities: Capabilities::derive(face_model, vector_index),
            queued_count: inner.queue.len(),
        }
    }

    /// Enqueue a registration attempted while the vector index was
    /// degraded; it drains once the index recovers.
    pub fn enqueue(&self, registration: QueuedRegistration) {
        self.inner.write().queue.push_back(registration);
    }

    /// Drain the full queue in enqueue (FIFO) order for the Identity
    /// Service to replay.
    pub fn drain(&self) -> Vec<QueuedRegistration> {
        let mut inner = self.inner.write();
        inner.queue.drain(..).collect()
    }

    pub fn clear_queue(&self) {
        self.inner.write().queue.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.inner.read().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn callback_fires_only_on_status_change() {
        let registry = HealthRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.register_callback(move |_snapshot| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.update(Component::FaceModel, Status::Healthy, "ready", None);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same status again: no callback.
        registry.update(Component::FaceModel, Status::Healthy, "still ready", None);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.update(Component::FaceModel, Status::Degraded, "slow", None);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn overall_status_is_the_worst_component() {
        let registry = HealthRegistry::new();
        registry.update(Component::FaceModel, Status::Healthy, "ok", None);
        registry.update(Component::VectorIndex, Status::Degraded, "slow disk", None);
        registry.update(Component::TokenAuthority, Status::Healthy, "ok", None);
        assert_eq!(registry.snapshot().overall, Status::Degraded);
    }

    #[test]
    fn queue_drains_in_fifo_order() {
        let registry = HealthRegistry::new();
        for i in 0..3 {
            registry.enqueue(QueuedRegistration {
                ts: Utc::now(),
                name: format!("user-{i}"),
                image_bytes: vec![],
                metadata: StdHashMap::new(),
            });
        }
        assert_eq!(registry.queue_len(), 3);
        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].name, "user-0");
        assert_eq!(drained[2].name, "user-2");
        assert_eq!(registry.queue_len(), 0);
    }
}
