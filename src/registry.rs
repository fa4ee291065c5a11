use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread safe typed map shared between the pool, its workers and monitors.
///
/// Values are cloned out on `get`, so readers never hold the lock while they
/// look at an entry.
#[derive(Debug)]
pub struct Registry<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// store a value, returning the one it replaced
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.write().insert(key, value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.read().get(key).cloned()
    }

    /// Applies `f` to an existing entry while holding the write lock.
    /// Returns false if the key is absent.
    pub fn update<Q, F>(&self, key: &Q, f: F) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        F: FnOnce(&mut V),
    {
        match self.write().get_mut(key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // no caller code runs under the lock, so a poisoned map is still consistent
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone + Default,
{
    /// zero value for unknown keys
    pub fn get_or_default<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).unwrap_or_default()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ProcessControl;
    use crate::process::{Pid, ProcessStats, WorkerName};
    use crate::status::{ProcessStatus, WorkerStatus};
    use std::sync::Arc;
    use std::thread;
    use std::time::SystemTime;

    #[test]
    fn control_registry_put_get() {
        let controls: Registry<Pid, Arc<ProcessControl>> = Registry::new();
        let control = Arc::new(ProcessControl::new());
        controls.put(Pid::from("p-11"), control.clone());

        let found = controls.get(&Pid::from("p-11")).unwrap();
        assert!(Arc::ptr_eq(&found, &control));
        assert!(controls.get(&Pid::from("p-12")).is_none());
    }

    #[test]
    fn worker_registry_put_get() {
        let workers: Registry<WorkerName, WorkerStatus> = Registry::new();
        workers.put(WorkerName::from("w1"), WorkerStatus::Busy);

        assert_eq!(workers.get_or_default(&WorkerName::from("w1")), WorkerStatus::Busy);
        assert_eq!(
            workers.get_or_default(&WorkerName::from("w2")),
            WorkerStatus::Waiting
        );
    }

    #[test]
    fn process_registry_put_get() {
        let processes: Registry<Pid, ProcessStats> = Registry::new();
        let started = SystemTime::now();
        processes.put(
            Pid::from("p-11"),
            ProcessStats {
                worker_name: WorkerName::from("w1"),
                started_at: Some(started),
                ..ProcessStats::default()
            },
        );

        let stats = processes.get_or_default(&Pid::from("p-11"));
        assert_eq!(stats.worker_name, WorkerName::from("w1"));
        assert_eq!(stats.started_at, Some(started));
    }

    #[test]
    fn put_replaces_previous_value() {
        let registry: Registry<String, u32> = Registry::new();
        assert_eq!(registry.put("a".to_owned(), 1), None);
        assert_eq!(registry.put("a".to_owned(), 2), Some(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_only_touches_existing_entries() {
        let processes: Registry<Pid, ProcessStats> = Registry::new();
        processes.put(Pid::from("p-1"), ProcessStats::default());

        assert!(processes.update(&Pid::from("p-1"), |s| s.status = ProcessStatus::Running));
        assert!(!processes.update(&Pid::from("p-2"), |s| s.status = ProcessStatus::Running));
        assert_eq!(
            processes.get_or_default(&Pid::from("p-1")).status,
            ProcessStatus::Running
        );
        assert!(!processes.contains(&Pid::from("p-2")));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let counters: Arc<Registry<&'static str, u64>> = Arc::new(Registry::new());
        counters.put("hits", 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.update("hits", |n| *n += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.get("hits"), Some(8000));
    }
}
