//! Per-thread client cache
//!
//! A [`ClientRegistry`] hands out one store handle per thread, created on first
//! use by a factory and reused for every later lookup from that thread until
//! the thread releases it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crate::error::Result;
use crate::traits::ObjectStore;

/// Builds a store handle for the calling thread
pub type StoreFactory = dyn Fn() -> Result<Arc<dyn ObjectStore>> + Send + Sync;

/// Thread id to store handle map, filled lazily
///
/// Entries are not dropped when their thread exits; a handle (and the
/// connection pool behind it) lives until [`ClientRegistry::release_current`]
/// is called from that thread or the registry itself is dropped. Short-lived
/// threads, such as blocking-pool workers, should release before they finish.
pub struct ClientRegistry {
    factory: Box<StoreFactory>,
    clients: RwLock<HashMap<ThreadId, Arc<dyn ObjectStore>>>,
}

impl ClientRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ObjectStore>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registry that returns the same handle on every thread
    pub fn shared(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(move || Ok(Arc::clone(&store)))
    }

    /// Handle for the calling thread, created on first use
    pub fn current(&self) -> Result<Arc<dyn ObjectStore>> {
        let id = thread::current().id();

        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(Arc::clone(client));
        }

        // Built outside the lock; client setup may be slow.
        let created = (self.factory)()?;
        tracing::debug!(thread = ?id, "Created storage client for thread");

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(clients.entry(id).or_insert(created)))
    }

    /// Drop the calling thread's handle, returning whether one was held
    ///
    /// The next [`Self::current`] on this thread creates a fresh handle.
    pub fn release_current(&self) -> bool {
        let id = thread::current().id();
        let released = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if released {
            tracing::debug!(thread = ?id, "Released storage client for thread");
        }
        released
    }

    /// Number of threads holding a handle
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry() -> (Arc<ClientRegistry>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let registry = ClientRegistry::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn ObjectStore>)
        });
        (Arc::new(registry), created)
    }

    #[test]
    fn test_same_thread_reuses_client() {
        let (registry, created) = counting_registry();
        assert!(registry.is_empty());

        let first = registry.current().unwrap();
        let second = registry.current().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_threads_get_their_own_client() {
        let (registry, created) = counting_registry();
        let main_client = registry.current().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let a = registry.current().unwrap();
                    let b = registry.current().unwrap();
                    assert!(Arc::ptr_eq(&a, &b));
                    Arc::as_ptr(&a) as *const () as usize
                })
            })
            .collect();

        let mut pointers: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        pointers.push(Arc::as_ptr(&main_client) as *const () as usize);
        pointers.sort_unstable();
        pointers.dedup();

        assert_eq!(pointers.len(), 5);
        assert_eq!(created.load(Ordering::SeqCst), 5);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_factory_error_is_returned_and_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let registry = ClientRegistry::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Config("no credentials".to_string()))
            } else {
                Ok(Arc::new(MemoryStore::new()) as Arc<dyn ObjectStore>)
            }
        });

        assert!(matches!(registry.current(), Err(Error::Config(_))));
        assert!(registry.is_empty());
        assert!(registry.current().is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_current() {
        let (registry, created) = counting_registry();
        assert!(!registry.release_current());

        let first = registry.current().unwrap();
        let worker = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry.current().unwrap();
                assert!(registry.release_current());
                assert!(!registry.release_current());
            })
        };
        worker.join().unwrap();

        // Only the main thread's entry is left behind.
        assert_eq!(registry.len(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 2);

        assert!(registry.release_current());
        assert!(registry.is_empty());

        let second = registry.current().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_shared_registry() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(ClientRegistry::shared(Arc::clone(&store)));

        let other = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.current().unwrap())
                .join()
                .unwrap()
        };

        assert!(Arc::ptr_eq(&registry.current().unwrap(), &store));
        assert!(Arc::ptr_eq(&other, &store));
    }
}
