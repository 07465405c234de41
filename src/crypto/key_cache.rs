//! Concurrency-safe cache of diversified object keys

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use log::trace;
use zeroize::Zeroizing;

use crate::pdf::ObjectRef;
use crate::Algorithm;

type CacheKey = (ObjectRef, Algorithm);

/// Object keys keyed by (object reference, algorithm).
///
/// Readers share the lock; a miss derives the key outside the lock and
/// inserts it afterwards. When `capacity` is reached the cache is emptied
/// rather than evicting individual entries.
pub struct ObjectKeyCache {
    entries: RwLock<HashMap<CacheKey, Zeroizing<Vec<u8>>>>,
    capacity: usize,
}

impl ObjectKeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Return the cached key or derive, store and return it.
    pub fn get_or_derive<F>(&self, obj: ObjectRef, algorithm: Algorithm, derive: F) -> Zeroizing<Vec<u8>>
    where
        F: FnOnce() -> Zeroizing<Vec<u8>>,
    {
        let key = (obj, algorithm);
        if let Some(cached) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone();
        }

        let derived = derive();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            trace!("Object key cache full ({} entries), clearing", entries.len());
            entries.clear();
        }
        entries.insert(key, derived.clone());
        derived
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached key; the `Zeroizing` wrappers wipe them.
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl fmt::Debug for ObjectKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectKeyCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_derives_once_per_key() {
        let cache = ObjectKeyCache::new(16);
        let calls = AtomicUsize::new(0);
        let derive = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Zeroizing::new(vec![1u8, 2, 3])
        };

        let obj = ObjectRef::new(5, 0);
        let first = cache.get_or_derive(obj, Algorithm::Rc4, derive);
        let second = cache.get_or_derive(obj, Algorithm::Rc4, || Zeroizing::new(vec![9u8]));
        assert_eq!(*first, *second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Different algorithm is a different entry
        let aes = cache.get_or_derive(obj, Algorithm::Aes128, || Zeroizing::new(vec![7u8]));
        assert_eq!(*aes, vec![7u8]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_capacity_bound() {
        let cache = ObjectKeyCache::new(2);
        for n in 0..5 {
            cache.get_or_derive(ObjectRef::new(n, 0), Algorithm::Rc4, || Zeroizing::new(vec![n as u8]));
        }
        assert!(cache.len() <= 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(ObjectKeyCache::new(1024));
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for n in 0..64u32 {
                        let key = cache.get_or_derive(ObjectRef::new(n, 0), Algorithm::Rc4, || {
                            Zeroizing::new(n.to_le_bytes().to_vec())
                        });
                        assert_eq!(*key, n.to_le_bytes().to_vec(), "thread {}", t);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 64);
    }
}
