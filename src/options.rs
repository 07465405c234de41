//! Tuning knobs for [`SecurityManager`](crate::SecurityManager)

use std::fmt;
use std::sync::Arc;

use crate::crypto::{IvSource, ThreadRngIvSource};

/// Options for a document's security manager.
#[derive(Clone)]
pub struct SecurityOptions {
    /// Keep per-object keys in a shared cache (default: false)
    pub cache_object_keys: bool,
    /// Upper bound of the object key cache (default: 1024)
    pub max_cached_keys: usize,
    /// Hand back the input when a payload fails to decrypt (default: true)
    pub fallback_to_original: bool,
    /// Where AES initialization vectors come from (default: thread RNG)
    pub iv_source: Arc<dyn IvSource>,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            cache_object_keys: false,
            max_cached_keys: 1024,
            fallback_to_original: true,
            iv_source: Arc::new(ThreadRngIvSource),
        }
    }
}

impl SecurityOptions {
    /// Enable the object key cache with the given capacity.
    pub fn with_key_cache(mut self, capacity: usize) -> Self {
        self.cache_object_keys = true;
        self.max_cached_keys = capacity.max(1);
        self
    }

    pub fn with_fallback_to_original(mut self, fallback: bool) -> Self {
        self.fallback_to_original = fallback;
        self
    }

    pub fn with_iv_source(mut self, iv_source: Arc<dyn IvSource>) -> Self {
        self.iv_source = iv_source;
        self
    }
}

impl fmt::Debug for SecurityOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityOptions")
            .field("cache_object_keys", &self.cache_object_keys)
            .field("max_cached_keys", &self.max_cached_keys)
            .field("fallback_to_original", &self.fallback_to_original)
            .finish_non_exhaustive()
    }
}
