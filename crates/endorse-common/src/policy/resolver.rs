use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{parse, Policy};
use crate::protocol::error::Result;

/// Parses policy expressions, memoizing the resulting trees by expression text.
///
/// Parsed trees are immutable, so a cached `Arc<Policy>` can be shared by
/// every selector and coordinator that needs it. Malformed expressions are
/// not cached and fail again on every call.
#[derive(Debug, Default)]
pub struct PolicyResolver {
    cache: RwLock<HashMap<String, Arc<Policy>>>,
}

impl PolicyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the policy tree for `expression`, parsing it on first use.
    pub fn resolve(&self, expression: &str) -> Result<Arc<Policy>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(policy) = cache.get(expression) {
                return Ok(Arc::clone(policy));
            }
        }

        let policy = Arc::new(parse(expression)?);
        debug!("Resolved policy {}", policy);

        if let Ok(mut cache) = self.cache.write() {
            cache
                .entry(expression.to_string())
                .or_insert_with(|| Arc::clone(&policy));
        }
        Ok(policy)
    }

    /// Number of distinct expressions cached so far.
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}
