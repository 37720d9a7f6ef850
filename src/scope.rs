//! # Request Scope
//!
//! A per-request key/value side channel. Interceptors and handlers that know
//! nothing about each other use it to pass derived data along the pipeline:
//! extracted path parameters, the authenticated user, the error being recovered.
//!
//! ## Copy semantics
//!
//! Values are stored behind `Arc` and never mutated in place, so [`RequestScope::copy`]
//! (and `Clone`) only duplicates the key map. Setting or deleting a key on a copy is
//! invisible to the original. Handlers always receive their own copy and can only
//! publish changes by returning an edited scope.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ScopeValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct RequestScope {
    data: HashMap<String, ScopeValue>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an independent scope holding the same entries.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        tracing::trace!(%key, "RequestScope.set");
        self.data.insert(key, Arc::new(value));
    }

    /// Typed lookup. Returns `None` when the key is missing or holds another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Shorthand for string values such as path parameters.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get::<String>(key).map(String::as_str)
    }

    pub fn delete(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Inserts every pair, overwriting existing keys.
    pub fn extend<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in params {
            self.set(key, value);
        }
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("RequestScope").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_isolated_from_original() {
        let mut original = RequestScope::new();
        original.set("id", "abc".to_string());
        original.set("count", 3u32);

        let mut copy = original.copy();
        copy.set("id", "changed".to_string());
        copy.set("extra", true);
        copy.delete("count");

        assert_eq!(original.get_str("id"), Some("abc"));
        assert_eq!(original.get::<u32>("count"), Some(&3));
        assert!(!original.contains("extra"));
        assert_eq!(original.len(), 2);

        assert_eq!(copy.get_str("id"), Some("changed"));
        assert!(!copy.contains("count"));
    }

    #[test]
    fn test_typed_get_rejects_wrong_type() {
        let mut scope = RequestScope::new();
        scope.set("n", 1u64);
        assert!(scope.get::<String>("n").is_none());
        assert_eq!(scope.get::<u64>("n"), Some(&1));
    }

    #[test]
    fn test_empty_scope() {
        let mut scope = RequestScope::new();
        assert!(scope.is_empty());
        scope.extend([("a".to_string(), "b".to_string())]);
        assert!(!scope.is_empty());
        assert_eq!(scope.get_str("a"), Some("b"));
    }
}
