//! Normalized in-memory query cache.
//!
//! # Architecture
//!
//! - Results are split into entities keyed by cache id (see [`TypePolicies`])
//!   and stored in one flat [`EntityStore`] behind a `RwLock`
//! - Reads walk a selection set back through references and report which
//!   `(entity, field)` pairs they depended on
//! - Watchers are notified after the write lock is released, with the set of
//!   fields that actually changed value
//!
//! # Example
//!
//! ```rust,ignore
//! use cache_probe_client::cache::InMemoryCache;
//! use cache_probe_client::document::Document;
//!
//! let cache = InMemoryCache::new(probe_type_policies());
//! let doc = Document::parse("{ session { products { id } } }", None)?;
//! cache.write_query(&doc, &json!({}), &data)?;
//! let products = cache.read_query(&doc, &json!({}));
//! ```

mod key;
mod policy;
mod read;
mod store;
mod write;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;
use thiserror::Error;

pub use key::{CONNECTION_DIRECTIVE, field_name_of, store_field_name};
pub use policy::{
    CacheKeyFn, FieldContext, FieldPolicy, KeyArgs, KeyFields, MergeFn, TypePolicies, TypePolicy,
};
pub use read::Diff;
pub use store::{ChangeSet, Entity, EntityStore, FieldKey, as_reference, make_reference};

use crate::document::Document;
use read::Reader;
use write::Writer;

/// Errors raised by cache writes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The result does not have the shape its selection set describes.
    #[error("invalid result: {0}")]
    InvalidResult(String),
}

/// Something that wants to hear about cache changes.
///
/// Called once per write that changed at least one field, after the store
/// lock has been released, so implementations may read the cache again.
pub trait CacheWatcher: Send + Sync {
    fn cache_changed(&self, cache: &InMemoryCache, changes: &ChangeSet);
}

/// The normalized query cache. Cheap to clone.
#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: RwLock<EntityStore>,
    policies: TypePolicies,
    watchers: Mutex<WatcherRegistry>,
}

#[derive(Default)]
struct WatcherRegistry {
    next_id: u64,
    watchers: BTreeMap<u64, Arc<dyn CacheWatcher>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(TypePolicies::default())
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entities", &self.read_store().len())
            .field("watchers", &self.watcher_count())
            .finish_non_exhaustive()
    }
}

impl InMemoryCache {
    #[must_use]
    pub fn new(policies: TypePolicies) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: RwLock::new(EntityStore::default()),
                policies,
                watchers: Mutex::new(WatcherRegistry::default()),
            }),
        }
    }

    #[must_use]
    pub fn policies(&self) -> &TypePolicies {
        &self.inner.policies
    }

    /// Normalize `data` into the store under the operation's root.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidResult` if `data` is not an object.
    #[tracing::instrument(skip_all, fields(operation = doc.operation_name()))]
    pub fn write_query(
        &self,
        doc: &Document,
        variables: &Value,
        data: &Value,
    ) -> Result<ChangeSet, CacheError> {
        let variables = doc.resolve_variables(variables);
        let changes = {
            let mut store = self.write_store();
            let mut writer = Writer {
                store: &mut *store,
                policies: &self.inner.policies,
                variables: &variables,
                changes: ChangeSet::default(),
            };
            writer.write_entity(
                doc.kind().root_id(),
                Some(doc.kind().root_typename()),
                doc.selection_set(),
                data,
            )?;
            writer.changes
        };
        tracing::debug!(changed = changes.len(), "wrote result to cache");
        self.broadcast(&changes);
        Ok(changes)
    }

    /// Read as much of the operation as is cached.
    #[must_use]
    pub fn diff(&self, doc: &Document, variables: &Value) -> Diff {
        let variables = doc.resolve_variables(variables);
        let store = self.read_store();
        Reader::new(&store, &self.inner.policies, &variables).diff(
            doc.kind().root_id(),
            doc.kind().root_typename(),
            doc.selection_set(),
        )
    }

    /// The operation's data, or `None` if any selected field is missing.
    #[must_use]
    pub fn read_query(&self, doc: &Document, variables: &Value) -> Option<Value> {
        let diff = self.diff(doc, variables);
        diff.complete.then_some(diff.result)
    }

    /// Rewrite every stored variant of `field` on entity `id`.
    ///
    /// The modifier receives the current value and returns the replacement.
    /// Merge functions are not consulted. Returns whether anything changed.
    #[tracing::instrument(skip(self, modifier))]
    pub fn modify<F>(&self, id: &str, field: &str, mut modifier: F) -> bool
    where
        F: FnMut(Value, &ModifyContext<'_>) -> Value,
    {
        let mut changes = ChangeSet::default();
        {
            let mut guard = self.write_store();
            let store = &mut *guard;
            for store_name in store.matching_fields(id, field) {
                let Some(current) = store.get_field(id, &store_name).cloned() else {
                    continue;
                };
                let next = {
                    let context = ModifyContext {
                        policies: &self.inner.policies,
                        field_name: field,
                        store_field_name: &store_name,
                    };
                    modifier(current, &context)
                };
                store.set_field(id, &store_name, next, &mut changes);
            }
        }
        tracing::debug!(changed = changes.len(), "modified cache field");
        self.broadcast(&changes);
        !changes.is_empty()
    }

    /// Read the operation, transform it and write it back through the
    /// regular write path, so merge functions apply.
    ///
    /// Nothing happens when the operation is not fully cached or `update`
    /// returns `None`. Returns whether a write took place.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the updated data cannot be written.
    pub fn update_query<F>(
        &self,
        doc: &Document,
        variables: &Value,
        update: F,
    ) -> Result<bool, CacheError>
    where
        F: FnOnce(Value) -> Option<Value>,
    {
        let Some(current) = self.read_query(doc, variables) else {
            return Ok(false);
        };
        match update(current) {
            Some(next) => {
                self.write_query(doc, variables, &next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cache id `object` would be stored under.
    #[must_use]
    pub fn identify(&self, object: &Value) -> Option<String> {
        self.inner.policies.identify(object.as_object()?)
    }

    /// Remove one entity. References to it become dangling and read as missing.
    pub fn evict(&self, id: &str) -> bool {
        let mut changes = ChangeSet::default();
        let removed = self.write_store().evict(id, &mut changes);
        self.broadcast(&changes);
        removed
    }

    /// Drop every entity.
    pub fn reset(&self) {
        let mut changes = ChangeSet::default();
        self.write_store().clear(&mut changes);
        self.broadcast(&changes);
    }

    /// Snapshot of the normalized store.
    #[must_use]
    pub fn extract(&self) -> Value {
        self.read_store().extract()
    }

    /// Register a watcher until the returned registration is dropped.
    #[must_use = "the watcher is removed when the registration is dropped"]
    pub fn watch(&self, watcher: Arc<dyn CacheWatcher>) -> WatchRegistration {
        let mut registry = self.lock_watchers();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.watchers.insert(id, watcher);
        WatchRegistration {
            id,
            cache: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.lock_watchers().watchers.len()
    }

    fn broadcast(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let watchers: Vec<_> = self.lock_watchers().watchers.values().cloned().collect();
        for watcher in watchers {
            watcher.cache_changed(self, changes);
        }
    }

    // A panicking merge or modifier leaves the store consistent field by
    // field, so poisoning is ignored.
    fn read_store(&self) -> std::sync::RwLockReadGuard<'_, EntityStore> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, EntityStore> {
        self.inner.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, WatcherRegistry> {
        self.inner.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for a registered watcher. Dropping it unregisters the watcher.
#[derive(Debug)]
pub struct WatchRegistration {
    id: u64,
    cache: Weak<CacheInner>,
}

impl Drop for WatchRegistration {
    fn drop(&mut self) {
        if let Some(inner) = self.cache.upgrade() {
            inner
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .watchers
                .remove(&self.id);
        }
    }
}

/// What a [`InMemoryCache::modify`] modifier may use.
pub struct ModifyContext<'a> {
    policies: &'a TypePolicies,
    pub field_name: &'a str,
    pub store_field_name: &'a str,
}

impl ModifyContext<'_> {
    /// A reference to `object` if it can be identified, else `object` itself.
    #[must_use]
    pub fn to_reference(&self, object: &Value) -> Value {
        object
            .as_object()
            .and_then(|o| self.policies.identify(o))
            .map_or_else(|| object.clone(), |id| make_reference(&id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    const PRODUCTS: &str = "{ session { products { id } } }";

    fn session_cache() -> InMemoryCache {
        InMemoryCache::new(
            TypePolicies::new().add("Session", TypePolicy::new().key_fields(KeyFields::Fields(vec![]))),
        )
    }

    fn products_data(ids: &[i64]) -> Value {
        let products: Vec<_> = ids
            .iter()
            .map(|id| json!({ "__typename": "Product", "id": id }))
            .collect();
        json!({ "session": { "__typename": "Session", "products": products } })
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl CacheWatcher for Counter {
        fn cache_changed(&self, _cache: &InMemoryCache, _changes: &ChangeSet) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_write_then_read() {
        let cache = session_cache();
        let doc = Document::parse(PRODUCTS, None).unwrap();
        cache.write_query(&doc, &json!({}), &products_data(&[1])).unwrap();
        assert_eq!(cache.read_query(&doc, &json!({})), Some(products_data(&[1])));
    }

    #[test]
    fn test_read_incomplete_is_none() {
        let cache = session_cache();
        let doc = Document::parse(PRODUCTS, None).unwrap();
        assert_eq!(cache.read_query(&doc, &json!({})), None);
    }

    #[test]
    fn test_modify_bypasses_merge_and_rewrites_all_variants() {
        let cache = InMemoryCache::new(
            TypePolicies::new().add(
                "Session",
                TypePolicy::new()
                    .key_fields(KeyFields::Fields(vec![]))
                    .field("products", FieldPolicy::new().merge(|existing, incoming, _| {
                        existing.cloned().unwrap_or(incoming)
                    })),
            ),
        );
        let plain = Document::parse(PRODUCTS, None).unwrap();
        let with_arg =
            Document::parse("{ session { products(isDecrementingInventory: true) { id } } }", None)
                .unwrap();
        cache.write_query(&plain, &json!({}), &products_data(&[1])).unwrap();
        cache.write_query(&with_arg, &json!({}), &products_data(&[1])).unwrap();

        let changed = cache.modify("Session:{}", "products", |current, ctx| {
            let mut items = current.as_array().cloned().unwrap_or_default();
            items.push(ctx.to_reference(&json!({ "__typename": "Product", "id": 1 })));
            Value::Array(items)
        });
        assert!(changed);

        let store = cache.extract();
        assert_eq!(
            store["Session:{}"]["products"],
            json!([{ "__ref": "Product:1" }, { "__ref": "Product:1" }])
        );
        assert_eq!(
            store["Session:{}"][r#"products({"isDecrementingInventory":true})"#],
            json!([{ "__ref": "Product:1" }, { "__ref": "Product:1" }])
        );
    }

    #[test]
    fn test_modify_missing_field_is_noop() {
        let cache = session_cache();
        assert!(!cache.modify("Session:{}", "products", |v, _| v));
    }

    #[test]
    fn test_update_query_writes_through() {
        let cache = session_cache();
        let doc = Document::parse(PRODUCTS, None).unwrap();
        assert!(!cache.update_query(&doc, &json!({}), Some).unwrap());

        cache.write_query(&doc, &json!({}), &products_data(&[1])).unwrap();
        let updated = cache
            .update_query(&doc, &json!({}), |_| Some(products_data(&[1, 2])))
            .unwrap();
        assert!(updated);
        assert_eq!(cache.read_query(&doc, &json!({})), Some(products_data(&[1, 2])));
    }

    #[test]
    fn test_watchers_hear_only_real_changes() {
        let cache = session_cache();
        let doc = Document::parse(PRODUCTS, None).unwrap();
        let counter = Arc::new(Counter::default());
        let registration = cache.watch(counter.clone());

        cache.write_query(&doc, &json!({}), &products_data(&[1])).unwrap();
        cache.write_query(&doc, &json!({}), &products_data(&[1])).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        drop(registration);
        assert_eq!(cache.watcher_count(), 0);
        cache.write_query(&doc, &json!({}), &products_data(&[2])).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_evict_and_reset() {
        let cache = session_cache();
        let doc = Document::parse(PRODUCTS, None).unwrap();
        cache.write_query(&doc, &json!({}), &products_data(&[1])).unwrap();

        assert!(cache.evict("Product:1"));
        assert!(cache.read_query(&doc, &json!({})).is_none());

        cache.reset();
        assert_eq!(cache.extract(), json!({}));
    }

    #[test]
    fn test_identify() {
        let cache = session_cache();
        assert_eq!(
            cache.identify(&json!({ "__typename": "Session" })).as_deref(),
            Some("Session:{}")
        );
        assert_eq!(cache.identify(&json!(1)), None);
    }
}
