//! Type and field policies: identity, argument keying and merge functions.
//!
//! Policies are looked up by `__typename`. A type policy decides how objects
//! of that type are identified; its field policies decide which arguments take
//! part in a field's store key and how an incoming value is reconciled with
//! the one already cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::store::{EntityStore, as_reference};

/// Reconciles a field's cached value with a newly arrived one.
///
/// Called with the existing value (if any) and the incoming value, whose
/// nested entities have already been written and replaced by references.
pub type MergeFn = Arc<dyn Fn(Option<&Value>, Value, &FieldContext<'_>) -> Value + Send + Sync>;

/// Computes a cache key from a typename and the object's fields.
///
/// Returning `None` leaves the object unnormalized.
pub type CacheKeyFn = Arc<dyn Fn(&str, &Map<String, Value>) -> Option<String> + Send + Sync>;

/// How objects of a type are identified.
#[derive(Clone, Default)]
pub enum KeyFields {
    /// `Typename:id`, falling back to `_id`; unidentified without either.
    #[default]
    Default,
    /// `Typename:{"field":value,...}` from the named fields. An empty list
    /// makes every object of the type share the single id `Typename:{}`.
    Fields(Vec<String>),
    /// A caller-supplied key function.
    Custom(CacheKeyFn),
    /// Never normalized; always stored inline in the parent.
    None,
}

impl fmt::Debug for KeyFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::None => f.write_str("None"),
        }
    }
}

/// Which arguments take part in a field's store key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyArgs {
    /// Every argument (the normal per-argument caching).
    #[default]
    All,
    /// No argument: all calls share one slot.
    None,
    /// Only the named arguments.
    Only(Vec<String>),
}

/// Policy for a single field of a type.
#[derive(Clone, Default)]
pub struct FieldPolicy {
    pub key_args: KeyArgs,
    pub merge: Option<MergeFn>,
}

impl fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPolicy")
            .field("key_args", &self.key_args)
            .field("merge", &self.merge.as_ref().map(|_| ".."))
            .finish()
    }
}

impl FieldPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key_args(mut self, key_args: KeyArgs) -> Self {
        self.key_args = key_args;
        self
    }

    #[must_use]
    pub fn merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(Option<&Value>, Value, &FieldContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.merge = Some(Arc::new(merge));
        self
    }
}

/// Policy for one `__typename`.
#[derive(Debug, Clone, Default)]
pub struct TypePolicy {
    pub key_fields: KeyFields,
    pub fields: HashMap<String, FieldPolicy>,
}

impl TypePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key_fields(mut self, key_fields: KeyFields) -> Self {
        self.key_fields = key_fields;
        self
    }

    #[must_use]
    pub fn field(mut self, name: &str, policy: FieldPolicy) -> Self {
        self.fields.insert(name.to_string(), policy);
        self
    }
}

/// All type policies known to a cache.
#[derive(Debug, Clone, Default)]
pub struct TypePolicies {
    types: HashMap<String, TypePolicy>,
}

impl TypePolicies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add(mut self, typename: &str, policy: TypePolicy) -> Self {
        self.types.insert(typename.to_string(), policy);
        self
    }

    #[must_use]
    pub fn type_policy(&self, typename: &str) -> Option<&TypePolicy> {
        self.types.get(typename)
    }

    #[must_use]
    pub fn field_policy(&self, typename: Option<&str>, field: &str) -> Option<&FieldPolicy> {
        self.type_policy(typename?)?.fields.get(field)
    }

    /// Cache id for an object, or `None` when it stays unnormalized.
    ///
    /// Objects without `__typename` are never identified.
    #[must_use]
    pub fn identify(&self, object: &Map<String, Value>) -> Option<String> {
        let typename = object.get(crate::document::TYPENAME_FIELD)?.as_str()?;
        let key_fields = self
            .type_policy(typename)
            .map_or(&KeyFields::Default, |p| &p.key_fields);

        match key_fields {
            KeyFields::Default => ["id", "_id"]
                .iter()
                .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
                .map(|id| format!("{typename}:{}", id_fragment(id))),
            KeyFields::Fields(fields) => {
                let mut key = Map::new();
                for field in fields {
                    key.insert(field.clone(), object.get(field)?.clone());
                }
                Some(format!("{typename}:{}", Value::Object(key)))
            }
            KeyFields::Custom(key_fn) => key_fn(typename, object),
            KeyFields::None => None,
        }
    }
}

/// Strings are embedded raw, everything else as JSON.
fn id_fragment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// What a merge function may inspect about the field being written.
pub struct FieldContext<'a> {
    pub(crate) store: &'a EntityStore,
    pub typename: Option<&'a str>,
    pub field_name: &'a str,
    pub store_field_name: &'a str,
    pub variables: &'a Map<String, Value>,
}

impl FieldContext<'_> {
    /// Read a field from a reference or an inline object.
    #[must_use]
    pub fn read_field(&self, field: &str, item: &Value) -> Option<Value> {
        match as_reference(item) {
            Some(id) => self.store.get_field(id, field).cloned(),
            None => item.as_object()?.get(field).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: &Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_default_identity_uses_id() {
        let policies = TypePolicies::new();
        let id = policies.identify(&object(&json!({ "__typename": "Product", "id": 2 })));
        assert_eq!(id.as_deref(), Some("Product:2"));

        let id = policies.identify(&object(&json!({ "__typename": "Doc", "_id": "abc" })));
        assert_eq!(id.as_deref(), Some("Doc:abc"));
    }

    #[test]
    fn test_default_identity_needs_typename_and_id() {
        let policies = TypePolicies::new();
        assert!(policies.identify(&object(&json!({ "id": 2 }))).is_none());
        assert!(policies
            .identify(&object(&json!({ "__typename": "Session" })))
            .is_none());
        assert!(policies
            .identify(&object(&json!({ "__typename": "Product", "id": null })))
            .is_none());
    }

    #[test]
    fn test_empty_key_fields_float_to_singleton() {
        let policies =
            TypePolicies::new().add("Session", TypePolicy::new().key_fields(KeyFields::Fields(vec![])));
        let id = policies.identify(&object(&json!({ "__typename": "Session" })));
        assert_eq!(id.as_deref(), Some("Session:{}"));
    }

    #[test]
    fn test_key_fields_build_structured_id() {
        let policies = TypePolicies::new().add(
            "User",
            TypePolicy::new().key_fields(KeyFields::Fields(vec!["username".into()])),
        );
        let id = policies.identify(&object(
            &json!({ "__typename": "User", "id": 1, "username": "jt" }),
        ));
        assert_eq!(id.as_deref(), Some(r#"User:{"username":"jt"}"#));

        let missing = policies.identify(&object(&json!({ "__typename": "User", "id": 1 })));
        assert!(missing.is_none());
    }

    #[test]
    fn test_custom_key_fn() {
        let policies = TypePolicies::new().add(
            "Product",
            TypePolicy::new().key_fields(KeyFields::Custom(Arc::new(|typename, fields| {
                Some(format!("{typename}#{}", fields.get("id")?))
            }))),
        );
        let id = policies.identify(&object(&json!({ "__typename": "Product", "id": 9 })));
        assert_eq!(id.as_deref(), Some("Product#9"));
    }

    #[test]
    fn test_key_fields_none_disables_normalization() {
        let policies =
            TypePolicies::new().add("Product", TypePolicy::new().key_fields(KeyFields::None));
        assert!(policies
            .identify(&object(&json!({ "__typename": "Product", "id": 1 })))
            .is_none());
    }

    #[test]
    fn test_field_policy_lookup() {
        let policies = TypePolicies::new().add(
            "Session",
            TypePolicy::new().field("products", FieldPolicy::new().key_args(KeyArgs::None)),
        );
        let policy = policies.field_policy(Some("Session"), "products");
        assert_eq!(policy.map(|p| p.key_args.clone()), Some(KeyArgs::None));
        assert!(policies.field_policy(None, "products").is_none());
        assert!(policies.field_policy(Some("Session"), "other").is_none());
    }
}
