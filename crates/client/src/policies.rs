//! Type policies used against the cache-probe server.

use serde_json::Value;

use crate::cache::{FieldContext, FieldPolicy, KeyFields, TypePolicies, TypePolicy};

/// Merge for list fields that may be appended to from two places at once.
///
/// If the last element of `incoming` already appears among the elements
/// before it (compared by `id`), the write is a duplicate append and the
/// cached list is kept. Otherwise `incoming` replaces it. With nothing cached
/// yet, the duplicate trailing element is dropped instead.
#[must_use]
pub fn dedupe_trailing_append(
    existing: Option<&Value>,
    incoming: Value,
    ctx: &FieldContext<'_>,
) -> Value {
    let Value::Array(items) = &incoming else {
        return incoming;
    };
    let Some((last, rest)) = items.split_last() else {
        return incoming;
    };
    let Some(last_id) = ctx.read_field("id", last).filter(|id| !id.is_null()) else {
        return incoming;
    };

    let duplicated = rest
        .iter()
        .any(|item| ctx.read_field("id", item).as_ref() == Some(&last_id));
    if !duplicated {
        return incoming;
    }

    tracing::debug!(
        field = ctx.store_field_name,
        id = %last_id,
        "dropping duplicate trailing append"
    );
    existing.map_or_else(|| Value::Array(rest.to_vec()), Clone::clone)
}

/// Policies for the probe schema.
///
/// `Session` has no id of its own, so every session shares the singleton
/// entity `Session:{}`; its `products` list is deduplicated on append.
#[must_use]
pub fn probe_type_policies() -> TypePolicies {
    TypePolicies::new().add(
        "Session",
        TypePolicy::new()
            .key_fields(KeyFields::Fields(Vec::new()))
            .field("products", FieldPolicy::new().merge(dedupe_trailing_append)),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::cache::EntityStore;

    fn merge(existing: Option<&Value>, incoming: Value) -> Value {
        let store = EntityStore::default();
        let variables = Map::new();
        let ctx = FieldContext {
            store: &store,
            typename: Some("Session"),
            field_name: "products",
            store_field_name: "products",
            variables: &variables,
        };
        dedupe_trailing_append(existing, incoming, &ctx)
    }

    #[test]
    fn test_duplicate_trailing_element_keeps_existing() {
        let existing = json!([{ "id": 1 }]);
        let merged = merge(Some(&existing), json!([{ "id": 2 }, { "id": 2 }]));
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_distinct_incoming_is_adopted() {
        let existing = json!([{ "id": 1 }]);
        assert_eq!(merge(Some(&existing), json!([{ "id": 2 }])), json!([{ "id": 2 }]));
        assert_eq!(
            merge(Some(&existing), json!([{ "id": 1 }, { "id": 2 }])),
            json!([{ "id": 1 }, { "id": 2 }])
        );
    }

    #[test]
    fn test_duplicate_without_existing_drops_trailing_element() {
        let merged = merge(None, json!([{ "id": 2 }, { "id": 2 }]));
        assert_eq!(merged, json!([{ "id": 2 }]));
    }

    #[test]
    fn test_empty_and_non_list_values_pass_through() {
        assert_eq!(merge(None, json!([])), json!([]));
        assert_eq!(merge(None, Value::Null), Value::Null);
        assert_eq!(
            merge(None, json!([{ "id": null }, { "id": null }])),
            json!([{ "id": null }, { "id": null }])
        );
    }

    #[test]
    fn test_policies_pin_session_singleton() {
        let policies = probe_type_policies();
        let session = json!({ "__typename": "Session", "products": [] });
        assert_eq!(
            policies.identify(session.as_object().unwrap()).as_deref(),
            Some("Session:{}")
        );
        assert!(
            policies
                .field_policy(Some("Session"), "products")
                .and_then(|p| p.merge.as_ref())
                .is_some()
        );
    }
}
