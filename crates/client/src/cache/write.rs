//! Normalizing writes.
//!
//! A result is walked alongside its selection set. Every object the type
//! policies can identify becomes its own entity and is replaced by a
//! reference in its parent; everything else stays inline. Field values pass
//! through the field's merge function when one is configured.

use serde_json::{Map, Value};

use super::CacheError;
use super::key::store_field_name;
use super::policy::{FieldContext, TypePolicies};
use super::store::{ChangeSet, Entity, EntityStore, as_reference, make_reference};
use crate::document::{Field, SelectionSet, TYPENAME_FIELD};

pub(crate) struct Writer<'a> {
    pub store: &'a mut EntityStore,
    pub policies: &'a TypePolicies,
    pub variables: &'a Map<String, Value>,
    pub changes: ChangeSet,
}

impl Writer<'_> {
    /// Write `data` as the fields of entity `id`.
    pub fn write_entity(
        &mut self,
        id: &str,
        typename: Option<&str>,
        selection_set: &SelectionSet,
        data: &Value,
    ) -> Result<(), CacheError> {
        let object = data
            .as_object()
            .ok_or_else(|| CacheError::InvalidResult(format!("{id} is not an object")))?;

        let fields = self.write_fields(Some(id), typename, selection_set, object, None)?;
        for (name, value) in fields {
            self.store.set_field(id, &name, value, &mut self.changes);
        }
        Ok(())
    }

    /// Normalize the selected fields of `object`.
    ///
    /// `entity` is the id the fields will be stored under, if any; existing
    /// values for merge functions come from there or from `inline_existing`.
    fn write_fields(
        &mut self,
        entity: Option<&str>,
        typename: Option<&str>,
        selection_set: &SelectionSet,
        object: &Map<String, Value>,
        inline_existing: Option<&Entity>,
    ) -> Result<Entity, CacheError> {
        let typename = object
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .or(typename);
        let policies = self.policies;
        let mut fields = Entity::new();

        for field in selection_set.collect_fields(typename, self.variables) {
            let Some(value) = object.get(field.response_key()) else {
                tracing::debug!(field = %field.response_key(), "missing field in result");
                continue;
            };
            let policy = policies.field_policy(typename, &field.name);
            let store_name = store_field_name(field, policy, self.variables);

            let existing = match entity {
                Some(id) => self.store.get_field(id, &store_name).cloned(),
                None => inline_existing.and_then(|e| e.get(&store_name)).cloned(),
            };
            let incoming = self.normalize(field, value, existing.as_ref())?;

            let merged = match policy.and_then(|p| p.merge.as_ref()) {
                Some(merge) => {
                    let context = FieldContext {
                        store: &*self.store,
                        typename,
                        field_name: &field.name,
                        store_field_name: &store_name,
                        variables: self.variables,
                    };
                    merge(existing.as_ref(), incoming, &context)
                }
                None => incoming,
            };
            fields.insert(store_name, merged);
        }
        Ok(fields)
    }

    /// Replace identifiable objects in `value` with references.
    fn normalize(
        &mut self,
        field: &Field,
        value: &Value,
        existing: Option<&Value>,
    ) -> Result<Value, CacheError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.normalize(field, item, None))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(object) if !field.selection_set.is_empty() => {
                if let Some(id) = self.policies.identify(object) {
                    let typename = object.get(TYPENAME_FIELD).and_then(Value::as_str);
                    self.write_entity(&id, typename, &field.selection_set, value)?;
                    return Ok(make_reference(&id));
                }
                // Same-typed inline objects are merged shallowly.
                let existing = existing
                    .filter(|e| as_reference(e).is_none())
                    .and_then(Value::as_object)
                    .filter(|e| e.get(TYPENAME_FIELD) == object.get(TYPENAME_FIELD));
                let mut inline = existing.cloned().unwrap_or_default();
                let fields =
                    self.write_fields(None, None, &field.selection_set, object, existing)?;
                inline.extend(fields);
                Ok(Value::Object(inline))
            }
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::policy::{FieldPolicy, KeyFields, TypePolicy};
    use crate::document::Document;

    fn write(
        store: &mut EntityStore,
        policies: &TypePolicies,
        source: &str,
        variables: &Value,
        data: &Value,
    ) -> ChangeSet {
        let doc = Document::parse(source, None).unwrap();
        let variables = doc.resolve_variables(variables);
        let mut writer = Writer {
            store,
            policies,
            variables: &variables,
            changes: ChangeSet::default(),
        };
        writer
            .write_entity(
                doc.kind().root_id(),
                Some(doc.kind().root_typename()),
                doc.selection_set(),
                data,
            )
            .unwrap();
        writer.changes
    }

    fn session_policies() -> TypePolicies {
        TypePolicies::new().add("Session", TypePolicy::new().key_fields(KeyFields::Fields(vec![])))
    }

    #[test]
    fn test_identified_objects_become_references() {
        let mut store = EntityStore::default();
        write(
            &mut store,
            &session_policies(),
            "{ session { products { id } } }",
            &json!({}),
            &json!({ "session": { "__typename": "Session", "products": [
                { "__typename": "Product", "id": 1 }
            ] } }),
        );

        assert_eq!(
            store.get_field("ROOT_QUERY", "session"),
            Some(&json!({ "__ref": "Session:{}" }))
        );
        assert_eq!(
            store.get_field("Session:{}", "products"),
            Some(&json!([{ "__ref": "Product:1" }]))
        );
        assert_eq!(
            store.get("Product:1").cloned().map(Value::Object),
            Some(json!({ "__typename": "Product", "id": 1 }))
        );
    }

    #[test]
    fn test_unidentified_objects_stay_inline() {
        let mut store = EntityStore::default();
        write(
            &mut store,
            &TypePolicies::new(),
            "{ session { authenticatedUser { id } } }",
            &json!({}),
            &json!({ "session": { "__typename": "Session", "authenticatedUser": null } }),
        );
        assert_eq!(
            store.get_field("ROOT_QUERY", "session"),
            Some(&json!({ "__typename": "Session", "authenticatedUser": null }))
        );
    }

    #[test]
    fn test_inline_objects_merge_shallowly() {
        let mut store = EntityStore::default();
        let policies = TypePolicies::new();
        write(
            &mut store,
            &policies,
            "{ session { products { id } } }",
            &json!({}),
            &json!({ "session": { "__typename": "Session", "products": [] } }),
        );
        write(
            &mut store,
            &policies,
            "{ session { authenticatedUser { id } } }",
            &json!({}),
            &json!({ "session": { "__typename": "Session", "authenticatedUser": null } }),
        );
        assert_eq!(
            store.get_field("ROOT_QUERY", "session"),
            Some(&json!({ "__typename": "Session", "products": [], "authenticatedUser": null }))
        );
    }

    #[test]
    fn test_merge_function_sees_existing_and_references() {
        let policies = TypePolicies::new().add(
            "Session",
            TypePolicy::new()
                .key_fields(KeyFields::Fields(vec![]))
                .field(
                    "products",
                    FieldPolicy::new().merge(|existing, incoming, ctx| {
                        let mut all = existing.and_then(Value::as_array).cloned().unwrap_or_default();
                        for item in incoming.as_array().into_iter().flatten() {
                            assert!(ctx.read_field("id", item).is_some());
                            all.push(item.clone());
                        }
                        Value::Array(all)
                    }),
                ),
        );
        let mut store = EntityStore::default();
        for id in [1, 2] {
            write(
                &mut store,
                &policies,
                "{ session { products { id } } }",
                &json!({}),
                &json!({ "session": { "__typename": "Session", "products": [
                    { "__typename": "Product", "id": id }
                ] } }),
            );
        }
        assert_eq!(
            store.get_field("Session:{}", "products"),
            Some(&json!([{ "__ref": "Product:1" }, { "__ref": "Product:2" }]))
        );
    }

    #[test]
    fn test_rewriting_identical_data_changes_nothing() {
        let mut store = EntityStore::default();
        let policies = session_policies();
        let data = json!({ "session": { "__typename": "Session", "products": [
            { "__typename": "Product", "id": 1 }
        ] } });
        let first = write(&mut store, &policies, "{ session { products { id } } }", &json!({}), &data);
        let second = write(&mut store, &policies, "{ session { products { id } } }", &json!({}), &data);
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn test_aliases_are_read_from_the_response_key() {
        let mut store = EntityStore::default();
        write(
            &mut store,
            &TypePolicies::new(),
            "{ first: product(id: 1) { id } }",
            &json!({}),
            &json!({ "first": { "__typename": "Product", "id": 1 } }),
        );
        assert_eq!(
            store.get_field("ROOT_QUERY", r#"product({"id":1})"#),
            Some(&json!({ "__ref": "Product:1" }))
        );
    }

    #[test]
    fn test_non_object_result_is_rejected() {
        let doc = Document::parse("{ session { products { id } } }", None).unwrap();
        let mut store = EntityStore::default();
        let policies = TypePolicies::new();
        let variables = Map::new();
        let mut writer = Writer {
            store: &mut store,
            policies: &policies,
            variables: &variables,
            changes: ChangeSet::default(),
        };
        let err = writer
            .write_entity("ROOT_QUERY", Some("Query"), doc.selection_set(), &json!([1]))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidResult(_)));
    }
}
