//! Reading results back out of the normalized store.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::key::store_field_name;
use super::policy::TypePolicies;
use super::store::{Entity, EntityStore, FieldKey, as_reference};
use crate::document::{Field, SelectionSet, TYPENAME_FIELD};

/// Outcome of reading a selection set from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    /// Data that could be read; partial when `complete` is false.
    pub result: Value,
    pub complete: bool,
    /// Dotted paths of fields that were not cached.
    pub missing: Vec<String>,
    /// Every entity field the read touched, present or not.
    pub dependencies: HashSet<FieldKey>,
}

pub(crate) struct Reader<'a> {
    pub store: &'a EntityStore,
    pub policies: &'a TypePolicies,
    pub variables: &'a Map<String, Value>,
    missing: Vec<String>,
    dependencies: HashSet<FieldKey>,
}

#[derive(Clone, Copy)]
enum Source<'a> {
    Entity(&'a str),
    Inline(&'a Entity),
}

impl<'a> Reader<'a> {
    pub fn new(
        store: &'a EntityStore,
        policies: &'a TypePolicies,
        variables: &'a Map<String, Value>,
    ) -> Self {
        Self {
            store,
            policies,
            variables,
            missing: Vec::new(),
            dependencies: HashSet::new(),
        }
    }

    /// Read `selection_set` starting at the root entity `root_id`.
    pub fn diff(
        mut self,
        root_id: &'a str,
        root_typename: &str,
        selection_set: &SelectionSet,
    ) -> Diff {
        let result = self.read_object(
            Source::Entity(root_id),
            Some(root_typename),
            selection_set,
            "",
        );
        Diff {
            result,
            complete: self.missing.is_empty(),
            missing: self.missing,
            dependencies: self.dependencies,
        }
    }

    fn read_object(
        &mut self,
        source: Source<'a>,
        fallback_typename: Option<&str>,
        selection_set: &SelectionSet,
        path: &str,
    ) -> Value {
        let store = self.store;
        let fields = match source {
            Source::Entity(id) => {
                if !store.contains(id) {
                    self.dependencies.insert(FieldKey::entity(id));
                }
                store.get(id)
            }
            Source::Inline(fields) => Some(fields),
        };
        let typename = fields
            .and_then(|f| f.get(TYPENAME_FIELD))
            .and_then(Value::as_str)
            .or(fallback_typename);

        let mut result = Map::new();
        for field in selection_set.collect_fields(typename, self.variables) {
            let field_path = if path.is_empty() {
                field.response_key().to_string()
            } else {
                format!("{path}.{}", field.response_key())
            };

            if field.name == TYPENAME_FIELD
                && let Some(typename) = typename
            {
                result.insert(
                    field.response_key().to_string(),
                    Value::String(typename.to_string()),
                );
                continue;
            }

            let policy = self.policies.field_policy(typename, &field.name);
            let store_name = store_field_name(field, policy, self.variables);
            if let Source::Entity(id) = source {
                self.dependencies.insert(FieldKey::field(id, &store_name));
            }

            match fields.and_then(|f| f.get(&store_name)) {
                Some(value) => {
                    let value = self.read_value(field, value, &field_path);
                    result.insert(field.response_key().to_string(), value);
                }
                None => self.missing.push(field_path),
            }
        }
        Value::Object(result)
    }

    fn read_value(&mut self, field: &Field, value: &'a Value, path: &str) -> Value {
        if field.selection_set.is_empty() {
            return value.clone();
        }
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.read_value(field, item, &format!("{path}.{i}")))
                    .collect(),
            ),
            Value::Object(object) => match as_reference(value) {
                Some(id) => {
                    if self.store.contains(id) {
                        self.read_object(Source::Entity(id), None, &field.selection_set, path)
                    } else {
                        self.dependencies.insert(FieldKey::entity(id));
                        self.missing.push(path.to_string());
                        Value::Null
                    }
                }
                None => self.read_object(Source::Inline(object), None, &field.selection_set, path),
            },
            other => other.clone(),
        }
    }
}
