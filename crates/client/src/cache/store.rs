//! The normalized entity map and change tracking.
//!
//! Entities are flat field maps keyed by cache id. A field holding another
//! entity stores a reference object `{"__ref": "<id>"}` instead of the entity
//! itself.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};

/// Key of a reference object.
pub const REF_KEY: &str = "__ref";

/// Fields of one normalized entity, keyed by store field name.
pub type Entity = Map<String, Value>;

/// Build a reference to an entity.
#[must_use]
pub fn make_reference(id: &str) -> Value {
    let mut reference = Map::new();
    reference.insert(REF_KEY.to_string(), Value::String(id.to_string()));
    Value::Object(reference)
}

/// The id a reference points at, if `value` is one.
#[must_use]
pub fn as_reference(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(REF_KEY)?.as_str()
}

/// A dependency or a change: one field of one entity, or the whole entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub entity: String,
    pub field: Option<String>,
}

impl FieldKey {
    #[must_use]
    pub fn field(entity: &str, field: &str) -> Self {
        Self {
            entity: entity.to_string(),
            field: Some(field.to_string()),
        }
    }

    #[must_use]
    pub fn entity(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            field: None,
        }
    }

    /// Entity-wide keys overlap every field of that entity.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.entity == other.entity
            && match (&self.field, &other.field) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

/// Set of fields whose stored value changed during one cache operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    keys: HashSet<FieldKey>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn insert(&mut self, key: FieldKey) {
        self.keys.insert(key);
    }

    /// Whether any change touches one of `dependencies`.
    #[must_use]
    pub fn touches(&self, dependencies: &HashSet<FieldKey>) -> bool {
        self.keys
            .iter()
            .any(|changed| dependencies.iter().any(|dep| dep.overlaps(changed)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldKey> {
        self.keys.iter()
    }
}

/// Map of cache id to entity.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: HashMap<String, Entity>,
}

impl EntityStore {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    #[must_use]
    pub fn get_field(&self, id: &str, field: &str) -> Option<&Value> {
        self.entities.get(id)?.get(field)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Store `value` unless it equals what is already there.
    ///
    /// Returns whether the store changed; changes are recorded in `changes`.
    pub fn set_field(
        &mut self,
        id: &str,
        field: &str,
        value: Value,
        changes: &mut ChangeSet,
    ) -> bool {
        let entity = self.entities.entry(id.to_string()).or_default();
        if entity.get(field) == Some(&value) {
            return false;
        }
        entity.insert(field.to_string(), value);
        changes.insert(FieldKey::field(id, field));
        true
    }

    /// Remove an entity entirely.
    pub fn evict(&mut self, id: &str, changes: &mut ChangeSet) -> bool {
        if self.entities.remove(id).is_some() {
            changes.insert(FieldKey::entity(id));
            true
        } else {
            false
        }
    }

    /// Drop every entity.
    pub fn clear(&mut self, changes: &mut ChangeSet) {
        for id in self.entities.keys() {
            changes.insert(FieldKey::entity(id));
        }
        self.entities.clear();
    }

    /// Store field names of `id` whose field name (before any arguments) is
    /// `field_name`.
    #[must_use]
    pub fn matching_fields(&self, id: &str, field_name: &str) -> Vec<String> {
        self.entities.get(id).map_or_else(Vec::new, |entity| {
            entity
                .keys()
                .filter(|key| super::key::field_name_of(key) == field_name)
                .cloned()
                .collect()
        })
    }

    /// Snapshot of the whole store as one JSON object, sorted by id.
    #[must_use]
    pub fn extract(&self) -> Value {
        let sorted: BTreeMap<&String, &Entity> = self.entities.iter().collect();
        Value::Object(
            sorted
                .into_iter()
                .map(|(id, entity)| (id.clone(), Value::Object(entity.clone())))
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
