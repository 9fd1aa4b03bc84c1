//! Rewrites applied to a lowered operation.

use super::{Field, Operation, Selection, SelectionSet, TYPENAME_FIELD};

/// Directives understood by the cache and never sent to the server.
pub const CLIENT_DIRECTIVES: &[&str] = &["connection"];

/// Add `__typename` to every nested field selection set that lacks it.
///
/// The operation root is left alone; its typename is implied by the
/// operation kind.
pub(super) fn add_typename(mut operation: Operation) -> Operation {
    for item in &mut operation.selection_set.items {
        add_typename_in(item);
    }
    operation
}

fn add_typename_in(selection: &mut Selection) {
    match selection {
        Selection::Field(field) => {
            if field.selection_set.is_empty() {
                return;
            }
            for item in &mut field.selection_set.items {
                add_typename_in(item);
            }
            if !selects_typename(&field.selection_set) {
                field
                    .selection_set
                    .items
                    .push(Selection::Field(Field::leaf(TYPENAME_FIELD)));
            }
        }
        Selection::InlineFragment(fragment) => {
            for item in &mut fragment.selection_set.items {
                add_typename_in(item);
            }
        }
    }
}

fn selects_typename(set: &SelectionSet) -> bool {
    set.items.iter().any(|item| {
        matches!(item, Selection::Field(f) if f.name == TYPENAME_FIELD && f.alias.is_none())
    })
}

/// Drop [`CLIENT_DIRECTIVES`] everywhere in the operation.
pub(super) fn strip_client_directives(mut operation: Operation) -> Operation {
    strip_in(&mut operation.selection_set);
    operation
}

fn strip_in(set: &mut SelectionSet) {
    for item in &mut set.items {
        match item {
            Selection::Field(field) => {
                field
                    .directives
                    .retain(|d| !CLIENT_DIRECTIVES.contains(&d.name.as_str()));
                strip_in(&mut field.selection_set);
            }
            Selection::InlineFragment(fragment) => {
                fragment
                    .directives
                    .retain(|d| !CLIENT_DIRECTIVES.contains(&d.name.as_str()));
                strip_in(&mut fragment.selection_set);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::Map;

    use super::super::Document;
    use super::*;

    #[test]
    fn test_typename_not_duplicated() {
        let doc = Document::parse("{ session { __typename products { id } } }", None).unwrap();
        let session = doc.selection_set().collect_fields(None, &Map::new())[0];
        let typenames = session
            .selection_set
            .collect_fields(None, &Map::new())
            .iter()
            .filter(|f| f.name == TYPENAME_FIELD)
            .count();
        assert_eq!(typenames, 1);
    }

    #[test]
    fn test_root_has_no_typename() {
        let doc = Document::parse("{ session { id } }", None).unwrap();
        assert_eq!(doc.selection_set().items.len(), 1);
    }

    #[test]
    fn test_connection_kept_for_cache_but_not_transport() {
        let doc = Document::parse(
            "{ session { products @connection(key: \"products\", filter: []) { id } } }",
            None,
        )
        .unwrap();
        let session = doc.selection_set().collect_fields(None, &Map::new())[0];
        let products = session.selection_set.collect_fields(None, &Map::new())[0];
        assert!(products.directive("connection").is_some());
        assert!(!doc.transport_source().contains("@connection"));
    }
}
