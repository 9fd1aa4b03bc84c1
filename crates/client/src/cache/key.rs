//! Store field names.
//!
//! A field is stored as `name` when it has no keyed arguments and as
//! `name({"arg":value,...})` otherwise, with argument keys sorted. The
//! `@connection(key:, filter:)` directive and [`KeyArgs`] policies both narrow
//! which arguments take part, so reads with different arguments can share a
//! single slot.

use async_graphql_value::Value as GqlValue;
use serde_json::{Map, Value};

use super::policy::{FieldPolicy, KeyArgs};
use crate::document::{Field, resolve_value};

/// Client-only directive that pins a field's store name.
pub const CONNECTION_DIRECTIVE: &str = "connection";

/// Name a field's value is stored under on its parent.
#[must_use]
pub fn store_field_name(
    field: &Field,
    policy: Option<&FieldPolicy>,
    variables: &Map<String, Value>,
) -> String {
    if let Some(connection) = field.directive(CONNECTION_DIRECTIVE) {
        let key = match connection.argument("key").map(|v| resolve_value(v, variables)) {
            Some(Value::String(key)) => key,
            _ => field.name.clone(),
        };
        let filter = match connection.argument("filter").map(|v| resolve_value(v, variables)) {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(|n| n.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };
        return with_arguments(&key, keyed_arguments(field, Some(&filter), variables));
    }

    let args = match policy.map_or(&KeyArgs::All, |p| &p.key_args) {
        KeyArgs::All => keyed_arguments(field, None, variables),
        KeyArgs::None => Map::new(),
        KeyArgs::Only(names) => keyed_arguments(field, Some(names), variables),
    };
    with_arguments(&field.name, args)
}

/// Field name part of a store field name.
#[must_use]
pub fn field_name_of(store_field_name: &str) -> &str {
    store_field_name
        .split_once('(')
        .map_or(store_field_name, |(name, _)| name)
}

/// Arguments with their values, optionally restricted to `only`.
///
/// Arguments bound to a variable the caller did not provide are left out.
fn keyed_arguments(
    field: &Field,
    only: Option<&[String]>,
    variables: &Map<String, Value>,
) -> Map<String, Value> {
    field
        .arguments
        .iter()
        .filter(|(name, _)| only.is_none_or(|names| names.iter().any(|n| n == name)))
        .filter(|(_, value)| match value {
            GqlValue::Variable(var) => variables.contains_key(var.as_str()),
            _ => true,
        })
        .map(|(name, value)| (name.clone(), resolve_value(value, variables)))
        .collect()
}

fn with_arguments(name: &str, args: Map<String, Value>) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{name}({})", Value::Object(args))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::Document;

    fn products_field(source: &str, variables: &Value) -> (Field, Map<String, Value>) {
        let doc = Document::parse(source, None).unwrap();
        let vars = doc.resolve_variables(variables);
        let session = doc.selection_set().collect_fields(None, &vars)[0].clone();
        let products = session.selection_set.collect_fields(None, &vars)[0].clone();
        (products, vars)
    }

    const PLAIN: &str = "query Q($dec: Boolean) { session { products(isDecrementingInventory: $dec) { id } } }";
    const PINNED: &str = r#"query Q($dec: Boolean) {
        session { products(isDecrementingInventory: $dec) @connection(key: "products", filter: []) { id } }
    }"#;

    #[test]
    fn test_arguments_are_part_of_the_name() {
        let (field, vars) = products_field(PLAIN, &json!({ "dec": true }));
        assert_eq!(
            store_field_name(&field, None, &vars),
            r#"products({"isDecrementingInventory":true})"#
        );
    }

    #[test]
    fn test_unset_variables_are_left_out() {
        let (field, vars) = products_field(PLAIN, &json!({}));
        assert_eq!(store_field_name(&field, None, &vars), "products");
    }

    #[test]
    fn test_argument_keys_are_sorted() {
        let doc = Document::parse("{ list(z: 1, a: \"x\") }", None).unwrap();
        let field = doc.selection_set().collect_fields(None, &Map::new())[0];
        assert_eq!(
            store_field_name(field, None, &Map::new()),
            r#"list({"a":"x","z":1})"#
        );
    }

    #[test]
    fn test_connection_with_empty_filter_shares_one_slot() {
        let (field, with_arg) = products_field(PINNED, &json!({ "dec": true }));
        let (_, without_arg) = products_field(PINNED, &json!({}));
        assert_eq!(store_field_name(&field, None, &with_arg), "products");
        assert_eq!(store_field_name(&field, None, &without_arg), "products");
    }

    #[test]
    fn test_connection_filter_keeps_listed_arguments() {
        let doc = Document::parse(
            r#"{ feed(first: 10, kind: "news") @connection(key: "feed", filter: ["kind"]) { id } }"#,
            None,
        )
        .unwrap();
        let field = doc.selection_set().collect_fields(None, &Map::new())[0];
        assert_eq!(
            store_field_name(field, None, &Map::new()),
            r#"feed({"kind":"news"})"#
        );
    }

    #[test]
    fn test_key_args_policy() {
        let (field, vars) = products_field(PLAIN, &json!({ "dec": false }));
        let none = FieldPolicy::new().key_args(KeyArgs::None);
        assert_eq!(store_field_name(&field, Some(&none), &vars), "products");

        let only = FieldPolicy::new().key_args(KeyArgs::Only(vec!["other".into()]));
        assert_eq!(store_field_name(&field, Some(&only), &vars), "products");
    }

    #[test]
    fn test_field_name_of() {
        assert_eq!(field_name_of("products"), "products");
        assert_eq!(field_name_of(r#"products({"a":1})"#), "products");
    }
}
