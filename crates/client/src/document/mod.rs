//! Parsed GraphQL operations.
//!
//! Documents are parsed with `async-graphql-parser` and lowered into a small
//! owned tree that the cache walks when it normalizes results and reads them
//! back. Lowering selects one operation, inlines fragment spreads as inline
//! fragments and adds `__typename` to every nested selection set, so the
//! cache can always identify the objects it is handed.
//!
//! The text sent over the wire comes from [`Document::transport_source`],
//! which additionally strips client-only directives such as `@connection`.

mod print;
mod transform;

use std::collections::HashMap;

use async_graphql_parser::Positioned;
use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, FragmentDefinition, OperationDefinition,
    OperationType, Selection as ParsedSelection, SelectionSet as ParsedSelectionSet,
};
use async_graphql_value::{ConstValue, Value as GqlValue};
use serde_json::{Map, Value};
use thiserror::Error;

pub use transform::CLIENT_DIRECTIVES;

/// Field name the cache relies on to identify objects.
pub const TYPENAME_FIELD: &str = "__typename";

/// Deepest fragment nesting accepted before assuming a cycle.
const MAX_FRAGMENT_DEPTH: usize = 32;

/// Errors raised while turning GraphQL text into a [`Document`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("operation not found: {0}")]
    UnknownOperation(String),
    #[error("document contains several operations; an operation name is required")]
    AmbiguousOperation,
    #[error("unknown fragment: {0}")]
    UnknownFragment(String),
    #[error("fragment spreads nest too deeply (cycle through {0}?)")]
    FragmentCycle(String),
}

/// Kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Cache id of the root object this operation's results are written under.
    #[must_use]
    pub const fn root_id(self) -> &'static str {
        match self {
            Self::Query => "ROOT_QUERY",
            Self::Mutation => "ROOT_MUTATION",
            Self::Subscription => "ROOT_SUBSCRIPTION",
        }
    }

    /// `__typename` of that root object.
    #[must_use]
    pub const fn root_typename(self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
            Self::Subscription => "Subscription",
        }
    }

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(ty: OperationType) -> Self {
        match ty {
            OperationType::Query => Self::Query,
            OperationType::Mutation => Self::Mutation,
            OperationType::Subscription => Self::Subscription,
        }
    }
}

/// A declared operation variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    /// Type as written, e.g. `ProductInput!`.
    pub var_type: String,
    pub default_value: Option<ConstValue>,
}

/// A directive applied to a field or fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, GqlValue)>,
}

impl Directive {
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&GqlValue> {
        self.arguments
            .iter()
            .find_map(|(arg, value)| (arg == name).then_some(value))
    }
}

/// A selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, GqlValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl Field {
    /// A bare field with no arguments, directives or sub-selection.
    #[must_use]
    pub fn leaf(name: &str) -> Self {
        Self {
            alias: None,
            name: name.to_string(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    /// Key the field's value appears under in a response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }
}

/// An inline fragment, also used for inlined fragment spreads.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl InlineFragment {
    /// Whether the fragment applies to an object of `typename`.
    ///
    /// Without schema knowledge only exact matches are recognized; an
    /// unknown typename matches every fragment.
    #[must_use]
    pub fn applies_to(&self, typename: Option<&str>) -> bool {
        match (&self.type_condition, typename) {
            (Some(condition), Some(typename)) => condition == typename,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

impl SelectionSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fields that apply to an object of `typename`, with fragments
    /// flattened and `@skip`/`@include` evaluated.
    #[must_use]
    pub fn collect_fields<'a>(
        &'a self,
        typename: Option<&str>,
        variables: &Map<String, Value>,
    ) -> Vec<&'a Field> {
        let mut fields = Vec::new();
        self.collect_into(typename, variables, &mut fields);
        fields
    }

    fn collect_into<'a>(
        &'a self,
        typename: Option<&str>,
        variables: &Map<String, Value>,
        out: &mut Vec<&'a Field>,
    ) {
        for item in &self.items {
            match item {
                Selection::Field(field) => {
                    if is_included(&field.directives, variables) {
                        out.push(field);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if fragment.applies_to(typename)
                        && is_included(&fragment.directives, variables)
                    {
                        fragment
                            .selection_set
                            .collect_into(typename, variables, out);
                    }
                }
            }
        }
    }
}

/// One selected operation of a GraphQL document.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

/// A parsed operation ready for the cache and the transport.
#[derive(Debug, Clone)]
pub struct Document {
    operation: Operation,
    transport_source: String,
}

impl Document {
    /// Parse `source` and select one operation.
    ///
    /// `operation_name` may be omitted when the document holds a single
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` on syntax errors, missing or ambiguous
    /// operations, and unknown or cyclic fragments.
    pub fn parse(source: &str, operation_name: Option<&str>) -> Result<Self, DocumentError> {
        let parsed = async_graphql_parser::parse_query(source)
            .map_err(|e| DocumentError::Syntax(e.to_string()))?;
        let (name, definition) = select_operation(&parsed, operation_name)?;

        let lowering = Lowering {
            fragments: &parsed.fragments,
        };
        let selection_set = lowering.selection_set(&definition.selection_set.node, 0)?;

        let operation = Operation {
            kind: definition.ty.into(),
            name,
            variables: definition
                .variable_definitions
                .iter()
                .map(|def| VariableDefinition {
                    name: def.node.name.node.to_string(),
                    var_type: def.node.var_type.node.to_string(),
                    default_value: def.node.default_value.as_ref().map(|v| v.node.clone()),
                })
                .collect(),
            selection_set,
        };
        let operation = transform::add_typename(operation);
        let transport_source = print::print_operation(&transform::strip_client_directives(
            operation.clone(),
        ));

        Ok(Self {
            operation,
            transport_source,
        })
    }

    #[must_use]
    pub const fn operation(&self) -> &Operation {
        &self.operation
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.operation.name.as_deref()
    }

    #[must_use]
    pub const fn selection_set(&self) -> &SelectionSet {
        &self.operation.selection_set
    }

    /// GraphQL text to send to the server.
    #[must_use]
    pub fn transport_source(&self) -> &str {
        &self.transport_source
    }

    /// Provided variables completed with declared defaults.
    ///
    /// Non-object input is treated as "no variables".
    #[must_use]
    pub fn resolve_variables(&self, provided: &Value) -> Map<String, Value> {
        let mut variables = provided.as_object().cloned().unwrap_or_default();
        for definition in &self.operation.variables {
            if variables.contains_key(&definition.name) {
                continue;
            }
            if let Some(default) = definition
                .default_value
                .clone()
                .and_then(|v| v.into_json().ok())
            {
                variables.insert(definition.name.clone(), default);
            }
        }
        variables
    }
}

fn select_operation<'a>(
    parsed: &'a ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<(Option<String>, &'a OperationDefinition), DocumentError> {
    match &parsed.operations {
        DocumentOperations::Single(op) => Ok((operation_name.map(String::from), &op.node)),
        DocumentOperations::Multiple(ops) => match operation_name {
            Some(wanted) => ops
                .iter()
                .find(|(name, _)| name.as_str() == wanted)
                .map(|(name, op)| (Some(name.to_string()), &op.node))
                .ok_or_else(|| DocumentError::UnknownOperation(wanted.to_string())),
            None => {
                let mut iter = ops.iter();
                match (iter.next(), iter.next()) {
                    (Some((name, op)), None) => Ok((Some(name.to_string()), &op.node)),
                    _ => Err(DocumentError::AmbiguousOperation),
                }
            }
        },
    }
}

struct Lowering<'a> {
    fragments: &'a HashMap<async_graphql_value::Name, Positioned<FragmentDefinition>>,
}

impl Lowering<'_> {
    fn selection_set(
        &self,
        set: &ParsedSelectionSet,
        depth: usize,
    ) -> Result<SelectionSet, DocumentError> {
        let mut items = Vec::with_capacity(set.items.len());
        for item in &set.items {
            let lowered = match &item.node {
                ParsedSelection::Field(field) => {
                    let field = &field.node;
                    Selection::Field(Field {
                        alias: field.alias.as_ref().map(|a| a.node.to_string()),
                        name: field.name.node.to_string(),
                        arguments: lower_arguments(&field.arguments),
                        directives: lower_directives(&field.directives),
                        selection_set: self.selection_set(&field.selection_set.node, depth)?,
                    })
                }
                ParsedSelection::InlineFragment(fragment) => {
                    let fragment = &fragment.node;
                    Selection::InlineFragment(InlineFragment {
                        type_condition: fragment
                            .type_condition
                            .as_ref()
                            .map(|c| c.node.on.node.to_string()),
                        directives: lower_directives(&fragment.directives),
                        selection_set: self.selection_set(&fragment.selection_set.node, depth)?,
                    })
                }
                ParsedSelection::FragmentSpread(spread) => {
                    let name = &spread.node.fragment_name.node;
                    if depth >= MAX_FRAGMENT_DEPTH {
                        return Err(DocumentError::FragmentCycle(name.to_string()));
                    }
                    let definition = &self
                        .fragments
                        .get(name)
                        .ok_or_else(|| DocumentError::UnknownFragment(name.to_string()))?
                        .node;
                    let mut directives = lower_directives(&spread.node.directives);
                    directives.extend(lower_directives(&definition.directives));
                    Selection::InlineFragment(InlineFragment {
                        type_condition: Some(definition.type_condition.node.on.node.to_string()),
                        directives,
                        selection_set: self
                            .selection_set(&definition.selection_set.node, depth + 1)?,
                    })
                }
            };
            items.push(lowered);
        }
        Ok(SelectionSet { items })
    }
}

type ParsedArguments = [(
    Positioned<async_graphql_value::Name>,
    Positioned<GqlValue>,
)];

fn lower_arguments(arguments: &ParsedArguments) -> Vec<(String, GqlValue)> {
    arguments
        .iter()
        .map(|(name, value)| (name.node.to_string(), value.node.clone()))
        .collect()
}

fn lower_directives(
    directives: &[Positioned<async_graphql_parser::types::Directive>],
) -> Vec<Directive> {
    directives
        .iter()
        .map(|d| Directive {
            name: d.node.name.node.to_string(),
            arguments: lower_arguments(&d.node.arguments),
        })
        .collect()
}

/// Evaluate `@skip(if:)` and `@include(if:)` against the variables.
fn is_included(directives: &[Directive], variables: &Map<String, Value>) -> bool {
    let condition = |name: &str| {
        directives
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.argument("if"))
            .map(|v| resolve_value(v, variables).as_bool().unwrap_or(false))
    };
    !condition("skip").unwrap_or(false) && condition("include").unwrap_or(true)
}

/// Convert a GraphQL input value into JSON, substituting variables.
///
/// Unknown variables resolve to `null`.
#[must_use]
pub fn resolve_value(value: &GqlValue, variables: &Map<String, Value>) -> Value {
    match value {
        GqlValue::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Value::Null),
        GqlValue::Null => Value::Null,
        GqlValue::Number(n) => Value::Number(n.clone()),
        GqlValue::String(s) => Value::String(s.clone()),
        GqlValue::Boolean(b) => Value::Bool(*b),
        GqlValue::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        GqlValue::Enum(name) => Value::String(name.to_string()),
        GqlValue::List(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, variables)).collect())
        }
        GqlValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), resolve_value(v, variables)))
                .collect(),
        ),
    }
}
