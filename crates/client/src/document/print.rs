//! Printing a lowered operation back to GraphQL text.

use std::fmt::Write;

use super::{Directive, Operation, Selection, SelectionSet};

const INDENT: &str = "  ";

pub(super) fn print_operation(operation: &Operation) -> String {
    let mut out = String::from(operation.kind.keyword());
    if let Some(name) = &operation.name {
        out.push(' ');
        out.push_str(name);
    }
    if !operation.variables.is_empty() {
        let definitions: Vec<String> = operation
            .variables
            .iter()
            .map(|def| match &def.default_value {
                Some(default) => format!("${}: {} = {default}", def.name, def.var_type),
                None => format!("${}: {}", def.name, def.var_type),
            })
            .collect();
        let _ = write!(out, "({})", definitions.join(", "));
    }
    out.push(' ');
    print_selection_set(&mut out, &operation.selection_set, 0);
    out
}

fn print_selection_set(out: &mut String, set: &SelectionSet, depth: usize) {
    out.push_str("{\n");
    for item in &set.items {
        out.push_str(&INDENT.repeat(depth + 1));
        match item {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    let _ = write!(out, "{alias}: ");
                }
                out.push_str(&field.name);
                print_arguments(out, &field.arguments);
                print_directives(out, &field.directives);
                if !field.selection_set.is_empty() {
                    out.push(' ');
                    print_selection_set(out, &field.selection_set, depth + 1);
                }
            }
            Selection::InlineFragment(fragment) => {
                out.push_str("...");
                if let Some(condition) = &fragment.type_condition {
                    let _ = write!(out, " on {condition}");
                }
                print_directives(out, &fragment.directives);
                out.push(' ');
                print_selection_set(out, &fragment.selection_set, depth + 1);
            }
        }
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn print_arguments(out: &mut String, arguments: &[(String, async_graphql_value::Value)]) {
    if arguments.is_empty() {
        return;
    }
    let rendered: Vec<String> = arguments
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect();
    let _ = write!(out, "({})", rendered.join(", "));
}

fn print_directives(out: &mut String, directives: &[Directive]) {
    for directive in directives {
        let _ = write!(out, " @{}", directive.name);
        print_arguments(out, &directive.arguments);
    }
}
