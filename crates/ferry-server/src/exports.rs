//! Export scanning for script modules.
//!
//! The backend entrypoint is parsed with tree-sitter and its top-level
//! `export` statements are listed together with a rough shape of each
//! exported value. The frontend stub of the backend is generated from this
//! list, so type-only exports are left out.

use ferry_realm::ValueKind;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

const EXPORTS_SCM: &str = "(program (export_statement) @export)";

/// Export scanning errors.
#[derive(Debug, Error)]
pub enum ExportScanError {
    #[error("Failed to load grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("Invalid export query: {0}")]
    Query(#[from] tree_sitter::QueryError),

    #[error("Parser produced no syntax tree")]
    NoTree,
}

/// Lists the exports of one script dialect.
pub struct ExportScanner {
    language: Language,
    query: Query,
}

impl ExportScanner {
    /// Create a scanner for `language`.
    ///
    /// # Errors
    ///
    /// Returns an error if the export query does not compile for the grammar.
    pub fn new(language: Language) -> Result<Self, ExportScanError> {
        let query = Query::new(&language, EXPORTS_SCM)?;
        Ok(Self { language, query })
    }

    /// Scanner for the module at `path`, `None` if it is not a script.
    ///
    /// # Errors
    ///
    /// See [`ExportScanner::new`].
    pub fn for_path(path: &Path) -> Result<Option<Self>, ExportScanError> {
        let language: Language = match path.extension().and_then(|ext| ext.to_str()) {
            Some("ts" | "mts" | "cts" | "js" | "mjs" | "cjs") => {
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
            }
            Some("tsx" | "jsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => return Ok(None),
        };
        Self::new(language).map(Some)
    }

    /// List the exports of `source` in declaration order.
    ///
    /// A name exported more than once keeps its first position and the
    /// shape of its last declaration, so overloads report the
    /// implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the grammar cannot be loaded.
    pub fn scan(&self, source: &str) -> Result<Vec<(String, ValueKind)>, ExportScanError> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        let tree = parser.parse(source, None).ok_or(ExportScanError::NoTree)?;
        let root = tree.root_node();

        let mut locals = Vec::new();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            declaration(node, source, &mut locals);
        }
        let locals = locals.into_iter().collect::<HashMap<_, _>>();

        let mut exports = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, root, source.as_bytes());
        while let Some(mat) = matches.next() {
            for cap in mat.captures {
                export_statement(cap.node, source, &locals, &mut exports);
            }
        }
        Ok(exports)
    }
}

/// List the exports of the script at `path`.
///
/// Modules that are not scripts export nothing.
///
/// # Errors
///
/// Returns an error if the grammar cannot be loaded.
pub fn scan_exports(
    path: &Path,
    source: &str,
) -> Result<Vec<(String, ValueKind)>, ExportScanError> {
    match ExportScanner::for_path(path)? {
        Some(scanner) => scanner.scan(source),
        None => Ok(Vec::new()),
    }
}

fn export_statement(
    node: Node<'_>,
    source: &str,
    locals: &HashMap<String, ValueKind>,
    out: &mut Vec<(String, ValueKind)>,
) {
    // export type { .. }
    if has_token(node, "type") {
        return;
    }

    if has_token(node, "default") {
        let kind = node
            .child_by_field_name("declaration")
            .or_else(|| node.child_by_field_name("value"))
            .map_or(ValueKind::Unknown, |value| value_kind(value, source));
        push(out, "default".to_string(), kind);
        return;
    }

    if let Some(decl) = node.child_by_field_name("declaration") {
        let mut declared = Vec::new();
        declaration(decl, source, &mut declared);
        for (name, kind) in declared {
            push(out, name, kind);
        }
        return;
    }

    let reexport = node.child_by_field_name("source").is_some();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "export_clause" => {
                let mut specifiers = child.walk();
                for spec in child.named_children(&mut specifiers) {
                    if spec.kind() != "export_specifier" || has_token(spec, "type") {
                        continue;
                    }
                    let Some(local) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let exported = spec.child_by_field_name("alias").unwrap_or(local);
                    let kind = if reexport {
                        ValueKind::Unknown
                    } else {
                        locals
                            .get(&property_name(local, source))
                            .cloned()
                            .unwrap_or(ValueKind::Unknown)
                    };
                    push(out, property_name(exported, source), kind);
                }
            }
            "namespace_export" => {
                let mut inner = child.walk();
                if let Some(name) = child.named_children(&mut inner).next() {
                    push(out, property_name(name, source), ValueKind::Unknown);
                };
            }
            _ => {}
        }
    }
}

/// Names bound by a top-level declaration.
fn declaration(node: Node<'_>, source: &str, out: &mut Vec<(String, ValueKind)>) {
    match node.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name.kind() == "identifier" {
                    let kind = declarator
                        .child_by_field_name("value")
                        .map_or(ValueKind::Unknown, |value| value_kind(value, source));
                    out.push((text(name, source), kind));
                } else {
                    binding_names(name, source, out);
                }
            }
        }
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.push((text(name, source), value_kind(node, source)));
            }
        }
        "class_declaration" | "abstract_class_declaration" | "enum_declaration"
        | "internal_module" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.push((text(name, source), ValueKind::Unknown));
            }
        }
        "ambient_declaration" => {
            let mut cursor = node.walk();
            for inner in node.named_children(&mut cursor) {
                declaration(inner, source, out);
            }
        }
        _ => {}
    }
}

/// Identifiers bound by a destructuring pattern.
fn binding_names(pattern: Node<'_>, source: &str, out: &mut Vec<(String, ValueKind)>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push((text(pattern, source), ValueKind::Unknown));
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                binding_names(value, source, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = pattern.child_by_field_name("left") {
                binding_names(left, source, out);
            }
        }
        _ => {
            let mut cursor = pattern.walk();
            for child in pattern.named_children(&mut cursor) {
                binding_names(child, source, out);
            }
        }
    }
}

fn value_kind(node: Node<'_>, source: &str) -> ValueKind {
    match node.kind() {
        "string" | "template_string" => ValueKind::String,
        "number" => ValueKind::Number,
        "true" | "false" => ValueKind::Boolean,
        "unary_expression" => match node.child_by_field_name("argument") {
            Some(argument) if argument.kind() == "number" => ValueKind::Number,
            _ => ValueKind::Unknown,
        },
        "arrow_function"
        | "function_expression"
        | "function"
        | "generator_function"
        | "function_declaration"
        | "generator_function_declaration"
        | "function_signature" => ValueKind::Function {
            arity: arity(node),
        },
        "object" => ValueKind::Object(object_keys(node, source)),
        "parenthesized_expression" | "as_expression" | "satisfies_expression" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next();
            inner.map_or(ValueKind::Unknown, |inner| value_kind(inner, source))
        }
        _ => ValueKind::Unknown,
    }
}

fn arity(function: Node<'_>) -> usize {
    // x => x
    if function.child_by_field_name("parameter").is_some() {
        return 1;
    }
    function
        .child_by_field_name("parameters")
        .map_or(0, |params| {
            let mut cursor = params.walk();
            let count = params
                .named_children(&mut cursor)
                .filter(|param| param.kind() != "comment")
                .count();
            count
        })
}

fn object_keys(object: Node<'_>, source: &str) -> Vec<String> {
    let mut cursor = object.walk();
    let keys = object
        .named_children(&mut cursor)
        .filter_map(|member| match member.kind() {
            "pair" => member.child_by_field_name("key"),
            "method_definition" => member.child_by_field_name("name"),
            "shorthand_property_identifier" => Some(member),
            _ => None,
        })
        .map(|key| property_name(key, source))
        .collect();
    keys
}

/// Property or export name, without quotes if it is a string literal.
fn property_name(node: Node<'_>, source: &str) -> String {
    let name = text(node, source);
    if node.kind() == "string" {
        name.trim_matches(|c| c == '"' || c == '\'').to_string()
    } else {
        name
    }
}

fn text(node: Node<'_>, source: &str) -> String {
    node.utf8_text(source.as_bytes())
        .unwrap_or_default()
        .to_string()
}

fn has_token(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == kind);
    found
}

fn push(out: &mut Vec<(String, ValueKind)>, name: String, kind: ValueKind) {
    match out.iter_mut().find(|(existing, _)| *existing == name) {
        Some(entry) => entry.1 = kind,
        None => out.push((name, kind)),
    }
}
