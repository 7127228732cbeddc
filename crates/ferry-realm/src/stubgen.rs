//! Stub module generation.
//!
//! A runtime stub re-exports values of a module in another realm through the
//! remote access runtime. Interface modules also get a type declaration stub
//! with types guessed from the value shapes.

use crate::remote::{RemoteValue, ValueKind};
use std::fmt::Write;

/// Module imported by generated stubs for remote access.
pub const REMOTE_RUNTIME: &str = "/@ferry/runtime/remote.ts";

/// Inputs of stub generation.
#[derive(Debug, Clone)]
pub struct StubInput<'a> {
    /// Module identifier passed to the remote runtime.
    pub module: &'a str,
    /// Importing module, for the header comment.
    pub importer: Option<&'a str>,
    /// Exported names with their resolved values.
    pub exports: &'a [(String, Option<RemoteValue>)],
}

/// Generate the runtime stub.
#[must_use]
pub fn generate_ts(input: &StubInput<'_>) -> String {
    let mut out = header(input, "Remote access stub for");
    let _ = writeln!(out, "import {{ remote }} from {:?};", REMOTE_RUNTIME);
    out.push('\n');
    let _ = writeln!(out, "const exports = await remote({:?});", input.module);
    out.push('\n');

    for (index, (name, value)) in input.exports.iter().enumerate() {
        if value.is_none() {
            let _ = writeln!(
                out,
                "console.warn({:?});",
                format!("{} does not export {:?}", input.module, name)
            );
        }
        if name == "default" {
            out.push_str("export default exports[\"default\"];\n");
        } else if is_identifier(name) {
            let _ = writeln!(out, "export const {name} = exports[{name:?}];");
        } else {
            let _ = writeln!(out, "const _export{index} = exports[{name:?}];");
            let _ = writeln!(out, "export {{ _export{index} as {name:?} }};");
        }
    }
    out
}

/// Generate the type declaration stub.
#[must_use]
pub fn generate_dts(input: &StubInput<'_>) -> String {
    let mut out = header(input, "Type declarations for");
    let mut has_default = false;

    for (index, (name, value)) in input.exports.iter().enumerate() {
        let ty = value
            .as_ref()
            .map_or_else(|| "any".to_string(), |value| type_of(&value.kind));
        if name == "default" {
            has_default = true;
            let _ = writeln!(out, "declare const _default: {ty};");
            out.push_str("export default _default;\n");
        } else if is_identifier(name) {
            let _ = writeln!(out, "export declare const {name}: {ty};");
        } else {
            let _ = writeln!(out, "declare const _export{index}: {ty};");
            let _ = writeln!(out, "export {{ _export{index} as {name:?} }};");
        }
    }
    if !has_default {
        out.push_str("declare const _default: any;\nexport default _default;\n");
    }
    out
}

fn header(input: &StubInput<'_>, title: &str) -> String {
    let mut out = format!("// {title} {}", input.module);
    if let Some(importer) = input.importer {
        let _ = write!(out, " (imported by {importer})");
    }
    out.push_str("\n// Generated by ferry, do not edit.\n\n");
    out
}

fn type_of(kind: &ValueKind) -> String {
    match kind {
        ValueKind::Function { arity } => {
            let params = (0..*arity)
                .map(|i| format!("arg{i}: any"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({params}) => Promise<any>")
        }
        ValueKind::String => "string".to_string(),
        ValueKind::Number => "number".to_string(),
        ValueKind::Boolean => "boolean".to_string(),
        ValueKind::Object(keys) if keys.iter().all(|key| is_identifier(key)) => {
            let fields = keys
                .iter()
                .map(|key| format!("{key}: any"))
                .collect::<Vec<_>>()
                .join("; ");
            format!("{{ {fields} }}")
        }
        ValueKind::Object(_) => "Record<string, any>".to_string(),
        ValueKind::Unknown => "any".to_string(),
    }
}

/// Check if `name` can be used as a plain binding name.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
