//! Rust back end: in-memory representations for every declared type, plus
//! service traits. One output file per program under `gen-rust/`.

use crate::error::IdlError;
use crate::generator::{gen_dir, write_output, Generator, GeneratorOptions};
use crate::types::{
    BaseType, ConstValue, Constant, Field, ProgramId, Requiredness, Tree, TypeId, TypeKind,
};

pub struct RustGenerator {
    options: GeneratorOptions,
}

impl RustGenerator {
    pub fn factory(options: &GeneratorOptions) -> Box<dyn Generator> {
        Box::new(RustGenerator {
            options: options.clone(),
        })
    }
}

impl Generator for RustGenerator {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn generate(&mut self, tree: &Tree, program: ProgramId) -> Result<(), IdlError> {
        let code = generate_program(tree, program, &self.options);
        let dir = gen_dir(tree, program, "rust")?;
        let file = dir.join(format!("{}.rs", tree.program(program).name));
        write_output(&file, &code)
    }
}

/// Upper-camel-cases an identifier. Underscore-separated words are joined
/// with each word reduced to a leading capital; a single all-caps word
/// ("SIGNAL") gets the same treatment, while mixed case keeps its tail
/// untouched ("NotFound" stays "NotFound").
fn to_pascal_case(s: &str) -> String {
    let joined = s.contains('_');
    let mut out = String::with_capacity(s.len());
    for word in s.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => continue,
        };
        out.extend(first.to_uppercase());
        let tail = chars.as_str();
        if joined || !word.chars().any(|c| c.is_lowercase()) {
            out.push_str(&tail.to_lowercase());
        } else {
            out.push_str(tail);
        }
    }
    out
}

/// Lower-snake-cases an identifier without splitting acronyms
/// (e.g. "sessionID" becomes "session_id").
fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut iter = s.chars().peekable();
    let mut prev_upper = true;
    while let Some(c) = iter.next() {
        if c.is_uppercase() {
            let next_lower = iter.peek().map(|n| n.is_lowercase()).unwrap_or(false);
            if !out.is_empty() && (!prev_upper || next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_upper = true;
        } else {
            out.push(c);
            prev_upper = false;
        }
    }
    out
}

/// Suffixes identifiers that collide with a strict or reserved keyword of
/// the 2021 edition.
fn escape_rust_keyword(s: &str) -> String {
    let reserved = matches!(
        s,
        "abstract" | "as" | "async" | "await" | "become" | "box" | "break" | "const"
            | "continue" | "crate" | "do" | "dyn" | "else" | "enum" | "extern" | "false"
            | "final" | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "macro"
            | "match" | "mod" | "move" | "mut" | "override" | "priv" | "pub" | "ref"
            | "return" | "self" | "Self" | "static" | "struct" | "super" | "trait"
            | "true" | "try" | "type" | "typeof" | "union" | "unsafe" | "unsized"
            | "use" | "virtual" | "where" | "while" | "yield"
    );
    if reserved {
        format!("{}_", s)
    } else {
        s.to_string()
    }
}

/// Maps a schema type to its Rust spelling. Typedef names are kept as
/// aliases rather than unfolded.
fn rust_type(tree: &Tree, id: TypeId) -> String {
    let ty = tree.ty(id);
    match &ty.kind {
        TypeKind::Base(base) => match base {
            BaseType::Void   => "()".to_string(),
            BaseType::Bool   => "bool".to_string(),
            BaseType::Byte   => "u8".to_string(),
            BaseType::I16    => "i16".to_string(),
            BaseType::I32    => "i32".to_string(),
            BaseType::I64    => "i64".to_string(),
            BaseType::Double => "f64".to_string(),
            BaseType::String { binary: true, .. } => "Vec<u8>".to_string(),
            BaseType::String { slist: true, .. }  => "Vec<String>".to_string(),
            BaseType::String { .. } => "String".to_string(),
        },
        TypeKind::List { elem } => format!("Vec<{}>", rust_type(tree, *elem)),
        TypeKind::Set { elem } => format!("HashSet<{}>", rust_type(tree, *elem)),
        TypeKind::Map { key, value } => format!(
            "HashMap<{}, {}>",
            rust_type(tree, *key),
            rust_type(tree, *value)
        ),
        _ => to_pascal_case(&ty.name),
    }
}

fn field_type(tree: &Tree, field: &Field) -> String {
    let base = rust_type(tree, field.ty);
    if field.req == Requiredness::Optional {
        format!("Option<{}>", base)
    } else {
        base
    }
}

fn doc_lines(out: &mut Vec<String>, doc: &Option<String>, indent: &str) {
    if let Some(doc) = doc {
        for line in doc.lines() {
            out.push(format!("{}/// {}", indent, line).trim_end().to_string());
        }
    }
}

fn generate_program(tree: &Tree, pid: ProgramId, options: &GeneratorOptions) -> String {
    let program = tree.program(pid);
    let mut out: Vec<String> = Vec::new();

    out.push(format!(
        "// Autogenerated by the ridl compiler from {}; do not edit.",
        program.path.display()
    ));
    if let Some(doc) = &program.doc {
        for line in doc.lines() {
            out.push(format!("//! {}", line).trim_end().to_string());
        }
    }
    out.push("#![allow(dead_code, unused_imports)]".to_string());
    out.push(String::new());
    out.push("use std::collections::{HashMap, HashSet};".to_string());
    out.push(String::new());
    out.push("use serde::Serialize;".to_string());
    out.push(String::new());

    for id in &program.typedefs {
        let ty = tree.ty(*id);
        if let TypeKind::Typedef { target } = &ty.kind {
            doc_lines(&mut out, &ty.doc, "");
            out.push(format!(
                "pub type {} = {};",
                to_pascal_case(&ty.name),
                rust_type(tree, *target)
            ));
            out.push(String::new());
        }
    }

    for id in &program.enums {
        generate_enum(tree, *id, &mut out);
    }

    for cid in &program.constants {
        generate_constant(tree, tree.constant(*cid), &mut out);
    }

    for id in &program.structs {
        generate_struct(tree, *id, options, &mut out, false);
    }
    for id in &program.exceptions {
        generate_struct(tree, *id, options, &mut out, true);
    }

    for id in &program.services {
        generate_service(tree, *id, &mut out);
    }

    let mut code = out.join("\n");
    code.push('\n');
    code
}

fn generate_enum(tree: &Tree, id: TypeId, out: &mut Vec<String>) {
    let ty = tree.ty(id);
    let values = match &ty.kind {
        TypeKind::Enum { values } => values,
        _ => return,
    };
    doc_lines(out, &ty.doc, "");
    out.push("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]".to_string());
    out.push(format!("pub enum {} {{", to_pascal_case(&ty.name)));
    for v in values {
        doc_lines(out, &v.doc, "    ");
        out.push(format!(
            "    {} = {},",
            escape_rust_keyword(&to_pascal_case(&v.name)),
            v.value
        ));
    }
    out.push("}".to_string());
    out.push(String::new());
}

fn generate_constant(tree: &Tree, c: &Constant, out: &mut Vec<String>) {
    let tid = tree.true_type(c.ty);
    let base = match &tree.ty(tid).kind {
        TypeKind::Base(base) => *base,
        _ => {
            out.push(format!(
                "// constant {} has a non-scalar type and is not emitted for this target",
                c.name
            ));
            out.push(String::new());
            return;
        }
    };
    doc_lines(out, &c.doc, "");
    let name = c.name.to_uppercase();
    match (&base, &c.value) {
        (BaseType::Bool, ConstValue::Integer(v)) => {
            out.push(format!("pub const {}: bool = {};", name, *v != 0));
        }
        (BaseType::Double, ConstValue::Integer(v)) => {
            out.push(format!("pub const {}: f64 = {}.0;", name, v));
        }
        (BaseType::Double, ConstValue::Double(v)) => {
            out.push(format!("pub const {}: f64 = {:?};", name, v));
        }
        (BaseType::String { .. }, ConstValue::Str(s)) => {
            out.push(format!(
                "pub const {}: &str = {};",
                name,
                crate::utils::quote(s)
            ));
        }
        (_, ConstValue::Integer(v)) => {
            out.push(format!(
                "pub const {}: {} = {};",
                name,
                rust_type(tree, tid),
                v
            ));
        }
        _ => {
            out.push(format!(
                "// constant {} has an unsupported value form and is not emitted",
                c.name
            ));
        }
    }
    out.push(String::new());
}

fn generate_struct(
    tree: &Tree,
    id: TypeId,
    options: &GeneratorOptions,
    out: &mut Vec<String>,
    is_exception: bool,
) {
    let ty = tree.ty(id);
    let fields = match ty.fields() {
        Some(fields) => fields,
        None => return,
    };
    let name = to_pascal_case(&ty.name);

    doc_lines(out, &ty.doc, "");
    if let Some(fp) = &ty.fingerprint {
        out.push(format!("// fingerprint: {}", fp));
    }
    let mut derives =
        "Debug, Clone, PartialEq, Default, Serialize".to_string();
    if let Some(extra) = options.get("derive") {
        if !extra.is_empty() {
            derives.push_str(", ");
            derives.push_str(extra);
        }
    }
    out.push(format!("#[derive({})]", derives));
    out.push(format!("pub struct {} {{", name));
    for field in fields {
        doc_lines(out, &field.doc, "    ");
        out.push(format!(
            "    pub {}: {},",
            escape_rust_keyword(&to_snake_case(&field.name)),
            field_type(tree, field)
        ));
    }
    out.push("}".to_string());
    out.push(String::new());

    if is_exception {
        out.push(format!("impl std::fmt::Display for {} {{", name));
        out.push(
            "    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {"
                .to_string(),
        );
        out.push(format!("        write!(f, \"{}\")", name));
        out.push("    }".to_string());
        out.push("}".to_string());
        out.push(String::new());
        out.push(format!("impl std::error::Error for {} {{}}", name));
        out.push(String::new());
    }
}

fn generate_service(tree: &Tree, id: TypeId, out: &mut Vec<String>) {
    let ty = tree.ty(id);
    let (extends, functions) = match &ty.kind {
        TypeKind::Service { extends, functions } => (extends, functions),
        _ => return,
    };
    let name = to_pascal_case(&ty.name);

    doc_lines(out, &ty.doc, "");
    match extends {
        Some(parent) => {
            let parent_short = parent.rsplit('.').next().unwrap_or(parent);
            out.push(format!(
                "pub trait {}: {} {{",
                name,
                to_pascal_case(parent_short)
            ));
        }
        None => out.push(format!("pub trait {} {{", name)),
    }

    for func in functions {
        doc_lines(out, &func.doc, "    ");
        let args: Vec<String> = func
            .args
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    escape_rust_keyword(&to_snake_case(&f.name)),
                    field_type(tree, f)
                )
            })
            .collect();
        let fn_name = escape_rust_keyword(&to_snake_case(&func.name));
        let mut params = vec!["&mut self".to_string()];
        params.extend(args);
        if func.oneway {
            out.push(format!("    fn {}({});", fn_name, params.join(", ")));
        } else {
            let ret = rust_type(tree, func.returns);
            out.push(format!(
                "    fn {}({}) -> Result<{}, Box<dyn std::error::Error>>;",
                fn_name,
                params.join(", "),
                ret
            ));
        }
    }
    out.push("}".to_string());
    out.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parse_source;
    use crate::fingerprint::fingerprint_program;

    fn gen(src: &str) -> String {
        let (mut tree, pid) = parse_source("test", src).expect("parse failed");
        fingerprint_program(&mut tree, pid);
        generate_program(&tree, pid, &GeneratorOptions::default())
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(to_pascal_case("what_op"), "WhatOp");
        assert_eq!(to_pascal_case("ACTIVE"), "Active");
        assert_eq!(to_pascal_case("NotFound"), "NotFound");
        assert_eq!(to_pascal_case("invalidOperation"), "InvalidOperation");
        assert_eq!(to_snake_case("sessionID"), "session_id");
        assert_eq!(to_snake_case("whatOp"), "what_op");
        assert_eq!(to_snake_case("num1"), "num1");
    }

    #[test]
    fn test_keyword_escaping_covers_2021_edition() {
        assert_eq!(escape_rust_keyword("type"), "type_");
        assert_eq!(escape_rust_keyword("async"), "async_");
        assert_eq!(escape_rust_keyword("await"), "await_");
        assert_eq!(escape_rust_keyword("dyn"), "dyn_");
        assert_eq!(escape_rust_keyword("union"), "union_");
        assert_eq!(escape_rust_keyword("try"), "try_");
        assert_eq!(escape_rust_keyword("value"), "value");
    }

    #[test]
    fn test_struct_fields_map_to_rust_types() {
        let code = gen("struct User { 1: required i64 id, 2: optional string name, 3: list<i32> scores }");
        assert!(code.contains("pub struct User {"));
        assert!(code.contains("pub id: i64,"));
        assert!(code.contains("pub name: Option<String>,"));
        assert!(code.contains("pub scores: Vec<i32>,"));
    }

    #[test]
    fn test_enum_discriminants() {
        let code = gen("enum Status { ACTIVE = 1, BANNED }");
        assert!(code.contains("pub enum Status {"));
        assert!(code.contains("Active = 1,"));
        assert!(code.contains("Banned = 2,"));
    }

    #[test]
    fn test_scalar_constants() {
        let code = gen("const i32 LIMIT = 100\nconst string GREETING = \"hi\"\nconst bool ON = 1");
        assert!(code.contains("pub const LIMIT: i32 = 100;"));
        assert!(code.contains("pub const GREETING: &str = \"hi\";"));
        assert!(code.contains("pub const ON: bool = true;"));
    }

    #[test]
    fn test_exception_implements_error() {
        let code = gen("exception NotFound { 1: string message }");
        assert!(code.contains("pub struct NotFound {"));
        assert!(code.contains("impl std::error::Error for NotFound {}"));
    }

    #[test]
    fn test_service_trait() {
        let code = gen(
            "exception E { 1: string m }\n\
             service Store { i32 get(1: string key) throws (1: E e), oneway void ping() }",
        );
        assert!(code.contains("pub trait Store {"));
        assert!(code
            .contains("fn get(&mut self, key: String) -> Result<i32, Box<dyn std::error::Error>>;"));
        assert!(code.contains("fn ping(&mut self);"));
    }

    #[test]
    fn test_extends_becomes_supertrait() {
        let code = gen("service Base { void ping() }\nservice Derived extends Base { void pong() }");
        assert!(code.contains("pub trait Derived: Base {"));
    }

    #[test]
    fn test_extra_derives_option() {
        let (name, options) = GeneratorOptions::parse_spec("rust:derive=Eq");
        assert_eq!(name, "rust");
        let (tree, pid) = parse_source("test", "struct S { 1: i32 a }").unwrap();
        let code = generate_program(&tree, pid, &options);
        assert!(code.contains("Serialize, Eq)]"));
    }
}
