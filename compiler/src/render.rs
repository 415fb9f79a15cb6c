//! Prints a parsed program back out as canonical schema syntax. Used for
//! `-debug` dumps; also handy because a rendered program re-parses to an
//! equivalent tree.

use crate::types::{
    ConstValue, Field, Function, ProgramId, Requiredness, Tree, TypeId, TypeKind,
};
use crate::utils::quote;

/// Canonical spelling of a type at a use site. Types imported from another
/// program are qualified with that program's name.
pub fn type_name(tree: &Tree, pid: ProgramId, id: TypeId) -> String {
    let ty = tree.ty(id);
    match &ty.kind {
        TypeKind::Base(base) => base.keyword().to_string(),
        TypeKind::List { elem } => format!("list<{}>", type_name(tree, pid, *elem)),
        TypeKind::Set { elem } => format!("set<{}>", type_name(tree, pid, *elem)),
        TypeKind::Map { key, value } => format!(
            "map<{}, {}>",
            type_name(tree, pid, *key),
            type_name(tree, pid, *value)
        ),
        _ => match ty.program {
            Some(owner) if owner != pid => {
                format!("{}.{}", tree.program(owner).name, ty.name)
            }
            _ => ty.name.clone(),
        },
    }
}

pub fn render_const_value(value: &ConstValue) -> String {
    match value {
        ConstValue::Integer(v) => v.to_string(),
        ConstValue::Double(v) => {
            // Keep a decimal point so the literal re-lexes as a double.
            if v.fract() == 0.0 && v.is_finite() {
                format!("{:.1}", v)
            } else {
                v.to_string()
            }
        }
        ConstValue::Str(s) => quote(s),
        ConstValue::Identifier(s) => s.clone(),
        ConstValue::List(items) => {
            let parts: Vec<String> = items.iter().map(render_const_value).collect();
            format!("[{}]", parts.join(", "))
        }
        ConstValue::Map(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render_const_value(k), render_const_value(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

/// Emits a doc string back out as the doc-comment block it was cleaned
/// from; re-cleaning the result yields the same doc string.
fn render_doc(out: &mut String, doc: &Option<String>, indent: &str) {
    if let Some(doc) = doc {
        out.push_str(indent);
        out.push_str("/**\n");
        for line in doc.lines() {
            if line.is_empty() {
                out.push_str(&format!("{} *\n", indent));
            } else {
                out.push_str(&format!("{} * {}\n", indent, line));
            }
        }
        out.push_str(&format!("{} */\n", indent));
    }
}

fn render_field(tree: &Tree, pid: ProgramId, field: &Field) -> String {
    let req = match field.req {
        Requiredness::Required    => "required ",
        Requiredness::Optional    => "optional ",
        Requiredness::OptInReqOut => "",
    };
    let mut out = format!(
        "{}: {}{} {}",
        field.key,
        req,
        type_name(tree, pid, field.ty),
        field.name
    );
    if let Some(default) = &field.default {
        out.push_str(&format!(" = {}", render_const_value(default)));
    }
    out
}

fn render_function(tree: &Tree, pid: ProgramId, func: &Function) -> String {
    let oneway = if func.oneway { "oneway " } else { "" };
    let returns = if tree.ty(func.returns).is_void() {
        "void".to_string()
    } else {
        type_name(tree, pid, func.returns)
    };
    let args: Vec<String> = func
        .args
        .iter()
        .map(|f| render_field(tree, pid, f))
        .collect();
    let mut out = format!("  {}{} {}({})", oneway, returns, func.name, args.join(", "));
    if !func.throws.is_empty() {
        let throws: Vec<String> = func
            .throws
            .iter()
            .map(|f| render_field(tree, pid, f))
            .collect();
        out.push_str(&format!(" throws ({})", throws.join(", ")));
    }
    out.push(';');
    out
}

pub fn render_program(tree: &Tree, pid: ProgramId) -> String {
    let program = tree.program(pid);
    let mut out = String::new();

    // A program doc only exists when a header captured it, so a rendered
    // header always follows and re-attaches it on the next parse.
    render_doc(&mut out, &program.doc, "");
    for (lang, name) in &program.namespaces {
        out.push_str(&format!("namespace {} {}\n", lang, name));
    }
    for inc in &program.cpp_includes {
        out.push_str(&format!("cpp_include {}\n", quote(inc)));
    }
    for inc in &program.includes {
        let path = &tree.program(*inc).path;
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push_str(&format!("include {}\n", quote(&file)));
    }
    if !out.is_empty() {
        out.push('\n');
    }

    for id in &program.typedefs {
        let ty = tree.ty(*id);
        if let TypeKind::Typedef { target } = &ty.kind {
            render_doc(&mut out, &ty.doc, "");
            out.push_str(&format!(
                "typedef {} {}\n",
                type_name(tree, pid, *target),
                ty.name
            ));
        }
    }

    for id in &program.enums {
        let ty = tree.ty(*id);
        if let TypeKind::Enum { values } = &ty.kind {
            render_doc(&mut out, &ty.doc, "");
            out.push_str(&format!("enum {} {{\n", ty.name));
            for v in values {
                render_doc(&mut out, &v.doc, "  ");
                out.push_str(&format!("  {} = {},\n", v.name, v.value));
            }
            out.push_str("}\n");
        }
    }

    for cid in &program.constants {
        let c = tree.constant(*cid);
        render_doc(&mut out, &c.doc, "");
        out.push_str(&format!(
            "const {} {} = {}\n",
            type_name(tree, pid, c.ty),
            c.name,
            render_const_value(&c.value)
        ));
    }

    for (keyword, ids) in [("struct", &program.structs), ("exception", &program.exceptions)] {
        for id in ids {
            let ty = tree.ty(*id);
            if let Some(fields) = ty.fields() {
                render_doc(&mut out, &ty.doc, "");
                out.push_str(&format!("{} {} {{\n", keyword, ty.name));
                for field in fields {
                    render_doc(&mut out, &field.doc, "  ");
                    out.push_str(&format!("  {};\n", render_field(tree, pid, field)));
                }
                out.push_str("}\n");
            }
        }
    }

    for id in &program.services {
        let ty = tree.ty(*id);
        if let TypeKind::Service { extends, functions } = &ty.kind {
            render_doc(&mut out, &ty.doc, "");
            match extends {
                Some(parent) => {
                    out.push_str(&format!("service {} extends {} {{\n", ty.name, parent))
                }
                None => out.push_str(&format!("service {} {{\n", ty.name)),
            }
            for func in functions {
                render_doc(&mut out, &func.doc, "  ");
                out.push_str(&render_function(tree, pid, func));
                out.push('\n');
            }
            out.push_str("}\n");
        }
    }

    out
}
