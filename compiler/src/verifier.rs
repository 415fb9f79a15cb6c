use crate::error::IdlError;
use crate::types::{BaseType, ConstValue, ProgramId, Tree, TypeId, TypeKind};
use crate::utils::quote;

/// Walks every constant and every field default of a program and checks the
/// parsed value against the declared type. Also resolves service `extends`
/// references and checks `throws` clauses only name exceptions.
pub fn verify_program(tree: &Tree, pid: ProgramId) -> Result<(), IdlError> {
    let program = tree.program(pid);

    // 1) Standalone constants
    for cid in &program.constants {
        let c = tree.constant(*cid);
        validate_const(tree, &c.name, c.ty, &c.value)?;
    }

    // 2) Struct and exception field defaults
    for id in program.structs.iter().chain(program.exceptions.iter()) {
        if let Some(fields) = tree.ty(*id).fields() {
            for field in fields {
                if let Some(default) = &field.default {
                    validate_const(tree, &field.name, field.ty, default)?;
                }
            }
        }
    }

    // 3) Services: parent resolution, argument defaults, throws clauses
    for id in &program.services {
        let service = tree.ty(*id);
        if let TypeKind::Service { extends, functions } = &service.kind {
            if let Some(parent) = extends {
                match tree.resolve_type(pid, parent) {
                    Some(p) if tree.ty(p).is_service() => {}
                    Some(_) => {
                        return Err(IdlError::Type(format!(
                            "service {} extends {}, which is not a service",
                            quote(&service.name),
                            quote(parent)
                        )))
                    }
                    None => {
                        return Err(IdlError::Unresolved {
                            name: parent.clone(),
                            path: program.path.clone(),
                            line: service.line,
                        })
                    }
                }
            }
            for func in functions {
                for arg in &func.args {
                    if let Some(default) = &arg.default {
                        validate_const(tree, &arg.name, arg.ty, default)?;
                    }
                }
                for throw in &func.throws {
                    let tt = tree.true_type(throw.ty);
                    if !tree.ty(tt).is_exception() {
                        return Err(IdlError::Type(format!(
                            "function {} throws {}, which is not an exception",
                            quote(&func.name),
                            quote(&tree.ty(tt).name)
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Recursive type check of a parsed value against a declared type. `name`
/// accumulates the breadcrumb path used in error messages, e.g.
/// `outer.inner<elem>`.
pub fn validate_const(
    tree: &Tree,
    name: &str,
    ty: TypeId,
    value: &ConstValue,
) -> Result<(), IdlError> {
    let tid = tree.true_type(ty);
    let t = tree.ty(tid);

    match &t.kind {
        TypeKind::Base(base) => match base {
            BaseType::Void => Err(IdlError::Type(format!(
                "cannot declare a void const: {}",
                name
            ))),
            BaseType::String { .. } => match value {
                ConstValue::Str(_) => Ok(()),
                _ => Err(declared_as(name, "string")),
            },
            BaseType::Bool => expect_integer(name, "bool", value),
            BaseType::Byte => expect_integer(name, "byte", value),
            BaseType::I16 => expect_integer(name, "i16", value),
            BaseType::I32 => expect_integer(name, "i32", value),
            BaseType::I64 => expect_integer(name, "i64", value),
            BaseType::Double => match value {
                ConstValue::Integer(_) | ConstValue::Double(_) => Ok(()),
                _ => Err(declared_as(name, "double")),
            },
        },
        TypeKind::Enum { .. } => expect_integer(name, "enum", value),
        TypeKind::Struct { fields } | TypeKind::Exception { fields } => {
            let entries = match value {
                ConstValue::Map(entries) => entries,
                _ => return Err(declared_as(name, "struct/exception")),
            };
            for (key, val) in entries {
                let key_name = match key {
                    ConstValue::Str(s) => s,
                    _ => {
                        return Err(IdlError::Type(format!(
                            "{} struct key must be string",
                            name
                        )))
                    }
                };
                let field = fields.iter().find(|f| &f.name == key_name).ok_or_else(|| {
                    IdlError::Type(format!("{} has no field {}", t.name, key_name))
                })?;
                validate_const(tree, &format!("{}.{}", name, key_name), field.ty, val)?;
            }
            Ok(())
        }
        TypeKind::Map { key, value: val_ty } => {
            let entries = match value {
                ConstValue::Map(entries) => entries,
                _ => return Err(declared_as(name, "map")),
            };
            for (k, v) in entries {
                validate_const(tree, &format!("{}<key>", name), *key, k)?;
                validate_const(tree, &format!("{}<val>", name), *val_ty, v)?;
            }
            Ok(())
        }
        TypeKind::List { elem } | TypeKind::Set { elem } => {
            let items = match value {
                ConstValue::List(items) => items,
                _ => {
                    let declared = if matches!(t.kind, TypeKind::Set { .. }) {
                        "set"
                    } else {
                        "list"
                    };
                    return Err(declared_as(name, declared));
                }
            };
            for item in items {
                validate_const(tree, &format!("{}<elem>", name), *elem, item)?;
            }
            Ok(())
        }
        TypeKind::Service { .. } => Err(IdlError::Internal(format!(
            "no const of type service: {}",
            name
        ))),
        TypeKind::Typedef { .. } | TypeKind::Unresolved => Err(IdlError::Internal(format!(
            "unhandled type for const {}",
            name
        ))),
    }
}

fn expect_integer(name: &str, declared: &str, value: &ConstValue) -> Result<(), IdlError> {
    match value {
        ConstValue::Integer(_) => Ok(()),
        _ => Err(declared_as(name, declared)),
    }
}

fn declared_as(name: &str, declared: &str) -> IdlError {
    IdlError::Type(format!(
        "const {} was declared as {}",
        quote(name),
        declared
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parse_source;

    fn verify(src: &str) -> Result<(), IdlError> {
        let (tree, pid) = parse_source("test", src).expect("parse failed");
        verify_program(&tree, pid)
    }

    #[test]
    fn test_primitive_const_accepted() {
        assert!(verify("const i32 X = 42").is_ok());
        assert!(verify("const double D = 3").is_ok());
        assert!(verify("const string S = \"hi\"").is_ok());
    }

    #[test]
    fn test_int_const_type_mismatch() {
        let err = verify("const i32 X = \"hi\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: const \"X\" was declared as i32"
        );
    }

    #[test]
    fn test_double_rejects_string() {
        let err = verify("const double D = \"no\"").unwrap_err();
        assert!(err.to_string().contains("was declared as double"));
    }

    #[test]
    fn test_enum_const_takes_integer() {
        let src = "enum Color { RED, GREEN }\nconst Color C = 1";
        assert!(verify(src).is_ok());
        let bad = "enum Color { RED }\nconst Color C = \"RED\"";
        assert!(verify(bad).is_err());
    }

    #[test]
    fn test_struct_const_checks_field_names() {
        let ok = "struct P { 1: i32 x, 2: string label }\nconst P ORIGIN = {\"x\": 0, \"label\": \"o\"}";
        assert!(verify(ok).is_ok());

        let unknown = "struct P { 1: i32 x }\nconst P BAD = {\"y\": 1}";
        let err = verify(unknown).unwrap_err();
        assert_eq!(err.to_string(), "type error: P has no field y");

        let bad_key = "struct P { 1: i32 x }\nconst P BAD = {1: 2}";
        let err = verify(bad_key).unwrap_err();
        assert!(err.to_string().contains("struct key must be string"));
    }

    #[test]
    fn test_nested_path_in_message() {
        let src = "struct Inner { 1: i32 n }\nstruct Outer { 1: Inner inner }\n\
                   const Outer O = {\"inner\": {\"n\": \"oops\"}}";
        let err = verify(src).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: const \"O.inner.n\" was declared as i32"
        );
    }

    #[test]
    fn test_container_consts() {
        assert!(verify("const list<i32> L = [1, 2, 3]").is_ok());
        assert!(verify("const map<string, i32> M = {\"a\": 1}").is_ok());

        let err = verify("const list<i32> L = [1, \"x\"]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: const \"L<elem>\" was declared as i32"
        );

        let err = verify("const map<i32, i32> M = {\"a\": 1}").unwrap_err();
        assert!(err.to_string().contains("M<key>"));
    }

    #[test]
    fn test_field_default_validated() {
        assert!(verify("struct S { 1: i32 a = 5 }").is_ok());
        let err = verify("struct S { 1: i32 a = \"x\" }").unwrap_err();
        assert!(err.to_string().contains("was declared as i32"));
    }

    #[test]
    fn test_typedef_follows_to_target() {
        assert!(verify("typedef i64 UserId\nconst UserId U = 7").is_ok());
        assert!(verify("typedef i64 UserId\nconst UserId U = \"x\"").is_err());
    }

    #[test]
    fn test_throws_must_be_exception() {
        let ok = "exception E { 1: string why }\nservice S { void f() throws (1: E e) }";
        assert!(verify(ok).is_ok());
        let bad = "struct NotE { 1: string why }\nservice S { void f() throws (1: NotE e) }";
        let err = verify(bad).unwrap_err();
        assert!(err.to_string().contains("not an exception"));
    }

    #[test]
    fn test_extends_must_name_service() {
        let ok = "service Base { void ping() }\nservice Derived extends Base { void pong() }";
        assert!(verify(ok).is_ok());
        let missing = "service Derived extends Nowhere { void pong() }";
        assert!(verify(missing).is_err());
        let not_service = "struct Base {}\nservice D extends Base { void f() }";
        let err = verify(not_service).unwrap_err();
        assert!(err.to_string().contains("not a service"));
    }
}
