//! The program tree: every entity a schema file can declare, held in a
//! single arena so that mutually recursive types are plain index links.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConstId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramId(pub usize);

/// Builtin base types occupy fixed arena slots, allocated by `Tree::new`.
pub const VOID:   TypeId = TypeId(0);
pub const STRING: TypeId = TypeId(1);
pub const BINARY: TypeId = TypeId(2);
pub const SLIST:  TypeId = TypeId(3);
pub const BOOL:   TypeId = TypeId(4);
pub const BYTE:   TypeId = TypeId(5);
pub const I16:    TypeId = TypeId(6);
pub const I32:    TypeId = TypeId(7);
pub const I64:    TypeId = TypeId(8);
pub const DOUBLE: TypeId = TypeId(9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseType {
    Void,
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String { binary: bool, slist: bool },
}

impl BaseType {
    /// Fixed keyword used in structural signatures and rendered schemas.
    pub fn keyword(&self) -> &'static str {
        match self {
            BaseType::Void   => "void",
            BaseType::Bool   => "bool",
            BaseType::Byte   => "byte",
            BaseType::I16    => "i16",
            BaseType::I32    => "i32",
            BaseType::I64    => "i64",
            BaseType::Double => "double",
            BaseType::String { binary: true, .. } => "binary",
            BaseType::String { slist: true, .. }  => "slist",
            BaseType::String { .. } => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Requiredness {
    Required,
    Optional,
    /// The default: serialize the field if present, tolerate absence on read.
    OptInReqOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstValue {
    Integer(i64),
    Double(f64),
    Str(String),
    /// An unresolved reference to an enum constant or another const.
    Identifier(String),
    List(Vec<ConstValue>),
    Map(Vec<(ConstValue, ConstValue)>),
}

impl ConstValue {
    /// Short form name used in type-mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstValue::Integer(_)    => "integer",
            ConstValue::Double(_)     => "double",
            ConstValue::Str(_)        => "string",
            ConstValue::Identifier(_) => "identifier",
            ConstValue::List(_)       => "list",
            ConstValue::Map(_)        => "map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key:     i32,
    pub name:    String,
    pub ty:      TypeId,
    pub req:     Requiredness,
    pub default: Option<ConstValue>,
    pub doc:     Option<String>,
    pub line:    usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumValue {
    pub name:  String,
    pub value: i32,
    pub doc:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name:    String,
    pub returns: TypeId,
    pub args:    Vec<Field>,
    pub throws:  Vec<Field>,
    pub oneway:  bool,
    pub doc:     Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeKind {
    Base(BaseType),
    Typedef { target: TypeId },
    Enum { values: Vec<EnumValue> },
    Struct { fields: Vec<Field> },
    Exception { fields: Vec<Field> },
    List { elem: TypeId },
    Set { elem: TypeId },
    Map { key: TypeId, value: TypeId },
    Service {
        extends:   Option<String>,
        functions: Vec<Function>,
    },
    /// Forward-reference placeholder; patched in place when the definition
    /// arrives, fatal if still present at end of file.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Type {
    pub name:        String,
    pub program:     Option<ProgramId>,
    pub doc:         Option<String>,
    pub line:        usize,
    pub fingerprint: Option<String>,
    pub kind:        TypeKind,
}

impl Type {
    pub fn is_base(&self) -> bool {
        matches!(self.kind, TypeKind::Base(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Base(BaseType::Void))
    }

    pub fn is_typedef(&self) -> bool {
        matches!(self.kind, TypeKind::Typedef { .. })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. })
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.kind, TypeKind::Exception { .. })
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::List { .. } | TypeKind::Set { .. } | TypeKind::Map { .. }
        )
    }

    pub fn is_service(&self) -> bool {
        matches!(self.kind, TypeKind::Service { .. })
    }

    /// Members of a struct or exception.
    pub fn fields(&self) -> Option<&[Field]> {
        match &self.kind {
            TypeKind::Struct { fields } | TypeKind::Exception { fields } => Some(fields),
            _ => None,
        }
    }
}

/// Name resolution table owned by a Program. Short names for the program's
/// own declarations, dotted names for entities imported from includes.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Scope {
    types:     HashMap<String, TypeId>,
    constants: HashMap<String, ConstId>,
}

impl Scope {
    pub fn insert_type(&mut self, name: &str, id: TypeId) -> Option<TypeId> {
        self.types.insert(name.to_string(), id)
    }

    pub fn insert_constant(&mut self, name: &str, id: ConstId) -> Option<ConstId> {
        self.constants.insert(name.to_string(), id)
    }

    pub fn get_type(&self, name: &str) -> Option<TypeId> {
        self.types.get(name).copied()
    }

    pub fn get_constant(&self, name: &str) -> Option<ConstId> {
        self.constants.get(name).copied()
    }

    pub fn type_entries(&self) -> impl Iterator<Item = (&String, TypeId)> {
        self.types.iter().map(|(k, v)| (k, *v))
    }

    pub fn constant_entries(&self) -> impl Iterator<Item = (&String, ConstId)> {
        self.constants.iter().map(|(k, v)| (k, *v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub name:    String,
    pub ty:      TypeId,
    pub value:   ConstValue,
    pub doc:     Option<String>,
    pub program: ProgramId,
    pub line:    usize,
}

/// A single schema source file and everything it declared.
#[derive(Debug, Serialize)]
pub struct Program {
    pub path:           PathBuf,
    pub name:           String,
    pub out_path:       PathBuf,
    pub include_prefix: Option<String>,
    pub doc:            Option<String>,
    pub namespaces:     BTreeMap<String, String>,
    pub cpp_includes:   Vec<String>,
    pub includes:       Vec<ProgramId>,
    pub typedefs:       Vec<TypeId>,
    pub enums:          Vec<TypeId>,
    pub constants:      Vec<ConstId>,
    pub structs:        Vec<TypeId>,
    pub exceptions:     Vec<TypeId>,
    pub services:       Vec<TypeId>,
    pub scope:          Scope,
}

impl Program {
    pub fn new(path: PathBuf, name: String) -> Self {
        Program {
            path,
            name,
            out_path:       PathBuf::from("."),
            include_prefix: None,
            doc:            None,
            namespaces:     BTreeMap::new(),
            cpp_includes:   Vec::new(),
            includes:       Vec::new(),
            typedefs:       Vec::new(),
            enums:          Vec::new(),
            constants:      Vec::new(),
            structs:        Vec::new(),
            exceptions:     Vec::new(),
            services:       Vec::new(),
            scope:          Scope::default(),
        }
    }

    pub fn namespace(&self, lang: &str) -> Option<&str> {
        self.namespaces.get(lang).map(|s| s.as_str())
    }
}

/// Arena for the whole compilation. The root program transitively owns every
/// reachable program; cross-program type references are plain ids resolved
/// through scopes, never ownership.
#[derive(Debug, Serialize)]
pub struct Tree {
    pub programs:  Vec<Program>,
    pub types:     Vec<Type>,
    pub constants: Vec<Constant>,
}

impl Tree {
    pub fn new() -> Self {
        let mut tree = Tree {
            programs:  Vec::new(),
            types:     Vec::new(),
            constants: Vec::new(),
        };

        // Order must match the fixed TypeId constants above.
        let builtins = [
            ("void",   BaseType::Void),
            ("string", BaseType::String { binary: false, slist: false }),
            ("binary", BaseType::String { binary: true, slist: false }),
            ("slist",  BaseType::String { binary: false, slist: true }),
            ("bool",   BaseType::Bool),
            ("byte",   BaseType::Byte),
            ("i16",    BaseType::I16),
            ("i32",    BaseType::I32),
            ("i64",    BaseType::I64),
            ("double", BaseType::Double),
        ];
        for (name, base) in builtins {
            tree.types.push(Type {
                name:        name.to_string(),
                program:     None,
                doc:         None,
                line:        0,
                fingerprint: None,
                kind:        TypeKind::Base(base),
            });
        }
        tree
    }

    pub fn alloc_type(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(ty);
        id
    }

    pub fn alloc_constant(&mut self, c: Constant) -> ConstId {
        let id = ConstId(self.constants.len());
        self.constants.push(c);
        id
    }

    pub fn alloc_program(&mut self, p: Program) -> ProgramId {
        let id = ProgramId(self.programs.len());
        self.programs.push(p);
        id
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0]
    }

    pub fn constant(&self, id: ConstId) -> &Constant {
        &self.constants[id.0]
    }

    pub fn program(&self, id: ProgramId) -> &Program {
        &self.programs[id.0]
    }

    pub fn program_mut(&mut self, id: ProgramId) -> &mut Program {
        &mut self.programs[id.0]
    }

    /// Follows typedef chains to the underlying type.
    pub fn true_type(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        loop {
            match self.ty(cur).kind {
                TypeKind::Typedef { target } => cur = target,
                _ => return cur,
            }
        }
    }

    /// Resolves a name against a program's scope; for dotted names, also
    /// tries the named include's scope.
    pub fn resolve_type(&self, pid: ProgramId, name: &str) -> Option<TypeId> {
        let program = self.program(pid);
        if let Some(id) = program.scope.get_type(name) {
            return Some(id);
        }
        if let Some((head, tail)) = name.split_once('.') {
            for inc in &program.includes {
                if self.program(*inc).name == head {
                    return self.program(*inc).scope.get_type(tail);
                }
            }
        }
        None
    }

    /// Copies the entries `child` declared itself into `parent` under
    /// "childName." so re-included programs stay resolvable. Dotted entries
    /// the child imported from its own includes do not travel further.
    pub fn import_scope(&mut self, parent: ProgramId, child: ProgramId) {
        let prefix = format!("{}.", self.program(child).name);
        let types: Vec<(String, TypeId)> = self
            .program(child)
            .scope
            .type_entries()
            .filter(|(n, _)| !n.contains('.'))
            .map(|(n, id)| (format!("{}{}", prefix, n), id))
            .collect();
        let consts: Vec<(String, ConstId)> = self
            .program(child)
            .scope
            .constant_entries()
            .filter(|(n, _)| !n.contains('.'))
            .map(|(n, id)| (format!("{}{}", prefix, n), id))
            .collect();
        let scope = &mut self.program_mut(parent).scope;
        for (name, id) in types {
            scope.insert_type(&name, id);
        }
        for (name, id) in consts {
            scope.insert_constant(&name, id);
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_slots() {
        let tree = Tree::new();
        assert_eq!(tree.ty(VOID).name, "void");
        assert!(tree.ty(VOID).is_void());
        assert_eq!(tree.ty(I32).name, "i32");
        assert_eq!(
            tree.ty(BINARY).kind,
            TypeKind::Base(BaseType::String { binary: true, slist: false })
        );
        assert_eq!(tree.ty(DOUBLE).kind, TypeKind::Base(BaseType::Double));
    }

    #[test]
    fn test_true_type_follows_typedef_chain() {
        let mut tree = Tree::new();
        let a = tree.alloc_type(Type {
            name:        "A".to_string(),
            program:     None,
            doc:         None,
            line:        1,
            fingerprint: None,
            kind:        TypeKind::Typedef { target: I64 },
        });
        let b = tree.alloc_type(Type {
            name:        "B".to_string(),
            program:     None,
            doc:         None,
            line:        2,
            fingerprint: None,
            kind:        TypeKind::Typedef { target: a },
        });
        assert_eq!(tree.true_type(b), I64);
    }

    #[test]
    fn test_scope_import_prefixes_names() {
        let mut tree = Tree::new();
        let child = tree.alloc_program(Program::new(PathBuf::from("b.idl"), "b".into()));
        let parent = tree.alloc_program(Program::new(PathBuf::from("a.idl"), "a".into()));
        let t = tree.alloc_type(Type {
            name:        "T".to_string(),
            program:     Some(child),
            doc:         None,
            line:        1,
            fingerprint: None,
            kind:        TypeKind::Struct { fields: vec![] },
        });
        tree.program_mut(child).scope.insert_type("T", t);
        tree.import_scope(parent, child);
        assert_eq!(tree.program(parent).scope.get_type("b.T"), Some(t));
        assert_eq!(tree.program(parent).scope.get_type("T"), None);
    }
}
