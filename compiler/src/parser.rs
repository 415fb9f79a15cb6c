use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::compiler::{include_file, pwarning};
use crate::error::IdlError;
use crate::tokenizer::{Token, TokenKind};
use crate::types::{
    ConstValue, Constant, EnumValue, Field, Function, ProgramId, Requiredness, Tree, Type,
    TypeId, TypeKind, BINARY, BOOL, BYTE, DOUBLE, I16, I32, I64, SLIST, STRING, VOID,
};
use crate::utils::quote;

/// The two sequential parses of a source file. The same grammar drives both;
/// the mode decides which productions take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Includes,
    Types,
}

pub const KEYWORDS: &[&str] = &[
    "include", "cpp_include", "namespace", "void", "bool", "byte", "i16", "i32", "i64",
    "double", "string", "binary", "slist", "typedef", "struct", "exception", "extends",
    "throws", "service", "enum", "senum", "const", "required", "optional", "oneway",
    "async", "list", "set", "map",
];

/// All state a single parse call needs. Threaded as a value, so nothing
/// about a parse outlives it and two calls can never interfere.
pub struct Parser<'a> {
    tree:          &'a mut Tree,
    tokens:        Vec<Token>,
    index:         usize,
    pass:          Pass,
    program:       ProgramId,
    parent:        Option<ProgramId>,
    path:          PathBuf,
    curdir:        PathBuf,
    include_dirs:  &'a [PathBuf],
    warn_level:    i8,
    pending_doc:   Option<String>,
    pending_line:  usize,
    placeholders:  HashMap<String, TypeId>,
    /// Resolved include paths collected during the include pass.
    pub includes_found: Vec<PathBuf>,
}

impl<'a> Parser<'a> {
    pub fn new(
        tree: &'a mut Tree,
        program: ProgramId,
        parent: Option<ProgramId>,
        pass: Pass,
        tokens: Vec<Token>,
        include_dirs: &'a [PathBuf],
        warn_level: i8,
    ) -> Self {
        let path = tree.program(program).path.clone();
        let curdir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Parser {
            tree,
            tokens,
            index: 0,
            pass,
            program,
            parent,
            path,
            curdir,
            include_dirs,
            warn_level,
            pending_doc: None,
            pending_line: 0,
            placeholders: HashMap::new(),
            includes_found: Vec::new(),
        }
    }

    // ---- token plumbing -------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        let i = (self.index + 1).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn bump(&mut self) -> Token {
        let tok = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        tok
    }

    fn parse_error(&self, msg: String) -> IdlError {
        IdlError::Parse {
            msg,
            path: self.path.clone(),
            line: self.current().line,
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.current().kind == TokenKind::Identifier && self.current().text == kw {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if self.current().kind == TokenKind::Symbol && self.current().text == sym {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), IdlError> {
        if self.eat_symbol(sym) {
            Ok(())
        } else {
            Err(self.parse_error(format!(
                "Expected {} but found {}",
                quote(sym),
                quote(&self.current().text)
            )))
        }
    }

    /// A definition or member name: an identifier that is neither a keyword
    /// nor dotted.
    fn expect_name(&mut self) -> Result<Token, IdlError> {
        let tok = self.current().clone();
        if tok.kind != TokenKind::Identifier
            || tok.text.contains('.')
            || KEYWORDS.contains(&tok.text.as_str())
        {
            return Err(self.parse_error(format!(
                "Expected identifier but found {}",
                quote(&tok.text)
            )));
        }
        self.bump();
        Ok(tok)
    }

    /// A type or service reference: possibly dotted, still not a keyword.
    fn expect_reference(&mut self) -> Result<Token, IdlError> {
        let tok = self.current().clone();
        if tok.kind != TokenKind::Identifier || KEYWORDS.contains(&tok.text.as_str()) {
            return Err(self.parse_error(format!(
                "Expected identifier but found {}",
                quote(&tok.text)
            )));
        }
        self.bump();
        Ok(tok)
    }

    fn expect_string(&mut self) -> Result<Token, IdlError> {
        let tok = self.current().clone();
        if tok.kind != TokenKind::StringLiteral {
            return Err(self.parse_error(format!(
                "Expected string literal but found {}",
                quote(&tok.text)
            )));
        }
        self.bump();
        Ok(tok)
    }

    /// The optional `,` or `;` the grammar tolerates after members and
    /// definitions.
    fn eat_separator(&mut self) {
        if !self.eat_symbol(",") {
            self.eat_symbol(";");
        }
    }

    fn parse_int(&self, tok: &Token) -> Result<i64, IdlError> {
        let (neg, rest) = match tok.text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, tok.text.strip_prefix('+').unwrap_or(&tok.text)),
        };
        let parsed = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16)
        } else {
            rest.parse::<i64>()
        };
        match parsed {
            Ok(v) => Ok(if neg { -v } else { v }),
            Err(_) => Err(self.parse_error(format!("Invalid integer {}", quote(&tok.text)))),
        }
    }

    // ---- doc comments ---------------------------------------------------

    /// Consumes any doc-comment tokens at the cursor into the pending slot.
    /// A pending doc that gets overwritten was never attached; that is worth
    /// a strict-mode warning.
    fn absorb_docs(&mut self) {
        while self.current().kind == TokenKind::DocComment {
            let tok = self.bump();
            if tok.text.is_empty() {
                continue;
            }
            if self.pending_doc.is_some() {
                self.warn(2, tok.line, &format!(
                    "Uncaptured doctext from line {}",
                    self.pending_line
                ));
            }
            self.pending_doc = Some(tok.text);
            self.pending_line = tok.line;
        }
    }

    fn take_doc(&mut self) -> Option<String> {
        self.pending_doc.take()
    }

    /// A doc comment followed by a header directive documents the Program.
    fn attach_program_doc(&mut self) {
        if let Some(doc) = self.pending_doc.take() {
            let program = self.tree.program_mut(self.program);
            if program.doc.is_none() {
                program.doc = Some(doc);
            }
        }
    }

    fn warn(&self, level: i8, line: usize, msg: &str) {
        pwarning(self.warn_level, level, &self.path, line, msg);
    }

    // ---- entry point ----------------------------------------------------

    pub fn parse(&mut self) -> Result<(), IdlError> {
        loop {
            self.absorb_docs();
            let tok = self.current().clone();
            if tok.kind == TokenKind::Eof {
                break;
            }
            if tok.kind != TokenKind::Identifier {
                return Err(self.parse_error(format!("Unexpected token {}", quote(&tok.text))));
            }
            match tok.text.as_str() {
                "include"     => self.parse_include()?,
                "cpp_include" => self.parse_cpp_include()?,
                "namespace"   => self.parse_namespace()?,
                "typedef"     => self.parse_typedef()?,
                "enum"        => self.parse_enum()?,
                "senum"       => self.parse_senum()?,
                "const"       => self.parse_const()?,
                "struct"      => self.parse_struct(false)?,
                "exception"   => self.parse_struct(true)?,
                "service"     => self.parse_service()?,
                _ => {
                    return Err(
                        self.parse_error(format!("Unexpected token {}", quote(&tok.text)))
                    )
                }
            }
        }

        if self.pending_doc.take().is_some() {
            let line = self.pending_line;
            self.warn(2, line, "Uncaptured doctext at end of file");
        }

        if self.pass == Pass::Types && !self.placeholders.is_empty() {
            let (name, id) = self
                .placeholders
                .iter()
                .min_by_key(|(_, id)| self.tree.ty(**id).line)
                .map(|(n, id)| (n.clone(), *id))
                .unwrap();
            return Err(IdlError::Unresolved {
                name,
                path: self.path.clone(),
                line: self.tree.ty(id).line,
            });
        }
        Ok(())
    }

    // ---- headers --------------------------------------------------------

    fn parse_include(&mut self) -> Result<(), IdlError> {
        let line = self.current().line;
        self.bump();
        let file = self.expect_string()?;
        if self.pass == Pass::Includes {
            debug!("[PARSE:{}] include {}", line, quote(&file.text));
            if let Some(found) = include_file(
                &file.text,
                &self.curdir,
                self.include_dirs,
                self.warn_level,
                &self.path,
                line,
            ) {
                self.includes_found.push(found);
            }
        }
        self.attach_program_doc();
        self.eat_separator();
        Ok(())
    }

    fn parse_cpp_include(&mut self) -> Result<(), IdlError> {
        self.bump();
        let file = self.expect_string()?;
        if self.pass == Pass::Includes {
            self.tree
                .program_mut(self.program)
                .cpp_includes
                .push(file.text);
        }
        self.attach_program_doc();
        self.eat_separator();
        Ok(())
    }

    fn parse_namespace(&mut self) -> Result<(), IdlError> {
        let line = self.current().line;
        self.bump();
        let lang = if self.eat_symbol("*") {
            "*".to_string()
        } else {
            self.expect_reference()?.text
        };
        let name = self.expect_reference()?.text;
        if self.pass == Pass::Includes {
            debug!("[PARSE:{}] namespace {} {}", line, lang, name);
            self.tree
                .program_mut(self.program)
                .namespaces
                .insert(lang, name);
        }
        self.attach_program_doc();
        self.eat_separator();
        Ok(())
    }

    // ---- definitions ----------------------------------------------------

    fn parse_typedef(&mut self) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let target = self.parse_field_type()?;
        let name = self.expect_name()?;
        self.eat_separator();
        if self.pass == Pass::Types {
            debug!("[PARSE:{}] typedef {}", line, name.text);
            self.define_type(&name.text, TypeKind::Typedef { target }, doc, line)?;
        }
        Ok(())
    }

    fn parse_enum(&mut self) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let name = self.expect_name()?;
        self.expect_symbol("{")?;

        let mut values: Vec<EnumValue> = Vec::new();
        let mut next_value: i32 = 0;
        loop {
            self.absorb_docs();
            if self.eat_symbol("}") {
                break;
            }
            let vdoc = self.take_doc();
            let vname = self.expect_name()?;
            let value = if self.eat_symbol("=") {
                let tok = self.current().clone();
                if tok.kind != TokenKind::IntLiteral {
                    return Err(self.parse_error(format!(
                        "Expected integer but found {}",
                        quote(&tok.text)
                    )));
                }
                self.bump();
                self.parse_int(&tok)? as i32
            } else {
                next_value
            };
            next_value = value + 1;
            values.push(EnumValue {
                name:  vname.text,
                value,
                doc:   vdoc,
            });
            self.eat_separator();
        }
        self.eat_separator();

        if self.pass == Pass::Types {
            debug!("[PARSE:{}] enum {}", line, name.text);
            self.define_type(&name.text, TypeKind::Enum { values }, doc, line)?;
        }
        Ok(())
    }

    fn parse_senum(&mut self) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let name = self.expect_name()?;
        if self.pass == Pass::Types {
            self.warn(1, line, &format!(
                "senum {} is deprecated; treated as a string list alias",
                quote(&name.text)
            ));
        }
        self.expect_symbol("{")?;
        loop {
            self.absorb_docs();
            if self.eat_symbol("}") {
                break;
            }
            self.expect_string()?;
            self.eat_separator();
        }
        self.eat_separator();
        if self.pass == Pass::Types {
            self.define_type(&name.text, TypeKind::Typedef { target: SLIST }, doc, line)?;
        }
        Ok(())
    }

    fn parse_const(&mut self) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let ty = self.parse_field_type()?;
        let name = self.expect_name()?;
        self.expect_symbol("=")?;
        let value = self.parse_const_value()?;
        self.eat_separator();

        if self.pass == Pass::Types {
            debug!("[PARSE:{}] const {}", line, name.text);
            if self
                .tree
                .program(self.program)
                .scope
                .get_constant(&name.text)
                .is_some()
            {
                return Err(self.parse_error(format!(
                    "Constant {} is already defined",
                    quote(&name.text)
                )));
            }
            let id = self.tree.alloc_constant(Constant {
                name:    name.text.clone(),
                ty,
                value,
                doc,
                program: self.program,
                line,
            });
            self.tree
                .program_mut(self.program)
                .scope
                .insert_constant(&name.text, id);
            if let Some(parent) = self.parent {
                let prefixed =
                    format!("{}.{}", self.tree.program(self.program).name, name.text);
                self.tree
                    .program_mut(parent)
                    .scope
                    .insert_constant(&prefixed, id);
            }
            self.tree.program_mut(self.program).constants.push(id);
        }
        Ok(())
    }

    fn parse_struct(&mut self, is_exception: bool) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let name = self.expect_name()?;
        self.expect_symbol("{")?;

        let mut fields: Vec<Field> = Vec::new();
        let mut next_auto: i32 = -1;
        loop {
            self.absorb_docs();
            if self.eat_symbol("}") {
                break;
            }
            let field = self.parse_field(&mut next_auto)?;
            if self.pass == Pass::Types {
                self.append_field(&mut fields, field)?;
            }
        }
        self.eat_separator();

        if self.pass == Pass::Types {
            debug!(
                "[PARSE:{}] {} {}",
                line,
                if is_exception { "exception" } else { "struct" },
                name.text
            );
            let kind = if is_exception {
                TypeKind::Exception { fields }
            } else {
                TypeKind::Struct { fields }
            };
            self.define_type(&name.text, kind, doc, line)?;
        }
        Ok(())
    }

    fn parse_service(&mut self) -> Result<(), IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;
        self.bump();
        let name = self.expect_name()?;
        let extends = if self.eat_keyword("extends") {
            Some(self.expect_reference()?.text)
        } else {
            None
        };
        self.expect_symbol("{")?;

        let mut functions: Vec<Function> = Vec::new();
        loop {
            self.absorb_docs();
            if self.eat_symbol("}") {
                break;
            }
            let func = self.parse_function()?;
            if self.pass == Pass::Types {
                if functions.iter().any(|f| f.name == func.name) {
                    return Err(self.parse_error(format!(
                        "Function {} already exists in service {}",
                        quote(&func.name),
                        quote(&name.text)
                    )));
                }
                functions.push(func);
            }
        }
        self.eat_separator();

        if self.pass == Pass::Types {
            debug!("[PARSE:{}] service {}", line, name.text);
            self.define_type(&name.text, TypeKind::Service { extends, functions }, doc, line)?;
        }
        Ok(())
    }

    fn parse_function(&mut self) -> Result<Function, IdlError> {
        let doc = self.take_doc();
        let oneway = self.eat_keyword("oneway") || self.eat_keyword("async");
        let returns = if self.eat_keyword("void") {
            VOID
        } else {
            self.parse_field_type()?
        };
        let name = self.expect_name()?;

        self.expect_symbol("(")?;
        let mut args: Vec<Field> = Vec::new();
        let mut next_auto: i32 = -1;
        loop {
            self.absorb_docs();
            if self.eat_symbol(")") {
                break;
            }
            let field = self.parse_field(&mut next_auto)?;
            if self.pass == Pass::Types {
                self.append_field(&mut args, field)?;
            }
        }

        let mut throws: Vec<Field> = Vec::new();
        if self.eat_keyword("throws") {
            self.expect_symbol("(")?;
            let mut throw_auto: i32 = -1;
            loop {
                self.absorb_docs();
                if self.eat_symbol(")") {
                    break;
                }
                let field = self.parse_field(&mut throw_auto)?;
                if self.pass == Pass::Types {
                    self.append_field(&mut throws, field)?;
                }
            }
        }
        self.eat_separator();

        Ok(Function {
            name: name.text,
            returns,
            args,
            throws,
            oneway,
            doc,
        })
    }

    /// One struct/exception member or function parameter. Fields without an
    /// explicit tag get successive negative tags starting at -1.
    fn parse_field(&mut self, next_auto: &mut i32) -> Result<Field, IdlError> {
        let doc = self.take_doc();
        let line = self.current().line;

        let key = if self.current().kind == TokenKind::IntLiteral
            && self.peek().kind == TokenKind::Symbol
            && self.peek().text == ":"
        {
            let tok = self.bump();
            self.bump(); // ':'
            let v = self.parse_int(&tok)?;
            v as i32
        } else {
            let v = *next_auto;
            *next_auto -= 1;
            v
        };

        let req = if self.eat_keyword("required") {
            Requiredness::Required
        } else if self.eat_keyword("optional") {
            Requiredness::Optional
        } else {
            Requiredness::OptInReqOut
        };

        let ty = self.parse_field_type()?;
        let name = self.expect_name()?;

        let default = if self.eat_symbol("=") {
            Some(self.parse_const_value()?)
        } else {
            None
        };
        self.eat_separator();

        Ok(Field {
            key,
            name: name.text,
            ty,
            req,
            default,
            doc,
            line,
        })
    }

    fn append_field(&mut self, fields: &mut Vec<Field>, field: Field) -> Result<(), IdlError> {
        if fields.iter().any(|f| f.key == field.key) {
            return Err(self.parse_error(format!(
                "Field id {} for {} has already been used",
                field.key,
                quote(&field.name)
            )));
        }
        if fields.iter().any(|f| f.name == field.name) {
            return Err(self.parse_error(format!(
                "Field {} already exists",
                quote(&field.name)
            )));
        }
        fields.push(field);
        Ok(())
    }

    // ---- types and values -----------------------------------------------

    fn parse_field_type(&mut self) -> Result<TypeId, IdlError> {
        let tok = self.current().clone();
        if tok.kind != TokenKind::Identifier {
            return Err(self.parse_error(format!(
                "Expected type but found {}",
                quote(&tok.text)
            )));
        }
        match tok.text.as_str() {
            "void" => Err(self.parse_error(
                "The void type is only valid as a function return".to_string(),
            )),
            "bool"   => { self.bump(); Ok(BOOL) }
            "byte"   => { self.bump(); Ok(BYTE) }
            "i16"    => { self.bump(); Ok(I16) }
            "i32"    => { self.bump(); Ok(I32) }
            "i64"    => { self.bump(); Ok(I64) }
            "double" => { self.bump(); Ok(DOUBLE) }
            "string" => { self.bump(); Ok(STRING) }
            "binary" => { self.bump(); Ok(BINARY) }
            "slist"  => { self.bump(); Ok(SLIST) }
            "list" => {
                self.bump();
                self.expect_symbol("<")?;
                let elem = self.parse_field_type()?;
                self.expect_symbol(">")?;
                self.alloc_container("list", TypeKind::List { elem }, tok.line)
            }
            "set" => {
                self.bump();
                self.expect_symbol("<")?;
                let elem = self.parse_field_type()?;
                self.expect_symbol(">")?;
                self.alloc_container("set", TypeKind::Set { elem }, tok.line)
            }
            "map" => {
                self.bump();
                self.expect_symbol("<")?;
                let key = self.parse_field_type()?;
                self.expect_symbol(",")?;
                let value = self.parse_field_type()?;
                self.expect_symbol(">")?;
                self.alloc_container("map", TypeKind::Map { key, value }, tok.line)
            }
            _ => {
                let name = self.expect_reference()?;
                if self.pass != Pass::Types {
                    return Ok(VOID);
                }
                self.resolve_or_placeholder(&name.text, name.line)
            }
        }
    }

    fn alloc_container(
        &mut self,
        name: &str,
        kind: TypeKind,
        line: usize,
    ) -> Result<TypeId, IdlError> {
        if self.pass != Pass::Types {
            return Ok(VOID);
        }
        Ok(self.tree.alloc_type(Type {
            name:        name.to_string(),
            program:     Some(self.program),
            doc:         None,
            line,
            fingerprint: None,
            kind,
        }))
    }

    /// Resolves a type reference through the scope chain; a plain name that
    /// is not (yet) in scope becomes a placeholder patched when the
    /// definition arrives. Dotted names must already resolve, since the
    /// included program was parsed before this pass began.
    fn resolve_or_placeholder(&mut self, name: &str, line: usize) -> Result<TypeId, IdlError> {
        if let Some(id) = self.tree.resolve_type(self.program, name) {
            return Ok(id);
        }
        if name.contains('.') {
            return Err(IdlError::Unresolved {
                name: name.to_string(),
                path: self.path.clone(),
                line,
            });
        }
        if let Some(&id) = self.placeholders.get(name) {
            return Ok(id);
        }
        let id = self.tree.alloc_type(Type {
            name:        name.to_string(),
            program:     Some(self.program),
            doc:         None,
            line,
            fingerprint: None,
            kind:        TypeKind::Unresolved,
        });
        self.placeholders.insert(name.to_string(), id);
        Ok(id)
    }

    fn parse_const_value(&mut self) -> Result<ConstValue, IdlError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.bump();
                Ok(ConstValue::Integer(self.parse_int(&tok)?))
            }
            TokenKind::DoubleLiteral => {
                self.bump();
                let v = tok.text.parse::<f64>().map_err(|_| {
                    self.parse_error(format!("Invalid double {}", quote(&tok.text)))
                })?;
                Ok(ConstValue::Double(v))
            }
            TokenKind::StringLiteral => {
                self.bump();
                Ok(ConstValue::Str(tok.text))
            }
            TokenKind::Identifier => {
                self.bump();
                Ok(ConstValue::Identifier(tok.text))
            }
            TokenKind::Symbol if tok.text == "[" => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    if self.eat_symbol("]") {
                        break;
                    }
                    items.push(self.parse_const_value()?);
                    self.eat_separator();
                }
                Ok(ConstValue::List(items))
            }
            TokenKind::Symbol if tok.text == "{" => {
                self.bump();
                let mut entries = Vec::new();
                loop {
                    if self.eat_symbol("}") {
                        break;
                    }
                    let key = self.parse_const_value()?;
                    self.expect_symbol(":")?;
                    let value = self.parse_const_value()?;
                    entries.push((key, value));
                    self.eat_separator();
                }
                Ok(ConstValue::Map(entries))
            }
            _ => Err(self.parse_error(format!(
                "Expected constant value but found {}",
                quote(&tok.text)
            ))),
        }
    }

    // ---- registration ---------------------------------------------------

    /// Allocates (or patches a placeholder for) a definition, registers it
    /// under its short name and, when a parent program is set, under
    /// "programName.shortName" in the parent's scope.
    fn define_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        doc: Option<String>,
        line: usize,
    ) -> Result<TypeId, IdlError> {
        if self.tree.program(self.program).scope.get_type(name).is_some() {
            return Err(self.parse_error(format!(
                "Type {} is already defined",
                quote(name)
            )));
        }

        let id = match self.placeholders.remove(name) {
            Some(id) => {
                let ty = self.tree.ty_mut(id);
                ty.kind = kind;
                ty.doc = doc;
                ty.line = line;
                id
            }
            None => self.tree.alloc_type(Type {
                name:        name.to_string(),
                program:     Some(self.program),
                doc,
                line,
                fingerprint: None,
                kind,
            }),
        };

        self.tree
            .program_mut(self.program)
            .scope
            .insert_type(name, id);
        if let Some(parent) = self.parent {
            let prefixed = format!("{}.{}", self.tree.program(self.program).name, name);
            self.tree
                .program_mut(parent)
                .scope
                .insert_type(&prefixed, id);
        }

        let is_typedef = self.tree.ty(id).is_typedef();
        let is_enum = self.tree.ty(id).is_enum();
        let is_struct = self.tree.ty(id).is_struct();
        let is_exception = self.tree.ty(id).is_exception();
        let is_service = self.tree.ty(id).is_service();
        let program = self.tree.program_mut(self.program);
        if is_typedef {
            program.typedefs.push(id);
        } else if is_enum {
            program.enums.push(id);
        } else if is_struct {
            program.structs.push(id);
        } else if is_exception {
            program.exceptions.push(id);
        } else if is_service {
            program.services.push(id);
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parse_source;
    use crate::types::{BaseType, ConstValue, Requiredness, TypeKind, I32, I64};

    #[test]
    fn test_auto_tags_are_negative_and_successive() {
        let (tree, pid) = parse_source("t", "struct S { i32 a, i32 b }").unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        let fields = tree.ty(s).fields().unwrap();
        assert_eq!(fields[0].key, -1);
        assert_eq!(fields[1].key, -2);
        assert_eq!(fields[0].req, Requiredness::OptInReqOut);
        assert_eq!(fields[1].req, Requiredness::OptInReqOut);
    }

    #[test]
    fn test_explicit_tags_preserved_verbatim() {
        let (tree, pid) =
            parse_source("t", "struct S { 5: i32 a, i32 b, 0: i32 c }").unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        let fields = tree.ty(s).fields().unwrap();
        assert_eq!(fields[0].key, 5);
        assert_eq!(fields[1].key, -1);
        assert_eq!(fields[2].key, 0);
    }

    #[test]
    fn test_duplicate_field_tag_rejected() {
        let err = parse_source("t", "struct S { 1: i32 a, 1: i32 b }").unwrap_err();
        assert!(err.to_string().contains("has already been used"));
    }

    #[test]
    fn test_duplicate_field_name_rejected() {
        let err = parse_source("t", "struct S { 1: i32 a, 2: i32 a }").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_explicit_and_auto_tag_collision_rejected() {
        // The auto counter hands out -1 first; an explicit -1 then collides.
        let err = parse_source("t", "struct S { i32 a, -1: i32 b }").unwrap_err();
        assert!(err.to_string().contains("has already been used"));
    }

    #[test]
    fn test_enum_values_auto_increment() {
        let (tree, pid) =
            parse_source("t", "enum E { A, B = 5, C }").unwrap();
        let e = tree.resolve_type(pid, "E").unwrap();
        match &tree.ty(e).kind {
            TypeKind::Enum { values } => {
                assert_eq!(values[0].value, 0);
                assert_eq!(values[1].value, 5);
                assert_eq!(values[2].value, 6);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_enum_accepted() {
        let (tree, pid) = parse_source("t", "enum E {}").unwrap();
        let e = tree.resolve_type(pid, "E").unwrap();
        match &tree.ty(e).kind {
            TypeKind::Enum { values } => assert!(values.is_empty()),
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_field_defaults_and_requiredness() {
        let (tree, pid) = parse_source(
            "t",
            "struct S { 1: required i32 a, 2: optional string b = \"x\", 3: i64 c = 0xFF }",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        let fields = tree.ty(s).fields().unwrap();
        assert_eq!(fields[0].req, Requiredness::Required);
        assert_eq!(fields[1].req, Requiredness::Optional);
        assert_eq!(fields[1].default, Some(ConstValue::Str("x".to_string())));
        assert_eq!(fields[2].default, Some(ConstValue::Integer(255)));
    }

    #[test]
    fn test_const_value_forms() {
        let (tree, pid) = parse_source(
            "t",
            "const i32 A = -3\n\
             const double B = 1.5\n\
             const string C = \"hey\"\n\
             const list<i32> D = [1, 2]\n\
             const map<string, i32> E = {\"k\": 9}",
        )
        .unwrap();
        let program = tree.program(pid);
        assert_eq!(program.constants.len(), 5);
        assert_eq!(tree.constant(program.constants[0]).value, ConstValue::Integer(-3));
        assert_eq!(tree.constant(program.constants[1]).value, ConstValue::Double(1.5));
        match &tree.constant(program.constants[3]).value {
            ConstValue::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
        match &tree.constant(program.constants[4]).value {
            ConstValue::Map(entries) => {
                assert_eq!(entries[0].0, ConstValue::Str("k".to_string()));
                assert_eq!(entries[0].1, ConstValue::Integer(9));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_typedef_and_containers() {
        let (tree, pid) =
            parse_source("t", "typedef map<string, list<i64>> Index").unwrap();
        let td = tree.resolve_type(pid, "Index").unwrap();
        let target = match tree.ty(td).kind {
            TypeKind::Typedef { target } => target,
            _ => panic!("expected typedef"),
        };
        match tree.ty(target).kind {
            TypeKind::Map { key, value } => {
                assert!(matches!(
                    tree.ty(key).kind,
                    TypeKind::Base(BaseType::String { .. })
                ));
                match tree.ty(value).kind {
                    TypeKind::List { elem } => assert_eq!(elem, I64),
                    _ => panic!("expected list value"),
                }
            }
            _ => panic!("expected map"),
        }
    }

    #[test]
    fn test_oneway_and_async_both_accepted() {
        let (tree, pid) = parse_source(
            "t",
            "service S { oneway void a(), async void b(), void c() }",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        match &tree.ty(s).kind {
            TypeKind::Service { functions, .. } => {
                assert!(functions[0].oneway);
                assert!(functions[1].oneway);
                assert!(!functions[2].oneway);
                assert!(tree.ty(functions[2].returns).is_void());
            }
            _ => panic!("expected service"),
        }
    }

    #[test]
    fn test_void_rejected_as_field_type() {
        let err = parse_source("t", "struct S { 1: void v }").unwrap_err();
        assert!(err.to_string().contains("function return"));
    }

    #[test]
    fn test_doc_comment_attaches_to_next_definition() {
        let (tree, pid) = parse_source(
            "t",
            "/** Keeps a thing. */\nstruct S { 1: i32 a }\nstruct T { 1: i32 a }",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        let t = tree.resolve_type(pid, "T").unwrap();
        assert_eq!(tree.ty(s).doc.as_deref(), Some("Keeps a thing.\n"));
        assert_eq!(tree.ty(t).doc, None);
    }

    #[test]
    fn test_doc_comment_on_fields_and_enum_values() {
        let (tree, pid) = parse_source(
            "t",
            "struct S {\n  /** first */\n  1: i32 a,\n  2: i32 b\n}",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        let fields = tree.ty(s).fields().unwrap();
        assert_eq!(fields[0].doc.as_deref(), Some("first\n"));
        assert_eq!(fields[1].doc, None);
    }

    #[test]
    fn test_consecutive_doc_comments_keep_latest() {
        let (tree, pid) = parse_source(
            "t",
            "/** old */\n/** new */\nstruct S { 1: i32 a }",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        assert_eq!(tree.ty(s).doc.as_deref(), Some("new\n"));
    }

    #[test]
    fn test_doc_comment_before_header_documents_program() {
        let (tree, pid) = parse_source(
            "t",
            "/** Whole file. */\nnamespace rust demo\nstruct S { 1: i32 a }",
        )
        .unwrap();
        assert_eq!(tree.program(pid).doc.as_deref(), Some("Whole file.\n"));
        let s = tree.resolve_type(pid, "S").unwrap();
        assert_eq!(tree.ty(s).doc, None);
    }

    #[test]
    fn test_namespace_and_cpp_include_recorded() {
        let (tree, pid) = parse_source(
            "t",
            "namespace rust demo\nnamespace java com.example.demo\ncpp_include \"x.h\"",
        )
        .unwrap();
        let program = tree.program(pid);
        assert_eq!(program.namespace("rust"), Some("demo"));
        assert_eq!(program.namespace("java"), Some("com.example.demo"));
        assert_eq!(program.cpp_includes, vec!["x.h".to_string()]);
    }

    #[test]
    fn test_senum_is_string_alias() {
        let (tree, pid) =
            parse_source("t", "senum Old { \"a\", \"b\" }").unwrap();
        let td = tree.resolve_type(pid, "Old").unwrap();
        match tree.ty(td).kind {
            TypeKind::Typedef { target } => assert_eq!(target, SLIST),
            _ => panic!("expected typedef alias"),
        }
    }

    #[test]
    fn test_keyword_not_allowed_as_name() {
        let err = parse_source("t", "struct struct { 1: i32 a }").unwrap_err();
        assert!(err.to_string().contains("Expected identifier"));
    }

    #[test]
    fn test_separators_are_optional_and_flexible() {
        let src = "struct A { 1: i32 x; 2: i32 y }\nstruct B { 1: i32 x, 2: i32 y };";
        let (tree, pid) = parse_source("t", src).unwrap();
        assert!(tree.resolve_type(pid, "A").is_some());
        assert!(tree.resolve_type(pid, "B").is_some());
    }

    #[test]
    fn test_throws_fields_parsed() {
        let (tree, pid) = parse_source(
            "t",
            "exception E { 1: string m }\nservice S { i32 f(1: i32 x) throws (1: E e) }",
        )
        .unwrap();
        let s = tree.resolve_type(pid, "S").unwrap();
        match &tree.ty(s).kind {
            TypeKind::Service { functions, .. } => {
                assert_eq!(functions[0].args.len(), 1);
                assert_eq!(functions[0].args[0].ty, I32);
                assert_eq!(functions[0].throws.len(), 1);
            }
            _ => panic!("expected service"),
        }
    }
}
