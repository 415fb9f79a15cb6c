//! The driver: resolves includes, runs the two parse passes over every
//! reachable program, verifies, fingerprints, and hands the frozen tree to
//! the selected back ends.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::error::IdlError;
use crate::fingerprint::fingerprint_program;
use crate::generator::{GeneratorOptions, Registry};
use crate::parser::{Parser, Pass};
use crate::render::render_program;
use crate::tokenizer::tokenize;
use crate::types::{Program, ProgramId, Tree};
use crate::utils::{program_name, quote};
use crate::verifier::verify_program;

#[derive(Debug, Clone)]
pub struct Options {
    /// Root for `gen-LANG` output directories.
    pub out_path:     PathBuf,
    /// Extra directories searched by `include` directives, in order.
    pub include_dirs: Vec<PathBuf>,
    /// Also generate code for included programs.
    pub recurse:      bool,
    /// -1 suppresses all warnings, 1 is the default, 2 adds strict warnings.
    pub warn_level:   i8,
    /// Raw `NAME[:opts]` back-end specs.
    pub gens:         Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            out_path:     PathBuf::from("."),
            include_dirs: Vec::new(),
            recurse:      false,
            warn_level:   1,
            gens:         Vec::new(),
        }
    }
}

/// Leveled warning: shown when `level <= warn_level`. Level 0 is for
/// conditions the user almost always wants to hear about, level 2 only
/// matters under -strict.
pub fn pwarning(warn_level: i8, level: i8, path: &Path, line: usize, msg: &str) {
    if level <= warn_level {
        warn!("{}:{}: {}", path.display(), line, msg);
    }
}

/// Locates a file referenced by an `include` directive. Absolute paths are
/// canonicalized directly; relative paths are searched first in the current
/// file's directory, then in each user-supplied include directory. A miss
/// warns at level 0 and returns None; the later unresolved-symbol error is
/// the hard failure.
pub fn include_file(
    filename: &str,
    curdir: &Path,
    include_dirs: &[PathBuf],
    warn_level: i8,
    at_path: &Path,
    line: usize,
) -> Option<PathBuf> {
    let candidate = Path::new(filename);
    if candidate.is_absolute() {
        match fs::canonicalize(candidate) {
            Ok(found) => return Some(found),
            Err(_) => {
                pwarning(
                    warn_level,
                    0,
                    at_path,
                    line,
                    &format!("Cannot open include file {}", quote(filename)),
                );
                return None;
            }
        }
    }

    for dir in std::iter::once(curdir).chain(include_dirs.iter().map(|d| d.as_path())) {
        if let Ok(found) = fs::canonicalize(dir.join(filename)) {
            return Some(found);
        }
    }
    pwarning(
        warn_level,
        0,
        at_path,
        line,
        &format!("Could not find include file {}", quote(filename)),
    );
    None
}

pub struct Compiler {
    opts:     Options,
    registry: Registry,
    /// Canonical path → program; each distinct file is parsed at most once
    /// per compilation, which also breaks include cycles.
    parsed:   HashMap<PathBuf, ProgramId>,
    emitted:  HashSet<ProgramId>,
}

impl Compiler {
    pub fn new(opts: Options) -> Self {
        Compiler::with_registry(opts, Registry::with_builtins())
    }

    pub fn with_registry(opts: Options, registry: Registry) -> Self {
        Compiler {
            opts,
            registry,
            parsed:  HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// Runs the whole pipeline on one input file and returns the frozen
    /// tree. Phase order: parse (includes first, then types, recursively) →
    /// verify → fingerprint → generate.
    pub fn run(&mut self, input: &Path) -> Result<Tree, IdlError> {
        // Both caches hold ids into the tree built below, so they are
        // per-compilation: a reused Compiler must start clean.
        self.parsed.clear();
        self.emitted.clear();

        let canonical = fs::canonicalize(input).map_err(|e| IdlError::Parse {
            msg:  format!("Could not open input file: {}", e),
            path: input.to_path_buf(),
            line: 0,
        })?;

        // Reject unknown back ends before doing any work.
        let mut specs: Vec<(String, GeneratorOptions)> = Vec::new();
        for raw in &self.opts.gens {
            let (name, options) = GeneratorOptions::parse_spec(raw);
            if !self.registry.contains(&name) {
                return Err(IdlError::Generator(format!(
                    "Unknown generator {}",
                    quote(&name)
                )));
            }
            specs.push((name, options));
        }

        let mut tree = Tree::new();
        let root = self.parse_program(&mut tree, &canonical, None)?;

        let root_program = tree.program_mut(root);
        root_program.out_path = self.opts.out_path.clone();
        if let Some(dir) = input.parent() {
            if !dir.as_os_str().is_empty() {
                root_program.include_prefix = Some(dir.to_string_lossy().into_owned());
            }
        }

        for i in 0..tree.programs.len() {
            verify_program(&tree, ProgramId(i))?;
        }

        let mut failed = false;
        self.generate(&mut tree, root, &specs, &mut failed)?;
        if failed {
            return Err(IdlError::Generator(
                "one or more back ends reported errors".to_string(),
            ));
        }
        Ok(tree)
    }

    fn parse_program(
        &mut self,
        tree: &mut Tree,
        path: &Path,
        parent: Option<ProgramId>,
    ) -> Result<ProgramId, IdlError> {
        if let Some(&pid) = self.parsed.get(path) {
            // Re-inclusion shares the parsed instance; the new includer just
            // needs the dotted names in its scope.
            if let Some(parent) = parent {
                if !tree.program(parent).includes.contains(&pid) {
                    tree.program_mut(parent).includes.push(pid);
                    tree.import_scope(parent, pid);
                }
            }
            return Ok(pid);
        }

        let pid = tree.alloc_program(Program::new(path.to_path_buf(), program_name(path)));
        self.parsed.insert(path.to_path_buf(), pid);
        if let Some(parent) = parent {
            tree.program_mut(parent).includes.push(pid);
        }

        let text = fs::read_to_string(path).map_err(|e| IdlError::Parse {
            msg:  format!("Could not open input file: {}", e),
            path: path.to_path_buf(),
            line: 0,
        })?;
        let include_dirs = self.opts.include_dirs.clone();
        let warn_level = self.opts.warn_level;

        info!("Scanning {} for includes", path.display());
        let tokens = tokenize(path, &text)?;
        let includes_found = {
            let mut parser = Parser::new(
                tree,
                pid,
                None,
                Pass::Includes,
                tokens,
                &include_dirs,
                warn_level,
            );
            parser.parse()?;
            parser.includes_found
        };

        for inc in &includes_found {
            self.parse_program(tree, inc, Some(pid))?;
        }

        info!("Parsing {} for types", path.display());
        let tokens = tokenize(path, &text)?;
        {
            let mut parser = Parser::new(
                tree,
                pid,
                parent,
                Pass::Types,
                tokens,
                &include_dirs,
                warn_level,
            );
            parser.parse()?;
        }
        debug!(
            "Parsed tree for {}:\n{}",
            tree.program(pid).name,
            render_program(tree, pid)
        );
        Ok(pid)
    }

    /// Fingerprints a program and runs every selected back end over it,
    /// recursing into includes first when requested. A back-end error is
    /// reported and recorded but does not stop the remaining back ends.
    fn generate(
        &mut self,
        tree: &mut Tree,
        pid: ProgramId,
        specs: &[(String, GeneratorOptions)],
        failed: &mut bool,
    ) -> Result<(), IdlError> {
        if !self.emitted.insert(pid) {
            return Ok(());
        }
        if self.opts.recurse {
            let includes = tree.program(pid).includes.clone();
            let out_path = tree.program(pid).out_path.clone();
            for inc in includes {
                tree.program_mut(inc).out_path = out_path.clone();
                self.generate(tree, inc, specs, failed)?;
            }
        }

        info!("Program: {}", tree.program(pid).path.display());
        fingerprint_program(tree, pid);

        for (name, options) in specs {
            info!("Generating {}", name);
            let mut generator = self.registry.create(name, options).ok_or_else(|| {
                IdlError::Generator(format!("Unknown generator {}", quote(name)))
            })?;
            if let Err(e) = generator.generate(tree, pid) {
                error!(
                    "Generator {} failed for {}: {}",
                    name,
                    tree.program(pid).name,
                    e
                );
                *failed = true;
            }
        }
        Ok(())
    }
}

/// Parses a single in-memory schema through both passes with no include
/// search path. The workhorse behind unit tests and simple embeddings.
pub fn parse_source(name: &str, text: &str) -> Result<(Tree, ProgramId), IdlError> {
    let mut tree = Tree::new();
    let path = PathBuf::from(format!("{}.idl", name));
    let pid = tree.alloc_program(Program::new(path.clone(), name.to_string()));

    let tokens = tokenize(&path, text)?;
    Parser::new(&mut tree, pid, None, Pass::Includes, tokens, &[], 1).parse()?;
    let tokens = tokenize(&path, text)?;
    Parser::new(&mut tree, pid, None, Pass::Types, tokens, &[], 1).parse()?;
    Ok((tree, pid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn test_parse_source_builds_program() {
        let (tree, pid) = parse_source(
            "tutorial",
            "enum Op { ADD = 1 }\nstruct Work { 1: i32 num }\nservice Calc { i32 calc(1: Work w) }",
        )
        .unwrap();
        let program = tree.program(pid);
        assert_eq!(program.enums.len(), 1);
        assert_eq!(program.structs.len(), 1);
        assert_eq!(program.services.len(), 1);
        assert!(tree.resolve_type(pid, "Work").is_some());
    }

    #[test]
    fn test_forward_reference_within_file() {
        let (tree, pid) = parse_source(
            "fwd",
            "struct Holder { 1: Later item }\nstruct Later { 1: i32 x }",
        )
        .unwrap();
        let holder = tree.resolve_type(pid, "Holder").unwrap();
        let later = tree.resolve_type(pid, "Later").unwrap();
        let fields = tree.ty(holder).fields().unwrap();
        assert_eq!(fields[0].ty, later);
        assert!(matches!(tree.ty(later).kind, TypeKind::Struct { .. }));
    }

    #[test]
    fn test_unresolved_symbol_is_fatal() {
        let err = parse_source("bad", "struct S { 1: Missing m }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unresolved symbol"));
        assert!(msg.contains("Missing"));
    }

    #[test]
    fn test_self_referential_struct_links_to_itself() {
        let (tree, pid) =
            parse_source("rec", "struct N { 1: optional N next }").unwrap();
        let n = tree.resolve_type(pid, "N").unwrap();
        let fields = tree.ty(n).fields().unwrap();
        assert_eq!(fields[0].ty, n);
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let err = parse_source("dup", "struct S {}\nstruct S {}").unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_unknown_generator_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("x.idl");
        std::fs::write(&input, "struct S { 1: i32 a }").unwrap();

        let mut compiler = Compiler::new(Options {
            gens: vec!["cobol".to_string()],
            ..Options::default()
        });
        let err = compiler.run(&input).unwrap_err();
        assert!(err.to_string().contains("Unknown generator"));
    }

    #[test]
    fn test_missing_input_file() {
        let mut compiler = Compiler::new(Options::default());
        let err = compiler
            .run(Path::new("/definitely/not/here.idl"))
            .unwrap_err();
        assert!(err.to_string().contains("Could not open input file"));
    }

    #[test]
    fn test_compiler_instance_is_reusable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.idl"), "struct T { 1: i32 x }").unwrap();
        let input = dir.path().join("a.idl");
        std::fs::write(&input, "include \"b.idl\"\nstruct U { 1: b.T t }").unwrap();

        let mut compiler = Compiler::new(Options::default());
        let first = compiler.run(&input).expect("first run failed");
        let second = compiler.run(&input).expect("second run failed");

        // The second compilation re-parses everything into its own tree.
        assert_eq!(first.programs.len(), 2);
        assert_eq!(second.programs.len(), 2);
        let u = second.resolve_type(ProgramId(0), "U").unwrap();
        let t = second.resolve_type(ProgramId(0), "b.T").unwrap();
        assert_eq!(second.ty(u).fields().unwrap()[0].ty, t);
    }
}
