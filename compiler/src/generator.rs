//! The back-end contract: a generator is constructed per program from a
//! factory plus an option bag, sees the tree read-only, and writes files
//! under `OUT/gen-LANG/`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IdlError;
use crate::types::{ProgramId, Tree};

/// Back-end settings parsed from a `-gen NAME:key=value,flag` spec. Keys
/// without a value are flags; their meaning is back-end-defined.
#[derive(Debug, Default, Clone)]
pub struct GeneratorOptions {
    values: HashMap<String, String>,
}

impl GeneratorOptions {
    /// Splits `NAME[:key=value,...]` into the language name and its options.
    pub fn parse_spec(spec: &str) -> (String, GeneratorOptions) {
        let (name, rest) = match spec.split_once(':') {
            Some((name, rest)) => (name, rest),
            None => (spec, ""),
        };
        let mut options = GeneratorOptions::default();
        for part in rest.split(',').filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((k, v)) => options.values.insert(k.to_string(), v.to_string()),
                None => options.values.insert(part.to_string(), String::new()),
            };
        }
        (name.to_string(), options)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

pub trait Generator {
    fn language(&self) -> &'static str;

    /// Emits one program. The tree is read-only; traversal order is up to
    /// the back end.
    fn generate(&mut self, tree: &Tree, program: ProgramId) -> Result<(), IdlError>;
}

pub type GeneratorFactory = fn(&GeneratorOptions) -> Box<dyn Generator>;

/// Ordered name → factory table of the available back ends.
pub struct Registry {
    entries: Vec<(&'static str, GeneratorFactory)>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        registry.register("rust", crate::gen_rust::RustGenerator::factory);
        registry.register("json", crate::gen_json::JsonGenerator::factory);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: GeneratorFactory) {
        self.entries.push((name, factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn create(
        &self,
        name: &str,
        options: &GeneratorOptions,
    ) -> Option<Box<dyn Generator>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| factory(options))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::with_builtins()
    }
}

/// Ensures and returns `OUT/gen-LANG/` for a program.
pub fn gen_dir(tree: &Tree, program: ProgramId, lang: &str) -> Result<PathBuf, IdlError> {
    let dir = tree
        .program(program)
        .out_path
        .join(format!("gen-{}", lang));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Writes through a temporary sibling and renames into place, so an aborted
/// run never leaves a truncated output file behind.
pub fn write_output(path: &Path, contents: &str) -> Result<(), IdlError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
