//! JSON back end: serializes a program and the entities it declares, which
//! makes the parsed tree inspectable by other tooling without linking the
//! compiler.

use serde::Serialize;

use crate::error::IdlError;
use crate::generator::{gen_dir, write_output, Generator, GeneratorOptions};
use crate::types::{Constant, Program, ProgramId, Tree, Type};

#[derive(Serialize)]
struct JsonDump<'a> {
    program:   &'a Program,
    types:     Vec<&'a Type>,
    constants: Vec<&'a Constant>,
}

/// Collects the dump for one program: its own typedefs, enums, structs,
/// exceptions, services, and constants, in declaration order. Entities of
/// included programs stay out of the dump.
fn dump_for(tree: &Tree, program: ProgramId) -> JsonDump<'_> {
    let p = tree.program(program);
    let types: Vec<&Type> = p
        .typedefs
        .iter()
        .chain(p.enums.iter())
        .chain(p.structs.iter())
        .chain(p.exceptions.iter())
        .chain(p.services.iter())
        .map(|id| tree.ty(*id))
        .collect();
    let constants: Vec<&Constant> = p.constants.iter().map(|id| tree.constant(*id)).collect();
    JsonDump {
        program: p,
        types,
        constants,
    }
}

pub struct JsonGenerator {
    options: GeneratorOptions,
}

impl JsonGenerator {
    pub fn factory(options: &GeneratorOptions) -> Box<dyn Generator> {
        Box::new(JsonGenerator {
            options: options.clone(),
        })
    }
}

impl Generator for JsonGenerator {
    fn language(&self) -> &'static str {
        "json"
    }

    fn generate(&mut self, tree: &Tree, program: ProgramId) -> Result<(), IdlError> {
        let dump = dump_for(tree, program);
        let rendered = if self.options.is_set("compact") {
            serde_json::to_string(&dump)
        } else {
            serde_json::to_string_pretty(&dump)
        }
        .map_err(|e| IdlError::Generator(format!("JSON serialization failed: {}", e)))?;

        let dir = gen_dir(tree, program, "json")?;
        let file = dir.join(format!("{}.json", tree.program(program).name));
        write_output(&file, &rendered)
    }
}
