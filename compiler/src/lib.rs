//! ridl-compiler
//!
//! This crate implements:
//!  1) A tokenizer + two-pass parser for `.idl` schema files,
//!  2) A typed program tree with cross-file include resolution and scopes,
//!  3) Constant and default-value validation,
//!  4) Structural fingerprints over the (possibly cyclic) type graph,
//!  5) A pluggable code-generation framework with `rust` and `json` back
//!     ends, and the driver that sequences the phases.

pub mod error;
pub mod utils;
pub mod types;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod fingerprint;
pub mod render;
pub mod generator;
pub mod gen_rust;
pub mod gen_json;
pub mod compiler;

pub use compiler::{parse_source, Compiler, Options};
pub use error::IdlError;
pub use generator::{Generator, GeneratorOptions, Registry};
pub use types::{ProgramId, Tree};
