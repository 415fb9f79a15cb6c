use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at {}:{line}: {msg}", path.display())]
    Parse {
        msg:  String,
        path: PathBuf,
        line: usize,
    },

    #[error("Unresolved symbol \"{name}\" at {}:{line}", path.display())]
    Unresolved {
        name: String,
        path: PathBuf,
        line: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("compiler error: {0}")]
    Internal(String),
}
