use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{file}:{line}:{column}: {msg}")]
    Syntax {
        file:   String,
        line:   usize,
        column: usize,
        msg:    String,
    },

    #[error("{file}:{line}:{column}: {msg}")]
    Link {
        file:   String,
        line:   usize,
        column: usize,
        msg:    String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("write {}: {source}", path.display())]
    Generation {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
}
