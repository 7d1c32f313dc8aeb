//! Error types for the playground.

use std::path::PathBuf;

/// Errors that can occur while loading or driving the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading a file from disk failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The wasmtime engine could not be created or configured.
    #[error("WASM engine error: {0}")]
    WasmEngine(String),

    /// The interpreter module failed to compile or instantiate.
    #[error("WASM module error: {0}")]
    WasmModule(#[source] wasmtime::Error),

    /// The interpreter module does not export a required symbol.
    #[error("interpreter module is missing export `{0}`")]
    MissingExport(&'static str),

    /// Reading or writing the module's linear memory failed.
    #[error("linear memory access failed: {0}")]
    Memory(String),

    /// The interpreter trapped during a foreign call.
    #[error("interpreter trapped in `{symbol}`: {message}")]
    Trap {
        /// The foreign symbol that was being called.
        symbol: &'static str,
        /// Rendered trap message.
        message: String,
    },

    /// Loading the interpreter module failed before it became usable.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The interpreter has not finished loading (or failed to load).
    #[error("interpreter is not ready")]
    NotReady,

    /// No example is registered under the requested label.
    #[error("unknown example: {0}")]
    UnknownExample(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
