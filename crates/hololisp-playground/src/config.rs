//! Playground configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!     "wasm_path": "dist/hololisp.wasm",
//!     "default_example": "fibonacci",
//!     "print_result": true
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapter::DEFAULT_LABEL;
use crate::error::Error;
use crate::examples::{DEFAULT_EXAMPLE, ExamplesMap};
use crate::foreign::InterpretFlags;

/// Where the interpreter module is looked for when nothing else is configured.
pub const DEFAULT_WASM_PATH: &str = "dist/hololisp.wasm";

/// Settings for a [`Playground`](crate::Playground).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundConfig {
    /// Path of the precompiled interpreter module.
    pub wasm_path: PathBuf,

    /// Label the interpreter uses when reporting diagnostics.
    pub label: String,

    /// Example selected (and loaded into the editor) at startup.
    pub default_example: String,

    /// JSON file of examples to use instead of the bundled ones.
    pub examples_file: Option<PathBuf>,

    /// Ask the interpreter to print the value of the last form.
    pub print_result: bool,

    /// Ask the interpreter to colour its diagnostics.
    pub colored: bool,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            wasm_path: PathBuf::from(DEFAULT_WASM_PATH),
            label: DEFAULT_LABEL.to_string(),
            default_example: DEFAULT_EXAMPLE.to_string(),
            examples_file: None,
            print_result: false,
            colored: false,
        }
    }
}

impl PlaygroundConfig {
    /// Parse a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Flags passed to every `hll_interpret` call.
    #[must_use]
    pub fn interpret_flags(&self) -> InterpretFlags {
        InterpretFlags::empty()
            .with(InterpretFlags::PRINT_RESULT, self.print_result)
            .with(InterpretFlags::COLORED, self.colored)
    }

    /// The configured examples: the examples file if set, the bundled ones
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the examples file cannot be read or parsed.
    pub fn load_examples(&self) -> Result<ExamplesMap, Error> {
        match &self.examples_file {
            Some(path) => ExamplesMap::from_file(path),
            None => Ok(ExamplesMap::bundled()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaygroundConfig::default();
        assert_eq!(config.label, "wasm");
        assert_eq!(config.default_example, "hello world");
        assert_eq!(config.wasm_path, PathBuf::from(DEFAULT_WASM_PATH));
        assert_eq!(config.interpret_flags(), InterpretFlags::empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            PlaygroundConfig::from_json(r#"{"default_example": "lists", "colored": true}"#).unwrap();
        assert_eq!(config.default_example, "lists");
        assert_eq!(config.label, "wasm");
        assert_eq!(config.interpret_flags(), InterpretFlags::COLORED);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = PlaygroundConfig::from_json(r#"{"persistent_vm": true}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_examples_prefers_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("examples.json");
        std::fs::write(&path, r#"{"only": "(print 1)"}"#).unwrap();

        let config = PlaygroundConfig {
            examples_file: Some(path),
            ..PlaygroundConfig::default()
        };
        let examples = config.load_examples().unwrap();
        assert_eq!(examples.labels().collect::<Vec<_>>(), vec!["only"]);

        let bundled = PlaygroundConfig::default().load_examples().unwrap();
        assert_eq!(bundled, ExamplesMap::bundled());
    }

    #[test]
    fn test_from_file_missing() {
        let err = PlaygroundConfig::from_file("/nonexistent/playground.json").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
