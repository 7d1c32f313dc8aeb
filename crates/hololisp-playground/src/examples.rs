//! Example programs offered by the playground's selection control.
//!
//! An [`ExamplesMap`] is an ordered mapping from display label to source text.
//! It is built once at startup, either from the programs bundled with this
//! crate or from a JSON object such as:
//!
//! ```json
//! {
//!     "hello world": "(print '(hello world))",
//!     "sum": "(print (+ 1 2))"
//! }
//! ```
//!
//! Key order is preserved; it is the order the selection control lists them in.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::Error;

/// Label of the example selected when the playground starts.
pub const DEFAULT_EXAMPLE: &str = "hello world";

/// Programs compiled into the crate, in display order.
const BUNDLED: &[(&str, &str)] = &[
    ("hello world", include_str!("../lisp/hello_world.hll")),
    ("arithmetic", include_str!("../lisp/arithmetic.hll")),
    ("lists", include_str!("../lisp/lists.hll")),
    ("factorial", include_str!("../lisp/factorial.hll")),
    ("fibonacci", include_str!("../lisp/fibonacci.hll")),
    ("closures", include_str!("../lisp/closures.hll")),
    ("higher order", include_str!("../lisp/higher_order.hll")),
];

/// Ordered, read-only mapping from label to example source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ExamplesMap {
    entries: IndexMap<String, String>,
}

impl ExamplesMap {
    /// Build a map from `(label, source)` pairs.
    ///
    /// A label that appears twice keeps its first position and its last source.
    pub fn new<L, S>(pairs: impl IntoIterator<Item = (L, S)>) -> Self
    where
        L: Into<String>,
        S: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(label, source)| (label.into(), source.into()))
                .collect(),
        }
    }

    /// The examples bundled with the crate.
    #[must_use]
    pub fn bundled() -> Self {
        Self::new(BUNDLED.iter().copied())
    }

    /// Parse a JSON object of `"label": "source"` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not a JSON object of strings.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("examples: {e}")))
    }

    /// Read and parse a JSON examples file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON object of
    /// strings.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Source text of the example called `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    /// Display position and source text of the example called `label`.
    #[must_use]
    pub fn get_full(&self, label: &str) -> Option<(usize, &str)> {
        self.entries
            .get_full(label)
            .map(|(index, _, source)| (index, source.as_str()))
    }

    /// The example at display position `index`, as `(label, source)`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<(&str, &str)> {
        self.entries
            .get_index(index)
            .map(|(label, source)| (label.as_str(), source.as_str()))
    }

    /// Position of `label` in display order.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries.get_index_of(label)
    }

    /// Labels in display order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(label, source)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(label, source)| (label.as_str(), source.as_str()))
    }

    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Display order is part of the value; `IndexMap`'s own equality ignores it.
impl PartialEq for ExamplesMap {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ExamplesMap {}
