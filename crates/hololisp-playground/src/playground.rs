//! The playground controller.
//!
//! [`Playground`] owns everything the user interacts with: the editor text,
//! the example selection, the output panel and the [`VmAdapter`] that runs
//! programs. A front end renders it by implementing [`PlaygroundView`] and
//! forwards user actions to the controller's methods.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::adapter::{InterpretStatus, VmAdapter};
use crate::config::PlaygroundConfig;
use crate::error::Error;
use crate::examples::ExamplesMap;
use crate::foreign::ForeignVm;
use crate::output::{OutputBuffer, OutputLine};
use crate::wasm::ModuleLoader;

/// Rendering hooks called by the [`Playground`].
///
/// Every method has an empty default so a view only implements what it shows.
pub trait PlaygroundView {
    /// The selection control was populated. `selected` indexes into `labels`.
    fn examples_loaded(&mut self, labels: &[&str], selected: Option<usize>) {
        let _ = (labels, selected);
    }

    /// The editor content was replaced by the playground.
    fn editor_changed(&mut self, text: &str) {
        let _ = text;
    }

    /// The output panel was cleared.
    fn output_cleared(&mut self) {}

    /// A line was appended to the output panel.
    fn output_line(&mut self, line: &OutputLine) {
        let _ = line;
    }

    /// A blocking, user-visible notice.
    fn alert(&mut self, message: &str) {
        let _ = message;
    }
}

/// A view that renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl PlaygroundView for NullView {}

/// Whether the interpreter can be used yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// [`Playground::initialize`] has not completed.
    Pending,
    /// The interpreter is loaded; runs are possible.
    Ready,
    /// Loading failed; runs stay disabled.
    Failed(String),
}

/// Summary of one [`Playground::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    /// Status reported by the interpreter.
    pub status: InterpretStatus,
    /// Time spent interpreting.
    pub duration: Duration,
    /// Number of output lines the run produced.
    pub lines: usize,
}

enum State<F> {
    Pending,
    Ready {
        adapter: VmAdapter<F>,
        output: mpsc::UnboundedReceiver<OutputLine>,
    },
    Failed(String),
}

/// Top-level controller: editor, example selection, output and interpreter.
pub struct Playground<F, V> {
    examples: ExamplesMap,
    config: PlaygroundConfig,
    view: V,
    editor: String,
    output: OutputBuffer,
    selected: Option<usize>,
    state: State<F>,
}

impl<F, V> std::fmt::Debug for Playground<F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playground")
            .field("examples", &format!("[{} examples]", self.examples.len()))
            .field("editor_len", &self.editor.len())
            .field("output_lines", &self.output.len())
            .field("selected", &self.selected)
            .field("state", &self.load_state())
            .finish_non_exhaustive()
    }
}

impl<F: ForeignVm, V: PlaygroundView> Playground<F, V> {
    /// Create a playground. Nothing can run until [`Playground::initialize`]
    /// succeeds.
    #[must_use]
    pub fn new(examples: ExamplesMap, config: PlaygroundConfig, view: V) -> Self {
        Self {
            examples,
            config,
            view,
            editor: String::new(),
            output: OutputBuffer::new(),
            selected: None,
            state: State::Pending,
        }
    }

    /// Load the interpreter.
    ///
    /// The output channel is handed to `loader` before any binding exists. On
    /// success the example selection is populated and the default example is
    /// placed in the editor. On failure the view gets an alert and runs stay
    /// disabled for the lifetime of the playground; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or [`Error::Initialization`] if an earlier
    /// attempt already failed.
    pub async fn initialize<L>(&mut self, loader: &L) -> Result<(), Error>
    where
        L: ModuleLoader<Bindings = F>,
    {
        match &self.state {
            State::Pending => {}
            State::Ready { .. } => return Ok(()),
            State::Failed(message) => return Err(Error::Initialization(message.clone())),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match loader.load(Arc::new(tx)).await {
            Ok(bindings) => {
                let adapter = VmAdapter::new(bindings)
                    .with_label(self.config.label.clone())
                    .with_flags(self.config.interpret_flags());
                self.state = State::Ready {
                    adapter,
                    output: rx,
                };
                self.drain_output();
                self.populate_examples();
                tracing::info!(examples = self.examples.len(), "playground ready");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, "failed to initialize interpreter");
                self.view
                    .alert(&format!("Fatal error: failed to initialize wasm: {error}"));
                self.state = State::Failed(error.to_string());
                Err(error)
            }
        }
    }

    fn populate_examples(&mut self) {
        self.selected = self
            .examples
            .position(&self.config.default_example)
            .or(if self.examples.is_empty() { None } else { Some(0) });

        let labels: Vec<&str> = self.examples.labels().collect();
        self.view.examples_loaded(&labels, self.selected);

        if let Some((_, source)) = self.selected.and_then(|i| self.examples.get_index(i)) {
            self.editor = source.to_string();
            self.view.editor_changed(&self.editor);
        }
    }

    /// Replace the editor content with the example called `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownExample`] if there is no such example.
    pub fn select_example(&mut self, label: &str) -> Result<(), Error> {
        let (index, source) = self
            .examples
            .get_full(label)
            .ok_or_else(|| Error::UnknownExample(label.to_string()))?;

        tracing::debug!(label, "example selected");
        self.editor = source.to_string();
        self.selected = Some(index);
        self.view.editor_changed(&self.editor);
        Ok(())
    }

    /// Record a user edit of the editor.
    pub fn set_editor(&mut self, text: impl Into<String>) {
        self.editor = text.into();
    }

    /// Run the current editor content in a fresh interpreter.
    ///
    /// The output panel is cleared first. Every line the program prints is
    /// appended to it, in order, before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] (without touching the output) if the
    /// interpreter is not loaded, or the foreign error if the interpreter
    /// trapped. A trap is also reported on the output panel.
    pub async fn run(&mut self) -> Result<RunReport, Error> {
        let State::Ready { adapter, .. } = &mut self.state else {
            tracing::debug!("run ignored, interpreter not ready");
            return Err(Error::NotReady);
        };

        self.output.clear();
        self.view.output_cleared();

        let result = adapter.interpret(&self.editor).await;
        let lines = self.drain_output();

        match result {
            Ok(outcome) => {
                tracing::info!(
                    status = ?outcome.status,
                    duration = ?outcome.duration,
                    lines,
                    "run finished"
                );
                Ok(RunReport {
                    status: outcome.status,
                    duration: outcome.duration,
                    lines,
                })
            }
            Err(error) => {
                self.push_line(OutputLine::stderr(error.to_string()));
                Err(error)
            }
        }
    }

    /// Move pending interpreter output into the buffer and view.
    fn drain_output(&mut self) -> usize {
        let State::Ready { output, .. } = &mut self.state else {
            return 0;
        };

        let mut count = 0;
        while let Ok(line) = output.try_recv() {
            self.view.output_line(&line);
            self.output.push(line);
            count += 1;
        }
        count
    }

    fn push_line(&mut self, line: OutputLine) {
        self.view.output_line(&line);
        self.output.push(line);
    }

    /// Current editor content.
    #[must_use]
    pub fn editor(&self) -> &str {
        &self.editor
    }

    /// The output panel.
    #[must_use]
    pub const fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Label of the selected example.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.examples.get_index(i))
            .map(|(label, _)| label)
    }

    /// The examples offered by the selection control.
    #[must_use]
    pub const fn examples(&self) -> &ExamplesMap {
        &self.examples
    }

    /// The configuration the playground was built with.
    #[must_use]
    pub const fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Whether runs are possible.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// The view.
    #[must_use]
    pub const fn view(&self) -> &V {
        &self.view
    }

    /// The view, mutably.
    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }
}

impl<F, V> Playground<F, V> {
    /// Loading state of the interpreter.
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        match &self.state {
            State::Pending => LoadState::Pending,
            State::Ready { .. } => LoadState::Ready,
            State::Failed(message) => LoadState::Failed(message.clone()),
        }
    }
}
