//! Rendering the playground on a terminal.

use hololisp_playground::{ExamplesMap, OutputLine, PlaygroundView, Stream};

/// Writes interpreter output to stdout/stderr as it arrives.
#[derive(Debug, Clone, Copy)]
pub struct TerminalView {
    interactive: bool,
}

impl TerminalView {
    /// Session view: also reports selection and editor changes.
    pub const fn interactive() -> Self {
        Self { interactive: true }
    }

    /// Run-once view: program output only.
    pub const fn batch() -> Self {
        Self { interactive: false }
    }
}

impl PlaygroundView for TerminalView {
    fn examples_loaded(&mut self, labels: &[&str], selected: Option<usize>) {
        if self.interactive {
            println!("{} examples loaded (:examples to list them)", labels.len());
            if let Some(label) = selected.and_then(|i| labels.get(i)) {
                println!("selected: {label}");
            }
        }
    }

    fn editor_changed(&mut self, text: &str) {
        if self.interactive {
            println!("editor: {} lines", text.lines().count());
        }
    }

    fn output_line(&mut self, line: &OutputLine) {
        match line.stream {
            Stream::Stdout => println!("{}", line.text),
            Stream::Stderr => eprintln!("{}", line.text),
        }
    }

    fn alert(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// Print example labels, one per line, marking `selected`.
pub fn print_examples(examples: &ExamplesMap, selected: Option<usize>) {
    for (i, label) in examples.labels().enumerate() {
        let marker = if Some(i) == selected { '*' } else { ' ' };
        println!("{marker} {label}");
    }
}
