//! Terminal front end for the hololisp playground.
//!
//! # Examples
//!
//! ```bash
//! # List the bundled examples
//! hll-playground examples
//!
//! # Run an example once
//! hll-playground --wasm dist/hololisp.wasm run --example fibonacci
//!
//! # Run a file, or stdin
//! hll-playground run program.hll
//! echo "(print (+ 1 2))" | hll-playground run -
//!
//! # Interactive playground (the default)
//! HOLOLISP_WASM=dist/hololisp.wasm hll-playground
//! ```

#![forbid(unsafe_code)]

mod repl;
mod view;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hololisp_playground::{
    ExamplesMap, ForeignVm, InterpretStatus, Playground, PlaygroundConfig, PlaygroundView,
    WasmBindings, WasmModuleLoader,
};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::view::TerminalView;

/// Run hololisp programs in a WebAssembly-hosted interpreter.
#[derive(Parser, Debug)]
#[command(name = "hll-playground")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

// Shared by every subcommand; each one set overrides the config file.
#[derive(clap::Args, Debug, Default)]
struct Options {
    /// Path to the precompiled interpreter module
    #[arg(long, global = true, env = "HOLOLISP_WASM", value_name = "PATH")]
    wasm: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON file of examples to use instead of the bundled ones
    #[arg(long, global = true, value_name = "FILE")]
    examples: Option<PathBuf>,

    /// Label the interpreter uses in diagnostics
    #[arg(long, global = true)]
    label: Option<String>,

    /// Print the value of the last form
    #[arg(long, global = true)]
    print_result: bool,

    /// Colour interpreter diagnostics
    #[arg(long, global = true)]
    colored: bool,

    /// Example selected at startup
    #[arg(long, global = true, value_name = "LABEL")]
    default_example: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available examples
    Examples,

    /// Print the source of an example
    Show {
        /// Example label
        label: String,
    },

    /// Run a program once and exit
    Run {
        /// Source file, or `-` for stdin
        #[arg(conflicts_with = "example")]
        file: Option<PathBuf>,

        /// Run this example instead of a file
        #[arg(short, long, value_name = "LABEL")]
        example: Option<String>,
    },

    /// Line-oriented playground session
    Interactive,
}

impl Options {
    /// The config file (or defaults) with command-line overrides applied.
    fn resolve(&self) -> Result<PlaygroundConfig> {
        let mut config = match &self.config {
            Some(path) => PlaygroundConfig::from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => PlaygroundConfig::default(),
        };

        if let Some(wasm) = &self.wasm {
            config.wasm_path.clone_from(wasm);
        }
        if let Some(examples) = &self.examples {
            config.examples_file = Some(examples.clone());
        }
        if let Some(label) = &self.label {
            config.label.clone_from(label);
        }
        if let Some(default_example) = &self.default_example {
            config.default_example.clone_from(default_example);
        }
        config.print_result |= self.print_result;
        config.colored |= self.colored;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.options.verbose {
        "hololisp_playground=debug,hll_playground=debug"
    } else {
        "hololisp_playground=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.options.resolve()?;
    let examples = config
        .load_examples()
        .context("Failed to load examples")?;
    tracing::debug!(?config, examples = examples.len(), "configuration resolved");

    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Examples => {
            view::print_examples(&examples, examples.position(&config.default_example));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { label } => {
            let source = examples
                .get(&label)
                .with_context(|| format!("Unknown example: {label}"))?;
            print!("{source}");
            if !source.ends_with('\n') {
                println!();
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { file, example } => run_once(config, examples, file, example).await,
        Commands::Interactive => {
            let playground = start(config, examples, TerminalView::interactive()).await?;
            repl::run(playground).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build a playground and load the interpreter into it.
async fn start(
    config: PlaygroundConfig,
    examples: ExamplesMap,
    view: TerminalView,
) -> Result<Playground<WasmBindings, TerminalView>> {
    let loader = WasmModuleLoader::from_file(&config.wasm_path);
    let mut playground = Playground::new(examples, config, view);
    playground
        .initialize(&loader)
        .await
        .context("Interpreter is unavailable")?;
    Ok(playground)
}

async fn run_once(
    config: PlaygroundConfig,
    examples: ExamplesMap,
    file: Option<PathBuf>,
    example: Option<String>,
) -> Result<ExitCode> {
    let program = read_program(file.as_deref(), tokio::io::stdin()).await?;
    let mut playground = start(config, examples, TerminalView::batch()).await?;
    load_editor(&mut playground, program, example.as_deref())?;
    let status = run_editor(&mut playground).await?;
    Ok(exit_code(status))
}

/// Program text named by `run`'s file argument; `-` reads `stdin`.
async fn read_program<R>(file: Option<&Path>, mut stdin: R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match file {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            stdin
                .read_to_string(&mut text)
                .await
                .context("Failed to read program from stdin")?;
            Ok(Some(text))
        }
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read program: {}", path.display()))?;
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

/// Put the program to run in the editor: explicit text wins over `example`.
fn load_editor<F, V>(
    playground: &mut Playground<F, V>,
    program: Option<String>,
    example: Option<&str>,
) -> Result<()>
where
    F: ForeignVm,
    V: PlaygroundView,
{
    match (program, example) {
        (Some(text), _) => playground.set_editor(text),
        (None, Some(label)) => playground.select_example(label)?,
        // The default example is already in the editor.
        (None, None) => {}
    }
    Ok(())
}

async fn run_editor<F, V>(playground: &mut Playground<F, V>) -> Result<InterpretStatus>
where
    F: ForeignVm,
    V: PlaygroundView,
{
    let report = playground.run().await?;
    tracing::debug!(status = ?report.status, duration = ?report.duration, "program finished");
    Ok(report.status)
}

fn exit_code(status: InterpretStatus) -> ExitCode {
    if status.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
