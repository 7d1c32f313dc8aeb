//! # hololisp-playground
//!
//! A host-side playground for the hololisp interpreter, powered by WebAssembly.
//!
//! The interpreter itself is an external, precompiled WebAssembly module. This
//! crate drives it through its three exported entry points (`hll_make_vm`,
//! `hll_interpret`, `hll_delete_vm`) and wires it to a playground:
//!
//! - **Per-run VM lifecycle** - every run gets a fresh interpreter instance, so
//!   no definitions leak from one run into the next
//! - **Line-oriented output** - everything the interpreter prints arrives as
//!   [`OutputLine`]s over a channel, tagged with the stream it was written to
//! - **Bundled examples** - an ordered [`ExamplesMap`] seeds the editor
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hololisp_playground::{
//!     ExamplesMap, NullView, Playground, PlaygroundConfig, WasmModuleLoader,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hololisp_playground::Error> {
//!     let config = PlaygroundConfig::default();
//!     let loader = WasmModuleLoader::from_file(&config.wasm_path);
//!
//!     let mut playground = Playground::new(ExamplesMap::bundled(), config, NullView);
//!     playground.initialize(&loader).await?;
//!
//!     playground.set_editor("(print (+ 1 2))");
//!     playground.run().await?;
//!
//!     print!("{}", playground.output().text());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod adapter;
pub mod config;
mod error;
pub mod examples;
mod foreign;
pub mod output;
mod playground;
mod wasm;

pub use adapter::{DEFAULT_LABEL, InterpretOutcome, InterpretStatus, VmAdapter};
pub use config::PlaygroundConfig;
pub use error::Error;
pub use examples::{DEFAULT_EXAMPLE, ExamplesMap};
pub use foreign::{ForeignVm, InterpretFlags, MAKE_VM_FLAGS, RawHandle};
pub use output::{OutputBuffer, OutputLine, OutputSink, Stream};
pub use playground::{LoadState, NullView, Playground, PlaygroundView, RunReport};
pub use wasm::{ModuleLoader, WasmBindings, WasmModuleLoader, WasmSource};
