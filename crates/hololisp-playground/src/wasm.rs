//! WebAssembly runtime setup and host imports.
//!
//! This module loads the precompiled hololisp module with wasmtime, binds the
//! three interpreter entry points, and links WASI preview1 with the guest's
//! stdout and stderr routed to the output sink.
//!
//! The module is expected to be a standalone (reactor) build exporting:
//!
//! - `memory`, `malloc`, `free` for string marshalling
//! - `hll_make_vm`, `hll_interpret`, `hll_delete_vm`
//! - optionally `_initialize`, which is called once after instantiation

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;
use wasmtime::{
    Config, Engine, Instance, Linker, Memory, Module, Store, TypedFunc, WasmParams, WasmResults,
};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::cli::{IsTerminal, StdoutStream};
use wasmtime_wasi::p1::{self, WasiP1Ctx};
use wasmtime_wasi_io::poll::Pollable;
use wasmtime_wasi_io::streams::{OutputStream, StreamResult};

use crate::error::Error;
use crate::foreign::{ForeignVm, InterpretFlags, RawHandle};
use crate::output::{LineWriter, OutputSink, Stream};

/// Produces bound interpreter entry points.
///
/// The output sink is a parameter of [`ModuleLoader::load`], so it is always
/// registered before any binding exists and no output can be lost.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// The bound foreign callables this loader produces.
    type Bindings: ForeignVm;

    /// Load the interpreter, routing its output to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be fetched, compiled or
    /// instantiated.
    async fn load(&self, output: Arc<dyn OutputSink>) -> Result<Self::Bindings, Error>;
}

/// Where the interpreter module comes from.
#[derive(Clone)]
pub enum WasmSource {
    /// A `.wasm` file on disk.
    File(PathBuf),
    /// Module bytes (binary or WAT text) already in memory.
    Bytes(Arc<[u8]>),
}

impl std::fmt::Debug for WasmSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Bytes(bytes) => f
                .debug_tuple("Bytes")
                .field(&format!("[{} bytes]", bytes.len()))
                .finish(),
        }
    }
}

/// Loads the hololisp module with wasmtime.
#[derive(Debug, Clone)]
pub struct WasmModuleLoader {
    source: WasmSource,
}

impl WasmModuleLoader {
    /// Load the module from a file.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: WasmSource::File(path.into()),
        }
    }

    /// Load the module from bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: WasmSource::Bytes(Arc::from(bytes.into())),
        }
    }

    /// Where the module is loaded from.
    #[must_use]
    pub const fn source(&self) -> &WasmSource {
        &self.source
    }
}

#[async_trait]
impl ModuleLoader for WasmModuleLoader {
    type Bindings = WasmBindings;

    async fn load(&self, output: Arc<dyn OutputSink>) -> Result<WasmBindings, Error> {
        let bytes: Arc<[u8]> = match &self.source {
            WasmSource::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
                Arc::from(bytes)
            }
            WasmSource::Bytes(bytes) => Arc::clone(bytes),
        };

        tracing::info!(source = ?self.source, size = bytes.len(), "compiling hololisp module");

        // Cranelift compilation is CPU bound.
        let (engine, module) = tokio::task::spawn_blocking(move || WasmBindings::compile(&bytes))
            .await
            .map_err(|e| Error::Initialization(format!("compile task failed: {e}")))??;

        WasmBindings::instantiate(engine, module, output).await
    }
}

/// Guest stdout or stderr as WASI sees it.
#[derive(Clone)]
struct GuestOutput(LineWriter);

impl IsTerminal for GuestOutput {
    fn is_terminal(&self) -> bool {
        false
    }
}

impl StdoutStream for GuestOutput {
    fn p2_stream(&self) -> Box<dyn OutputStream> {
        Box::new(self.clone())
    }

    fn async_stream(&self) -> Box<dyn AsyncWrite + Send + Sync> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Pollable for GuestOutput {
    async fn ready(&mut self) {
        // Writes never block.
    }
}

#[async_trait]
impl OutputStream for GuestOutput {
    fn write(&mut self, bytes: Bytes) -> StreamResult<()> {
        self.0.write(&bytes);
        Ok(())
    }

    fn flush(&mut self) -> StreamResult<()> {
        // Partial lines are flushed after each foreign call instead.
        Ok(())
    }

    fn check_write(&mut self) -> StreamResult<usize> {
        Ok(64 * 1024)
    }
}

impl AsyncWrite for GuestOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.write(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Host state for one module instance.
struct HostState {
    wasi: WasiP1Ctx,
    stdout: LineWriter,
    stderr: LineWriter,
}

impl HostState {
    fn new(sink: &Arc<dyn OutputSink>) -> Self {
        let stdout = LineWriter::new(Stream::Stdout, Arc::clone(sink));
        let stderr = LineWriter::new(Stream::Stderr, Arc::clone(sink));
        let wasi = WasiCtxBuilder::new()
            .stdout(GuestOutput(stdout.clone()))
            .stderr(GuestOutput(stderr.clone()))
            .build_p1();

        Self {
            wasi,
            stdout,
            stderr,
        }
    }

    /// Emit trailing partial lines.
    fn flush(&self) {
        self.stdout.flush();
        self.stderr.flush();
    }

    fn set_muted(&self, muted: bool) {
        self.stdout.set_muted(muted);
        self.stderr.set_muted(muted);
    }
}

/// Typed exports of an instance.
struct Exports {
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    make_vm: TypedFunc<i32, i32>,
    interpret: TypedFunc<(i32, i32, i32, i32), i32>,
    delete_vm: TypedFunc<i32, ()>,
}

impl Exports {
    fn resolve(instance: &Instance, store: &mut Store<HostState>) -> Result<Self, Error> {
        let memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or(Error::MissingExport("memory"))?;

        Ok(Self {
            memory,
            malloc: typed_export(instance, store, "malloc")?,
            free: typed_export(instance, store, "free")?,
            make_vm: typed_export(instance, store, "hll_make_vm")?,
            interpret: typed_export(instance, store, "hll_interpret")?,
            delete_vm: typed_export(instance, store, "hll_delete_vm")?,
        })
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<HostState>,
    name: &'static str,
) -> Result<TypedFunc<P, R>, Error>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_func(&mut *store, name)
        .ok_or(Error::MissingExport(name))?
        .typed::<P, R>(&*store)
        .map_err(Error::WasmModule)
}

/// The interpreter entry points bound to a wasmtime instance.
///
/// A trap inside any foreign call poisons the instance: its handles are
/// abandoned and a fresh instance is created right away, with whatever its
/// `_initialize` prints discarded. If that fails, the next
/// [`ForeignVm::make_vm`] tries again.
pub struct WasmBindings {
    engine: Engine,
    module: Module,
    linker: Linker<HostState>,
    sink: Arc<dyn OutputSink>,
    store: Store<HostState>,
    exports: Exports,
    /// Handles issued by the current instance and not yet deleted.
    live: HashSet<i32>,
    poisoned: bool,
}

impl std::fmt::Debug for WasmBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmBindings")
            .field("engine", &"<wasmtime::Engine>")
            .field("module", &"<wasmtime::Module>")
            .field("live", &self.live.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl WasmBindings {
    /// Compile and instantiate a module from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the module fails to compile, lacks a required
    /// export, or traps during initialization.
    pub async fn from_binary(
        wasm_bytes: &[u8],
        output: Arc<dyn OutputSink>,
    ) -> Result<Self, Error> {
        let (engine, module) = Self::compile(wasm_bytes)?;
        Self::instantiate(engine, module, output).await
    }

    fn compile(wasm_bytes: &[u8]) -> Result<(Engine, Module), Error> {
        let engine = Self::create_engine()?;
        let module = Module::new(&engine, wasm_bytes).map_err(Error::WasmModule)?;
        Ok((engine, module))
    }

    fn create_engine() -> Result<Engine, Error> {
        let mut config = Config::new();
        config.async_support(true);
        Engine::new(&config).map_err(|e| Error::WasmEngine(e.to_string()))
    }

    fn create_linker(engine: &Engine, module: &Module) -> Result<Linker<HostState>, Error> {
        let mut linker = Linker::<HostState>::new(engine);

        p1::add_to_linker_async(&mut linker, |state: &mut HostState| &mut state.wasi)
            .map_err(|e| Error::WasmEngine(format!("Failed to add WASI to linker: {e}")))?;

        // Non-WASI imports have no host side; they trap if called.
        linker
            .define_unknown_imports_as_traps(module)
            .map_err(Error::WasmModule)?;

        Ok(linker)
    }

    async fn instantiate(
        engine: Engine,
        module: Module,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, Error> {
        let linker = Self::create_linker(&engine, &module)?;
        let (store, exports) = Self::new_instance(&engine, &module, &linker, &sink, false).await?;

        Ok(Self {
            engine,
            module,
            linker,
            sink,
            store,
            exports,
            live: HashSet::new(),
            poisoned: false,
        })
    }

    /// Instantiate and run `_initialize`. With `quiet`, its output is dropped.
    async fn new_instance(
        engine: &Engine,
        module: &Module,
        linker: &Linker<HostState>,
        sink: &Arc<dyn OutputSink>,
        quiet: bool,
    ) -> Result<(Store<HostState>, Exports), Error> {
        let mut store = Store::new(engine, HostState::new(sink));
        store.data().set_muted(quiet);

        let instance = linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(Error::WasmModule)?;

        if let Some(init) = instance.get_func(&mut store, "_initialize") {
            let init = init.typed::<(), ()>(&store).map_err(Error::WasmModule)?;
            let result = init.call_async(&mut store, ()).await;
            store.data().flush();
            result.map_err(|e| Error::Initialization(format!("`_initialize` trapped: {e}")))?;
        }
        store.data().set_muted(false);

        let exports = Exports::resolve(&instance, &mut store)?;
        Ok((store, exports))
    }

    /// Replace a poisoned instance with a fresh one.
    async fn recover(&mut self) -> Result<(), Error> {
        if !self.poisoned {
            return Ok(());
        }

        tracing::info!("re-instantiating hololisp module after trap");
        let (store, exports) =
            Self::new_instance(&self.engine, &self.module, &self.linker, &self.sink, true).await?;
        self.store = store;
        self.exports = exports;
        self.live.clear();
        self.poisoned = false;
        Ok(())
    }

    /// Flush buffered output and turn a wasmtime failure into a trap error.
    ///
    /// After a trap the instance is replaced before returning.
    async fn settle<R>(
        &mut self,
        symbol: &'static str,
        result: wasmtime::Result<R>,
    ) -> Result<R, Error> {
        self.store.data().flush();
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                self.poisoned = true;
                tracing::warn!(symbol, %error, "hololisp module trapped");
                if let Err(recovery) = self.recover().await {
                    tracing::warn!(error = %recovery, "re-instantiation failed, retrying on next run");
                }
                Err(Error::Trap {
                    symbol,
                    message: error.to_string(),
                })
            }
        }
    }

    fn poisoned_error(symbol: &'static str) -> Error {
        Error::Trap {
            symbol,
            message: "the instance was discarded after an earlier trap".to_string(),
        }
    }

    /// Copy `text` into linear memory as a NUL-terminated string.
    async fn alloc_cstr(&mut self, text: &str) -> Result<i32, Error> {
        let size = i32::try_from(text.len() + 1)
            .map_err(|_| Error::Memory(format!("{} byte string exceeds linear memory", text.len())))?;

        let result = self.exports.malloc.call_async(&mut self.store, size).await;
        let ptr = self.settle("malloc", result).await?;
        if ptr == 0 {
            return Err(Error::Memory(format!("malloc({size}) returned NULL")));
        }

        let offset = ptr.cast_unsigned() as usize;
        let written = self
            .exports
            .memory
            .write(&mut self.store, offset, text.as_bytes())
            .and_then(|()| {
                self.exports
                    .memory
                    .write(&mut self.store, offset + text.len(), &[0])
            });

        if let Err(error) = written {
            self.release_cstr(ptr).await?;
            return Err(Error::Memory(error.to_string()));
        }

        Ok(ptr)
    }

    async fn release_cstr(&mut self, ptr: i32) -> Result<(), Error> {
        let result = self.exports.free.call_async(&mut self.store, ptr).await;
        self.settle("free", result).await
    }
}

#[async_trait]
impl ForeignVm for WasmBindings {
    async fn make_vm(&mut self, flags: i32) -> Result<RawHandle, Error> {
        self.recover().await?;

        let result = self.exports.make_vm.call_async(&mut self.store, flags).await;
        let handle = self.settle("hll_make_vm", result).await?;
        if handle == 0 {
            return Err(Error::Memory("hll_make_vm returned NULL".to_string()));
        }
        self.live.insert(handle);
        Ok(RawHandle(handle))
    }

    async fn interpret(
        &mut self,
        vm: RawHandle,
        source: &str,
        label: &str,
        flags: InterpretFlags,
    ) -> Result<i32, Error> {
        if self.poisoned || !self.live.contains(&vm.0) {
            return Err(Self::poisoned_error("hll_interpret"));
        }

        let source_ptr = self.alloc_cstr(source).await?;
        let label_ptr = match self.alloc_cstr(label).await {
            Ok(ptr) => ptr,
            Err(error @ Error::Trap { .. }) => return Err(error),
            Err(error) => {
                self.release_cstr(source_ptr).await?;
                return Err(error);
            }
        };

        let params = (vm.0, source_ptr, label_ptr, flags.bits().cast_signed());
        let result = self.exports.interpret.call_async(&mut self.store, params).await;
        let status = self.settle("hll_interpret", result).await?;

        self.release_cstr(label_ptr).await?;
        self.release_cstr(source_ptr).await?;
        Ok(status)
    }

    async fn delete_vm(&mut self, vm: RawHandle) -> Result<(), Error> {
        if self.poisoned || !self.live.remove(&vm.0) {
            // The handle died with a trapped instance.
            tracing::debug!(%vm, "skipping delete of abandoned handle");
            return Ok(());
        }

        let result = self.exports.delete_vm.call_async(&mut self.store, vm.0).await;
        self.settle("hll_delete_vm", result).await
    }
}
