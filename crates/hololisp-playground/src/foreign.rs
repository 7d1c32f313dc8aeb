//! The foreign interpreter boundary.
//!
//! hololisp exposes exactly three entry points. [`ForeignVm`] binds them with
//! their fixed signatures so that the adapter does not care whether they are
//! backed by a wasmtime instance or by something else entirely.

use std::fmt;

use async_trait::async_trait;

use crate::error::Error;

/// Flags passed to `hll_make_vm`. Zero selects the default configuration.
pub const MAKE_VM_FLAGS: i32 = 0;

/// Opaque interpreter handle returned by `hll_make_vm`.
///
/// Inside a WebAssembly module this is a pointer into linear memory, so it is
/// only meaningful to the bindings that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub i32);

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm@{:#x}", self.0)
    }
}

/// Trailing flag argument of `hll_interpret`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpretFlags(u32);

impl InterpretFlags {
    /// Print the value of the last top-level form, REPL style.
    pub const PRINT_RESULT: Self = Self(0x1);
    /// Colour diagnostics with ANSI escape codes.
    pub const COLORED: Self = Self(0x2);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Return `self` with `other` set or cleared.
    #[must_use]
    pub const fn with(self, other: Self, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | other.0)
        } else {
            Self(self.0 & !other.0)
        }
    }
}

/// The three foreign callables of the interpreter.
///
/// Output produced while any of these run is delivered through the
/// [`OutputSink`](crate::OutputSink) handed to the loader, never through return
/// values.
#[async_trait]
pub trait ForeignVm: Send {
    /// `hll_make_vm(flags) -> handle`: allocate a fresh interpreter.
    ///
    /// # Errors
    ///
    /// Returns an error if the foreign call fails (e.g. the module traps).
    async fn make_vm(&mut self, flags: i32) -> Result<RawHandle, Error>;

    /// `hll_interpret(handle, source, label, flags) -> status`: run `source`.
    ///
    /// `label` is only used by the interpreter when it reports diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the foreign call fails. Interpreter-level errors
    /// (syntax errors, unbound symbols, ...) are not errors here; they come back
    /// as output text and a non-zero status.
    async fn interpret(
        &mut self,
        vm: RawHandle,
        source: &str,
        label: &str,
        flags: InterpretFlags,
    ) -> Result<i32, Error>;

    /// `hll_delete_vm(handle)`: release every resource owned by `vm`.
    ///
    /// # Errors
    ///
    /// Returns an error if the foreign call fails.
    async fn delete_vm(&mut self, vm: RawHandle) -> Result<(), Error>;
}

#[async_trait]
impl<F: ForeignVm + ?Sized> ForeignVm for Box<F> {
    async fn make_vm(&mut self, flags: i32) -> Result<RawHandle, Error> {
        (**self).make_vm(flags).await
    }

    async fn interpret(
        &mut self,
        vm: RawHandle,
        source: &str,
        label: &str,
        flags: InterpretFlags,
    ) -> Result<i32, Error> {
        (**self).interpret(vm, source, label, flags).await
    }

    async fn delete_vm(&mut self, vm: RawHandle) -> Result<(), Error> {
        (**self).delete_vm(vm).await
    }
}
