//! VM lifecycle adapter.
//!
//! The adapter is the only component that talks to the foreign boundary. It
//! uses a per-call policy: every [`VmAdapter::interpret`] creates a fresh
//! interpreter, runs the source against it and deletes it again. Nothing
//! defined by one run is visible to the next.

use std::time::{Duration, Instant};

use crate::error::Error;
use crate::foreign::{ForeignVm, InterpretFlags, MAKE_VM_FLAGS, RawHandle};

/// Label passed to `hll_interpret`; the interpreter prefixes diagnostics with it.
pub const DEFAULT_LABEL: &str = "wasm";

/// Decoded return value of `hll_interpret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretStatus {
    /// The program ran to completion.
    Ok,
    /// The interpreter reported an error; details were written to stderr.
    Failed(i32),
}

impl InterpretStatus {
    /// Decode a raw status code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            code => Self::Failed(code),
        }
    }

    /// Whether the run succeeded.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Result of a single [`VmAdapter::interpret`] call.
#[derive(Debug, Clone, Copy)]
pub struct InterpretOutcome {
    /// Status reported by the interpreter.
    pub status: InterpretStatus,
    /// Wall-clock time spent in the foreign calls, VM creation included.
    pub duration: Duration,
}

/// Mediates every interaction with the foreign interpreter.
pub struct VmAdapter<F> {
    foreign: F,
    label: String,
    flags: InterpretFlags,
    runs: u64,
}

impl<F> std::fmt::Debug for VmAdapter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmAdapter")
            .field("label", &self.label)
            .field("flags", &self.flags)
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}

impl<F: ForeignVm> VmAdapter<F> {
    /// Wrap bound foreign callables with the default label and flags.
    #[must_use]
    pub fn new(foreign: F) -> Self {
        Self {
            foreign,
            label: DEFAULT_LABEL.to_string(),
            flags: InterpretFlags::default(),
            runs: 0,
        }
    }

    /// Set the diagnostic label passed to the interpreter.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the flags passed to the interpreter.
    #[must_use]
    pub const fn with_flags(mut self, flags: InterpretFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The interpret flags.
    #[must_use]
    pub const fn flags(&self) -> InterpretFlags {
        self.flags
    }

    /// Number of completed `interpret` calls.
    #[must_use]
    pub const fn runs(&self) -> u64 {
        self.runs
    }

    /// Run `source` in a fresh interpreter.
    ///
    /// The source is forwarded untouched. Output is delivered to the sink that
    /// was registered when the bindings were loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if a foreign call fails. The interpreter created for
    /// this call is released either way.
    pub async fn interpret(&mut self, source: &str) -> Result<InterpretOutcome, Error> {
        let start = Instant::now();

        let mut vm = ScopedVm::create(&mut self.foreign).await?;
        tracing::debug!(
            vm = %vm.handle(),
            source_len = source.len(),
            label = %self.label,
            "interpreting source"
        );

        let result = vm.interpret(source, &self.label, self.flags).await;
        let released = vm.release().await;
        let code = result?;
        released?;

        self.runs += 1;
        let outcome = InterpretOutcome {
            status: InterpretStatus::from_code(code),
            duration: start.elapsed(),
        };
        tracing::debug!(status = ?outcome.status, duration = ?outcome.duration, "interpret finished");
        Ok(outcome)
    }

    /// Give the bound callables back.
    pub fn into_inner(self) -> F {
        self.foreign
    }
}

/// A live interpreter handle, consumed by [`ScopedVm::release`].
///
/// The handle never leaves this type, so it cannot be used after deletion.
/// Deletion is a foreign call and cannot run in `Drop`; dropping an unreleased
/// handle (a cancelled run) is logged.
struct ScopedVm<'a, F: ForeignVm> {
    foreign: &'a mut F,
    handle: RawHandle,
    live: bool,
}

impl<'a, F: ForeignVm> ScopedVm<'a, F> {
    async fn create(foreign: &'a mut F) -> Result<Self, Error> {
        let handle = foreign.make_vm(MAKE_VM_FLAGS).await?;
        Ok(Self {
            foreign,
            handle,
            live: true,
        })
    }

    const fn handle(&self) -> RawHandle {
        self.handle
    }

    async fn interpret(
        &mut self,
        source: &str,
        label: &str,
        flags: InterpretFlags,
    ) -> Result<i32, Error> {
        self.foreign.interpret(self.handle, source, label, flags).await
    }

    async fn release(mut self) -> Result<(), Error> {
        self.live = false;
        self.foreign.delete_vm(self.handle).await
    }
}

impl<F: ForeignVm> Drop for ScopedVm<'_, F> {
    fn drop(&mut self) {
        if self.live {
            tracing::warn!(vm = %self.handle, "interpreter dropped without release");
        }
    }
}
