//! Tests across the real wasmtime boundary.
//!
//! The module below mimics the shape of the hololisp build: it imports WASI
//! output functions, exports an allocator and the three `hll_*` entry points.
//! Like libc, it queries `fd_fdstat_get` before each write and traps if either
//! call reports an errno. Its `hll_interpret` echoes the source to stdout, writes the label to stderr
//! without a trailing newline, reports how many VMs are live and returns the
//! flags it was given. A source starting with `!` makes it trap.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use hololisp_playground::{
    Error, ExamplesMap, InterpretFlags, InterpretStatus, NullView, OutputLine, Playground,
    PlaygroundConfig, Stream, VmAdapter, WasmBindings, WasmModuleLoader,
};
use tokio::sync::mpsc;

const ECHO_MODULE: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_fdstat_get"
    (func $fd_fdstat_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "env" "unused_host_call" (func $unused))

  (memory (export "memory") 2)
  (global $heap (mut i32) (i32.const 4096))
  (global $live (mut i32) (i32.const 0))
  (global $next (mut i32) (i32.const 0))

  (data (i32.const 16) "\n")
  (data (i32.const 32) "live:")
  (data (i32.const 48) "booted\n")

  (func $malloc (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))

  (func (export "free") (param i32))

  (func $strlen (param $s i32) (result i32)
    (local $n i32)
    (block $done
      (loop $scan
        (br_if $done
          (i32.eqz (i32.load8_u (i32.add (local.get $s) (local.get $n)))))
        (local.set $n (i32.add (local.get $n) (i32.const 1)))
        (br $scan)))
    (local.get $n))

  (func $write (param $fd i32) (param $ptr i32) (param $len i32)
    (if (call $fd_fdstat_get (local.get $fd) (i32.const 128))
      (then unreachable))
    (i32.store (i32.const 64) (local.get $ptr))
    (i32.store (i32.const 68) (local.get $len))
    (if (call $fd_write (local.get $fd) (i32.const 64) (i32.const 1) (i32.const 72))
      (then unreachable)))

  (func (export "_initialize")
    (call $write (i32.const 1) (i32.const 48) (i32.const 7)))

  (func (export "hll_make_vm") (param i32) (result i32)
    (global.set $live (i32.add (global.get $live) (i32.const 1)))
    (global.set $next (i32.add (global.get $next) (i32.const 16)))
    (global.get $next))

  (func (export "hll_delete_vm") (param i32)
    (global.set $live (i32.sub (global.get $live) (i32.const 1))))

  (func (export "hll_interpret")
    (param $vm i32) (param $src i32) (param $name i32) (param $flags i32) (result i32)
    (call $write (i32.const 1) (local.get $src) (call $strlen (local.get $src)))
    (call $write (i32.const 1) (i32.const 16) (i32.const 1))
    (if (i32.eq (i32.load8_u (local.get $src)) (i32.const 33))
      (then unreachable))
    (call $write (i32.const 2) (local.get $name) (call $strlen (local.get $name)))
    (i32.store8 (i32.const 37) (i32.add (i32.const 48) (global.get $live)))
    (call $write (i32.const 1) (i32.const 32) (i32.const 6))
    (call $write (i32.const 1) (i32.const 16) (i32.const 1))
    (local.get $flags))
)
"#;

async fn bindings() -> (WasmBindings, mpsc::UnboundedReceiver<OutputLine>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let bindings = WasmBindings::from_binary(ECHO_MODULE.as_bytes(), Arc::new(tx))
        .await
        .unwrap();
    (bindings, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<OutputLine>) -> Vec<OutputLine> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

#[tokio::test]
async fn test_initialize_output_is_delivered() {
    let (_bindings, mut rx) = bindings().await;
    assert_eq!(drain(&mut rx), vec![OutputLine::stdout("booted")]);
}

#[tokio::test]
async fn test_stdio_supports_fdstat_before_write() {
    let (bindings, mut rx) = bindings().await;
    drain(&mut rx);
    let mut adapter = VmAdapter::new(bindings);

    // Any errno from fd_fdstat_get or fd_write would trap in the module.
    let outcome = adapter.interpret("(print (+ 1 2))").await.unwrap();

    assert!(outcome.status.is_ok());
    assert_eq!(drain(&mut rx)[0], OutputLine::stdout("(print (+ 1 2))"));
}

#[tokio::test]
async fn test_interpret_marshals_strings_and_output() {
    let (bindings, mut rx) = bindings().await;
    drain(&mut rx);
    let mut adapter = VmAdapter::new(bindings);

    let outcome = adapter.interpret("(print 1)\n(print 2)").await.unwrap();

    assert_eq!(outcome.status, InterpretStatus::Ok);
    assert_eq!(
        drain(&mut rx),
        vec![
            OutputLine::stdout("(print 1)"),
            OutputLine::stdout("(print 2)"),
            OutputLine::stdout("live:1"),
            // The label has no newline; it arrives when the call returns.
            OutputLine::stderr("wasm"),
        ]
    );
}

#[tokio::test]
async fn test_each_run_gets_its_own_vm() {
    let (bindings, mut rx) = bindings().await;
    drain(&mut rx);
    let mut adapter = VmAdapter::new(bindings);

    for _ in 0..3 {
        adapter.interpret("(run)").await.unwrap();
        let lines = drain(&mut rx);
        assert!(lines.contains(&OutputLine::stdout("live:1")), "{lines:?}");
    }
    assert_eq!(adapter.runs(), 3);
}

#[tokio::test]
async fn test_flags_and_label_reach_the_module() {
    let (bindings, mut rx) = bindings().await;
    drain(&mut rx);
    let mut adapter = VmAdapter::new(bindings)
        .with_label("repl")
        .with_flags(InterpretFlags::COLORED);

    let outcome = adapter.interpret("(x)").await.unwrap();

    assert_eq!(outcome.status, InterpretStatus::Failed(2));
    let stderr: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|line| line.stream == Stream::Stderr)
        .collect();
    assert_eq!(stderr, vec![OutputLine::stderr("repl")]);
}

#[tokio::test]
async fn test_trap_replaces_instance_quietly() {
    let (bindings, mut rx) = bindings().await;
    drain(&mut rx);
    let mut adapter = VmAdapter::new(bindings);

    let err = adapter.interpret("!boom").await.unwrap_err();
    assert!(
        matches!(err, Error::Trap { symbol: "hll_interpret", .. }),
        "got {err}"
    );
    // Output written before the trap is still delivered; the replacement
    // instance's boot banner is not.
    assert_eq!(drain(&mut rx), vec![OutputLine::stdout("!boom")]);

    adapter.interpret("(after)").await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![
            OutputLine::stdout("(after)"),
            OutputLine::stdout("live:1"),
            OutputLine::stderr("wasm"),
        ]
    );
}

#[tokio::test]
async fn test_playground_over_wasm() {
    let loader = WasmModuleLoader::from_bytes(ECHO_MODULE);
    let examples = ExamplesMap::new([("hello world", "(print 'hi)")]);
    let mut playground: Playground<WasmBindings, NullView> =
        Playground::new(examples, PlaygroundConfig::default(), NullView);

    playground.initialize(&loader).await.unwrap();
    assert_eq!(playground.output().text(), "booted\n");
    assert_eq!(playground.editor(), "(print 'hi)");

    let report = playground.run().await.unwrap();

    assert!(report.status.is_ok());
    assert_eq!(playground.output().text(), "(print 'hi)\nlive:1\nwasm\n");
    assert_eq!(report.lines, 3);
}

#[tokio::test]
async fn test_playground_reports_trap_on_output() {
    let loader = WasmModuleLoader::from_bytes(ECHO_MODULE);
    let mut playground: Playground<WasmBindings, NullView> =
        Playground::new(ExamplesMap::bundled(), PlaygroundConfig::default(), NullView);
    playground.initialize(&loader).await.unwrap();

    playground.set_editor("!crash");
    let err = playground.run().await.unwrap_err();
    assert!(matches!(err, Error::Trap { .. }));

    let lines = playground.output().lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert_eq!(lines[0], OutputLine::stdout("!crash"));
    assert!(lines[1].is_error());

    // Still usable afterwards.
    playground.set_editor("(ok)");
    assert!(playground.run().await.unwrap().status.is_ok());
}

#[tokio::test]
async fn test_missing_module_file() {
    let loader = WasmModuleLoader::from_file("/nonexistent/hololisp.wasm");
    let mut playground: Playground<WasmBindings, NullView> =
        Playground::new(ExamplesMap::bundled(), PlaygroundConfig::default(), NullView);

    let err = playground.initialize(&loader).await.unwrap_err();

    assert!(matches!(err, Error::Io { .. }), "got {err}");
    assert!(!playground.is_ready());
    assert!(matches!(playground.run().await, Err(Error::NotReady)));
}
