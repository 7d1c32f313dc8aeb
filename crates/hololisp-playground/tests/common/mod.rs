//! A tiny stand-in for the hololisp module, shared by the integration tests.
//!
//! `ToyVm` understands just enough Lisp to exercise the playground:
//! integers, `+`, `*`, `quote`, `define` and `print`. Each handle owns its own
//! global environment, exactly like a real interpreter instance.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hololisp_playground::{
    Error, ForeignVm, InterpretFlags, ModuleLoader, OutputLine, OutputSink, RawHandle,
};

/// What the toy interpreter saw, for assertions.
#[derive(Debug, Default)]
pub struct Ledger {
    /// Handles created so far.
    pub created: usize,
    /// Handles deleted so far.
    pub deleted: usize,
    /// `(source, label, flags)` of every interpret call.
    pub interpreted: Vec<(String, String, u32)>,
}

impl Ledger {
    pub fn live(&self) -> usize {
        self.created - self.deleted
    }
}

/// Loads a [`ToyVm`], or fails like a module that could not be fetched.
#[derive(Debug, Default)]
pub struct ToyLoader {
    pub fail: bool,
    pub ledger: Arc<Mutex<Ledger>>,
}

impl ToyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }
}

#[async_trait]
impl ModuleLoader for ToyLoader {
    type Bindings = ToyVm;

    async fn load(&self, output: Arc<dyn OutputSink>) -> Result<ToyVm, Error> {
        tokio::task::yield_now().await;
        if self.fail {
            return Err(Error::Initialization(
                "failed to fetch hololisp.wasm".to_string(),
            ));
        }
        Ok(ToyVm {
            sink: output,
            next: 0,
            envs: HashMap::new(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

pub struct ToyVm {
    sink: Arc<dyn OutputSink>,
    next: i32,
    envs: HashMap<i32, HashMap<String, Sexp>>,
    ledger: Arc<Mutex<Ledger>>,
}

#[async_trait]
impl ForeignVm for ToyVm {
    async fn make_vm(&mut self, _flags: i32) -> Result<RawHandle, Error> {
        self.next += 16;
        self.envs.insert(self.next, HashMap::new());
        self.ledger.lock().unwrap().created += 1;
        Ok(RawHandle(self.next))
    }

    async fn interpret(
        &mut self,
        vm: RawHandle,
        source: &str,
        label: &str,
        flags: InterpretFlags,
    ) -> Result<i32, Error> {
        self.ledger.lock().unwrap().interpreted.push((
            source.to_string(),
            label.to_string(),
            flags.bits(),
        ));

        let env = self.envs.get_mut(&vm.0).expect("interpret on deleted vm");
        let forms = match parse(source) {
            Ok(forms) => forms,
            Err(message) => {
                self.sink.on_line(OutputLine::stderr(format!("{label}: {message}")));
                return Ok(1);
            }
        };

        for form in &forms {
            if let Err(message) = eval(env, &*self.sink, form) {
                self.sink.on_line(OutputLine::stderr(format!("{label}: {message}")));
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn delete_vm(&mut self, vm: RawHandle) -> Result<(), Error> {
        assert!(self.envs.remove(&vm.0).is_some(), "double delete of {vm}");
        self.ledger.lock().unwrap().deleted += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Int(i64),
    Sym(String),
    List(Vec<Sexp>),
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Sym(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn parse(source: &str) -> Result<Vec<Sexp>, String> {
    let spaced = source
        .replace('(', " ( ")
        .replace(')', " ) ")
        .replace('\'', " ' ");
    let mut tokens = spaced.split_whitespace().peekable();
    let mut forms = Vec::new();
    while tokens.peek().is_some() {
        forms.push(read(&mut tokens)?);
    }
    Ok(forms)
}

fn read<'a>(tokens: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> Result<Sexp, String> {
    match tokens.next() {
        None => Err("unexpected end of input".to_string()),
        Some("(") => {
            let mut items = Vec::new();
            loop {
                match tokens.peek() {
                    None => return Err("missing )".to_string()),
                    Some(&")") => {
                        tokens.next();
                        return Ok(Sexp::List(items));
                    }
                    Some(_) => items.push(read(tokens)?),
                }
            }
        }
        Some(")") => Err("unexpected )".to_string()),
        Some("'") => Ok(Sexp::List(vec![Sexp::Sym("quote".to_string()), read(tokens)?])),
        Some(atom) => Ok(atom
            .parse::<i64>()
            .map_or_else(|_| Sexp::Sym(atom.to_string()), Sexp::Int)),
    }
}

fn eval(env: &mut HashMap<String, Sexp>, sink: &dyn OutputSink, form: &Sexp) -> Result<Sexp, String> {
    match form {
        Sexp::Int(_) => Ok(form.clone()),
        Sexp::Sym(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unbound symbol '{name}'")),
        Sexp::List(items) => match items.as_slice() {
            [] => Ok(Sexp::List(Vec::new())),
            [Sexp::Sym(op), Sexp::Sym(name), value] if op == "define" => {
                let value = eval(env, sink, value)?;
                env.insert(name.clone(), value);
                Ok(Sexp::Sym(name.clone()))
            }
            [Sexp::Sym(op), value] if op == "quote" => Ok(value.clone()),
            [Sexp::Sym(op), value] if op == "print" => {
                let value = eval(env, sink, value)?;
                sink.on_line(OutputLine::stdout(value.to_string()));
                Ok(value)
            }
            [Sexp::Sym(op), args @ ..] if op == "+" || op == "*" => {
                let mut acc = if op == "+" { 0 } else { 1 };
                for arg in args {
                    match eval(env, sink, arg)? {
                        Sexp::Int(n) if op == "+" => acc += n,
                        Sexp::Int(n) => acc *= n,
                        other => return Err(format!("'{op}' expects numbers, got {other}")),
                    }
                }
                Ok(Sexp::Int(acc))
            }
            [head, ..] => Err(format!("cannot call {head}")),
        },
    }
}
