//! Collaborators the analysis can be configured with.
//!
//! None of them is required. Without a [`Platform`] the instruction pointer is not
//! tracked, without an [`Abi`] no start canary is written, and without a
//! [`SystemModel`] native calls are fatal.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::callstring::ProgramCtx;
use crate::flows::{FlowKind, Flows};
use crate::rreil::{Rval, Rvar, Stmt};

/// Architecture facts needed by the engine.
pub trait Platform<D> {
    fn instruction_pointer(&self) -> Rvar;

    /// Initial register values at the start address.
    fn bootstrap(&self, state: D, _start: u64) -> D {
        state
    }
}

/// Calling convention hooks.
pub trait Abi<D> {
    /// Writes `canary` where the entry procedure will find its return address.
    fn write_start_canary(&self, entry: u64, canary: u64, state: D) -> D;
}

/// A model of a native function, lowered to RREIL.
///
/// Statements are addressed within the definition. Evaluation starts at `entry` and
/// leaves the definition when control reaches an address it does not contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub name: String,
    pub entry: Address,
    pub stmts: BTreeMap<Address, Stmt>,
}

impl FunctionDefinition {
    /// Builds a straight-line definition starting at `Address::ZERO`.
    pub fn sequence(name: &str, stmts: Vec<Stmt>) -> Self {
        FunctionDefinition {
            name: name.to_string(),
            entry: Address::ZERO,
            stmts: stmts
                .into_iter()
                .enumerate()
                .map(|(i, s)| (Address::new(0, i as u16), s))
                .collect(),
        }
    }

    pub fn get(&self, address: Address) -> Option<&Stmt> {
        self.stmts.get(&address)
    }
}

/// Maps native calls to function definitions.
pub trait SystemModel<D> {
    /// Definitions that may run for this call. Several definitions mean several
    /// possible behaviors whose results are joined; none means the call does not
    /// return.
    fn resolve(&self, name: &str, outs: &[Rvar], ins: &[Rval], state: &D) -> Vec<FunctionDefinition>;
}

/// Hooks that may take over specific branch targets.
pub trait Callbacks<D> {
    /// Returns the successors for a branch of `kind` to `target`, or `None` to let the
    /// engine handle it.
    fn try_callback(&self, kind: FlowKind, target: u64, state: &D, ctx: &ProgramCtx) -> Option<Flows<D>>;
}

/// Passive observer of the analysis progress.
pub trait Observer<D> {
    fn evaluating(&mut self, _ctx: &ProgramCtx, _stmt: &Stmt, _state: &D) {}

    fn successor(&mut self, _from: &ProgramCtx, _kind: FlowKind, _to: &ProgramCtx, _changed: bool) {}
}

/// The collaborators of one analysis.
pub struct Environment<D> {
    pub platform: Option<Box<dyn Platform<D>>>,
    pub abi: Option<Box<dyn Abi<D>>>,
    pub system_model: Option<Box<dyn SystemModel<D>>>,
    pub callbacks: Vec<Box<dyn Callbacks<D>>>,
    pub observers: Vec<Box<dyn Observer<D>>>,
}

impl<D> Default for Environment<D> {
    fn default() -> Self {
        Environment {
            platform: None,
            abi: None,
            system_model: None,
            callbacks: Vec::new(),
            observers: Vec::new(),
        }
    }
}

impl<D> Environment<D> {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_platform(mut self, platform: impl Platform<D> + 'static) -> Self {
        self.platform = Some(Box::new(platform));
        self
    }

    pub fn with_abi(mut self, abi: impl Abi<D> + 'static) -> Self {
        self.abi = Some(Box::new(abi));
        self
    }

    pub fn with_system_model(mut self, model: impl SystemModel<D> + 'static) -> Self {
        self.system_model = Some(Box::new(model));
        self
    }

    pub fn with_callbacks(mut self, callbacks: impl Callbacks<D> + 'static) -> Self {
        self.callbacks.push(Box::new(callbacks));
        self
    }

    pub fn with_observer(mut self, observer: impl Observer<D> + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn instruction_pointer(&self) -> Option<Rvar> {
        self.platform.as_ref().map(|p| p.instruction_pointer())
    }

    /// The first callback that claims the target.
    pub fn try_callbacks(&self, kind: FlowKind, target: u64, state: &D, ctx: &ProgramCtx) -> Option<Flows<D>> {
        self.callbacks
            .iter()
            .find_map(|c| c.try_callback(kind, target, state, ctx))
    }

    pub fn notify_evaluating(&mut self, ctx: &ProgramCtx, stmt: &Stmt, state: &D) {
        for o in self.observers.iter_mut() {
            o.evaluating(ctx, stmt, state);
        }
    }

    pub fn notify_successor(&mut self, from: &ProgramCtx, kind: FlowKind, to: &ProgramCtx, changed: bool) {
        for o in self.observers.iter_mut() {
            o.successor(from, kind, to, changed);
        }
    }
}
