//! Edges discovered by the analysis.

use std::collections::{BTreeMap, BTreeSet};

use crate::address::Address;
use crate::callstring::{CallString, ProgramCtx};
use crate::flows::FlowKind;

pub type Edge = (ProgramCtx, ProgramCtx);

/// Call, return and intra-procedural edges between program points.
#[derive(Debug, Clone, Default)]
pub struct TransitionSystem {
    call: BTreeSet<Edge>,
    ret: BTreeSet<Edge>,
    local: BTreeSet<Edge>,
    /// Procedure entry to the call sites that reach it.
    call_sites: BTreeMap<Address, BTreeSet<Address>>,
    /// Procedure entry to the call strings it was analyzed in.
    contexts: BTreeMap<Address, BTreeSet<CallString>>,
    /// Procedure entry to the addresses its calls fall through to.
    return_sites: BTreeMap<Address, BTreeSet<Address>>,
    /// Successor addresses regardless of call string.
    flat: BTreeMap<Address, BTreeSet<Address>>,
}

impl TransitionSystem {
    pub fn new() -> Self {
        TransitionSystem::default()
    }

    /// Records an edge. Halt and error successors have no target and are ignored.
    pub fn add(&mut self, kind: FlowKind, from: &ProgramCtx, to: &ProgramCtx) {
        if kind.has_target() {
            self.flat.entry(from.address).or_default().insert(to.address);
        }
        let edge = (from.clone(), to.clone());
        match kind {
            FlowKind::Call => {
                self.call_sites.entry(to.address).or_default().insert(from.address);
                self.contexts
                    .entry(to.address)
                    .or_default()
                    .insert(to.call_string.clone());
                self.call.insert(edge);
            }
            FlowKind::Return => {
                self.ret.insert(edge);
            }
            FlowKind::Next | FlowKind::Jump => {
                self.local.insert(edge);
            }
            FlowKind::Halt | FlowKind::Error => {}
        }
    }

    /// Records a call from `from` to the procedure entry `to` that returns to
    /// `fall_through`.
    pub fn add_call(&mut self, from: &ProgramCtx, to: &ProgramCtx, fall_through: Address) {
        self.return_sites.entry(to.address).or_default().insert(fall_through);
        self.add(FlowKind::Call, from, to);
    }

    /// Records the entry of the analysis as a procedure entry.
    pub fn add_entry(&mut self, entry: &ProgramCtx) {
        self.contexts
            .entry(entry.address)
            .or_default()
            .insert(entry.call_string.clone());
    }

    pub fn call(&self) -> &BTreeSet<Edge> {
        &self.call
    }

    pub fn ret(&self) -> &BTreeSet<Edge> {
        &self.ret
    }

    pub fn local(&self) -> &BTreeSet<Edge> {
        &self.local
    }

    pub fn procedures(&self) -> impl Iterator<Item = Address> + '_ {
        self.contexts.keys().copied()
    }

    pub fn call_sites(&self, entry: Address) -> impl Iterator<Item = Address> + '_ {
        self.call_sites.get(&entry).into_iter().flatten().copied()
    }

    pub fn contexts(&self, entry: Address) -> impl Iterator<Item = &CallString> + '_ {
        self.contexts.get(&entry).into_iter().flatten()
    }

    /// Where calls to the procedure at `entry` continue after it returns.
    pub fn return_sites(&self, entry: Address) -> impl Iterator<Item = Address> + '_ {
        self.return_sites.get(&entry).into_iter().flatten().copied()
    }

    /// Successor addresses of `address` over all call strings.
    pub fn flat_successors(&self, address: Address) -> impl Iterator<Item = Address> + '_ {
        self.flat.get(&address).into_iter().flatten().copied()
    }

    /// Local successors of `ctx`.
    pub fn successors<'a>(&'a self, ctx: &'a ProgramCtx) -> impl Iterator<Item = &'a ProgramCtx> + 'a {
        self.local
            .iter()
            .chain(self.call.iter())
            .chain(self.ret.iter())
            .filter(move |(from, _)| from == ctx)
            .map(|(_, to)| to)
    }
}
