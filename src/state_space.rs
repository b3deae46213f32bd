//! Abstract states per program point.

use std::collections::BTreeMap;

use log::debug;

use crate::address::Address;
use crate::callstring::{CallString, ProgramCtx};
use crate::flows::FlowKind;
use crate::root::RootDomain;
use crate::warnings::WarningsMap;

/// The abstract state of every reached program point, with the warnings raised there.
#[derive(Debug, Clone)]
pub struct StateSpace<D> {
    states: BTreeMap<ProgramCtx, D>,
    warnings: WarningsMap,
    iterations: BTreeMap<ProgramCtx, usize>,
}

impl<D> Default for StateSpace<D> {
    fn default() -> Self {
        StateSpace {
            states: BTreeMap::new(),
            warnings: WarningsMap::new(),
            iterations: BTreeMap::new(),
        }
    }
}

/// Whether an edge closes a loop within one procedure: a local edge that does not
/// lead forward. Edges between the statements of one instruction compare by their
/// full address.
pub fn is_back_edge(from: &ProgramCtx, kind: FlowKind, to: &ProgramCtx) -> bool {
    kind.is_local() && from.address >= to.address
}

impl<D: RootDomain> StateSpace<D> {
    pub fn new() -> Self {
        StateSpace::default()
    }

    /// Binds the entry point.
    pub fn seed(&mut self, ctx: &ProgramCtx, state: D) {
        self.warnings.add(ctx, state.warnings().iter().cloned());
        self.states.insert(ctx.clone(), state.without_warnings());
    }

    /// Merges `state`, reached from `from` over an edge of `kind`, into the state of
    /// `to`. Returns whether the state of `to` grew.
    ///
    /// Widening is applied on loop edges when `use_widening` is set, joins otherwise.
    /// Warnings carried by `state` are recorded at `from`, where they were raised.
    pub fn update(&mut self, from: &ProgramCtx, kind: FlowKind, to: &ProgramCtx, state: D, use_widening: bool) -> bool {
        self.warnings.add(from, state.warnings().iter().cloned());
        let state = state.without_warnings();
        *self.iterations.entry(to.clone()).or_default() += 1;
        let Some(old) = self.states.get(to) else {
            debug!("update {}: bound", to);
            self.states.insert(to.clone(), state);
            return true;
        };
        let widen = use_widening && is_back_edge(from, kind, to);
        let merged = if widen { old.widen(&state) } else { old.join(&state) };
        let changed = !merged.subset_or_equal(old);
        debug!(
            "update {} from {} ({}): {}{}",
            to,
            from,
            kind,
            if widen { "widen" } else { "join" },
            if changed { ", changed" } else { "" }
        );
        if changed {
            self.states.insert(to.clone(), merged);
        }
        changed
    }

    pub fn get(&self, ctx: &ProgramCtx) -> Option<&D> {
        self.states.get(ctx)
    }

    pub fn get_at(&self, call_string: &CallString, address: Address) -> Option<&D> {
        self.states.get(&ProgramCtx::new(call_string.clone(), address))
    }

    /// The join over all call strings of the states at `address`.
    pub fn get_any(&self, address: Address) -> Option<D> {
        self.states
            .iter()
            .filter(|(ctx, _)| ctx.address == address)
            .map(|(_, s)| s.clone())
            .reduce(|a, b| a.join(&b))
    }

    pub fn contains(&self, ctx: &ProgramCtx) -> bool {
        self.states.contains_key(ctx)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProgramCtx, &D)> {
        self.states.iter()
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ProgramCtx> {
        self.states.keys()
    }

    pub fn warnings(&self) -> &WarningsMap {
        &self.warnings
    }

    pub fn warnings_mut(&mut self) -> &mut WarningsMap {
        &mut self.warnings
    }

    /// How often the state of `ctx` was updated.
    pub fn iterations(&self, ctx: &ProgramCtx) -> usize {
        self.iterations.get(ctx).copied().unwrap_or(0)
    }

    pub fn max_iterations(&self) -> usize {
        self.iterations.values().copied().max().unwrap_or(0)
    }
}
