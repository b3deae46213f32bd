//! Shared machinery for domains layered on top of a child domain.
//!
//! A functor domain pairs its own state with a child state. Before a binary operation
//! both operands are reconciled: the functor computes a common state of its own and
//! adjusts both children so that they describe the same variables. The binary
//! operation then only has to be delegated to the reconciled children.

use std::fmt::Debug;

use super::{Domain, SynthChannel};
use crate::expr::VarSet;

/// What a reconciliation prepares for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Reconcile {
    Join,
    Widen,
    /// Ordering test: the common state is the one of the right operand.
    Subset,
}

/// Result of reconciling two functor states.
#[derive(Debug, Clone)]
pub struct Compatible<S, C> {
    pub state: S,
    pub fst: C,
    pub snd: C,
}

pub trait Functor: Domain {
    type State: Clone + Debug;
    type Child: Domain;

    fn build(state: Self::State, child: Self::Child) -> Self;

    fn state(&self) -> &Self::State;

    fn child(&self) -> &Self::Child;

    /// Computes the common own state and the two children rewritten for it.
    fn reconcile(&self, other: &Self, purpose: Reconcile) -> Compatible<Self::State, Self::Child>;

    /// Whether the own state of `self` implies the own state of `other`.
    fn state_subset_or_equal(&self, other: &Self) -> bool;

    /// Variables private to this layer, never reported to the layers above.
    fn local_vars(&self) -> VarSet {
        VarSet::new()
    }
}

pub fn join<F: Functor>(fst: &F, snd: &F) -> F {
    let c = fst.reconcile(snd, Reconcile::Join);
    F::build(c.state, c.fst.join(&c.snd))
}

pub fn widen<F: Functor>(fst: &F, snd: &F) -> F {
    let c = fst.reconcile(snd, Reconcile::Widen);
    F::build(c.state, c.fst.widen(&c.snd))
}

pub fn subset_or_equal<F: Functor>(fst: &F, snd: &F) -> bool {
    if !fst.state_subset_or_equal(snd) {
        return false;
    }
    let c = fst.reconcile(snd, Reconcile::Subset);
    c.fst.subset_or_equal(&c.snd)
}

pub fn make_compatible<F: Functor>(fst: &F, snd: &F, is_widening_point: bool) -> (F, F) {
    let purpose = if is_widening_point {
        Reconcile::Widen
    } else {
        Reconcile::Join
    };
    let c = fst.reconcile(snd, purpose);
    (F::build(c.state.clone(), c.fst), F::build(c.state, c.snd))
}

/// The child's channel without the variables private to this layer.
pub fn synth_channel<F: Functor>(f: &F) -> SynthChannel {
    let mut channel = f.child().synth_channel();
    channel.remove_vars(&f.local_vars());
    channel
}
