//! The abstract domain contract.
//!
//! Every domain, whether a leaf or a layer stacked on top of a child, implements
//! [`Domain`]. Layers are plain generic types (`Affine<C>` wraps any `C: Domain`), so a
//! domain stack is assembled at compile time. Facts that a layer discovers are
//! returned through [`SynthChannel`] values rather than by mutating shared state.
//!
//! States are values: every operation returns a new state and leaves `self` intact.

use std::fmt::Debug;

use num_bigint::BigInt;

use crate::error::Infeasible;
use crate::expr::{Assign, FoldMap, Linear, NumVar, Test, Type, VarSet};
use crate::range::Range;

pub mod channel;
pub mod functor;
#[cfg(test)]
pub mod testing;

pub use channel::{SetOfEquations, SynthChannel};
pub use functor::{Compatible, Functor, Reconcile};

/// Abstract domain interface.
///
/// # Lattice Properties
///
/// - `a ⊑ a ⊔ b` and `b ⊑ a ⊔ b`
/// - `a ⊑ a ∇ b` and `b ⊑ a ∇ b`
/// - every chain `s0, s0 ∇ s1, (s0 ∇ s1) ∇ s2, ...` stabilizes after finitely many steps
pub trait Domain: Clone + Debug + Sized {
    /// Applies an assignment. Assigning to a variable that is not tracked introduces it.
    ///
    /// Fails with [`Infeasible`] only if the assignment reveals that the state was
    /// already empty.
    fn eval(&self, stmt: &Assign) -> Result<Self, Infeasible>;

    /// Restricts the state to the values satisfying `test`.
    ///
    /// Fails with [`Infeasible`] if no value does, which means the path is dead.
    fn eval_test(&self, test: &Test) -> Result<Self, Infeasible>;

    fn join(&self, other: &Self) -> Self;

    fn widen(&self, other: &Self) -> Self;

    /// Lattice order: `self` describes no more states than `other`.
    fn subset_or_equal(&self, other: &Self) -> bool;

    /// Starts tracking `var`, unconstrained or fixed to `value`.
    fn introduce(&self, var: &NumVar, ty: Type, value: Option<&BigInt>) -> Self;

    /// Stops tracking `vars`.
    fn project(&self, vars: &VarSet) -> Self;

    /// Renames `x` to the fresh variable `y`.
    fn substitute(&self, x: &NumVar, y: &NumVar) -> Self;

    /// For each `(permanent, ephemeral)` pair, adds `ephemeral` as a copy of `permanent`
    /// that has the same constraints but can take values independently.
    fn expand(&self, pairs: &FoldMap) -> Result<Self, Infeasible>;

    /// Inverse of [`Domain::expand`]: merges each `ephemeral` into its `permanent` and
    /// drops the ephemeral variables.
    fn fold(&self, pairs: &FoldMap) -> Self;

    fn query_range(&self, expr: &Linear) -> Range;

    /// Equalities known to hold for `var`.
    fn query_equalities(&self, var: &NumVar) -> SetOfEquations;

    /// Facts discovered by the operation that produced this state.
    fn synth_channel(&self) -> SynthChannel;

    /// Brings two states onto the same set of tracked variables and equalities.
    fn make_compatible(&self, other: &Self, _is_widening_point: bool) -> (Self, Self) {
        (self.clone(), other.clone())
    }
}
