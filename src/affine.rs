//! Affine equality domain.
//!
//! [`Affine`] tracks equalities `key = sum(c_i * p_i) + c` between variables and
//! forwards everything else to its child domain. Key variables are defined by their
//! equation and are not known to the child; the child only ever sees parameters.
//! Expressions are rewritten over parameters before they are handed down.
//!
//! Before a join, widening or ordering test, both operands are brought onto a common
//! equation system (their affine hull), and each child is rewritten for the key
//! variables of that system: keys that stop being keys are assigned their value in
//! the child, new keys are removed from it.

use log::debug;
use num_bigint::BigInt;
use num_traits::Signed;

use crate::domain::functor::{self, Compatible, Functor, Reconcile};
use crate::domain::{Domain, SetOfEquations, SynthChannel};
use crate::error::Infeasible;
use crate::expr::{Assign, FoldMap, Linear, NumVar, Rhs, Test, TestOp, Type, VarSet};
use crate::range::Range;

pub mod equations;
pub mod hull;

pub use equations::{Equations, Insertion};

#[derive(Debug, Clone)]
pub struct Affine<C> {
    eqs: Equations,
    child: C,
    channel: SynthChannel,
}

impl<C: Domain> Affine<C> {
    pub fn new(child: C) -> Self {
        Affine {
            eqs: Equations::new(),
            child,
            channel: SynthChannel::new(),
        }
    }

    pub fn equations(&self) -> &Equations {
        &self.eqs
    }

    fn with(eqs: Equations, child: C, channel: SynthChannel) -> Self {
        Affine { eqs, child, channel }
    }
}

/// Turns `key` back into a parameter: its value is assigned in the child.
fn demote<C: Domain>(eqs: &mut Equations, child: &C, key: &NumVar) -> Result<C, Infeasible> {
    let Some(def) = eqs.definition(key) else {
        return Ok(child.clone());
    };
    eqs.remove_row(key);
    child.eval(&Assign::linear(key.clone(), def))
}

/// [`demote`] for operations that cannot fail. A child that turns out empty keeps no
/// value for `key`, which leaves it unconstrained.
fn demote_total<C: Domain>(eqs: &mut Equations, child: C, key: &NumVar) -> C {
    match demote(eqs, &child, key) {
        Ok(demoted) => demoted,
        Err(Infeasible) => {
            debug!("demote: child is empty, {} left unconstrained", key);
            child
        }
    }
}

/// Removes the parameter `var` from all rows while keeping the relations it induces
/// between the other variables, as far as a unit coefficient allows.
fn eliminate<C: Domain>(eqs: &mut Equations, mut child: C, var: &NumVar) -> C {
    let users = eqs.users(var);
    if users.is_empty() {
        return child;
    }
    let pivot = users.iter().find(|k| {
        eqs.row(k)
            .map(|row| row.coefficient(var).abs() == BigInt::from(1))
            .unwrap_or(false)
    });
    let Some(pivot) = pivot.cloned() else {
        for key in &users {
            child = demote_total(eqs, child, key);
        }
        return child;
    };
    let Some(row) = eqs.row(&pivot).cloned() else {
        return child;
    };
    child = demote_total(eqs, child, &pivot);
    // row: a * var + rest = 0 with a = ±1, so var = -a * rest
    let a = row.coefficient(var);
    let rest = row.sub(&Linear::term(a.clone(), var.clone()));
    let value = rest.scale(&-a);
    eqs.substitute_param(var, &value);
    child
}

/// Adds `equation` to the system. A variable that becomes a key leaves the child.
fn promote<C: Domain>(
    eqs: &mut Equations,
    child: C,
    equation: &Linear,
    channel: &mut SynthChannel,
) -> Result<C, Infeasible> {
    match eqs.insert(equation, None)? {
        Insertion::Inserted(key) => {
            channel.add_equality(equation.clone());
            Ok(child.project(&VarSet::from([key])))
        }
        Insertion::Redundant | Insertion::Dropped => Ok(child),
    }
}

/// Rewrites `child`, which lives beside `src`, for the key variables of `target`.
fn rekey<C: Domain>(src: &Equations, child: &C, target: &Equations) -> C {
    let mut child = child.clone();
    for key in src.keys() {
        if !target.is_key(key) {
            if let Some(def) = src.definition(key) {
                child = child.eval(&Assign::linear(key.clone(), def)).unwrap_or(child);
            }
        }
    }
    let new_keys: VarSet = target.keys().filter(|k| !src.is_key(k)).cloned().collect();
    if new_keys.is_empty() {
        child
    } else {
        child.project(&new_keys)
    }
}

impl<C: Domain> Affine<C> {
    /// Absorbs the equalities the child reported into the system.
    fn absorb_child_channel(mut eqs: Equations, child: C, mut channel: SynthChannel) -> Result<Self, Infeasible> {
        let reported = child.synth_channel();
        let mut child = child;
        for eq in reported.equalities.iter() {
            child = promote(&mut eqs, child, eq, &mut channel)?;
        }
        Ok(Affine::with(eqs, child, channel))
    }

    /// Forgets the current value of `var` in the system.
    fn forget(&self, var: &NumVar) -> (Equations, C) {
        let mut eqs = self.eqs.clone();
        let child = if eqs.is_key(var) {
            eqs.remove_row(var);
            self.child.clone()
        } else {
            eliminate(&mut eqs, self.child.clone(), var)
        };
        (eqs, child)
    }

    fn assign_linear(&self, lhs: &NumVar, rhs: &Linear) -> Result<Self, Infeasible> {
        let inlined = self.eqs.inline(rhs);
        let a = inlined.coefficient(lhs);
        if a.abs() == BigInt::from(1) {
            // invertible: lhs' = a * lhs + rest, so lhs = a * (lhs' - rest)
            let rest = inlined.sub(&Linear::term(a.clone(), lhs.clone()));
            let old = Linear::var(lhs.clone()).sub(&rest).scale(&a);
            let mut eqs = self.eqs.clone();
            eqs.substitute_param(lhs, &old);
            let child = self.child.eval(&Assign::linear(lhs.clone(), inlined))?;
            return Ok(Affine::with(eqs, child, SynthChannel::new()));
        }
        if inlined.contains(lhs) {
            let mut eqs = self.eqs.clone();
            let mut child = self.child.clone();
            for key in eqs.users(lhs) {
                child = demote(&mut eqs, &child, &key)?;
            }
            let child = child.eval(&Assign::linear(lhs.clone(), inlined))?;
            return Ok(Affine::with(eqs, child, SynthChannel::new()));
        }
        let (mut eqs, child) = self.forget(lhs);
        let child = child.project(&VarSet::from([lhs.clone()]));
        let equation = Linear::var(lhs.clone()).sub(&inlined);
        let mut channel = SynthChannel::new();
        let prefer = VarSet::from([lhs.clone()]);
        match eqs.insert(&equation, Some(&prefer)) {
            Ok(Insertion::Inserted(key)) if key == *lhs => {
                channel.add_equality(equation);
                Ok(Affine::with(eqs, child, channel))
            }
            // lhs was just removed from the system, so it is the key of its equation
            other => {
                debug!("assign: unexpected insertion {:?} for {}", other, equation);
                let (eqs, child) = self.forget(lhs);
                let child = child.eval(&Assign::linear(lhs.clone(), inlined))?;
                Ok(Affine::with(eqs, child, SynthChannel::new()))
            }
        }
    }
}

impl<C: Domain> Domain for Affine<C> {
    fn eval(&self, stmt: &Assign) -> Result<Self, Infeasible> {
        debug!("affine eval: {}", stmt);
        let Affine { eqs, child, channel } = match &stmt.rhs {
            Rhs::Linear(rhs) => self.assign_linear(&stmt.lhs, rhs)?,
            Rhs::Binary(op, a, b) => {
                let rhs = Rhs::Binary(*op, self.eqs.inline(a), self.eqs.inline(b));
                let (eqs, child) = self.forget(&stmt.lhs);
                let child = child.eval(&Assign {
                    lhs: stmt.lhs.clone(),
                    rhs,
                })?;
                Affine::with(eqs, child, SynthChannel::new())
            }
            Rhs::Range(range) => {
                let (eqs, child) = self.forget(&stmt.lhs);
                let child = child.eval(&Assign::range(stmt.lhs.clone(), range.clone()))?;
                Affine::with(eqs, child, SynthChannel::new())
            }
        };
        let state = Affine::absorb_child_channel(eqs, child, channel);
        if state.is_err() {
            debug!("affine eval: child reported inconsistent equalities");
        }
        state
    }

    fn eval_test(&self, test: &Test) -> Result<Self, Infeasible> {
        debug!("affine eval_test: {}", test);
        let expr = self.eqs.inline(&test.expr);
        if let Some(c) = expr.as_constant() {
            return if test.holds_for(c) {
                Ok(Affine::with(self.eqs.clone(), self.child.clone(), SynthChannel::new()))
            } else {
                Err(Infeasible)
            };
        }
        let child = self.child.eval_test(&Test::new(expr.clone(), test.op))?;
        let mut eqs = self.eqs.clone();
        let mut channel = SynthChannel::new();
        let child = if test.op == TestOp::EqualToZero {
            promote(&mut eqs, child, &expr, &mut channel)?
        } else {
            child
        };
        Affine::absorb_child_channel(eqs, child, channel)
    }

    fn join(&self, other: &Self) -> Self {
        functor::join(self, other)
    }

    fn widen(&self, other: &Self) -> Self {
        functor::widen(self, other)
    }

    fn subset_or_equal(&self, other: &Self) -> bool {
        functor::subset_or_equal(self, other)
    }

    fn introduce(&self, var: &NumVar, ty: Type, value: Option<&BigInt>) -> Self {
        let (mut eqs, child) = self.forget(var);
        let child = child.project(&VarSet::from([var.clone()]));
        match value {
            Some(value) => {
                let equation = Linear::var(var.clone()).sub(&Linear::constant(value.clone()));
                let prefer = VarSet::from([var.clone()]);
                if eqs.insert(&equation, Some(&prefer)).is_err() {
                    debug!("introduce: {} already constrained", var);
                }
                Affine::with(eqs, child, SynthChannel::new())
            }
            None => Affine::with(eqs, child.introduce(var, ty, None), SynthChannel::new()),
        }
    }

    fn project(&self, vars: &VarSet) -> Self {
        let mut eqs = self.eqs.clone();
        let mut child = self.child.clone();
        for var in vars {
            if eqs.is_key(var) {
                eqs.remove_row(var);
            } else {
                child = eliminate(&mut eqs, child, var);
            }
        }
        Affine::with(eqs, child.project(vars), SynthChannel::new())
    }

    fn substitute(&self, x: &NumVar, y: &NumVar) -> Self {
        let mut eqs = self.eqs.clone();
        let child = if eqs.is_key(x) {
            self.child.clone()
        } else {
            self.child.substitute(x, y)
        };
        eqs.rename(x, y);
        Affine::with(eqs, child, SynthChannel::new())
    }

    fn expand(&self, pairs: &FoldMap) -> Result<Self, Infeasible> {
        let mut eqs = self.eqs.clone();
        let mut params = FoldMap::new();
        let mut channel = SynthChannel::new();
        for (perm, eph) in pairs {
            match self.eqs.definition(perm) {
                Some(def) => {
                    let prefer = VarSet::from([eph.clone()]);
                    let equation = Linear::var(eph.clone()).sub(&def);
                    if let Insertion::Inserted(_) = eqs.insert(&equation, Some(&prefer))? {
                        channel.add_equality(equation);
                    }
                }
                None => params.push((perm.clone(), eph.clone())),
            }
        }
        let mut child = if params.is_empty() {
            self.child.clone()
        } else {
            self.child.expand(&params)?
        };
        for (perm, eph) in &params {
            for key in self.eqs.users(perm) {
                let Some(row) = self.eqs.row(&key) else {
                    continue;
                };
                let copy = row.rename(perm, eph);
                child = promote(&mut eqs, child, &copy, &mut channel)?;
            }
        }
        Ok(Affine::with(eqs, child, channel))
    }

    fn fold(&self, pairs: &FoldMap) -> Self {
        let mut eqs = self.eqs.clone();
        let mut child = self.child.clone();
        for (perm, eph) in pairs {
            for var in [perm, eph] {
                if eqs.is_key(var) {
                    child = demote_total(&mut eqs, child, var);
                }
                for key in eqs.users(var) {
                    child = demote_total(&mut eqs, child, &key);
                }
            }
        }
        Affine::with(eqs, child.fold(pairs), SynthChannel::new())
    }

    fn query_range(&self, expr: &Linear) -> Range {
        self.child.query_range(&self.eqs.inline(expr))
    }

    fn query_equalities(&self, var: &NumVar) -> SetOfEquations {
        let mut result = self.child.query_equalities(var);
        if let Some(row) = self.eqs.row(var) {
            result.insert(row.clone());
        }
        for key in self.eqs.users(var) {
            if let Some(row) = self.eqs.row(&key) {
                result.insert(row.clone());
            }
        }
        result
    }

    fn synth_channel(&self) -> SynthChannel {
        let mut channel = functor::synth_channel(self);
        channel.equalities.extend(&self.channel.equalities);
        channel
    }

    fn make_compatible(&self, other: &Self, is_widening_point: bool) -> (Self, Self) {
        functor::make_compatible(self, other, is_widening_point)
    }
}

impl<C: Domain> Functor for Affine<C> {
    type State = Equations;
    type Child = C;

    fn build(state: Equations, child: C) -> Self {
        Affine::with(state, child, SynthChannel::new())
    }

    fn state(&self) -> &Equations {
        &self.eqs
    }

    fn child(&self) -> &C {
        &self.child
    }

    fn reconcile(&self, other: &Self, purpose: Reconcile) -> Compatible<Equations, C> {
        let common = match purpose {
            Reconcile::Subset => other.eqs.clone(),
            Reconcile::Join | Reconcile::Widen => {
                let prefer: VarSet = self.eqs.keys().chain(other.eqs.keys()).cloned().collect();
                let rows = hull::affine_hull(&self.eqs, &other.eqs);
                equations::from_rows(rows, Some(&prefer))
            }
        };
        debug!("reconcile({:?}): {} and {} => {}", purpose, self.eqs, other.eqs, common);
        Compatible {
            fst: rekey(&self.eqs, &self.child, &common),
            snd: rekey(&other.eqs, &other.child, &common),
            state: common,
        }
    }

    fn state_subset_or_equal(&self, other: &Self) -> bool {
        self.eqs.entails_all(&other.eqs)
    }
}
