//! A small non-relational interval domain used as the leaf of domain stacks in tests.

use std::collections::BTreeMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use super::{Domain, SetOfEquations, SynthChannel};
use crate::error::Infeasible;
use crate::expr::{Assign, BinOp, FoldMap, Linear, NumVar, Rhs, Test, TestOp, Type, VarSet};
use crate::range::{Bound, Range};

/// Maps variables to ranges. Untracked variables are unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intervals {
    env: Rc<BTreeMap<NumVar, Range>>,
    channel: SynthChannel,
    /// Equalities every assignment claims to have found.
    reported: SynthChannel,
}

impl Intervals {
    pub fn new() -> Self {
        Intervals::default()
    }

    /// A leaf that reports `equalities` after each assignment, like a child domain that
    /// discovered them.
    pub fn reporting(equalities: impl IntoIterator<Item = Linear>) -> Self {
        let mut reported = SynthChannel::new();
        for eq in equalities {
            reported.add_equality(eq);
        }
        Intervals {
            reported,
            ..Intervals::default()
        }
    }

    fn rebuild(&self, env: Rc<BTreeMap<NumVar, Range>>, channel: SynthChannel) -> Self {
        Intervals {
            env,
            channel,
            reported: self.reported.clone(),
        }
    }

    pub fn get(&self, var: &NumVar) -> Range {
        self.env.get(var).cloned().unwrap_or_else(Range::top)
    }

    pub fn tracks(&self, var: &NumVar) -> bool {
        self.env.contains_key(var)
    }

    fn with(&self, var: &NumVar, range: Range) -> Self {
        let mut env = self.env.clone();
        Rc::make_mut(&mut env).insert(var.clone(), range);
        self.rebuild(env, SynthChannel::new())
    }

    fn eval_linear(&self, expr: &Linear) -> Range {
        let mut result = Range::constant(expr.constant_part().clone());
        for (v, c) in expr.terms() {
            result = result.add(&self.get(v).scale(c));
        }
        result
    }

    fn eval_binary(&self, op: BinOp, a: &Linear, b: &Linear) -> Range {
        let ra = self.eval_linear(a);
        let rb = self.eval_linear(b);
        match (op, ra.as_constant(), rb.as_constant()) {
            (BinOp::Mul, Some(x), _) => rb.scale(x),
            (BinOp::Mul, _, Some(y)) => ra.scale(y),
            (BinOp::Div, Some(x), Some(y)) if !y.is_zero() => Range::constant(x / y),
            (BinOp::Mod, Some(x), Some(y)) if !y.is_zero() => Range::constant(x % y),
            (BinOp::And, Some(x), Some(y)) => Range::constant(x & y),
            (BinOp::Or, Some(x), Some(y)) => Range::constant(x | y),
            (BinOp::Xor, Some(x), Some(y)) => Range::constant(x ^ y),
            _ => Range::top(),
        }
    }

    /// Refines `var` given that `c * var + rest op 0` holds, for unit `c`.
    fn refine(&self, test: &Test, var: &NumVar) -> Range {
        let c = test.expr.coefficient(var);
        let current = self.get(var);
        if !c.abs().is_one() {
            return current;
        }
        let rest = test.expr.sub(&Linear::term(c.clone(), var.clone()));
        // var = -rest / c
        let solved = self.eval_linear(&rest).scale(&-&c);
        match test.op {
            TestOp::EqualToZero => current.meet(&solved),
            TestOp::LessOrEqualToZero => {
                // c * var <= -rest
                if c.is_positive() {
                    current.meet(&Range::new(Bound::NegInf, solved.high))
                } else {
                    current.meet(&Range::new(solved.low, Bound::PosInf))
                }
            }
            TestOp::NotEqualToZero => match solved.as_constant() {
                Some(value) if current.low == Bound::Finite(value.clone()) => {
                    current.meet(&Range::new(Bound::Finite(value + 1), Bound::PosInf))
                }
                Some(value) if current.high == Bound::Finite(value.clone()) => {
                    current.meet(&Range::new(Bound::NegInf, Bound::Finite(value - 1)))
                }
                _ => current,
            },
        }
    }
}

impl Domain for Intervals {
    fn eval(&self, stmt: &Assign) -> Result<Self, Infeasible> {
        let range = match &stmt.rhs {
            Rhs::Linear(lin) => self.eval_linear(lin),
            Rhs::Binary(op, a, b) => self.eval_binary(*op, a, b),
            Rhs::Range(r) => r.clone(),
        };
        let mut state = self.with(&stmt.lhs, range);
        state.channel = self.reported.clone();
        Ok(state)
    }

    fn eval_test(&self, test: &Test) -> Result<Self, Infeasible> {
        let value = self.eval_linear(&test.expr);
        if let Some(c) = value.as_constant() {
            return if test.holds_for(c) {
                Ok(self.rebuild(self.env.clone(), SynthChannel::new()))
            } else {
                Err(Infeasible)
            };
        }
        match test.op {
            TestOp::EqualToZero if !value.contains(&BigInt::zero()) => return Err(Infeasible),
            TestOp::LessOrEqualToZero if value.low > Bound::Finite(BigInt::zero()) => {
                return Err(Infeasible)
            }
            _ => {}
        }
        let mut env = self.env.clone();
        let mut channel = SynthChannel::new();
        for var in test.expr.vars() {
            let refined = self.refine(test, var);
            if refined.is_empty() {
                return Err(Infeasible);
            }
            if let Some(c) = refined.as_constant() {
                if !self.get(var).is_constant() {
                    channel.add_equality(Linear::var(var.clone()).sub(&Linear::constant(c.clone())));
                }
            }
            Rc::make_mut(&mut env).insert(var.clone(), refined);
        }
        Ok(self.rebuild(env, channel))
    }

    fn join(&self, other: &Self) -> Self {
        let env = self
            .env
            .iter()
            .filter_map(|(v, r)| other.env.get(v).map(|o| (v.clone(), r.join(o))))
            .collect();
        self.rebuild(Rc::new(env), SynthChannel::new())
    }

    fn widen(&self, other: &Self) -> Self {
        let env = self
            .env
            .iter()
            .filter_map(|(v, r)| other.env.get(v).map(|o| (v.clone(), r.widen(o))))
            .collect();
        self.rebuild(Rc::new(env), SynthChannel::new())
    }

    fn subset_or_equal(&self, other: &Self) -> bool {
        other.env.iter().all(|(v, r)| self.get(v).subset_or_equal(r))
    }

    fn introduce(&self, var: &NumVar, ty: Type, value: Option<&BigInt>) -> Self {
        let range = match (value, ty) {
            (Some(v), _) => Range::constant(v.clone()),
            (None, Type::Flag) => Range::finite(BigInt::zero(), BigInt::one()),
            (None, _) => Range::top(),
        };
        self.with(var, range)
    }

    fn project(&self, vars: &VarSet) -> Self {
        let mut env = self.env.clone();
        Rc::make_mut(&mut env).retain(|v, _| !vars.contains(v));
        self.rebuild(env, SynthChannel::new())
    }

    fn substitute(&self, x: &NumVar, y: &NumVar) -> Self {
        let mut env = self.env.clone();
        let map = Rc::make_mut(&mut env);
        if let Some(r) = map.remove(x) {
            map.insert(y.clone(), r);
        }
        self.rebuild(env, SynthChannel::new())
    }

    fn expand(&self, pairs: &FoldMap) -> Result<Self, Infeasible> {
        let mut env = self.env.clone();
        let map = Rc::make_mut(&mut env);
        for (perm, eph) in pairs {
            let r = self.get(perm);
            map.insert(eph.clone(), r);
        }
        Ok(self.rebuild(env, SynthChannel::new()))
    }

    fn fold(&self, pairs: &FoldMap) -> Self {
        let mut env = self.env.clone();
        let map = Rc::make_mut(&mut env);
        for (perm, eph) in pairs {
            let joined = self.get(perm).join(&self.get(eph));
            map.remove(eph);
            map.insert(perm.clone(), joined);
        }
        self.rebuild(env, SynthChannel::new())
    }

    fn query_range(&self, expr: &Linear) -> Range {
        self.eval_linear(expr)
    }

    fn query_equalities(&self, var: &NumVar) -> SetOfEquations {
        let mut result = SetOfEquations::new();
        if let Some(c) = self.get(var).as_constant() {
            result.insert(Linear::var(var.clone()).sub(&Linear::constant(c.clone())));
        }
        result
    }

    fn synth_channel(&self) -> SynthChannel {
        self.channel.clone()
    }
}

/// Checks the order properties every domain must satisfy on a pair of states.
pub fn check_lattice_axioms<D: Domain>(a: &D, b: &D) {
    let j = a.join(b);
    assert!(a.subset_or_equal(&j), "a ⋢ a ⊔ b");
    assert!(b.subset_or_equal(&j), "b ⋢ a ⊔ b");
    let w = a.widen(b);
    assert!(a.subset_or_equal(&w), "a ⋢ a ∇ b");
    assert!(b.subset_or_equal(&w), "b ⋢ a ∇ b");
    assert!(a.subset_or_equal(a), "a ⋢ a");
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn x() -> NumVar {
        NumVar::register("x")
    }

    #[test]
    fn test_assign_and_query() {
        let s = Intervals::new().eval(&Assign::linear(x(), Linear::constant(4))).unwrap();
        let r = s.query_range(&Linear::term(2, x()).add_constant(&BigInt::from(1)));
        assert_eq!(r, Range::constant(9));
    }

    #[test]
    fn test_eval_test_refines() {
        let s = Intervals::new().eval(&Assign::range(x(), Range::finite(0, 10))).unwrap();
        let t = s.eval_test(&Test::less(&Linear::var(x()), &Linear::constant(5))).unwrap();
        assert_eq!(t.get(&x()), Range::finite(0, 4));
        let e = s.eval_test(&Test::equal(&Linear::var(x()), &Linear::constant(3))).unwrap();
        assert_eq!(e.get(&x()), Range::constant(3));
        assert_eq!(e.synth_channel().equalities.len(), 1);
        assert!(s.eval_test(&Test::equal(&Linear::var(x()), &Linear::constant(11))).is_err());
    }

    #[test]
    fn test_axioms() {
        let a = Intervals::new().eval(&Assign::range(x(), Range::finite(0, 3))).unwrap();
        let b = Intervals::new().eval(&Assign::range(x(), Range::finite(2, 8))).unwrap();
        check_lattice_axioms(&a, &b);
        // a leaf has nothing to reconcile, widening point or not
        for widening in [false, true] {
            let (a2, b2) = a.make_compatible(&b, widening);
            assert_eq!(a2.get(&x()), Range::finite(0, 3));
            assert_eq!(b2.get(&x()), Range::finite(2, 8));
        }
    }

    #[test]
    fn test_reporting_leaf() {
        let eq = Linear::var(x()).sub(&Linear::constant(1));
        let s = Intervals::reporting([eq.clone()]);
        let s = s.eval(&Assign::linear(NumVar::register("y"), Linear::constant(0))).unwrap();
        assert!(s.synth_channel().equalities.iter().any(|e| e == &eq));
        assert!(Intervals::new().synth_channel().is_empty());
    }
}
