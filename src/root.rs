//! The domain at the top of a stack: RREIL statements in, numeric operations out.
//!
//! [`RootDomain`] is what the evaluator talks to. [`Root`] implements it over any
//! numeric child domain: registers become [`NumVar::Register`] variables, memory
//! accessed at constant addresses becomes [`NumVar::Cell`] variables, and cells that
//! were never written read their initial contents from the binary's segments.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::debug;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::binary::Segment;
use crate::domain::functor::{self, Compatible, Functor, Reconcile};
use crate::domain::{Domain, SetOfEquations, SynthChannel};
use crate::error::Infeasible;
use crate::expr::{self, Assign, FoldMap, Linear, NumVar, Test, Type, VarSet};
use crate::range::Range;
use crate::rreil::{BinOp, Cmp, CmpOp, Lin, Rhs, Rval, Rvar};
use crate::warnings::{Warning, Warnings};

/// Temporary used while moving the instruction pointer.
const IP_OFFSET: NumVar = NumVar::Temp(0);

/// Operations the evaluator needs on an abstract state.
///
/// Register and memory values are unsigned machine words. Operations that fail with
/// [`Infeasible`] found the path to be dead.
pub trait RootDomain: Domain {
    /// Assigns `rhs` to `lhs`, wrapping the result around to `lhs.size` bits.
    fn eval_assign(&self, lhs: &Rvar, rhs: &Rhs) -> Result<Self, Infeasible>;

    /// Fails if the address expression has no value, i.e. the path is dead.
    fn eval_load(&self, lhs: &Rvar, address: &Lin) -> Result<Self, Infeasible>;

    fn eval_store(&self, address: &Lin, value: &Rval, size: u32) -> Result<Self, Infeasible>;

    fn eval_cmp(&self, cmp: &Cmp) -> Result<Self, Infeasible>;

    /// Checks `cmp`, recording a warning if it may not hold.
    fn eval_assertion(&self, cmp: &Cmp) -> Self;

    fn eval_primitive(&self, name: &str, outs: &[Rvar], ins: &[Rval]) -> Result<Self, Infeasible>;

    fn query_lin(&self, expr: &Lin) -> Range;

    /// Restricts the state to `expr == value`.
    fn restrict(&self, expr: &Lin, value: &BigInt) -> Result<Self, Infeasible>;

    /// Sets `ip` to `target` by adding the difference, so relations on `ip` are
    /// carried along instead of being reset.
    fn move_instruction_pointer(&self, ip: &Rvar, target: &Lin) -> Result<Self, Infeasible>;

    fn introduce_region(&self, name: &str, segment: &Segment) -> Self;

    fn warnings(&self) -> &Warnings;

    fn with_warning(&self, warning: Warning) -> Self;

    fn without_warnings(&self) -> Self;
}

/// What the root layer knows on its own: tracked variables and memory layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootInfo {
    tracked: Rc<BTreeSet<NumVar>>,
    regions: Rc<BTreeMap<String, Rc<Segment>>>,
    /// Bytes written through constant addresses.
    dirty: Rc<BTreeSet<u64>>,
    /// A store went to an unknown address: writable memory is no longer initial.
    clobbered: bool,
}

impl RootInfo {
    fn track(&mut self, var: &NumVar) {
        if !self.tracked.contains(var) {
            Rc::make_mut(&mut self.tracked).insert(var.clone());
        }
    }

    fn untrack(&mut self, var: &NumVar) {
        if self.tracked.contains(var) {
            Rc::make_mut(&mut self.tracked).remove(var);
        }
    }

    pub fn tracked(&self) -> &BTreeSet<NumVar> {
        &self.tracked
    }

    pub fn is_clobbered(&self) -> bool {
        self.clobbered
    }

    /// The value a variable has if nothing was ever written to it.
    fn default_value(&self, var: &NumVar) -> Option<BigInt> {
        let NumVar::Cell { address, size } = var else {
            return None;
        };
        let len = (*size as u64).div_ceil(8);
        if (*address..address.saturating_add(len)).any(|b| self.dirty.contains(&b)) {
            return None;
        }
        let segment = self.regions.values().find(|s| s.contains(*address))?;
        if self.clobbered && segment.permissions.write {
            return None;
        }
        segment.read(*address, *size)
    }
}

fn num(var: &Rvar) -> NumVar {
    NumVar::Register(var.name.clone())
}

fn linear(lin: &Lin) -> Linear {
    Linear::from_terms(lin.terms.iter().map(|(c, v)| (c.clone(), num(v))), lin.constant.clone())
}

fn rval(value: &Rval) -> Linear {
    linear(&Lin::from(value))
}

/// Floor of `value / 2^size`: the copy of the word range that `value` lies in.
fn word_index(value: &BigInt, size: u32) -> BigInt {
    let modulus = BigInt::one() << size;
    let quotient = value / &modulus;
    if value.is_negative() && !(value % &modulus).is_zero() {
        quotient - 1
    } else {
        quotient
    }
}

fn to_unsigned(value: &BigInt, size: u32) -> BigInt {
    value - (word_index(value, size) << size)
}

/// The unsigned word `value` read as a two's complement number.
fn to_signed(value: &BigInt, size: u32) -> BigInt {
    if size > 0 && *value >= BigInt::one() << (size - 1) {
        value - (BigInt::one() << size)
    } else {
        value.clone()
    }
}

fn cell_bytes(size: u32) -> u64 {
    (size as u64).div_ceil(8)
}

/// The root layer over a numeric child domain.
#[derive(Debug, Clone)]
pub struct Root<C> {
    info: RootInfo,
    child: C,
    warnings: Warnings,
}

impl<C: Domain> Root<C> {
    pub fn new(child: C) -> Self {
        Root {
            info: RootInfo::default(),
            child,
            warnings: Warnings::new(),
        }
    }

    pub fn info(&self) -> &RootInfo {
        &self.info
    }

    pub fn inner(&self) -> &C {
        &self.child
    }

    /// Range of a register, for inspection.
    pub fn register(&self, var: &Rvar) -> Range {
        self.child.query_range(&Linear::var(num(var)))
    }

    /// Range of a memory cell, for inspection.
    pub fn memory(&self, address: u64, size: u32) -> Range {
        let var = NumVar::cell(address, size);
        if !self.info.tracked.contains(&var) {
            if let Some(value) = self.info.default_value(&var) {
                return Range::constant(value);
            }
        }
        self.child.query_range(&Linear::var(var))
    }

    fn with_child(&self, info: RootInfo, child: C) -> Self {
        Root {
            info,
            child,
            warnings: self.warnings.clone(),
        }
    }

    fn assign(&self, lhs: &NumVar, rhs: expr::Rhs) -> Result<Self, Infeasible> {
        let mut info = self.info.clone();
        info.track(lhs);
        let child = self.child.eval(&Assign {
            lhs: lhs.clone(),
            rhs,
        })?;
        Ok(self.with_child(info, child))
    }

    /// Brings `var` back into the words of `size` bits.
    ///
    /// A range within one copy of the word range is shifted, which keeps relations;
    /// a range spanning several copies becomes the whole word range.
    fn wrap(self, var: &NumVar, size: u32) -> Result<Self, Infeasible> {
        let word = Range::unsigned(size);
        let range = self.child.query_range(&Linear::var(var.clone()));
        if range.subset_or_equal(&word) {
            return Ok(self);
        }
        let shift = match (range.low.as_finite(), range.high.as_finite()) {
            (Some(low), Some(high)) => {
                let index = word_index(low, size);
                (index == word_index(high, size)).then(|| index << size)
            }
            _ => None,
        };
        debug!("wrap {} in {} to {} bits", var, range, size);
        match shift {
            Some(shift) => {
                let shifted = Linear::var(var.clone()).sub(&Linear::constant(shift));
                self.assign(var, expr::Rhs::Linear(shifted))
            }
            None => self.assign(var, expr::Rhs::Range(word)),
        }
    }

    fn assign_cmp(&self, lhs: &NumVar, cmp: &Cmp) -> Result<Self, Infeasible> {
        let set = self
            .eval_cmp(cmp)
            .and_then(|s| s.assign(lhs, expr::Rhs::Linear(Linear::constant(1))))
            .ok();
        let unset = self
            .eval_cmp(&cmp.negate())
            .and_then(|s| s.assign(lhs, expr::Rhs::Linear(Linear::constant(0))))
            .ok();
        match (set, unset) {
            (Some(a), Some(b)) => {
                let mut joined = a.join(&b);
                joined.warnings = self.warnings.clone();
                Ok(joined)
            }
            (Some(a), None) => Ok(a),
            (None, Some(b)) => Ok(b),
            (None, None) => self.assign(lhs, expr::Rhs::Range(Range::finite(0, 1))),
        }
    }

    /// `lin` as a comparison operand of `size` bits: the expression to test and its
    /// range. `None` if the integer value of `lin` may differ from the machine word,
    /// i.e. the expression may wrap around.
    fn operand(&self, lin: &Lin, size: u32) -> Option<(Linear, Range)> {
        if let Some(value) = lin.as_lit() {
            let value = to_unsigned(value, size);
            return Some((Linear::constant(value.clone()), Range::constant(value)));
        }
        let expr = linear(lin);
        let range = self.child.query_range(&expr);
        match lin.as_var() {
            // registers always hold words
            Some(var) => Some((expr, range.meet(&Range::unsigned(var.size)))),
            None if range.subset_or_equal(&Range::unsigned(size)) => Some((expr, range)),
            None => None,
        }
    }

    /// Forgets every cell overlapping `[address, address + bytes)` except `keep`.
    fn forget_overlapping(&self, info: &mut RootInfo, child: C, address: u64, bytes: u64, keep: &NumVar) -> C {
        let end = address.saturating_add(bytes);
        let overlapping: VarSet = info
            .tracked
            .iter()
            .filter(|v| *v != keep)
            .filter(|v| match v {
                NumVar::Cell { address: a, size } => *a < end && address < a.saturating_add(cell_bytes(*size)),
                _ => false,
            })
            .cloned()
            .collect();
        if overlapping.is_empty() {
            return child;
        }
        for v in &overlapping {
            info.untrack(v);
        }
        child.project(&overlapping)
    }

    fn constant_address(&self, address: &Lin) -> Result<Option<u64>, Range> {
        let range = self.child.query_range(&linear(address));
        match range.as_constant().and_then(|c| c.to_u64()) {
            Some(a) => Ok(Some(a)),
            None if range.is_empty() => Ok(None),
            None => Err(range),
        }
    }
}

impl<C: Domain> RootDomain for Root<C> {
    fn eval_assign(&self, lhs: &Rvar, rhs: &Rhs) -> Result<Self, Infeasible> {
        let var = num(lhs);
        match rhs {
            Rhs::Lin(lin) => self.assign(&var, expr::Rhs::Linear(linear(lin)))?.wrap(&var, lhs.size),
            Rhs::Bin(op, a, b) => {
                let (a, b) = (rval(a), rval(b));
                let scaled = match (op, a.as_constant(), b.as_constant()) {
                    (BinOp::Mul, Some(k), _) => Some(b.scale(k)),
                    (BinOp::Mul, _, Some(k)) => Some(a.scale(k)),
                    (BinOp::Shl, _, Some(k)) => k.to_u32().map(|k| a.scale(&(BigInt::one() << k))),
                    _ => None,
                };
                let state = match scaled {
                    Some(lin) => self.assign(&var, expr::Rhs::Linear(lin))?,
                    None => self.assign(&var, expr::Rhs::Binary(*op, a, b))?,
                };
                state.wrap(&var, lhs.size)
            }
            Rhs::Cmp(cmp) => self.assign_cmp(&var, cmp),
            Rhs::Arbitrary => self.assign(&var, expr::Rhs::Range(Range::unsigned(lhs.size))),
        }
    }

    fn eval_load(&self, lhs: &Rvar, address: &Lin) -> Result<Self, Infeasible> {
        let var = num(lhs);
        match self.constant_address(address) {
            Ok(None) => Err(Infeasible),
            Ok(Some(a)) => {
                let cell = NumVar::cell(a, lhs.size);
                let rhs = if self.info.tracked.contains(&cell) {
                    expr::Rhs::Linear(Linear::var(cell))
                } else if let Some(value) = self.info.default_value(&cell) {
                    expr::Rhs::Linear(Linear::constant(value))
                } else {
                    expr::Rhs::Range(Range::unsigned(lhs.size))
                };
                self.assign(&var, rhs)
            }
            Err(range) => {
                debug!("load {} from unknown address {}", lhs, range);
                let state = self.assign(&var, expr::Rhs::Range(Range::unsigned(lhs.size)))?;
                Ok(state.with_warning(Warning::UnknownLoadAddress { address: range }))
            }
        }
    }

    fn eval_store(&self, address: &Lin, value: &Rval, size: u32) -> Result<Self, Infeasible> {
        match self.constant_address(address) {
            Ok(None) => Err(Infeasible),
            Ok(Some(a)) => {
                let cell = NumVar::cell(a, size);
                let mut info = self.info.clone();
                let bytes = cell_bytes(size);
                let child = self.forget_overlapping(&mut info, self.child.clone(), a, bytes, &cell);
                let dirty = Rc::make_mut(&mut info.dirty);
                for b in a..a.saturating_add(bytes) {
                    dirty.insert(b);
                }
                self.with_child(info, child)
                    .assign(&cell, expr::Rhs::Linear(rval(value)))?
                    .wrap(&cell, size)
            }
            Err(range) => {
                debug!("store to unknown address {}, forgetting memory", range);
                let mut info = self.info.clone();
                let cells: VarSet = info
                    .tracked
                    .iter()
                    .filter(|v| matches!(v, NumVar::Cell { .. }))
                    .cloned()
                    .collect();
                for v in &cells {
                    info.untrack(v);
                }
                info.clobbered = true;
                let child = self.child.project(&cells);
                Ok(self
                    .with_child(info, child)
                    .with_warning(Warning::UnknownStoreAddress { address: range }))
            }
        }
    }

    /// Comparisons are refined on integers only where the integer order agrees with
    /// the machine order: unsigned operands that cannot wrap, signed operands known to
    /// be non-negative. Otherwise both outcomes stay possible.
    fn eval_cmp(&self, cmp: &Cmp) -> Result<Self, Infeasible> {
        let size = cmp.size();
        let (Some((lhs, l)), Some((rhs, r))) = (self.operand(&cmp.lhs, size), self.operand(&cmp.rhs, size)) else {
            debug!("{}: operands may wrap around, not refined", cmp);
            return Ok(self.clone());
        };
        let test = match cmp.op {
            CmpOp::Eq => Test::equal(&lhs, &rhs),
            CmpOp::Ne => Test::not_equal(&lhs, &rhs),
            CmpOp::LtUnsigned => Test::less(&lhs, &rhs),
            CmpOp::LeUnsigned => Test::less_or_equal(&lhs, &rhs),
            CmpOp::LtSigned | CmpOp::LeSigned => {
                let non_negative = Range::unsigned(size.saturating_sub(1));
                if !(l.subset_or_equal(&non_negative) && r.subset_or_equal(&non_negative)) {
                    let (Some(a), Some(b)) = (l.as_constant(), r.as_constant()) else {
                        debug!("{}: sign unknown, not refined", cmp);
                        return Ok(self.clone());
                    };
                    let (a, b) = (to_signed(a, size), to_signed(b, size));
                    let holds = if cmp.op == CmpOp::LtSigned { a < b } else { a <= b };
                    return if holds { Ok(self.clone()) } else { Err(Infeasible) };
                }
                if cmp.op == CmpOp::LtSigned {
                    Test::less(&lhs, &rhs)
                } else {
                    Test::less_or_equal(&lhs, &rhs)
                }
            }
        };
        let child = self.child.eval_test(&test)?;
        Ok(self.with_child(self.info.clone(), child))
    }

    fn eval_assertion(&self, cmp: &Cmp) -> Self {
        if self.eval_cmp(&cmp.negate()).is_ok() {
            self.with_warning(Warning::AssertionMayFail {
                assertion: cmp.to_string(),
            })
        } else {
            self.clone()
        }
    }

    fn eval_primitive(&self, name: &str, outs: &[Rvar], _ins: &[Rval]) -> Result<Self, Infeasible> {
        debug!("primitive {} with {} outputs", name, outs.len());
        let mut state = self.clone();
        for out in outs {
            state = state.eval_assign(out, &Rhs::Arbitrary)?;
        }
        Ok(state)
    }

    fn query_lin(&self, expr: &Lin) -> Range {
        self.child.query_range(&linear(expr))
    }

    fn restrict(&self, expr: &Lin, value: &BigInt) -> Result<Self, Infeasible> {
        let child = self
            .child
            .eval_test(&Test::equal(&linear(expr), &Linear::constant(value.clone())))?;
        Ok(self.with_child(self.info.clone(), child))
    }

    fn move_instruction_pointer(&self, ip: &Rvar, target: &Lin) -> Result<Self, Infeasible> {
        let ip = num(ip);
        let offset = linear(target).sub(&Linear::var(ip.clone()));
        let state = self.assign(&IP_OFFSET, expr::Rhs::Linear(offset))?;
        let state = state.assign(&ip, expr::Rhs::Linear(Linear::var(ip.clone()).add(&Linear::var(IP_OFFSET))))?;
        let mut info = state.info.clone();
        info.untrack(&IP_OFFSET);
        let child = state.child.project(&VarSet::from([IP_OFFSET]));
        Ok(state.with_child(info, child))
    }

    fn introduce_region(&self, name: &str, segment: &Segment) -> Self {
        let mut info = self.info.clone();
        Rc::make_mut(&mut info.regions).insert(name.to_string(), Rc::new(segment.clone()));
        self.with_child(info, self.child.clone())
    }

    fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    fn with_warning(&self, warning: Warning) -> Self {
        let mut state = self.clone();
        state.warnings.push(warning);
        state
    }

    fn without_warnings(&self) -> Self {
        Root {
            info: self.info.clone(),
            child: self.child.clone(),
            warnings: Warnings::new(),
        }
    }
}

impl<C: Domain> Domain for Root<C> {
    fn eval(&self, stmt: &Assign) -> Result<Self, Infeasible> {
        self.assign(&stmt.lhs, stmt.rhs.clone())
    }

    fn eval_test(&self, test: &Test) -> Result<Self, Infeasible> {
        let child = self.child.eval_test(test)?;
        Ok(self.with_child(self.info.clone(), child))
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
        let mut info = self.info.clone();
        info.track(var);
        self.with_child(info, self.child.introduce(var, ty, value))
    }

    fn project(&self, vars: &VarSet) -> Self {
        let mut info = self.info.clone();
        for v in vars {
            info.untrack(v);
        }
        self.with_child(info, self.child.project(vars))
    }

    fn substitute(&self, x: &NumVar, y: &NumVar) -> Self {
        let mut info = self.info.clone();
        if info.tracked.contains(x) {
            info.untrack(x);
            info.track(y);
        }
        self.with_child(info, self.child.substitute(x, y))
    }

    fn expand(&self, pairs: &FoldMap) -> Result<Self, Infeasible> {
        let mut info = self.info.clone();
        for (_, eph) in pairs {
            info.track(eph);
        }
        Ok(self.with_child(info, self.child.expand(pairs)?))
    }

    fn fold(&self, pairs: &FoldMap) -> Self {
        let mut info = self.info.clone();
        for (_, eph) in pairs {
            info.untrack(eph);
        }
        self.with_child(info, self.child.fold(pairs))
    }

    fn query_range(&self, expr: &Linear) -> Range {
        self.child.query_range(expr)
    }

    fn query_equalities(&self, var: &NumVar) -> SetOfEquations {
        self.child.query_equalities(var)
    }

    fn synth_channel(&self) -> SynthChannel {
        functor::synth_channel(self)
    }

    fn make_compatible(&self, other: &Self, is_widening_point: bool) -> (Self, Self) {
        functor::make_compatible(self, other, is_widening_point)
    }
}

/// Introduces into `child` the variables tracked by `common` but not by `own`.
fn complete<C: Domain>(own: &RootInfo, child: &C, common: &RootInfo) -> C {
    let mut child = child.clone();
    for var in common.tracked.iter().filter(|v| !own.tracked.contains(*v)) {
        let value = own.default_value(var);
        child = child.introduce(var, Type::Integer, value.as_ref());
    }
    child
}

impl<C: Domain> Functor for Root<C> {
    type State = RootInfo;
    type Child = C;

    fn build(state: RootInfo, child: C) -> Self {
        Root {
            info: state,
            child,
            warnings: Warnings::new(),
        }
    }

    fn state(&self) -> &RootInfo {
        &self.info
    }

    fn child(&self) -> &C {
        &self.child
    }

    fn reconcile(&self, other: &Self, purpose: Reconcile) -> Compatible<RootInfo, C> {
        let mut regions = (*self.info.regions).clone();
        for (name, segment) in other.info.regions.iter() {
            regions.entry(name.clone()).or_insert_with(|| segment.clone());
        }
        let common = RootInfo {
            tracked: Rc::new(self.info.tracked.union(&other.info.tracked).cloned().collect()),
            regions: Rc::new(regions),
            dirty: Rc::new(self.info.dirty.union(&other.info.dirty).copied().collect()),
            clobbered: self.info.clobbered || other.info.clobbered,
        };
        debug!(
            "root reconcile({:?}): {} and {} tracked => {}",
            purpose,
            self.info.tracked.len(),
            other.info.tracked.len(),
            common.tracked.len()
        );
        Compatible {
            fst: complete(&self.info, &self.child, &common),
            snd: complete(&other.info, &other.child, &common),
            state: common,
        }
    }

    fn state_subset_or_equal(&self, other: &Self) -> bool {
        (!self.info.clobbered || other.info.clobbered) && self.info.dirty.is_subset(&other.info.dirty)
    }

    fn local_vars(&self) -> VarSet {
        VarSet::from([IP_OFFSET])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::Affine;
    use crate::binary::Permissions;
    use crate::domain::testing::{check_lattice_axioms, Intervals};
    use test_log::test;

    type State = Root<Affine<Intervals>>;

    fn top() -> State {
        Root::new(Affine::new(Intervals::new()))
    }

    fn r(name: &str) -> Rvar {
        Rvar::new(name, 32)
    }

    #[test]
    fn test_assign_and_query() {
        let s = top().eval_assign(&r("a"), &Rhs::Lin(Lin::lit(5))).unwrap();
        let s = s.eval_assign(&r("b"), &Rhs::Lin(Lin::var(&r("a")).offset(3))).unwrap();
        assert_eq!(s.register(&r("b")), Range::constant(8));
        let s = s.eval_assign(&r("c"), &Rhs::Bin(BinOp::Shl, Rval::Var(r("a")), Rval::lit(2))).unwrap();
        assert_eq!(s.register(&r("c")), Range::constant(20));
    }

    #[test]
    fn test_cmp_sets_flag() {
        let s = top().eval_assign(&r("a"), &Rhs::Lin(Lin::lit(5))).unwrap();
        let cmp = Cmp::new(CmpOp::LtUnsigned, Lin::var(&r("a")), Lin::lit(10));
        let s = s.eval_assign(&r("f"), &Rhs::Cmp(cmp.clone())).unwrap();
        assert_eq!(s.register(&r("f")), Range::constant(1));
        let s = s.eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let cmp = Cmp::new(CmpOp::LtUnsigned, Lin::var(&r("x")), Lin::lit(10));
        let s = s.eval_assign(&r("g"), &Rhs::Cmp(cmp)).unwrap();
        assert_eq!(s.register(&r("g")), Range::finite(0, 1));
    }

    #[test]
    fn test_memory_cells() {
        let data = Segment::new(".data", 0x100, vec![7, 0, 0, 0], Permissions::RW);
        let s = top().introduce_region("_data", &data);
        let s = s.eval_load(&r("a"), &Lin::lit(0x100)).unwrap();
        assert_eq!(s.register(&r("a")), Range::constant(7));
        let s = s.eval_store(&Lin::lit(0x100), &Rval::lit(9), 32).unwrap();
        let s = s.eval_load(&r("b"), &Lin::lit(0x100)).unwrap();
        assert_eq!(s.register(&r("b")), Range::constant(9));
        assert_eq!(s.memory(0x100, 32), Range::constant(9));
        // a narrower load overlapping a written cell is unknown
        let s = s.eval_load(&Rvar::new("c", 8), &Lin::lit(0x101)).unwrap();
        assert_eq!(s.register(&Rvar::new("c", 8)), Range::unsigned(8));
    }

    #[test]
    fn test_unknown_store_forgets_memory() {
        let data = Segment::new(".data", 0x100, vec![7, 0, 0, 0], Permissions::RW);
        let s = top().introduce_region("_data", &data);
        let s = s.eval_store(&Lin::lit(0x100), &Rval::lit(1), 32).unwrap();
        let s = s.eval_assign(&r("p"), &Rhs::Arbitrary).unwrap();
        let s = s.eval_store(&Lin::var(&r("p")), &Rval::lit(2), 32).unwrap();
        assert!(s.info().is_clobbered());
        assert_eq!(s.warnings().len(), 1);
        let s = s.eval_load(&r("a"), &Lin::lit(0x100)).unwrap();
        assert_eq!(s.register(&r("a")), Range::unsigned(32));
    }

    #[test]
    fn test_join_reconciles_cells() {
        let data = Segment::new(".data", 0x100, vec![7, 0, 0, 0], Permissions::RW);
        let base = top().introduce_region("_data", &data);
        let written = base.eval_store(&Lin::lit(0x100), &Rval::lit(9), 32).unwrap();
        let j = written.join(&base);
        assert_eq!(j.memory(0x100, 32), Range::finite(7, 9));
        check_lattice_axioms(&written, &base);
        assert!(!j.subset_or_equal(&written));
    }

    #[test]
    fn test_move_instruction_pointer_keeps_relation() {
        let ip = r("ip");
        let s = top().eval_assign(&ip, &Rhs::Lin(Lin::lit(0x10))).unwrap();
        let s = s.eval_assign(&r("t"), &Rhs::Arbitrary).unwrap();
        let s = s.eval_assign(&r("d"), &Rhs::Lin(Lin::var(&ip).plus(-1, &r("t")))).unwrap();
        let s = s.move_instruction_pointer(&ip, &Lin::lit(0x20)).unwrap();
        assert_eq!(s.register(&ip), Range::constant(0x20));
        assert!(!s.info().tracked().contains(&IP_OFFSET));
    }

    #[test]
    fn test_assertion_warns() {
        let s = top().eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let ok = Cmp::new(CmpOp::LeUnsigned, Lin::lit(0), Lin::var(&r("x")));
        assert!(s.eval_assertion(&ok).warnings().is_empty());
        let maybe = Cmp::new(CmpOp::Eq, Lin::var(&r("x")), Lin::lit(3));
        assert_eq!(s.eval_assertion(&maybe).warnings().len(), 1);
    }

    #[test]
    fn test_restrict() {
        let s = top().eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let x = Lin::var(&r("x"));
        let s3 = s.restrict(&x, &BigInt::from(3)).unwrap();
        assert_eq!(s3.query_lin(&x), Range::constant(3));
        assert!(s3.restrict(&x, &BigInt::from(4)).is_err());
    }

    #[test]
    fn test_arithmetic_wraps_around() {
        let s = top().eval_assign(&r("x"), &Rhs::Lin(Lin::lit(u32::MAX))).unwrap();
        let s = s.eval_assign(&r("x"), &Rhs::Lin(Lin::var(&r("x")).offset(1))).unwrap();
        assert_eq!(s.register(&r("x")), Range::constant(0));
        let zero = Cmp::new(CmpOp::Eq, Lin::var(&r("x")), Lin::lit(0));
        assert!(s.eval_cmp(&zero).is_ok());
        assert!(s.eval_cmp(&zero.negate()).is_err());
        let s = s.eval_assign(&r("y"), &Rhs::Lin(Lin::var(&r("x")).offset(-1))).unwrap();
        assert_eq!(s.register(&r("y")), Range::constant(u32::MAX));
    }

    #[test]
    fn test_wrap_keeps_relation() {
        let s = top().eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let s = s.eval_cmp(&Cmp::new(CmpOp::LeUnsigned, Lin::lit(1), Lin::var(&r("x")))).unwrap();
        let s = s.eval_cmp(&Cmp::new(CmpOp::LeUnsigned, Lin::var(&r("x")), Lin::lit(10))).unwrap();
        let s = s.eval_assign(&r("y"), &Rhs::Lin(Lin::var(&r("x")).offset(u32::MAX))).unwrap();
        assert_eq!(s.register(&r("y")), Range::finite(0, 9));
        let diff = Lin::var(&r("y")).plus(-1, &r("x"));
        assert_eq!(s.query_lin(&diff), Range::constant(-1));
    }

    #[test]
    fn test_operands_that_may_wrap_keep_both_outcomes() {
        let s = top().eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let cmp = Cmp::new(CmpOp::Eq, Lin::var(&r("x")).offset(1), Lin::lit(0));
        assert!(s.eval_cmp(&cmp).is_ok());
        assert!(s.eval_cmp(&cmp.negate()).is_ok());
        // literals compare as words
        let cmp = Cmp::new(CmpOp::Eq, Lin::var(&r("x")), Lin::lit(-1));
        let equal = s.eval_cmp(&cmp).unwrap();
        assert_eq!(equal.register(&r("x")), Range::constant(u32::MAX));
    }

    #[test]
    fn test_signed_comparisons() {
        let s = top().eval_assign(&r("x"), &Rhs::Arbitrary).unwrap();
        let negative = Cmp::new(CmpOp::LtSigned, Lin::var(&r("x")), Lin::lit(0));
        let taken = s.eval_cmp(&negative).unwrap();
        let not_taken = s.eval_cmp(&negative.negate()).unwrap();
        assert_eq!(taken.register(&r("x")), Range::unsigned(32));
        assert_eq!(not_taken.register(&r("x")), Range::unsigned(32));

        let small = s.eval_cmp(&Cmp::new(CmpOp::LeUnsigned, Lin::var(&r("x")), Lin::lit(100))).unwrap();
        let half = Cmp::new(CmpOp::LtSigned, Lin::var(&r("x")), Lin::lit(50));
        assert_eq!(small.eval_cmp(&half).unwrap().register(&r("x")), Range::finite(0, 49));
        assert!(small.eval_cmp(&negative).is_err());

        let minus_one = top().eval_assign(&r("x"), &Rhs::Lin(Lin::lit(u32::MAX))).unwrap();
        assert!(minus_one.eval_cmp(&negative).is_ok());
        assert!(minus_one.eval_cmp(&negative.negate()).is_err());
    }
}
