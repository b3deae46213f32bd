//! Numeric variables, linear expressions and the statements numeric domains evaluate.
//!
//! This is the language spoken between domain layers. The root domain lowers RREIL
//! registers and memory cells to [`NumVar`]s and RREIL expressions to [`Linear`] forms.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::range::Range;

/// A numeric variable tracked by the domains.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NumVar {
    /// A machine register, by name.
    Register(Rc<str>),
    /// A memory cell of `size` bits at an absolute address.
    Cell { address: u64, size: u32 },
    /// An internal temporary.
    Temp(u32),
}

impl NumVar {
    pub fn register(name: &str) -> Self {
        NumVar::Register(Rc::from(name))
    }

    pub fn cell(address: u64, size: u32) -> Self {
        NumVar::Cell { address, size }
    }

    pub fn temp(id: u32) -> Self {
        NumVar::Temp(id)
    }
}

impl fmt::Display for NumVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumVar::Register(name) => write!(f, "{}", name),
            NumVar::Cell { address, size } => write!(f, "[{:#x}:{}]", address, size),
            NumVar::Temp(id) => write!(f, "t{}", id),
        }
    }
}

pub type VarSet = BTreeSet<NumVar>;

/// Pairs of `(permanent, ephemeral)` variables for expand and fold.
pub type FoldMap = Vec<(NumVar, NumVar)>;

/// The kind of value a variable holds when it is introduced.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Integer,
    Flag,
    Address,
}

/// Linear expression `sum(c_i * x_i) + c`. Zero coefficients are never stored.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Linear {
    terms: BTreeMap<NumVar, BigInt>,
    constant: BigInt,
}

impl Linear {
    pub fn constant(value: impl Into<BigInt>) -> Self {
        Linear {
            terms: BTreeMap::new(),
            constant: value.into(),
        }
    }

    pub fn zero() -> Self {
        Linear::default()
    }

    pub fn var(var: NumVar) -> Self {
        Linear::term(BigInt::one(), var)
    }

    pub fn term(coefficient: impl Into<BigInt>, var: NumVar) -> Self {
        let mut lin = Linear::zero();
        lin.add_term(coefficient.into(), var);
        lin
    }

    pub fn from_terms<I>(terms: I, constant: impl Into<BigInt>) -> Self
    where
        I: IntoIterator<Item = (BigInt, NumVar)>,
    {
        let mut lin = Linear::constant(constant);
        for (c, v) in terms {
            lin.add_term(c, v);
        }
        lin
    }

    fn add_term(&mut self, coefficient: BigInt, var: NumVar) {
        if coefficient.is_zero() {
            return;
        }
        let entry = self.terms.entry(var.clone()).or_insert_with(BigInt::zero);
        *entry += coefficient;
        if entry.is_zero() {
            self.terms.remove(&var);
        }
    }

    pub fn constant_part(&self) -> &BigInt {
        &self.constant
    }

    pub fn coefficient(&self, var: &NumVar) -> BigInt {
        self.terms.get(var).cloned().unwrap_or_else(BigInt::zero)
    }

    pub fn contains(&self, var: &NumVar) -> bool {
        self.terms.contains_key(var)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&NumVar, &BigInt)> {
        self.terms.iter()
    }

    pub fn vars(&self) -> impl Iterator<Item = &NumVar> {
        self.terms.keys()
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn as_constant(&self) -> Option<&BigInt> {
        if self.is_constant() {
            Some(&self.constant)
        } else {
            None
        }
    }

    /// If the expression is a single variable with coefficient one, returns it.
    pub fn as_var(&self) -> Option<&NumVar> {
        if !self.constant.is_zero() || self.terms.len() != 1 {
            return None;
        }
        let (v, c) = self.terms.iter().next()?;
        if c.is_one() {
            Some(v)
        } else {
            None
        }
    }

    pub fn add(&self, other: &Linear) -> Linear {
        let mut result = self.clone();
        for (v, c) in &other.terms {
            result.add_term(c.clone(), v.clone());
        }
        result.constant += &other.constant;
        result
    }

    pub fn sub(&self, other: &Linear) -> Linear {
        self.add(&other.neg())
    }

    pub fn neg(&self) -> Linear {
        self.scale(&-BigInt::one())
    }

    pub fn add_constant(&self, value: &BigInt) -> Linear {
        let mut result = self.clone();
        result.constant += value;
        result
    }

    pub fn scale(&self, factor: &BigInt) -> Linear {
        if factor.is_zero() {
            return Linear::zero();
        }
        Linear {
            terms: self.terms.iter().map(|(v, c)| (v.clone(), c * factor)).collect(),
            constant: &self.constant * factor,
        }
    }

    /// Replaces `var` by `value`.
    pub fn substitute(&self, var: &NumVar, value: &Linear) -> Linear {
        match self.terms.get(var) {
            None => self.clone(),
            Some(c) => {
                let mut rest = self.clone();
                rest.terms.remove(var);
                rest.add(&value.scale(c))
            }
        }
    }

    /// Renames `from` to `to`. `to` must not occur in the expression.
    pub fn rename(&self, from: &NumVar, to: &NumVar) -> Linear {
        self.substitute(from, &Linear::var(to.clone()))
    }

    /// Greatest common divisor of all coefficients and the constant.
    pub fn content(&self) -> BigInt {
        let mut g = self.constant.abs();
        for c in self.terms.values() {
            g = gcd(&g, c);
        }
        g
    }

    /// Divides out the common factor of all coefficients and the constant.
    pub fn normalize(&self) -> Linear {
        let g = self.content();
        if g.is_zero() || g.is_one() {
            return self.clone();
        }
        Linear {
            terms: self.terms.iter().map(|(v, c)| (v.clone(), c / &g)).collect(),
            constant: &self.constant / &g,
        }
    }
}

pub fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

impl From<NumVar> for Linear {
    fn from(var: NumVar) -> Self {
        Linear::var(var)
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (v, c) in &self.terms {
            if first {
                if c.is_one() {
                    write!(f, "{}", v)?;
                } else if *c == -BigInt::one() {
                    write!(f, "-{}", v)?;
                } else {
                    write!(f, "{}*{}", c, v)?;
                }
            } else if c.is_negative() {
                let m = -c;
                if m.is_one() {
                    write!(f, " - {}", v)?;
                } else {
                    write!(f, " - {}*{}", m, v)?;
                }
            } else if c.is_one() {
                write!(f, " + {}", v)?;
            } else {
                write!(f, " + {}*{}", c, v)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant.is_negative() {
            write!(f, " - {}", -&self.constant)
        } else if !self.constant.is_zero() {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

/// Comparison of a linear expression against zero.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TestOp {
    EqualToZero,
    NotEqualToZero,
    LessOrEqualToZero,
}

/// A numeric test `expr op 0`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Test {
    pub expr: Linear,
    pub op: TestOp,
}

impl Test {
    pub fn new(expr: Linear, op: TestOp) -> Self {
        Test { expr, op }
    }

    /// `a == b`
    pub fn equal(a: &Linear, b: &Linear) -> Self {
        Test::new(a.sub(b), TestOp::EqualToZero)
    }

    /// `a != b`
    pub fn not_equal(a: &Linear, b: &Linear) -> Self {
        Test::new(a.sub(b), TestOp::NotEqualToZero)
    }

    /// `a <= b`
    pub fn less_or_equal(a: &Linear, b: &Linear) -> Self {
        Test::new(a.sub(b), TestOp::LessOrEqualToZero)
    }

    /// `a < b`, that is `a - b + 1 <= 0` over the integers.
    pub fn less(a: &Linear, b: &Linear) -> Self {
        Test::new(a.sub(b).add_constant(&BigInt::one()), TestOp::LessOrEqualToZero)
    }

    /// The logical negation of this test.
    pub fn negate(&self) -> Self {
        match self.op {
            TestOp::EqualToZero => Test::new(self.expr.clone(), TestOp::NotEqualToZero),
            TestOp::NotEqualToZero => Test::new(self.expr.clone(), TestOp::EqualToZero),
            // !(e <= 0)  <=>  e >= 1  <=>  -e + 1 <= 0
            TestOp::LessOrEqualToZero => Test::new(
                self.expr.neg().add_constant(&BigInt::one()),
                TestOp::LessOrEqualToZero,
            ),
        }
    }

    /// Decides a test over a constant expression.
    pub fn holds_for(&self, value: &BigInt) -> bool {
        match self.op {
            TestOp::EqualToZero => value.is_zero(),
            TestOp::NotEqualToZero => !value.is_zero(),
            TestOp::LessOrEqualToZero => !value.is_positive(),
        }
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            TestOp::EqualToZero => "==",
            TestOp::NotEqualToZero => "!=",
            TestOp::LessOrEqualToZero => "<=",
        };
        write!(f, "{} {} 0", self.expr, op)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Right-hand side of a numeric assignment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Rhs {
    Linear(Linear),
    Binary(BinOp, Linear, Linear),
    /// Any value within the range.
    Range(Range),
}

/// Numeric assignment `lhs := rhs`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Assign {
    pub lhs: NumVar,
    pub rhs: Rhs,
}

impl Assign {
    pub fn linear(lhs: NumVar, rhs: Linear) -> Self {
        Assign { lhs, rhs: Rhs::Linear(rhs) }
    }

    pub fn range(lhs: NumVar, range: Range) -> Self {
        Assign { lhs, rhs: Rhs::Range(range) }
    }
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rhs {
            Rhs::Linear(lin) => write!(f, "{} := {}", self.lhs, lin),
            Rhs::Binary(op, a, b) => write!(f, "{} := ({}) {:?} ({})", self.lhs, a, op, b),
            Rhs::Range(r) => write!(f, "{} := {}", self.lhs, r),
        }
    }
}
