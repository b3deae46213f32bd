//! The RREIL intermediate language as seen by the fixpoint engine.
//!
//! Each native instruction is lowered to a short sequence of [`RReil`] statements,
//! addressed by the native address and an offset.

use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::address::Address;
pub use crate::expr::BinOp;

/// A register of `size` bits.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Rvar {
    pub name: Rc<str>,
    pub size: u32,
}

impl Rvar {
    pub fn new(name: &str, size: u32) -> Self {
        Rvar {
            name: Rc::from(name),
            size,
        }
    }
}

impl fmt::Display for Rvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.size)
    }
}

/// A register or a literal.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Rval {
    Var(Rvar),
    Lit(BigInt),
}

impl Rval {
    pub fn lit(value: impl Into<BigInt>) -> Self {
        Rval::Lit(value.into())
    }
}

impl From<Rvar> for Rval {
    fn from(var: Rvar) -> Self {
        Rval::Var(var)
    }
}

impl fmt::Display for Rval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rval::Var(v) => write!(f, "{}", v),
            Rval::Lit(n) => write!(f, "{}", n),
        }
    }
}

/// Linear combination of registers.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct Lin {
    pub terms: Vec<(BigInt, Rvar)>,
    pub constant: BigInt,
}

impl Lin {
    pub fn lit(value: impl Into<BigInt>) -> Self {
        Lin {
            terms: Vec::new(),
            constant: value.into(),
        }
    }

    pub fn var(var: &Rvar) -> Self {
        Lin {
            terms: vec![(BigInt::one(), var.clone())],
            constant: BigInt::zero(),
        }
    }

    pub fn plus(mut self, coefficient: impl Into<BigInt>, var: &Rvar) -> Self {
        self.terms.push((coefficient.into(), var.clone()));
        self
    }

    pub fn offset(mut self, value: impl Into<BigInt>) -> Self {
        self.constant += value.into();
        self
    }

    pub fn as_lit(&self) -> Option<&BigInt> {
        if self.terms.is_empty() {
            Some(&self.constant)
        } else {
            None
        }
    }

    /// The register, if the expression is exactly one register.
    pub fn as_var(&self) -> Option<&Rvar> {
        match self.terms.as_slice() {
            [(c, v)] if c.is_one() && self.constant.is_zero() => Some(v),
            _ => None,
        }
    }
}

impl From<&Rval> for Lin {
    fn from(rval: &Rval) -> Self {
        match rval {
            Rval::Var(v) => Lin::var(v),
            Rval::Lit(n) => Lin::lit(n.clone()),
        }
    }
}

impl fmt::Display for Lin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (c, v) in &self.terms {
            if !first {
                write!(f, " + ")?;
            }
            if c.is_one() {
                write!(f, "{}", v)?;
            } else {
                write!(f, "{}*{}", c, v)?;
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

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    LtSigned,
    LeSigned,
    LtUnsigned,
    LeUnsigned,
}

/// Comparison `lhs op rhs`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Cmp {
    pub op: CmpOp,
    pub lhs: Lin,
    pub rhs: Lin,
}

impl Cmp {
    pub fn new(op: CmpOp, lhs: Lin, rhs: Lin) -> Self {
        Cmp { op, lhs, rhs }
    }

    /// Width of the compared words: the widest register involved, 64 bits between
    /// literals.
    pub fn size(&self) -> u32 {
        self.lhs
            .terms
            .iter()
            .chain(&self.rhs.terms)
            .map(|(_, v)| v.size)
            .max()
            .unwrap_or(64)
    }

    /// The flag `var` is set.
    pub fn flag(var: &Rvar) -> Self {
        Cmp::new(CmpOp::Ne, Lin::var(var), Lin::lit(0))
    }

    /// The logical negation of this comparison.
    pub fn negate(&self) -> Self {
        let (op, lhs, rhs) = match self.op {
            CmpOp::Eq => (CmpOp::Ne, &self.lhs, &self.rhs),
            CmpOp::Ne => (CmpOp::Eq, &self.lhs, &self.rhs),
            // !(a < b) is b <= a
            CmpOp::LtSigned => (CmpOp::LeSigned, &self.rhs, &self.lhs),
            CmpOp::LeSigned => (CmpOp::LtSigned, &self.rhs, &self.lhs),
            CmpOp::LtUnsigned => (CmpOp::LeUnsigned, &self.rhs, &self.lhs),
            CmpOp::LeUnsigned => (CmpOp::LtUnsigned, &self.rhs, &self.lhs),
        };
        Cmp::new(op, lhs.clone(), rhs.clone())
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::LtSigned => "<s",
            CmpOp::LeSigned => "<=s",
            CmpOp::LtUnsigned => "<u",
            CmpOp::LeUnsigned => "<=u",
        };
        write!(f, "{} {} {}", self.lhs, op, self.rhs)
    }
}

/// Right-hand side of an RREIL assignment.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Rhs {
    Lin(Lin),
    Bin(BinOp, Rval, Rval),
    /// Sets a flag to the outcome of the comparison.
    Cmp(Cmp),
    /// An undefined value.
    Arbitrary,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BranchKind {
    Jump,
    Call,
    Return,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Stmt {
    Assign { lhs: Rvar, rhs: Rhs },
    Load { lhs: Rvar, address: Lin },
    Store { address: Lin, value: Rval, size: u32 },
    Nop,
    /// Conditional jump to another statement of the same instruction.
    BranchToRReil { cond: Cmp, target: Address },
    /// Conditional jump to a native address computed by `target`.
    BranchToNative { cond: Cmp, target: Lin },
    /// Unconditional jump, call or return to a computed native address.
    Branch { kind: BranchKind, target: Lin },
    PrimOp { name: String, outs: Vec<Rvar>, ins: Vec<Rval> },
    /// A call into code that is modelled rather than analyzed.
    Native { name: String, outs: Vec<Rvar>, ins: Vec<Rval> },
    Assertion(Cmp),
}

impl Stmt {
    pub fn assign(lhs: &Rvar, rhs: Lin) -> Self {
        Stmt::Assign {
            lhs: lhs.clone(),
            rhs: Rhs::Lin(rhs),
        }
    }

    pub fn halt() -> Self {
        Stmt::PrimOp {
            name: "halt".to_string(),
            outs: Vec::new(),
            ins: Vec::new(),
        }
    }

    pub fn jump(target: u64) -> Self {
        Stmt::Branch {
            kind: BranchKind::Jump,
            target: Lin::lit(target),
        }
    }

    pub fn call(target: u64) -> Self {
        Stmt::Branch {
            kind: BranchKind::Call,
            target: Lin::lit(target),
        }
    }

    /// Whether the statement may leave the straight-line flow of its instruction.
    pub fn is_control_flow(&self) -> bool {
        match self {
            Stmt::BranchToNative { .. } | Stmt::Branch { .. } | Stmt::Native { .. } => true,
            Stmt::PrimOp { name, .. } => name == "halt",
            _ => false,
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { lhs, rhs } => match rhs {
                Rhs::Lin(lin) => write!(f, "mov {} = {}", lhs, lin),
                Rhs::Bin(op, a, b) => write!(f, "{:?} {} = {}, {}", op, lhs, a, b),
                Rhs::Cmp(cmp) => write!(f, "cmp {} = {}", lhs, cmp),
                Rhs::Arbitrary => write!(f, "undef {}", lhs),
            },
            Stmt::Load { lhs, address } => write!(f, "load {} = [{}]", lhs, address),
            Stmt::Store { address, value, size } => write!(f, "store:{} [{}] = {}", size, address, value),
            Stmt::Nop => write!(f, "nop"),
            Stmt::BranchToRReil { cond, target } => write!(f, "if {} goto {}", cond, target),
            Stmt::BranchToNative { cond, target } => write!(f, "if {} br {}", cond, target),
            Stmt::Branch { kind, target } => match kind {
                BranchKind::Jump => write!(f, "br {}", target),
                BranchKind::Call => write!(f, "call {}", target),
                BranchKind::Return => write!(f, "return {}", target),
            },
            Stmt::PrimOp { name, outs, ins } | Stmt::Native { name, outs, ins } => {
                write!(f, "prim ")?;
                if !outs.is_empty() {
                    write_list(f, outs)?;
                    write!(f, " = ")?;
                }
                write!(f, "{}(", name)?;
                write_list(f, ins)?;
                write!(f, ")")
            }
            Stmt::Assertion(cmp) => write!(f, "assert {}", cmp),
        }
    }
}

/// A statement at its address.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct RReil {
    pub address: Address,
    pub stmt: Stmt,
}

impl RReil {
    pub fn new(address: Address, stmt: Stmt) -> Self {
        RReil { address, stmt }
    }
}

impl fmt::Display for RReil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address.to_short_string(), self.stmt)
    }
}
