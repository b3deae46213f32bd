//! Affine hull of two equation systems.
//!
//! A point `x` lies in the hull of `A` and `B` iff `x = y + z` with `y = σ * a` and
//! `z = (1 - σ) * b` for some `a` in `A` and `b` in `B`. Homogenizing the equations of
//! `A` over `(y, σ)` and those of `B` over `(x - y, 1 - σ)` gives one system whose
//! projection onto `x` is the hull. The projection eliminates `y` and `σ` by
//! fraction-free Gaussian elimination.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use num_bigint::BigInt;
use num_traits::Zero;

use super::equations::Equations;
use crate::expr::{gcd, Linear, NumVar};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
enum Col {
    Y(NumVar),
    Sigma,
    X(NumVar),
}

#[derive(Debug, Clone)]
struct Row {
    coeffs: BTreeMap<Col, BigInt>,
    constant: BigInt,
}

impl Row {
    fn coefficient(&self, col: &Col) -> Option<&BigInt> {
        self.coeffs.get(col)
    }

    fn add_to(&mut self, col: Col, value: BigInt) {
        if value.is_zero() {
            return;
        }
        let entry = self.coeffs.entry(col.clone()).or_insert_with(BigInt::zero);
        *entry += value;
        if entry.is_zero() {
            self.coeffs.remove(&col);
        }
    }

    /// `a * self - b * other`
    fn combine(&self, a: &BigInt, other: &Row, b: &BigInt) -> Row {
        let mut result = Row {
            coeffs: self.coeffs.iter().map(|(col, c)| (col.clone(), c * a)).collect(),
            constant: &self.constant * a,
        };
        for (col, c) in &other.coeffs {
            result.add_to(col.clone(), -(c * b));
        }
        result.constant -= &other.constant * b;
        result.normalize()
    }

    fn normalize(mut self) -> Row {
        let mut g = self.constant.clone();
        for c in self.coeffs.values() {
            g = gcd(&g, c);
        }
        if !g.is_zero() && g != BigInt::from(1) {
            for c in self.coeffs.values_mut() {
                *c /= &g;
            }
            self.constant /= &g;
        }
        self
    }

    fn is_trivial(&self) -> bool {
        self.coeffs.is_empty()
    }

    fn to_linear(&self) -> Linear {
        let terms = self.coeffs.iter().filter_map(|(col, c)| match col {
            Col::X(v) => Some((c.clone(), v.clone())),
            _ => None,
        });
        Linear::from_terms(terms, self.constant.clone())
    }
}

/// Equations of the smallest affine space containing the solutions of both systems.
///
/// An empty system is the whole space, so the hull with it is empty as well.
pub fn affine_hull(fst: &Equations, snd: &Equations) -> Vec<Linear> {
    if fst.is_empty() || snd.is_empty() {
        return Vec::new();
    }
    let mut rows: Vec<Row> = Vec::new();
    let mut eliminate: BTreeSet<Col> = BTreeSet::new();
    eliminate.insert(Col::Sigma);

    // sum(c_i * y_i) + c * σ = 0
    for (_, eq) in fst.rows() {
        let mut row = Row {
            coeffs: BTreeMap::new(),
            constant: BigInt::zero(),
        };
        for (v, c) in eq.terms() {
            row.add_to(Col::Y(v.clone()), c.clone());
            eliminate.insert(Col::Y(v.clone()));
        }
        row.add_to(Col::Sigma, eq.constant_part().clone());
        rows.push(row);
    }

    // sum(c_i * (x_i - y_i)) + c * (1 - σ) = 0
    for (_, eq) in snd.rows() {
        let mut row = Row {
            coeffs: BTreeMap::new(),
            constant: eq.constant_part().clone(),
        };
        for (v, c) in eq.terms() {
            row.add_to(Col::X(v.clone()), c.clone());
            row.add_to(Col::Y(v.clone()), -c);
            eliminate.insert(Col::Y(v.clone()));
        }
        row.add_to(Col::Sigma, -eq.constant_part());
        rows.push(row);
    }

    for col in &eliminate {
        let Some(pivot_index) = rows.iter().position(|r| r.coefficient(col).is_some()) else {
            continue;
        };
        let pivot = rows.swap_remove(pivot_index);
        let Some(a) = pivot.coefficient(col).cloned() else {
            continue;
        };
        for row in rows.iter_mut() {
            if let Some(b) = row.coefficient(col).cloned() {
                *row = row.combine(&a, &pivot, &b);
            }
        }
    }

    let result: Vec<Linear> = rows
        .iter()
        .filter(|r| !r.is_trivial())
        .map(|r| r.to_linear())
        .collect();
    debug!("affine_hull: {} and {} => {} equations", fst.len(), snd.len(), result.len());
    result
}
