//! A system of affine equalities in reduced form.
//!
//! Each row `key + sum(c_i * p_i) + c = 0` is stored under its key variable with the
//! key's coefficient fixed to one. A key never occurs in any other row, so every key
//! is defined by its row in terms of non-key variables ("parameters").

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use log::debug;
use num_traits::{One, Signed, Zero};

use crate::error::Infeasible;
use crate::expr::{Linear, NumVar, VarSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Equations {
    rows: Rc<BTreeMap<NumVar, Linear>>,
    /// Parameter -> keys of the rows it occurs in.
    uses: Rc<BTreeMap<NumVar, BTreeSet<NumVar>>>,
}

/// Outcome of adding an equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The equation is new; `key` was a parameter and is now defined by it.
    Inserted(NumVar),
    /// The equation already follows from the system.
    Redundant,
    /// The equation has no variable with a unit coefficient and was not kept.
    Dropped,
}

impl Equations {
    pub fn new() -> Self {
        Equations::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_key(&self, var: &NumVar) -> bool {
        self.rows.contains_key(var)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NumVar> {
        self.rows.keys()
    }

    pub fn key_set(&self) -> VarSet {
        self.rows.keys().cloned().collect()
    }

    /// All rows, each read as `row == 0`.
    pub fn rows(&self) -> impl Iterator<Item = (&NumVar, &Linear)> {
        self.rows.iter()
    }

    pub fn row(&self, key: &NumVar) -> Option<&Linear> {
        self.rows.get(key)
    }

    /// The value of `key` in terms of parameters.
    pub fn definition(&self, key: &NumVar) -> Option<Linear> {
        let row = self.rows.get(key)?;
        Some(row.sub(&Linear::var(key.clone())).neg())
    }

    /// Keys of the rows in which the parameter `var` occurs.
    pub fn users(&self, var: &NumVar) -> Vec<NumVar> {
        self.uses
            .get(var)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `var` occurs in the system, as a key or as a parameter.
    pub fn mentions(&self, var: &NumVar) -> bool {
        self.is_key(var) || self.uses.contains_key(var)
    }

    /// Replaces every key in `expr` by its definition.
    pub fn inline(&self, expr: &Linear) -> Linear {
        let mut result = expr.clone();
        for var in expr.vars() {
            if let Some(def) = self.definition(var) {
                result = result.substitute(var, &def);
            }
        }
        result
    }

    /// Whether `equation == 0` holds in every solution of the system.
    pub fn entails(&self, equation: &Linear) -> bool {
        let inlined = self.inline(equation);
        inlined.is_constant() && inlined.constant_part().is_zero()
    }

    /// Whether every row of `other` follows from this system.
    pub fn entails_all(&self, other: &Equations) -> bool {
        other.rows.values().all(|row| self.entails(row))
    }

    fn set_row(&mut self, key: NumVar, row: Linear) {
        let uses = Rc::make_mut(&mut self.uses);
        for v in row.vars() {
            if *v != key {
                uses.entry(v.clone()).or_default().insert(key.clone());
            }
        }
        Rc::make_mut(&mut self.rows).insert(key, row);
    }

    /// Removes the row of `key` and returns it.
    pub fn remove_row(&mut self, key: &NumVar) -> Option<Linear> {
        let row = Rc::make_mut(&mut self.rows).remove(key)?;
        let uses = Rc::make_mut(&mut self.uses);
        for v in row.vars() {
            if let Some(keys) = uses.get_mut(v) {
                keys.remove(key);
                if keys.is_empty() {
                    uses.remove(v);
                }
            }
        }
        Some(row)
    }

    /// Replaces the parameter `var` by `value` in all rows.
    ///
    /// `value` must not mention any key.
    pub fn substitute_param(&mut self, var: &NumVar, value: &Linear) {
        for key in self.users(var) {
            if let Some(row) = self.remove_row(&key) {
                self.set_row(key, row.substitute(var, value));
            }
        }
    }

    /// Renames `from` to the fresh variable `to`, as a key or as a parameter.
    pub fn rename(&mut self, from: &NumVar, to: &NumVar) {
        if let Some(row) = self.remove_row(from) {
            self.set_row(to.clone(), row.rename(from, to));
        } else {
            self.substitute_param(from, &Linear::var(to.clone()));
        }
    }

    /// Adds the constraint `equation == 0`.
    ///
    /// The key is chosen among the variables with coefficient ±1, preferring members of
    /// `prefer`, then the greatest variable. Fails if the equation contradicts the system.
    pub fn insert(&mut self, equation: &Linear, prefer: Option<&VarSet>) -> Result<Insertion, Infeasible> {
        let inlined = self.inline(equation);
        if inlined.is_constant() {
            return if inlined.constant_part().is_zero() {
                Ok(Insertion::Redundant)
            } else {
                Err(Infeasible)
            };
        }
        let inlined = inlined.normalize();
        let candidates: Vec<&NumVar> = inlined
            .terms()
            .filter(|(_, c)| c.abs().is_one())
            .map(|(v, _)| v)
            .collect();
        let key = candidates
            .iter()
            .rev()
            .find(|v| prefer.map_or(false, |p| p.contains(**v)))
            .or_else(|| candidates.last())
            .map(|v| (**v).clone());
        let Some(key) = key else {
            debug!("insert: dropping {} = 0 without unit coefficient", inlined);
            return Ok(Insertion::Dropped);
        };
        let row = if inlined.coefficient(&key).is_negative() {
            inlined.neg()
        } else {
            inlined
        };
        let def = row.sub(&Linear::var(key.clone())).neg();
        self.substitute_param(&key, &def);
        self.set_row(key.clone(), row);
        Ok(Insertion::Inserted(key))
    }
}

impl fmt::Display for Equations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, row)) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.definition(key) {
                Some(def) => write!(f, "{} = {}", key, def)?,
                None => write!(f, "{} = 0", row)?,
            }
        }
        write!(f, "}}")
    }
}

/// Builds a reduced system from arbitrary equations.
pub fn from_rows<I>(rows: I, prefer: Option<&VarSet>) -> Equations
where
    I: IntoIterator<Item = Linear>,
{
    let mut eqs = Equations::new();
    for row in rows {
        // the rows come from a non-empty affine space
        if eqs.insert(&row, prefer).is_err() {
            debug!("from_rows: inconsistent row {}", row);
        }
    }
    eqs
}
