//! Facts passed upwards through a domain stack.

use std::collections::BTreeSet;
use std::fmt;

use num_traits::Signed;

use crate::expr::{Linear, NumVar, VarSet};

/// A set of equations, each one read as `linear == 0`.
///
/// Equations are kept with coprime coefficients and a positive leading coefficient,
/// so equal constraints are stored once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOfEquations {
    equations: BTreeSet<Linear>,
}

impl SetOfEquations {
    pub fn new() -> Self {
        SetOfEquations::default()
    }

    pub fn insert(&mut self, equation: Linear) {
        if equation.is_constant() {
            return;
        }
        let mut normal = equation.normalize();
        let leading_negative = normal
            .terms()
            .next()
            .map_or(false, |(_, c)| c.is_negative());
        if leading_negative {
            normal = normal.neg();
        }
        self.equations.insert(normal);
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Linear> {
        self.equations.iter()
    }

    pub fn extend(&mut self, other: &SetOfEquations) {
        self.equations.extend(other.equations.iter().cloned());
    }

    /// Drops every equation that mentions one of `vars`.
    pub fn remove_vars(&mut self, vars: &VarSet) {
        if vars.is_empty() {
            return;
        }
        self.equations.retain(|eq| !eq.vars().any(|v| vars.contains(v)));
    }

    pub fn mentions(&self, var: &NumVar) -> bool {
        self.equations.iter().any(|eq| eq.contains(var))
    }
}

impl FromIterator<Linear> for SetOfEquations {
    fn from_iter<I: IntoIterator<Item = Linear>>(iter: I) -> Self {
        let mut set = SetOfEquations::new();
        for eq in iter {
            set.insert(eq);
        }
        set
    }
}

impl fmt::Display for SetOfEquations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, eq) in self.equations.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = 0", eq)?;
        }
        write!(f, "}}")
    }
}

/// Equalities made available by one evaluation step to the layers above.
///
/// Each layer removes its own private variables before handing the channel up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthChannel {
    pub equalities: SetOfEquations,
}

impl SynthChannel {
    pub fn new() -> Self {
        SynthChannel::default()
    }

    pub fn is_empty(&self) -> bool {
        self.equalities.is_empty()
    }

    pub fn add_equality(&mut self, equation: Linear) {
        self.equalities.insert(equation);
    }

    pub fn remove_vars(&mut self, vars: &VarSet) {
        self.equalities.remove_vars(vars);
    }
}
