//! Successors produced by evaluating one statement.

use std::fmt;

use crate::address::Address;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FlowKind {
    /// Fall through to the following statement.
    Next,
    Jump,
    Call,
    Return,
    /// The path ends here.
    Halt,
    /// The path ends in a failure.
    Error,
}

impl FlowKind {
    /// Edges that stay within one procedure.
    pub fn is_local(self) -> bool {
        matches!(self, FlowKind::Next | FlowKind::Jump)
    }

    /// Edges that lead to a program point.
    pub fn has_target(self) -> bool {
        !matches!(self, FlowKind::Halt | FlowKind::Error)
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowKind::Next => "next",
            FlowKind::Jump => "jump",
            FlowKind::Call => "call",
            FlowKind::Return => "return",
            FlowKind::Halt => "halt",
            FlowKind::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Successor<D> {
    pub kind: FlowKind,
    /// `None` for [`FlowKind::Halt`] and [`FlowKind::Error`].
    pub target: Option<Address>,
    pub state: D,
}

impl<D> Successor<D> {
    pub fn new(kind: FlowKind, target: Address, state: D) -> Self {
        Successor {
            kind,
            target: Some(target),
            state,
        }
    }

    pub fn halt(state: D) -> Self {
        Successor {
            kind: FlowKind::Halt,
            target: None,
            state,
        }
    }

    pub fn error(state: D) -> Self {
        Successor {
            kind: FlowKind::Error,
            target: None,
            state,
        }
    }
}

/// Successors in the order they were produced.
#[derive(Debug, Clone)]
pub struct Flows<D> {
    successors: Vec<Successor<D>>,
}

impl<D> Default for Flows<D> {
    fn default() -> Self {
        Flows { successors: Vec::new() }
    }
}

impl<D> Flows<D> {
    pub fn new() -> Self {
        Flows::default()
    }

    pub fn single(successor: Successor<D>) -> Self {
        Flows {
            successors: vec![successor],
        }
    }

    pub fn next(target: Address, state: D) -> Self {
        Flows::single(Successor::new(FlowKind::Next, target, state))
    }

    pub fn push(&mut self, successor: Successor<D>) {
        self.successors.push(successor);
    }

    pub fn extend(&mut self, other: Flows<D>) {
        self.successors.extend(other.successors);
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Successor<D>> {
        self.successors.iter()
    }

    /// Whether the path ends in an explicit halt.
    pub fn halts(&self) -> bool {
        self.successors.iter().any(|s| s.kind == FlowKind::Halt)
    }
}

impl<D> IntoIterator for Flows<D> {
    type Item = Successor<D>;
    type IntoIter = std::vec::IntoIter<Successor<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.successors.into_iter()
    }
}

impl<D> FromIterator<Successor<D>> for Flows<D> {
    fn from_iter<I: IntoIterator<Item = Successor<D>>>(iter: I) -> Self {
        Flows {
            successors: iter.into_iter().collect(),
        }
    }
}
