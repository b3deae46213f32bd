//! Calling contexts.
//!
//! A [`CallString`] is the sequence of call transitions that led to the current
//! procedure. Call strings are bounded: when a push exceeds the bound `k`, the oldest
//! transition is dropped and contexts deeper than `k` collapse onto each other.

use std::fmt;
use std::rc::Rc;

use crate::address::{Address, Transition};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CallString {
    bound: Option<usize>,
    transitions: Rc<[Transition]>,
}

impl CallString {
    /// The empty call string with no bound on its length.
    pub fn root() -> Self {
        CallString {
            bound: None,
            transitions: Rc::from(Vec::new()),
        }
    }

    /// The empty call string keeping at most `k` transitions.
    pub fn bounded(k: usize) -> Self {
        CallString {
            bound: Some(k),
            transitions: Rc::from(Vec::new()),
        }
    }

    pub fn with_bound(bound: Option<usize>) -> Self {
        match bound {
            Some(k) => CallString::bounded(k),
            None => CallString::root(),
        }
    }

    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    pub fn is_root(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// The most recently pushed transition.
    pub fn last(&self) -> Option<Transition> {
        self.transitions.last().copied()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Appends `transition`, evicting the oldest one if the bound is exceeded.
    pub fn push(&self, transition: Transition) -> Self {
        let mut transitions = Vec::with_capacity(self.transitions.len() + 1);
        transitions.extend_from_slice(&self.transitions);
        transitions.push(transition);
        if let Some(k) = self.bound {
            if transitions.len() > k {
                let excess = transitions.len() - k;
                transitions.drain(..excess);
            }
        }
        CallString {
            bound: self.bound,
            transitions: Rc::from(transitions),
        }
    }

    /// Removes the most recently pushed transition.
    ///
    /// Returns `None` for the root call string: returning from the root is program
    /// termination, not a pop.
    pub fn pop(&self) -> Option<Self> {
        let (_, rest) = self.transitions.split_last()?;
        Some(CallString {
            bound: self.bound,
            transitions: Rc::from(rest),
        })
    }
}

impl Default for CallString {
    fn default() -> Self {
        CallString::root()
    }
}

impl fmt::Display for CallString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, t) in self.transitions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, "]")
    }
}

/// A program point qualified by its calling context.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProgramCtx {
    pub call_string: CallString,
    pub address: Address,
}

impl ProgramCtx {
    pub fn new(call_string: CallString, address: Address) -> Self {
        ProgramCtx { call_string, address }
    }

    /// Same calling context, different address.
    pub fn with_address(&self, address: Address) -> Self {
        ProgramCtx {
            call_string: self.call_string.clone(),
            address,
        }
    }
}

impl fmt::Display for ProgramCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.call_string, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(source: u64, target: u64) -> Transition {
        Transition::new(Address::native(source), Address::native(target))
    }

    #[test]
    fn test_push_pop_round_trip() {
        let cs = CallString::bounded(3).push(t(1, 10));
        let pushed = cs.push(t(2, 20));
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed.last(), Some(t(2, 20)));
        assert_eq!(pushed.pop(), Some(cs.clone()));
        assert_eq!(cs.pop(), Some(CallString::bounded(3)));
    }

    #[test]
    fn test_pop_root() {
        assert!(CallString::root().is_root());
        assert_eq!(CallString::root().pop(), None);
    }

    #[test]
    fn test_k_limiting() {
        let k = 2;
        let full = CallString::bounded(k).push(t(1, 10)).push(t(2, 20)).push(t(3, 30));
        assert_eq!(full.len(), k);
        let last_two = CallString::bounded(k).push(t(2, 20)).push(t(3, 30));
        assert_eq!(full, last_two);
    }

    #[test]
    fn test_unbounded() {
        let mut cs = CallString::root();
        for i in 0..100 {
            cs = cs.push(t(i, i + 1000));
        }
        assert_eq!(cs.len(), 100);
    }

    #[test]
    fn test_zero_bound_collapses_to_root() {
        let cs = CallString::bounded(0).push(t(1, 10));
        assert!(cs.is_root());
    }

    #[test]
    fn test_program_ctx_order() {
        let cs = CallString::root();
        let a = ProgramCtx::new(cs.clone(), Address::native(1));
        let b = a.with_address(Address::native(2));
        assert!(a < b);
        assert_eq!(b.call_string, cs);
    }
}
