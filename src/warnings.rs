//! Warnings raised while evaluating statements.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::callstring::ProgramCtx;
use crate::range::Range;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Warning {
    /// A load from an address the domains could not pin down; the result is unknown.
    UnknownLoadAddress { address: Range },
    /// A store to an address the domains could not pin down; memory was forgotten.
    UnknownStoreAddress { address: Range },
    /// The assertion may not hold.
    AssertionMayFail { assertion: String },
    /// A successor was dropped because its target is not code.
    DroppedSuccessor { target: u64, reason: String },
    /// A path ended by an explicit halt or an unhandled native call.
    Halted,
    /// A path ended in an error.
    Error { message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnknownLoadAddress { address } => write!(f, "load from unknown address {}", address),
            Warning::UnknownStoreAddress { address } => {
                write!(f, "store to unknown address {}, memory forgotten", address)
            }
            Warning::AssertionMayFail { assertion } => write!(f, "assertion may fail: {}", assertion),
            Warning::DroppedSuccessor { target, reason } => {
                write!(f, "dropped successor {:#x}: {}", target, reason)
            }
            Warning::Halted => write!(f, "halted"),
            Warning::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Warnings carried by an abstract state. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings {
    items: Rc<Vec<Warning>>,
}

impl Warnings {
    pub fn new() -> Self {
        Warnings::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn push(&mut self, warning: Warning) {
        Rc::make_mut(&mut self.items).push(warning);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.items.iter()
    }
}

/// Warnings accumulated per program point.
#[derive(Debug, Clone, Default)]
pub struct WarningsMap {
    map: BTreeMap<ProgramCtx, Vec<Warning>>,
}

impl WarningsMap {
    pub fn new() -> Self {
        WarningsMap::default()
    }

    /// Adds warnings at `ctx`, skipping ones already recorded there.
    pub fn add(&mut self, ctx: &ProgramCtx, warnings: impl IntoIterator<Item = Warning>) {
        let mut iter = warnings.into_iter().peekable();
        if iter.peek().is_none() {
            return;
        }
        let entry = self.map.entry(ctx.clone()).or_default();
        for w in iter {
            if !entry.contains(&w) {
                log::warn!("{}: {}", ctx, w);
                entry.push(w);
            }
        }
    }

    pub fn get(&self, ctx: &ProgramCtx) -> &[Warning] {
        self.map.get(ctx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total number of warnings over all points.
    pub fn count(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProgramCtx, &Vec<Warning>)> {
        self.map.iter()
    }
}
