//! Program addresses and call transitions.
//!
//! An [`Address`] identifies one RREIL statement: the `base` is the address of the
//! native instruction it was lowered from, the `offset` distinguishes the statements
//! that one native instruction expands to.

use std::fmt;

/// Address of an RREIL statement.
///
/// Ordering is lexicographic on `(base, offset)`, so all statements of one native
/// instruction sort before the statements of the next one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Address {
    base: u64,
    offset: u16,
}

impl Address {
    pub const ZERO: Address = Address { base: 0, offset: 0 };

    pub const fn new(base: u64, offset: u16) -> Self {
        Address { base, offset }
    }

    /// Address of the first statement lowered from the native instruction at `base`.
    pub const fn native(base: u64) -> Self {
        Address { base, offset: 0 }
    }

    pub fn base(self) -> u64 {
        self.base
    }

    pub fn offset(self) -> u16 {
        self.offset
    }

    /// First statement of the native instruction directly following `base`.
    pub fn next_base(self) -> Self {
        Address::native(self.base.wrapping_add(1))
    }

    /// Next statement within the same native instruction.
    pub fn next_offset(self) -> Self {
        Address::new(self.base, self.offset.wrapping_add(1))
    }

    pub fn with_offset(self, offset: u16) -> Self {
        Address::new(self.base, offset)
    }

    /// Short form used in logs: `%x` for native addresses, `%x.%02x` otherwise.
    pub fn to_short_string(self) -> String {
        if self.offset == 0 {
            format!("{:x}", self.base)
        } else {
            format!("{:x}.{:02x}", self.base, self.offset)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}.{:02x}", self.base, self.offset)
    }
}

impl From<u64> for Address {
    fn from(base: u64) -> Self {
        Address::native(base)
    }
}

/// A call edge label: the call site and the entry of the callee.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Transition {
    pub source: Address,
    pub target: Address,
}

impl Transition {
    pub fn new(source: Address, target: Address) -> Self {
        Transition { source, target }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source.to_short_string(), self.target.to_short_string())
    }
}
