//! Loaded binaries and their segments.

use std::fmt;

use num_bigint::BigInt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permissions {
    pub const RX: Permissions = Permissions {
        read: true,
        write: false,
        execute: true,
    };
    pub const R: Permissions = Permissions {
        read: true,
        write: false,
        execute: false,
    };
    pub const RW: Permissions = Permissions {
        read: true,
        write: true,
        execute: false,
    };
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.execute, 'x')
        )
    }
}

/// A contiguous piece of the address space with its initial contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Segment {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub permissions: Permissions,
    pub data: Vec<u8>,
    pub endianness: Endianness,
}

impl Segment {
    pub fn new(name: &str, address: u64, data: Vec<u8>, permissions: Permissions) -> Self {
        Segment {
            name: name.to_string(),
            address,
            size: data.len() as u64,
            permissions,
            data,
            endianness: Endianness::Little,
        }
    }

    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.address <= address && address < self.end()
    }

    /// Reads an unsigned value of `size` bits starting at `address`.
    pub fn read(&self, address: u64, size: u32) -> Option<BigInt> {
        let bytes = (size as usize).div_ceil(8);
        let start = address.checked_sub(self.address)? as usize;
        let slice = self.data.get(start..start.checked_add(bytes)?)?;
        Some(match self.endianness {
            Endianness::Little => BigInt::from_bytes_le(num_bigint::Sign::Plus, slice),
            Endianness::Big => BigInt::from_bytes_be(num_bigint::Sign::Plus, slice),
        })
    }
}

/// The segments of a loaded program.
#[derive(Debug, Clone, Default)]
pub struct Binary {
    pub name: String,
    segments: Vec<Segment>,
}

impl Binary {
    pub fn new(name: &str, segments: Vec<Segment>) -> Self {
        Binary {
            name: name.to_string(),
            segments,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_at(&self, address: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(address))
    }
}
