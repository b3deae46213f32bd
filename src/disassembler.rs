//! Decoding of native instructions into RREIL.

use std::collections::BTreeMap;
use std::fmt;

use crate::address::Address;
use crate::binary::Binary;
use crate::error::DisassemblyError;
use crate::rreil::{RReil, Stmt};

/// A decoded native instruction together with its RREIL lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeInstruction {
    pub address: u64,
    pub length: u64,
    pub mnemonic: String,
    pub stmts: Vec<Stmt>,
}

impl NativeInstruction {
    pub fn new(address: u64, length: u64, mnemonic: &str, stmts: Vec<Stmt>) -> Self {
        NativeInstruction {
            address,
            length,
            mnemonic: mnemonic.to_string(),
            stmts,
        }
    }

    /// Address of the instruction that follows in memory.
    pub fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.length.max(1))
    }

    /// The lowered statements, addressed `address.0`, `address.1`, ...
    pub fn to_rreil(&self) -> Vec<RReil> {
        self.stmts
            .iter()
            .enumerate()
            .map(|(i, stmt)| RReil::new(Address::new(self.address, i as u16), stmt.clone()))
            .collect()
    }

    pub fn is_control_flow(&self) -> bool {
        self.stmts.iter().any(Stmt::is_control_flow)
    }
}

impl fmt::Display for NativeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}: {}", self.address, self.mnemonic)
    }
}

pub trait Disassembler {
    fn decode_instruction(&self, binary: &Binary, address: u64) -> Result<NativeInstruction, DisassemblyError>;

    /// Decodes a basic block: instructions up to and including the first one that
    /// leaves the straight-line flow.
    fn decode_block(&self, binary: &Binary, address: u64) -> Result<Vec<NativeInstruction>, DisassemblyError> {
        let mut block = Vec::new();
        let mut current = address;
        loop {
            let insn = match self.decode_instruction(binary, current) {
                Ok(insn) => insn,
                Err(e) if block.is_empty() => return Err(e),
                Err(_) => break,
            };
            let done = insn.is_control_flow();
            current = insn.next_address();
            block.push(insn);
            if done {
                break;
            }
        }
        Ok(block)
    }
}

/// A program that is already lifted to RREIL, one entry per native address.
#[derive(Debug, Clone, Default)]
pub struct LiftedProgram {
    instructions: BTreeMap<u64, NativeInstruction>,
}

impl LiftedProgram {
    pub fn new() -> Self {
        LiftedProgram::default()
    }

    pub fn insert(&mut self, insn: NativeInstruction) {
        self.instructions.insert(insn.address, insn);
    }

    /// Adds a one-byte instruction at `address`.
    pub fn with(mut self, address: u64, mnemonic: &str, stmts: Vec<Stmt>) -> Self {
        self.insert(NativeInstruction::new(address, 1, mnemonic, stmts));
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl Disassembler for LiftedProgram {
    fn decode_instruction(&self, _binary: &Binary, address: u64) -> Result<NativeInstruction, DisassemblyError> {
        self.instructions
            .get(&address)
            .cloned()
            .ok_or(DisassemblyError::UnknownCodeAddress(address))
    }
}
