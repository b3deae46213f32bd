//! Lazily filled caches of decoded code.
//!
//! Code is only decoded when the analysis reaches it, so unreachable bytes are never
//! looked at.

use std::collections::BTreeMap;

use log::debug;

use crate::address::Address;
use crate::binary::Binary;
use crate::disassembler::{Disassembler, NativeInstruction};
use crate::error::{DisassemblyError, EvalError};
use crate::rreil::Stmt;

/// RREIL statements by address.
#[derive(Debug, Clone, Default)]
pub struct RReilCodeCache {
    stmts: BTreeMap<Address, Stmt>,
}

impl RReilCodeCache {
    pub fn new() -> Self {
        RReilCodeCache::default()
    }

    pub fn insert(&mut self, address: Address, stmt: Stmt) {
        self.stmts.insert(address, stmt);
    }

    pub fn get(&self, address: Address) -> Option<&Stmt> {
        self.stmts.get(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.stmts.contains_key(&address)
    }

    /// The next statement lowered from the same native instruction.
    pub fn next_with_same_base(&self, address: Address) -> Option<Address> {
        let (next, _) = self.stmts.range(address.next_offset()..).next()?;
        (next.base() == address.base() && *next > address).then_some(*next)
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// Native instructions decoded on demand, with their RREIL.
pub struct BinaryCodeCache {
    binary: Binary,
    disassembler: Box<dyn Disassembler>,
    block_wise: bool,
    instructions: BTreeMap<u64, NativeInstruction>,
    rreil: RReilCodeCache,
}

impl BinaryCodeCache {
    pub fn new(binary: Binary, disassembler: Box<dyn Disassembler>, block_wise: bool) -> Self {
        BinaryCodeCache {
            binary,
            disassembler,
            block_wise,
            instructions: BTreeMap::new(),
            rreil: RReilCodeCache::new(),
        }
    }

    pub fn binary(&self) -> &Binary {
        &self.binary
    }

    pub fn rreil(&self) -> &RReilCodeCache {
        &self.rreil
    }

    pub fn instruction(&self, address: u64) -> Option<&NativeInstruction> {
        self.instructions.get(&address)
    }

    /// Number of decoded native instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn add(&mut self, insn: NativeInstruction) {
        for r in insn.to_rreil() {
            self.rreil.insert(r.address, r.stmt);
        }
        self.instructions.insert(insn.address, insn);
    }

    /// Decodes the instruction at `address` unless it is cached.
    pub fn ensure(&mut self, address: u64) -> Result<(), DisassemblyError> {
        if self.instructions.contains_key(&address) {
            return Ok(());
        }
        if self.block_wise {
            let block = self.disassembler.decode_block(&self.binary, address)?;
            debug!("decoded block at {:#x} with {} instructions", address, block.len());
            for insn in block {
                if !self.instructions.contains_key(&insn.address) {
                    self.add(insn);
                }
            }
        } else {
            let insn = self.disassembler.decode_instruction(&self.binary, address)?;
            debug!("decoded {}", insn);
            self.add(insn);
        }
        Ok(())
    }

    /// The statement at `address`, decoding its instruction if needed.
    pub fn stmt(&mut self, address: Address) -> Result<Stmt, EvalError> {
        self.ensure(address.base())?;
        self.rreil
            .get(address)
            .cloned()
            .ok_or(EvalError::MissingStatement(address))
    }

    /// Where control goes after the statement at `address` when it falls through.
    pub fn follow(&self, address: Address) -> Address {
        if let Some(next) = self.rreil.next_with_same_base(address) {
            return next;
        }
        match self.instructions.get(&address.base()) {
            Some(insn) => Address::native(insn.next_address()),
            None => address.next_base(),
        }
    }
}
