//! Instruction representation

use crate::alu::ALUOp;
use crate::alu::Cond;
use crate::cpu::XZR_NUM;

pub mod decode_helper;

/// NOP: `0xD503201F`
pub const NOP: u32 = 0xD503_201F;
/// HLT #0: `0xD4400000`
pub const HLT: u32 = 0xD440_0000;

/// Wrapped instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Raw representation
    pub insnbits: u32,
    /// Opcode, with aliases already resolved
    pub opcode: Opcode,
    /// Operand encoding class
    pub format: Format,
    /// Register numbers and immediates
    pub operands: Operands,
    /// Control signals
    pub controls: Controls,
}

impl Instruction {
    /// Looks up and decodes a raw instruction word
    pub fn new(insnbits: u32) -> Self {
        Self::with_opcode(insnbits, decode_helper::lookup(insnbits))
    }

    /// Decodes a word whose opcode fetch has already resolved
    pub fn with_opcode(insnbits: u32, opcode: Opcode) -> Self {
        let format = decode_helper::opcode_to_format(opcode);
        Self {
            insnbits,
            opcode,
            format,
            operands: decode_helper::parse(insnbits, opcode, format),
            controls: decode_helper::get_controls(opcode),
        }
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self::new(NOP)
    }
}

/// Supported opcodes.
/// `UBFM` only appears before alias resolution.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Opcode {
    LDUR,
    STUR,
    MOVK,
    MOVZ,
    ADD_RI,
    SUB_RI,
    ADDS_RR,
    SUBS_RR,
    CMN_RR,
    CMP_RR,
    ANDS_RR,
    TST_RR,
    ORR_RR,
    EOR_RR,
    MVN,
    UBFM,
    LSL,
    LSR,
    ASR,
    B,
    BL,
    B_COND,
    RET,
    #[default]
    NOP,
    HLT,
    ADRP,
    /// Anything the table does not recognise
    ERROR,
}

impl Opcode {
    /// Opcodes whose next PC is decided in fetch from the encoding alone
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::B | Opcode::BL | Opcode::B_COND)
    }
}

/// Operand encoding class
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Register-register arithmetic and logic
    RR,
    /// Register-immediate arithmetic
    RI,
    /// Bitfield shifts
    Shift,
    /// Wide moves
    Mov,
    /// Unscaled loads and stores
    Mem,
    Adrp,
    /// Unconditional immediate branches
    Branch,
    CondBranch,
    Ret,
    /// No operands at all
    Sys,
}

/// Register numbers and immediates pulled out of an instruction word.
/// Unused register slots hold the zero register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operands {
    pub src1: u8,
    pub src2: u8,
    pub dst: u8,
    pub imm: u64,
    /// Halfword shift for wide moves
    pub hw: u32,
    pub cond: Cond,
}

impl Default for Operands {
    fn default() -> Self {
        Self {
            src1: XZR_NUM,
            src2: XZR_NUM,
            dst: XZR_NUM,
            imm: 0,
            hw: 0,
            cond: Cond::default(),
        }
    }
}

impl Operands {
    /// The registers this instruction actually reads
    pub fn sources(&self) -> [u8; 2] {
        [self.src1, self.src2]
    }
}

/// Signals consumed by execute
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteSigs {
    /// Operand B comes from a register rather than the immediate
    pub valb_sel: bool,
    pub set_flags: bool,
}

/// Signals consumed by memory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemorySigs {
    pub dmem_read: bool,
    pub dmem_write: bool,
}

/// Signals consumed by writeback
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WritebackSigs {
    /// Destination is forced to the link register
    pub dst_sel: bool,
    /// Write the loaded value instead of the ALU result
    pub wval_sel: bool,
    pub w_enable: bool,
}

/// Control signals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub alu_op: ALUOp,
    pub x_sigs: ExecuteSigs,
    pub m_sigs: MemorySigs,
    pub w_sigs: WritebackSigs,
}
