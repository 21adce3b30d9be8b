//! Pipeline registers and the payload each one carries

use crate::alu::ALUOp;
use crate::alu::Cond;
use crate::cpu::Status;
use crate::cpu::XZR_NUM;
use crate::instruction::ExecuteSigs;
use crate::instruction::MemorySigs;
use crate::instruction::Opcode;
use crate::instruction::WritebackSigs;
use crate::instruction::NOP;

/// A payload that can sit in a pipeline register
pub trait Latch: Copy {
    /// The inert value a squashed slot holds
    fn bubble() -> Self;
    fn status(&self) -> Status;
    fn set_status(&mut self, status: Status);
}

/// Per-cycle verdict for one pipeline register
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipeControl {
    #[default]
    Load,
    Bubble,
    Stall,
    /// Absorbing: once entered it is never left
    Error,
}

/// Pipeline register: what its stage consumes (`out`) and what the
/// previous stage produced this cycle (`in`)
#[derive(Clone, Copy, Debug)]
pub struct PipeReg<T: Latch> {
    input: T,
    output: T,
    ctl: PipeControl,
}

impl<T: Latch> PipeReg<T> {
    pub fn new(output: T) -> Self {
        Self { input: T::bubble(), output, ctl: PipeControl::Load }
    }

    /// What the stage reads this cycle
    pub fn out(&self) -> &T {
        &self.output
    }

    /// What the previous stage produced this cycle
    pub fn input(&self) -> &T {
        &self.input
    }

    /// Records the previous stage's output for this cycle
    pub fn stage(&mut self, value: T) {
        self.input = value;
    }

    pub fn ctl(&self) -> PipeControl {
        self.ctl
    }

    /// Sets next latch's verdict. Asking for a bubble and a stall at
    /// once is contradictory and puts the register into ERROR.
    pub fn control(&mut self, bubble: bool, stall: bool) {
        if self.ctl == PipeControl::Error {
            return;
        }
        self.ctl = match (bubble, stall) {
            (true, true) => PipeControl::Error,
            (true, false) => PipeControl::Bubble,
            (false, true) => PipeControl::Stall,
            (false, false) => PipeControl::Load,
        };
    }

    pub fn latch(&mut self) {
        match self.ctl {
            PipeControl::Load => self.output = self.input,
            PipeControl::Bubble => self.output = T::bubble(),
            PipeControl::Stall => {}
            PipeControl::Error => {
                let mut halted = T::bubble();
                halted.set_status(Status::Hlt);
                self.output = halted;
            }
        }
    }
}

/// Fetch's input: the predicted PC
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FetchIn {
    pub pred_pc: u64,
    pub status: Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeIn {
    pub insnbits: u32,
    pub op: Opcode,
    /// Address of the next sequential instruction
    pub seq_succ_pc: u64,
    /// The 4 KiB page of this instruction, for ADRP
    pub adrp_val: u64,
    pub status: Status,
}

impl Default for DecodeIn {
    fn default() -> Self {
        Self {
            insnbits: NOP,
            op: Opcode::NOP,
            seq_succ_pc: 0,
            adrp_val: 0,
            status: Status::Bub,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecuteIn {
    pub op: Opcode,
    pub alu_op: ALUOp,
    pub cond: Cond,
    pub x_sigs: ExecuteSigs,
    pub m_sigs: MemorySigs,
    pub w_sigs: WritebackSigs,
    pub val_a: u64,
    pub val_b: u64,
    pub val_imm: u64,
    pub val_hw: u32,
    pub dst: u8,
    pub seq_succ_pc: u64,
    pub status: Status,
}

impl Default for ExecuteIn {
    fn default() -> Self {
        Self {
            op: Opcode::NOP,
            alu_op: ALUOp::PASS,
            cond: Cond::default(),
            x_sigs: ExecuteSigs::default(),
            m_sigs: MemorySigs::default(),
            w_sigs: WritebackSigs::default(),
            val_a: 0,
            val_b: 0,
            val_imm: 0,
            val_hw: 0,
            dst: XZR_NUM,
            seq_succ_pc: 0,
            status: Status::Bub,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryIn {
    pub op: Opcode,
    /// Whether a conditional branch's condition held
    pub cond_holds: bool,
    pub m_sigs: MemorySigs,
    pub w_sigs: WritebackSigs,
    pub val_ex: u64,
    /// Value a store writes
    pub val_b: u64,
    pub dst: u8,
    pub seq_succ_pc: u64,
    pub status: Status,
}

impl Default for MemoryIn {
    fn default() -> Self {
        Self {
            op: Opcode::NOP,
            cond_holds: false,
            m_sigs: MemorySigs::default(),
            w_sigs: WritebackSigs::default(),
            val_ex: 0,
            val_b: 0,
            dst: XZR_NUM,
            seq_succ_pc: 0,
            status: Status::Bub,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WritebackIn {
    pub op: Opcode,
    pub w_sigs: WritebackSigs,
    pub val_ex: u64,
    pub val_mem: u64,
    pub dst: u8,
    pub status: Status,
}

impl Default for WritebackIn {
    fn default() -> Self {
        Self {
            op: Opcode::NOP,
            w_sigs: WritebackSigs::default(),
            val_ex: 0,
            val_mem: 0,
            dst: XZR_NUM,
            status: Status::Bub,
        }
    }
}

macro_rules! impl_latch {
    ($($payload:ty),*) => {
        $(
            impl Latch for $payload {
                fn bubble() -> Self {
                    Self::default()
                }

                fn status(&self) -> Status {
                    self.status
                }

                fn set_status(&mut self, status: Status) {
                    self.status = status;
                }
            }
        )*
    };
}

impl_latch!(FetchIn, DecodeIn, ExecuteIn, MemoryIn, WritebackIn);

/// The five pipeline registers
#[derive(Clone, Copy, Debug)]
pub struct PipelineState {
    pub f: PipeReg<FetchIn>,
    pub d: PipeReg<DecodeIn>,
    pub x: PipeReg<ExecuteIn>,
    pub m: PipeReg<MemoryIn>,
    pub w: PipeReg<WritebackIn>,
}

impl PipelineState {
    /// Every stage holds a bubble except fetch, which is pointed at `entry`
    pub fn make(entry: u64) -> Self {
        Self {
            f: PipeReg::new(FetchIn { pred_pc: entry, status: Status::Aok }),
            d: PipeReg::new(DecodeIn::bubble()),
            x: PipeReg::new(ExecuteIn::bubble()),
            m: PipeReg::new(MemoryIn::bubble()),
            w: PipeReg::new(WritebackIn::bubble()),
        }
    }

    pub fn latch_all(&mut self) {
        self.f.latch();
        self.d.latch();
        self.x.latch();
        self.m.latch();
        self.w.latch();
    }

    /// Whether any register has entered ERROR
    pub fn errored(&self) -> bool {
        [self.f.ctl(), self.d.ctl(), self.x.ctl(), self.m.ctl(), self.w.ctl()]
            .contains(&PipeControl::Error)
    }
}
