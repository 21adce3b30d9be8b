//! Processor state for the ARM64-like core

use std::fmt;

use crate::alu::Nzcv;
use crate::memory::cache::CachePolicy;

/// Number of general purpose registers (X0-X30)
pub const GPR_COUNT: usize = 31;
/// Logical register number of the stack pointer
pub const SP_NUM: u8 = 31;
/// Logical register number of the hard-wired zero register
pub const XZR_NUM: u8 = 32;
/// Link register written by BL
pub const LINK_REG: u8 = 30;

/// Placed in X30 at start-up; returning to it halts the machine
pub const RET_FROM_MAIN_ADDR: u64 = 0x0000_DEAD_BEEF_0000;

/// Default cycle budget
pub const DEFAULT_CYCLE_MAX: u64 = 500;

/// Run status carried by every instruction through the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Status {
    /// Inert bubble
    #[default]
    Bub,
    /// Normal
    Aok,
    /// Halt instruction, or return from the entry function
    Hlt,
    /// Bad data address
    Adr,
    /// Illegal or unfetchable instruction
    Ins,
}

impl Status {
    /// Anything other than AOK or BUB stops the run once it reaches writeback
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Aok | Status::Bub)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Bub => "BUB",
            Status::Aok => "AOK",
            Status::Hlt => "HLT",
            Status::Adr => "ADR",
            Status::Ins => "INS",
        };
        f.write_str(name)
    }
}

/// Register simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Register {
    /// Current data in the register
    data: u64,
}

impl Register {
    pub fn new(data: u64) -> Self {
        Self { data }
    }

    /// Reads the register
    pub fn read(&self) -> u64 {
        self.data
    }

    /// Writes to register
    pub fn write(&mut self, value: u64) {
        self.data = value;
    }
}

/// General purpose registers plus the stack pointer,
/// addressed by logical register number
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: [Register; GPR_COUNT],
    sp: Register,
}

impl RegisterFile {
    /// 0-30 read X0-X30, 31 reads SP, anything else reads zero
    pub fn read(&self, index: u8) -> u64 {
        match index {
            i if (i as usize) < GPR_COUNT => self.gpr[i as usize].read(),
            SP_NUM => self.sp.read(),
            _ => 0,
        }
    }

    /// Writes to the zero register are dropped
    pub fn write(&mut self, index: u8, value: u64) {
        match index {
            i if (i as usize) < GPR_COUNT => self.gpr[i as usize].write(value),
            SP_NUM => self.sp.write(value),
            _ => {}
        }
    }

    pub fn sp(&self) -> u64 {
        self.sp.read()
    }

    pub fn gpr(&self) -> [u64; GPR_COUNT] {
        self.gpr.map(|r| r.read())
    }
}

/// CPU state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUState {
    /// Program counter: the next PC fetch predicted
    pub pc: Register,
    /// X0-X30 and SP
    pub regs: RegisterFile,
    /// Condition flags
    pub nzcv: Nzcv,
    /// Run status, copied from writeback every cycle
    pub status: Status,
}

impl CPUState {
    /// Power-on state for a program entered at `entry`
    /// with its stack growing down from `stack_top`
    pub fn make(entry: u64, stack_top: u64) -> Self {
        let mut cpu = Self {
            pc: Register::new(entry),
            nzcv: Nzcv::pack(false, true, false, false),
            status: Status::Aok,
            ..Default::default()
        };
        cpu.regs.write(SP_NUM, stack_top - 8);
        cpu.regs.write(LINK_REG, RET_FROM_MAIN_ADDR);
        cpu
    }
}

/// Implementation enum
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Implementation {
    /// One thread, stages called in reverse order
    #[default]
    Serial,
    /// One thread per stage, synchronised by barriers
    Parallel,
}

/// CPU policy
#[derive(Clone, Copy, Debug)]
pub struct CPUPolicy {
    pub implementation: Implementation,
    /// Stop after this many cycles even if nothing halted
    pub cycle_max: u64,
    /// Data cache geometry; `None` runs uncached
    pub cache: Option<CachePolicy>,
    /// Report the history module after the run
    pub history: bool,
}

impl Default for CPUPolicy {
    fn default() -> Self {
        Self {
            implementation: Implementation::default(),
            cycle_max: DEFAULT_CYCLE_MAX,
            cache: None,
            history: false,
        }
    }
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUHistory {
    pub cycle_count: u64,
    /// Non-bubble instructions that reached writeback
    pub inst_count: u64,
    pub load_use_stalls: u64,
    pub ret_stalls: u64,
    pub mispredictions: u64,
    /// Cycles spent waiting on a cache miss
    pub mem_stall_count: u64,
}

impl CPUHistory {
    pub fn cpi(&self) -> f64 {
        if self.inst_count == 0 {
            return 0.0;
        }
        self.cycle_count as f64 / self.inst_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_aliases() {
        let mut regs = RegisterFile::default();
        regs.write(0, 7);
        regs.write(30, 9);
        regs.write(SP_NUM, 0x1000);
        regs.write(XZR_NUM, 0xDEAD);

        assert_eq!(regs.read(0), 7);
        assert_eq!(regs.read(30), 9);
        assert_eq!(regs.read(SP_NUM), 0x1000);
        assert_eq!(regs.sp(), 0x1000);
        assert_eq!(regs.read(XZR_NUM), 0);
        // Out-of-range reads behave like the zero register
        assert_eq!(regs.read(99), 0);
    }

    #[test]
    fn test_power_on_state() {
        let cpu = CPUState::make(0x400000, 0x800000000);
        assert_eq!(cpu.pc.read(), 0x400000);
        assert_eq!(cpu.regs.sp(), 0x800000000 - 8);
        assert_eq!(cpu.regs.read(LINK_REG), RET_FROM_MAIN_ADDR);
        assert!(cpu.nzcv.z());
        assert_eq!(cpu.status, Status::Aok);
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(!Status::Aok.is_terminal());
        assert!(!Status::Bub.is_terminal());
        assert!(Status::Hlt.is_terminal());
        assert!(Status::Adr.is_terminal());
        assert!(Status::Ins.is_terminal());
    }
}
