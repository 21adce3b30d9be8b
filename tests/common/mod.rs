//! Shared helpers: a tiny ARM64 encoder and machine builders

#![allow(dead_code)]

use sim_lib::cpu::CPUPolicy;
use sim_lib::cpu::Implementation;
use sim_lib::memory::cache::CachePolicy;
use sim_lib::memory::mmu::MMU;
use sim_lib::memory::segment::SegmentMap;
use sim_lib::memory::segment::TEXT_START;
use sim_lib::memory::DataPort;
use sim_lib::pipelined::Simulation;

pub const XZR: u32 = 31;
pub const SP: u32 = 31;
pub const LR: u32 = 30;

pub const NOP: u32 = 0xD503_201F;
pub const HLT: u32 = 0xD440_0000;

pub const EQ: u32 = 0x0;
pub const NE: u32 = 0x1;
pub const LT: u32 = 0xB;

pub fn movz(rd: u32, imm16: u32, shift: u32) -> u32 {
    0xD280_0000 | (shift / 16) << 21 | imm16 << 5 | rd
}

pub fn movk(rd: u32, imm16: u32, shift: u32) -> u32 {
    0xF280_0000 | (shift / 16) << 21 | imm16 << 5 | rd
}

pub fn add_ri(rd: u32, rn: u32, imm12: u32) -> u32 {
    0x9100_0000 | imm12 << 10 | rn << 5 | rd
}

pub fn sub_ri(rd: u32, rn: u32, imm12: u32) -> u32 {
    0xD100_0000 | imm12 << 10 | rn << 5 | rd
}

pub fn adds(rd: u32, rn: u32, rm: u32) -> u32 {
    0xAB00_0000 | rm << 16 | rn << 5 | rd
}

pub fn subs(rd: u32, rn: u32, rm: u32) -> u32 {
    0xEB00_0000 | rm << 16 | rn << 5 | rd
}

pub fn cmp(rn: u32, rm: u32) -> u32 {
    subs(XZR, rn, rm)
}

pub fn orr(rd: u32, rn: u32, rm: u32) -> u32 {
    0xAA00_0000 | rm << 16 | rn << 5 | rd
}

pub fn lsl(rd: u32, rn: u32, amount: u32) -> u32 {
    let immr = (64 - amount) % 64;
    let imms = 63 - amount;
    0xD340_0000 | immr << 16 | imms << 10 | rn << 5 | rd
}

pub fn ldur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xF840_0000 | ((imm9 as u32) & 0x1FF) << 12 | rn << 5 | rt
}

pub fn stur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xF800_0000 | ((imm9 as u32) & 0x1FF) << 12 | rn << 5 | rt
}

pub fn b(offset: i32) -> u32 {
    0x1400_0000 | ((offset / 4) as u32 & 0x03FF_FFFF)
}

pub fn bl(offset: i32) -> u32 {
    0x9400_0000 | ((offset / 4) as u32 & 0x03FF_FFFF)
}

pub fn b_cond(cond: u32, offset: i32) -> u32 {
    0x5400_0000 | ((offset / 4) as u32 & 0x7_FFFF) << 5 | cond
}

pub fn ret() -> u32 {
    0xD65F_0000 | LR << 5
}

/// Places `program` at the start of the text segment
pub fn load(program: &[u32]) -> MMU {
    let mut mmu = MMU::make();
    for (i, insn) in program.iter().enumerate() {
        mmu.write_block(TEXT_START + 4 * i as u64, &insn.to_le_bytes());
    }
    mmu
}

pub fn policy(implementation: Implementation, cache: Option<CachePolicy>) -> CPUPolicy {
    CPUPolicy { implementation, cycle_max: 2000, cache, history: false }
}

pub fn machine(program: &[u32], policy: CPUPolicy) -> Simulation {
    let port = DataPort::new(load(program), SegmentMap::default(), policy.cache);
    Simulation::make(TEXT_START, port, policy)
}

/// Runs `program` to completion
pub fn run(program: &[u32], policy: CPUPolicy) -> Simulation {
    let mut sim = machine(program, policy);
    sim.run();
    sim
}

pub const BACKENDS: [Implementation; 2] = [Implementation::Serial, Implementation::Parallel];
