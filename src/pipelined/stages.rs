//! The five stages.
//!
//! Each stage reads only latched pipeline registers and returns what it
//! stages into the next register. Decode additionally sees this cycle's
//! execute and memory results through the forwarding unit.

use log::debug;

use super::forward::ForwardSources;
use super::pipeline::DecodeIn;
use super::pipeline::ExecuteIn;
use super::pipeline::FetchIn;
use super::pipeline::MemoryIn;
use super::pipeline::WritebackIn;
use crate::alu::alu;
use crate::alu::Nzcv;
use crate::cpu::RegisterFile;
use crate::cpu::Status;
use crate::cpu::LINK_REG;
use crate::cpu::RET_FROM_MAIN_ADDR;
use crate::instruction::decode_helper;
use crate::instruction::Instruction;
use crate::instruction::Opcode;
use crate::instruction::HLT;
use crate::memory::AccessType;
use crate::memory::DataPort;
use crate::memory::PortResult;

const PAGE_MASK: u64 = !0xFFF;

/// PC to fetch this cycle: return targets and mispredicted branches
/// override the prediction. Zero means the program returned from its
/// entry function.
pub fn select_pc(f: &FetchIn, x_out: &ExecuteIn, m_out: &MemoryIn) -> u64 {
    if x_out.op == Opcode::RET && x_out.val_a == RET_FROM_MAIN_ADDR {
        return 0;
    }
    if m_out.op == Opcode::B_COND && !m_out.cond_holds {
        return m_out.seq_succ_pc;
    }
    if x_out.op == Opcode::RET {
        return x_out.val_a;
    }
    f.pred_pc
}

/// Branches are predicted taken
pub fn predict_pc(pc: u64, insnbits: u32, op: Opcode) -> u64 {
    if op.is_branch() {
        pc.wrapping_add_signed(decode_helper::get_branch_offset(insnbits, op))
    } else {
        pc.wrapping_add(4)
    }
}

/// IF stage. Returns fetch's own next input and decode's input.
pub fn fetch(
    f: &FetchIn,
    x_out: &ExecuteIn,
    m_out: &MemoryIn,
    port: &DataPort,
) -> (FetchIn, DecodeIn) {
    let pc = select_pc(f, x_out, m_out);

    if f.status == Status::Hlt || pc == 0 {
        let halted = DecodeIn {
            insnbits: HLT,
            op: Opcode::HLT,
            seq_succ_pc: pc,
            adrp_val: 0,
            status: Status::Hlt,
        };
        return (FetchIn { pred_pc: pc, status: Status::Hlt }, halted);
    }

    let (insnbits, op) = match port.fetch32(pc) {
        Ok(insnbits) => (insnbits, decode_helper::lookup(insnbits)),
        Err(e) => {
            debug!("instruction fetch failed: {e}");
            (0, Opcode::ERROR)
        }
    };
    let status = match op {
        Opcode::ERROR => Status::Ins,
        Opcode::HLT => Status::Hlt,
        _ => Status::Aok,
    };

    let next = FetchIn { pred_pc: predict_pc(pc, insnbits, op), status: Status::Aok };
    let d_in = DecodeIn {
        insnbits,
        op,
        seq_succ_pc: pc.wrapping_add(4),
        adrp_val: pc & PAGE_MASK,
        status,
    };
    (next, d_in)
}

/// ID stage
pub fn decode(d: &DecodeIn, regs: &RegisterFile, fwd: &ForwardSources) -> ExecuteIn {
    let inst = Instruction::with_opcode(d.insnbits, d.op);
    let operands = inst.operands;
    let controls = inst.controls;

    let mut val_a = fwd.forward(operands.src1, regs.read(operands.src1));
    let val_b = fwd.forward(operands.src2, regs.read(operands.src2));
    match d.op {
        // Keep every halfword but the one being replaced
        Opcode::MOVK => val_a &= !(0xFFFFu64 << operands.hw),
        Opcode::ADRP => val_a = d.adrp_val,
        _ => {}
    }

    ExecuteIn {
        op: d.op,
        alu_op: controls.alu_op,
        cond: operands.cond,
        x_sigs: controls.x_sigs,
        m_sigs: controls.m_sigs,
        w_sigs: controls.w_sigs,
        val_a,
        val_b,
        val_imm: operands.imm,
        val_hw: operands.hw,
        dst: if controls.w_sigs.dst_sel { LINK_REG } else { operands.dst },
        seq_succ_pc: d.seq_succ_pc,
        status: d.status,
    }
}

/// EX stage
pub fn execute(x: &ExecuteIn, nzcv: &mut Nzcv) -> MemoryIn {
    let mut m_in = MemoryIn {
        op: x.op,
        cond_holds: true,
        m_sigs: x.m_sigs,
        w_sigs: x.w_sigs,
        val_ex: 0,
        val_b: x.val_b,
        dst: x.dst,
        seq_succ_pc: x.seq_succ_pc,
        status: x.status,
    };
    if matches!(x.op, Opcode::NOP | Opcode::HLT) {
        return m_in;
    }

    let alu_b = if x.x_sigs.valb_sel { x.val_b } else { x.val_imm };
    let out = alu(x.val_a, alu_b, x.val_hw, x.alu_op, x.x_sigs.set_flags, x.cond, *nzcv);
    if x.x_sigs.set_flags {
        *nzcv = out.nzcv;
    }

    m_in.val_ex = if x.op == Opcode::BL { x.seq_succ_pc } else { out.val_e };
    if x.op == Opcode::B_COND {
        m_in.cond_holds = out.cond_val;
    }
    m_in
}

/// MEM stage
pub fn memory(m: &MemoryIn, port: &mut DataPort) -> WritebackIn {
    let mut w_in = WritebackIn {
        op: m.op,
        w_sigs: m.w_sigs,
        val_ex: m.val_ex,
        val_mem: 0,
        dst: m.dst,
        status: m.status,
    };
    if m.status != Status::Aok {
        return w_in;
    }

    let access_type = if m.m_sigs.dmem_read {
        AccessType::Read
    } else if m.m_sigs.dmem_write {
        AccessType::Write
    } else {
        return w_in;
    };

    match port.access(m.val_ex, access_type, m.val_b) {
        Ok(PortResult::Ready(value)) => w_in.val_mem = value,
        // The hazard unit bubbles writeback until the miss completes
        Ok(PortResult::Pending) => {}
        Err(e) => {
            debug!("data access failed: {e}");
            w_in.status = Status::Adr;
        }
    }
    w_in
}

/// WB stage
pub fn writeback(w: &WritebackIn, regs: &mut RegisterFile) {
    if w.status != Status::Aok {
        return;
    }
    if w.w_sigs.dst_sel {
        regs.write(LINK_REG, w.val_ex);
    } else if w.w_sigs.w_enable {
        let value = if w.w_sigs.wval_sel { w.val_mem } else { w.val_ex };
        regs.write(w.dst, value);
    }
}
