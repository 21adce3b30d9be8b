//! Decoding helper functions.
//! Every field is read through [`crate::bitfield`].

use super::Controls;
use super::ExecuteSigs;
use super::Format;
use super::MemorySigs;
use super::Opcode;
use super::Operands;
use super::WritebackSigs;
use crate::alu::ALUOp;
use crate::alu::Cond;
use crate::bitfield::insn_s;
use crate::bitfield::insn_u;
use crate::cpu::LINK_REG;
use crate::cpu::SP_NUM;
use crate::cpu::XZR_NUM;

/// Returns the opcode for the 11-bit class field in bits 31..21
pub fn raw_to_opcode(insnbits: u32) -> Opcode {
    use Opcode::*;
    match insn_u(insnbits, 21, 11) {
        0x7C2 => LDUR,
        0x7C0 => STUR,
        0x794..=0x797 => MOVK,
        0x694..=0x697 => MOVZ,
        0x488..=0x48B => ADD_RI,
        0x688..=0x68B => SUB_RI,
        0x558 => ADDS_RR,
        0x758 => SUBS_RR,
        0x750 => ANDS_RR,
        0x550 => ORR_RR,
        0x650 => EOR_RR,
        0x551 => MVN,
        0x69A | 0x69B => UBFM,
        0x49A | 0x49B => ASR,
        0x0A0..=0x0BF => B,
        0x4A0..=0x4BF => BL,
        0x2A0..=0x2A7 => B_COND,
        0x6B2 => RET,
        0x6A8 => NOP,
        0x6A2 => HLT,
        0x480..=0x487 | 0x580..=0x587 | 0x680..=0x687 | 0x780..=0x787 => {
            ADRP
        }
        _ => ERROR,
    }
}

/// Re-maps generic encodings onto the dedicated variant their
/// operand pattern selects
pub fn fix_alias(insnbits: u32, opcode: Opcode) -> Opcode {
    use Opcode::*;
    let rd_is_zr = insn_u(insnbits, 0, 5) == 31;
    match opcode {
        UBFM => {
            let immr = insn_u(insnbits, 16, 6);
            let imms = insn_u(insnbits, 10, 6);
            if imms == 63 {
                LSR
            } else if imms + 1 == immr {
                LSL
            } else {
                ERROR
            }
        }
        SUBS_RR if rd_is_zr => CMP_RR,
        ADDS_RR if rd_is_zr => CMN_RR,
        ANDS_RR if rd_is_zr => TST_RR,
        op => op,
    }
}

/// Table lookup followed by alias resolution
pub fn lookup(insnbits: u32) -> Opcode {
    fix_alias(insnbits, raw_to_opcode(insnbits))
}

/// Returns the operand encoding class of an opcode
pub fn opcode_to_format(opcode: Opcode) -> Format {
    use Opcode::*;
    match opcode {
        ADDS_RR | SUBS_RR | CMN_RR | CMP_RR | ANDS_RR | TST_RR | ORR_RR
        | EOR_RR | MVN => Format::RR,
        ADD_RI | SUB_RI => Format::RI,
        LSL | LSR | ASR => Format::Shift,
        MOVK | MOVZ => Format::Mov,
        LDUR | STUR => Format::Mem,
        ADRP => Format::Adrp,
        B | BL => Format::Branch,
        B_COND => Format::CondBranch,
        RET => Format::Ret,
        UBFM | NOP | HLT | ERROR => Format::Sys,
    }
}

pub fn get_controls(opcode: Opcode) -> Controls {
    use Opcode::*;

    Controls {
        alu_op: match opcode {
            ADDS_RR | ADD_RI | CMN_RR | STUR | LDUR | ADRP => ALUOp::PLUS,
            SUBS_RR | SUB_RI | CMP_RR => ALUOp::MINUS,
            ANDS_RR | TST_RR => ALUOp::AND,
            ORR_RR => ALUOp::OR,
            EOR_RR => ALUOp::EOR,
            MVN => ALUOp::INV,
            MOVZ | MOVK => ALUOp::MOV,
            LSL => ALUOp::LSL,
            LSR => ALUOp::LSR,
            ASR => ALUOp::ASR,
            B | BL | B_COND | RET | NOP | HLT | UBFM | ERROR => ALUOp::PASS,
        },
        x_sigs: ExecuteSigs {
            valb_sel: opcode_to_format(opcode) == Format::RR,
            set_flags: matches!(
                opcode,
                ADDS_RR | SUBS_RR | ANDS_RR | CMN_RR | CMP_RR | TST_RR
            ),
        },
        m_sigs: MemorySigs {
            dmem_read: opcode == LDUR,
            dmem_write: opcode == STUR,
        },
        w_sigs: WritebackSigs {
            dst_sel: opcode == BL,
            wval_sel: opcode == LDUR,
            w_enable: matches!(
                opcode,
                ADDS_RR
                    | SUBS_RR
                    | ANDS_RR
                    | ADD_RI
                    | SUB_RI
                    | ORR_RR
                    | EOR_RR
                    | MVN
                    | MOVZ
                    | MOVK
                    | ADRP
                    | LSL
                    | LSR
                    | ASR
                    | LDUR
                    | BL
            ),
        },
    }
}

/// Extracts register numbers and immediates for the given class
pub fn parse(insnbits: u32, opcode: Opcode, format: Format) -> Operands {
    let mut operands = Operands::default();
    match format {
        Format::RR => {
            if opcode != Opcode::MVN {
                operands.src1 = get_reg_zr(insnbits, 5);
            }
            operands.src2 = get_reg_zr(insnbits, 16);
            operands.dst = get_reg_zr(insnbits, 0);
        }
        Format::RI => {
            operands.src1 = get_reg_sp(insnbits, 5);
            operands.dst = get_reg_sp(insnbits, 0);
            let imm12 = insn_u(insnbits, 10, 12) as u64;
            operands.imm = if insn_u(insnbits, 22, 1) == 1 {
                imm12 << 12
            } else {
                imm12
            };
        }
        Format::Shift => {
            operands.src1 = get_reg_zr(insnbits, 5);
            operands.dst = get_reg_zr(insnbits, 0);
            let immr = insn_u(insnbits, 16, 6) as u64;
            operands.imm = match opcode {
                Opcode::LSL => (64 - immr) % 64,
                _ => immr,
            };
        }
        Format::Mov => {
            operands.dst = get_reg_zr(insnbits, 0);
            if opcode == Opcode::MOVK {
                operands.src1 = operands.dst;
            }
            operands.imm = insn_u(insnbits, 5, 16) as u64;
            operands.hw = insn_u(insnbits, 21, 2) * 16;
        }
        Format::Mem => {
            operands.src1 = get_reg_sp(insnbits, 5);
            let rt = get_reg_zr(insnbits, 0);
            if opcode == Opcode::STUR {
                operands.src2 = rt;
            } else {
                operands.dst = rt;
            }
            operands.imm = insn_s(insnbits, 12, 9) as u64;
        }
        Format::Adrp => {
            operands.dst = get_reg_zr(insnbits, 0);
            operands.imm = get_adrp_offset(insnbits) as u64;
        }
        Format::Branch => {
            if opcode == Opcode::BL {
                operands.dst = LINK_REG;
            }
            operands.imm = get_branch_offset(insnbits, opcode) as u64;
        }
        Format::CondBranch => {
            operands.cond = Cond::from_bits(insn_u(insnbits, 0, 4));
            operands.imm = get_branch_offset(insnbits, opcode) as u64;
        }
        Format::Ret => {
            operands.src1 = insn_u(insnbits, 5, 5) as u8;
        }
        Format::Sys => {}
    }
    operands
}

/// Byte offset of an immediate branch, or zero for anything else
pub fn get_branch_offset(insnbits: u32, opcode: Opcode) -> i64 {
    match opcode {
        Opcode::B | Opcode::BL => insn_s(insnbits, 0, 26) * 4,
        Opcode::B_COND => insn_s(insnbits, 5, 19) * 4,
        _ => 0,
    }
}

/// Page offset of an ADRP: `immhi:immlo` scaled by 4 KiB
fn get_adrp_offset(insnbits: u32) -> i64 {
    let immhi = insn_s(insnbits, 5, 19);
    let immlo = insn_u(insnbits, 29, 2) as i64;
    ((immhi << 2) | immlo) * 4096
}

/// Register field where 31 names the zero register
fn get_reg_zr(insnbits: u32, frompos: u32) -> u8 {
    match insn_u(insnbits, frompos, 5) as u8 {
        31 => XZR_NUM,
        r => r,
    }
}

/// Register field where 31 names the stack pointer
fn get_reg_sp(insnbits: u32, frompos: u32) -> u8 {
    match insn_u(insnbits, frompos, 5) as u8 {
        31 => SP_NUM,
        r => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    #[test]
    fn test_table_lookup() {
        assert_eq!(lookup(0xD503_201F), Opcode::NOP);
        assert_eq!(lookup(0xD440_0000), Opcode::HLT);
        assert_eq!(lookup(0xD65F_03C0), Opcode::RET);
        // ADD X1, X2, #5
        assert_eq!(lookup(0x9100_1441), Opcode::ADD_RI);
        // LDUR X1, [X2, #8]
        assert_eq!(lookup(0xF840_8041), Opcode::LDUR);
        // STUR X1, [X2, #-8]
        assert_eq!(lookup(0xF81F_8041), Opcode::STUR);
        // B.NE #8
        assert_eq!(lookup(0x5400_0041), Opcode::B_COND);
        assert_eq!(lookup(0x0000_0000), Opcode::ERROR);
        assert_eq!(lookup(0xFFFF_FFFF), Opcode::ERROR);
    }

    #[test]
    fn test_aliases() {
        // LSL X0, X1, #4 = UBFM X0, X1, #60, #59
        assert_eq!(lookup(0xD37C_EC20), Opcode::LSL);
        // LSR X0, X1, #4 = UBFM X0, X1, #4, #63
        assert_eq!(lookup(0xD344_FC20), Opcode::LSR);
        // UBFX X0, X1, #4, #8 has no dedicated variant
        assert_eq!(lookup(0xD344_2C20), Opcode::ERROR);
        // CMP X1, X2 = SUBS XZR, X1, X2
        assert_eq!(lookup(0xEB02_003F), Opcode::CMP_RR);
        assert_eq!(lookup(0xEB02_0020), Opcode::SUBS_RR);
        // TST X1, X2 and CMN X1, X2
        assert_eq!(lookup(0xEA02_003F), Opcode::TST_RR);
        assert_eq!(lookup(0xAB02_003F), Opcode::CMN_RR);
    }

    #[test]
    fn test_shift_amounts() {
        let lsl = Instruction::new(0xD37C_EC20);
        assert_eq!(lsl.operands.imm, 4);
        assert_eq!(lsl.operands.src1, 1);
        assert_eq!(lsl.operands.dst, 0);
        let lsr = Instruction::new(0xD344_FC20);
        assert_eq!(lsr.operands.imm, 4);
        // ASR X0, X1, #3 = SBFM X0, X1, #3, #63
        let asr = Instruction::new(0x9343_FC20);
        assert_eq!(asr.opcode, Opcode::ASR);
        assert_eq!(asr.operands.imm, 3);
    }

    #[test]
    fn test_register_classes() {
        // ADD SP, SP, #16
        let add = Instruction::new(0x9100_43FF);
        assert_eq!(add.operands.src1, SP_NUM);
        assert_eq!(add.operands.dst, SP_NUM);
        assert_eq!(add.operands.imm, 16);
        // ORR X0, XZR, X1 reads the zero register, not SP
        let orr = Instruction::new(0xAA01_03E0);
        assert_eq!(orr.operands.src1, XZR_NUM);
        assert_eq!(orr.operands.src2, 1);
        // MVN X0, X1 reads only Rm
        let mvn = Instruction::new(0xAA21_03E0);
        assert_eq!(mvn.opcode, Opcode::MVN);
        assert_eq!(mvn.operands.sources(), [XZR_NUM, 1]);
    }

    #[test]
    fn test_memory_operands() {
        let stur = Instruction::new(0xF81F_8041);
        assert_eq!(stur.operands.src1, 2);
        assert_eq!(stur.operands.src2, 1);
        assert_eq!(stur.operands.dst, XZR_NUM);
        assert_eq!(stur.operands.imm as i64, -8);
        assert!(stur.controls.m_sigs.dmem_write);

        let ldur = Instruction::new(0xF840_8041);
        assert_eq!(ldur.operands.dst, 1);
        assert_eq!(ldur.operands.imm, 8);
        assert!(ldur.controls.w_sigs.wval_sel);
    }

    #[test]
    fn test_wide_moves() {
        // MOVZ X3, #0xBEEF, LSL #16
        let movz = Instruction::new(0xD2B7_DDE3);
        assert_eq!(movz.opcode, Opcode::MOVZ);
        assert_eq!(movz.operands.imm, 0xBEEF);
        assert_eq!(movz.operands.hw, 16);
        assert_eq!(movz.operands.src1, XZR_NUM);
        // MOVK X3, #0x1234 reads its own destination
        let movk = Instruction::new(0xF282_4683);
        assert_eq!(movk.opcode, Opcode::MOVK);
        assert_eq!(movk.operands.src1, 3);
    }

    #[test]
    fn test_branch_offsets() {
        // B #-4
        assert_eq!(get_branch_offset(0x17FF_FFFF, Opcode::B), -4);
        // BL #16
        let bl = Instruction::new(0x9400_0004);
        assert_eq!(bl.opcode, Opcode::BL);
        assert_eq!(bl.operands.dst, LINK_REG);
        assert_eq!(bl.operands.imm, 16);
        // B.NE #8
        let bne = Instruction::new(0x5400_0041);
        assert_eq!(bne.operands.cond, Cond::NE);
        assert_eq!(bne.operands.imm, 8);
    }

    #[test]
    fn test_adrp_offset() {
        // ADRP X0, #0x1000 (immlo = 1)
        assert_eq!(get_adrp_offset(0xB000_0000), 4096);
        // ADRP X0, #0x10000 (immhi = 4)
        assert_eq!(get_adrp_offset(0x9000_0080), 16 * 4096);
    }

    #[test]
    fn test_controls() {
        let cmp = get_controls(Opcode::CMP_RR);
        assert_eq!(cmp.alu_op, ALUOp::MINUS);
        assert!(cmp.x_sigs.set_flags);
        assert!(!cmp.w_sigs.w_enable);

        let bl = get_controls(Opcode::BL);
        assert!(bl.w_sigs.dst_sel);
        assert_eq!(bl.alu_op, ALUOp::PASS);

        let add = get_controls(Opcode::ADD_RI);
        assert!(!add.x_sigs.valb_sel);
        assert!(!add.x_sigs.set_flags);
        assert!(add.w_sigs.w_enable);
    }
}
