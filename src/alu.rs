//! ALU implementation

use std::fmt;

/// Set of ALU operations needed by the supported opcodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUOp {
    // Arithmetic
    #[default]
    PLUS,
    MINUS,
    // Logical
    AND,
    OR,
    EOR,
    /// `a | !b`, used for MVN
    INV,
    /// `a | (b << hw)`, used for MOVZ/MOVK
    MOV,
    // Shift
    LSL,
    LSR,
    ASR,
    /// Pass operand A through; only the condition is evaluated
    PASS,
}

/// Condition flags, packed as `N Z C V` in the low four bits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Nzcv(u8);

impl Nzcv {
    pub fn pack(n: bool, z: bool, c: bool, v: bool) -> Self {
        Self((n as u8) << 3 | (z as u8) << 2 | (c as u8) << 1 | v as u8)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0xF)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn n(&self) -> bool {
        self.0 & 0x8 != 0
    }

    pub fn z(&self) -> bool {
        self.0 & 0x4 != 0
    }

    pub fn c(&self) -> bool {
        self.0 & 0x2 != 0
    }

    pub fn v(&self) -> bool {
        self.0 & 0x1 != 0
    }
}

impl fmt::Display for Nzcv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[N,Z,C,V] = [{:x}, {:x}, {:x}, {:x}]",
            self.n() as u8,
            self.z() as u8,
            self.c() as u8,
            self.v() as u8
        )
    }
}

/// Condition codes, in encoding order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Cond {
    #[default]
    EQ,
    NE,
    CS,
    CC,
    MI,
    PL,
    VS,
    VC,
    HI,
    LS,
    GE,
    LT,
    GT,
    LE,
    AL,
    NV,
}

impl Cond {
    /// Decodes the 4-bit condition field
    pub fn from_bits(bits: u32) -> Self {
        use Cond::*;
        match bits & 0xF {
            0x0 => EQ,
            0x1 => NE,
            0x2 => CS,
            0x3 => CC,
            0x4 => MI,
            0x5 => PL,
            0x6 => VS,
            0x7 => VC,
            0x8 => HI,
            0x9 => LS,
            0xA => GE,
            0xB => LT,
            0xC => GT,
            0xD => LE,
            0xE => AL,
            _ => NV,
        }
    }

    /// Evaluates the condition against the given flags
    pub fn holds(self, flags: Nzcv) -> bool {
        use Cond::*;
        let (n, z, c, v) = (flags.n(), flags.z(), flags.c(), flags.v());
        match self {
            EQ => z,
            NE => !z,
            CS => c,
            CC => !c,
            MI => n,
            PL => !n,
            VS => v,
            VC => !v,
            HI => c && !z,
            LS => !(c && !z),
            GE => n == v,
            LT => n != v,
            GT => !z && n == v,
            LE => !(!z && n == v),
            AL | NV => true,
        }
    }
}

/// Everything the ALU produces in one evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AluOutput {
    pub val_e: u64,
    pub cond_val: bool,
    pub nzcv: Nzcv,
}

/// Performs an ALU operation.
/// Flags are recomputed only when `set_flags` is on; otherwise
/// `nzcv` passes through untouched.
pub fn alu(
    val_a: u64,
    val_b: u64,
    val_hw: u32,
    op: ALUOp,
    set_flags: bool,
    cond: Cond,
    nzcv: Nzcv,
) -> AluOutput {
    let val_e = match op {
        ALUOp::PLUS => val_a.wrapping_add(val_b),
        ALUOp::MINUS => val_a.wrapping_sub(val_b),
        ALUOp::AND => val_a & val_b,
        ALUOp::OR => val_a | val_b,
        ALUOp::EOR => val_a ^ val_b,
        ALUOp::INV => val_a | !val_b,
        ALUOp::MOV => val_a | val_b.checked_shl(val_hw).unwrap_or(0),
        ALUOp::LSL => val_a << (val_b & 0x3F),
        ALUOp::LSR => val_a >> (val_b & 0x3F),
        ALUOp::ASR => ((val_a as i64) >> (val_b & 0x3F)) as u64,
        ALUOp::PASS => val_a,
    };

    let mut out = AluOutput { val_e, cond_val: true, nzcv };
    if op == ALUOp::PASS {
        out.cond_val = cond.holds(nzcv);
    }
    if set_flags {
        out.nzcv = compute_flags(op, val_a, val_b, val_e);
        out.cond_val = cond.holds(out.nzcv);
    }
    out
}

/// N and Z come from the result.
/// C is the unsigned carry out of an addition, or "no borrow" for a
/// subtraction. V is set when both addends share a sign the result lacks,
/// or when a subtraction's operands differ in sign and the result takes
/// the sign of the subtrahend. Logical operations clear C and V.
fn compute_flags(op: ALUOp, a: u64, b: u64, result: u64) -> Nzcv {
    let n = result >> 63 == 1;
    let z = result == 0;
    let (c, v) = match op {
        ALUOp::PLUS => (result < a, ((a ^ result) & (b ^ result)) >> 63 == 1),
        ALUOp::MINUS => (a >= b, ((a ^ b) & (a ^ result)) >> 63 == 1),
        _ => (false, false),
    };
    Nzcv::pack(n, z, c, v)
}
