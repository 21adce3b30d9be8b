//! Hazard detection and pipeline control

use log::debug;
use log::warn;

use super::pipeline::PipelineState;
use crate::cpu::Status;
use crate::cpu::XZR_NUM;
use crate::instruction::Instruction;
use crate::instruction::Opcode;

/// Everything the hazard unit looks at in one cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HazardInputs {
    pub d_op: Opcode,
    /// Registers the instruction in decode reads
    pub d_sources: [u8; 2],
    pub x_op: Opcode,
    pub x_dst: u8,
    /// Execute's condition verdict from this cycle
    pub x_cond_holds: bool,
    /// Status each stage produced this cycle, fetch first
    pub statuses: [Status; 5],
    pub in_flight: bool,
}

impl HazardInputs {
    /// Reads the hazard inputs off staged pipeline registers
    pub fn collect(pipes: &PipelineState, in_flight: bool) -> Self {
        let d_out = pipes.d.out();
        let x_out = pipes.x.out();
        Self {
            d_op: d_out.op,
            d_sources: Instruction::with_opcode(d_out.insnbits, d_out.op)
                .operands
                .sources(),
            x_op: x_out.op,
            x_dst: x_out.dst,
            x_cond_holds: pipes.m.input().cond_holds,
            statuses: [
                pipes.d.input().status,
                pipes.x.input().status,
                pipes.m.input().status,
                pipes.w.input().status,
                pipes.w.out().status,
            ],
            in_flight,
        }
    }
}

/// Hazards found this cycle, after priorities are applied
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hazards {
    pub ret: bool,
    pub mispredict: bool,
    pub load_use: bool,
    pub in_flight: bool,
}

pub fn detect(inputs: &HazardInputs) -> Hazards {
    let mispredict = inputs.x_op == Opcode::B_COND && !inputs.x_cond_holds;
    let load_use = inputs.x_op == Opcode::LDUR
        && inputs.x_dst != XZR_NUM
        && inputs.d_sources.contains(&inputs.x_dst)
        && !mispredict;
    let ret = inputs.d_op == Opcode::RET && !mispredict && !load_use;
    Hazards { ret, mispredict, load_use, in_flight: inputs.in_flight }
}

/// Bubble and stall requests for one stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageControl {
    pub bubble: bool,
    pub stall: bool,
}

/// Computes the verdict for every stage, fetch first
pub fn control(inputs: &HazardInputs) -> (Hazards, [StageControl; 5]) {
    let h = detect(inputs);

    // Whatever fetch and decode produced behind a mispredicted branch
    // is about to be squashed and cannot fault
    let mut statuses = inputs.statuses;
    if h.mispredict {
        statuses[0] = Status::Bub;
        statuses[1] = Status::Bub;
    }

    // A fault in a stage freezes that stage and everything before it
    let mut errored = [false; 5];
    let mut later = false;
    for s in (0..5).rev() {
        later |= statuses[s].is_terminal();
        errored[s] = later;
    }
    let [err_f, err_d, err_x, err_m, err_w] = errored;
    let flight = h.in_flight;

    let controls = [
        StageControl {
            bubble: false,
            stall: h.ret || h.load_use || err_f || flight,
        },
        StageControl {
            bubble: (h.ret || h.mispredict) && !err_d && !flight,
            stall: h.load_use || err_d || flight,
        },
        StageControl {
            bubble: (h.mispredict || h.load_use) && !err_x && !flight,
            stall: err_x || flight,
        },
        StageControl { bubble: false, stall: err_m || flight },
        StageControl { bubble: flight, stall: err_w },
    ];
    (h, controls)
}

/// Runs the hazard unit and hands each register its verdict
pub fn handle_hazards(pipes: &mut PipelineState, in_flight: bool) -> Hazards {
    let inputs = HazardInputs::collect(pipes, in_flight);
    let (hazards, [f, d, x, m, w]) = control(&inputs);
    if hazards != Hazards::default() {
        debug!("hazards: {hazards:?}");
    }
    for (name, c) in ["F", "D", "X", "M", "W"].iter().zip([f, d, x, m, w]) {
        if c.bubble && c.stall {
            warn!("pipeline register {name} asked to bubble and stall; entering ERROR");
        }
    }
    pipes.f.control(f.bubble, f.stall);
    pipes.d.control(d.bubble, d.stall);
    pipes.x.control(x.bubble, x.stall);
    pipes.m.control(m.bubble, m.stall);
    pipes.w.control(w.bubble, w.stall);
    hazards
}
