//! Pipelined implementation

use log::debug;
use log::info;
use log::warn;

use crate::cpu::CPUHistory;
use crate::cpu::CPUPolicy;
use crate::cpu::CPUState;
use crate::cpu::Implementation;
use crate::cpu::Register;
use crate::cpu::Status;
use crate::memory::DataPort;
use forward::ForwardSources;
use hazard::Hazards;
use pipeline::PipelineState;

pub mod forward;
pub mod hazard;
pub mod parallel;
pub mod pipeline;
pub mod stages;

/// Everything one run mutates, owned by the cycle driver
#[derive(Clone, Debug)]
pub struct Simulation {
    pub cpu: CPUState,
    pub port: DataPort,
    pub pipes: PipelineState,
    pub history: CPUHistory,
    pub policy: CPUPolicy,
}

impl Simulation {
    /// Power-on state for a program loaded into `port`
    pub fn make(entry: u64, port: DataPort, policy: CPUPolicy) -> Self {
        let cpu = CPUState::make(entry, port.segments.stack_top());
        Self {
            cpu,
            port,
            pipes: PipelineState::make(entry),
            history: CPUHistory::default(),
            policy,
        }
    }

    /// Whether a terminal status has reached writeback
    pub fn finished(&self) -> bool {
        self.cpu.status.is_terminal()
    }

    /// Whether the driver should run another cycle
    pub fn should_continue(&self) -> bool {
        !self.finished() && self.history.cycle_count < self.policy.cycle_max
    }

    /// Runs one cycle: every stage in reverse order, then the hazard
    /// unit, then the latch
    pub fn step(&mut self) -> Hazards {
        let pipes = &mut self.pipes;

        stages::writeback(pipes.w.out(), &mut self.cpu.regs);
        pipes.w.stage(stages::memory(pipes.m.out(), &mut self.port));
        pipes.m.stage(stages::execute(pipes.x.out(), &mut self.cpu.nzcv));

        let fwd = ForwardSources::collect(
            pipes.x.out(),
            pipes.m.input(),
            pipes.m.out(),
            pipes.w.input(),
            pipes.w.out(),
        );
        pipes.x.stage(stages::decode(pipes.d.out(), &self.cpu.regs, &fwd));

        let (f_in, d_in) =
            stages::fetch(pipes.f.out(), pipes.x.out(), pipes.m.out(), &self.port);
        pipes.f.stage(f_in);
        pipes.d.stage(d_in);

        finish_cycle(
            pipes,
            &mut self.cpu.pc,
            &mut self.cpu.status,
            &mut self.history,
            self.port.in_flight(),
        )
    }

    /// Runs until a terminal status reaches writeback
    /// or the cycle budget runs out
    pub fn run(&mut self) -> Status {
        info!(
            "starting {:?} run at {:#x}, cache {}",
            self.policy.implementation,
            self.pipes.f.out().pred_pc,
            if self.port.cache().is_some() { "enabled" } else { "disabled" }
        );

        match self.policy.implementation {
            Implementation::Serial => {
                while self.should_continue() {
                    self.step();
                }
            }
            Implementation::Parallel => parallel::run(self),
        }

        if !self.finished() {
            warn!("cycle budget of {} exhausted", self.policy.cycle_max);
        }
        info!(
            "stopped with status {} after {} cycles, {} instructions",
            self.cpu.status, self.history.cycle_count, self.history.inst_count
        );
        self.cpu.status
    }
}

/// The driver's share of a cycle once every stage has staged its output
pub(crate) fn finish_cycle(
    pipes: &mut PipelineState,
    pc: &mut Register,
    status: &mut Status,
    history: &mut CPUHistory,
    in_flight: bool,
) -> Hazards {
    let w_out = pipes.w.out();
    *status = w_out.status;
    pc.write(pipes.f.input().pred_pc);

    debug!(
        "cycle {}: pc {:#x}, W {:?} {}",
        history.cycle_count,
        pc.read(),
        w_out.op,
        w_out.status
    );

    history.cycle_count += 1;
    if w_out.status != Status::Bub {
        history.inst_count += 1;
    }

    let hazards = hazard::handle_hazards(pipes, in_flight);
    history.load_use_stalls += hazards.load_use as u64;
    history.ret_stalls += hazards.ret as u64;
    history.mispredictions += hazards.mispredict as u64;
    history.mem_stall_count += hazards.in_flight as u64;

    pipes.latch_all();
    hazards
}
