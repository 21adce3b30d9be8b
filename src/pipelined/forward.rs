//! Forwarding unit

use super::pipeline::ExecuteIn;
use super::pipeline::MemoryIn;
use super::pipeline::WritebackIn;
use crate::cpu::XZR_NUM;

/// A stage that may be about to write a register
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Producer {
    pub dst: u8,
    pub w_enable: bool,
    pub value: u64,
}

impl Producer {
    fn supplies(&self, src: u8) -> bool {
        self.w_enable && self.dst == src
    }
}

/// Results not yet in the register file, nearest producer first
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardSources {
    pub execute: Producer,
    pub memory: Producer,
    pub writeback: Producer,
}

impl ForwardSources {
    /// `m_in` and `w_in` must already hold this cycle's execute
    /// and memory results
    pub fn collect(
        x_out: &ExecuteIn,
        m_in: &MemoryIn,
        m_out: &MemoryIn,
        w_in: &WritebackIn,
        w_out: &WritebackIn,
    ) -> Self {
        Self {
            execute: Producer {
                dst: x_out.dst,
                w_enable: x_out.w_sigs.w_enable,
                value: m_in.val_ex,
            },
            memory: Producer {
                dst: m_out.dst,
                w_enable: m_out.w_sigs.w_enable,
                value: if m_out.w_sigs.wval_sel { w_in.val_mem } else { m_out.val_ex },
            },
            writeback: Producer {
                dst: w_out.dst,
                w_enable: w_out.w_sigs.w_enable,
                value: if w_out.w_sigs.wval_sel { w_out.val_mem } else { w_out.val_ex },
            },
        }
    }

    /// The freshest value of `src`, falling back to `reg_value`
    pub fn forward(&self, src: u8, reg_value: u64) -> u64 {
        if src == XZR_NUM {
            return reg_value;
        }
        [self.execute, self.memory, self.writeback]
            .into_iter()
            .find(|p| p.supplies(src))
            .map_or(reg_value, |p| p.value)
    }
}
