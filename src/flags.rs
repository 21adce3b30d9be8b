use std::path::PathBuf;
use std::str::FromStr;

use log::info;
use log::warn;

use crate::cpu::CPUPolicy;
use crate::cpu::Implementation;
use crate::memory::cache::CachePolicy;

xflags::xflags! {
    /// ARM64 five-stage pipeline simulator.
    cmd sim-args {
        /// Path to the ELF file to simulate.
        required elf_file: PathBuf

        /// Writes the final machine state to this file.
        optional -c, --checkpoint path: PathBuf

        /// Maximum number of cycles to simulate (default 500).
        optional -l, --limit cycles: u64

        /// Enables history module, printing cycle and instruction counts after simulation.
        optional --history

        /// Specifies the simulator implementation.
        /// S: One thread, stages in reverse order (default)
        /// P: One thread per stage
        optional -i, --implementation backend: BackendArg

        /// Cache associativity. The four cache options go together.
        optional --associativity ways: u64

        /// Cache block size in bytes.
        optional --block-size bytes: u64

        /// Cache capacity in bytes.
        optional --capacity bytes: u64

        /// Extra cycles a cache miss takes.
        optional --miss-latency cycles: u64

        /// Enables verbose mode, logging the pipeline every cycle.
        optional -v, --verbose
    }
}

#[derive(Debug)]
pub enum BackendArg {
    Serial,
    Parallel,
}

impl FromStr for BackendArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "S" => Ok(BackendArg::Serial),
            "P" => Ok(BackendArg::Parallel),
            _ => Err(format!(
                "Invalid implementation: '{}'. Expected 'S' or 'P'.",
                s
            )),
        }
    }
}

impl From<BackendArg> for Implementation {
    fn from(val: BackendArg) -> Self {
        match val {
            BackendArg::Serial => Implementation::Serial,
            BackendArg::Parallel => Implementation::Parallel,
        }
    }
}

impl SimArgs {
    /// The cache described by the four cache options.
    /// A bad geometry disables the cache instead of failing the run.
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        match CachePolicy::from_parts(
            self.associativity,
            self.block_size,
            self.capacity,
            self.miss_latency,
        ) {
            Ok(Some(policy)) => Some(policy),
            Ok(None) => {
                info!("no cache configured");
                None
            }
            Err(e) => {
                warn!("{e}; running without a cache");
                None
            }
        }
    }

    pub fn policy(self) -> CPUPolicy {
        let defaults = CPUPolicy::default();
        CPUPolicy {
            cache: self.cache_policy(),
            cycle_max: self.limit.unwrap_or(defaults.cycle_max),
            history: self.history,
            implementation: self
                .implementation
                .map_or(defaults.implementation, Implementation::from),
        }
    }
}
