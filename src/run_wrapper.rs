//! A simulator wrapper

use std::path::Path;

use log::debug;
use log::info;

use crate::cpu::CPUPolicy;
use crate::elf_helper;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;
use crate::loader;
use crate::memory::cache::Cache;
use crate::memory::cache::CacheHistory;
use crate::memory::mmu::MMU;
use crate::memory::segment::SegmentMap;
use crate::memory::AccessType;
use crate::memory::DataPort;
use crate::pipelined::Simulation;

/// Loads the ELF file and builds a simulation ready to run
pub fn prepare(elf_file: &Path, policy: CPUPolicy) -> SimulatorResult<Simulation> {
    let (elf_reader, elf_data) = elf_helper::parse_elf_file(elf_file)?;

    let mut mmu = MMU::make();
    let mut segments = SegmentMap::default();
    let entry = loader::load_elf(&mut mmu, &mut segments, &elf_reader, &elf_data)?;

    let port = DataPort::new(mmu, segments, policy.cache);
    let sim = Simulation::make(entry, port, policy);
    info!("Initial SP: {:#x}", sim.cpu.regs.sp());
    Ok(sim)
}

/// Runs the ELF file to completion and returns the finished simulation
pub fn run(elf_file: &Path, policy: CPUPolicy) -> SimulatorResult<Simulation> {
    let mut sim = prepare(elf_file, policy)?;
    sim.run();

    if policy.history {
        report_history(&sim);
    }
    Ok(sim)
}

/// Prints the run statistics
pub fn report_history(sim: &Simulation) {
    let history = &sim.history;
    eprintln!("[HISTORY] # cycles = {}", history.cycle_count);
    eprintln!("[HISTORY] # instructions = {}", history.inst_count);
    eprintln!("[HISTORY] CPI = {:.2}", history.cpi());
    eprintln!(
        "[HISTORY] load-use stalls = {}, return stalls = {}, mispredictions = {}",
        history.load_use_stalls, history.ret_stalls, history.mispredictions
    );
    eprintln!("[HISTORY] memory stall cycles = {}", history.mem_stall_count);
    if let Some(cache) = sim.port.cache() {
        eprintln!("[HISTORY] {:?}", cache.history);
        eprintln!("[HISTORY] miss rate = {:.4}", cache.get_miss_rate());
    }
}

fn trace_error(trace_path: &Path, line_num: usize, message: &str) -> SimulatorError {
    SimulatorError::TraceError(
        trace_path.into(),
        format!("{message} at line {}", line_num + 1),
    )
}

/// Fetch operations from the trace file.
/// Each non-empty line is `r` or `w` followed by a hexadecimal address.
pub fn fetch_operations(trace_path: &Path) -> SimulatorResult<Vec<(AccessType, u64)>> {
    let content = std::fs::read_to_string(trace_path)?;
    let mut operations = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let [op, address] = parts[..] else {
            return Err(trace_error(
                trace_path,
                line_num,
                "Invalid format: expected 'op address'",
            ));
        };

        let access_type = match op {
            "r" => AccessType::Read,
            "w" => AccessType::Write,
            _ => {
                return Err(trace_error(
                    trace_path,
                    line_num,
                    &format!("Invalid operation '{op}': expected 'r' or 'w'"),
                ))
            }
        };

        let Some(digits) = address.strip_prefix("0x") else {
            return Err(trace_error(
                trace_path,
                line_num,
                "Invalid address format: expected hexadecimal starting with '0x'",
            ));
        };
        let address = u64::from_str_radix(digits, 16).map_err(|_| {
            trace_error(trace_path, line_num, "Invalid hexadecimal address")
        })?;

        operations.push((access_type, address));
    }

    Ok(operations)
}

/// Replays accesses through the cache alone; misses fill with zeros
pub fn replay(cache: &mut Cache, operations: &[(AccessType, u64)]) -> CacheHistory {
    for &(access_type, address) in operations {
        if !cache.check_hit(address, access_type) {
            let evicted = cache.handle_miss(address, access_type, None);
            if evicted.valid {
                debug!(
                    "evicted {} line {:#x}",
                    if evicted.dirty { "dirty" } else { "clean" },
                    evicted.address
                );
            }
        }
    }
    cache.history
}

/// Run the trace file through the cache
pub fn run_trace(cache: &mut Cache, trace_path: &Path) -> SimulatorResult<CacheHistory> {
    let operations = fetch_operations(trace_path)?;
    Ok(replay(cache, &operations))
}
