use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use sim_lib::cpu::CPUPolicy;
use sim_lib::error::SimulatorResult;
use sim_lib::memory::cache::CachePolicy;
use sim_lib::run_wrapper::run;

const OUTPUT_PATH: &str = "eval/sim_eval.csv";

/// (associativity, block size, capacity, miss latency)
const CACHE_CONFIGS: [(u64, u64, u64, u64); 5] = [
    (1, 8, 8, 2),
    (4, 8, 32, 4),
    (1, 32, 64, 8),
    (2, 8, 64, 8),
    (4, 32, 512, 100),
];

fn main() {
    let _logger = match flexi_logger::Logger::try_with_env_or_str("warn")
        .and_then(|logger| logger.start())
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let programs: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if programs.is_empty() {
        eprintln!("Usage: sim-eval <program.elf>...");
        process::exit(2);
    }

    if let Err(e) = run_eval(&programs) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_eval(programs: &[PathBuf]) -> SimulatorResult<()> {
    if let Some(dir) = Path::new(OUTPUT_PATH).parent() {
        fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(OUTPUT_PATH)?;

    writer.write_record([
        "Program",
        "Cache",
        "Status",
        "Cycles",
        "Instructions",
        "CPI",
        "Hits",
        "Misses",
        "Dirty evictions",
        "Clean evictions",
    ])?;

    let mut caches = vec![None];
    for (a, b, c, d) in CACHE_CONFIGS {
        caches.push(Some(CachePolicy::make(a, b, c, d)?));
    }

    for program in programs {
        let name = program.display().to_string();
        eprintln!("Running program: {}", name);

        for cache in &caches {
            let label = match cache {
                Some(p) => format!(
                    "{}/{}/{}/{}",
                    p.associativity, p.block_size, p.capacity, p.miss_latency
                ),
                None => "none".to_string(),
            };
            let policy = CPUPolicy { cache: *cache, ..CPUPolicy::default() };

            match run(program, policy) {
                Ok(sim) => {
                    let history = sim.history;
                    let cache_history = sim.port.cache_history().unwrap_or_default();
                    writer.write_record([
                        name.clone(),
                        label,
                        sim.cpu.status.to_string(),
                        history.cycle_count.to_string(),
                        history.inst_count.to_string(),
                        format!("{:.3}", history.cpi()),
                        cache_history.num_hit.to_string(),
                        cache_history.num_miss.to_string(),
                        cache_history.num_dirty_evict.to_string(),
                        cache_history.num_clean_evict.to_string(),
                    ])?;
                }
                Err(e) => {
                    eprintln!("Warning: Failed to run program '{}': {}", name, e);
                    let mut record = vec![name.clone(), label];
                    record.resize(10, "Error".to_string());
                    writer.write_record(&record)?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(())
}
