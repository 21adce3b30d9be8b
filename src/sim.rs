use std::error::Error;

use sim_lib::checkpoint;
use sim_lib::flags::SimArgs;
use sim_lib::run_wrapper;

fn main() -> Result<(), Box<dyn Error>> {
    let args = SimArgs::from_env_or_exit();

    let level = if args.verbose { "debug" } else { "info" };
    let _logger = flexi_logger::Logger::try_with_env_or_str(level)?.start()?;

    let checkpoint_path = args.checkpoint.clone();
    let elf_file = args.elf_file.clone();
    let sim = run_wrapper::run(&elf_file, args.policy())?;

    if let Some(path) = checkpoint_path {
        checkpoint::save_checkpoint(&path, &sim)?;
    }

    Ok(())
}
