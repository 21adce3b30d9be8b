use std::error::Error;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use plotters::prelude::*;

use sim_lib::error::SimulatorError;
use sim_lib::memory::cache::Cache;
use sim_lib::memory::cache::CachePolicy;
use sim_lib::run_wrapper::fetch_operations;
use sim_lib::run_wrapper::replay;

fn main() -> Result<(), Box<dyn Error>> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("warn")?.start()?;

    let trace_path: PathBuf = std::env::args()
        .nth(1)
        .ok_or("You should specify exactly one trace file")?
        .into();
    let operations = fetch_operations(&trace_path)?;

    // One line series per block size, miss rate against capacity
    // Capacities: 256B, 1KB, 4KB, 16KB, 64KB
    let capacities: Vec<u64> = vec![256, 1024, 4 * 1024, 16 * 1024, 64 * 1024];
    // Block sizes: 8B, 16B, 32B, 64B
    let block_sizes: Vec<u64> = vec![8, 16, 32, 64];
    let associativity = 2;

    let mut data: Vec<Vec<(u64, f64)>> = vec![vec![]; block_sizes.len()];
    for (i, block_size) in block_sizes.iter().enumerate() {
        for capacity in capacities.iter() {
            let policy = CachePolicy::make(associativity, *block_size, *capacity, 0)?;
            let mut cache = Cache::make(policy);
            replay(&mut cache, &operations);
            data[i].push((*capacity, cache.get_miss_rate()));
        }
    }

    let trace_base_name = trace_path
        .file_name()
        .map_or_else(|| "trace".to_string(), |n| n.to_string_lossy().into_owned());
    let output_path = format!("eval/trace_eval_{}.svg", trace_base_name);
    if let Some(dir) = Path::new(&output_path).parent() {
        fs::create_dir_all(dir)?;
    }
    plot(&data, &block_sizes, &trace_base_name, &output_path)
        .map_err(|e| SimulatorError::PlotError(e.to_string()))?;

    eprintln!("Wrote {}", output_path);
    Ok(())
}

fn plot(
    data: &[Vec<(u64, f64)>],
    block_sizes: &[u64],
    trace_name: &str,
    output_path: &str,
) -> Result<(), Box<dyn Error>> {
    let plot_title = format!("Miss rate vs. capacity: {}", trace_name);

    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = data
        .iter()
        .flatten()
        .map(|(capacity, _)| *capacity as f64)
        .fold(1.0, f64::max);

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((1.0..x_max * 2.0).log_scale(), 0.0..1.0)?;
    ctx.configure_mesh()
        .x_desc("Capacity (bytes)")
        .y_desc("Miss rate")
        .draw()?;

    for (i, block_size) in block_sizes.iter().enumerate() {
        let series = data[i].iter().map(|(x, y)| (*x as f64, *y));
        let label = format!("Block size = {}", block_size);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
