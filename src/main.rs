use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use waygraph::builder::{ROUTE_FILE, TYPES_FILE};
use waygraph::io::FileScanner;
use waygraph::{build_route_data, BuildParameters, ConsoleProgress, RouteNode, TypeConfig};

#[derive(Parser)]
#[command(name = "waygraph")]
#[command(about = "Build the route node graph from preprocessed OSM map data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build route.dat from ways.dat, way.idx and rawrels.dat
    Build {
        /// Directory holding the input files; route.dat is written here
        #[arg(long, default_value = ".")]
        dest: PathBuf,
        /// Junctions processed per block
        #[arg(long, default_value = "500000")]
        block_size: usize,
        /// Way index pages kept in memory
        #[arg(long, default_value = "1000")]
        index_cache: usize,
        /// Memory-map ways.dat instead of buffered reads
        #[arg(long)]
        mmap_ways: bool,
        /// Memory-map way.idx instead of buffered reads
        #[arg(long)]
        mmap_index: bool,
    },
    /// Re-read route.dat and print graph statistics
    Inspect {
        /// Directory holding route.dat
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            dest,
            block_size,
            index_cache,
            mmap_ways,
            mmap_index,
        } => build(dest, block_size, index_cache, mmap_ways, mmap_index),
        Commands::Inspect { dest } => inspect(dest),
    }
}

fn build(
    dest: PathBuf,
    block_size: usize,
    index_cache: usize,
    mmap_ways: bool,
    mmap_index: bool,
) -> Result<()> {
    let types_path = dest.join(TYPES_FILE);
    let type_config = TypeConfig::load(&types_path)
        .with_context(|| format!("Failed to load type registry from {}", types_path.display()))?;

    let mut parameter = BuildParameters::new(&dest);
    parameter.route_node_block_size = block_size;
    parameter.way_index_cache_size = index_cache;
    parameter.way_data_memory_mapped = mmap_ways;
    parameter.way_index_memory_mapped = mmap_index;

    let start = Instant::now();
    let mut progress = ConsoleProgress::new();
    let summary = build_route_data(&parameter, &mut progress, &type_config)?;

    println!(
        "Wrote {} route nodes, {} paths, {} excludes in {:.2}s",
        summary.route_nodes,
        summary.paths,
        summary.excludes,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn inspect(dest: PathBuf) -> Result<()> {
    let route_path = dest.join(ROUTE_FILE);
    let mut scanner = FileScanner::open(&route_path, false)
        .with_context(|| format!("Failed to open {}", route_path.display()))?;

    let node_count = scanner.read_u32()?;
    let mut paths = 0u64;
    let mut excludes = 0u64;
    let mut max_ways = 0usize;

    for _ in 0..node_count {
        let node = RouteNode::read(&mut scanner)?;
        paths += node.paths.len() as u64;
        excludes += node.excludes.len() as u64;
        max_ways = max_ways.max(node.ways.len());
    }
    scanner.close()?;

    println!("{}: {} route nodes", route_path.display(), node_count);
    println!("  paths:    {}", paths);
    println!("  excludes: {}", excludes);
    println!("  widest junction: {} ways", max_ways);
    Ok(())
}
