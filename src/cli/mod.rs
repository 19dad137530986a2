//! Command-line interface for the voxel pipeline.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::writers::{write_manifest, write_ply, write_sparse_grid_csv, GridManifest};
use crate::dataset::{JsonCatalog, Sample, SensorCatalog};
use crate::processors::pipeline::{combine_sample, process_samples_with};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "voxel-pipeline")]
#[command(about = "LiDAR point cloud to sparse voxel grid preprocessing", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse one sample's LiDAR sweeps and export them as PLY
    Combine {
        /// Directory containing the JSON metadata tables
        table_dir: PathBuf,
        /// Token of the sample to fuse
        sample_token: String,
        /// Output PLY file
        output: PathBuf,
    },

    /// Voxelize samples into sparse grids (CSV + YAML manifest per sample)
    Voxelize {
        /// Directory containing the JSON metadata tables
        table_dir: PathBuf,
        /// Output directory for grid files
        output_dir: PathBuf,
        /// Sample tokens to process (defaults to every sample)
        #[arg(long = "sample")]
        samples: Vec<String>,
        /// Process only the first sample of each scene
        #[arg(long, conflicts_with = "samples")]
        first_of_scene: bool,
        /// Limit number of samples to process
        #[arg(long)]
        limit: Option<usize>,
        /// Base seed for reproducible subsampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the effective configuration as YAML
    ShowConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Raw sweep filenames are relative to this directory.
fn data_root(config: &PipelineConfig, table_dir: &Path) -> PathBuf {
    config.sensors.data_root.clone().unwrap_or_else(|| {
        table_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Combine { table_dir, sample_token, output } => {
            cmd_combine(&table_dir, &sample_token, &output, &config)
        }
        Commands::Voxelize { table_dir, output_dir, samples, first_of_scene, limit, seed } => {
            cmd_voxelize(&table_dir, &output_dir, &samples, first_of_scene, limit, seed, config)
        }
        Commands::ShowConfig { output } => cmd_show_config(output.as_deref(), &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_combine(
    table_dir: &Path,
    sample_token: &str,
    output: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    config.validate().context("invalid configuration")?;

    let spinner = create_spinner("Loading metadata tables...");
    let catalog = JsonCatalog::load(table_dir)
        .with_context(|| format!("failed to load catalog from {}", table_dir.display()));
    let catalog = match catalog {
        Ok(catalog) => catalog,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message(format!("Fusing sensors for sample {}...", sample_token));
    let root = data_root(config, table_dir);
    let fused = catalog
        .sample(sample_token)
        .map_err(anyhow::Error::from)
        .and_then(|sample| Ok(combine_sample(&catalog, sample, &root, config)?));
    spinner.finish_and_clear();
    let cloud = fused?;

    write_ply(output, &cloud)?;

    print_summary(
        "Combine Complete",
        &[
            ("Sample", sample_token.to_string()),
            ("Channels", config.sensors.channels.join(", ")),
            ("Points", cloud.len().to_string()),
            ("Output PLY", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

/// Resolve which samples a `voxelize` run covers.
fn select_samples<'a>(
    catalog: &'a JsonCatalog,
    tokens: &[String],
    first_of_scene: bool,
    limit: Option<usize>,
) -> Result<Vec<&'a Sample>> {
    let mut samples = if !tokens.is_empty() {
        tokens
            .iter()
            .map(|token| catalog.sample(token))
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else if first_of_scene {
        catalog.first_samples_of_scenes()?
    } else {
        catalog.samples()
    };

    if let Some(limit) = limit {
        samples.truncate(limit);
    }
    Ok(samples)
}

/// CSV and manifest paths for a sample, kept inside `output_dir`.
///
/// The token must be a single plain file-name component.
fn grid_output_paths(output_dir: &Path, token: &str) -> Result<(PathBuf, PathBuf)> {
    let mut components = Path::new(token).components();
    let single_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_name || token.contains(['/', '\\']) {
        bail!("sample token {:?} is not a valid output file name", token);
    }
    Ok((
        output_dir.join(format!("{}.csv", token)),
        output_dir.join(format!("{}.yaml", token)),
    ))
}

fn cmd_voxelize(
    table_dir: &Path,
    output_dir: &Path,
    tokens: &[String],
    first_of_scene: bool,
    limit: Option<usize>,
    seed: Option<u64>,
    mut config: PipelineConfig,
) -> Result<()> {
    let start = Instant::now();

    if seed.is_some() {
        config.processing.seed = seed;
    }
    config.validate().context("invalid configuration")?;

    let catalog = JsonCatalog::load(table_dir)
        .with_context(|| format!("failed to load catalog from {}", table_dir.display()))?;
    let samples = select_samples(&catalog, tokens, first_of_scene, limit)?;
    if samples.is_empty() {
        warn!("No samples selected in {}", table_dir.display());
    }

    let root = data_root(&config, table_dir);
    println!("Voxelizing {} samples...", samples.len());
    println!("Data root: {}", root.display());
    println!("Output directory: {}", output_dir.display());

    let pb = create_progress_bar(samples.len());
    let results = process_samples_with(&catalog, &samples, &root, &config, |sample, result| {
        if let Err(e) = result {
            pb.println(format!("{}: {}", sample.token, e));
        }
        pb.inc(1);
    });
    pb.finish_and_clear();

    let mut failed = 0usize;
    let mut total_points = 0usize;
    let mut total_voxels = 0usize;
    for result in &results {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!("{}", e);
                failed += 1;
                continue;
            }
        };

        let (csv_path, manifest_path) = match grid_output_paths(output_dir, &output.sample_token) {
            Ok(paths) => paths,
            Err(e) => {
                error!("{:#}", e);
                failed += 1;
                continue;
            }
        };
        let manifest = GridManifest::new(&output.sample_token, output.num_points, &output.grid);
        let written = write_sparse_grid_csv(&csv_path, &output.grid)
            .and_then(|()| write_manifest(&manifest_path, &manifest));
        if let Err(e) = written {
            error!("Failed to write grid for {}: {}", output.sample_token, e);
            failed += 1;
            continue;
        }

        total_points += output.num_points;
        total_voxels += output.grid.num_voxels();
    }

    print_summary(
        "Voxelization Complete",
        &[
            ("Table directory", table_dir.display().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Samples", results.len().to_string()),
            ("Failed", failed.to_string()),
            ("Points", total_points.to_string()),
            ("Occupied voxels", total_voxels.to_string()),
            ("Grid shape", format!("{:?}", config.voxel.dense_shape())),
            (
                "Seed",
                config
                    .processing
                    .seed
                    .map_or_else(|| "entropy".to_string(), |s| s.to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if failed > 0 {
        bail!("{} of {} samples failed", failed, results.len());
    }
    Ok(())
}

fn cmd_show_config(output: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    match output {
        Some(path) => {
            config
                .to_yaml(path)
                .map_err(|e| anyhow!("failed to write config to {}: {}", path.display(), e))?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            let yaml = serde_yaml::to_string(config).context("failed to serialize config")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}
