// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simbench_core::{BenchConfig, BenchmarkReport, BenchmarkRunner, ReportFormat, StrategyKind};
use simbench_rpc::MsgpackRpcClient;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// sim-image-bench – measure camera frame throughput from a simulator over RPC
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable verbose logging (prints the running average for every frame)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the simulator camera for a fixed duration and report average FPS
    Run {
        /// Optional YAML config file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Image call to benchmark
        #[arg(long, alias = "img_benchmark_type", value_parser = ["simGetImage", "simGetImages"])]
        img_benchmark_type: Option<String>,

        /// Dump the latest frame to --viz-dir as .npy while running
        #[arg(long, alias = "enable_viz_image_cv2")]
        enable_viz_image: bool,

        /// Directory for frame dumps (default: frames)
        #[arg(long)]
        viz_dir: Option<PathBuf>,

        /// Simulator RPC host
        #[arg(long, env = "SIM_IMAGE_BENCH_HOST")]
        host: Option<String>,

        /// Simulator RPC port
        #[arg(long, env = "SIM_IMAGE_BENCH_PORT")]
        port: Option<u16>,

        /// Run duration in seconds (default: 30)
        #[arg(long)]
        duration: Option<u64>,

        /// Sleep between polls in milliseconds (default: 50)
        #[arg(long)]
        period_ms: Option<u64>,

        /// Stop after this many polls even if the duration has not elapsed
        #[arg(long)]
        max_images: Option<u64>,

        /// Report format (text, json, csv)
        #[arg(long, default_value = "text")]
        format: String,

        /// Save the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a benchmark config without connecting to the simulator
    Validate {
        /// Path to a YAML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Convert YAML to JSON and print it
        #[arg(long)]
        to_json: bool,
    },
}

/// Flag values that take precedence over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    strategy: Option<StrategyKind>,
    enable_viz_image: bool,
    viz_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    duration: Option<u64>,
    period_ms: Option<u64>,
    max_images: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut BenchConfig) {
        if let Some(strategy) = self.strategy {
            config.run_mut().strategy = Some(strategy);
        }
        if self.enable_viz_image {
            config.viz_mut().enabled = Some(true);
        }
        if let Some(dir) = self.viz_dir {
            config.viz_mut().dir = Some(dir);
        }
        if let Some(host) = self.host {
            config.simulator_mut().host = Some(host);
        }
        if let Some(port) = self.port {
            config.simulator_mut().port = Some(port);
        }
        if let Some(secs) = self.duration {
            config.run_mut().duration_secs = Some(secs);
        }
        if let Some(ms) = self.period_ms {
            config.run_mut().period_ms = Some(ms);
        }
        if let Some(max) = self.max_images {
            config.run_mut().max_images = Some(max);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up SIM_IMAGE_BENCH_* from a .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sim_image_bench={0},simbench_core={0},simbench_rpc={0}",
            log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("sim-image-bench v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Run {
            config,
            img_benchmark_type,
            enable_viz_image,
            viz_dir,
            host,
            port,
            duration,
            period_ms,
            max_images,
            format,
            output,
        } => {
            let overrides = RunOverrides {
                strategy: img_benchmark_type.as_deref().map(str::parse::<StrategyKind>).transpose()?,
                enable_viz_image,
                viz_dir,
                host,
                port,
                duration,
                period_ms,
                max_images,
            };
            run_benchmark(config.as_deref(), overrides, &format, output.as_deref()).await
        }
        Commands::Validate { config, to_json } => validate_config(&config, to_json),
    }
}

async fn run_benchmark(
    config_path: Option<&Path>,
    overrides: RunOverrides,
    format: &str,
    output_path: Option<&Path>,
) -> Result<()> {
    let format: ReportFormat = format.parse()?;

    let mut config = match config_path {
        Some(path) => {
            info!("Loading benchmark config from: {:?}", path);
            BenchConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?
        }
        None => BenchConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid benchmark configuration")?;

    let duration = config.duration();
    info!(
        "Benchmarking {} on camera '{}' at {}:{} for {:?}",
        config.strategy(),
        config.camera_name(),
        config.host(),
        config.port(),
        duration
    );

    // Connecting and the handshake are blocking socket calls
    let mut runner = tokio::task::spawn_blocking(move || -> Result<BenchmarkRunner> {
        let client = MsgpackRpcClient::connect(config.host(), config.port(), config.rpc_timeout())
            .with_context(|| format!("Failed to connect to simulator at {}:{}", config.host(), config.port()))?;
        BenchmarkRunner::from_config(&config, client)
    })
    .await
    .context("Connection task failed")??;

    runner.start()?;
    wait_for_run_end(&runner, duration).await;

    let runner = tokio::task::spawn_blocking(move || -> Result<BenchmarkRunner> {
        runner.stop()?;
        Ok(runner)
    })
    .await
    .context("Shutdown task failed")??;

    let report = runner.report();
    emit_report(&report, format, output_path)
}

/// Return once the run duration has elapsed, Ctrl-C arrives, or the poller ends by itself.
async fn wait_for_run_end(runner: &BenchmarkRunner, duration: Duration) {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut liveness = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Run duration of {:?} elapsed", duration);
                break;
            }
            _ = &mut ctrl_c => {
                warn!("Interrupted, stopping benchmark early");
                break;
            }
            _ = liveness.tick() => {
                if !runner.is_running() {
                    info!("Image callback thread finished before the run duration");
                    break;
                }
            }
        }
    }
}

fn emit_report(report: &BenchmarkReport, format: ReportFormat, output_path: Option<&Path>) -> Result<()> {
    let content = report.render(format)?;
    match output_path {
        Some(path) => {
            write_report(path, &content)?;
            eprintln!("✅ Benchmark report written to {:?}", path);
            eprintln!("{}", report.result_line());
        }
        None => print!("{}", content),
    }
    if !report.has_data() {
        warn!("No images were sampled; check that the simulator is running and the camera exists");
    }
    Ok(())
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory {:?}", parent))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write report to {:?}", path))
}

fn validate_config(config_path: &Path, to_json: bool) -> Result<()> {
    info!("Validating benchmark config: {:?}", config_path);

    let yaml_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file {:?}", config_path))?;

    if to_json {
        let json_content = simbench_core::config::yaml_to_json(&yaml_content)?;
        println!("{}", json_content);
        return Ok(());
    }

    let config = BenchConfig::from_yaml(&yaml_content)?;
    println!("✅ YAML parsing: SUCCESS");

    config.validate()?;
    println!("✅ Simulator: {}:{} (timeout {:?})", config.host(), config.port(), config.rpc_timeout());
    println!("✅ Strategy: {}", config.strategy());
    println!(
        "✅ Camera: '{}' on vehicle '{}' ({:?})",
        config.camera_name(),
        config.vehicle_name(),
        config.image_type()?
    );
    if config.strategy() == StrategyKind::SimGetImage {
        println!("  - Assumed frame shape: {}", config.single_image_shape());
    }
    println!("✅ Duration: {:?}, poll period: {:?}", config.duration(), config.period());
    if let Some(max) = config.max_images() {
        println!("  - Poll cap: {}", max);
    }
    if config.viz_enabled() {
        println!("  - Frame dumps: {:?}", config.viz_dir());
    }

    println!("🎉 Benchmark configuration is valid and ready to run!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_flag_spellings() {
        let args = Args::try_parse_from([
            "sim-image-bench",
            "run",
            "--img_benchmark_type",
            "simGetImage",
            "--enable_viz_image_cv2",
        ])
        .unwrap();
        match args.command {
            Commands::Run { img_benchmark_type, enable_viz_image, .. } => {
                assert_eq!(img_benchmark_type.as_deref(), Some("simGetImage"));
                assert!(enable_viz_image);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_benchmark_type() {
        let result = Args::try_parse_from(["sim-image-bench", "run", "--img-benchmark-type", "simGetVideo"]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_win_over_config() {
        let mut config = BenchConfig::from_yaml("run:\n  strategy: simGetImages\n  period_ms: 100\n").unwrap();
        RunOverrides {
            strategy: Some(StrategyKind::SimGetImage),
            period_ms: Some(10),
            host: Some("10.1.1.1".to_string()),
            enable_viz_image: true,
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.strategy(), StrategyKind::SimGetImage);
        assert_eq!(config.period(), Duration::from_millis(10));
        assert_eq!(config.host(), "10.1.1.1");
        assert!(config.viz_enabled());
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let mut config = BenchConfig::default();
        RunOverrides::default().apply(&mut config);
        assert_eq!(config.strategy(), StrategyKind::SimGetImages);
        assert_eq!(config.duration(), Duration::from_secs(30));
        assert!(!config.viz_enabled());
    }

    #[test]
    fn report_written_to_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        write_report(&path, "{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
