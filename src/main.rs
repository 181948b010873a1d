//! LarchOS harness CLI.
//!
//! Builds the bootloader, kernel, and user modules, assembles them into a
//! bootable FAT32 image, and runs the result under QEMU. The guest reports
//! its test outcome through the debug-exit device; the harness mirrors the
//! decoded status as its own exit code.
//!
//! # Usage
//!
//! ```bash
//! # Build everything and assemble the boot image
//! larchos build
//!
//! # Full pipeline: build, assemble, run, decode the verdict
//! larchos run
//!
//! # Release kernel with extra modules and a command line
//! larchos run --release --mods init,memtest --cmdline "log=trace"
//!
//! # Host readiness report
//! larchos check
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use larchos::config::{self, BuildConfig, RawConfig};
use larchos::context::RunContext;
use larchos::verdict::Verdict;
use larchos::Timer;

#[derive(Parser)]
#[command(name = "larchos")]
#[command(author, version, about = "LarchOS build-and-test harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BuildOpts {
    /// Build with optimizations
    #[arg(long)]
    release: bool,

    /// Build without optimizations (the default)
    #[arg(long)]
    debug: bool,

    /// Kernel feature flags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    kernel_features: Vec<String>,

    /// User-space feature flags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    user_features: Vec<String>,

    /// Kernel command line
    #[arg(long)]
    cmdline: Option<String>,

    /// User modules to build and place on the image (comma-separated)
    #[arg(long, value_delimiter = ',')]
    mods: Option<Vec<String>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build all artifacts and assemble the boot image
    Build {
        #[command(flatten)]
        opts: BuildOpts,
    },

    /// Build, assemble, and run under QEMU
    Run {
        #[command(flatten)]
        opts: BuildOpts,

        /// Extra QEMU arguments, appended after the harness's own
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        qemu_args: String,

        /// Kill the emulator if the guest has not exited after N seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run host preflight checks (tools, KVM)
    Check,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { opts } => cmd_build(opts),
        Commands::Run {
            opts,
            qemu_args,
            timeout,
        } => cmd_run(opts, qemu_args, timeout),
        Commands::Check => cmd_check(),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn raw_config(opts: BuildOpts, qemu_args: &str, build_only: bool) -> RawConfig {
    RawConfig {
        release: opts.release,
        debug: opts.debug,
        kernel_features: opts.kernel_features,
        user_features: opts.user_features,
        cmdline: opts.cmdline,
        modules: opts.mods,
        qemu_args: qemu_args.split_whitespace().map(String::from).collect(),
        build_only,
    }
}

fn cmd_build(opts: BuildOpts) -> Result<i32> {
    let config = config::resolve(raw_config(opts, "", true))?;
    run_pipeline(&config, None)
}

fn cmd_run(opts: BuildOpts, qemu_args: String, timeout: Option<u64>) -> Result<i32> {
    let config = config::resolve(raw_config(opts, &qemu_args, false))?;
    run_pipeline(&config, timeout.map(Duration::from_secs))
}

fn cmd_check() -> Result<i32> {
    let report = larchos::preflight::run_all();
    report.print_summary();
    Ok(if report.is_ok() { 0 } else { 1 })
}

/// The pipeline: build artifacts, assemble the boot image, and (unless
/// configured build-only) launch QEMU and decode the guest verdict.
///
/// Returns the harness exit code: 0 after a build-only run, otherwise the
/// decoded guest status.
fn run_pipeline(config: &BuildConfig, timeout: Option<Duration>) -> Result<i32> {
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let ctx = RunContext::new(base_dir)?;

    println!("=== Building artifacts ===");
    let t = Timer::start("Build");
    let artifacts = larchos::build::build_all(&ctx, config)?;
    t.finish();

    println!("\n=== Assembling boot image ===");
    let t = Timer::start("Image");
    larchos::esp::assemble(&ctx, &artifacts)?;
    t.finish();
    println!("  Image: {}", ctx.image_path.display());

    if config.build_only {
        println!("\nBuild-only run; skipping QEMU launch.");
        return Ok(0);
    }

    println!("\n=== Launching QEMU ===");
    let exit_code = larchos::qemu::launch(&ctx, config, timeout)?;

    let verdict = Verdict::from_exit_code(exit_code);
    println!("\n=== Verdict ===");
    println!("  Guest status {}: {}", verdict.status(), verdict);

    // Mirror the guest status so scripts and CI see it directly.
    Ok(verdict.status())
}
