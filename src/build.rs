//! Cross-compilation of the bootloader, user modules, and kernel.
//!
//! Each component is an independent cargo project in the workspace, built
//! against its fixed target triple. The harness treats them as opaque
//! compilers-with-a-contract: it only knows their targets, feature flags,
//! and where the binaries come out. Any compiler failure aborts the whole
//! pipeline; diagnostics pass through to the terminal untouched.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, Mode, BOOTLOADER_TARGET, KERNEL_TARGET, USER_TARGET};
use crate::context::RunContext;
use crate::process::Cmd;

/// The kernel build reads its command line from this file in the kernel
/// source directory. Written before the kernel build starts.
pub const CMDLINE_FILENAME: &str = "cmdline.in";

/// Filename of the bootloader binary produced by the UEFI build.
pub const BOOTLOADER_BINARY: &str = "bootloader.efi";

/// Filename of the kernel binary produced by the kernel build.
pub const KERNEL_BINARY: &str = "kernel";

/// One built component: identity plus where cargo left the binary.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub name: String,
    /// The built binary.
    pub path: PathBuf,
    /// Per-mode output directory the binary lives in.
    pub out_dir: PathBuf,
}

/// Everything one Artifact Builder invocation produces.
#[derive(Debug)]
pub struct Artifacts {
    pub bootloader: BuildArtifact,
    pub kernel: BuildArtifact,
    pub modules: Vec<BuildArtifact>,
}

/// Build the bootloader, every configured user module, then the kernel.
///
/// Modules build in list order; the order carries no correctness weight.
pub fn build_all(ctx: &RunContext, config: &BuildConfig) -> Result<Artifacts> {
    let bootloader = build_bootloader(ctx, config)?;

    let mut modules = Vec::with_capacity(config.modules.len());
    for name in &config.modules {
        modules.push(build_module(ctx, config, name)?);
    }

    let kernel = build_kernel(ctx, config)?;

    Ok(Artifacts {
        bootloader,
        kernel,
        modules,
    })
}

/// Per-mode output directory for a component build.
pub fn target_out_dir(component_dir: &Path, target: &str, mode: Mode) -> PathBuf {
    component_dir.join("target").join(target).join(mode.subdir())
}

/// Cargo argument list for one cross-compilation.
///
/// Kept separate from the invocation so the flag selection is testable.
pub fn cargo_args(target: &str, mode: Mode, features: &BTreeSet<String>) -> Vec<String> {
    let mut args = vec!["build".to_string(), "--target".to_string(), target.to_string()];
    if !features.is_empty() {
        args.push("--features".to_string());
        args.push(features.iter().cloned().collect::<Vec<_>>().join(","));
    }
    if mode == Mode::Release {
        args.push("--release".to_string());
    }
    args
}

fn invoke_cargo(
    component_dir: &Path,
    target: &str,
    mode: Mode,
    features: &BTreeSet<String>,
    what: &str,
) -> Result<()> {
    Cmd::new("cargo")
        .args(cargo_args(target, mode, features))
        .current_dir(component_dir)
        .error_msg(&format!("{} build failed", what))
        .run()
}

fn build_bootloader(ctx: &RunContext, config: &BuildConfig) -> Result<BuildArtifact> {
    let dir = ctx.bootloader_dir();
    println!("Building bootloader ({})...", BOOTLOADER_TARGET);
    invoke_cargo(&dir, BOOTLOADER_TARGET, config.mode, &BTreeSet::new(), "bootloader")?;

    let out_dir = target_out_dir(&dir, BOOTLOADER_TARGET, config.mode);
    Ok(BuildArtifact {
        name: "bootloader".to_string(),
        path: out_dir.join(BOOTLOADER_BINARY),
        out_dir,
    })
}

fn build_module(ctx: &RunContext, config: &BuildConfig, name: &str) -> Result<BuildArtifact> {
    let dir = ctx.module_dir(name);
    println!("Building module '{}' ({})...", name, USER_TARGET);
    invoke_cargo(
        &dir,
        USER_TARGET,
        config.mode,
        &config.user_features,
        &format!("module '{}'", name),
    )?;

    let out_dir = target_out_dir(&dir, USER_TARGET, config.mode);
    Ok(BuildArtifact {
        name: name.to_string(),
        path: out_dir.join(name),
        out_dir,
    })
}

fn build_kernel(ctx: &RunContext, config: &BuildConfig) -> Result<BuildArtifact> {
    let dir = ctx.kernel_dir();

    // Input contract with the kernel build: the command line must be on
    // disk before cargo runs so the kernel can embed it.
    let cmdline_path = dir.join(CMDLINE_FILENAME);
    fs::write(&cmdline_path, &config.cmdline)
        .with_context(|| format!("Failed to write {}", cmdline_path.display()))?;

    println!("Building kernel ({})...", KERNEL_TARGET);
    invoke_cargo(&dir, KERNEL_TARGET, config.mode, &config.kernel_features, "kernel")?;

    let out_dir = target_out_dir(&dir, KERNEL_TARGET, config.mode);
    Ok(BuildArtifact {
        name: "kernel".to_string(),
        path: out_dir.join(KERNEL_BINARY),
        out_dir,
    })
}
