//! ESP staging and FAT32 disk image assembly.
//!
//! The staging tree is rebuilt from scratch on every run so a reconfigured
//! build (different module set, different mode) can never inherit stale boot
//! artifacts. The image file is likewise re-created zeroed before
//! formatting, so no filesystem metadata survives from a previous image.
//!
//! Ordering is load-bearing: staging must be fully populated before the
//! image is formatted and filled.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::build::Artifacts;
use crate::context::{RunContext, IMAGE_SIZE_MIB};
use crate::process::Cmd;

/// Directory of the platform-mandated boot entry point inside the ESP.
pub const BOOT_ENTRY_DIR: &str = "EFI/Boot";

/// Fixed filename UEFI firmware loads from removable media.
pub const BOOT_ENTRY_FILENAME: &str = "BootX64.efi";

/// Kernel filename at the image root.
pub const KERNEL_IMAGE_NAME: &str = "kernel";

/// Local inspection copy left next to the kernel sources.
pub const KERNEL_INSPECT_NAME: &str = "kernel.bin";

/// Stage the ESP tree and pack it into the FAT32 image.
pub fn assemble(ctx: &RunContext, artifacts: &Artifacts) -> Result<()> {
    stage_esp(ctx, artifacts)?;
    create_disk_image(ctx)?;
    Ok(())
}

/// Reset and repopulate the ESP staging directory.
///
/// Layout after this call:
/// - `EFI/Boot/BootX64.efi` - the bootloader
/// - `kernel` - the kernel binary
/// - one root file per module, named after the module
pub fn stage_esp(ctx: &RunContext, artifacts: &Artifacts) -> Result<()> {
    reset_staging(&ctx.esp_dir)?;

    let boot_dir = ctx.esp_dir.join(BOOT_ENTRY_DIR);
    fs::create_dir_all(&boot_dir)
        .with_context(|| format!("Failed to create {}", boot_dir.display()))?;
    copy(&artifacts.bootloader.path, &boot_dir.join(BOOT_ENTRY_FILENAME))?;

    for module in &artifacts.modules {
        copy(&module.path, &ctx.esp_dir.join(&module.name))?;
    }

    // Inspection copy beside the kernel sources, then the boot copy.
    copy(&artifacts.kernel.path, &ctx.kernel_dir().join(KERNEL_INSPECT_NAME))?;
    copy(&artifacts.kernel.path, &ctx.esp_dir.join(KERNEL_IMAGE_NAME))?;

    Ok(())
}

/// Clear any previous staging tree, then recreate it empty.
fn reset_staging(esp_dir: &Path) -> Result<()> {
    if esp_dir.exists() {
        fs::remove_dir_all(esp_dir)
            .with_context(|| format!("Failed to clear staging at {}", esp_dir.display()))?;
    }
    fs::create_dir_all(esp_dir)
        .with_context(|| format!("Failed to create staging at {}", esp_dir.display()))?;
    Ok(())
}

fn copy(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dest.display()))?;
    Ok(())
}

/// Allocate, format, and populate the fixed-size FAT32 image.
///
/// The capacity never tracks the payload; if the payload outgrows it the
/// mcopy step fails and that failure aborts the run.
pub fn create_disk_image(ctx: &RunContext) -> Result<()> {
    let image = &ctx.image_path;
    if image.exists() {
        fs::remove_file(image)
            .with_context(|| format!("Failed to remove old image {}", image.display()))?;
    }

    println!("Creating {} MiB FAT32 image...", IMAGE_SIZE_MIB);
    Cmd::new("dd")
        .args(["if=/dev/zero", &format!("of={}", image.display())])
        .args(["bs=1M", &format!("count={}", IMAGE_SIZE_MIB)])
        .error_msg("dd failed to allocate the disk image")
        .run()?;

    Cmd::new("mkfs.vfat")
        .args(["-F", "32"])
        .arg_path(image)
        .error_msg("mkfs.vfat failed. Install: sudo dnf install dosfstools")
        .run()?;

    // Bulk-copy the whole staging tree into the image root.
    let mut cmd = Cmd::new("mcopy").args(["-s", "-i"]).arg_path(image);
    let mut entries: Vec<_> = fs::read_dir(&ctx.esp_dir)
        .with_context(|| format!("Failed to read staging at {}", ctx.esp_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        cmd = cmd.arg_path(&entry.path());
    }
    cmd.arg("::/")
        .error_msg("mcopy failed. Install: sudo dnf install mtools")
        .run()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildArtifact;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fake_artifact(dir: &Path, name: &str) -> BuildArtifact {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        BuildArtifact {
            name: name.to_string(),
            path,
            out_dir: dir.to_path_buf(),
        }
    }

    fn fake_artifacts(bin_dir: &Path, modules: &[&str]) -> Artifacts {
        Artifacts {
            bootloader: fake_artifact(bin_dir, "bootloader.efi"),
            kernel: fake_artifact(bin_dir, "kernel"),
            modules: modules.iter().map(|m| fake_artifact(bin_dir, m)).collect(),
        }
    }

    fn test_context(workspace: &TempDir) -> RunContext {
        let base_dir = workspace.path().join("harness");
        fs::create_dir_all(&base_dir).unwrap();
        fs::create_dir_all(workspace.path().join("kernel")).unwrap();
        RunContext::new(base_dir).unwrap()
    }

    fn staged_names(esp_dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(esp_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_stage_default_module_layout() {
        let workspace = TempDir::new().unwrap();
        let ctx = test_context(&workspace);
        let bins = TempDir::new().unwrap();
        let artifacts = fake_artifacts(bins.path(), &["init"]);

        stage_esp(&ctx, &artifacts).unwrap();

        // Exactly the boot entry tree, the kernel, and one module file.
        assert_eq!(staged_names(&ctx.esp_dir), vec!["EFI", "init", "kernel"]);
        assert!(ctx
            .esp_dir
            .join(BOOT_ENTRY_DIR)
            .join(BOOT_ENTRY_FILENAME)
            .exists());
        // Inspection copy lands next to the kernel sources.
        assert!(ctx.kernel_dir().join(KERNEL_INSPECT_NAME).exists());
    }

    #[test]
    fn test_restaging_drops_previous_module_set() {
        let workspace = TempDir::new().unwrap();
        let ctx = test_context(&workspace);
        let bins = TempDir::new().unwrap();

        stage_esp(&ctx, &fake_artifacts(bins.path(), &["init", "memtest"])).unwrap();
        assert!(ctx.esp_dir.join("memtest").exists());

        stage_esp(&ctx, &fake_artifacts(bins.path(), &["init"])).unwrap();
        assert!(!ctx.esp_dir.join("memtest").exists());
        assert_eq!(staged_names(&ctx.esp_dir), vec!["EFI", "init", "kernel"]);
    }

    #[test]
    fn test_reset_clears_stale_efi_subtree() {
        let workspace = TempDir::new().unwrap();
        let ctx = test_context(&workspace);

        let stale = ctx.esp_dir.join("EFI/Boot");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("stale.efi"), "old").unwrap();

        reset_staging(&ctx.esp_dir).unwrap();
        assert!(ctx.esp_dir.exists());
        assert!(!ctx.esp_dir.join("EFI").exists());
    }

    #[test]
    fn test_missing_artifact_is_fatal() {
        let workspace = TempDir::new().unwrap();
        let ctx = test_context(&workspace);
        let artifacts = Artifacts {
            bootloader: BuildArtifact {
                name: "bootloader".to_string(),
                path: PathBuf::from("/nonexistent/bootloader.efi"),
                out_dir: PathBuf::from("/nonexistent"),
            },
            kernel: BuildArtifact {
                name: "kernel".to_string(),
                path: PathBuf::from("/nonexistent/kernel"),
                out_dir: PathBuf::from("/nonexistent"),
            },
            modules: vec![],
        };
        assert!(stage_esp(&ctx, &artifacts).is_err());
    }
}
