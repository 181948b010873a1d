//! Shared run resources.
//!
//! Every fixed resource name the pipeline touches lives here: output paths,
//! the disk image, the tap device. Runs are non-reentrant because these
//! names are shared; a future per-invocation namespacing scheme only has to
//! change this type.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Host tap device the guest NIC bridges to.
pub const TAP_DEVICE: &str = "tap0";

/// Fixed private IPv4 address assigned to the tap device.
pub const TAP_ADDRESS: &str = "172.31.0.20/24";

/// Filename of the bootable disk image under the output directory.
pub const IMAGE_FILENAME: &str = "larchos.img";

/// Disk image capacity in MiB. Constant regardless of payload size.
pub const IMAGE_SIZE_MIB: u32 = 64;

/// Resolved paths and resource names for one pipeline run.
pub struct RunContext {
    /// Harness crate root.
    pub base_dir: PathBuf,
    /// Workspace root containing `bootloader/`, `kernel/`, and `usr/`.
    pub workspace_root: PathBuf,
    /// Build products land here.
    pub output_dir: PathBuf,
    /// ESP staging tree, rebuilt from scratch each run.
    pub esp_dir: PathBuf,
    /// The FAT32 boot image.
    pub image_path: PathBuf,
    pub tap_device: &'static str,
    pub tap_address: &'static str,
}

impl RunContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let workspace_root = base_dir
            .parent()
            .context("harness must live inside the LarchOS workspace")?
            .to_path_buf();
        let output_dir = base_dir.join("output");
        Ok(Self {
            esp_dir: output_dir.join("esp"),
            image_path: output_dir.join(IMAGE_FILENAME),
            output_dir,
            base_dir,
            workspace_root,
            tap_device: TAP_DEVICE,
            tap_address: TAP_ADDRESS,
        })
    }

    pub fn bootloader_dir(&self) -> PathBuf {
        self.workspace_root.join("bootloader")
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.workspace_root.join("kernel")
    }

    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.workspace_root.join("usr").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_paths() {
        let ctx = RunContext::new("/work/larchos/harness").unwrap();
        assert_eq!(ctx.workspace_root, PathBuf::from("/work/larchos"));
        assert_eq!(
            ctx.image_path,
            PathBuf::from("/work/larchos/harness/output/larchos.img")
        );
        assert_eq!(ctx.esp_dir, PathBuf::from("/work/larchos/harness/output/esp"));
        assert_eq!(ctx.kernel_dir(), PathBuf::from("/work/larchos/kernel"));
        assert_eq!(
            ctx.module_dir("memtest"),
            PathBuf::from("/work/larchos/usr/memtest")
        );
    }

    #[test]
    fn test_context_rejects_rootless_base() {
        assert!(RunContext::new("/").is_err());
    }
}
