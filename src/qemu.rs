//! QEMU launcher for the assembled LarchOS image.
//!
//! The guest kernel relies on host CPU features that only exist under
//! hardware virtualization. Without KVM the run is aborted up front with
//! [`AccelUnavailable`] instead of falling back to TCG, which is known not
//! to boot LarchOS.
//!
//! The guest signals completion through the isa-debug-exit device; its
//! status comes back as the QEMU process exit code and is decoded by
//! [`crate::verdict`].

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::BuildConfig;
use crate::context::RunContext;
use crate::process::Cmd;

/// I/O port of the isa-debug-exit device the guest writes its status to.
const DEBUG_EXIT_IOBASE: &str = "0xf4";
const DEBUG_EXIT_IOSIZE: &str = "0x04";

/// CPU feature flags the kernel requires on top of the host model.
const CPU_SPEC: &str = "host,migratable=no,+invtsc,+tsc,+x2apic,+fsgsbase";

const MEMORY_MIB: u32 = 1024;

/// The host cannot provide hardware virtualization.
///
/// Kept as a distinct type so callers can tell an environment precondition
/// apart from build or assembly failures.
#[derive(Debug, Error)]
#[error(
    "KVM not available (/dev/kvm missing). LarchOS requires hardware \
     virtualization; the software-emulation path is known not to work."
)]
pub struct AccelUnavailable;

/// Host capability probe for hardware-accelerated virtualization.
pub fn kvm_available() -> bool {
    Path::new("/dev/kvm").exists()
}

/// Find the OVMF firmware pair (code, vars) for UEFI boot.
fn find_ovmf() -> Option<(PathBuf, PathBuf)> {
    let candidates = [
        // Fedora/RHEL
        ("/usr/share/edk2/ovmf/OVMF_CODE.fd", "/usr/share/edk2/ovmf/OVMF_VARS.fd"),
        ("/usr/share/OVMF/OVMF_CODE.fd", "/usr/share/OVMF/OVMF_VARS.fd"),
        // Debian/Ubuntu
        ("/usr/share/OVMF/OVMF_CODE_4M.fd", "/usr/share/OVMF/OVMF_VARS_4M.fd"),
        // Arch
        ("/usr/share/edk2-ovmf/x64/OVMF_CODE.fd", "/usr/share/edk2-ovmf/x64/OVMF_VARS.fd"),
    ];

    for (code, vars) in candidates {
        let code = PathBuf::from(code);
        let vars = PathBuf::from(vars);
        if code.exists() && vars.exists() {
            return Some((code, vars));
        }
    }
    None
}

/// Everything that goes on the QEMU command line. Assembled fresh per run,
/// never persisted.
pub struct LaunchSpec {
    image: PathBuf,
    ovmf_code: PathBuf,
    ovmf_vars: PathBuf,
    tap_device: String,
    memory_mib: u32,
    extra_args: Vec<String>,
}

impl LaunchSpec {
    /// Construct the spec, probing host capabilities first.
    ///
    /// Fails with [`AccelUnavailable`] before any emulator process is
    /// spawned when KVM is missing.
    pub fn new(ctx: &RunContext, config: &BuildConfig) -> Result<Self> {
        if !kvm_available() {
            return Err(AccelUnavailable.into());
        }

        let (ovmf_code, ovmf_vars) = find_ovmf().context(
            "OVMF firmware not found. LarchOS boots via UEFI.\n\
             Install OVMF:\n\
             - Fedora/RHEL: sudo dnf install edk2-ovmf\n\
             - Debian/Ubuntu: sudo apt install ovmf\n\
             - Arch: sudo pacman -S edk2-ovmf",
        )?;

        Ok(Self {
            image: ctx.image_path.clone(),
            ovmf_code,
            ovmf_vars,
            tap_device: ctx.tap_device.to_string(),
            memory_mib: MEMORY_MIB,
            extra_args: config.qemu_args.clone(),
        })
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new("qemu-system-x86_64");

        cmd.args(["-enable-kvm", "-cpu", CPU_SPEC]);
        cmd.args(["-m", &self.memory_mib.to_string()]);

        // UEFI firmware chain: code + vars, both read-only.
        for firmware in [&self.ovmf_code, &self.ovmf_vars] {
            cmd.args([
                "-drive",
                &format!("if=pflash,format=raw,readonly=on,file={}", firmware.display()),
            ]);
        }

        // The boot image behind an AHCI controller.
        cmd.args([
            "-device", "ahci,id=ahci0",
            "-device", "ide-hd,drive=esp,bus=ahci0.0",
            "-drive", &format!("id=esp,if=none,format=raw,file={}", self.image.display()),
        ]);

        // Guest NIC bridged to the host tap device.
        cmd.args([
            "-netdev",
            &format!(
                "tap,id=net0,ifname={},script=no,downscript=no",
                self.tap_device
            ),
            "-device", "e1000,netdev=net0",
        ]);

        // Debug-exit device: the guest status comes back as our exit code.
        cmd.args([
            "-device",
            &format!(
                "isa-debug-exit,iobase={},iosize={}",
                DEBUG_EXIT_IOBASE, DEBUG_EXIT_IOSIZE
            ),
        ]);

        cmd.args(["-nographic", "-no-reboot"]);

        // User args last so they can override anything above.
        cmd.args(&self.extra_args);

        cmd
    }

    /// The full argument list as strings.
    pub fn command_args(&self) -> Vec<String> {
        self.to_command()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Provision the host tap device the guest NIC bridges to.
///
/// The device and its address may already exist from a previous run, so
/// failures on the two add steps are ignored; only bringing the link up has
/// to succeed.
pub fn provision_tap(ctx: &RunContext) -> Result<()> {
    let _ = Cmd::new("ip")
        .args(["tuntap", "add", ctx.tap_device, "mode", "tap"])
        .run();
    let _ = Cmd::new("ip")
        .args(["addr", "add", ctx.tap_address, "dev", ctx.tap_device])
        .run();
    Cmd::new("ip")
        .args(["link", "set", ctx.tap_device, "up"])
        .error_msg("Failed to bring up the tap device. The harness needs CAP_NET_ADMIN (run via sudo).")
        .run()
}

/// Launch QEMU against the assembled image and block until the guest exits.
///
/// Returns the raw QEMU process exit code. With a timeout, an unresponsive
/// guest is killed and reported as a harness error, never as a verdict.
pub fn launch(ctx: &RunContext, config: &BuildConfig, timeout: Option<Duration>) -> Result<i32> {
    let spec = LaunchSpec::new(ctx, config)?;
    provision_tap(ctx)?;

    println!(
        "Launching QEMU ({} MiB, KVM, tap {})...",
        MEMORY_MIB, ctx.tap_device
    );

    let mut command = spec.to_command();
    let status = match timeout {
        None => command
            .status()
            .context("Failed to run qemu-system-x86_64. Is QEMU installed?")?,
        Some(limit) => {
            let mut child = command
                .spawn()
                .context("Failed to spawn qemu-system-x86_64. Is QEMU installed?")?;
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!(
                        "TIMEOUT: guest did not exit within {}s",
                        limit.as_secs()
                    );
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    };

    status
        .code()
        .context("QEMU was terminated by a signal; no guest status available")
}
