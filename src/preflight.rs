//! Preflight checks for the LarchOS harness.
//!
//! Validates host prerequisites BEFORE any expensive build work starts:
//! required external tools and hardware-virtualization support.

use crate::process::which;
use crate::qemu;

/// Required host tools with purpose and install suggestion.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("cargo", "Cross-compile bootloader, kernel, and modules", "install Rust via rustup"),
    ("qemu-system-x86_64", "Run the assembled image", "sudo dnf install qemu-system-x86"),
    ("dd", "Allocate the disk image", "sudo dnf install coreutils"),
    ("mkfs.vfat", "Format the FAT32 image", "sudo dnf install dosfstools"),
    ("mcopy", "Populate the FAT32 image", "sudo dnf install mtools"),
    ("ip", "Provision the tap network device", "sudo dnf install iproute"),
];

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub suggestion: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Comprehensive preflight report.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        if self.is_ok() {
            println!(
                "All preflight checks passed ({}/{})",
                self.passed_count(),
                self.checks.len()
            );
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.checks.len()
            );
        }
    }
}

/// Check that all required host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, purpose, install)| check_tool(tool, purpose, install))
        .collect()
}

fn check_tool(tool: &str, purpose: &str, install_cmd: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(
            format!("{} tool", tool),
            format!("Found at {} ({})", path.display(), purpose),
        ),
        None => CheckResult::fail(
            format!("{} tool", tool),
            format!("Not found (needed for: {})", purpose),
            install_cmd,
        ),
    }
}

/// Check hardware virtualization. A failure here is the same precondition
/// the launcher enforces: without KVM the guest cannot run at all.
pub fn check_kvm() -> CheckResult {
    if qemu::kvm_available() {
        CheckResult::pass("KVM", "Hardware virtualization available (/dev/kvm)")
    } else {
        CheckResult::fail(
            "KVM",
            "No /dev/kvm; LarchOS cannot run under software emulation",
            "Enable virtualization in firmware and load the kvm module",
        )
    }
}

/// Run all preflight checks.
pub fn run_all() -> PreflightReport {
    let mut report = PreflightReport::default();
    report.checks.extend(check_host_tools());
    report.checks.push(check_kvm());
    report
}
