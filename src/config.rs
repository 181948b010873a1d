//! Build configuration resolution.
//!
//! Turns raw user input into a fully-resolved [`BuildConfig`]. This is a
//! pure transformation: ambiguous input is rejected with a [`ConfigError`],
//! never guessed at.
//!
//! Target triples are fixed constants. They are part of the contract with
//! the bootloader/kernel/user build trees, not a user-facing knob.

use std::collections::BTreeSet;
use thiserror::Error;

/// Target triple for the UEFI bootloader build.
pub const BOOTLOADER_TARGET: &str = "x86_64-unknown-uefi";

/// Target triple for the kernel build.
pub const KERNEL_TARGET: &str = "x86_64-larchos";

/// Target triple for bare user-space module builds.
pub const USER_TARGET: &str = "x86_64-larchos-user";

/// Module built when the user names none.
pub const DEFAULT_MODULE: &str = "init";

/// Feature the user-space runtime needs when built without optimizations.
pub const RT_FALLBACK_FEATURE: &str = "rt-fallback";

/// Build mode. Exactly one applies to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Debug,
    Release,
}

impl Mode {
    /// Cargo's per-mode output subtree under `target/<triple>/`.
    pub fn subdir(self) -> &'static str {
        match self {
            Mode::Debug => "debug",
            Mode::Release => "release",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--release and --debug are mutually exclusive")]
    ConflictingModes,
    #[error("module list is empty; at least one user module is required")]
    NoModules,
}

/// Raw user input as it comes off the CLI, before resolution.
#[derive(Debug, Default, Clone)]
pub struct RawConfig {
    pub release: bool,
    pub debug: bool,
    pub kernel_features: Vec<String>,
    pub user_features: Vec<String>,
    pub cmdline: Option<String>,
    /// `None` means "not supplied" (default applies); `Some(vec![])` is an
    /// explicitly empty list and is an error.
    pub modules: Option<Vec<String>>,
    pub qemu_args: Vec<String>,
    pub build_only: bool,
}

/// Fully-resolved build plan consumed by the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub mode: Mode,
    /// Feature flags for the kernel build only.
    pub kernel_features: BTreeSet<String>,
    /// Feature flags for user module builds only.
    pub user_features: BTreeSet<String>,
    /// Kernel command line, embedded via the cmdline file contract.
    pub cmdline: String,
    /// Ordered module list. Order determines build order; each module build
    /// is independent.
    pub modules: Vec<String>,
    /// Extra emulator arguments, appended last on the QEMU command line.
    pub qemu_args: Vec<String>,
    /// Stop after image assembly instead of launching QEMU.
    pub build_only: bool,
}

/// Resolve raw input into a [`BuildConfig`].
pub fn resolve(raw: RawConfig) -> Result<BuildConfig, ConfigError> {
    let mode = match (raw.release, raw.debug) {
        (true, true) => return Err(ConfigError::ConflictingModes),
        (true, false) => Mode::Release,
        _ => Mode::Debug,
    };

    let modules = match raw.modules {
        Some(mods) => {
            let mods: Vec<String> = mods.into_iter().filter(|m| !m.is_empty()).collect();
            if mods.is_empty() {
                return Err(ConfigError::NoModules);
            }
            mods
        }
        None => vec![DEFAULT_MODULE.to_string()],
    };

    let kernel_features: BTreeSet<String> = raw.kernel_features.into_iter().collect();
    let mut user_features: BTreeSet<String> = raw.user_features.into_iter().collect();
    if mode == Mode::Debug {
        // Unoptimized user builds need the fallback runtime paths.
        user_features.insert(RT_FALLBACK_FEATURE.to_string());
    }

    Ok(BuildConfig {
        mode,
        kernel_features,
        user_features,
        cmdline: raw.cmdline.unwrap_or_default(),
        modules,
        qemu_args: raw.qemu_args,
        build_only: raw.build_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = resolve(RawConfig::default()).unwrap();
        assert_eq!(config.mode, Mode::Debug);
        assert_eq!(config.modules, vec![DEFAULT_MODULE.to_string()]);
        assert!(config.kernel_features.is_empty());
        assert_eq!(config.cmdline, "");
        assert!(!config.build_only);
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let raw = RawConfig {
            release: true,
            debug: true,
            ..Default::default()
        };
        assert_eq!(resolve(raw).unwrap_err(), ConfigError::ConflictingModes);
    }

    #[test]
    fn test_explicit_empty_module_list_rejected() {
        let raw = RawConfig {
            modules: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(resolve(raw).unwrap_err(), ConfigError::NoModules);

        // A list of only empty names is just as empty.
        let raw = RawConfig {
            modules: Some(vec![String::new()]),
            ..Default::default()
        };
        assert_eq!(resolve(raw).unwrap_err(), ConfigError::NoModules);
    }

    #[test]
    fn test_feature_sets_deduplicated() {
        let raw = RawConfig {
            release: true,
            kernel_features: vec!["smp".into(), "smp".into(), "acpi".into()],
            user_features: vec!["net".into(), "net".into()],
            ..Default::default()
        };
        let config = resolve(raw).unwrap();
        assert_eq!(config.kernel_features.len(), 2);
        assert_eq!(config.user_features.len(), 1);
    }

    #[test]
    fn test_debug_mode_adds_user_fallback_feature() {
        let config = resolve(RawConfig::default()).unwrap();
        assert!(config.user_features.contains(RT_FALLBACK_FEATURE));

        let release = resolve(RawConfig {
            release: true,
            ..Default::default()
        })
        .unwrap();
        assert!(!release.user_features.contains(RT_FALLBACK_FEATURE));
    }

    #[test]
    fn test_module_order_preserved() {
        let raw = RawConfig {
            modules: Some(vec!["init".into(), "memtest".into(), "net".into()]),
            ..Default::default()
        };
        let config = resolve(raw).unwrap();
        assert_eq!(config.modules, vec!["init", "memtest", "net"]);
    }
}
