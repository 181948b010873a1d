//! Guest exit-status protocol.
//!
//! The guest terminates the emulator by writing a status value to the
//! debug-exit device, and QEMU surfaces that as process exit code
//! `(status << 1) | 1`. The harness recovers `status = exit_code >> 1` and
//! maps it to a named verdict.
//!
//! Decoding is total: status values the harness does not know about become
//! [`Verdict::Unknown`], so a guest that grows new status codes never breaks
//! an older harness.

use std::fmt;

/// Named outcome of one harness run, decoded from the guest status.
///
/// The numeric encoding is a fixed contract with the guest kernel and must
/// not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Status 0: all guest tests passed.
    Success,
    /// Status 1: the guest's main routine returned unexpectedly.
    ReturnFromMain,
    /// Status 2: unrecoverable kernel panic.
    KernelPanic,
    /// Status 3: guest ran out of memory.
    OutOfMemory,
    /// Status 4: unexpected hardware interrupt.
    UnexpectedInterrupt,
    /// Status 5: general protection fault.
    GeneralProtectionFault,
    /// Status 6: unexpected page fault.
    PageFault,
    /// Status 7: a guest-run test process exited with an unexpected code.
    UserSpaceFailure,
    /// Any other status, reported verbatim.
    Unknown(i32),
}

impl Verdict {
    /// Decode a raw QEMU process exit code into a verdict.
    pub fn from_exit_code(exit_code: i32) -> Self {
        Self::from_status(exit_code >> 1)
    }

    /// Map a guest status value to its verdict.
    pub fn from_status(status: i32) -> Self {
        match status {
            0 => Verdict::Success,
            1 => Verdict::ReturnFromMain,
            2 => Verdict::KernelPanic,
            3 => Verdict::OutOfMemory,
            4 => Verdict::UnexpectedInterrupt,
            5 => Verdict::GeneralProtectionFault,
            6 => Verdict::PageFault,
            7 => Verdict::UserSpaceFailure,
            n => Verdict::Unknown(n),
        }
    }

    /// The guest status this verdict stands for.
    ///
    /// The harness mirrors this as its own process exit code, so callers
    /// (CI, scripts) see the guest status directly.
    pub fn status(self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::ReturnFromMain => 1,
            Verdict::KernelPanic => 2,
            Verdict::OutOfMemory => 3,
            Verdict::UnexpectedInterrupt => 4,
            Verdict::GeneralProtectionFault => 5,
            Verdict::PageFault => 6,
            Verdict::UserSpaceFailure => 7,
            Verdict::Unknown(n) => n,
        }
    }

    pub fn is_success(self) -> bool {
        self == Verdict::Success
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::ReturnFromMain => write!(f, "main routine returned unexpectedly"),
            Verdict::KernelPanic => write!(f, "unrecoverable kernel panic"),
            Verdict::OutOfMemory => write!(f, "out of memory"),
            Verdict::UnexpectedInterrupt => write!(f, "unexpected hardware interrupt"),
            Verdict::GeneralProtectionFault => write!(f, "general protection fault"),
            Verdict::PageFault => write!(f, "unexpected page fault"),
            Verdict::UserSpaceFailure => {
                write!(f, "unexpected exit code from a guest test process")
            }
            Verdict::Unknown(n) => write!(f, "unknown failure status {}", n),
        }
    }
}

/// Encode a guest status the way QEMU's debug-exit device does.
///
/// This is the guest's side of the protocol, kept next to the decoder so
/// the bit-packing never drifts apart.
pub fn encode_status(status: i32) -> i32 {
    (status << 1) | 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(Verdict::from_status(0), Verdict::Success);
        assert_eq!(Verdict::from_status(1), Verdict::ReturnFromMain);
        assert_eq!(Verdict::from_status(2), Verdict::KernelPanic);
        assert_eq!(Verdict::from_status(3), Verdict::OutOfMemory);
        assert_eq!(Verdict::from_status(4), Verdict::UnexpectedInterrupt);
        assert_eq!(Verdict::from_status(5), Verdict::GeneralProtectionFault);
        assert_eq!(Verdict::from_status(6), Verdict::PageFault);
        assert_eq!(Verdict::from_status(7), Verdict::UserSpaceFailure);
        assert_eq!(Verdict::from_status(8), Verdict::Unknown(8));
        assert_eq!(Verdict::from_status(4711), Verdict::Unknown(4711));
    }

    #[test]
    fn test_round_trip_known_statuses() {
        for status in 0..=7 {
            let verdict = Verdict::from_exit_code(encode_status(status));
            assert_eq!(verdict.status(), status);
        }
    }

    #[test]
    fn test_round_trip_arbitrary_statuses() {
        for status in [8, 42, 101, 255, 1 << 20] {
            let verdict = Verdict::from_exit_code(encode_status(status));
            assert_eq!(verdict, Verdict::Unknown(status));
            assert_eq!(verdict.status(), status);
        }
    }

    #[test]
    fn test_unmapped_status_never_fails() {
        // Every possible exit code decodes to something.
        for exit_code in 0..4096 {
            let _ = Verdict::from_exit_code(exit_code);
        }
    }

    #[test]
    fn test_end_to_end_scenarios() {
        // Guest wrote 0: QEMU exits 1, harness exits 0.
        let v = Verdict::from_exit_code(1);
        assert_eq!(v, Verdict::Success);
        assert_eq!(v.status(), 0);
        assert!(v.is_success());

        // Guest wrote 7: QEMU exits 15, harness exits 7.
        let v = Verdict::from_exit_code(15);
        assert_eq!(v, Verdict::UserSpaceFailure);
        assert_eq!(v.status(), 7);

        // Guest wrote 101: QEMU exits 202, unknown status reported verbatim.
        let v = Verdict::from_exit_code(202);
        assert_eq!(v, Verdict::Unknown(101));
        assert_eq!(v.status(), 101);
        assert_eq!(v.to_string(), "unknown failure status 101");
    }
}
