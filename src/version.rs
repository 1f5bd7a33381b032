//! IR version constants.
//!
//! The snapshot is the only persistent state of the core; its `ir_version`
//! gates whether a prior snapshot may be used as a diff input.

/// Version stamped into every snapshot written by this crate.
pub const IR_VERSION: &str = "1.0.0";

/// All snapshot versions this build can read back for diffing.
pub const SUPPORTED_IR_VERSIONS: &[&str] = &["1.0.0"];

/// Check whether a prior snapshot's version can be diffed against.
pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_IR_VERSIONS.contains(&version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_supported() {
        assert!(is_supported_version(IR_VERSION));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(!is_supported_version("0.9.0"));
        assert!(!is_supported_version("2.0.0"));
        assert!(!is_supported_version(""));
    }
}
