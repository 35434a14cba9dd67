//! Structural self-checks.
//!
//! Checks run after every topology mutation in debug builds, and in release
//! builds compiled with the `check-invariants` feature.

use crate::mesh_error::TreeMeshError;

/// `true` when mutation-time invariant checks are compiled in.
#[inline]
pub const fn invariants_enabled() -> bool {
    cfg!(any(debug_assertions, feature = "check-invariants"))
}

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Panic on the first broken invariant when checks are enabled.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "debug_assert_invariants");
    }

    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), TreeMeshError>;
}

/// Run a fallible check and panic with `context` on error when invariant
/// checking is enabled. The check is not evaluated otherwise.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $context:expr) => {
        if $crate::debug_invariants::invariants_enabled() {
            if let Err(e) = $expr {
                panic!("[invariants] {}: {}", $context, e);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl DebugInvariants for Broken {
        fn validate_invariants(&self) -> Result<(), TreeMeshError> {
            Err(TreeMeshError::InvariantViolation("always".into()))
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "[invariants] debug_assert_invariants: ")]
    fn broken_invariants_panic_in_debug_builds() {
        Broken.debug_assert_invariants();
    }

    #[test]
    fn validation_reports_the_error() {
        assert!(matches!(
            Broken.validate_invariants(),
            Err(TreeMeshError::InvariantViolation(_))
        ));
    }
}
