//! Error types for mechanism operations.

use thiserror::Error;

/// Errors that can occur when building or initializing mechanism elements.
///
/// Per-step operations (update, assembly, marshalling) are total over
/// well-formed state and do not produce errors; everything that can go
/// wrong is caught at initialization or handle resolution time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MechError {
    /// Invalid body handle referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Invalid shaft handle referenced.
    #[error("invalid shaft ID: {0}")]
    InvalidShaftId(u64),

    /// Degenerate geometry rejected at initialization.
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry {
        /// Description of the degenerate configuration.
        reason: String,
    },

    /// Singular transmission ratio for a planetary coupling.
    #[error("singular transmission: ordinary ratio t0 = {t0} (t0 = 1 is ill-defined)")]
    SingularTransmission {
        /// The offending ordinary ratio.
        t0: f64,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },
}

impl MechError {
    /// Create a degenerate geometry error.
    #[must_use]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a degenerate geometry error.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateGeometry { .. })
    }

    /// Check if this is a handle resolution error.
    #[must_use]
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Self::InvalidBodyId(_) | Self::InvalidShaftId(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MechError::InvalidShaftId(7);
        assert!(err.to_string().contains('7'));

        let err = MechError::SingularTransmission { t0: 1.0 };
        assert!(err.to_string().contains("t0 = 1"));

        let err = MechError::degenerate("x2 parallel to y2");
        assert!(err.to_string().contains("x2 parallel to y2"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(MechError::degenerate("test").is_degenerate());
        assert!(!MechError::degenerate("test").is_resolution_error());

        assert!(MechError::InvalidBodyId(0).is_resolution_error());
        assert!(MechError::InvalidShaftId(0).is_resolution_error());
    }
}
