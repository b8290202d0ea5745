//! Timing profiles — global duration compression modes

use serde::{Deserialize, Serialize};

/// Timing profile identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimingProfile {
    /// Normal gameplay speed
    #[default]
    Normal,
    /// Fast/Turbo mode
    Turbo,
    /// Instant (no delays, for testing)
    Instant,
}

impl TimingProfile {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Turbo => "Turbo",
            Self::Instant => "Instant",
        }
    }

    /// Profile for a turbo toggle
    pub fn from_turbo(turbo: bool) -> Self {
        if turbo { Self::Turbo } else { Self::Normal }
    }

    /// Does this profile collapse stagger and pacing delays?
    pub fn is_fast(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Multiplicative duration scale, given the configured turbo factor
    pub fn duration_scale(&self, turbo_factor: f64) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Turbo => turbo_factor.clamp(0.0, 1.0),
            Self::Instant => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_scale() {
        assert_eq!(TimingProfile::Normal.duration_scale(0.4), 1.0);
        assert_eq!(TimingProfile::Turbo.duration_scale(0.4), 0.4);
        assert_eq!(TimingProfile::Instant.duration_scale(0.4), 0.0);
        // Factors above 1.0 never slow turbo down
        assert_eq!(TimingProfile::Turbo.duration_scale(3.0), 1.0);
    }

    #[test]
    fn test_from_turbo() {
        assert_eq!(TimingProfile::from_turbo(true), TimingProfile::Turbo);
        assert!(!TimingProfile::from_turbo(false).is_fast());
    }
}
