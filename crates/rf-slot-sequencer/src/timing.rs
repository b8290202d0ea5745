//! Timing helpers — easing curves, round clock, ms conversion

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

pub use rf_stage::TimingProfile;

/// Easing curve of a motion phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    /// Quadratic ease-in
    EaseIn,
    /// Cubic ease-out
    EaseOut,
}

impl Easing {
    /// Map normalized time `t` (0..=1) to normalized progress
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// Convert milliseconds to a Duration (negative and NaN become zero)
pub fn ms(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Milliseconds elapsed since the round started
#[derive(Debug, Clone, Copy)]
pub struct RoundClock {
    started: Instant,
}

impl RoundClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Elapsed ms as f64 (trace timestamps)
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RoundClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_easing_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut] {
            assert_relative_eq!(easing.apply(0.0), 0.0);
            assert_relative_eq!(easing.apply(1.0), 1.0);
        }
    }

    #[test]
    fn test_ease_out_front_loaded() {
        assert!(Easing::EaseOut.apply(0.5) > Easing::Linear.apply(0.5));
        assert!(Easing::EaseIn.apply(0.5) < Easing::Linear.apply(0.5));
        assert_relative_eq!(Easing::EaseOut.apply(0.5), 0.875);
    }

    #[test]
    fn test_ms_conversion() {
        assert_eq!(ms(250.0), Duration::from_millis(250));
        assert_eq!(ms(-5.0), Duration::ZERO);
        assert_eq!(ms(f64::NAN), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_clock_follows_virtual_time() {
        let clock = RoundClock::start();
        tokio::time::advance(Duration::from_millis(120)).await;
        assert_relative_eq!(clock.elapsed_ms(), 120.0, epsilon = 0.5);
    }
}
