//! Sequencer configuration
//!
//! Every timing constant the core uses lives here. Files may be YAML or JSON;
//! missing sections fall back to the reference 5×3 configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SequencerError, SequencerResult};
use crate::resolver::ResolverPolicy;

/// Grid specification (reels × rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of reels (columns)
    pub reels: u8,
    /// Number of visible rows per reel
    pub rows: u8,
}

impl GridSpec {
    /// Standard 5×3
    pub fn standard_5x3() -> Self {
        Self { reels: 5, rows: 3 }
    }

    /// Total grid positions
    pub fn total_positions(&self) -> usize {
        self.reels as usize * self.rows as usize
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::standard_5x3()
    }
}

/// Special symbol roles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolRules {
    /// Scatter: drives anticipation, never substituted by the collector
    pub scatter_id: u32,
    /// Collector: substitutes for every target except scatter
    pub collector_id: u32,
    /// Bidirectional: pays on any contiguous run of 2+
    pub bidirectional_id: u32,
    /// Symbols the filler conveyor draws from
    pub filler_pool: Vec<u32>,
    /// Seed for filler picks (None = OS entropy)
    pub filler_seed: Option<u64>,
}

impl Default for SymbolRules {
    fn default() -> Self {
        // MUST MATCH the backend symbol table: 1..=10 regular, 11 collector, 12 scatter
        Self {
            scatter_id: 12,
            collector_id: 11,
            bidirectional_id: 1,
            filler_pool: (1..=10).collect(),
            filler_seed: None,
        }
    }
}

/// Reel drop timeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelDropConfig {
    /// Vertical distance between two symbol cells (px)
    pub cell_pitch_px: f64,
    /// Filler rows scrolled before the result rows land
    pub filler_rows: u32,
    /// Reverse motion before the drop (px)
    pub wind_up_px: f64,
    /// Wind-up duration (ms)
    pub wind_up_ms: f64,
    /// Nominal reel speed (px per ms)
    pub base_speed_px_per_ms: f64,
    /// Delay between consecutive reel starts (ms, 0 under turbo/skip)
    pub start_stagger_ms: f64,
    /// Extra spin time per reel index so reels land left to right (ms)
    pub stop_interval_ms: f64,
    /// Extra spin time for a reel carrying an anticipation target (ms)
    pub anticipation_extra_ms: f64,
    /// Cap on rows added by extensions
    pub max_extra_rows: u32,
    /// Share of the drop distance covered linearly by an anticipation reel
    pub anticipation_distance_split: f64,
    /// Share of the drop duration spent on that linear part
    pub anticipation_duration_split: f64,
    /// Settle overshoot (px)
    pub settle_bounce_px: f64,
    /// Total settle duration, both steps (ms)
    pub settle_ms: f64,
    /// Duration scale applied under turbo
    pub turbo_scale: f64,
    /// Skip/hold polling interval (ms)
    pub frame_ms: f64,
    /// Filler conveyor speed multiplier
    pub hold_speed_multiplier: f64,
    /// Extra conveyor multiplier while an anticipation stage runs
    pub hold_stage_boost: f64,
    /// Fresh filler rows spawned when a hold is released
    pub release_rows: u32,
    /// Duration of the release animation (ms)
    pub release_ms: f64,
    /// Safety net: a hold never lasts longer than this (ms)
    pub hold_timeout_ms: f64,
}

impl Default for ReelDropConfig {
    fn default() -> Self {
        Self {
            cell_pitch_px: 120.0,
            filler_rows: 6,
            wind_up_px: 24.0,
            wind_up_ms: 120.0,
            base_speed_px_per_ms: 2.4,
            start_stagger_ms: 80.0,
            stop_interval_ms: 150.0,
            anticipation_extra_ms: 1800.0,
            max_extra_rows: 40,
            anticipation_distance_split: 0.85,
            anticipation_duration_split: 0.75,
            settle_bounce_px: 14.0,
            settle_ms: 180.0,
            turbo_scale: 0.45,
            frame_ms: 16.0,
            hold_speed_multiplier: 1.0,
            hold_stage_boost: 1.6,
            release_rows: 2,
            release_ms: 220.0,
            hold_timeout_ms: 12_000.0,
        }
    }
}

/// Anticipation stage timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnticipationTiming {
    /// Gap between a stage closing and the next opening (ms)
    pub undim_gap_ms: f64,
    /// Duration requested for the stage highlight effect (ms)
    pub stage_effect_ms: f64,
}

impl Default for AnticipationTiming {
    fn default() -> Self {
        Self {
            undim_gap_ms: 350.0,
            stage_effect_ms: 2000.0,
        }
    }
}

/// Win display pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WinSequenceConfig {
    /// Whole single pass budget (ms), split across lines
    pub single_pass_budget_ms: f64,
    /// Same budget under turbo (ms)
    pub single_pass_budget_turbo_ms: f64,
    /// Floor for a single-pass line (ms)
    pub single_pass_min_line_ms: f64,
    /// Looping line interval under turbo (ms)
    pub loop_min_line_ms: f64,
    /// Looping line interval (ms)
    pub loop_default_line_ms: f64,
    /// Line-draw effect duration (ms)
    pub line_draw_ms: f64,
    /// Stop looping after this many passes (None = until interrupted)
    pub max_loops: Option<u32>,
}

impl Default for WinSequenceConfig {
    fn default() -> Self {
        Self {
            single_pass_budget_ms: 2400.0,
            single_pass_budget_turbo_ms: 1200.0,
            single_pass_min_line_ms: 250.0,
            loop_min_line_ms: 900.0,
            loop_default_line_ms: 1600.0,
            line_draw_ms: 450.0,
            max_loops: None,
        }
    }
}

/// Autoplay continuation gate timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoplayConfig {
    /// Pause between automated spins (ms, 0 under turbo)
    pub spin_delay_ms: f64,
    /// Overlay safety poll attempts
    pub overlay_poll_attempts: u32,
    /// Overlay safety poll interval (ms)
    pub overlay_poll_interval_ms: f64,
    /// Max wait for an outstanding progression signal (ms)
    pub progression_timeout_ms: f64,
    /// Max wait for the critical lock (ms)
    pub lock_wait_timeout_ms: f64,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            spin_delay_ms: 400.0,
            overlay_poll_attempts: 40,
            overlay_poll_interval_ms: 250.0,
            progression_timeout_ms: 5000.0,
            lock_wait_timeout_ms: 8000.0,
        }
    }
}

/// Complete sequencer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub grid: GridSpec,
    pub symbols: SymbolRules,
    pub reel_drop: ReelDropConfig,
    pub anticipation: AnticipationTiming,
    pub win_sequence: WinSequenceConfig,
    pub autoplay: AutoplayConfig,
    pub resolver_policy: ResolverPolicy,
    /// Winline row positions per reel (None = standard 20 lines)
    pub winlines: Option<Vec<Vec<u8>>>,
}

impl SequencerConfig {
    /// Parse YAML
    pub fn from_yaml_str(yaml: &str) -> SequencerResult<Self> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON
    pub fn from_json_str(json: &str) -> SequencerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file (format chosen by extension, YAML otherwise)
    pub fn load(path: impl AsRef<Path>) -> SequencerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check ranges the scheduler relies on
    pub fn validate(&self) -> SequencerResult<()> {
        let invalid = |msg: &str| Err(SequencerError::InvalidConfig(msg.to_string()));

        if self.grid.reels == 0 || self.grid.rows == 0 {
            return invalid("grid must have at least one reel and one row");
        }
        let drop = &self.reel_drop;
        if drop.base_speed_px_per_ms <= 0.0 || !drop.base_speed_px_per_ms.is_finite() {
            return invalid("base_speed_px_per_ms must be positive");
        }
        if drop.cell_pitch_px <= 0.0 {
            return invalid("cell_pitch_px must be positive");
        }
        if drop.frame_ms <= 0.0 {
            return invalid("frame_ms must be positive");
        }
        if !(0.0..=1.0).contains(&drop.turbo_scale) {
            return invalid("turbo_scale must be within 0.0..=1.0");
        }
        let splits = [drop.anticipation_distance_split, drop.anticipation_duration_split];
        if splits.iter().any(|s| *s <= 0.0 || *s >= 1.0) {
            return invalid("anticipation splits must be within (0.0, 1.0)");
        }
        if drop.hold_timeout_ms <= 0.0 {
            return invalid("hold_timeout_ms must be positive");
        }
        if self.symbols.filler_pool.is_empty() {
            return invalid("filler_pool must not be empty");
        }
        if self.autoplay.overlay_poll_attempts == 0 {
            return invalid("overlay_poll_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SequencerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid.total_positions(), 15);
        assert_eq!(config.reel_drop.max_extra_rows, 40);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
reel_drop:
  base_speed_px_per_ms: 3.0
autoplay:
  spin_delay_ms: 0
"#;
        let config = SequencerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.reel_drop.base_speed_px_per_ms, 3.0);
        assert_eq!(config.reel_drop.cell_pitch_px, 120.0);
        assert_eq!(config.autoplay.spin_delay_ms, 0.0);
        assert_eq!(config.symbols.scatter_id, 12);
    }

    #[test]
    fn test_json_config() {
        let json = r#"{ "grid": { "reels": 6, "rows": 4 }, "resolver_policy": "positions_authoritative" }"#;
        let config = SequencerConfig::from_json_str(json).unwrap();
        assert_eq!(config.grid, GridSpec { reels: 6, rows: 4 });
        assert_eq!(config.resolver_policy, ResolverPolicy::PositionsAuthoritative);
    }

    #[test]
    fn test_demo_config_parses() {
        let config = SequencerConfig::from_yaml_str(include_str!("../../../demos/sequencer.yaml")).unwrap();
        assert_eq!(config.symbols.filler_seed, Some(2024));
        assert_eq!(config.win_sequence.max_loops, Some(2));
        assert_eq!(config.resolver_policy, ResolverPolicy::TemplateFirst);
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let mut config = SequencerConfig::default();
        config.reel_drop.base_speed_px_per_ms = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SequencerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_split_rejected() {
        let mut config = SequencerConfig::default();
        config.reel_drop.anticipation_duration_split = 1.0;
        assert!(config.validate().is_err());
    }
}
