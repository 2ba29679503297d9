//! Harness settings.
//!
//! One TOML file drives a run: the `[run]` table sets the length and the
//! opening head count, and `[encounter]` is handed to the encounter as is.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use heist_ai::EncounterConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Length and population of one scripted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Fixed simulation step in seconds
    pub tick_seconds: f32,
    /// Simulated match length in seconds
    pub duration_seconds: f32,
    /// Pursuers placed at match start
    pub pursuers: usize,
    /// Grimoires placed at match start
    pub grimoires: usize,
    /// Seconds between takedowns of the nearest enemy by the crew
    pub takedown_interval: f32,
    /// Seconds between progress log lines
    pub report_interval: f32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            tick_seconds: 0.1,
            duration_seconds: 120.0,
            pursuers: 6,
            grimoires: 2,
            takedown_interval: 15.0,
            report_interval: 10.0,
        }
    }
}

impl RunSettings {
    /// Number of fixed steps in the run.
    #[must_use]
    pub fn total_ticks(&self) -> u32 {
        (self.duration_seconds / self.tick_seconds).round() as u32
    }
}

/// Everything a run reads from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Run length and population
    pub run: RunSettings,
    /// Encounter tuning
    pub encounter: EncounterConfig,
}

impl SimSettings {
    /// Reads settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No settings file given, using defaults");
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut settings: Self = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        settings.validate().with_context(|| format!("validating {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Clamps the run to something the harness can execute.
    pub fn validate(&mut self) -> Result<()> {
        let run = &mut self.run;
        ensure!(
            [run.tick_seconds, run.duration_seconds, run.takedown_interval, run.report_interval]
                .iter()
                .all(|v| v.is_finite()),
            "run timings must be finite numbers"
        );
        run.tick_seconds = run.tick_seconds.clamp(0.005, 1.0);
        run.duration_seconds = run.duration_seconds.clamp(run.tick_seconds, 3600.0);
        run.takedown_interval = run.takedown_interval.max(0.0);
        run.report_interval = run.report_interval.max(run.tick_seconds);
        self.encounter.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let settings = SimSettings::load(None).expect("defaults");
        assert_eq!(settings, SimSettings::default());
        assert_eq!(settings.run.total_ticks(), 1200);
    }

    #[test]
    fn test_partial_file_overrides_run_and_encounter() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("heist.toml");
        fs::write(
            &path,
            "[run]\npursuers = 3\ntick_seconds = 0.0\n\n[encounter.spawn]\nmax_enemies_per_room = 4\n",
        )
        .expect("write");

        let settings = SimSettings::load(Some(&path)).expect("load");
        assert_eq!(settings.run.pursuers, 3);
        assert_eq!(settings.run.grimoires, 2);
        assert!((settings.run.tick_seconds - 0.005).abs() < f32::EPSILON);
        assert_eq!(settings.encounter.spawn.max_enemies_per_room, 4);
    }

    #[test]
    fn test_nan_encounter_value_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("heist.toml");
        fs::write(&path, "[encounter.pursuer]\nattack_range = nan\n").expect("write");
        assert!(SimSettings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("missing.toml");
        assert!(SimSettings::load(Some(&path)).is_err());
    }
}
