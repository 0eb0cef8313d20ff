use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RomError};
use crate::numerics::{FallbackPolicy, Formulation, NewtonConfig, WarmStart};
use crate::physics::Problem;

/// One POD-G run: which problem, which data, how to solve and where to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RomConfig {
    pub problem: Problem,

    /// Snapshot file used to build the basis.
    pub snapshots: PathBuf,

    /// Use only the first `n` snapshots.
    #[serde(default)]
    pub num_snapshots: Option<usize>,

    /// Snapshot file whose fields are the reference solutions at its parameters.
    #[serde(default)]
    pub validation: Option<PathBuf>,

    #[serde(default = "default_modes")]
    pub modes: usize,

    /// Extra basis sizes for an error-versus-M table.
    #[serde(default)]
    pub error_study: Vec<usize>,

    /// Missing means the per-problem defaults.
    #[serde(default)]
    pub newton: Option<NewtonConfig>,

    /// Missing means the default of the configured problem.
    #[serde(default)]
    pub warm_start: Option<WarmStart>,

    #[serde(default)]
    pub fallback: FallbackPolicy,

    #[serde(default)]
    pub formulation: Formulation,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_modes() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Solve validation queries on the rayon pool.
    #[serde(default)]
    pub parallel: bool,

    /// Export the surrogate handoff bundle.
    #[serde(default = "default_true")]
    pub write_bundle: bool,

    /// Tecplot and stacked field dumps (2D only).
    #[serde(default)]
    pub write_fields: bool,

    /// Value stored for failed queries in coefficient tables, NaN when unset.
    #[serde(default)]
    pub sentinel: Option<f64>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            parallel: false,
            write_bundle: default_true(),
            write_fields: false,
            sentinel: None,
        }
    }
}

impl RomConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.modes == 0 || self.error_study.contains(&0) {
            return Err(invalid("modes", "the basis needs at least one mode"));
        }
        if self.num_snapshots == Some(0) {
            return Err(invalid("num_snapshots", "at least one snapshot is needed"));
        }
        if let Some(newton) = &self.newton {
            if !(newton.tolerance > 0.0) {
                return Err(invalid("newton.tolerance", "must be positive"));
            }
            if newton.max_iterations == 0 {
                return Err(invalid("newton.max_iterations", "must be positive"));
            }
        }
        match self.fallback {
            FallbackPolicy::NextNearest { attempts: 0 } => {
                return Err(invalid("fallback.attempts", "use kind \"none\" to disable retries"));
            }
            FallbackPolicy::Continuation { steps: 0 } => {
                return Err(invalid("fallback.steps", "continuation needs at least one step"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Solver settings, falling back to the defaults of the configured problem.
    pub fn newton(&self) -> NewtonConfig {
        self.newton
            .clone()
            .unwrap_or_else(|| NewtonConfig::for_problem(&self.problem))
    }

    pub fn warm_start(&self) -> WarmStart {
        self.warm_start
            .unwrap_or_else(|| self.problem.default_warm_start())
    }
}

impl OutputConfig {
    pub fn sentinel(&self) -> f64 {
        self.sentinel.unwrap_or(f64::NAN)
    }
}

fn invalid(key: &'static str, reason: &str) -> RomError {
    RomError::InvalidConfig {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let json = r#"{
            "problem": {"kind": "natural_convection2d"},
            "snapshots": "data/cavity.json"
        }"#;
        let config: RomConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.modes, 3);
        assert_eq!(config.fallback, FallbackPolicy::None);
        assert_eq!(config.newton().tolerance, 1e-6);
        assert_eq!(config.newton().max_iterations, 100);
        assert_eq!(config.warm_start(), WarmStart::NearestScaled);
        assert!(config.output.write_bundle);
    }

    #[test]
    fn explicit_warm_start_overrides_the_problem_default() {
        let json = r#"{
            "problem": {"kind": "burgers1d", "viscosity": 1.0},
            "snapshots": "s.json"
        }"#;
        let mut config: RomConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.warm_start(), WarmStart::Nearest);

        config.warm_start = Some(WarmStart::Provided);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rom.json");
        config.save_to_file(&path).unwrap();
        assert_eq!(RomConfig::from_file(&path).unwrap().warm_start(), WarmStart::Provided);
    }

    #[test]
    fn zero_retries_are_rejected() {
        let json = r#"{
            "problem": {"kind": "burgers1d", "viscosity": 1.0},
            "snapshots": "s.json",
            "fallback": {"kind": "next_nearest", "attempts": 0}
        }"#;
        let config: RomConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(RomError::InvalidConfig { key: "fallback.attempts", .. })
        ));
    }
}
