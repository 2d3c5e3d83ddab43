//! Experiment files: which environment, which policy, how many rollouts.
//!
//! ```json
//! {
//!   "name": "fishing_escapement",
//!   "environment": { "server": "http://127.0.0.1:40004", "env_id": "fishing-v1", "kwargs": { "sigma": 0.1 } },
//!   "policy": { "kind": "escapement", "escapement": 0.5 },
//!   "simulation": { "reps": 500, "max_steps": 1000, "seed": 24 },
//!   "policy_function": { "grid": { "low": [0.0], "high": [1.0], "points": 101 }, "reps": 50, "seed": 24 }
//! }
//! ```

use crate::error::{Result, RolloutError};
use crate::io::load_json;
use crate::mdps::policies::check_bounds;
use crate::mdps::{
    ConstantEscapement, FixedAction, GaussianNoise, Policy, RandomChoice, TabulatedPolicy,
    UniformRange,
};
use crate::rollouts::{state_grid, PolicyFunctionOptions, RolloutOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub type DynPolicy = Box<dyn Policy + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub server: String,
    pub env_id: String,
    #[serde(default)]
    pub max_episode_steps: Option<i32>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl EnvironmentSpec {
    pub fn kwargs(&self) -> Vec<(&str, Value)> {
        self.kwargs
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySpec {
    FixedAction { action: Vec<f64> },
    Escapement { escapement: f64 },
    RandomChoice { choices: Vec<Vec<f64>> },
    Uniform { low: Vec<f64>, high: Vec<f64> },
    /// A policy table saved by an earlier run.
    Tabulated { path: PathBuf },
}

/// Gaussian action noise, independent of the policy it perturbs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSpec {
    pub sigma: f64,
    #[serde(default)]
    pub clip: Option<(Vec<f64>, Vec<f64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
    pub points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFunctionSpec {
    pub grid: GridSpec,
    #[serde(flatten)]
    pub options: PolicyFunctionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub environment: EnvironmentSpec,
    pub policy: PolicySpec,
    #[serde(default)]
    pub action_noise: Option<NoiseSpec>,
    pub simulation: RolloutOptions,
    #[serde(default)]
    pub policy_function: Option<PolicyFunctionSpec>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_workers() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl ExperimentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let cfg: Self = load_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RolloutError::invalid("experiment name is empty"));
        }
        if self.workers == 0 {
            return Err(RolloutError::invalid("workers must be positive"));
        }
        self.simulation.validate()?;

        if let Some(pf) = &self.policy_function {
            if pf.options.reps == 0 {
                return Err(RolloutError::invalid("policy_function.reps must be at least 1"));
            }
            self.grid()?;
        }
        if let Some(noise) = &self.action_noise {
            if noise.sigma.is_nan() || noise.sigma < 0. {
                return Err(RolloutError::invalid("action_noise.sigma must be non-negative"));
            }
            if let Some((low, high)) = &noise.clip {
                check_bounds("action_noise.clip", low, high)?;
            }
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<Vec<Vec<f64>>> {
        match &self.policy_function {
            Some(pf) => state_grid(&pf.grid.low, &pf.grid.high, pf.grid.points),
            None => Ok(vec![]),
        }
    }

    /// Key over everything that changes simulation results.
    pub fn simulation_key(&self) -> Result<String> {
        crate::io::content_key(&(
            &self.environment,
            &self.policy,
            &self.action_noise,
            &self.simulation,
        ))
    }

    pub fn build_policy(&self) -> Result<DynPolicy> {
        let policy: DynPolicy = match &self.policy {
            PolicySpec::FixedAction { action } => Box::new(FixedAction {
                action: action.clone(),
            }),
            PolicySpec::Escapement { escapement } => Box::new(ConstantEscapement {
                escapement: *escapement,
            }),
            PolicySpec::RandomChoice { choices } => Box::new(RandomChoice::new(choices.clone())?),
            PolicySpec::Uniform { low, high } => {
                Box::new(UniformRange::new(low.clone(), high.clone())?)
            }
            PolicySpec::Tabulated { path } => Box::new(load_json::<TabulatedPolicy, _>(path)?),
        };

        match &self.action_noise {
            None => Ok(policy),
            Some(noise) => {
                let noisy = GaussianNoise::new(policy, noise.sigma)?;
                Ok(match &noise.clip {
                    Some((low, high)) => Box::new(noisy.with_clip(low.clone(), high.clone())?),
                    None => Box::new(noisy),
                })
            }
        }
    }
}
