//! Non-learned baseline policies, plus a lookup policy extracted from a
//! sampled policy function.

use super::mdp_simulator::{Action, BoxError, Observation, Policy};
use crate::error::{Result, RolloutError};
use crate::rollouts::PolicySample;
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Always the same action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedAction {
    pub action: Action,
}

impl Policy for FixedAction {
    fn name(&self) -> String {
        "fixed_action".to_string()
    }

    fn predict(
        &self,
        _state: &Observation,
        _deterministic: bool,
        _rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        Ok(self.action.clone())
    }
}

/// Harvest everything above the escapement level, nothing below it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantEscapement {
    pub escapement: f64,
}

impl Policy for ConstantEscapement {
    fn name(&self) -> String {
        "escapement".to_string()
    }

    fn predict(
        &self,
        state: &Observation,
        _deterministic: bool,
        _rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        let stock = state
            .first()
            .ok_or("escapement policy needs a non-empty state")?;
        Ok(vec![(stock - self.escapement).max(0.)])
    }
}

/// Uniform pick among a fixed set of actions. Ignores `deterministic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomChoice {
    choices: Vec<Action>,
}

impl RandomChoice {
    pub fn new(choices: Vec<Action>) -> Result<Self> {
        if choices.is_empty() {
            return Err(RolloutError::invalid("random choice needs at least one action"));
        }
        Ok(Self { choices })
    }
}

impl Policy for RandomChoice {
    fn name(&self) -> String {
        "random_choice".to_string()
    }

    fn predict(
        &self,
        _state: &Observation,
        _deterministic: bool,
        rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        self.choices
            .choose(rng)
            .cloned()
            .ok_or_else(|| "no actions to choose from".into())
    }
}

/// Non-empty, equal-length, NaN-free bounds with `low <= high` per dimension.
pub(crate) fn check_bounds(what: &str, low: &[f64], high: &[f64]) -> Result<()> {
    if low.is_empty() || low.len() != high.len() {
        return Err(RolloutError::invalid(format!(
            "{what} bounds must be non-empty and of equal length, got {} and {}",
            low.len(),
            high.len()
        )));
    }
    if low.iter().zip(high).any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
        return Err(RolloutError::invalid(format!(
            "{what} low bound exceeds high bound"
        )));
    }
    Ok(())
}

/// Uniform over a box, independently per dimension. Ignores `deterministic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    low: Action,
    high: Action,
}

impl UniformRange {
    pub fn new(low: Action, high: Action) -> Result<Self> {
        check_bounds("uniform", &low, &high)?;
        Ok(Self { low, high })
    }
}

impl Policy for UniformRange {
    fn name(&self) -> String {
        "uniform".to_string()
    }

    fn predict(
        &self,
        _state: &Observation,
        _deterministic: bool,
        rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        Ok(self
            .low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| rng.gen_range(lo..=hi))
            .collect())
    }
}

/// Gaussian action noise on top of another policy, applied only when
/// sampling non-deterministically.
#[derive(Debug, Clone)]
pub struct GaussianNoise<P> {
    inner: P,
    noise: Normal<f64>,
    clip: Option<(Action, Action)>,
}

impl<P: Policy> GaussianNoise<P> {
    pub fn new(inner: P, sigma: f64) -> Result<Self> {
        if sigma.is_nan() || sigma < 0. {
            return Err(RolloutError::invalid(format!(
                "noise sigma must be non-negative, got {sigma}"
            )));
        }
        let noise = Normal::new(0., sigma)
            .map_err(|e| RolloutError::invalid(format!("bad noise sigma {sigma}: {e}")))?;
        Ok(Self {
            inner,
            noise,
            clip: None,
        })
    }

    pub fn with_clip(mut self, low: Action, high: Action) -> Result<Self> {
        check_bounds("clip", &low, &high)?;
        self.clip = Some((low, high));
        Ok(self)
    }
}

impl<P: Policy> Policy for GaussianNoise<P> {
    fn name(&self) -> String {
        format!("{}+noise", self.inner.name())
    }

    fn predict(
        &self,
        state: &Observation,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        let mut a = self.inner.predict(state, deterministic, rng)?;
        if !deterministic {
            a.iter_mut().for_each(|x| *x += self.noise.sample(rng));
        }

        if let Some((low, high)) = &self.clip {
            for (x, (lo, hi)) in a.iter_mut().zip(low.iter().zip(high)) {
                *x = x.clamp(*lo, *hi);
            }
        }

        Ok(a)
    }
}

/// Nearest-grid-point lookup over a sampled policy function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedPolicy {
    pub name: String,
    pub table: Vec<(Observation, Action)>,
}

impl TabulatedPolicy {
    pub fn from_sample(sample: &PolicySample) -> Result<Self> {
        if sample.is_empty() {
            return Err(RolloutError::invalid("cannot tabulate an empty policy sample"));
        }

        Ok(Self {
            name: format!("tabulated({})", sample.policy),
            table: sample
                .points
                .iter()
                .map(|p| (p.state.clone(), p.mean.clone()))
                .collect(),
        })
    }
}

impl Policy for TabulatedPolicy {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn predict(
        &self,
        state: &Observation,
        _deterministic: bool,
        _rng: &mut StdRng,
    ) -> std::result::Result<Action, BoxError> {
        if let Some((s, _)) = self.table.iter().find(|(s, _)| s.len() != state.len()) {
            return Err(format!(
                "state has {} dimensions, policy table has {}",
                state.len(),
                s.len()
            )
            .into());
        }

        let dist = |s: &Observation| -> f64 {
            s.iter().zip(state).map(|(a, b)| (a - b).powi(2)).sum()
        };

        self.table
            .iter()
            .min_by(|(a, _), (b, _)| dist(a).total_cmp(&dist(b)))
            .map(|(_, action)| action.clone())
            .ok_or_else(|| "empty policy table".into())
    }
}
