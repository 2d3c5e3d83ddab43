use super::episode::{column_means, mean_var};
use crate::error::{Result, RolloutError};
use crate::mdps::{Action, Observation, Policy};
use itertools::Itertools;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFunctionOptions {
    /// Policy queries per grid state.
    pub reps: usize,
    #[serde(default)]
    pub deterministic: bool,
    pub seed: Option<u64>,
    /// Record the distribution of (rounded) actions at each grid state.
    #[serde(default)]
    pub discrete: bool,
}

impl PolicyFunctionOptions {
    pub fn new(reps: usize) -> Self {
        Self {
            reps,
            deterministic: false,
            seed: None,
            discrete: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn with_discrete(mut self, discrete: bool) -> Self {
        self.discrete = discrete;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCount {
    pub action: Vec<i64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPoint {
    pub state: Observation,
    pub mean: Action,
    /// Per-dimension population variance across queries.
    pub variance: Action,
    pub queries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Vec<ActionCount>>,
}

/// The policy's action choice sampled over a grid of states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySample {
    pub policy: String,
    pub seed: u64,
    pub points: Vec<PolicyPoint>,
}

impl PolicySample {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Query `policy` `options.reps` times at every state of `state_grid`.
///
/// No environment is advanced. Grid point `i` draws from its own rng seeded
/// with `seed + i`.
pub fn policy_function<P>(
    policy: &P,
    state_grid: &[Observation],
    options: &PolicyFunctionOptions,
) -> Result<PolicySample>
where
    P: Policy + ?Sized,
{
    if state_grid.is_empty() {
        return Err(RolloutError::invalid("state grid is empty"));
    }
    if options.reps == 0 {
        return Err(RolloutError::invalid("reps must be at least 1"));
    }
    let seed = options.seed.unwrap_or_else(|| thread_rng().gen());

    let points = state_grid
        .iter()
        .enumerate()
        .map(|(i, state)| {
            let rng = &mut StdRng::seed_from_u64(super::episode_seed(seed, i));
            let actions = (0..options.reps)
                .map(|r| {
                    policy
                        .predict(state, options.deterministic, rng)
                        .map_err(|source| RolloutError::PolicyQuery {
                            point: i,
                            query: r,
                            source,
                        })
                })
                .collect::<Result<Vec<Action>>>()?;

            Ok(summarize(state.clone(), &actions, options.discrete))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PolicySample {
        policy: policy.name(),
        seed,
        points,
    })
}

fn summarize(state: Observation, actions: &[Action], discrete: bool) -> PolicyPoint {
    let rows = actions.iter().map(Vec::as_slice).collect::<Vec<_>>();
    let mean = column_means(&rows);
    let variance = (0..mean.len())
        .map(|d| {
            let col = actions
                .iter()
                .map(|a| a.get(d).copied().unwrap_or(0.))
                .collect::<Vec<_>>();
            mean_var(&col).1
        })
        .collect();

    let distribution = discrete.then(|| {
        actions
            .iter()
            .map(|a| a.iter().map(|x| x.round() as i64).collect::<Vec<_>>())
            .counts()
            .into_iter()
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect()
    });

    PolicyPoint {
        state,
        mean,
        variance,
        queries: actions.len(),
        distribution,
    }
}

/// `n` evenly spaced one-dimensional states from `low` to `high` inclusive.
pub fn linspace(low: f64, high: f64, n: usize) -> Result<Vec<Observation>> {
    state_grid(&[low], &[high], n)
}

/// Cartesian product of `points` evenly spaced values per dimension.
pub fn state_grid(lows: &[f64], highs: &[f64], points: usize) -> Result<Vec<Observation>> {
    if lows.is_empty() || lows.len() != highs.len() {
        return Err(RolloutError::invalid(format!(
            "grid bounds must be non-empty and of equal length, got {} and {}",
            lows.len(),
            highs.len()
        )));
    }
    if points == 0 {
        return Err(RolloutError::invalid("grid needs at least one point"));
    }

    let axes = lows
        .iter()
        .zip(highs)
        .map(|(&lo, &hi)| {
            if points == 1 {
                return vec![lo];
            }
            let dx = (hi - lo) / (points - 1) as f64;
            (0..points).map(|k| lo + dx * k as f64).collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    Ok(axes.into_iter().multi_cartesian_product().collect())
}
