use crate::mdps::{Action, Observation};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One decision: the state the policy saw, what it did and what it earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub episode: usize,
    pub step: usize,
    pub state: Observation,
    pub action: Action,
    pub reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub index: usize,
    pub seed: u64,
    pub steps: Vec<StepRecord>,
    /// `true` if the environment reported completion, `false` on horizon cut-off.
    pub terminated: bool,
    pub terminal_state: Observation,
}

impl Episode {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// Discounted return from the first step, accumulated backwards.
    pub fn discounted_return(&self, gamma: f64) -> f64 {
        self.steps
            .iter()
            .rev()
            .fold(0., |g, s| gamma * g + s.reward)
    }
}

/// An episode that failed while failures were being isolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFailure {
    pub episode: usize,
    pub step: usize,
    pub message: String,
    pub partial: Option<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutBatch {
    pub environment: String,
    pub policy: String,
    pub seed: u64,
    pub max_steps: usize,
    /// Completed episodes ordered by index.
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub failures: Vec<EpisodeFailure>,
}

impl RolloutBatch {
    pub fn records(&self) -> impl Iterator<Item = &StepRecord> {
        self.episodes.iter().flat_map(|e| e.steps.iter())
    }

    pub fn total_rewards(&self) -> Vec<f64> {
        self.episodes.iter().map(Episode::total_reward).collect()
    }

    pub fn discounted_returns(&self, gamma: f64) -> Vec<f64> {
        self.episodes
            .iter()
            .map(|e| e.discounted_return(gamma))
            .collect()
    }

    pub fn failed_episodes(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.episode).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_batch(self)
    }
}

/// Aggregates over the completed episodes of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub episodes: usize,
    pub failed: usize,
    pub mean_reward: f64,
    /// Population standard deviation of the per-episode total reward.
    pub std_reward: f64,
    pub min_reward: f64,
    pub max_reward: f64,
    pub mean_length: f64,
    pub terminated_fraction: f64,
    pub terminal_state_mean: Observation,
}

impl BatchSummary {
    pub fn from_batch(batch: &RolloutBatch) -> Self {
        let rewards = batch.total_rewards();
        let (mean_reward, var_reward) = mean_var(&rewards);
        let (min_reward, max_reward) = rewards
            .iter()
            .copied()
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or((0., 0.));

        let n = batch.episodes.len();
        let lengths = batch
            .episodes
            .iter()
            .map(|e| e.len() as f64)
            .collect::<Vec<_>>();
        let terminated = batch.episodes.iter().filter(|e| e.terminated).count();

        let terminal_states = batch
            .episodes
            .iter()
            .map(|e| e.terminal_state.as_slice())
            .collect::<Vec<_>>();

        Self {
            episodes: n,
            failed: batch.failures.len(),
            mean_reward,
            std_reward: var_reward.sqrt(),
            min_reward,
            max_reward,
            mean_length: mean_var(&lengths).0,
            terminated_fraction: if n == 0 { 0. } else { terminated as f64 / n as f64 },
            terminal_state_mean: column_means(&terminal_states),
        }
    }
}

/// Mean and population variance. Both zero for an empty slice.
pub(crate) fn mean_var(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0., 0.);
    }

    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

/// Per-dimension means of equally sized rows.
pub(crate) fn column_means(rows: &[&[f64]]) -> Vec<f64> {
    let Some(dim) = rows.first().map(|r| r.len()) else {
        return vec![];
    };

    (0..dim)
        .map(|d| {
            let col = rows
                .iter()
                .map(|r| r.get(d).copied().unwrap_or(0.))
                .collect::<Vec<_>>();
            mean_var(&col).0
        })
        .collect()
}
