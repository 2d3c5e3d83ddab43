//! Repeated independent rollouts of a policy against an environment.
//!
//! Episode `i` draws all of its randomness from its own `StdRng` seeded with
//! `seed + i`, so a batch is reproducible under a fixed seed whether it is
//! run serially or across workers.

mod episode;
mod parallel;
mod policy_fn;

pub use episode::*;
pub use parallel::simulate_parallel;
pub use policy_fn::*;

use crate::error::{Result, RolloutError};
use crate::mdps::{BoxError, Environment, Policy};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// What happens to the rest of the batch when one episode fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Fail the whole call with the error of the failing episode.
    #[default]
    Abort,
    /// Drop the failing episode, report it in `RolloutBatch::failures` and carry on.
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutOptions {
    /// Number of independent episodes.
    pub reps: usize,
    /// Horizon cap per episode.
    pub max_steps: usize,
    pub seed: Option<u64>,
    /// Passed to `Policy::predict`; off by default, as in `policy_function`.
    #[serde(default)]
    pub deterministic: bool,
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Keep the steps of failed episodes for diagnostics.
    #[serde(default)]
    pub collect_partial: bool,
}

impl RolloutOptions {
    pub fn new(reps: usize, max_steps: usize) -> Self {
        Self {
            reps,
            max_steps,
            seed: None,
            deterministic: false,
            failure_mode: FailureMode::Abort,
            collect_partial: false,
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

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_collect_partial(mut self, collect_partial: bool) -> Self {
        self.collect_partial = collect_partial;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reps == 0 {
            return Err(RolloutError::invalid("reps must be positive"));
        }
        if self.max_steps == 0 {
            return Err(RolloutError::invalid("max_steps must be positive"));
        }
        Ok(())
    }

    /// The explicit seed, or one drawn from entropy so the batch can be replayed.
    pub(crate) fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| thread_rng().gen())
    }
}

pub(crate) fn episode_seed(base: u64, episode: usize) -> u64 {
    base.wrapping_add(episode as u64)
}

/// Run `options.reps` independent episodes of `policy` in `env`.
///
/// In [`FailureMode::Abort`] the first failing episode fails the call. In
/// [`FailureMode::Isolate`] the batch holds only completed episodes and
/// lists the failed indices in `failures`.
pub fn simulate<E, P>(env: &mut E, policy: &P, options: &RolloutOptions) -> Result<RolloutBatch>
where
    E: Environment + ?Sized,
    P: Policy + ?Sized,
{
    options.validate()?;
    let seed = options.resolve_seed();

    let mut episodes = Vec::with_capacity(options.reps);
    let mut failures = vec![];
    for i in 0..options.reps {
        match run_episode(env, policy, i, episode_seed(seed, i), options) {
            Ok(ep) => episodes.push(ep),
            Err(e) => record_failure(e, options.failure_mode, &mut failures)?,
        }
    }

    let batch = RolloutBatch {
        environment: env.name(),
        policy: policy.name(),
        seed,
        max_steps: options.max_steps,
        episodes,
        failures,
    };
    tracing::debug!(
        env = %batch.environment,
        policy = %batch.policy,
        seed,
        episodes = batch.episodes.len(),
        failed = batch.failures.len(),
        "simulation finished"
    );

    Ok(batch)
}

pub(crate) fn record_failure(
    e: RolloutError,
    mode: FailureMode,
    failures: &mut Vec<EpisodeFailure>,
) -> Result<()> {
    match (mode, e) {
        (
            FailureMode::Isolate,
            RolloutError::Environment {
                episode,
                step,
                source,
                partial,
            }
            | RolloutError::Policy {
                episode,
                step,
                source,
                partial,
            },
        ) => {
            tracing::warn!(episode, step, error = %source, "episode failed, isolating");
            failures.push(EpisodeFailure {
                episode,
                step,
                message: source.to_string(),
                partial: partial.map(|p| *p),
            });
            Ok(())
        }
        (_, e) => Err(e),
    }
}

enum Failure {
    Environment(BoxError),
    Policy(BoxError),
}

/// Reset, then query-step-record until `done` or the horizon.
pub(crate) fn run_episode<E, P>(
    env: &mut E,
    policy: &P,
    index: usize,
    seed: u64,
    options: &RolloutOptions,
) -> Result<Episode>
where
    E: Environment + ?Sized,
    P: Policy + ?Sized,
{
    let rng = &mut StdRng::seed_from_u64(seed);
    let mut ep = Episode {
        index,
        seed,
        steps: Vec::new(),
        terminated: false,
        terminal_state: Vec::new(),
    };

    let fail = |ep: Episode, step: usize, failure: Failure| {
        let partial = options.collect_partial.then(|| Box::new(ep));
        match failure {
            Failure::Environment(source) => RolloutError::Environment {
                episode: index,
                step,
                source,
                partial,
            },
            Failure::Policy(source) => RolloutError::Policy {
                episode: index,
                step,
                source,
                partial,
            },
        }
    };

    let mut s = match env.reset(rng) {
        Ok(s) => s,
        Err(e) => return Err(fail(ep, 0, Failure::Environment(e))),
    };

    for t in 0..options.max_steps {
        let a = match policy.predict(&s, options.deterministic, rng) {
            Ok(a) => a,
            Err(e) => return Err(fail(ep, t, Failure::Policy(e))),
        };
        let tr = match env.step(&s, &a, rng) {
            Ok(tr) => tr,
            Err(e) => return Err(fail(ep, t, Failure::Environment(e))),
        };

        ep.steps.push(StepRecord {
            episode: index,
            step: t,
            state: s,
            action: a,
            reward: tr.reward,
        });
        s = tr.next_state;

        if tr.done {
            ep.terminated = true;
            break;
        }
    }

    ep.terminal_state = s;
    tracing::trace!(
        episode = index,
        steps = ep.len(),
        reward = ep.total_reward(),
        "episode finished"
    );

    Ok(ep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdps::{from_fn, Action, Observation, Transition};
    use rstest::rstest;

    /// Walks down from 3 by the action taken; done at or below zero.
    struct Countdown;

    impl Environment for Countdown {
        fn name(&self) -> String {
            "countdown".to_string()
        }

        fn reset(&mut self, _rng: &mut StdRng) -> std::result::Result<Observation, BoxError> {
            Ok(vec![3.])
        }

        fn step(
            &mut self,
            state: &Observation,
            action: &Action,
            _rng: &mut StdRng,
        ) -> std::result::Result<Transition, BoxError> {
            let next = state[0] - action[0];
            Ok(Transition::new(vec![next], action[0], next <= 0.))
        }
    }

    fn one() -> impl Policy {
        from_fn("one", |_, _, _| Ok(vec![1.]))
    }

    #[rstest]
    #[case(0, 10)]
    #[case(5, 0)]
    fn rejects_non_positive_counts(#[case] reps: usize, #[case] max_steps: usize) {
        let err = simulate(&mut Countdown, &one(), &RolloutOptions::new(reps, max_steps)).unwrap_err();
        assert!(matches!(err, RolloutError::InvalidConfiguration(_)));
    }

    #[test]
    fn countdown_terminates_after_three_steps() {
        let batch = simulate(&mut Countdown, &one(), &RolloutOptions::new(1, 10).with_seed(1)).unwrap();

        let ep = &batch.episodes[0];
        assert_eq!(ep.len(), 3);
        assert!(ep.terminated);
        let states = ep.steps.iter().map(|s| s.state[0]).collect::<Vec<_>>();
        assert_eq!(states, vec![3., 2., 1.]);
        assert_eq!(ep.steps.last().map(|s| s.step), Some(2));
        assert_eq!(ep.terminal_state, vec![0.]);
    }

    #[test]
    fn horizon_cuts_off_episode() {
        let batch = simulate(&mut Countdown, &one(), &RolloutOptions::new(2, 2).with_seed(1)).unwrap();

        for ep in &batch.episodes {
            assert_eq!(ep.len(), 2);
            assert!(!ep.terminated);
            assert_eq!(ep.terminal_state, vec![1.]);
        }
    }

    #[test]
    fn samples_by_default_like_policy_function() {
        let options: RolloutOptions = serde_json::from_str(r#"{"reps": 1, "max_steps": 1, "seed": null}"#).unwrap();
        assert_eq!(options, RolloutOptions::new(1, 1));
        assert!(!options.deterministic);
        assert_eq!(options.deterministic, PolicyFunctionOptions::new(1).deterministic);
    }

    #[test]
    fn records_the_seed_it_drew() {
        let batch = simulate(&mut Countdown, &one(), &RolloutOptions::new(3, 5)).unwrap();
        let seeds = batch.episodes.iter().map(|e| e.seed).collect::<Vec<_>>();
        assert_eq!(
            seeds,
            vec![batch.seed, batch.seed.wrapping_add(1), batch.seed.wrapping_add(2)]
        );
    }
}
