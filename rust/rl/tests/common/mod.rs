#![allow(dead_code)]

use rand::prelude::*;
use rollout::mdps::{from_fn, Action, BoxError, Environment, Observation, Policy, Transition};

/// `next = state - action`, done once the state reaches zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    pub start: f64,
}

impl Environment for Countdown {
    fn name(&self) -> String {
        "countdown".to_string()
    }

    fn reset(&mut self, _rng: &mut StdRng) -> Result<Observation, BoxError> {
        Ok(vec![self.start])
    }

    fn step(
        &mut self,
        state: &Observation,
        action: &Action,
        _rng: &mut StdRng,
    ) -> Result<Transition, BoxError> {
        let next = state[0] - action[0];
        Ok(Transition::new(vec![next], -action[0], next <= 0.))
    }
}

/// Logistic stock growth with multiplicative noise; the action is the harvest.
#[derive(Debug, Clone)]
pub struct NoisyStock {
    pub r: f64,
    pub sigma: f64,
}

impl Environment for NoisyStock {
    fn name(&self) -> String {
        "noisy_stock".to_string()
    }

    fn reset(&mut self, rng: &mut StdRng) -> Result<Observation, BoxError> {
        Ok(vec![rng.gen_range(0.3..0.9)])
    }

    fn step(
        &mut self,
        state: &Observation,
        action: &Action,
        rng: &mut StdRng,
    ) -> Result<Transition, BoxError> {
        let harvest = action[0].clamp(0., state[0]);
        let x = state[0] - harvest;
        let shock = 1. + self.sigma * rng.gen_range(-1.0..1.0);
        let next = (x + self.r * x * (1. - x)) * shock;
        Ok(Transition::new(vec![next], harvest, next < 0.05))
    }
}

/// First `u64` drawn by the rng of episode `episode` under base seed `base`.
pub fn poison(base: u64, episode: usize) -> u64 {
    StdRng::seed_from_u64(base.wrapping_add(episode as u64)).gen()
}

/// Wraps an environment and fails the episode whose rng opens with
/// `poison`: in `reset`, or else on its second step.
#[derive(Debug, Clone)]
pub struct FailsOn<E> {
    pub inner: E,
    pub poison: u64,
    on_reset: bool,
    armed: bool,
    steps: usize,
}

impl<E> FailsOn<E> {
    /// Fails the second step of the episode run with seed `base + episode`.
    pub fn episode(inner: E, base: u64, episode: usize) -> Self {
        Self {
            inner,
            poison: poison(base, episode),
            on_reset: false,
            armed: false,
            steps: 0,
        }
    }

    /// Fails the reset of the episode run with seed `base + episode`.
    pub fn reset_of(inner: E, base: u64, episode: usize) -> Self {
        Self {
            on_reset: true,
            ..Self::episode(inner, base, episode)
        }
    }
}

impl<E: Environment> Environment for FailsOn<E> {
    fn name(&self) -> String {
        format!("fails_on({})", self.inner.name())
    }

    fn reset(&mut self, rng: &mut StdRng) -> Result<Observation, BoxError> {
        self.armed = rng.gen::<u64>() == self.poison;
        self.steps = 0;
        if self.armed && self.on_reset {
            return Err("reset refused by simulator".into());
        }
        self.inner.reset(rng)
    }

    fn step(
        &mut self,
        state: &Observation,
        action: &Action,
        rng: &mut StdRng,
    ) -> Result<Transition, BoxError> {
        if self.armed && self.steps == 1 {
            return Err("simulator diverged".into());
        }
        self.steps += 1;
        self.inner.step(state, action, rng)
    }
}

/// Harvests one unit, except in the episode whose rng opens with `poison`,
/// where the first query fails.
pub fn crashes_in_episode(base: u64, episode: usize) -> impl Policy + Sync {
    let poison = poison(base, episode);
    from_fn("crashes", move |_, _, rng| {
        if rng.gen::<u64>() == poison {
            return Err("agent crashed".into());
        }
        Ok(vec![1.])
    })
}
