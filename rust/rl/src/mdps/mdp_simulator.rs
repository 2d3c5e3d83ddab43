use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Observation = Vec<f64>;
pub type Action = Vec<f64>;

/// Error raised by an environment or policy collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of applying one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub next_state: Observation,
    pub reward: f64,
    pub done: bool,
    #[serde(default)]
    pub info: Value,
}

impl Transition {
    pub fn new(next_state: Observation, reward: f64, done: bool) -> Self {
        Self {
            next_state,
            reward,
            done,
            info: Value::Null,
        }
    }
}

/// A discrete-time dynamical system with a reward signal.
///
/// Randomness must come from the `rng` handed in, so that a rollout seeded
/// per episode is reproducible.
pub trait Environment {
    fn name(&self) -> String;

    fn reset(&mut self, rng: &mut StdRng) -> Result<Observation, BoxError>;

    fn step(
        &mut self,
        state: &Observation,
        action: &Action,
        rng: &mut StdRng,
    ) -> Result<Transition, BoxError>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn reset(&mut self, rng: &mut StdRng) -> Result<Observation, BoxError> {
        (**self).reset(rng)
    }

    fn step(
        &mut self,
        state: &Observation,
        action: &Action,
        rng: &mut StdRng,
    ) -> Result<Transition, BoxError> {
        (**self).step(state, action, rng)
    }
}

/// Maps a state to an action. Trained agents and fixed rules alike.
pub trait Policy {
    fn name(&self) -> String {
        "policy".to_string()
    }

    fn predict(
        &self,
        state: &Observation,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> Result<Action, BoxError>;
}

/// A policy backed by a plain function or closure.
#[derive(Debug, Clone, Copy)]
pub struct FnPolicy<F> {
    name: &'static str,
    f: F,
}

pub fn from_fn<F>(name: &'static str, f: F) -> FnPolicy<F>
where
    F: Fn(&Observation, bool, &mut StdRng) -> Result<Action, BoxError>,
{
    FnPolicy { name, f }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&Observation, bool, &mut StdRng) -> Result<Action, BoxError>,
{
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn predict(
        &self,
        state: &Observation,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> Result<Action, BoxError> {
        (self.f)(state, deterministic, rng)
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn predict(
        &self,
        state: &Observation,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> Result<Action, BoxError> {
        (**self).predict(state, deterministic, rng)
    }
}
