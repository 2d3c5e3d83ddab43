use crate::mdps::{Action, BoxError, Environment, Observation, Transition};
use gymnasium::{Discrete, ObsActSpace, ObsActSpaceItem};
use rand::prelude::*;
use serde_json::Value;

/// A gym-http-api environment instance driven through the harness contract.
pub struct GymAdapter {
    name: String,
    env: gymnasium::Environment,
}

impl GymAdapter {
    pub fn new(env: gymnasium::Environment) -> Result<Self, BoxError> {
        Ok(Self {
            name: env.name()?,
            env,
        })
    }

    /// Create a fresh instance of `env_id` on the server at `api_url`.
    pub fn create(
        api_url: &str,
        env_id: &str,
        max_episode_steps: Option<Discrete>,
        kwargs: &[(&str, Value)],
    ) -> Result<Self, BoxError> {
        let env = gymnasium::Environment::new(
            api_url,
            env_id,
            max_episode_steps,
            Some(false),
            None,
            kwargs,
        )?;
        Self::new(env)
    }

    pub fn inner(&self) -> &gymnasium::Environment {
        &self.env
    }
}

impl Drop for GymAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.env.close() {
            tracing::warn!(instance = self.env.instance_id(), error = %e, "failed to close remote environment");
        }
    }
}

impl Environment for GymAdapter {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn reset(&mut self, rng: &mut StdRng) -> Result<Observation, BoxError> {
        // Server-side seed drawn from the episode rng.
        let seed = rng.gen::<u32>() as u64;
        let obs = self.env.reset(Some(seed))?;
        Ok(to_observation(&obs))
    }

    fn step(
        &mut self,
        _state: &Observation,
        action: &Action,
        _rng: &mut StdRng,
    ) -> Result<Transition, BoxError> {
        let action = to_items(self.env.action_space(), action);
        let si = self.env.step(&action)?;

        Ok(Transition {
            next_state: to_observation(&si.observation),
            reward: si.reward,
            done: si.terminated || si.truncated,
            info: si.info,
        })
    }
}

pub fn to_observation(items: &[ObsActSpaceItem]) -> Observation {
    items.iter().map(ObsActSpaceItem::as_f64).collect()
}

/// Discrete spaces take the action rounded to the nearest index.
pub fn to_items(space: &ObsActSpace, action: &Action) -> Vec<ObsActSpaceItem> {
    match space {
        ObsActSpace::Discrete { .. } => action
            .iter()
            .map(|a| ObsActSpaceItem::Discrete(a.round() as Discrete))
            .collect(),
        ObsActSpace::Box { .. } => action
            .iter()
            .map(|&a| ObsActSpaceItem::Continous(a))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_actions_for_discrete_spaces() {
        let items = to_items(&ObsActSpace::Discrete { n: 3 }, &vec![1.6]);
        assert_eq!(items, vec![ObsActSpaceItem::Discrete(2)]);
    }

    #[test]
    fn passes_box_actions_through() {
        let space = ObsActSpace::Box {
            shape: vec![2],
            high: vec![1., 1.],
            low: vec![-1., -1.],
        };
        let items = to_items(&space, &vec![0.25, -0.5]);
        assert_eq!(
            items,
            vec![ObsActSpaceItem::Continous(0.25), ObsActSpaceItem::Continous(-0.5)]
        );
    }

    #[test]
    fn widens_discrete_observations() {
        let obs = to_observation(&[ObsActSpaceItem::Discrete(5)]);
        assert_eq!(obs, vec![5.]);
    }
}
