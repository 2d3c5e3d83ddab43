//! Monte Carlo evaluation of resource-management policies.
//!
//! [`rollouts::simulate`] runs repeated independent episodes of a policy
//! against an environment and collects per-step records;
//! [`rollouts::policy_function`] samples the policy's action over a grid of
//! states without touching any environment.

pub mod config;
pub mod environments;
pub mod error;
pub mod io;
pub mod mdps;
pub mod rollouts;

pub use error::{Result, RolloutError};
