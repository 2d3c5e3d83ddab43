pub mod mdp_simulator;
pub mod policies;

pub use mdp_simulator::*;
pub use policies::*;
