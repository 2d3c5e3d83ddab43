pub mod gym_adapter;

pub use gym_adapter::*;
