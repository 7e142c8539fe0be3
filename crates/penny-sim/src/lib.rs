//! Synthetic scenario driver, Monte-Carlo validator, and result persistence
//! for `penny-core`. Stands in for the packet-capture, RNG, and drop-actuator
//! backends that a real deployment would supply.

pub mod environment;
pub mod montecarlo;
pub mod persistence;
pub mod random;

pub use environment::{run_single_flow_scenario, ScenarioOutcome, ScenarioSpec};
pub use random::StdRandom;
