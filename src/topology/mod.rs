mod controller;
mod desks;
mod mapping;
mod registry;

pub use controller::{TopologyController, WindowOutcome};
pub use desks::generate_desks;
