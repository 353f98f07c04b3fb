mod loader;
mod space;

pub use loader::Config;
pub use space::{SpaceConfig, TaskConfig};
