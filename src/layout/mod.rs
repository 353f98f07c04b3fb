mod grid;
mod split;

pub use grid::{calculate_layout, nearest_square, LayoutStrategy};
pub use split::{SplitDirection, SplitPlan, SplitStep};
