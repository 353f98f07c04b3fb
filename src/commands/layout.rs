use anyhow::Result;
use clap::Args as ClapArgs;

use crate::layout::{calculate_layout, nearest_square};

#[derive(ClapArgs)]
pub struct Args {
    /// Grid descriptor, e.g. 8x4
    pub grid: String,

    /// Number of rooms (windows)
    #[arg(short, long, default_value_t = 3)]
    pub rooms: usize,
}

pub async fn execute(args: Args) -> Result<()> {
    let plan = calculate_layout(&args.grid, args.rooms);

    println!("Grid:     {}", args.grid);
    println!("Strategy: {:?}", plan.strategy);
    if plan.strategy.is_degraded() {
        println!("          (unsupported grid/room combination, 4x4 fallback)");
    }
    println!("Total:    {} panes", plan.total_panes);

    for (index, room) in plan.rooms.iter().enumerate() {
        let split = plan.split_plan_for_room(index);
        println!(
            "  room {}: {:>2} panes, layout {}, split plan {} ({} splits)",
            index + 1,
            room.panes,
            room.layout,
            split.label(),
            split.split_count()
        );
    }

    let (cols, rows) = nearest_square(plan.total_panes);
    println!("Nearest square for {} panes: {}x{}", plan.total_panes, cols, rows);
    Ok(())
}
