use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

use super::split::SplitPlan;

/// Panes in the executive window of the three-room shape.
pub const EXECUTIVE_ROOM_PANES: u32 = 4;
/// Panes in each team window of the three-room shape.
pub const TEAM_ROOM_PANES: u32 = 8;
/// Panes per window used whenever a (grid, room count) pair is unsupported.
pub const FALLBACK_PANES: u32 = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Invalid grid descriptor '{0}': expected '<columns>x<rows>'")]
    InvalidFormat(String),

    #[error("Grid descriptor '{0}' has a zero dimension")]
    ZeroDimension(String),
}

fn grid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d+)\s*[xX]\s*(\d+)\s*$").expect("grid pattern compiles"))
}

/// A `{columns}x{rows}` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub columns: u32,
    pub rows: u32,
}

impl GridSpec {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn total_panes(&self) -> u32 {
        self.columns * self.rows
    }
}

impl FromStr for GridSpec {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = grid_pattern()
            .captures(s)
            .ok_or_else(|| GridError::InvalidFormat(s.to_string()))?;

        let columns: u32 = caps[1]
            .parse()
            .map_err(|_| GridError::InvalidFormat(s.to_string()))?;
        let rows: u32 = caps[2]
            .parse()
            .map_err(|_| GridError::InvalidFormat(s.to_string()))?;

        if columns == 0 || rows == 0 {
            return Err(GridError::ZeroDimension(s.to_string()));
        }

        columns
            .checked_mul(rows)
            .ok_or_else(|| GridError::InvalidFormat(s.to_string()))?;

        Ok(Self { columns, rows })
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// Closed set of supported room/pane shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStrategy {
    SingleRoom,
    TwoRoomEqualSplit,
    ThreeRoomWithExecutive,
    FallbackDefault,
}

impl LayoutStrategy {
    pub fn select(grid: &GridSpec, room_count: usize) -> Self {
        let total = grid.total_panes();
        match room_count {
            1 => LayoutStrategy::SingleRoom,
            2 if total % 2 == 0 => LayoutStrategy::TwoRoomEqualSplit,
            3 if total == 2 * TEAM_ROOM_PANES + EXECUTIVE_ROOM_PANES => {
                LayoutStrategy::ThreeRoomWithExecutive
            }
            _ => LayoutStrategy::FallbackDefault,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, LayoutStrategy::FallbackDefault)
    }
}

/// Pane count and layout label for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPanes {
    pub panes: u32,
    pub layout: String,
}

/// Result of the layout calculation. Per-room entries are positional: entry
/// `i` belongs to the `i`-th declared room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub strategy: LayoutStrategy,
    pub total_panes: u32,
    pub rooms: Vec<RoomPanes>,
}

impl LayoutPlan {
    fn uniform(strategy: LayoutStrategy, room_count: usize, panes: u32, layout: String) -> Self {
        let rooms = vec![RoomPanes { panes, layout }; room_count];
        Self {
            strategy,
            total_panes: panes * room_count as u32,
            rooms,
        }
    }

    fn fallback(room_count: usize) -> Self {
        Self::uniform(
            LayoutStrategy::FallbackDefault,
            room_count.max(1),
            FALLBACK_PANES,
            "4x4".to_string(),
        )
    }

    /// Panes for the room at `index`, or the fallback count past the end.
    pub fn panes_for_room(&self, index: usize) -> u32 {
        self.rooms
            .get(index)
            .map(|r| r.panes)
            .unwrap_or(FALLBACK_PANES)
    }

    pub fn split_plan_for_room(&self, index: usize) -> SplitPlan {
        SplitPlan::for_pane_count(self.panes_for_room(index))
    }
}

/// Maps a pane count to a `{cols}x{rows}` pair close to a square:
/// `rows = ceil(sqrt(n))`, `cols = ceil(n / rows)`.
pub fn nearest_square(pane_count: u32) -> (u32, u32) {
    let n = pane_count.max(1);
    let mut rows = (n as f64).sqrt().ceil() as u32;
    // Guard against float rounding on large perfect squares.
    while rows > 1 && (rows - 1) * (rows - 1) >= n {
        rows -= 1;
    }
    while rows * rows < n {
        rows += 1;
    }
    let cols = n.div_ceil(rows);
    (cols, rows)
}

fn square_label(pane_count: u32) -> String {
    let (cols, rows) = nearest_square(pane_count);
    format!("{cols}x{rows}")
}

/// Computes panes per window for a grid descriptor and a room count.
///
/// Unsupported pairs and unparsable descriptors fall back to 16 panes in every
/// window. The fallback is logged because it is never what the operator asked
/// for.
pub fn calculate_layout(grid: &str, room_count: usize) -> LayoutPlan {
    let spec = match grid.parse::<GridSpec>() {
        Ok(spec) => spec,
        Err(e) => {
            warn!(grid, room_count, error = %e, "degraded layout: unparsable grid, using 4x4 default");
            return LayoutPlan::fallback(room_count);
        }
    };

    let total = spec.total_panes();
    match LayoutStrategy::select(&spec, room_count) {
        LayoutStrategy::SingleRoom => {
            LayoutPlan::uniform(LayoutStrategy::SingleRoom, 1, total, spec.to_string())
        }
        LayoutStrategy::TwoRoomEqualSplit => {
            let per_room = total / 2;
            LayoutPlan::uniform(
                LayoutStrategy::TwoRoomEqualSplit,
                2,
                per_room,
                square_label(per_room),
            )
        }
        LayoutStrategy::ThreeRoomWithExecutive => {
            let team = RoomPanes {
                panes: TEAM_ROOM_PANES,
                layout: SplitPlan::TwoByFour.label(),
            };
            let executive = RoomPanes {
                panes: EXECUTIVE_ROOM_PANES,
                layout: SplitPlan::Row.label(),
            };
            LayoutPlan {
                strategy: LayoutStrategy::ThreeRoomWithExecutive,
                total_panes: total,
                rooms: vec![team.clone(), team, executive],
            }
        }
        LayoutStrategy::FallbackDefault => {
            warn!(
                grid,
                room_count, "degraded layout: unsupported grid/room combination, using 4x4 default"
            );
            LayoutPlan::fallback(room_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spec_parses_columns_and_rows() {
        let spec: GridSpec = "8x4".parse().unwrap();
        assert_eq!(spec, GridSpec::new(8, 4));
        assert_eq!(spec.total_panes(), 32);
        assert_eq!(spec.to_string(), "8x4");
    }

    #[test]
    fn grid_spec_rejects_garbage() {
        assert_eq!(
            "eight".parse::<GridSpec>(),
            Err(GridError::InvalidFormat("eight".to_string()))
        );
        assert_eq!(
            "0x4".parse::<GridSpec>(),
            Err(GridError::ZeroDimension("0x4".to_string()))
        );
    }

    #[test]
    fn two_rooms_split_8x4_evenly() {
        let plan = calculate_layout("8x4", 2);
        assert_eq!(plan.strategy, LayoutStrategy::TwoRoomEqualSplit);
        assert_eq!(plan.total_panes, 32);
        assert_eq!(plan.panes_for_room(0), 16);
        assert_eq!(plan.panes_for_room(1), 16);
        assert_eq!(plan.rooms[0].layout, "4x4");
    }

    #[test]
    fn single_room_keeps_descriptor_as_layout() {
        let plan = calculate_layout("1x3", 1);
        assert_eq!(plan.strategy, LayoutStrategy::SingleRoom);
        assert_eq!(plan.total_panes, 3);
        assert_eq!(plan.panes_for_room(0), 3);
        assert_eq!(plan.rooms[0].layout, "1x3");
    }

    #[test]
    fn three_rooms_put_small_executive_room_last() {
        let plan = calculate_layout("5x4", 3);
        assert_eq!(plan.strategy, LayoutStrategy::ThreeRoomWithExecutive);
        let panes: Vec<u32> = plan.rooms.iter().map(|r| r.panes).collect();
        assert_eq!(panes, vec![8, 8, 4]);
        assert_eq!(plan.rooms[0].layout, "2x4");
        assert_eq!(plan.rooms[2].layout, "1x4");
    }

    #[test]
    fn unsupported_pair_falls_back_to_4x4() {
        let plan = calculate_layout("8x4", 3);
        assert_eq!(
            plan.strategy,
            LayoutStrategy::FallbackDefault,
            "calculate_layout: three rooms need exactly 20 panes for the 8/8/4 shape"
        );
        assert!(plan.strategy.is_degraded());
        assert_eq!(plan.panes_for_room(0), 16);
        assert_eq!(plan.rooms[1].layout, "4x4");

        let odd = calculate_layout("3x3", 2);
        assert_eq!(odd.strategy, LayoutStrategy::FallbackDefault);

        let broken = calculate_layout("not-a-grid", 2);
        assert_eq!(broken.strategy, LayoutStrategy::FallbackDefault);
        assert_eq!(broken.rooms.len(), 2);
    }

    #[test]
    fn fallback_with_zero_rooms_still_yields_one_window() {
        let plan = calculate_layout("8x4", 0);
        assert_eq!(plan.rooms.len(), 1);
        assert_eq!(plan.total_panes, 16);
    }

    #[test]
    fn nearest_square_matches_known_values() {
        assert_eq!(nearest_square(16), (4, 4));
        assert_eq!(nearest_square(3), (2, 2));
        assert_eq!(nearest_square(5), (2, 3));
        assert_eq!(nearest_square(10), (3, 4));
        assert_eq!(nearest_square(1), (1, 1));
        assert_eq!(nearest_square(0), (1, 1));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn supported_layouts_sum_to_grid_total(cols in 1u32..=16, rows in 1u32..=16, room_count in 1usize..=3) {
            let grid = format!("{cols}x{rows}");
            let plan = calculate_layout(&grid, room_count);
            if !plan.strategy.is_degraded() {
                let sum: u32 = plan.rooms.iter().map(|r| r.panes).sum();
                prop_assert_eq!(sum, cols * rows, "calculate_layout: pane sum must equal columns*rows");
                prop_assert_eq!(plan.total_panes, cols * rows);
                prop_assert_eq!(plan.rooms.len(), room_count);
            }
        }

        #[test]
        fn nearest_square_always_fits(n in 1u32..=2000) {
            let (cols, rows) = nearest_square(n);
            prop_assert!(cols * rows >= n, "nearest_square: grid must hold every pane");
            prop_assert!(cols <= rows, "nearest_square: rows = ceil(sqrt(n)) is never below cols");
        }
    }
}
