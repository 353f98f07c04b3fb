#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Side by side (`split-window -h`).
    Horizontal,
    /// Stacked (`split-window -v`).
    Vertical,
}

impl SplitDirection {
    pub fn flag(&self) -> &'static str {
        match self {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStep {
    Split {
        target: u32,
        direction: SplitDirection,
    },
    /// `select-layout tiled` on the whole window.
    Tile,
}

/// Fixed binary-split sequences that turn a single-pane window into its
/// target pane count. Pane indices follow tmux renumbering: a new pane is
/// inserted right after the pane it was split from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPlan {
    /// Four panes in a single row.
    Row,
    /// Two rows of four.
    TwoByFour,
    /// Four rows of four.
    FourByFour,
    /// `n - 1` splits of pane 0, re-tiled after each one.
    Tiled(u32),
}

fn split(target: u32, direction: SplitDirection) -> SplitStep {
    SplitStep::Split { target, direction }
}

/// Three side-by-side splits turning the pane at `first` into a row of four.
fn row_of_four(first: u32) -> [SplitStep; 3] {
    [
        split(first, SplitDirection::Horizontal),
        split(first, SplitDirection::Horizontal),
        split(first + 1, SplitDirection::Horizontal),
    ]
}

impl SplitPlan {
    pub fn for_pane_count(pane_count: u32) -> Self {
        match pane_count {
            4 => SplitPlan::Row,
            8 => SplitPlan::TwoByFour,
            16 => SplitPlan::FourByFour,
            n => SplitPlan::Tiled(n.max(1)),
        }
    }

    pub fn expected_panes(&self) -> u32 {
        match self {
            SplitPlan::Row => 4,
            SplitPlan::TwoByFour => 8,
            SplitPlan::FourByFour => 16,
            SplitPlan::Tiled(n) => *n,
        }
    }

    /// Rows-by-columns label of the resulting arrangement.
    pub fn label(&self) -> String {
        match self {
            SplitPlan::Row => "1x4".to_string(),
            SplitPlan::TwoByFour => "2x4".to_string(),
            SplitPlan::FourByFour => "4x4".to_string(),
            SplitPlan::Tiled(n) => format!("tiled-{n}"),
        }
    }

    pub fn steps(&self) -> Vec<SplitStep> {
        let mut steps = Vec::new();
        match self {
            SplitPlan::Row => {
                steps.extend(row_of_four(0));
            }
            SplitPlan::TwoByFour => {
                steps.push(split(0, SplitDirection::Vertical));
                steps.extend(row_of_four(0));
                steps.extend(row_of_four(4));
                steps.push(SplitStep::Tile);
            }
            SplitPlan::FourByFour => {
                steps.push(split(0, SplitDirection::Vertical));
                steps.push(split(0, SplitDirection::Vertical));
                steps.push(split(1, SplitDirection::Vertical));
                for row in 0..4 {
                    steps.extend(row_of_four(row * 4));
                }
                steps.push(SplitStep::Tile);
            }
            SplitPlan::Tiled(n) => {
                for _ in 1..*n {
                    steps.push(split(0, SplitDirection::Vertical));
                    steps.push(SplitStep::Tile);
                }
            }
        }
        steps
    }

    pub fn split_count(&self) -> usize {
        self.steps()
            .iter()
            .filter(|s| matches!(s, SplitStep::Split { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a plan against a list of pane ids the way tmux renumbers them,
    /// returning the final pane count or the first out-of-range target.
    fn simulate(plan: &SplitPlan) -> Result<u32, u32> {
        let mut panes = 1u32;
        for step in plan.steps() {
            if let SplitStep::Split { target, .. } = step {
                if target >= panes {
                    return Err(target);
                }
                panes += 1;
            }
        }
        Ok(panes)
    }

    #[test]
    fn plan_selection_by_pane_count() {
        assert_eq!(SplitPlan::for_pane_count(4), SplitPlan::Row);
        assert_eq!(SplitPlan::for_pane_count(8), SplitPlan::TwoByFour);
        assert_eq!(SplitPlan::for_pane_count(16), SplitPlan::FourByFour);
        assert_eq!(SplitPlan::for_pane_count(3), SplitPlan::Tiled(3));
        assert_eq!(SplitPlan::for_pane_count(0), SplitPlan::Tiled(1));
    }

    #[test]
    fn every_plan_reaches_its_expected_count() {
        for plan in [
            SplitPlan::Row,
            SplitPlan::TwoByFour,
            SplitPlan::FourByFour,
            SplitPlan::Tiled(1),
            SplitPlan::Tiled(3),
            SplitPlan::Tiled(32),
        ] {
            assert_eq!(
                simulate(&plan),
                Ok(plan.expected_panes()),
                "steps: {:?} should produce {} panes",
                plan,
                plan.expected_panes()
            );
            assert_eq!(plan.split_count() as u32, plan.expected_panes() - 1);
        }
    }

    #[test]
    fn row_plan_never_retiles() {
        assert!(!SplitPlan::Row.steps().contains(&SplitStep::Tile));
        assert_eq!(SplitPlan::FourByFour.steps().last(), Some(&SplitStep::Tile));
    }

    #[test]
    fn four_by_four_starts_with_three_vertical_splits() {
        let steps = SplitPlan::FourByFour.steps();
        let verticals = steps
            .iter()
            .take(3)
            .filter(|s| {
                matches!(
                    s,
                    SplitStep::Split {
                        direction: SplitDirection::Vertical,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(verticals, 3);
    }
}
