use serde::Serialize;

use crate::errors::{TournamentError, TournamentResult};
use crate::types::{MAX_HEAT_SIZE, MIN_HEAT_SIZE, PLANNER_MAX_PILOTS, PLANNER_MIN_PILOTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatPlan {
    pub four_heats: usize,
    pub three_heats: usize,
}

impl HeatPlan {
    pub fn heat_count(&self) -> usize {
        self.four_heats + self.three_heats
    }

    pub fn pilot_count(&self) -> usize {
        self.four_heats * MAX_HEAT_SIZE + self.three_heats * MIN_HEAT_SIZE
    }

    /// Heat sizes in slicing order: all 4-pilot heats first.
    pub fn heat_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![MAX_HEAT_SIZE; self.four_heats];
        sizes.extend(std::iter::repeat(MIN_HEAT_SIZE).take(self.three_heats));
        sizes
    }
}

/// Splits a qualification field into 3/4-pilot heats, preferring 4-pilot heats.
pub fn plan(pilot_count: usize) -> TournamentResult<HeatPlan> {
    if !(PLANNER_MIN_PILOTS..=PLANNER_MAX_PILOTS).contains(&pilot_count) {
        return Err(TournamentError::PlanOutOfRange(pilot_count));
    }
    match split(pilot_count) {
        Some(plan) => Ok(plan),
        // every n >= 6 is 4a + 3b; reaching this means the range constants are broken
        None => panic!("no 3/4 heat split exists for {pilot_count} pilots"),
    }
}

/// Scans the 4-pilot heat count downward and takes the first remainder that
/// 3-pilot heats can absorb. `None` for 1, 2 and 5.
pub fn split(pilot_count: usize) -> Option<HeatPlan> {
    (0..=pilot_count / MAX_HEAT_SIZE).rev().find_map(|four_heats| {
        let rest = pilot_count - four_heats * MAX_HEAT_SIZE;
        (rest % MIN_HEAT_SIZE == 0).then_some(HeatPlan {
            four_heats,
            three_heats: rest / MIN_HEAT_SIZE,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_prefers_four_pilot_heats() {
        assert_eq!(plan(18).unwrap(), HeatPlan { four_heats: 3, three_heats: 2 });
        assert_eq!(plan(19).unwrap(), HeatPlan { four_heats: 4, three_heats: 1 });
        assert_eq!(plan(8).unwrap(), HeatPlan { four_heats: 2, three_heats: 0 });
        assert_eq!(plan(7).unwrap(), HeatPlan { four_heats: 1, three_heats: 1 });
    }

    #[test]
    fn plan_rejects_counts_outside_range() {
        assert_eq!(plan(6), Err(TournamentError::PlanOutOfRange(6)));
        assert_eq!(plan(61), Err(TournamentError::PlanOutOfRange(61)));
        assert_eq!(plan(0), Err(TournamentError::PlanOutOfRange(0)));
    }

    #[test]
    fn plan_is_exact_and_maximal_across_range() {
        for n in PLANNER_MIN_PILOTS..=PLANNER_MAX_PILOTS {
            let result = plan(n).unwrap();
            assert_eq!(result.pilot_count(), n, "pilot count {n}");
            for better in (result.four_heats + 1)..=(n / 4) {
                assert_ne!((n - better * 4) % 3, 0, "{n} pilots allow {better} four-heats");
            }
        }
    }

    #[test]
    fn split_handles_small_fields() {
        assert_eq!(split(6), Some(HeatPlan { four_heats: 0, three_heats: 2 }));
        assert_eq!(split(4), Some(HeatPlan { four_heats: 1, three_heats: 0 }));
        assert_eq!(split(5), None);
        assert_eq!(split(2), None);
    }

    #[test]
    fn heat_sizes_lists_four_heats_first() {
        let sizes = plan(10).unwrap().heat_sizes();
        assert_eq!(sizes, vec![4, 3, 3]);
    }
}
