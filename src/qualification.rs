use serde::{Deserialize, Serialize};

use crate::config::now_ms;
use crate::errors::{Precondition, TournamentResult};
use crate::planner::plan;
use crate::types::{BracketType, Heat, MAX_HEAT_SIZE};

/// xorshift64 generator; the same seed always yields the same sequence.
#[derive(Clone, Debug)]
pub struct ShuffleRng {
  state: u64,
}

impl ShuffleRng {
  pub fn new(seed: u64) -> Self {
    let mut state = seed;
    if state == 0 {
      state = 0x9E37_79B9_7F4A_7C15;
    }
    ShuffleRng { state }
  }

  pub fn from_clock() -> Self {
    ShuffleRng::new(now_ms().rotate_left(17) ^ 0xA076_1D64_78BD_642F)
  }

  pub fn next_u64(&mut self) -> u64 {
    let mut x = self.state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.state = x;
    x
  }

  /// Uniform index in `0..upper` (rejection sampling, no modulo bias).
  pub fn gen_index(&mut self, upper: usize) -> usize {
    if upper <= 1 {
      return 0;
    }
    let upper = upper as u64;
    let zone = u64::MAX - (u64::MAX % upper);
    loop {
      let value = self.next_u64();
      if value < zone {
        return (value % upper) as usize;
      }
    }
  }
}

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T>(items: &mut [T], rng: &mut ShuffleRng) {
  for i in (1..items.len()).rev() {
    let j = rng.gen_index(i + 1);
    items.swap(i, j);
  }
}

pub fn seeded_shuffle<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
  let mut out = items.to_vec();
  shuffle(&mut out, &mut ShuffleRng::new(seed));
  out
}

/// Proposed qualification layout. Not live until confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatAssignment {
  pub heats: Vec<Vec<String>>,
}

impl HeatAssignment {
  /// Shuffle `pilot_ids` and slice them into heats per the planner.
  pub fn propose(pilot_ids: &[String], rng: &mut ShuffleRng) -> TournamentResult<Self> {
    let heat_plan = plan(pilot_ids.len())?;
    let mut shuffled = pilot_ids.to_vec();
    shuffle(&mut shuffled, rng);

    let mut heats = Vec::with_capacity(heat_plan.heat_count());
    let mut rest = shuffled.as_slice();
    for size in heat_plan.heat_sizes() {
      let (head, tail) = rest.split_at(size);
      heats.push(head.to_vec());
      rest = tail;
    }
    Ok(HeatAssignment { heats })
  }

  pub fn heat_of(&self, pilot_id: &str) -> Option<usize> {
    self.heats.iter().position(|heat| heat.iter().any(|id| id == pilot_id))
  }

  /// Moves one pilot into another proposed heat (appended at its end).
  pub fn move_pilot(&mut self, pilot_id: &str, target: usize) -> TournamentResult<()> {
    if target >= self.heats.len() {
      return Err(Precondition::UnknownProposedHeat(target).into());
    }
    let source = self
      .heat_of(pilot_id)
      .ok_or_else(|| Precondition::UnknownPilot(pilot_id.to_string()))?;
    if source == target {
      return Ok(());
    }
    self.heats[source].retain(|id| id != pilot_id);
    self.heats[target].push(pilot_id.to_string());
    Ok(())
  }

  /// First heat that blocks confirmation (empty or over capacity) with its size.
  pub fn blocking_heat(&self) -> Option<(usize, usize)> {
    self
      .heats
      .iter()
      .enumerate()
      .find(|(_, heat)| heat.is_empty() || heat.len() > MAX_HEAT_SIZE)
      .map(|(index, heat)| (index, heat.len()))
  }

  /// Drops pilots that are no longer eligible (e.g. dropped out mid-assignment).
  pub fn retain_pilots(&mut self, keep: impl Fn(&str) -> bool) {
    for heat in &mut self.heats {
      heat.retain(|id| keep(id));
    }
  }

  /// Locks the proposal into pending qualification heats numbered from `first_number`.
  pub fn into_heats(self, first_number: u32) -> Vec<Heat> {
    self
      .heats
      .into_iter()
      .enumerate()
      .map(|(offset, pilot_ids)| {
        Heat::new(first_number + offset as u32, BracketType::Qualification, 1, pilot_ids, false)
      })
      .collect()
  }
}
