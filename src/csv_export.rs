use serde::Serialize;

use crate::placement::{elimination_round, rank_groups, top4};
use crate::state::TournamentState;
use crate::types::BracketType;

pub const CSV_HEADER: [&str; 8] = [
  "Pilot",
  "Status",
  "Platzierung",
  "Ranggruppe",
  "Bracket",
  "Heats Geflogen",
  "Ergebnisse",
  "Nächster Heat",
];

/// One line of the standings export, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
  pub pilot: String,
  pub status: String,
  pub placement: String,
  pub rank_group: String,
  pub bracket: String,
  pub heats_flown: usize,
  pub results: String,
  pub next_heat: String,
}

impl ExportRow {
  fn fields(&self) -> [String; 8] {
    [
      self.pilot.clone(),
      self.status.clone(),
      self.placement.clone(),
      self.rank_group.clone(),
      self.bracket.clone(),
      self.heats_flown.to_string(),
      self.results.clone(),
      self.next_heat.clone(),
    ]
  }
}

fn place_text(place: u32) -> String {
  let suffix = match place {
    1 => "st",
    2 => "nd",
    3 => "rd",
    _ => "th",
  };
  format!("{place}{suffix} Place")
}

/// Rows for every registered pilot, in roster order.
pub fn export_rows(state: &TournamentState) -> Vec<ExportRow> {
  let placements = top4(state).unwrap_or_default();
  let groups = rank_groups(state);

  state
    .roster
    .all()
    .iter()
    .map(|pilot| {
      let flown = state.flown_heats(&pilot.id);
      let results = flown
        .iter()
        .filter_map(|heat| {
          let rank = heat.results.as_ref()?.rank_of(&pilot.id)?;
          Some(format!("{}: {rank}.", heat.label()))
        })
        .collect::<Vec<_>>()
        .join(" ");
      let bracket = state
        .heats
        .iter()
        .filter(|heat| heat.contains(&pilot.id))
        .max_by_key(|heat| heat.heat_number)
        .map(|heat| heat.bracket_type.label().to_string())
        .unwrap_or_default();
      let next_heat = state
        .next_heat_for(&pilot.id)
        .map(|heat| format!("H{}", heat.heat_number))
        .unwrap_or_default();

      let placement = placements.iter().find(|p| p.pilot_id == pilot.id);
      let (status, place, rank_group) = if let Some(placement) = placement {
        (
          place_text(placement.place),
          placement.place.to_string(),
          placement.place.to_string(),
        )
      } else if state.eliminated.contains(&pilot.id) {
        let status = match elimination_round(state, &pilot.id) {
          Some(round) => format!("Eliminated ({}-R{round})", BracketType::Loser.label()),
          None => "Dropped out".to_string(),
        };
        let group = groups.get(&pilot.id).map(ToString::to_string).unwrap_or_default();
        (status, String::new(), group)
      } else if pilot.dropped_out {
        ("Dropped out".to_string(), String::new(), String::new())
      } else {
        ("Active".to_string(), String::new(), String::new())
      };

      ExportRow {
        pilot: pilot.name.clone(),
        status,
        placement: place,
        rank_group,
        bracket,
        heats_flown: flown.len(),
        results,
        next_heat,
      }
    })
    .collect()
}

pub fn export_csv(state: &TournamentState) -> Result<String, String> {
  let mut writer = csv::Writer::from_writer(Vec::new());
  writer.write_record(CSV_HEADER).map_err(|e| e.to_string())?;
  for row in export_rows(state) {
    writer.write_record(row.fields()).map_err(|e| e.to_string())?;
  }
  let bytes = writer.into_inner().map_err(|e| e.to_string())?;
  String::from_utf8(bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bracket::Tournament;
  use crate::types::{PilotInput, Ranking, TournamentRules};

  fn fly_in_order(t: &mut Tournament, heat_id: &str) {
    let heat = t.state().heat(heat_id).unwrap().clone();
    let rankings = t
      .state()
      .rankable_pilots(&heat)
      .into_iter()
      .enumerate()
      .map(|(i, id)| Ranking::new(id, i as u32 + 1))
      .collect();
    t.submit_heat_results(heat_id, rankings).unwrap();
  }

  fn completed_tournament() -> Tournament {
    let mut t = Tournament::with_seed(TournamentRules::default(), 3);
    for i in 0..8 {
      t.add_pilot(PilotInput {
        name: format!("Racer {i}"),
        image_url: format!("https://img.example/{i}.png"),
        instagram_handle: None,
      })
      .unwrap();
    }
    t.start_heat_assignment().unwrap();
    t.confirm_heat_assignment().unwrap();
    while let Some(heat_id) = t.next_recommended_heat().map(|heat| heat.id.clone()) {
      fly_in_order(&mut t, &heat_id);
    }
    t
  }

  #[test]
  fn header_is_fixed() {
    let csv = export_csv(&crate::state::TournamentState::new()).unwrap();
    assert_eq!(
      csv.trim_end(),
      "Pilot,Status,Platzierung,Ranggruppe,Bracket,Heats Geflogen,Ergebnisse,Nächster Heat"
    );
  }

  #[test]
  fn completed_tournament_rows() {
    let t = completed_tournament();
    let rows = export_rows(t.state());
    assert_eq!(rows.len(), 8);

    let winner = rows.iter().find(|row| row.status == "1st Place").unwrap();
    assert_eq!(winner.placement, "1");
    assert_eq!(winner.rank_group, "1");
    assert_eq!(winner.bracket, "GF");
    assert!(winner.results.ends_with("GF-R1-H6: 1."));
    assert!(winner.next_heat.is_empty());

    let early: Vec<&ExportRow> = rows
      .iter()
      .filter(|row| row.status == "Eliminated (LB-R1)")
      .collect();
    assert_eq!(early.len(), 2);
    assert!(early.iter().all(|row| row.rank_group == "7-8" && row.placement.is_empty()));
    assert!(early.iter().all(|row| row.heats_flown == 2));
    assert!(rows.iter().any(|row| row.status == "4th Place"));
  }

  #[test]
  fn running_rows_show_next_heat() {
    let mut t = Tournament::with_seed(TournamentRules::default(), 3);
    for i in 0..7 {
      t.add_pilot(PilotInput {
        name: format!("Racer {i}"),
        image_url: format!("https://img.example/{i}.png"),
        instagram_handle: None,
      })
      .unwrap();
    }
    t.start_heat_assignment().unwrap();
    t.confirm_heat_assignment().unwrap();
    let rows = export_rows(t.state());
    assert!(rows.iter().all(|row| row.status == "Active"));
    assert!(rows.iter().all(|row| row.bracket == "Quali"));
    assert!(rows
      .iter()
      .all(|row| row.next_heat == "H1" || row.next_heat == "H2"));
    assert!(rows.iter().all(|row| row.results.is_empty()));
  }
}
