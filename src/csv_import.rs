use serde::Serialize;
use std::collections::HashSet;

use crate::errors::{TournamentError, TournamentResult};
use crate::roster::{normalize_instagram, normalize_name, validate_fields, PilotRoster};
use crate::types::{Pilot, PilotInput};

const NAME_HEADERS: &[&str] = &["name"];
const IMAGE_HEADERS: &[&str] = &["bild-url", "imageurl", "image_url"];
const INSTAGRAM_HEADERS: &[&str] = &["instagram"];

/// A problem with one CSV row. `row` is the line number, header = 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvRowError {
    pub row: usize,
    pub field: String,
    pub message: String,
}

/// A row that passed validation, with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvPilotRow {
    pub row: usize,
    #[serde(flatten)]
    pub input: PilotInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportReport {
    pub pilots: Vec<CsvPilotRow>,
    pub errors: Vec<CsvRowError>,
    /// Names that were skipped because the file or the roster already has them.
    pub duplicates: Vec<String>,
}

/// Result of adding a parsed file to the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotImport {
    pub added: Vec<Pilot>,
    pub errors: Vec<CsvRowError>,
    pub duplicates: Vec<String>,
}

struct Columns {
    name: usize,
    image_url: Option<usize>,
    instagram: Option<usize>,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim_start_matches('\u{feff}').trim().to_lowercase();
        aliases.contains(&header.as_str())
    })
}

/// Semicolon-separated exports are common from spreadsheet tools with a
/// comma decimal separator.
fn sniff_delimiter(data: &str) -> u8 {
    let first_line = data.lines().next().unwrap_or("");
    if first_line.contains(';') && !first_line.contains(',') {
        b';'
    } else {
        b','
    }
}

/// Parses a pilot list. Rows with problems are reported and skipped; only a
/// file without a name column fails as a whole.
pub fn parse_pilots_csv(data: &str, roster: &PilotRoster) -> TournamentResult<CsvImportReport> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(data))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| TournamentError::validation("csv", err.to_string()))?
        .clone();
    let columns = Columns {
        name: find_column(&headers, NAME_HEADERS)
            .ok_or_else(|| TournamentError::validation("csv", "missing a Name column"))?,
        image_url: find_column(&headers, IMAGE_HEADERS),
        instagram: find_column(&headers, INSTAGRAM_HEADERS),
    };

    let mut report = CsvImportReport::default();
    let mut seen: HashSet<String> = roster
        .all()
        .iter()
        .map(|pilot| normalize_name(&pilot.name))
        .collect();

    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                report.errors.push(CsvRowError {
                    row: err.position().map_or(index + 2, |pos| pos.line() as usize),
                    field: "row".to_string(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = record.position().map_or(index + 2, |pos| pos.line() as usize);

        let cell = |column: Option<usize>| {
            column
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string()
        };
        let input = PilotInput {
            name: cell(Some(columns.name)),
            image_url: cell(columns.image_url),
            instagram_handle: normalize_instagram(&cell(columns.instagram)),
        };

        let field_errors = validate_fields(&input);
        if !field_errors.is_empty() {
            report.errors.extend(field_errors.into_iter().map(|error| CsvRowError {
                row,
                field: error.field,
                message: error.message,
            }));
            continue;
        }
        if !seen.insert(normalize_name(&input.name)) {
            report.duplicates.push(input.name.trim().to_string());
            continue;
        }
        report.pilots.push(CsvPilotRow { row, input });
    }
    Ok(report)
}
