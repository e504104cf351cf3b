use unicode_normalization::UnicodeNormalization;

use crate::errors::{FieldError, Precondition, TournamentError, TournamentResult};
use crate::types::{Pilot, PilotInput, MIN_PILOT_NAME_LEN};

/// PilotRoster owns every registered pilot:
/// - ids are stable (`pilot-<seq>`) and never reused
/// - names are unique after trimming, NFC normalization and case folding
/// - capacity is enforced by the caller-supplied maximum
#[derive(Debug, Clone, Default)]
pub struct PilotRoster {
    pilots: Vec<Pilot>,
    next_seq: u64,
}

impl PilotRoster {
    pub fn new() -> Self {
        PilotRoster::default()
    }

    /// Rebuild a roster from stored pilots. The id sequence resumes after the
    /// highest `pilot-<n>` id seen so new ids never collide.
    pub fn from_parts(pilots: Vec<Pilot>, next_seq: u64) -> Self {
        let highest = pilots
            .iter()
            .filter_map(|pilot| pilot.id.strip_prefix("pilot-"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .map(|seq| seq + 1)
            .unwrap_or(0);
        PilotRoster {
            pilots,
            next_seq: next_seq.max(highest),
        }
    }

    pub fn len(&self) -> usize {
        self.pilots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty()
    }

    pub fn all(&self) -> &[Pilot] {
        &self.pilots
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn get(&self, pilot_id: &str) -> Option<&Pilot> {
        self.pilots.iter().find(|pilot| pilot.id == pilot_id)
    }

    pub fn contains(&self, pilot_id: &str) -> bool {
        self.get(pilot_id).is_some()
    }

    pub fn is_dropped_out(&self, pilot_id: &str) -> bool {
        self.get(pilot_id).map(|pilot| pilot.dropped_out).unwrap_or(false)
    }

    /// Pilot with the same normalized name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<&Pilot> {
        let key = normalize_name(name);
        self.pilots.iter().find(|pilot| normalize_name(&pilot.name) == key)
    }

    /// Ids of pilots that have not dropped out, in registration order.
    pub fn active_ids(&self) -> Vec<String> {
        self.pilots
            .iter()
            .filter(|pilot| !pilot.dropped_out)
            .map(|pilot| pilot.id.clone())
            .collect()
    }

    pub fn add(&mut self, input: PilotInput, max_pilots: usize) -> TournamentResult<Pilot> {
        if self.pilots.len() >= max_pilots {
            return Err(Precondition::RosterFull(max_pilots).into());
        }
        let errors = self.validate(&input, None);
        if !errors.is_empty() {
            return Err(TournamentError::Validation(errors));
        }
        let pilot = Pilot {
            id: self.allocate_id(),
            name: input.name.trim().to_string(),
            image_url: input.image_url.trim().to_string(),
            instagram_handle: input.instagram_handle.as_deref().and_then(normalize_instagram),
            dropped_out: false,
        };
        self.pilots.push(pilot.clone());
        Ok(pilot)
    }

    pub fn update(&mut self, pilot_id: &str, input: PilotInput) -> TournamentResult<Pilot> {
        if !self.contains(pilot_id) {
            return Err(Precondition::UnknownPilot(pilot_id.to_string()).into());
        }
        let errors = self.validate(&input, Some(pilot_id));
        if !errors.is_empty() {
            return Err(TournamentError::Validation(errors));
        }
        let pilot = self
            .pilots
            .iter_mut()
            .find(|pilot| pilot.id == pilot_id)
            .ok_or_else(|| Precondition::UnknownPilot(pilot_id.to_string()))?;
        pilot.name = input.name.trim().to_string();
        pilot.image_url = input.image_url.trim().to_string();
        pilot.instagram_handle = input.instagram_handle.as_deref().and_then(normalize_instagram);
        Ok(pilot.clone())
    }

    pub fn remove(&mut self, pilot_id: &str) -> TournamentResult<Pilot> {
        let index = self
            .pilots
            .iter()
            .position(|pilot| pilot.id == pilot_id)
            .ok_or_else(|| Precondition::UnknownPilot(pilot_id.to_string()))?;
        Ok(self.pilots.remove(index))
    }

    /// Sets the terminal drop-out flag. `Ok(false)` when it was already set.
    pub fn mark_dropped_out(&mut self, pilot_id: &str) -> TournamentResult<bool> {
        let pilot = self
            .pilots
            .iter_mut()
            .find(|pilot| pilot.id == pilot_id)
            .ok_or_else(|| Precondition::UnknownPilot(pilot_id.to_string()))?;
        if pilot.dropped_out {
            return Ok(false);
        }
        pilot.dropped_out = true;
        Ok(true)
    }

    /// Removes every pilot. Ids keep counting up.
    pub fn clear(&mut self) {
        self.pilots.clear();
    }

    /// Field-level problems with `input`. `exclude_id` skips the pilot being edited
    /// in the uniqueness check.
    pub fn validate(&self, input: &PilotInput, exclude_id: Option<&str>) -> Vec<FieldError> {
        let mut errors = validate_fields(input);
        let name = input.name.trim();
        if !name.is_empty() {
            let taken = self
                .find_by_name(name)
                .is_some_and(|pilot| Some(pilot.id.as_str()) != exclude_id);
            if taken {
                errors.push(FieldError::new(
                    "name",
                    format!("a pilot named \"{name}\" already exists"),
                ));
            }
        }
        errors
    }

    fn allocate_id(&mut self) -> String {
        loop {
            let candidate = format!("pilot-{}", self.next_seq);
            self.next_seq += 1;
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }
}

/// Checks that do not depend on other pilots.
pub fn validate_fields(input: &PilotInput) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let name = input.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    } else if name.chars().count() < MIN_PILOT_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("must be at least {MIN_PILOT_NAME_LEN} characters"),
        ));
    }
    let image_url = input.image_url.trim();
    if image_url.is_empty() {
        errors.push(FieldError::new("imageUrl", "is required"));
    } else if !is_valid_url(image_url) {
        errors.push(FieldError::new("imageUrl", "is not a valid URL"));
    }
    errors
}

/// Comparison key for pilot names.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().nfc().collect::<String>().to_lowercase()
}

/// `"pilot"`, `"@pilot"` and `"@@pilot"` all become `"@pilot"`. Blank input is `None`.
pub fn normalize_instagram(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@').trim();
    if handle.is_empty() {
        return None;
    }
    Some(format!("@{handle}"))
}

/// Basic well-formedness: http(s) scheme, a host, no whitespace.
pub fn is_valid_url(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return false;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    !host.is_empty() && !host.starts_with('.') && !host.ends_with('.')
}
