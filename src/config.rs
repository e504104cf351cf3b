use crate::types::*;
use std::{
    collections::HashMap,
    env,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

// ── Environment ───────────────────────────────────────────────────────

/// Settings from the process environment layered over the repo `.env`.
/// The process always wins; the file never touches the process env.
#[derive(Debug, Clone, Default)]
pub struct EnvLayer {
  file: HashMap<String, String>,
}

impl EnvLayer {
  pub fn load() -> Self {
    Self::from_file(&repo_root().join(".env"))
  }

  pub fn from_file(path: &Path) -> Self {
    match fs::read_to_string(path) {
      Ok(contents) => Self::parse(&contents),
      Err(_) => Self::default(),
    }
  }

  pub fn parse(contents: &str) -> Self {
    EnvLayer {
      file: contents.lines().filter_map(env_pair).collect(),
    }
  }

  /// Trimmed, non-empty value for `key`.
  pub fn get(&self, key: &str) -> Option<String> {
    env::var(key)
      .ok()
      .or_else(|| self.file.get(key).cloned())
      .map(|value| value.trim().to_string())
      .filter(|value| !value.is_empty())
  }

  fn number<T: FromStr>(&self, key: &str) -> Option<T> {
    let raw = self.get(key)?;
    match raw.parse::<T>() {
      Ok(value) => Some(value),
      Err(_) => {
        tracing::warn!("{key}={raw} is not a number, ignored");
        None
      }
    }
  }
}

/// One `KEY=value` line. Quoted values are taken verbatim; unquoted ones end
/// at a ` #` comment.
fn env_pair(line: &str) -> Option<(String, String)> {
  let line = line.trim();
  if line.is_empty() || line.starts_with('#') {
    return None;
  }
  let line = line.strip_prefix("export ").unwrap_or(line);
  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() || key.contains(char::is_whitespace) {
    return None;
  }
  let value = value.trim();
  let value = ['"', '\'']
    .iter()
    .find_map(|quote| value.strip_prefix(*quote)?.strip_suffix(*quote))
    .unwrap_or_else(|| value.split(" #").next().unwrap_or(value).trim_end());
  Some((key.to_string(), value.to_string()))
}

pub fn config_path(env: &EnvLayer) -> PathBuf {
  match env.get("HEATS_CONFIG_PATH") {
    Some(raw) => resolve_repo_path(&raw),
    None => repo_root().join("config.json"),
  }
}

pub fn apply_env_defaults(mut config: AppConfig, env: &EnvLayer) -> AppConfig {
  for (key, slot) in [
    ("HEATS_BIND_ADDR", &mut config.bind_addr),
    ("HEATS_STATE_PATH", &mut config.state_path),
    ("HEATS_STATIC_DIR", &mut config.static_dir),
    ("HEATS_LOG_DIR", &mut config.log_dir),
  ] {
    if let Some(value) = env.get(key) {
      *slot = value;
    }
  }
  if let Some(seed) = env.number("HEATS_SHUFFLE_SEED") {
    config.shuffle_seed = Some(seed);
  }
  if let Some(value) = env.number("HEATS_MIN_PILOTS") {
    config.min_pilots = value;
  }
  if let Some(value) = env.number("HEATS_MAX_PILOTS") {
    config.max_pilots = value;
  }
  config
}

pub fn load_config_inner(env: &EnvLayer) -> Result<AppConfig, String> {
  let path = config_path(env);
  if !path.is_file() {
    return Ok(apply_env_defaults(AppConfig::default(), env));
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config, env))
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

pub fn state_path(config: &AppConfig) -> Option<PathBuf> {
  let trimmed = config.state_path.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(resolve_repo_path(trimmed))
}

pub fn static_dir(config: &AppConfig) -> Option<PathBuf> {
  let trimmed = config.static_dir.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(resolve_repo_path(trimmed))
}

pub fn log_dir(config: &AppConfig) -> PathBuf {
  let trimmed = config.log_dir.trim();
  if trimmed.is_empty() {
    return repo_root().join("logs");
  }
  resolve_repo_path(trimmed)
}

/// Roster limits from config, clamped into what the heat planner can split.
pub fn rules_from_config(config: &AppConfig) -> TournamentRules {
  let min_pilots = config.min_pilots.clamp(PLANNER_MIN_PILOTS, PLANNER_MAX_PILOTS);
  let max_pilots = config.max_pilots.clamp(min_pilots, PLANNER_MAX_PILOTS);
  TournamentRules {
    min_pilots,
    max_pilots,
  }
}

pub fn log_env_warnings(config: &AppConfig) {
  let mut warnings = Vec::new();

  let rules = rules_from_config(config);
  if rules.min_pilots != config.min_pilots || rules.max_pilots != config.max_pilots {
    warnings.push(format!(
      "pilot limits {}-{} adjusted to {}-{}",
      config.min_pilots, config.max_pilots, rules.min_pilots, rules.max_pilots
    ));
  }
  if config.state_path.trim().is_empty() {
    warnings.push("HEATS_STATE_PATH empty and no statePath in config; state is kept in memory only".to_string());
  }
  if let Some(dir) = static_dir(config) {
    if !dir.is_dir() {
      warnings.push(format!("static dir {} not found; only the API is served", dir.display()));
    }
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn env_file_values() {
    let env = EnvLayer::parse(
      "# heats\n\
       export HEATS_LOG_DIR=\"/var/log/heats # not a comment\"\n\
       HEATS_MIN_PILOTS=8 # smallest event\n\
       HEATS_QUOTED='a=b'\n\
       =value\n\
       BAD KEY=1\n",
    );
    assert_eq!(env.file["HEATS_LOG_DIR"], "/var/log/heats # not a comment");
    assert_eq!(env.file["HEATS_MIN_PILOTS"], "8");
    assert_eq!(env.file["HEATS_QUOTED"], "a=b");
    assert_eq!(env.file.len(), 3);
  }

  #[test]
  fn env_file_feeds_config_overrides() {
    let env = EnvLayer::parse(
      "HEATS_MIN_PILOTS=9\nHEATS_SHUFFLE_SEED=seven\n",
    );
    let config = apply_env_defaults(AppConfig::default(), &env);
    if env::var_os("HEATS_MIN_PILOTS").is_none() {
      assert_eq!(config.min_pilots, 9);
    }
    if env::var_os("HEATS_SHUFFLE_SEED").is_none() {
      assert_eq!(config.shuffle_seed, None);
    }
  }

  #[test]
  fn missing_env_file_is_empty() {
    let env = EnvLayer::from_file(Path::new("/nonexistent/heats/.env"));
    assert!(env.file.is_empty());
  }

  #[test]
  fn limits_are_clamped_to_the_planner_range() {
    let config = AppConfig {
      min_pilots: 2,
      max_pilots: 100,
      ..AppConfig::default()
    };
    assert_eq!(
      rules_from_config(&config),
      TournamentRules {
        min_pilots: 7,
        max_pilots: 60
      }
    );
    let config = AppConfig {
      min_pilots: 20,
      max_pilots: 10,
      ..AppConfig::default()
    };
    let rules = rules_from_config(&config);
    assert_eq!((rules.min_pilots, rules.max_pilots), (20, 20));
  }

  #[test]
  fn config_defaults_fill_missing_fields() {
    let config: AppConfig = serde_json::from_str(r#"{"bindAddr": "0.0.0.0:9000"}"#).unwrap();
    assert_eq!(config.bind_addr, "0.0.0.0:9000");
    assert_eq!(config.state_path, "data/tournament.json");
    assert_eq!(config.max_pilots, 60);
    assert!(state_path(&config).unwrap().ends_with("data/tournament.json"));
    assert!(static_dir(&config).is_none());
  }
}
