use std::{
  collections::BTreeMap,
  path::{
    Path,
    PathBuf,
  },
};

use anyhow::{
  Context,
  Result,
  bail,
};
use serde::Deserialize;

use crate::database::SymbolList;

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
  /// Character that starts an abbreviation.
  pub leader:        String,
  /// JSON database replacing the built-in one.
  pub database:      Option<PathBuf>,
  /// Per-key replacements applied on top of the database.
  pub abbreviations: BTreeMap<String, SymbolList>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      leader:        "\\".into(),
      database:      None,
      abbreviations: BTreeMap::new(),
    }
  }
}

impl Config {
  pub fn from_toml_str(config: &str) -> Result<Self> {
    let value: toml::Value = toml::from_str(config).context("failed to parse config")?;
    Self::from_value(value)
  }

  pub fn from_value(value: toml::Value) -> Result<Self> {
    let config: Self = value.try_into().context("invalid config")?;
    config.leader()?;
    Ok(config)
  }

  /// The leader as a single `char`.
  pub fn leader(&self) -> Result<char> {
    let mut chars = self.leader.chars();
    match (chars.next(), chars.next()) {
      (Some(leader), None) => Ok(leader),
      _ => bail!("leader must be a single character, got {:?}", self.leader),
    }
  }
}

/// Default built-in config.toml.
pub fn default_config() -> Result<toml::Value> {
  let config_str = include_str!("config.toml");
  toml::from_str(config_str).context("failed to parse built-in config.toml")
}

/// User config merged over the built-in one, followed by the workspace config.
pub fn user_config() -> Result<Config> {
  let files = [crate::config_file()?, crate::workspace_config_file()];
  load_config(&files)
}

/// Merges the built-in config with every existing file in `files`, later
/// files taking precedence.
pub fn load_config(files: &[PathBuf]) -> Result<Config> {
  let default = default_config()?;
  let merged = files
    .iter()
    .filter_map(|file| read_toml(file).transpose())
    .collect::<Result<Vec<_>>>()?
    .into_iter()
    .fold(default, |a, b| crate::merge_toml_values(a, b, 2));
  Config::from_value(merged)
}

fn read_toml(file: &Path) -> Result<Option<toml::Value>> {
  let config = match std::fs::read_to_string(file) {
    Ok(config) => config,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(err) => return Err(err).with_context(|| format!("failed to read {}", file.display())),
  };
  tracing::debug!(file = %file.display(), "loading config");
  toml::from_str(&config)
    .map(Some)
    .with_context(|| format!("failed to parse {}", file.display()))
}
