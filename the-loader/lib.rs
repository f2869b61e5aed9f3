pub mod config;
pub mod database;

use std::path::{
  Path,
  PathBuf,
};

use anyhow::{
  Context,
  Result,
};
use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use the_abbrev::table::CandidateTable;

pub use crate::{
  config::Config,
  database::Database,
};

/// Name of the per-workspace directory holding a `config.toml`.
pub const WORKSPACE_DIR: &str = ".the-abbrev";

/// Directory holding the user `config.toml`.
///
/// `THE_ABBREV_CONFIG_DIR` takes precedence over the platform default.
pub fn config_dir() -> Result<PathBuf> {
  if let Some(dir) = std::env::var_os("THE_ABBREV_CONFIG_DIR") {
    return Ok(PathBuf::from(dir));
  }
  let strategy = choose_base_strategy().context("unable to find the config directory")?;
  let mut path = strategy.config_dir();
  path.push("the-abbrev");
  Ok(path)
}

pub fn config_file() -> Result<PathBuf> {
  Ok(config_dir()?.join("config.toml"))
}

pub fn workspace_config_file() -> PathBuf {
  find_workspace().0.join(WORKSPACE_DIR).join("config.toml")
}

/// Loads the merged configuration and builds the table it describes.
pub fn load() -> Result<(Config, CandidateTable)> {
  let config = config::user_config()?;
  let table = build_table(&config)?;
  Ok((config, table))
}

/// Builds a candidate table from the configured database, with the
/// `[abbreviations]` overrides replacing base entries key by key.
pub fn build_table(config: &Config) -> Result<CandidateTable> {
  let leader = config.leader()?;
  let base = match &config.database {
    Some(path) => Database::load(path, leader)?,
    None => Database::builtin(leader)?,
  };
  let overrides = database::normalize_overrides(&config.abbreviations, leader);
  let table = CandidateTable::new(base.into_entries(), overrides);
  tracing::debug!(entries = table.len(), "built candidate table");
  Ok(table)
}

/// Merge two TOML documents, merging values from `right` onto `left`
///
/// `merge_depth` sets the nesting depth up to which tables are merged instead
/// of overridden. Arrays are always taken from `right`.
///
/// With `merge_depth = 2` a user file only naming `[abbreviations] to = "⇒"`
/// keeps every other key of the built-in config and every other override,
/// but replaces the `to` entry whole.
pub fn merge_toml_values(left: toml::Value, right: toml::Value, merge_depth: usize) -> toml::Value {
  use toml::Value;

  match (left, right) {
    (Value::Table(mut left_map), Value::Table(right_map)) => {
      if merge_depth > 0 {
        for (rname, rvalue) in right_map {
          match left_map.remove(&rname) {
            Some(lvalue) => {
              let merged_value = merge_toml_values(lvalue, rvalue, merge_depth - 1);
              left_map.insert(rname, merged_value);
            },
            None => {
              left_map.insert(rname, rvalue);
            },
          }
        }
        Value::Table(left_map)
      } else {
        Value::Table(right_map)
      }
    },
    // Catch everything else we didn't handle, and use the right value
    (_, value) => value,
  }
}

/// Finds the current workspace folder.
///
/// Searches upward from the CWD and returns the first directory containing
/// `.git`, `.svn`, `.jj` or `.the-abbrev`. If no workspace was found returns
/// (CWD, true). Otherwise (workspace, false) is returned.
pub fn find_workspace() -> (PathBuf, bool) {
  match std::env::current_dir() {
    Ok(current_dir) => find_workspace_in(current_dir),
    Err(_) => (PathBuf::new(), true),
  }
}

pub fn find_workspace_in(dir: impl AsRef<Path>) -> (PathBuf, bool) {
  let dir = dir.as_ref();
  for ancestor in dir.ancestors() {
    if ancestor.join(".git").exists()
      || ancestor.join(".svn").exists()
      || ancestor.join(".jj").exists()
      || ancestor.join(WORKSPACE_DIR).exists()
    {
      return (ancestor.to_owned(), false);
    }
  }

  (dir.to_owned(), true)
}

#[cfg(test)]
mod test {
  use std::fs;

  use toml::Value;

  use super::*;

  #[test]
  fn test_merge_replaces_abbreviation_whole() {
    let base: Value = toml::from_str(
      r#"
        leader = "\\"
        [abbreviations]
        to = ["→", "⇒"]
        ne = "≠"
        "#,
    )
    .unwrap();
    let user: Value = toml::from_str(
      r#"
        [abbreviations]
        to = ["↦"]
        "#,
    )
    .unwrap();

    let merged = merge_toml_values(base, user, 2);
    assert_eq!(merged.get("leader").unwrap().as_str(), Some("\\"));
    let abbreviations = merged.get("abbreviations").unwrap();
    assert_eq!(
      abbreviations.get("to").unwrap().as_array().unwrap(),
      &vec![Value::String("↦".into())]
    );
    assert_eq!(abbreviations.get("ne").unwrap().as_str(), Some("≠"));
  }

  #[test]
  fn test_merge_depth_zero_overrides() {
    let left: Value = toml::from_str("a = 1\nb = 2").unwrap();
    let right: Value = toml::from_str("b = 3").unwrap();
    let merged = merge_toml_values(left, right.clone(), 0);
    assert_eq!(merged, right);
  }

  #[test]
  fn test_find_workspace_in() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    fs::create_dir(dir.path().join("a").join(WORKSPACE_DIR)).unwrap();

    let (root, fallback) = find_workspace_in(&nested);
    assert!(!fallback);
    assert_eq!(root, dir.path().join("a"));
  }

  #[test]
  fn test_build_table_with_overrides() {
    let config = Config::from_toml_str(
      r#"
        [abbreviations]
        to = "↦"
        "\\mine" = ["★", "☆"]
        "#,
    )
    .unwrap();
    let table = build_table(&config).unwrap();
    assert_eq!(table.symbols_for("to").unwrap(), ["↦"]);
    assert_eq!(table.symbols_for("mine").unwrap(), ["★", "☆"]);
    assert_eq!(table.symbols_for("alpha").unwrap(), ["α"]);
  }

  #[test]
  fn test_build_table_from_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abbreviations.json");
    fs::write(&path, r#"{ "\\x": "×", "y": ["ψ", "y"] }"#).unwrap();

    let config = Config {
      database: Some(path),
      ..Config::default()
    };
    let table = build_table(&config).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.symbols_for("x").unwrap(), ["×"]);
    assert_eq!(table.symbols_for("y").unwrap(), ["ψ"]);
    assert!(table.symbols_for("alpha").is_none());
  }

  #[test]
  fn test_build_table_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
      database: Some(dir.path().join("missing.json")),
      ..Config::default()
    };
    let err = build_table(&config).unwrap_err();
    assert!(format!("{err:#}").contains("missing.json"));
  }
}
