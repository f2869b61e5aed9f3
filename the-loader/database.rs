//! JSON abbreviation database.
//!
//! The file is a single object mapping each abbreviation to one symbol or a
//! list of them, first entry being the default:
//!
//! ```json
//! { "to": "→", "r": ["→", "ρ"], "\\ne": "≠" }
//! ```

use std::{
  collections::BTreeMap,
  path::Path,
};

use anyhow::{
  Context,
  Result,
};
use serde::Deserialize;

/// One symbol or an ordered list of symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawSymbols")]
pub struct SymbolList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSymbols {
  One(String),
  Many(Vec<String>),
}

impl From<RawSymbols> for SymbolList {
  fn from(raw: RawSymbols) -> Self {
    match raw {
      RawSymbols::One(symbol) => Self(vec![symbol]),
      RawSymbols::Many(symbols) => Self(symbols),
    }
  }
}

impl SymbolList {
  pub fn as_slice(&self) -> &[String] {
    &self.0
  }
}

/// Normalized database entries, keyed by abbreviation without its leader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
  entries: BTreeMap<String, Vec<String>>,
}

impl Database {
  /// The database shipped with the crate.
  pub fn builtin(leader: char) -> Result<Self> {
    Self::from_json_str(include_str!("abbreviations.json"), leader)
      .context("failed to parse built-in abbreviations.json")
  }

  pub fn load(path: &Path, leader: char) -> Result<Self> {
    let json = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read database {}", path.display()))?;
    Self::from_json_str(&json, leader)
      .with_context(|| format!("failed to parse database {}", path.display()))
  }

  pub fn from_json_str(json: &str, leader: char) -> Result<Self> {
    let raw: BTreeMap<String, SymbolList> = serde_json::from_str(json)?;
    let mut entries = BTreeMap::new();
    for (key, symbols) in raw {
      let Some(key) = normalize_key(&key, leader) else {
        tracing::warn!(key = %key, "dropping blank abbreviation");
        continue;
      };
      let symbols: Vec<String> = symbols
        .0
        .into_iter()
        .filter(|symbol| !is_printable_ascii_char(symbol))
        .collect();
      if symbols.is_empty() {
        tracing::trace!(key, "dropping abbreviation with only ASCII translations");
        continue;
      }
      entries.insert(key.to_owned(), symbols);
    }
    Ok(Self { entries })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, abbreviation: &str) -> Option<&[String]> {
    self.entries.get(abbreviation).map(Vec::as_slice)
  }

  pub fn into_entries(self) -> BTreeMap<String, Vec<String>> {
    self.entries
  }
}

/// Config overrides keep ASCII translations, a user asking for one means it.
pub fn normalize_overrides(
  overrides: &BTreeMap<String, SymbolList>,
  leader: char,
) -> Vec<(String, Vec<String>)> {
  overrides
    .iter()
    .filter_map(|(key, symbols)| {
      let key = normalize_key(key, leader)?;
      Some((key.to_owned(), symbols.0.clone()))
    })
    .collect()
}

fn normalize_key(key: &str, leader: char) -> Option<&str> {
  let key = key
    .strip_prefix(leader)
    .or_else(|| key.strip_prefix('\\'))
    .unwrap_or(key);
  (!key.trim().is_empty()).then_some(key)
}

/// A lone printable ASCII character is never worth abbreviating.
fn is_printable_ascii_char(symbol: &str) -> bool {
  let mut chars = symbol.chars();
  matches!(
    (chars.next(), chars.next()),
    (Some(ch), None) if ch.is_ascii_graphic() || ch == ' '
  )
}
