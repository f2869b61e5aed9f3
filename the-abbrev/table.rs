//! Mnemonic to symbol lookup.
//!
//! A [`CandidateTable`] maps each abbreviation to an ordered, non-empty list
//! of symbols. The first symbol is the default, the rest are alternates that
//! can be reached by cycling.
//!
//! ```ignore
//! use the_abbrev::table::CandidateTable;
//!
//! let table = CandidateTable::new(
//!   [("to", vec!["→"]), ("top", vec!["⊤"])],
//!   [],
//! );
//!
//! assert!(table.has_prefix("t"));
//! assert_eq!(table.symbols_for("to").unwrap()[0], "→");
//! ```
//!
//! The table also remembers, per abbreviation, which alternate was last
//! committed so the next span typed for the same mnemonic starts there. That
//! memory lives as long as the table does.

use std::{
  collections::{
    BTreeMap,
    HashMap,
  },
  ops::Bound,
};

use smallvec::SmallVec;

use crate::Tendril;

/// Whether a symbol is the first choice of an abbreviation or an alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
  Default,
  Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationRef {
  pub abbreviation: Tendril,
  pub rank:         Rank,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
  symbols:       BTreeMap<Tendril, Vec<Tendril>>,
  reverse:       HashMap<Tendril, SmallVec<[AbbreviationRef; 2]>>,
  last_selected: HashMap<Tendril, usize>,
}

impl CandidateTable {
  /// Builds a table from `base`, with every key present in `overrides`
  /// replacing the base entry entirely.
  pub fn new<K, S, V>(
    base: impl IntoIterator<Item = (K, V)>,
    overrides: impl IntoIterator<Item = (K, V)>,
  ) -> Self
  where
    K: Into<Tendril>,
    S: Into<Tendril>,
    V: IntoIterator<Item = S>,
  {
    let mut symbols = BTreeMap::new();
    for (abbreviation, list) in base.into_iter().chain(overrides) {
      let abbreviation = abbreviation.into();
      let list: Vec<Tendril> = list.into_iter().map(Into::into).collect();
      if list.is_empty() {
        tracing::warn!(%abbreviation, "dropping abbreviation without symbols");
        symbols.remove(&abbreviation);
        continue;
      }
      symbols.insert(abbreviation, list);
    }

    let mut reverse: HashMap<Tendril, SmallVec<[AbbreviationRef; 2]>> = HashMap::new();
    for (abbreviation, list) in &symbols {
      for (i, symbol) in list.iter().enumerate() {
        let rank = if i == 0 { Rank::Default } else { Rank::Alternate };
        let refs = reverse.entry(symbol.clone()).or_default();
        if !refs.iter().any(|r| r.abbreviation == *abbreviation) {
          refs.push(AbbreviationRef {
            abbreviation: abbreviation.clone(),
            rank,
          });
        }
      }
    }
    for refs in reverse.values_mut() {
      refs.sort_by(|a, b| {
        a.rank
          .cmp(&b.rank)
          .then(a.abbreviation.len().cmp(&b.abbreviation.len()))
          .then(a.abbreviation.cmp(&b.abbreviation))
      });
    }

    Self {
      symbols,
      reverse,
      last_selected: HashMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  pub fn symbols_for(&self, abbreviation: &str) -> Option<&[Tendril]> {
    self.symbols.get(abbreviation).map(Vec::as_slice)
  }

  /// Whether any abbreviation starts with `prefix`.
  ///
  /// This alone decides whether extending a mnemonic by one more character
  /// still makes sense.
  pub fn has_prefix(&self, prefix: &str) -> bool {
    self.keys_with_prefix(prefix).next().is_some()
  }

  /// Abbreviations starting with `prefix`, in lexicographic order.
  pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .symbols
      .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
      .map(|(key, _)| key.as_str())
      .take_while(move |key| key.starts_with(prefix))
  }

  /// Abbreviations producing `symbol`, defaults first.
  pub fn abbreviations_for(&self, symbol: &str) -> &[AbbreviationRef] {
    self.reverse.get(symbol).map_or(&[], |refs| refs.as_slice())
  }

  /// Cycle index last committed for `abbreviation`, `0` if none.
  pub fn last_index(&self, abbreviation: &str) -> usize {
    self.last_selected.get(abbreviation).copied().unwrap_or(0)
  }

  /// Remembered index reduced to the current number of symbols.
  pub fn initial_index(&self, abbreviation: &str) -> usize {
    match self.symbols_for(abbreviation) {
      Some(list) => self.last_index(abbreviation) % list.len(),
      None => 0,
    }
  }

  pub fn record_index(&mut self, abbreviation: &str, index: usize) {
    tracing::trace!(abbreviation, index, "remembering cycle index");
    self.last_selected.insert(abbreviation.into(), index);
  }
}
