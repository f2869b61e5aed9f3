//! Orchestrates every tracked abbreviation in a buffer.
//!
//! The [`Rewriter`] turns a stream of host events into state transitions on
//! its [`AbbreviationSpan`]s, and turns those transitions into one batched
//! edit per [`Rewriter::flush`].
//!
//! # Event flow
//!
//! ```text
//! host edit ──► ingest_edits ──┐
//! selection ──► ingest_selection_change ──┼──► dirty / finished / deleted ──► flush ──► TextSource
//! command ──► cycle / delete_selected ─┘
//! ```
//!
//! - **dirty**: the span should show something else (eager replacement,
//!   extension, shortening, cycling).
//! - **finished**: the span is committed; the next flush writes its final
//!   form and stops tracking it.
//! - **deleted**: the span's whole range is erased by the next flush.
//!
//! Finished and deleted spans are provisionally dropped: they no longer react
//! to selections, cycling or typing, but still move with edits before them.
//! If the flush fails they are tracked again.
//!
//! # Ordering
//!
//! The edits of one [`Rewriter::ingest_edits`] call are simultaneous (one per
//! cursor) and share the coordinates of the buffer before any of them. They
//! are processed rightmost first, so shifting spans for one edit never
//! invalidates the offsets of the edits still to come.
//!
//! Callers must serialize calls; the rewriter does no locking and does not
//! detect its own edits echoed back by the host.

use std::collections::BTreeSet;

use slotmap::{
  SlotMap,
  new_key_type,
};

use crate::{
  Tendril,
  abbreviation::{
    AbbreviationSpan,
    ChangeOutcome,
    Direction,
  },
  source::{
    Edit,
    Result,
    TextSource,
  },
  span::Span,
  table::CandidateTable,
  text::{
    common_affixes,
    utf16_len,
  },
};

new_key_type! {
  /// Stable handle to a tracked span.
  pub struct SpanKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
  Dirty,
  Finished,
  Deleted,
}

/// One span's share of a flush.
#[derive(Debug)]
struct Planned {
  key:     SpanKey,
  pending: Pending,
  old:     Span,
  text:    Tendril,
  /// Symbols to enter Replaced mode with, for Typing spans being replaced.
  replace: Option<(Vec<Tendril>, usize)>,
}

impl Planned {
  fn delta(&self) -> isize {
    utf16_len(&self.text) as isize - self.old.len as isize
  }
}

#[derive(Debug)]
pub struct Rewriter<S> {
  table:    CandidateTable,
  leader:   Tendril,
  source:   S,
  spans:    SlotMap<SpanKey, AbbreviationSpan>,
  dirty:    BTreeSet<SpanKey>,
  finished: BTreeSet<SpanKey>,
  deleted:  BTreeSet<SpanKey>,
}

impl<S: TextSource> Rewriter<S> {
  pub fn new(table: CandidateTable, leader: impl Into<Tendril>, source: S) -> Self {
    Self {
      table,
      leader: leader.into(),
      source,
      spans: SlotMap::with_key(),
      dirty: BTreeSet::new(),
      finished: BTreeSet::new(),
      deleted: BTreeSet::new(),
    }
  }

  pub fn table(&self) -> &CandidateTable {
    &self.table
  }

  pub fn leader(&self) -> &str {
    &self.leader
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn source_mut(&mut self) -> &mut S {
    &mut self.source
  }

  /// Tracked spans, excluding those waiting to be committed or erased.
  pub fn spans(&self) -> impl Iterator<Item = (SpanKey, &AbbreviationSpan)> {
    self.spans.iter().filter(|(key, _)| !self.is_dropped(*key))
  }

  pub fn span(&self, key: SpanKey) -> Option<&AbbreviationSpan> {
    self.spans.get(key).filter(|_| !self.is_dropped(key))
  }

  /// The tracked span whose range contains `offset`.
  pub fn span_at(&self, offset: usize) -> Option<(SpanKey, &AbbreviationSpan)> {
    self
      .spans()
      .find(|(_, span)| span.range().contains_range(Span::point(offset)))
  }

  /// Whether the next flush has anything to do.
  pub fn needs_flush(&self) -> bool {
    !(self.dirty.is_empty() && self.finished.is_empty() && self.deleted.is_empty())
  }

  fn is_dropped(&self, key: SpanKey) -> bool {
    self.finished.contains(&key) || self.deleted.contains(&key)
  }

  fn live_keys(&self) -> Vec<SpanKey> {
    self.spans().map(|(key, _)| key).collect()
  }

  fn untrack(&mut self, key: SpanKey) {
    self.spans.remove(key);
    self.dirty.remove(&key);
    self.finished.remove(&key);
    self.deleted.remove(&key);
  }

  /// Folds one host change event into the tracked spans.
  ///
  /// All `changes` must be non-overlapping and expressed in the coordinates
  /// of the buffer before the event.
  pub fn ingest_edits(&mut self, changes: impl IntoIterator<Item = Edit>) {
    let mut changes: Vec<Edit> = changes.into_iter().collect();
    changes.sort_by(|a, b| b.span.start.cmp(&a.span.start));
    for change in changes {
      self.ingest_edit(&change);
    }
  }

  fn ingest_edit(&mut self, change: &Edit) {
    let mut claimed = false;
    for key in self.spans.keys().collect::<Vec<_>>() {
      let dropped = self.is_dropped(key);
      let Some(span) = self.spans.get_mut(key) else {
        continue;
      };
      let outcome = span.process_change(change.span, &change.text);

      if dropped {
        // Only movement is allowed while waiting for the flush; anything
        // touching the span invalidates the edit queued for it.
        if matches!(outcome, ChangeOutcome::Updated | ChangeOutcome::Shorten | ChangeOutcome::Stop) {
          tracing::trace!(?key, "edit overlaps span pending flush, cancelling");
          self.untrack(key);
        }
        continue;
      }

      match outcome {
        ChangeOutcome::None => {},
        ChangeOutcome::Stop => {
          tracing::trace!(?key, edit = %change.span, "edit broke span, untracking");
          self.untrack(key);
        },
        ChangeOutcome::Updated => {
          claimed = true;
          self.on_updated(key);
        },
        ChangeOutcome::Appended(text) => {
          claimed |= self.on_appended(key, &text);
        },
        ChangeOutcome::Shorten => {
          claimed = true;
          self.on_shorten(key);
        },
      }
    }

    if !claimed && change.span.is_empty() && change.text == self.leader {
      let span = AbbreviationSpan::new(change.span.start, &self.leader);
      let key = self.spans.insert(span);
      tracing::trace!(?key, at = change.span.start, "tracking new abbreviation");
    }
  }

  fn on_updated(&mut self, key: SpanKey) {
    let Some(span) = self.spans.get(key) else {
      return;
    };
    if span.is_replaced() {
      self.refresh_candidates(key);
      self.dirty.insert(key);
    } else if self.table.symbols_for(span.text()).is_some() {
      self.dirty.insert(key);
    }
  }

  /// Returns whether the span took the appended text.
  fn on_appended(&mut self, key: SpanKey, text: &str) -> bool {
    let Some(span) = self.spans.get_mut(key) else {
      return false;
    };
    let mut candidate = Tendril::from(span.text());
    candidate.push_str(text);

    if !self.table.has_prefix(&candidate) {
      tracing::trace!(?key, %candidate, "no abbreviation continues, finalizing");
      self.finalize(key);
      return false;
    }

    span.accept_append(text);
    if span.is_replaced() {
      self.refresh_candidates(key);
      self.dirty.insert(key);
    } else if self.table.symbols_for(span.text()).is_some() {
      self.dirty.insert(key);
    }
    true
  }

  fn on_shorten(&mut self, key: SpanKey) {
    let Some(span) = self.spans.get_mut(key) else {
      return;
    };
    span.shorten_text();
    let text = span.text();
    if self.table.symbols_for(text).is_some() || text.is_empty() || self.table.has_prefix(text) {
      self.refresh_candidates(key);
      self.dirty.insert(key);
    } else {
      self.untrack(key);
    }
  }

  /// Reloads the symbols of a Replaced span from its current text, seeding
  /// the index from the remembered choice.
  fn refresh_candidates(&mut self, key: SpanKey) {
    let Some(span) = self.spans.get_mut(key) else {
      return;
    };
    let text = span.text();
    let symbols = self.table.symbols_for(text).map(<[Tendril]>::to_vec);
    let index = self.table.initial_index(text);
    span.set_cycle_state(symbols.unwrap_or_default(), index);
  }

  /// Commits a span. Typing spans get their best match written by the next
  /// flush; Replaced spans remember their cycle index and are dropped, after
  /// the next flush if their display is still stale.
  fn finalize(&mut self, key: SpanKey) {
    let Some(span) = self.spans.get(key) else {
      return;
    };
    if !span.is_replaced() {
      self.dirty.remove(&key);
      self.finished.insert(key);
      return;
    }
    if let Some(index) = span.cycle_index() {
      let text = Tendril::from(span.text());
      self.table.record_index(&text, index);
    }
    if self.dirty.remove(&key) {
      self.finished.insert(key);
    } else {
      self.spans.remove(key);
    }
  }

  /// Commits every span no cursor is in.
  pub fn ingest_selection_change(&mut self, selections: &[Span]) {
    for key in self.live_keys() {
      let Some(span) = self.spans.get(key) else {
        continue;
      };
      let range = span.range();
      if !selections.iter().any(|selection| range.contains_range(*selection)) {
        self.finalize(key);
      }
    }
  }

  fn selected_keys(&self) -> Vec<SpanKey> {
    let selections = self.source.selections();
    self
      .spans()
      .filter(|(_, span)| {
        selections
          .iter()
          .any(|selection| span.range().contains_range(*selection))
      })
      .map(|(key, _)| key)
      .collect()
  }

  /// Cycles every selected span. Commits everything when no selected span
  /// has anything to cycle.
  pub fn cycle(&mut self, direction: Direction) {
    let mut cycled = false;
    for key in self.selected_keys() {
      let Some(span) = self.spans.get_mut(key) else {
        continue;
      };
      if span.is_replaced() {
        if let Some(symbol) = span.cycle(direction) {
          tracing::trace!(?key, symbol, "cycled");
          self.dirty.insert(key);
          cycled = true;
        }
      } else if self.table.symbols_for(span.text()).is_some() {
        self.dirty.insert(key);
        cycled = true;
      }
    }
    if !cycled {
      self.finalize_all();
    }
  }

  /// Erases every selected span, symbol and extension included.
  pub fn delete_selected(&mut self) {
    for key in self.selected_keys() {
      self.dirty.remove(&key);
      self.deleted.insert(key);
    }
  }

  pub fn finalize_all(&mut self) {
    for key in self.live_keys() {
      self.finalize(key);
    }
  }

  fn plan(&self, key: SpanKey, pending: Pending) -> Option<Planned> {
    let span = self.spans.get(key)?;
    let mut replace = None;
    let text = match pending {
      Pending::Deleted => Tendril::new(),
      Pending::Dirty | Pending::Finished if span.is_replaced() => span.rendered(),
      Pending::Dirty | Pending::Finished => match self.table.symbols_for(span.text()) {
        Some(symbols) => {
          let index = self.table.initial_index(span.text());
          let text = symbols[index].clone();
          replace = Some((symbols.to_vec(), index));
          text
        },
        None => span.shown().into(),
      },
    };
    Some(Planned {
      key,
      pending,
      old: span.range(),
      text,
      replace,
    })
  }

  /// Writes every pending change to the text source in one batch.
  ///
  /// Returns the number of edits applied. On error nothing was applied:
  /// spans queued for commit or deletion are tracked again, and everything
  /// but the deletions is retried by the next flush.
  pub async fn flush(&mut self) -> Result<usize> {
    let mut planned: Vec<Planned> = self
      .deleted
      .iter()
      .map(|key| (*key, Pending::Deleted))
      .chain(self.finished.iter().map(|key| (*key, Pending::Finished)))
      .chain(self.dirty.iter().map(|key| (*key, Pending::Dirty)))
      .filter_map(|(key, pending)| self.plan(key, pending))
      .collect();
    planned.sort_by_key(|plan| (plan.old.start, plan.old.len));

    let edits: Vec<Edit> = planned
      .iter()
      .filter_map(|plan| {
        let shown = self.spans.get(plan.key)?.shown();
        (shown != plan.text.as_str()).then(|| minimal_edit(plan.old, shown, &plan.text))
      })
      .collect();

    if !edits.is_empty() {
      tracing::debug!(count = edits.len(), ?edits, "flushing abbreviation edits");
      if let Err(err) = self.source.apply_edits(&edits).await {
        tracing::warn!(%err, "text source rejected abbreviation edits");
        let restored = std::mem::take(&mut self.finished);
        self.dirty.extend(restored);
        self.deleted.clear();
        return Err(err);
      }
    }

    self.commit(planned);
    Ok(edits.len())
  }

  /// Moves every span past the edits just applied and settles the planned
  /// ones into their new state.
  fn commit(&mut self, planned: Vec<Planned>) {
    let shifts: Vec<(Span, isize)> = planned
      .iter()
      .filter(|plan| plan.delta() != 0)
      .map(|plan| (plan.old, plan.delta()))
      .collect();
    let planned_keys: BTreeSet<SpanKey> = planned.iter().map(|plan| plan.key).collect();
    for (key, span) in self.spans.iter_mut() {
      if planned_keys.contains(&key) {
        continue;
      }
      let at = span.range().start;
      let delta: isize = shifts
        .iter()
        .filter(|(old, _)| old.end() <= at)
        .map(|(_, delta)| delta)
        .sum();
      span.shift_range(delta);
    }

    let mut shift = 0isize;
    for plan in planned {
      let range = Span::new(
        plan.old.start.saturating_add_signed(shift),
        utf16_len(&plan.text),
      );
      shift += plan.delta();

      match plan.pending {
        Pending::Deleted | Pending::Finished => {
          self.untrack(plan.key);
        },
        Pending::Dirty => {
          let Some(span) = self.spans.get_mut(plan.key) else {
            continue;
          };
          match plan.replace {
            Some((symbols, index)) => span.enter_replaced_state(symbols, range, index),
            None if span.is_reverting() => span.revert_to_typing(range),
            None => span.mark_flushed(range),
          }
          self.dirty.remove(&plan.key);
        },
      }
    }

    self.dirty.clear();
    self.finished.clear();
    self.deleted.clear();
  }
}

/// The edit turning `shown` over `range` into `text`, without the prefix and
/// suffix they share.
fn minimal_edit(range: Span, shown: &str, text: &str) -> Edit {
  let (prefix, suffix) = common_affixes(shown, text);
  let start = range.start + utf16_len(&shown[..prefix]);
  let removed = &shown[prefix..shown.len() - suffix];
  let inserted = &text[prefix..text.len() - suffix];
  Edit::new(Span::new(start, utf16_len(removed)), inserted)
}
