//! A single tracked abbreviation and its state machine.
//!
//! An [`AbbreviationSpan`] is either **Typing** (the buffer shows
//! `leader + text`) or **Replaced** (the buffer shows a symbol, possibly
//! followed by characters typed after it that have not been folded into the
//! mnemonic yet).
//!
//! ```text
//! Typing:    "\to"   range covers leader and text, text = "to"
//! Replaced:  "→"     range covers the symbol, text = "to"
//! Replaced:  "→p"    symbol plus one extension character, text = "top"
//! ```
//!
//! The span keeps a copy of exactly what its range shows in the buffer
//! ([`AbbreviationSpan::shown`]). Edits reported by the host are folded into
//! it by [`AbbreviationSpan::process_change`]; what the buffer *should* show
//! is [`AbbreviationSpan::rendered`]. The rewriter diffs the two at flush.
//!
//! Deciding whether a change is acceptable needs the whole candidate table,
//! which the span does not own, so appends are only reported here and applied
//! by the caller through [`AbbreviationSpan::accept_append`].

use crate::{
  Tendril,
  span::Span,
  text::{
    splice_utf16,
    utf16_len,
    utf16_to_byte,
  },
};

/// Direction to cycle through a symbol list.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
  Forward,
  Backward,
}

/// Result of folding one buffer edit into a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
  /// The span was not affected, or only moved.
  None,
  /// The edit broke the span; it must be dropped without reconciling.
  Stop,
  /// Text inside the span changed.
  Updated,
  /// Text was inserted right after the span and may extend the mnemonic.
  Appended(Tendril),
  /// The displayed symbol was deleted as a whole.
  Shorten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
  Typing,
  Replaced(Cycle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cycle {
  /// Empty when the mnemonic currently has no symbols and the next flush
  /// shows it as typed again.
  symbols:     Vec<Tendril>,
  index:       usize,
  /// UTF-16 length of the symbol portion of `shown`.
  flushed_len: usize,
}

/// Cycle position of a replaced span, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStatus<'a> {
  pub symbol: &'a str,
  pub index:  usize,
  pub count:  usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationSpan {
  range:  Span,
  text:   Tendril,
  shown:  Tendril,
  leader: Tendril,
  mode:   Mode,
}

impl AbbreviationSpan {
  /// A fresh Typing span for a leader just inserted at `at`.
  pub fn new(at: usize, leader: &str) -> Self {
    Self {
      range:  Span::new(at, utf16_len(leader)),
      text:   Tendril::new(),
      shown:  leader.into(),
      leader: leader.into(),
      mode:   Mode::Typing,
    }
  }

  pub fn range(&self) -> Span {
    self.range
  }

  /// The mnemonic, without the leader.
  pub fn text(&self) -> &str {
    &self.text
  }

  /// What the span's range currently holds in the buffer.
  pub fn shown(&self) -> &str {
    &self.shown
  }

  pub fn leader(&self) -> &str {
    &self.leader
  }

  pub fn is_replaced(&self) -> bool {
    matches!(self.mode, Mode::Replaced(_))
  }

  pub fn symbols(&self) -> &[Tendril] {
    match &self.mode {
      Mode::Replaced(cycle) => &cycle.symbols,
      Mode::Typing => &[],
    }
  }

  pub fn cycle_index(&self) -> Option<usize> {
    match &self.mode {
      Mode::Replaced(cycle) if !cycle.symbols.is_empty() => Some(cycle.index),
      _ => None,
    }
  }

  pub fn current_symbol(&self) -> Option<&str> {
    match &self.mode {
      Mode::Replaced(cycle) => cycle.symbols.get(cycle.index).map(Tendril::as_str),
      Mode::Typing => None,
    }
  }

  /// Length of the displayed symbol, excluding extension characters.
  pub fn flushed_symbol_len(&self) -> usize {
    match &self.mode {
      Mode::Replaced(cycle) => cycle.flushed_len,
      Mode::Typing => 0,
    }
  }

  /// Whether the next flush turns this span back into Typing.
  pub fn is_reverting(&self) -> bool {
    matches!(&self.mode, Mode::Replaced(cycle) if cycle.symbols.is_empty())
  }

  pub fn status(&self) -> Option<CycleStatus<'_>> {
    let Mode::Replaced(cycle) = &self.mode else {
      return None;
    };
    let symbol = cycle.symbols.get(cycle.index)?;
    Some(CycleStatus {
      symbol: symbol.as_str(),
      index:  cycle.index,
      count:  cycle.symbols.len(),
    })
  }

  /// Typed form, `leader + text`.
  pub fn typed(&self) -> Tendril {
    let mut typed = self.leader.clone();
    typed.push_str(&self.text);
    typed
  }

  /// What the buffer should show once pending state is flushed.
  pub fn rendered(&self) -> Tendril {
    match self.current_symbol() {
      Some(symbol) => symbol.into(),
      None => self.typed(),
    }
  }

  /// Folds a host edit that replaced `edit` with `inserted` into the span.
  ///
  /// `edit` is in the coordinates the span currently uses, i.e. before the
  /// edit was applied.
  ///
  /// In Replaced mode an edit inside the symbol is [`ChangeOutcome::Stop`]
  /// even without extension characters; only deleting the whole symbol
  /// ([`ChangeOutcome::Shorten`]) or editing after it keeps the span alive.
  pub fn process_change(&mut self, edit: Span, inserted: &str) -> ChangeOutcome {
    let range = self.range;
    let inserted_len = utf16_len(inserted);

    if edit.is_empty() && edit.start == range.end() && !inserted.is_empty() {
      return match self.mode {
        Mode::Typing => ChangeOutcome::Appended(inserted.into()),
        // Only a single keystroke extends a replaced symbol. Anything else at
        // its end most likely came from another cursor.
        Mode::Replaced(_) if inserted.chars().count() == 1 => {
          ChangeOutcome::Appended(inserted.into())
        },
        Mode::Replaced(_) => ChangeOutcome::None,
      };
    }

    if edit.end() <= range.start {
      self.range = range.shifted(inserted_len as isize - edit.len as isize);
      return ChangeOutcome::None;
    }
    if edit.start >= range.end() {
      return ChangeOutcome::None;
    }
    if !range.contains_range(edit) {
      return ChangeOutcome::Stop;
    }

    let offset = edit.start - range.start;
    match &mut self.mode {
      Mode::Typing => {
        if offset < utf16_len(&self.leader) {
          return ChangeOutcome::Stop;
        }
        let Some(shown) = splice_utf16(&self.shown, offset, edit.len, inserted) else {
          return ChangeOutcome::Stop;
        };
        self.text = shown[self.leader.len()..].into();
        self.range = range.with_len(utf16_len(&shown));
        self.shown = shown;
        ChangeOutcome::Updated
      },
      Mode::Replaced(cycle) => {
        let has_extension = range.len > cycle.flushed_len;
        if offset >= cycle.flushed_len {
          let Some(split) = utf16_to_byte(&self.shown, cycle.flushed_len) else {
            return ChangeOutcome::Stop;
          };
          let extension = &self.shown[split..];
          let Some(new_extension) =
            splice_utf16(extension, offset - cycle.flushed_len, edit.len, inserted)
          else {
            return ChangeOutcome::Stop;
          };
          let kept = self.text.chars().count() - extension.chars().count();
          let mut text: Tendril = self.text.chars().take(kept).collect();
          text.push_str(&new_extension);
          let mut shown: Tendril = self.shown[..split].into();
          shown.push_str(&new_extension);

          self.text = text;
          self.range = range.with_len(utf16_len(&shown));
          self.shown = shown;
          ChangeOutcome::Updated
        } else if offset == 0 && edit.len == cycle.flushed_len && inserted.is_empty() && !has_extension
        {
          self.shown.clear();
          self.range = range.with_len(0);
          cycle.flushed_len = 0;
          ChangeOutcome::Shorten
        } else {
          ChangeOutcome::Stop
        }
      },
    }
  }

  /// Extends the mnemonic with text the host already inserted after the
  /// span.
  pub fn accept_append(&mut self, text: &str) {
    self.text.push_str(text);
    self.shown.push_str(text);
    self.range = self.range.with_len(self.range.len + utf16_len(text));
  }

  /// Drops the last mnemonic character after its symbol was deleted.
  pub fn shorten_text(&mut self) -> Option<char> {
    self.text.pop()
  }

  pub fn shift_range(&mut self, delta: isize) {
    self.range = self.range.shifted(delta);
  }

  /// Marks the span as showing `symbols[initial_index]` over `new_range`.
  pub fn enter_replaced_state(&mut self, symbols: Vec<Tendril>, new_range: Span, initial_index: usize) {
    let index = if symbols.is_empty() { 0 } else { initial_index % symbols.len() };
    self.shown = symbols.get(index).cloned().unwrap_or_default();
    self.range = new_range;
    self.mode = Mode::Replaced(Cycle {
      symbols,
      index,
      flushed_len: new_range.len,
    });
  }

  /// Marks the span as showing `leader + text` over `new_range`.
  pub fn revert_to_typing(&mut self, new_range: Span) {
    self.shown = self.typed();
    self.range = new_range;
    self.mode = Mode::Typing;
  }

  /// Records that the buffer now shows [`Self::rendered`] over `new_range`.
  pub fn mark_flushed(&mut self, new_range: Span) {
    self.shown = self.rendered();
    self.range = new_range;
    if let Mode::Replaced(cycle) = &mut self.mode {
      cycle.flushed_len = new_range.len;
    }
  }

  /// Replaces the candidate list of a Replaced span without touching the
  /// buffer. A Typing span is left alone.
  pub fn set_cycle_state(&mut self, symbols: Vec<Tendril>, index: usize) {
    if let Mode::Replaced(cycle) = &mut self.mode {
      cycle.index = if symbols.is_empty() { 0 } else { index % symbols.len() };
      cycle.symbols = symbols;
    }
  }

  /// Steps to the next or previous symbol, wrapping around.
  pub fn cycle(&mut self, direction: Direction) -> Option<&str> {
    let Mode::Replaced(cycle) = &mut self.mode else {
      return None;
    };
    let count = cycle.symbols.len();
    if count == 0 {
      return None;
    }
    cycle.index = match direction {
      Direction::Forward => (cycle.index + 1) % count,
      Direction::Backward => (cycle.index + count - 1) % count,
    };
    cycle.symbols.get(cycle.index).map(Tendril::as_str)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn symbols(list: &[&str]) -> Vec<Tendril> {
    list.iter().map(|s| Tendril::from(*s)).collect()
  }

  /// `\to` typed at offset 4.
  fn typing() -> AbbreviationSpan {
    let mut span = AbbreviationSpan::new(4, "\\");
    span.accept_append("to");
    span
  }

  /// `→` shown at offset 4 for `to`.
  fn replaced() -> AbbreviationSpan {
    let mut span = typing();
    span.enter_replaced_state(symbols(&["→"]), Span::new(4, 1), 0);
    span
  }

  #[test]
  fn test_new_span_shows_leader() {
    let span = AbbreviationSpan::new(4, "\\");
    assert_eq!(span.range(), Span::new(4, 1));
    assert_eq!(span.text(), "");
    assert_eq!(span.shown(), "\\");
    assert!(!span.is_replaced());
  }

  #[test]
  fn test_edit_before_shifts() {
    let mut span = typing();
    assert_eq!(span.process_change(Span::point(0), "ab"), ChangeOutcome::None);
    assert_eq!(span.range(), Span::new(6, 3));
    assert_eq!(span.process_change(Span::new(1, 3), ""), ChangeOutcome::None);
    assert_eq!(span.range(), Span::new(3, 3));
    // insertion right before the leader
    assert_eq!(span.process_change(Span::point(3), "x"), ChangeOutcome::None);
    assert_eq!(span.range(), Span::new(4, 3));
  }

  #[test]
  fn test_edit_after_is_ignored() {
    let mut span = typing();
    assert_eq!(span.process_change(Span::new(7, 2), ""), ChangeOutcome::None);
    assert_eq!(span.process_change(Span::point(9), "x"), ChangeOutcome::None);
    assert_eq!(span.range(), Span::new(4, 3));
  }

  #[test]
  fn test_typing_append_candidate() {
    let mut span = typing();
    assert_eq!(
      span.process_change(Span::point(7), "p"),
      ChangeOutcome::Appended("p".into())
    );
    // nothing changes until the caller accepts
    assert_eq!(span.text(), "to");
    assert_eq!(
      span.process_change(Span::point(7), "ps"),
      ChangeOutcome::Appended("ps".into())
    );
  }

  #[test]
  fn test_typing_backspace_updates() {
    let mut span = typing();
    assert_eq!(span.process_change(Span::new(6, 1), ""), ChangeOutcome::Updated);
    assert_eq!(span.text(), "t");
    assert_eq!(span.shown(), "\\t");
    assert_eq!(span.range(), Span::new(4, 2));
  }

  #[test]
  fn test_typing_edit_touching_leader_stops() {
    let mut span = typing();
    assert_eq!(span.process_change(Span::new(4, 1), ""), ChangeOutcome::Stop);
    let mut span = typing();
    assert_eq!(span.process_change(Span::new(3, 2), ""), ChangeOutcome::Stop);
    let mut span = typing();
    assert_eq!(span.process_change(Span::new(6, 3), "x"), ChangeOutcome::Stop);
  }

  #[test]
  fn test_replaced_append_only_single_char() {
    let mut span = replaced();
    assert_eq!(
      span.process_change(Span::point(5), "p"),
      ChangeOutcome::Appended("p".into())
    );
    assert_eq!(span.process_change(Span::point(5), "pq"), ChangeOutcome::None);
    assert_eq!(span.range(), Span::new(4, 1));
  }

  #[test]
  fn test_replaced_extension_edit_updates_text() {
    let mut span = replaced();
    span.accept_append("p");
    assert_eq!(span.text(), "top");
    assert_eq!(span.shown(), "→p");
    assert_eq!(span.range(), Span::new(4, 2));

    assert_eq!(span.process_change(Span::new(5, 1), ""), ChangeOutcome::Updated);
    assert_eq!(span.text(), "to");
    assert_eq!(span.shown(), "→");
    assert_eq!(span.range(), Span::new(4, 1));
  }

  #[test]
  fn test_replaced_symbol_edit_with_extension_stops() {
    let mut span = replaced();
    span.accept_append("p");
    assert_eq!(span.process_change(Span::new(4, 1), ""), ChangeOutcome::Stop);
  }

  #[test]
  fn test_replaced_symbol_delete_shortens() {
    let mut span = replaced();
    assert_eq!(span.process_change(Span::new(4, 1), ""), ChangeOutcome::Shorten);
    assert_eq!(span.range(), Span::point(4));
    assert_eq!(span.shown(), "");
    assert_eq!(span.shorten_text(), Some('o'));
    assert_eq!(span.text(), "t");
  }

  #[test]
  fn test_replaced_overwrite_symbol_stops() {
    let mut span = replaced();
    assert_eq!(span.process_change(Span::new(4, 1), "x"), ChangeOutcome::Stop);
  }

  #[test]
  fn test_replaced_partial_symbol_edit_stops() {
    let mut span = typing();
    span.enter_replaced_state(symbols(&["⟶⟶"]), Span::new(4, 2), 0);
    assert_eq!(span.process_change(Span::new(5, 1), ""), ChangeOutcome::Stop);
  }

  #[test]
  fn test_surrogate_pair_is_atomic() {
    let mut span = AbbreviationSpan::new(0, "\\");
    span.accept_append("bA");
    span.enter_replaced_state(symbols(&["𝔸"]), Span::new(0, 2), 0);

    let mut half = span.clone();
    assert_eq!(half.process_change(Span::new(1, 1), ""), ChangeOutcome::Stop);

    assert_eq!(span.process_change(Span::new(0, 2), ""), ChangeOutcome::Shorten);
    assert_eq!(span.range(), Span::point(0));
  }

  #[test]
  fn test_cycle_wraps() {
    let mut span = typing();
    span.enter_replaced_state(symbols(&["A", "B", "C"]), Span::new(4, 1), 0);
    assert_eq!(span.cycle(Direction::Forward), Some("B"));
    assert_eq!(span.cycle(Direction::Forward), Some("C"));
    assert_eq!(span.cycle(Direction::Forward), Some("A"));
    assert_eq!(span.cycle(Direction::Backward), Some("C"));
    assert_eq!(span.cycle_index(), Some(2));
    assert_eq!(
      span.status(),
      Some(CycleStatus {
        symbol: "C",
        index:  2,
        count:  3,
      })
    );
  }

  #[test]
  fn test_cycle_on_typing_is_noop() {
    let mut span = typing();
    assert_eq!(span.cycle(Direction::Forward), None);
    assert_eq!(span.status(), None);
  }

  #[test]
  fn test_rendered_and_revert() {
    let mut span = replaced();
    span.accept_append("z");
    span.set_cycle_state(Vec::new(), 0);
    assert!(span.is_reverting());
    assert_eq!(span.rendered(), "\\toz");

    span.revert_to_typing(Span::new(4, 4));
    assert!(!span.is_replaced());
    assert_eq!(span.shown(), "\\toz");
    assert_eq!(span.rendered(), "\\toz");
  }

  #[test]
  fn test_mark_flushed_resets_extension() {
    let mut span = replaced();
    span.accept_append("p");
    span.set_cycle_state(symbols(&["⊤"]), 0);
    assert_eq!(span.rendered(), "⊤");
    span.mark_flushed(Span::new(4, 1));
    assert_eq!(span.shown(), "⊤");
    assert_eq!(span.flushed_symbol_len(), 1);
  }
}
