//! The buffer the rewriter edits.
//!
//! [`TextSource`] is the only thing the engine needs from a host editor:
//! apply one batch of edits atomically, and report where the cursors are.
//! [`MemoryBuffer`] is an in-memory implementation backed by a rope, used by
//! tests and by hosts that keep their own text.

use async_trait::async_trait;
use ropey::Rope;
use thiserror::Error;

use crate::{
  Tendril,
  span::Span,
  text::utf16_len,
};

pub type Result<T> = std::result::Result<T, TextSourceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TextSourceError {
  #[error("edit batch was rejected by the text source")]
  Rejected,
  #[error("edit {span} is out of bounds for buffer length {len}")]
  OutOfBounds { span: Span, len: usize },
  #[error("edit {span} overlaps previous edit ending at {prev_end}")]
  Overlapping { span: Span, prev_end: usize },
  #[error("edit {span} splits a surrogate pair at offset {offset}")]
  SplitsCharacter { span: Span, offset: usize },
  #[error("text source is unavailable: {0}")]
  Unavailable(String),
}

/// Replace the text covered by `span` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
  pub span: Span,
  pub text: Tendril,
}

impl Edit {
  pub fn new(span: Span, text: impl Into<Tendril>) -> Self {
    Self {
      span,
      text: text.into(),
    }
  }

  pub fn insert(at: usize, text: impl Into<Tendril>) -> Self {
    Self::new(Span::point(at), text)
  }

  pub fn delete(span: Span) -> Self {
    Self::new(span, Tendril::new())
  }

  /// Change in buffer length caused by this edit.
  pub fn delta(&self) -> isize {
    utf16_len(&self.text) as isize - self.span.len as isize
  }
}

#[async_trait]
pub trait TextSource: Send {
  /// Applies all `edits` as one atomic operation. Spans are in the
  /// coordinates of the buffer before any of them is applied, sorted and
  /// non-overlapping. On error the buffer must be unchanged.
  async fn apply_edits(&mut self, edits: &[Edit]) -> Result<()>;

  /// Current cursors and selections, read fresh on every call.
  fn selections(&self) -> Vec<Span>;
}

/// Rope backed buffer addressed in UTF-16 code units.
#[derive(Debug, Clone)]
pub struct MemoryBuffer {
  text:       Rope,
  selections: Vec<Span>,
}

impl Default for MemoryBuffer {
  fn default() -> Self {
    Self::new("")
  }
}

impl MemoryBuffer {
  pub fn new(text: &str) -> Self {
    let text = Rope::from_str(text);
    let end = text.len_utf16_cu();
    Self {
      text,
      selections: vec![Span::point(end)],
    }
  }

  pub fn text(&self) -> String {
    self.text.to_string()
  }

  pub fn len_utf16(&self) -> usize {
    self.text.len_utf16_cu()
  }

  pub fn set_selections(&mut self, selections: Vec<Span>) {
    self.selections = selections;
  }

  /// Inserts `text` at `at` and leaves a single cursor after it.
  pub fn insert(&mut self, at: usize, text: &str) -> Result<Edit> {
    self.replace(Span::point(at), text)
  }

  /// Deletes `span` and leaves a single cursor where it was.
  pub fn delete(&mut self, span: Span) -> Result<Edit> {
    self.replace(span, "")
  }

  /// Replaces `span` with `text` as a user would, returning the change the
  /// host reports for it.
  pub fn replace(&mut self, span: Span, text: &str) -> Result<Edit> {
    let edit = Edit::new(span, text);
    self.apply(std::slice::from_ref(&edit))?;
    self.selections = vec![Span::point(span.start + utf16_len(text))];
    Ok(edit)
  }

  /// Applies several simultaneous edits, one per cursor, and leaves a cursor
  /// after each of them.
  pub fn replace_all(&mut self, edits: Vec<Edit>) -> Result<Vec<Edit>> {
    self.apply(&edits)?;
    let mut shift = 0isize;
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|edit| edit.span.start);
    self.selections = sorted
      .into_iter()
      .map(|edit| {
        let at = edit.span.start.saturating_add_signed(shift) + utf16_len(&edit.text);
        shift += edit.delta();
        Span::point(at)
      })
      .collect();
    Ok(edits)
  }

  /// Whether the UTF-16 offset `offset` falls between two characters.
  fn is_char_boundary(&self, offset: usize) -> bool {
    self.text.char_to_utf16_cu(self.text.utf16_cu_to_char(offset)) == offset
  }

  fn check(&self, edits: &[Edit]) -> Result<Vec<Edit>> {
    let len = self.len_utf16();
    let mut sorted = edits.to_vec();
    sorted.sort_by_key(|edit| edit.span.start);
    let mut prev_end = 0;
    for (i, edit) in sorted.iter().enumerate() {
      if edit.span.end() > len {
        return Err(TextSourceError::OutOfBounds {
          span: edit.span,
          len,
        });
      }
      if let Some(offset) = [edit.span.start, edit.span.end()]
        .into_iter()
        .find(|offset| !self.is_char_boundary(*offset))
      {
        return Err(TextSourceError::SplitsCharacter {
          span: edit.span,
          offset,
        });
      }
      if i > 0 && edit.span.start < prev_end {
        return Err(TextSourceError::Overlapping {
          span: edit.span,
          prev_end,
        });
      }
      prev_end = edit.span.end();
    }
    Ok(sorted)
  }

  /// Applies a batch atomically and maps the selections through it, as a
  /// host applying someone else's edit would.
  pub fn apply(&mut self, edits: &[Edit]) -> Result<()> {
    let sorted = self.check(edits)?;
    // Right to left so earlier offsets stay valid.
    for edit in sorted.iter().rev() {
      let from = self.text.utf16_cu_to_char(edit.span.start);
      let to = self.text.utf16_cu_to_char(edit.span.end());
      self.text.remove(from..to);
      self.text.insert(from, &edit.text);
    }
    self.selections = self
      .selections
      .iter()
      .map(|selection| map_selection(*selection, &sorted))
      .collect();
    Ok(())
  }
}

/// Maps a selection through a batch of sorted edits. A position inside a
/// replaced region moves to the end of its replacement.
fn map_selection(selection: Span, edits: &[Edit]) -> Span {
  let map = |pos: usize| {
    let mut shift = 0isize;
    for edit in edits {
      if edit.span.end() <= pos && !(edit.span.is_empty() && edit.span.start == pos) {
        shift += edit.delta();
      } else if edit.span.start <= pos {
        return (edit.span.start.saturating_add_signed(shift)) + utf16_len(&edit.text);
      } else {
        break;
      }
    }
    pos.saturating_add_signed(shift)
  };
  let start = map(selection.start);
  let end = map(selection.end()).max(start);
  Span::new(start, end - start)
}

#[async_trait]
impl TextSource for MemoryBuffer {
  async fn apply_edits(&mut self, edits: &[Edit]) -> Result<()> {
    self.apply(edits)
  }

  fn selections(&self) -> Vec<Span> {
    self.selections.clone()
  }
}
