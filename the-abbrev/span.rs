//! Half-open intervals over buffer offsets.
//!
//! A [`Span`] is a plain value: every operation returns a new span and none
//! of them mutate. Offsets are UTF-16 code units, the unit host editors use
//! when reporting changes.
//!
//! ```text
//! start=2, len=3: "he[llo] world"
//! start=5, len=0: "hello| world"   (cursor position)
//! ```
//!
//! # Ordering
//!
//! [`Span::is_before`] and [`Span::is_after`] are strict: two spans that only
//! touch (`a.end() == b.start`) are neither before nor after each other. The
//! caller decides what touching means, usually with [`Span::touches`].

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpanError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpanError {
  #[error("invalid span bounds: start {start} is after end {end}")]
  InvalidBounds { start: usize, end: usize },
  #[error("cannot move start of span {span} by {delta}")]
  StartOutOfRange { span: Span, delta: isize },
  #[error("cannot move end of span {span} by {delta}")]
  EndOutOfRange { span: Span, delta: isize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
  pub start: usize,
  pub len:   usize,
}

impl Span {
  #[must_use]
  pub const fn new(start: usize, len: usize) -> Self {
    Self { start, len }
  }

  /// Zero-length span at `at`.
  #[must_use]
  pub const fn point(at: usize) -> Self {
    Self { start: at, len: 0 }
  }

  pub fn from_bounds(start: usize, end: usize) -> Result<Self> {
    if end < start {
      return Err(SpanError::InvalidBounds { start, end });
    }
    Ok(Self::new(start, end - start))
  }

  /// Exclusive end offset.
  #[must_use]
  pub const fn end(self) -> usize {
    self.start + self.len
  }

  #[must_use]
  pub const fn is_empty(self) -> bool {
    self.len == 0
  }

  /// Moves the whole span. Offsets saturate at zero.
  #[must_use]
  pub fn shifted(self, delta: isize) -> Self {
    Self::new(self.start.saturating_add_signed(delta), self.len)
  }

  /// Moves the start while keeping the end in place.
  pub fn move_start(self, delta: isize) -> Result<Self> {
    let err = || SpanError::StartOutOfRange { span: self, delta };
    let start = self.start.checked_add_signed(delta).ok_or_else(err)?;
    if start > self.end() {
      return Err(err());
    }
    Ok(Self::new(start, self.end() - start))
  }

  /// Moves the end while keeping the start in place.
  pub fn move_end(self, delta: isize) -> Result<Self> {
    let len = self
      .len
      .checked_add_signed(delta)
      .ok_or(SpanError::EndOutOfRange { span: self, delta })?;
    Ok(Self::new(self.start, len))
  }

  #[must_use]
  pub const fn with_len(self, len: usize) -> Self {
    Self::new(self.start, len)
  }

  /// Whether `other` lies entirely within `self`.
  ///
  /// The end is inclusive for zero-length spans, so a cursor sitting right
  /// after the last unit is still contained.
  #[must_use]
  pub const fn contains_range(self, other: Span) -> bool {
    self.start <= other.start && other.end() <= self.end()
  }

  #[must_use]
  pub const fn is_before(self, other: Span) -> bool {
    self.end() < other.start
  }

  #[must_use]
  pub const fn is_after(self, other: Span) -> bool {
    other.end() < self.start
  }

  /// Whether the spans share a boundary without overlapping.
  #[must_use]
  pub const fn touches(self, other: Span) -> bool {
    self.end() == other.start || other.end() == self.start
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.start, self.end())
  }
}

#[cfg(test)]
mod test {
  use quickcheck::quickcheck;

  use super::*;

  #[test]
  fn test_from_bounds_rejects_reversed() {
    assert_eq!(Span::from_bounds(3, 7), Ok(Span::new(3, 4)));
    assert_eq!(
      Span::from_bounds(7, 3),
      Err(SpanError::InvalidBounds { start: 7, end: 3 })
    );
  }

  #[test]
  fn test_move_start_past_end_fails() {
    let span = Span::new(4, 2);
    assert_eq!(span.move_start(2), Ok(Span::point(6)));
    assert_eq!(span.move_start(-4), Ok(Span::new(0, 6)));
    assert!(span.move_start(3).is_err());
    assert!(span.move_start(-5).is_err());
  }

  #[test]
  fn test_move_end() {
    let span = Span::new(4, 2);
    assert_eq!(span.move_end(3), Ok(Span::new(4, 5)));
    assert_eq!(span.move_end(-2), Ok(Span::point(4)));
    assert!(span.move_end(-3).is_err());
  }

  #[test]
  fn test_contains_cursor_at_end() {
    let span = Span::new(2, 3);
    assert!(span.contains_range(Span::point(5)));
    assert!(span.contains_range(Span::point(2)));
    assert!(span.contains_range(Span::new(3, 2)));
    assert!(!span.contains_range(Span::new(4, 2)));
    assert!(!span.contains_range(Span::point(6)));
    assert!(!span.contains_range(Span::point(1)));
  }

  #[test]
  fn test_touching_spans_are_unordered() {
    let a = Span::new(0, 3);
    let b = Span::new(3, 2);
    assert!(!a.is_before(b));
    assert!(!b.is_after(a));
    assert!(a.touches(b));

    let c = Span::new(6, 1);
    assert!(a.is_before(c));
    assert!(c.is_after(a));
    assert!(!a.touches(c));
  }

  quickcheck! {
    fn prop_shift_preserves_length(start: u16, len: u16, delta: i16) -> bool {
      let span = Span::new(start as usize + i16::MAX as usize + 1, len as usize);
      let moved = span.shifted(delta as isize);
      moved.len == span.len && moved.start as isize - span.start as isize == delta as isize
    }

    fn prop_move_start_keeps_end(start: u16, len: u16, delta: i16) -> bool {
      let span = Span::new(start as usize, len as usize);
      match span.move_start(delta as isize) {
        Ok(moved) => moved.end() == span.end(),
        Err(_) => {
          let target = span.start as isize + delta as isize;
          target < 0 || target > span.end() as isize
        },
      }
    }
  }
}
