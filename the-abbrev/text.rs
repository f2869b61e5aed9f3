//! UTF-16 offset helpers.
//!
//! Spans are measured in UTF-16 code units while text is stored as UTF-8.
//! These helpers translate between the two and refuse anything that would
//! split a surrogate pair.

use crate::Tendril;

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
  text.chars().map(char::len_utf16).sum()
}

/// Byte index of the UTF-16 offset `offset`, or `None` when the offset is
/// past the end or falls inside a surrogate pair.
pub fn utf16_to_byte(text: &str, offset: usize) -> Option<usize> {
  let mut units = 0;
  for (byte, ch) in text.char_indices() {
    if units == offset {
      return Some(byte);
    }
    units += ch.len_utf16();
    if units > offset {
      return None;
    }
  }
  (units == offset).then_some(text.len())
}

/// Replaces `len` UTF-16 units at `offset` with `insert`.
pub fn splice_utf16(text: &str, offset: usize, len: usize, insert: &str) -> Option<Tendril> {
  let from = utf16_to_byte(text, offset)?;
  let to = utf16_to_byte(text, offset + len)?;
  let mut out = Tendril::new();
  out.push_str(&text[..from]);
  out.push_str(insert);
  out.push_str(&text[to..]);
  Some(out)
}

/// Splits the change from `old` to `new` into its common prefix and suffix,
/// returning `(prefix, suffix)` byte lengths shared by both strings. The two
/// never overlap.
pub fn common_affixes(old: &str, new: &str) -> (usize, usize) {
  let prefix: usize = old
    .chars()
    .zip(new.chars())
    .take_while(|(a, b)| a == b)
    .map(|(a, _)| a.len_utf8())
    .sum();
  let suffix: usize = old[prefix..]
    .chars()
    .rev()
    .zip(new[prefix..].chars().rev())
    .take_while(|(a, b)| a == b)
    .map(|(a, _)| a.len_utf8())
    .sum();
  (prefix, suffix)
}
