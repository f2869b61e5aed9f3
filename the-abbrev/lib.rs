//! Abbreviation-to-symbol input engine.
//!
//! Typing a leader followed by a mnemonic (`\to`) inside a live buffer is
//! eagerly rewritten to its symbol (`→`). The mnemonic can then be extended,
//! shortened with backspace or cycled through alternates, across any number
//! of cursors at once.
//!
//! The pieces, leaf first:
//!
//! - [`span::Span`]: half-open offset interval in UTF-16 code units.
//! - [`table::CandidateTable`]: mnemonic to symbol lookup.
//! - [`abbreviation::AbbreviationSpan`]: one tracked mnemonic and its state.
//! - [`rewriter::Rewriter`]: ingests edits and selections, and flushes one
//!   batched edit through a [`source::TextSource`].

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod abbreviation;
pub mod rewriter;
pub mod source;
pub mod span;
pub mod table;
pub mod text;

pub type Tendril = SmartString<LazyCompact>;
