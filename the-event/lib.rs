//! Host side plumbing for the abbreviation rewriter.
//!
//! Editors report changes as a stream of events and usually echo back every
//! edit, including the ones the rewriter just made. [`Driver`] serializes
//! that stream into the rewriter: it queues events, batches runs of edits
//! into a single flush, and drops the echo of each flush through
//! [`EchoGuard`].

mod driver;
mod echo;

use the_abbrev::{
  abbreviation::Direction,
  source::Edit,
  span::Span,
};

pub use crate::{
  driver::Driver,
  echo::EchoGuard,
};

/// Something the host editor reports or asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
  /// One change notification, all edits in pre-change coordinates.
  Edits(Vec<Edit>),
  /// The cursors moved.
  Selections(Vec<Span>),
  Cycle(Direction),
  DeleteSelected,
  FinalizeAll,
}

impl HostEvent {
  pub fn is_edit(&self) -> bool {
    matches!(self, Self::Edits(_))
  }
}
