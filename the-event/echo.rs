use async_trait::async_trait;
use the_abbrev::{
  source::{
    Edit,
    Result,
    TextSource,
  },
  span::Span,
};

/// Wraps the host's text source and counts the change notifications its
/// own edits will cause.
///
/// Every successful [`TextSource::apply_edits`] arms one suppression; the
/// next edit notification taken through [`EchoGuard::take_echo`] is then
/// treated as that echo.
#[derive(Debug, Default)]
pub struct EchoGuard<S> {
  inner:   S,
  pending: usize,
}

impl<S> EchoGuard<S> {
  pub fn new(inner: S) -> Self {
    Self { inner, pending: 0 }
  }

  pub fn inner(&self) -> &S {
    &self.inner
  }

  pub fn inner_mut(&mut self) -> &mut S {
    &mut self.inner
  }

  pub fn into_inner(self) -> S {
    self.inner
  }

  /// Number of echoes still expected.
  pub fn armed(&self) -> usize {
    self.pending
  }

  /// Forgets every armed echo.
  pub fn disarm(&mut self) {
    self.pending = 0;
  }

  /// Consumes one armed echo, if any.
  pub fn take_echo(&mut self) -> bool {
    if self.pending == 0 {
      return false;
    }
    self.pending -= 1;
    true
  }
}

#[async_trait]
impl<S: TextSource> TextSource for EchoGuard<S> {
  async fn apply_edits(&mut self, edits: &[Edit]) -> Result<()> {
    // Armed before the call, the host may notify while it is pending.
    self.pending += 1;
    let result = self.inner.apply_edits(edits).await;
    if result.is_err() {
      self.pending -= 1;
    }
    result
  }

  fn selections(&self) -> Vec<Span> {
    self.inner.selections()
  }
}
