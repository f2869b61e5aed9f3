use std::collections::VecDeque;

use the_abbrev::{
  Tendril,
  rewriter::Rewriter,
  source::TextSource,
  table::CandidateTable,
};
use tokio::sync::mpsc::{
  self,
  UnboundedReceiver,
  UnboundedSender,
  error::TryRecvError,
};

use crate::{
  HostEvent,
  echo::EchoGuard,
};

/// Feeds host events into a [`Rewriter`] one at a time.
///
/// Runs of consecutive [`HostEvent::Edits`] are ingested together and
/// flushed once; every other event is applied and flushed on its own. While
/// a flush is pending, new events are held back and replayed afterwards, so
/// the echo of the flush can be recognised and dropped.
pub struct Driver<S> {
  rewriter:  Rewriter<EchoGuard<S>>,
  rx:        UnboundedReceiver<HostEvent>,
  queue:     VecDeque<HostEvent>,
  buffered:  Vec<HostEvent>,
  in_flight: bool,
}

impl<S: TextSource> Driver<S> {
  pub fn new(
    table: CandidateTable,
    leader: impl Into<Tendril>,
    source: S,
  ) -> (Self, UnboundedSender<HostEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = Self {
      rewriter: Rewriter::new(table, leader, EchoGuard::new(source)),
      rx,
      queue: VecDeque::new(),
      buffered: Vec::new(),
      in_flight: false,
    };
    (driver, tx)
  }

  pub fn rewriter(&self) -> &Rewriter<EchoGuard<S>> {
    &self.rewriter
  }

  pub fn rewriter_mut(&mut self) -> &mut Rewriter<EchoGuard<S>> {
    &mut self.rewriter
  }

  pub fn into_rewriter(self) -> Rewriter<EchoGuard<S>> {
    self.rewriter
  }

  /// Events queued but not handled yet.
  pub fn pending(&self) -> usize {
    self.queue.len()
  }

  /// Whether a flush was started and has not completed. Only observable
  /// after a [`Driver::drain`] future was dropped mid-flush.
  pub fn is_flushing(&self) -> bool {
    self.in_flight
  }

  /// Handles every event available right now, including the ones that
  /// arrive while doing so.
  pub async fn drain(&mut self) {
    self.recover();
    self.receive();
    while let Some(event) = self.queue.pop_front() {
      self.handle(event).await;
      self.receive();
    }
  }

  /// Handles events until every sender is gone, then hands back the
  /// rewriter.
  pub async fn run(mut self) -> Rewriter<EchoGuard<S>> {
    loop {
      self.drain().await;
      match self.rx.recv().await {
        Some(event) => self.accept(event),
        None => break,
      }
    }
    log::debug!("event channel closed, stopping abbreviation driver");
    self.rewriter
  }

  /// Picks up after a drain that was cancelled while flushing. The pending
  /// edits are still queued in the rewriter and go out with the next flush;
  /// no echo is expected for the abandoned batch.
  fn recover(&mut self) {
    if !std::mem::replace(&mut self.in_flight, false) {
      return;
    }
    log::warn!("abbreviation flush was cancelled before completing");
    self.rewriter.source_mut().disarm();
    for event in std::mem::take(&mut self.buffered) {
      self.accept(event);
    }
  }

  /// Moves everything waiting on the channel into the queue.
  fn receive(&mut self) {
    loop {
      match self.rx.try_recv() {
        Ok(event) => self.accept(event),
        Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
      }
    }
  }

  fn accept(&mut self, event: HostEvent) {
    if event.is_edit() && self.rewriter.source_mut().take_echo() {
      log::trace!("dropping echo of abbreviation edit");
      return;
    }
    self.queue.push_back(event);
  }

  async fn handle(&mut self, event: HostEvent) {
    match event {
      HostEvent::Edits(edits) => {
        self.rewriter.ingest_edits(edits);
        while self.queue.front().is_some_and(HostEvent::is_edit) {
          if let Some(HostEvent::Edits(edits)) = self.queue.pop_front() {
            self.rewriter.ingest_edits(edits);
          }
        }
      },
      HostEvent::Selections(selections) => self.rewriter.ingest_selection_change(&selections),
      HostEvent::Cycle(direction) => self.rewriter.cycle(direction),
      HostEvent::DeleteSelected => self.rewriter.delete_selected(),
      HostEvent::FinalizeAll => self.rewriter.finalize_all(),
    }
    self.flush().await;
  }

  async fn flush(&mut self) {
    if !self.rewriter.needs_flush() {
      return;
    }
    self.in_flight = true;

    let result = {
      let Self {
        rewriter,
        rx,
        buffered,
        ..
      } = &mut *self;
      let flush = rewriter.flush();
      tokio::pin!(flush);
      loop {
        tokio::select! {
          biased;
          result = &mut flush => break result,
          Some(event) = rx.recv() => buffered.push(event),
        }
      }
    };
    self.in_flight = false;

    match result {
      Ok(count) => log::debug!("applied {count} abbreviation edits"),
      Err(err) => log::warn!("failed to apply abbreviation edits: {err}"),
    }
    for event in std::mem::take(&mut self.buffered) {
      self.accept(event);
    }
  }
}

#[cfg(test)]
mod test {
  use std::{
    sync::Arc,
    time::Duration,
  };

  use async_trait::async_trait;
  use parking_lot::Mutex;
  use the_abbrev::{
    abbreviation::Direction,
    source::{
      Edit,
      MemoryBuffer,
      Result,
      TextSourceError,
    },
    span::Span,
  };

  use super::*;

  #[derive(Default)]
  struct Shared {
    buffer:     MemoryBuffer,
    echo:       Option<UnboundedSender<HostEvent>>,
    /// Sent right after the echo of the next batch.
    interleave: Vec<HostEvent>,
    reject:     bool,
    /// Never completes the next batch, without applying it.
    stall:      bool,
    batches:    usize,
  }

  /// Editor that reports every change back, its own edits included.
  #[derive(Clone, Default)]
  struct Host(Arc<Mutex<Shared>>);

  impl Host {
    fn text(&self) -> String {
      self.0.lock().buffer.text()
    }

    fn batches(&self) -> usize {
      self.0.lock().batches
    }

    fn type_str(&self, tx: &UnboundedSender<HostEvent>, text: &str) {
      let mut shared = self.0.lock();
      for ch in text.chars() {
        let at = shared.buffer.selections()[0].start;
        let edit = shared
          .buffer
          .insert(at, ch.encode_utf8(&mut [0; 4]))
          .unwrap();
        tx.send(HostEvent::Edits(vec![edit])).unwrap();
      }
    }
  }

  #[async_trait]
  impl TextSource for Host {
    async fn apply_edits(&mut self, edits: &[Edit]) -> Result<()> {
      let stall = self.0.lock().stall;
      if stall {
        return std::future::pending().await;
      }
      let (echo, interleave) = {
        let mut shared = self.0.lock();
        if shared.reject {
          return Err(TextSourceError::Rejected);
        }
        shared.buffer.apply(edits)?;
        shared.batches += 1;
        (shared.echo.clone(), std::mem::take(&mut shared.interleave))
      };
      if let Some(echo) = echo {
        echo.send(HostEvent::Edits(edits.to_vec())).ok();
        for event in interleave {
          echo.send(event).ok();
        }
      }
      // Let the driver see the notifications before the call resolves.
      tokio::task::yield_now().await;
      Ok(())
    }

    fn selections(&self) -> Vec<Span> {
      self.0.lock().buffer.selections()
    }
  }

  fn table() -> CandidateTable {
    CandidateTable::new(
      [
        ("to", vec!["→"]),
        ("top", vec!["⊤"]),
        ("ne", vec!["≠"]),
        ("test", vec!["A", "B", "C"]),
      ],
      [],
    )
  }

  fn driver() -> (Driver<Host>, UnboundedSender<HostEvent>, Host) {
    let host = Host::default();
    let (driver, tx) = Driver::new(table(), "\\", host.clone());
    host.0.lock().echo = Some(tx.clone());
    (driver, tx, host)
  }

  #[tokio::test]
  async fn test_replaces_and_drops_echo() {
    let (mut driver, tx, host) = driver();
    host.type_str(&tx, "\\to");
    driver.drain().await;

    assert_eq!(host.text(), "→");
    assert_eq!(host.batches(), 1);
    assert_eq!(driver.rewriter().source().armed(), 0);
    // Ingesting the echo would have broken the span.
    let (_, span) = driver.rewriter().spans().next().unwrap();
    assert_eq!(span.range(), Span::new(0, 1));

    host.type_str(&tx, "p");
    driver.drain().await;
    assert_eq!(host.text(), "⊤");
    assert_eq!(host.batches(), 2);
  }

  #[tokio::test]
  async fn test_consecutive_edits_flush_once() {
    let (mut driver, tx, host) = driver();
    host.type_str(&tx, "\\to \\ne");
    driver.drain().await;

    assert_eq!(host.text(), "→ ≠");
    assert_eq!(host.batches(), 1);
    assert_eq!(driver.rewriter().spans().count(), 1);
    assert_eq!(driver.pending(), 0);
  }

  #[tokio::test]
  async fn test_events_during_flush_are_replayed() {
    let (mut driver, tx, host) = driver();
    host.0.lock().interleave = vec![HostEvent::FinalizeAll];
    host.type_str(&tx, "\\to");
    driver.drain().await;

    assert_eq!(host.text(), "→");
    assert_eq!(host.batches(), 1);
    assert_eq!(driver.rewriter().spans().count(), 0);
  }

  #[tokio::test]
  async fn test_cycle_and_finalize() {
    let (mut driver, tx, host) = driver();
    host.type_str(&tx, "\\test");
    driver.drain().await;
    assert_eq!(host.text(), "A");

    tx.send(HostEvent::Cycle(Direction::Forward)).unwrap();
    driver.drain().await;
    assert_eq!(host.text(), "B");

    tx.send(HostEvent::FinalizeAll).unwrap();
    driver.drain().await;
    assert_eq!(host.text(), "B");
    assert_eq!(driver.rewriter().spans().count(), 0);
    assert_eq!(driver.rewriter().table().last_index("test"), 1);
  }

  #[tokio::test]
  async fn test_selection_leaving_span_commits() {
    let (mut driver, tx, host) = driver();
    host.type_str(&tx, "x\\test");
    driver.drain().await;
    assert_eq!(host.text(), "xA");

    tx.send(HostEvent::Selections(vec![Span::point(0)])).unwrap();
    driver.drain().await;
    assert_eq!(driver.rewriter().spans().count(), 0);
    assert_eq!(host.batches(), 1);
  }

  #[tokio::test]
  async fn test_delete_selected() {
    let (mut driver, tx, host) = driver();
    host.type_str(&tx, "a\\to");
    driver.drain().await;
    assert_eq!(host.text(), "a→");

    tx.send(HostEvent::DeleteSelected).unwrap();
    driver.drain().await;
    assert_eq!(host.text(), "a");
    assert_eq!(driver.rewriter().spans().count(), 0);
  }

  #[tokio::test]
  async fn test_failed_flush_waits_for_next_event() {
    let (mut driver, tx, host) = driver();
    host.0.lock().reject = true;
    host.type_str(&tx, "\\to");
    driver.drain().await;

    assert_eq!(host.text(), "\\to");
    assert_eq!(driver.rewriter().source().armed(), 0);
    assert!(driver.rewriter().needs_flush());

    host.0.lock().reject = false;
    tx.send(HostEvent::Selections(vec![Span::point(3)])).unwrap();
    driver.drain().await;
    assert_eq!(host.text(), "→");
    assert_eq!(host.batches(), 1);
  }

  #[tokio::test]
  async fn test_run_until_closed() {
    let (driver, tx, host) = driver();
    host.0.lock().echo = None;
    host.type_str(&tx, "\\ne");
    drop(tx);

    let rewriter = driver.run().await;
    assert_eq!(host.text(), "≠");
    assert_eq!(rewriter.spans().count(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_flush_recovers_on_next_drain() {
    let (mut driver, tx, host) = driver();
    host.0.lock().stall = true;
    host.type_str(&tx, "\\to");
    let late = tx.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(5)).await;
      late.send(HostEvent::Selections(vec![Span::point(3)])).unwrap();
    });

    let drained = tokio::time::timeout(Duration::from_millis(50), driver.drain()).await;
    assert!(drained.is_err());
    assert!(driver.is_flushing());
    assert_eq!(host.text(), "\\to");

    host.0.lock().stall = false;
    driver.drain().await;
    assert!(!driver.is_flushing());
    assert_eq!(host.text(), "→");
    assert_eq!(host.batches(), 1);
    assert_eq!(driver.rewriter().source().armed(), 0);
    assert_eq!(driver.rewriter().spans().count(), 1);
  }
}
