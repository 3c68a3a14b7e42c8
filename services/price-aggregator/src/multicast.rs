//! One-shot line multicaster
//!
//! Wraps a single line source and replays it to every consumer registered
//! before activation. Each consumer owns an unbounded queue, so a slow
//! consumer never holds back delivery to the others; it only grows its own
//! backlog.
//!
//! Activation is a single explicit `start()`. Until then nothing is read
//! from the source. A second `start()` is rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::source::{LineSource, SourceError};
use crate::stream::receiver_stream;

/// One delivery to a consumer: a line, or the failure that ended the source.
pub type LineEvent = Result<Arc<str>, SourceError>;

/// Lines pushed before the pump yields back to the scheduler.
const YIELD_EVERY: u64 = 1024;

/// Errors from the activation gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MulticastError {
    #[error("multicaster already started")]
    AlreadyStarted,
}

/// Summary of a finished pump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MulticastSummary {
    /// Lines read from the source.
    pub lines: u64,
    /// Consumers registered at activation.
    pub consumers: usize,
    /// Consumers that detached before the source ended.
    pub detached: usize,
}

/// A registered consumer's view of the multicast stream.
///
/// Receives every source line in order, then either the end of the stream
/// or a single failure event.
pub struct LineSubscription {
    id: usize,
    rx: mpsc::UnboundedReceiver<LineEvent>,
}

impl LineSubscription {
    /// Next event, None once the source is exhausted or failed.
    pub async fn recv(&mut self) -> Option<LineEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> BoxStream<'static, LineEvent> {
        receiver_stream(self.rx)
    }
}

struct Consumer {
    id: usize,
    tx: mpsc::UnboundedSender<LineEvent>,
}

enum Gate {
    Pending {
        source: Box<dyn LineSource>,
        consumers: Vec<Consumer>,
    },
    Started,
}

/// Buffered broadcast of one line source with a one-shot activation gate.
pub struct LineMulticaster {
    gate: Mutex<Gate>,
    delivered: Arc<AtomicU64>,
}

impl LineMulticaster {
    pub fn new(source: impl LineSource + 'static) -> Self {
        Self {
            gate: Mutex::new(Gate::Pending {
                source: Box::new(source),
                consumers: Vec::new(),
            }),
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new consumer. Only allowed before `start()`.
    pub fn subscribe(&self) -> Result<LineSubscription, MulticastError> {
        let mut gate = self.lock_gate();
        match &mut *gate {
            Gate::Pending { consumers, .. } => {
                let id = consumers.len();
                let (tx, rx) = mpsc::unbounded_channel();
                consumers.push(Consumer { id, tx });
                debug!(consumer = id, "Registered line consumer");
                Ok(LineSubscription { id, rx })
            }
            Gate::Started => Err(MulticastError::AlreadyStarted),
        }
    }

    /// Begin pushing source lines to every registered consumer.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// resolves once the source is exhausted or has failed.
    pub fn start(&self) -> Result<JoinHandle<Result<MulticastSummary, SourceError>>, MulticastError> {
        let (source, consumers) = {
            let mut gate = self.lock_gate();
            match std::mem::replace(&mut *gate, Gate::Started) {
                Gate::Pending { source, consumers } => (source, consumers),
                Gate::Started => return Err(MulticastError::AlreadyStarted),
            }
        };

        info!(consumers = consumers.len(), "Line multicaster started");
        Ok(tokio::spawn(pump(source, consumers, Arc::clone(&self.delivered))))
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.lock_gate(), Gate::Started)
    }

    /// Lines read from the source so far.
    pub fn lines_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn pump(
    mut source: Box<dyn LineSource>,
    mut consumers: Vec<Consumer>,
    delivered: Arc<AtomicU64>,
) -> Result<MulticastSummary, SourceError> {
    let registered = consumers.len();
    let mut lines: u64 = 0;

    loop {
        match source.next_line().await {
            Ok(Some(line)) => {
                let line: Arc<str> = Arc::from(line);
                consumers.retain(|consumer| {
                    let attached = consumer.tx.send(Ok(Arc::clone(&line))).is_ok();
                    if !attached {
                        debug!(consumer = consumer.id, line = lines + 1, "Consumer detached");
                    }
                    attached
                });
                lines += 1;
                delivered.store(lines, Ordering::Relaxed);

                if lines % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Ok(None) => {
                info!(lines, consumers = registered, "Line source exhausted");
                return Ok(MulticastSummary {
                    lines,
                    consumers: registered,
                    detached: registered - consumers.len(),
                });
            }
            Err(err) => {
                error!(lines, error = %err, "Line source failed, stopping delivery");
                for consumer in &consumers {
                    let _ = consumer.tx.send(Err(err.clone()));
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::IterLineSource;
    use futures::StreamExt;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line-{}", i)).collect()
    }

    async fn collect(sub: LineSubscription) -> Vec<LineEvent> {
        sub.into_stream().collect().await
    }

    #[tokio::test]
    async fn test_every_consumer_sees_every_line_in_order() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(100)));
        let subs: Vec<_> = (0..3).map(|_| multicaster.subscribe().unwrap()).collect();

        let summary = multicaster.start().unwrap().await.unwrap().unwrap();
        assert_eq!(summary.lines, 100);
        assert_eq!(summary.consumers, 3);

        for sub in subs {
            let got: Vec<String> = collect(sub)
                .await
                .into_iter()
                .map(|event| event.unwrap().to_string())
                .collect();
            assert_eq!(got, lines(100));
        }
    }

    #[tokio::test]
    async fn test_nothing_delivered_before_start() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(3)));
        let mut sub = multicaster.subscribe().unwrap();

        tokio::task::yield_now().await;
        assert!(sub.rx.try_recv().is_err());
        assert_eq!(multicaster.lines_delivered(), 0);

        multicaster.start().unwrap().await.unwrap().unwrap();
        assert_eq!(sub.recv().await.unwrap().unwrap().as_ref(), "line-0");
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(1)));
        let handle = multicaster.start().unwrap();
        assert_eq!(multicaster.start().unwrap_err(), MulticastError::AlreadyStarted);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_after_start_rejected() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(1)));
        let handle = multicaster.start().unwrap();
        assert!(multicaster.is_started());
        assert_eq!(multicaster.subscribe().err(), Some(MulticastError::AlreadyStarted));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_source_failure_reaches_every_consumer() {
        let source = IterLineSource::new(vec![
            Ok("a".to_string()),
            Err(SourceError::new(1, "connection reset")),
            Ok("b".to_string()),
        ]);
        let multicaster = LineMulticaster::new(source);
        let first = multicaster.subscribe().unwrap();
        let second = multicaster.subscribe().unwrap();

        let result = multicaster.start().unwrap().await.unwrap();
        assert_eq!(result.unwrap_err().message, "connection reset");

        for sub in [first, second] {
            let events = collect(sub).await;
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].as_ref().unwrap().as_ref(), "a");
            assert_eq!(events[1].as_ref().unwrap_err().line, 1);
        }
    }

    #[tokio::test]
    async fn test_detached_consumer_does_not_affect_others() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(50)));
        let dropped = multicaster.subscribe().unwrap();
        let kept = multicaster.subscribe().unwrap();
        drop(dropped);

        let summary = multicaster.start().unwrap().await.unwrap().unwrap();
        assert_eq!(summary.detached, 1);
        assert_eq!(collect(kept).await.len(), 50);
    }

    #[tokio::test]
    async fn test_slow_consumer_still_receives_everything() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(5000)));
        let fast = multicaster.subscribe().unwrap();
        let mut slow = multicaster.subscribe().unwrap();

        let handle = multicaster.start().unwrap();
        let fast_lines = collect(fast).await;
        assert_eq!(fast_lines.len(), 5000);

        let mut slow_count = 0;
        while let Some(event) = slow.recv().await {
            event.unwrap();
            slow_count += 1;
            if slow_count % 1000 == 0 {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(slow_count, 5000);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_consumers_on_worker_threads() {
        let multicaster = LineMulticaster::new(IterLineSource::from_lines(lines(2000)));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let sub = multicaster.subscribe().unwrap();
                tokio::spawn(async move {
                    collect(sub)
                        .await
                        .into_iter()
                        .map(|event| event.unwrap().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        multicaster.start().unwrap().await.unwrap().unwrap();
        for task in tasks {
            assert_eq!(task.await.unwrap(), lines(2000));
        }
    }
}
