//! Serialized work queue between finalized transcripts and the analyzer.
//!
//! Final transcript segments can arrive in bursts faster than the remote
//! analysis call resolves. The queue absorbs the burst and guarantees that
//! the analyzer sees segments one at a time, in arrival order, with no
//! accepted segment ever dropped. This is the deliberate asymmetry of the
//! pipeline: audio may be lossy under pressure, transcripts may not.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use aura_analysis::Analyzer;
use aura_events::{Segment, SentimentResult};

/// Minimum trimmed length for a segment to be worth analyzing.
pub const MIN_SEGMENT_CHARS: usize = 10;

/// Outcome of one dispatched segment.
#[derive(Debug)]
pub enum QueueEvent {
    Analyzed {
        segment: Segment,
        result: SentimentResult,
    },
    /// Failure is isolated to this segment; the queue keeps draining.
    Failed {
        segment: Segment,
        error: String,
    },
}

struct Backlog {
    segments: VecDeque<Segment>,
    in_flight: bool,
}

/// FIFO queue enforcing at most one in-flight analysis call.
///
/// `enqueue` and the drain loop touch the backlog only under its mutex, so
/// the pair behaves as a single critical section regardless of which task
/// triggers a drain.
pub struct SegmentQueue<A: Analyzer> {
    backlog: Arc<Mutex<Backlog>>,
    analyzer: Arc<A>,
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl<A: Analyzer> Clone for SegmentQueue<A> {
    fn clone(&self) -> Self {
        Self {
            backlog: Arc::clone(&self.backlog),
            analyzer: Arc::clone(&self.analyzer),
            events: self.events.clone(),
        }
    }
}

impl<A: Analyzer> SegmentQueue<A> {
    /// Create a queue draining into `analyzer`, reporting outcomes on the
    /// returned receiver.
    pub fn new(analyzer: A) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                backlog: Arc::new(Mutex::new(Backlog {
                    segments: VecDeque::new(),
                    in_flight: false,
                })),
                analyzer: Arc::new(analyzer),
                events,
            },
            events_rx,
        )
    }

    /// Accept a finalized transcript if it clears the validity floor, then
    /// trigger a drain.
    ///
    /// Fragments shorter than [`MIN_SEGMENT_CHARS`] after trimming carry too
    /// little signal and are discarded before they ever enter the queue.
    pub fn enqueue(&self, text: &str) {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_SEGMENT_CHARS {
            tracing::debug!(chars = trimmed.chars().count(), "discarding short segment");
            return;
        }

        {
            let mut backlog = self.backlog.lock().expect("segment backlog mutex poisoned");
            backlog.segments.push_back(Segment::new(trimmed));
            tracing::debug!(depth = backlog.segments.len(), "segment enqueued");
        }
        self.drain();
    }

    /// Number of segments waiting (excludes any in-flight segment).
    pub fn depth(&self) -> usize {
        self.backlog
            .lock()
            .expect("segment backlog mutex poisoned")
            .segments
            .len()
    }

    /// Start processing if nothing is in flight.
    ///
    /// Re-entrant safe: the in-flight flag is claimed under the lock, so
    /// concurrent triggers collapse into one drain task. The task loops over
    /// the backlog instead of rescheduling itself recursively, keeping the
    /// call stack flat under bursty input.
    fn drain(&self) {
        let first = {
            let mut backlog = self.backlog.lock().expect("segment backlog mutex poisoned");
            if backlog.in_flight {
                return;
            }
            match backlog.segments.pop_front() {
                Some(segment) => {
                    backlog.in_flight = true;
                    segment
                }
                None => return,
            }
        };

        let queue = self.clone();
        tokio::spawn(async move {
            let mut segment = first;
            loop {
                let event = match queue.analyzer.analyze(&segment).await {
                    Ok(result) => QueueEvent::Analyzed { segment, result },
                    Err(e) => {
                        tracing::warn!("segment analysis failed: {e}");
                        QueueEvent::Failed {
                            segment,
                            error: e.to_string(),
                        }
                    }
                };
                let _ = queue.events.send(event);

                // Pick up work that arrived while we were busy, or release
                // the in-flight slot atomically with the emptiness check.
                let next = {
                    let mut backlog =
                        queue.backlog.lock().expect("segment backlog mutex poisoned");
                    match backlog.segments.pop_front() {
                        Some(next) => Some(next),
                        None => {
                            backlog.in_flight = false;
                            None
                        }
                    }
                };
                match next {
                    Some(next) => segment = next,
                    None => break,
                }
            }
        });
    }
}
