//! Shared domain types for the aura pipeline.
//!
//! These types cross crate boundaries: the stream client produces
//! [`TranscriptEvent`]s, the segment queue owns [`Segment`]s, the analysis
//! dispatcher returns [`SentimentResult`]s, and the session folds everything
//! into a single [`SessionEvent`] stream for the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transcript update from the recognition service.
///
/// Interim events are provisional and may be superseded by a later final
/// event for the same utterance; the consumer is responsible for
/// reconciliation, the pipeline only labels each event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            timestamp: Utc::now(),
        }
    }
}

/// A finalized transcript unit accepted into the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Derived emotional attributes, each in `[0, 1]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentAttributes {
    pub intensity: f64,
    pub energy: f64,
    pub valence: f64,
    pub complexity: f64,
}

/// Result of analyzing one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: String,
    pub score: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub attributes: SentimentAttributes,
}

/// Everything a session surfaces to its consumer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Interim or final transcript text.
    Transcript(TranscriptEvent),
    /// Sentiment analysis completed for a segment.
    Sentiment {
        segment_text: String,
        result: SentimentResult,
    },
    /// Analysis failed for one segment; the queue keeps draining.
    AnalysisFailed {
        segment_text: String,
        error: String,
    },
    /// Transport-level failure; the session must be torn down.
    Error(String),
    /// The remote service closed the connection.
    Closed,
}
