//! Analysis agents.
//!
//! Each agent implements a narrow capability contract: a name, the
//! stages it depends on, and a `run` that turns its input into a tagged
//! stage payload. The orchestrator knows nothing beyond this seam, so
//! agents stay independently testable and the coupling stays one-way.

pub mod classifier;
pub mod comparison;
pub mod risk;
pub mod ruc;
pub mod validator;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{ClassificationResult, Document, Fragment, StageData, StageName};
use crate::pipeline::context::AnalysisContext;
use crate::pipeline::embedding::EmbeddingError;
use crate::pipeline::vectorstore::VectorStoreError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("Stage timed out")]
    Timeout,

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl AgentError {
    /// Fatal errors terminate the run outright instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Embedding(EmbeddingError::DimensionMismatch { .. })
                | AgentError::VectorStore(VectorStoreError::DimensionMismatch { .. })
        )
    }
}

/// Everything an agent may read for one run.
pub struct StageInput<'a> {
    pub document: &'a Document,
    pub run_id: &'a str,
    pub text: &'a str,
    pub fragments: &'a [Fragment],
    pub classification: Option<&'a ClassificationResult>,
    /// Date captured at run start; date coherence checks compare
    /// against this, never against the wall clock.
    pub reference_date: NaiveDate,
}

impl<'a> StageInput<'a> {
    pub fn classification(&self) -> Result<&'a ClassificationResult, AgentError> {
        self.classification
            .ok_or(AgentError::MissingInput("classification result"))
    }
}

/// Cancellation flag shared between the orchestrator and its stages.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-stage control block: cancel signal, wall-clock deadline and the
/// fragment progress counters the status API reads.
pub struct StageSignal {
    cancel: CancelToken,
    deadline: Option<Instant>,
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl StageSignal {
    pub fn new(cancel: CancelToken, deadline: Option<Instant>) -> Self {
        Self {
            cancel,
            deadline,
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CancelToken::new(), None)
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Cooperative suspension point. Agents call this between fragments;
    /// it records progress and surfaces cancellation or timeout.
    pub fn checkpoint(&self, completed: usize) -> Result<(), AgentError> {
        self.completed.store(completed, Ordering::Relaxed);
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AgentError::Timeout);
            }
        }
        Ok(())
    }

    /// Completed-fragment ratio in [0, 1].
    pub fn progress(&self) -> f32 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let completed = self.completed.load(Ordering::Relaxed).min(total);
        completed as f32 / total as f32
    }
}

/// The capability contract every analysis agent implements.
pub trait AnalysisAgent: Send + Sync {
    fn name(&self) -> StageName;

    /// Stages whose output must be present in the input.
    fn requires(&self) -> &'static [StageName];

    fn run(
        &self,
        ctx: &AnalysisContext,
        input: &StageInput<'_>,
        signal: &StageSignal,
    ) -> Result<StageData, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let token = CancelToken::new();
        let signal = StageSignal::new(token.clone(), None);
        signal.set_total(10);
        assert!(signal.checkpoint(3).is_ok());
        token.cancel();
        assert!(matches!(signal.checkpoint(4), Err(AgentError::Cancelled)));
    }

    #[test]
    fn checkpoint_reports_timeout() {
        let signal = StageSignal::new(CancelToken::new(), Some(Instant::now() - Duration::from_millis(1)));
        assert!(matches!(signal.checkpoint(0), Err(AgentError::Timeout)));
    }

    #[test]
    fn progress_is_ratio_of_completed() {
        let signal = StageSignal::unbounded();
        signal.set_total(4);
        signal.checkpoint(1).unwrap();
        assert!((signal.progress() - 0.25).abs() < 1e-6);
        signal.checkpoint(4).unwrap();
        assert!((signal.progress() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn progress_with_no_total_is_zero() {
        let signal = StageSignal::unbounded();
        assert_eq!(signal.progress(), 0.0);
    }
}
