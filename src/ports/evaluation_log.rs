//! Evaluation log port: append-only record of every prediction.
//!
//! This trait abstracts the storage backend (SQLite) from the application logic.

use crate::domain::Evaluation;

/// A page of evaluations with pagination metadata.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationPage {
    /// Evaluations in this page, newest first
    pub items: Vec<Evaluation>,
    /// Total count of all evaluations
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl EvaluationPage {
    #[must_use]
    pub fn new(items: Vec<Evaluation>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset.saturating_add(items.len()) < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more {
            Some(self.offset.saturating_add(self.limit))
        } else {
            None
        }
    }

    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        if self.offset > 0 {
            Some(self.offset.saturating_sub(self.limit))
        } else {
            None
        }
    }
}

/// A lazy, finite pass over the log in insertion order.
pub type EvaluationScan<'a, E> = Box<dyn Iterator<Item = Result<Evaluation, E>> + Send + 'a>;

/// Append-only evaluation storage.
///
/// Records are never updated or deleted.
pub trait EvaluationLog: Send + Sync {
    /// Error type for log operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one evaluation, returning its id.
    ///
    /// Each append is atomic: either the whole record is committed or
    /// nothing is.
    ///
    /// # Errors
    /// Returns error if the record could not be committed.
    fn append(&self, evaluation: &Evaluation) -> Result<String, Self::Error>;

    /// Start a fresh scan over every evaluation committed so far.
    ///
    /// Appends committed after the scan starts are not observed by it;
    /// calling `scan` again picks them up.
    fn scan(&self) -> EvaluationScan<'_, Self::Error>;

    /// Total number of evaluations.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count(&self) -> Result<usize, Self::Error>;

    /// Load a page of evaluations, newest first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn page(&self, offset: usize, limit: usize) -> Result<EvaluationPage, Self::Error>;
}
