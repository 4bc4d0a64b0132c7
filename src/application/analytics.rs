//! Analytics aggregator: statistics computed fresh from the evaluation log.
//!
//! Nothing is cached; every call folds a new scan, so a summary reflects
//! the log as of the moment the scan started.

use std::sync::Arc;

use crate::domain::{BreakdownRow, Dimension, Summary, Tally};
use crate::ports::{EvaluationLog, EvaluationPage};
use crate::AgricreditError;

/// Upper bound on `page` sizes served to clients.
pub const MAX_PAGE_SIZE: usize = 100;

/// Service for read-only analytics over the evaluation log.
pub struct AnalyticsAggregator<L>
where
    L: EvaluationLog,
{
    log: Arc<L>,
}

impl<L> AnalyticsAggregator<L>
where
    L: EvaluationLog,
    L::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new aggregator over `log`.
    pub fn new(log: Arc<L>) -> Self {
        Self { log }
    }

    /// Creditworthiness summary over every evaluation.
    ///
    /// # Errors
    /// Returns a persistence error if the scan fails part-way.
    pub fn summarize(&self) -> Result<Summary, AgricreditError> {
        let mut tally = Tally::default();
        for evaluation in self.log.scan() {
            let evaluation = evaluation.map_err(|e| AgricreditError::Persistence(e.into()))?;
            tally.observe(evaluation.creditworthy);
        }

        let summary = tally.summary();
        tracing::debug!(
            "Summarized {} evaluations ({}% creditworthy)",
            summary.total,
            summary.percent_creditworthy
        );
        Ok(summary)
    }

    /// Summary per category of `dimension`, in declaration order.
    ///
    /// Categories with no evaluations are included with zero counts.
    ///
    /// # Errors
    /// Returns a persistence error if the scan fails part-way.
    pub fn breakdown(&self, dimension: Dimension) -> Result<Vec<BreakdownRow>, AgricreditError> {
        let mut rows: Vec<(&'static str, Tally)> = dimension
            .categories()
            .into_iter()
            .map(|c| (c, Tally::default()))
            .collect();

        for evaluation in self.log.scan() {
            let evaluation = evaluation.map_err(|e| AgricreditError::Persistence(e.into()))?;
            let category = dimension.category_of(&evaluation);
            if let Some((_, tally)) = rows.iter_mut().find(|(c, _)| *c == category) {
                tally.observe(evaluation.creditworthy);
            }
        }

        Ok(rows
            .into_iter()
            .map(|(category, tally)| BreakdownRow {
                category,
                summary: tally.summary(),
            })
            .collect())
    }

    /// Recent evaluations, newest first. `limit` is clamped to [`MAX_PAGE_SIZE`].
    ///
    /// # Errors
    /// Returns a persistence error if storage fails.
    pub fn recent(&self, offset: usize, limit: usize) -> Result<EvaluationPage, AgricreditError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.log
            .page(offset, limit)
            .map_err(|e| AgricreditError::Persistence(e.into()))
    }
}
