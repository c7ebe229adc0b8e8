//! Per-movie enrichment with trailer and review data.
//!
//! Enrichment only ever patches existing rows in `favorites`; a movie that
//! is not a favorite is left alone. Failures are logged and never raised.

mod enricher;

pub use enricher::{EnrichmentHandle, Enricher};

use serde::Serialize;

/// Which enrichment ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Trailer,
    Reviews,
}

impl EnrichmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentKind::Trailer => "trailer",
            EnrichmentKind::Reviews => "reviews",
        }
    }
}

/// What one enrichment did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    /// The row was updated and a change was emitted.
    Patched,
    /// No favorite with that movie id exists.
    NoMatchingRow,
    /// The catalog had nothing for that movie.
    NoResults,
    /// Fetch or storage failed.
    Failed(String),
    /// Cancelled before the patch.
    Cancelled,
}

impl EnrichmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Patched => "patched",
            EnrichmentOutcome::NoMatchingRow => "no_matching_row",
            EnrichmentOutcome::NoResults => "no_results",
            EnrichmentOutcome::Failed(_) => "failed",
            EnrichmentOutcome::Cancelled => "cancelled",
        }
    }
}

/// Outcomes of a combined trailer and review enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub movie_id: i64,
    pub trailer: EnrichmentOutcome,
    pub reviews: EnrichmentOutcome,
}
