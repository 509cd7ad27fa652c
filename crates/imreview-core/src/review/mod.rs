//! Reviews and their aggregation
//!
//! A review is either a pending assignment or a completed assessment. The
//! aggregator turns the full review set of a manuscript into its status.

mod aggregator;
#[allow(clippy::module_inception)]
mod review;

pub use aggregator::{aggregate, recompute, Verdict};
pub use review::{
    Assessment, Recommendation, Review, ReviewBody, ReviewChanges, ReviewSubmission, Score,
    PENDING,
};
