//! Subject estimation — weighted averaging of noisy LLM detections with
//! exponential time decay, plus a stability score over the detection history.

mod estimator;
mod stability;

pub use estimator::{SubjectDetection, SubjectEstimator, WeightedComponent, decay_weight};
pub use stability::{ConfidenceStatus, stability_score};
