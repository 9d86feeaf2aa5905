//! Merge engine
//!
//! Two halves:
//! 1. Retry - policy and error classification (pure, testable)
//! 2. Execute - perform one merge with retries and report it (effectful)

mod execute;
mod retry;

pub use execute::{ExecutionOutcome, MergeExecutor};
pub use retry::{Classifier, ErrorClass, RetryPolicy, classify, classify_status};
