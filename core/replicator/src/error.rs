// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicateError {
    /// An observable does not have the width the formula requires.
    #[error("observable {index} is {actual} bytes, expected {expected}")]
    MalformedInput {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("formula reads observable {index} but only {available} were supplied")]
    MissingObservable { index: usize, available: usize },

    #[error("invalid formula at step {step}: {reason}")]
    InvalidFormula { step: usize, reason: String },

    /// The value read for `block` is no longer what the contract sees at `head`.
    #[error("observable for block {block} is stale at block {head}")]
    StaleObservable { block: u64, head: u64 },
}
