//! Errors raised while setting up a step sequence.
//!
//! Running off the end of a sequence is not an error; iteration simply ends.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Invalid initial state: {0}")]
    InvalidInitialState(String),

    #[error("State dimension mismatch. Expected {expected}, got {got}.")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Step count {steps} is too small; at least {minimum} required.")]
    InvalidStepCount { steps: usize, minimum: usize },

    #[error("Duration must be positive and finite, got {0}.")]
    InvalidDuration(f64),

    #[error("Unsupported second seed: {0}")]
    UnsupportedSeed(String),
}
