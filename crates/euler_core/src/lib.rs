//! The `euler_core` crate integrates scalar ODEs of any order with two explicit
//! finite-difference schemes, forward Euler and leapfrog, over a fixed number of
//! fixed-size steps.
//!
//! Key components:
//! - **Traits**: `Scalar` (real or complex state entries), `DynamicalSystem` (vector ODEs),
//!   `ScalarField` (the order-k right-hand side), `StepRule` (update formulas).
//! - **StepSequence**: a lazily filled, cached, restartable table of states walked with cursors.
//! - **CompanionSystem**: reduces `u^(k) = f(u, ..., u^(k-1), t)` to a first-order system and
//!   resolves the leapfrog method's second seed.
//! - **SolutionHandle**: lazy or eager access to a solve, as rows, series, matrices or tables.
//! - **Expression**: a compiler for right-hand sides written as text.

pub mod companion;
pub mod error;
pub mod expression;
pub mod sequence;
pub mod solution;
pub mod solvers;
pub mod traits;
pub mod types;

pub use companion::{CompanionSystem, SecondSeed};
pub use error::SolveError;
pub use sequence::{Cursor, StepSequence};
pub use solution::SolutionHandle;
pub use types::{Method, SolutionTable, SolveSettings};
