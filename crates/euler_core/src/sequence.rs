//! Lazily computed, cached step tables.
//!
//! A [`StepSequence`] owns a pre-sized table of `N` state vectors together with
//! one "computed" flag per row. Rows are filled on demand, at most once and in
//! strictly increasing index order, by an injected [`StepRule`]. Iteration state
//! lives in a separate [`Cursor`] value, so any number of consumers can walk the
//! same table; rows that are already filled are returned without touching the
//! right-hand side again.

use crate::error::SolveError;
use crate::solvers::{ForwardEuler, Leapfrog};
use crate::traits::{DynamicalSystem, Scalar, StepRule};
use crate::types::Method;
use log::{debug, trace};
use std::iter::FusedIterator;

/// Position of a consumer within a [`StepSequence`].
///
/// A fresh cursor sits on the last seed row, so the first call to
/// [`StepSequence::produce_next`] yields the first computed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    /// Index of the row most recently produced through this cursor.
    pub fn position(&self) -> usize {
        self.position
    }
}

pub struct StepSequence<T: Scalar, S, R> {
    system: S,
    rule: R,
    dim: usize,
    len: usize,
    duration: f64,
    dt: f64,
    /// Row-major, `len * dim` entries.
    values: Vec<T>,
    computed: Vec<bool>,
    /// Number of leading rows that are computed. Rows past it are never filled.
    frontier: usize,
    evaluations: usize,
}

impl<T, S> StepSequence<T, S, ForwardEuler<T>>
where
    T: Scalar,
    S: DynamicalSystem<T>,
{
    /// One-step (forward Euler) sequence seeded by `initial` at index 0.
    pub fn forward(
        system: S,
        duration: f64,
        steps: usize,
        initial: &[T],
    ) -> Result<Self, SolveError> {
        Self::new(system, duration, steps, &[initial])
    }
}

impl<T, S> StepSequence<T, S, Leapfrog<T>>
where
    T: Scalar,
    S: DynamicalSystem<T>,
{
    /// Two-step (leapfrog) sequence seeded by `initial` at index 0 and
    /// `second` at index 1.
    pub fn leapfrog(
        system: S,
        duration: f64,
        steps: usize,
        initial: &[T],
        second: &[T],
    ) -> Result<Self, SolveError> {
        Self::new(system, duration, steps, &[initial, second])
    }
}

impl<T, S, R> StepSequence<T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
    /// Builds a sequence of `steps` rows with `dt = duration / steps`.
    /// `seeds` must hold exactly `R::SEEDS` states of the system's dimension.
    pub fn new(system: S, duration: f64, steps: usize, seeds: &[&[T]]) -> Result<Self, SolveError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SolveError::InvalidDuration(duration));
        }
        let minimum = R::SEEDS.max(1);
        if steps < minimum {
            return Err(SolveError::InvalidStepCount { steps, minimum });
        }
        if seeds.len() != R::SEEDS {
            return Err(SolveError::InvalidInitialState(format!(
                "{} method needs {} seed states, got {}",
                R::METHOD.name(),
                R::SEEDS,
                seeds.len()
            )));
        }

        let dim = system.dimension();
        if dim == 0 {
            return Err(SolveError::InvalidInitialState(
                "state vectors must have at least one component".to_string(),
            ));
        }

        let mut values = vec![T::zero(); steps * dim];
        let mut computed = vec![false; steps];
        for (index, seed) in seeds.iter().enumerate() {
            if seed.len() != dim {
                return Err(SolveError::DimensionMismatch {
                    expected: dim,
                    got: seed.len(),
                });
            }
            if let Some(pos) = seed.iter().position(|v| !v.is_finite()) {
                return Err(SolveError::InvalidInitialState(format!(
                    "seed {} has a non-finite value in component {}",
                    index, pos
                )));
            }
            values[index * dim..(index + 1) * dim].copy_from_slice(seed);
            computed[index] = true;
        }

        let dt = duration / steps as f64;
        debug!(
            "Created {} sequence: {} rows of {} components, dt = {}",
            R::METHOD.name(),
            steps,
            dim,
            dt
        );

        Ok(Self {
            system,
            rule: R::with_dimension(dim),
            dim,
            len: steps,
            duration,
            dt,
            values,
            computed,
            frontier: R::SEEDS,
            evaluations: 0,
        })
    }

    /// A fresh cursor at the first valid index (0 for forward, 1 for leapfrog).
    pub fn cursor(&self) -> Cursor {
        Cursor {
            position: R::SEEDS - 1,
        }
    }

    /// Advances `cursor` by one row and returns that row, computing it (and
    /// any missing predecessors) if needed. Returns `None` once the cursor is
    /// on the last row; the cursor is then left where it was.
    pub fn produce_next(&mut self, cursor: &mut Cursor) -> Option<&[T]> {
        let next = cursor.position + 1;
        if next >= self.len {
            return None;
        }
        cursor.position = next;
        self.fill_to(next)
    }

    /// Makes sure every row up to and including `index` is computed and
    /// returns row `index`, or `None` past the end of the table.
    pub fn fill_to(&mut self, index: usize) -> Option<&[T]> {
        if index >= self.len {
            return None;
        }
        while self.frontier <= index {
            self.compute_row(self.frontier);
        }
        Some(self.row(index))
    }

    fn compute_row(&mut self, index: usize) {
        debug_assert!(index >= R::SEEDS && self.computed[index - 1] && !self.computed[index]);

        let t = index as f64 * self.dt;
        let (history, rest) = self.values.split_at_mut(index * self.dim);
        self.rule
            .advance(&self.system, history, t, self.dt, &mut rest[..self.dim]);

        self.computed[index] = true;
        self.frontier = index + 1;
        self.evaluations += 1;
        trace!("Computed row {} at t = {}", index, t);
    }

    fn row(&self, index: usize) -> &[T] {
        &self.values[index * self.dim..(index + 1) * self.dim]
    }

    /// Row `index` if it has already been computed.
    pub fn state(&self, index: usize) -> Option<&[T]> {
        if self.is_computed(index) {
            Some(self.row(index))
        } else {
            None
        }
    }

    pub fn is_computed(&self, index: usize) -> bool {
        self.computed.get(index).copied().unwrap_or(false)
    }

    /// Number of rows computed so far, seeds included.
    pub fn computed_len(&self) -> usize {
        self.frontier
    }

    pub fn is_complete(&self) -> bool {
        self.frontier == self.len
    }

    /// How many times the step rule has been applied.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn method(&self) -> Method {
        R::METHOD
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn time(&self, index: usize) -> f64 {
        index as f64 * self.dt
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.time(i)).collect()
    }

    /// Iterates over owned rows from a fresh cursor.
    pub fn steps(&mut self) -> Steps<'_, T, S, R> {
        let cursor = self.cursor();
        Steps {
            sequence: self,
            cursor,
        }
    }

    /// Computes every remaining row and returns the table transposed, one
    /// series per component. Calling it again does no further work.
    pub fn materialize(&mut self) -> Vec<Vec<T>> {
        if !self.is_complete() {
            let before = self.evaluations;
            self.fill_to(self.len - 1);
            debug!(
                "Materialized {} sequence: {} new rows",
                R::METHOD.name(),
                self.evaluations - before
            );
        }

        (0..self.dim)
            .map(|component| {
                self.values
                    .iter()
                    .skip(component)
                    .step_by(self.dim)
                    .copied()
                    .collect()
            })
            .collect()
    }
}

/// Iterator returned by [`StepSequence::steps`].
pub struct Steps<'a, T: Scalar, S, R> {
    sequence: &'a mut StepSequence<T, S, R>,
    cursor: Cursor,
}

impl<T, S, R> Steps<'_, T, S, R>
where
    T: Scalar,
{
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
}

impl<T, S, R> Iterator for Steps<'_, T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.sequence
            .produce_next(&mut self.cursor)
            .map(<[T]>::to_vec)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.len() - 1 - self.cursor.position;
        (remaining, Some(remaining))
    }
}

impl<T, S, R> ExactSizeIterator for Steps<'_, T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
}

impl<T, S, R> FusedIterator for Steps<'_, T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
}
