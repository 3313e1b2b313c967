//! Uniform access to the output of either step method.

use crate::sequence::{Cursor, StepSequence, Steps};
use crate::traits::{DynamicalSystem, Scalar, StepRule};
use crate::types::{Method, SolutionTable};
use nalgebra::DMatrix;

/// Result of a solve, bound to the sequence that computes it.
///
/// Nothing is computed up front. Rows are produced as they are pulled,
/// through a cursor or the [`steps`](Self::steps) iterator, or all at once by
/// [`array`](Self::array), [`result`](Self::result) and friends.
pub struct SolutionHandle<T: Scalar, S, R> {
    sequence: StepSequence<T, S, R>,
}

impl<T, S, R> SolutionHandle<T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
    pub fn new(sequence: StepSequence<T, S, R>) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> &StepSequence<T, S, R> {
        &self.sequence
    }

    pub fn into_sequence(self) -> StepSequence<T, S, R> {
        self.sequence
    }

    pub fn method(&self) -> Method {
        R::METHOD
    }

    pub fn cursor(&self) -> Cursor {
        self.sequence.cursor()
    }

    pub fn produce_next(&mut self, cursor: &mut Cursor) -> Option<&[T]> {
        self.sequence.produce_next(cursor)
    }

    pub fn fill_to(&mut self, index: usize) -> Option<&[T]> {
        self.sequence.fill_to(index)
    }

    pub fn steps(&mut self) -> Steps<'_, T, S, R> {
        self.sequence.steps()
    }

    pub fn times(&self) -> Vec<f64> {
        self.sequence.times()
    }

    /// Full table, one series per derivative order.
    pub fn array(&mut self) -> Vec<Vec<T>> {
        self.sequence.materialize()
    }

    /// The series of `u(t)` alone.
    pub fn result(&mut self) -> Vec<T> {
        self.array().into_iter().next().unwrap_or_default()
    }

    /// Full table as a matrix: row j is derivative order j, column i is time index i.
    pub fn to_matrix(&mut self) -> DMatrix<T> {
        let components = self.array();
        DMatrix::from_fn(components.len(), self.sequence.len(), |r, c| {
            components[r][c]
        })
    }

    pub fn table(&mut self) -> SolutionTable<T> {
        SolutionTable {
            method: R::METHOD,
            dt: self.sequence.dt(),
            times: self.sequence.times(),
            components: self.array(),
        }
    }
}

impl<'a, T, S, R> IntoIterator for &'a mut SolutionHandle<T, S, R>
where
    T: Scalar,
    S: DynamicalSystem<T>,
    R: StepRule<T>,
{
    type Item = Vec<T>;
    type IntoIter = Steps<'a, T, S, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps()
    }
}
