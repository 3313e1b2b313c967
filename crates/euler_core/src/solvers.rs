use crate::traits::{DynamicalSystem, Scalar, StepRule};
use crate::types::Method;

/// Forward (explicit) Euler rule
/// x_i = x_{i-1} + dt * g(x_{i-1}, i*dt)
pub struct ForwardEuler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> ForwardEuler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> StepRule<T> for ForwardEuler<T> {
    const SEEDS: usize = 1;
    const METHOD: Method = Method::Forward;

    fn with_dimension(dim: usize) -> Self {
        Self::new(dim)
    }

    fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        history: &[T],
        t: f64,
        dt: f64,
        out: &mut [T],
    ) {
        let dim = out.len();
        let previous = &history[history.len() - dim..];

        system.apply(t, previous, &mut self.deriv);

        let dt = T::from_real(dt);
        for i in 0..dim {
            out[i] = previous[i] + dt * self.deriv[i];
        }
    }
}

/// Leapfrog (central difference over two steps) rule
/// x_i = x_{i-2} + 2*dt * g(x_{i-1}, i*dt)
/// Needs two seed rows; the second usually comes from a forward step.
pub struct Leapfrog<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> Leapfrog<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> StepRule<T> for Leapfrog<T> {
    const SEEDS: usize = 2;
    const METHOD: Method = Method::Leapfrog;

    fn with_dimension(dim: usize) -> Self {
        Self::new(dim)
    }

    fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        history: &[T],
        t: f64,
        dt: f64,
        out: &mut [T],
    ) {
        let dim = out.len();
        let rows = history.len() / dim;
        let previous = &history[(rows - 1) * dim..];
        let before_previous = &history[(rows - 2) * dim..(rows - 1) * dim];

        system.apply(t, previous, &mut self.deriv);

        let two_dt = T::from_real(2.0 * dt);
        for i in 0..dim {
            out[i] = before_previous[i] + two_dt * self.deriv[i];
        }
    }
}
