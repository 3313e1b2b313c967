use crate::types::Method;
use num_complex::Complex;
use num_traits::{Float, FromPrimitive, Num};
use std::fmt::Debug;

/// A trait for types that can be stored in a state vector.
/// Real and complex floats both qualify; time is always a real `f64`.
pub trait Scalar: Num + Copy + Debug + PartialEq + 'static {
    /// Lifts a real number (a step size, a time) into the scalar type.
    fn from_real(value: f64) -> Self;

    /// Returns false for NaN or infinite values (in any component).
    fn is_finite(self) -> bool;
}

impl Scalar for f64 {
    fn from_real(value: f64) -> Self {
        value
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

impl Scalar for f32 {
    fn from_real(value: f64) -> Self {
        value as f32
    }

    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

impl<R> Scalar for Complex<R>
where
    R: Float + FromPrimitive + Debug + 'static,
{
    fn from_real(value: f64) -> Self {
        Complex::new(R::from_f64(value).unwrap_or_else(R::nan), R::zero())
    }

    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Represents a first-order vector ODE `x' = g(x, t)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt
    fn apply(&self, t: f64, x: &[T], out: &mut [T]);
}

impl<T: Scalar, S: DynamicalSystem<T> + ?Sized> DynamicalSystem<T> for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: f64, x: &[T], out: &mut [T]) {
        (**self).apply(t, x, out)
    }
}

/// The right-hand side of a scalar ODE of order k:
/// `u^(k) = f(u, u', ..., u^(k-1), t)`.
pub trait ScalarField<T> {
    fn evaluate(&self, state: &[T], t: f64) -> T;

    /// The state length this field was built for, if it is fixed.
    /// Closures accept any order and return `None`.
    fn order(&self) -> Option<usize> {
        None
    }
}

impl<T, F> ScalarField<T> for F
where
    F: Fn(&[T], f64) -> T,
{
    fn evaluate(&self, state: &[T], t: f64) -> T {
        self(state, t)
    }
}

/// An explicit finite-difference update rule.
///
/// A rule sees the already-computed history of the table (row-major, one row
/// per time index) and writes the next row into `out`.
pub trait StepRule<T: Scalar> {
    /// Number of seed rows the rule needs before it can produce anything.
    const SEEDS: usize;

    /// The method this rule implements.
    const METHOD: Method;

    /// Builds the rule with scratch space for `dim` components.
    fn with_dimension(dim: usize) -> Self
    where
        Self: Sized;

    /// Computes the row following `history` at time `t`.
    /// `history.len()` is a multiple of `out.len()` holding at least `SEEDS` rows.
    fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        history: &[T],
        t: f64,
        dt: f64,
        out: &mut [T],
    );
}

#[cfg(test)]
mod tests {
    use super::{Scalar, ScalarField};
    use num_complex::Complex;

    #[test]
    fn complex_finiteness_checks_both_parts() {
        assert!(Scalar::is_finite(Complex::new(1.0_f64, -2.0)));
        assert!(!Scalar::is_finite(Complex::new(f64::NAN, 0.0)));
        assert!(!Scalar::is_finite(Complex::new(0.0_f64, f64::INFINITY)));
        assert!(!Scalar::is_finite(Complex::new(f32::NEG_INFINITY, 1.0)));
    }

    #[test]
    fn complex_from_real_has_zero_imaginary_part() {
        let z: Complex<f64> = Scalar::from_real(2.5);
        assert_eq!(z, Complex::new(2.5, 0.0));
    }

    #[test]
    fn closures_accept_any_order() {
        let f = |u: &[f64], _t: f64| u[0];
        assert_eq!(ScalarField::<f64>::order(&f), None);
        assert_eq!(f.evaluate(&[3.0], 0.0), 3.0);
    }
}
