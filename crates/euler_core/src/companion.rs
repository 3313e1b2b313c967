//! Companion-form reduction of a scalar ODE of order k.
//!
//! `u^(k) = f(u, u', ..., u^(k-1), t)` becomes the first-order system
//! `x' = g(x, t)` with `g(x, t) = (x_1, ..., x_{k-1}, f(x, t))`.

use crate::error::SolveError;
use crate::sequence::StepSequence;
use crate::solution::SolutionHandle;
use crate::solvers::{ForwardEuler, Leapfrog};
use crate::traits::{DynamicalSystem, Scalar, ScalarField};
use crate::types::{Method, SolutionTable, SolveSettings};
use log::debug;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Where the leapfrog method gets its state at index 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SecondSeed<T> {
    /// Use this state verbatim. Must have one entry per derivative order.
    Explicit(Vec<T>),
    /// One forward Euler step at the same resolution.
    SameResolution,
    /// Forward Euler at `m` times the resolution, sampled after `m` fine steps.
    FinerResolution(NonZeroUsize),
}

impl<T> Default for SecondSeed<T> {
    fn default() -> Self {
        SecondSeed::SameResolution
    }
}

pub type ForwardSolution<T, F> = SolutionHandle<T, CompanionSystem<T, F>, ForwardEuler<T>>;
pub type LeapfrogSolution<T, F> = SolutionHandle<T, CompanionSystem<T, F>, Leapfrog<T>>;

/// A scalar ODE of order `k` with its `k` initial values.
///
/// Immutable once built. Every solve clones the system (the right-hand side
/// is shared behind an `Arc`) into a fresh sequence, so solves never share a
/// table.
pub struct CompanionSystem<T: Scalar, F> {
    rhs: Arc<F>,
    initials: Vec<T>,
}

impl<T: Scalar, F> Clone for CompanionSystem<T, F> {
    fn clone(&self) -> Self {
        Self {
            rhs: Arc::clone(&self.rhs),
            initials: self.initials.clone(),
        }
    }
}

impl<T, F> CompanionSystem<T, F>
where
    T: Scalar,
    F: ScalarField<T>,
{
    pub fn new(rhs: F, initials: Vec<T>) -> Result<Self, SolveError> {
        if initials.is_empty() {
            return Err(SolveError::InvalidInitialState(
                "at least one initial value is required".to_string(),
            ));
        }
        if let Some(pos) = initials.iter().position(|v| !v.is_finite()) {
            return Err(SolveError::InvalidInitialState(format!(
                "initial value for derivative order {} is not finite",
                pos
            )));
        }
        if let Some(expected) = rhs.order() {
            if expected != initials.len() {
                return Err(SolveError::DimensionMismatch {
                    expected,
                    got: initials.len(),
                });
            }
        }
        Ok(Self {
            rhs: Arc::new(rhs),
            initials,
        })
    }

    /// Order of the ODE, i.e. the length of every state vector.
    pub fn order(&self) -> usize {
        self.initials.len()
    }

    pub fn initials(&self) -> &[T] {
        &self.initials
    }

    pub fn rhs(&self) -> &F {
        &self.rhs
    }

    /// The companion vector field `g(state, t)` as an owned vector.
    pub fn derivative(&self, state: &[T], t: f64) -> Result<Vec<T>, SolveError> {
        if state.len() != self.order() {
            return Err(SolveError::DimensionMismatch {
                expected: self.order(),
                got: state.len(),
            });
        }
        let mut out = vec![T::zero(); state.len()];
        self.apply(t, state, &mut out);
        Ok(out)
    }

    /// Forward Euler over `duration` in `steps` rows.
    pub fn solve_one_step(
        &self,
        duration: f64,
        steps: usize,
    ) -> Result<ForwardSolution<T, F>, SolveError> {
        let sequence = StepSequence::forward(self.clone(), duration, steps, &self.initials)?;
        Ok(SolutionHandle::new(sequence))
    }

    /// Leapfrog over `duration` in `steps` rows, with the state at index 1
    /// resolved from `seed`.
    pub fn solve_two_step(
        &self,
        duration: f64,
        steps: usize,
        seed: SecondSeed<T>,
    ) -> Result<LeapfrogSolution<T, F>, SolveError> {
        if steps < 2 {
            return Err(SolveError::InvalidStepCount { steps, minimum: 2 });
        }
        let second = self.resolve_seed(duration, steps, seed)?;
        let sequence =
            StepSequence::leapfrog(self.clone(), duration, steps, &self.initials, &second)?;
        Ok(SolutionHandle::new(sequence))
    }

    fn resolve_seed(
        &self,
        duration: f64,
        steps: usize,
        seed: SecondSeed<T>,
    ) -> Result<Vec<T>, SolveError> {
        match seed {
            SecondSeed::Explicit(state) => {
                if state.len() != self.order() {
                    return Err(SolveError::DimensionMismatch {
                        expected: self.order(),
                        got: state.len(),
                    });
                }
                debug!("Leapfrog seed supplied explicitly");
                Ok(state)
            }
            SecondSeed::SameResolution => {
                let mut forward = self.solve_one_step(duration, steps)?;
                let mut cursor = forward.cursor();
                let state = forward
                    .produce_next(&mut cursor)
                    .ok_or(SolveError::InvalidStepCount { steps, minimum: 2 })?
                    .to_vec();
                debug!("Leapfrog seed from one forward step at {} rows", steps);
                Ok(state)
            }
            SecondSeed::FinerResolution(multiplier) => {
                let m = multiplier.get();
                let fine_steps = steps.checked_mul(m).ok_or_else(|| {
                    SolveError::UnsupportedSeed(format!(
                        "resolution multiplier {} overflows {} steps",
                        m, steps
                    ))
                })?;
                let mut forward = self.solve_one_step(duration, fine_steps)?;
                let state = forward
                    .fill_to(m)
                    .ok_or(SolveError::InvalidStepCount {
                        steps: fine_steps,
                        minimum: m + 1,
                    })?
                    .to_vec();
                debug!(
                    "Leapfrog seed from {} forward steps at {} rows",
                    m, fine_steps
                );
                Ok(state)
            }
        }
    }

    /// Solves eagerly and returns the full table.
    pub fn solve(
        &self,
        method: Method,
        settings: &SolveSettings,
        seed: SecondSeed<T>,
    ) -> Result<SolutionTable<T>, SolveError> {
        settings.validate()?;
        match method {
            Method::Forward => Ok(self
                .solve_one_step(settings.duration, settings.steps)?
                .table()),
            Method::Leapfrog => Ok(self
                .solve_two_step(settings.duration, settings.steps, seed)?
                .table()),
        }
    }
}

impl<T, F> DynamicalSystem<T> for CompanionSystem<T, F>
where
    T: Scalar,
    F: ScalarField<T>,
{
    fn dimension(&self) -> usize {
        self.initials.len()
    }

    fn apply(&self, t: f64, x: &[T], out: &mut [T]) {
        let k = x.len();
        out[..k - 1].copy_from_slice(&x[1..]);
        out[k - 1] = self.rhs.evaluate(x, t);
    }
}

#[cfg(test)]
mod tests {
    use super::{CompanionSystem, SecondSeed};
    use crate::error::SolveError;
    use crate::expression::{state_names, ExpressionRhs};
    use crate::traits::DynamicalSystem;
    use crate::types::{Method, SolveSettings};
    use num_complex::Complex;
    use std::cell::Cell;
    use std::num::NonZeroUsize;

    const A: f64 = 3.13;

    fn oscillator() -> CompanionSystem<f64, impl Fn(&[f64], f64) -> f64> {
        CompanionSystem::new(|u: &[f64], _t: f64| -u[0], vec![A, 0.0]).expect("system")
    }

    fn max_error(values: &[f64], dt: f64) -> f64 {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (v - A * (i as f64 * dt).cos()).abs())
            .fold(0.0, f64::max)
    }

    fn multiplier(m: usize) -> SecondSeed<f64> {
        SecondSeed::FinerResolution(NonZeroUsize::new(m).expect("non-zero"))
    }

    #[test]
    fn companion_field_shifts_and_appends_rhs() {
        let system = CompanionSystem::new(
            |u: &[f64], t: f64| u[0] + 10.0 * u[2] + t,
            vec![0.0, 0.0, 0.0],
        )
        .expect("system");
        let state = [1.0, 2.0, 3.0];
        let g = system.derivative(&state, 0.5).expect("derivative");
        assert_eq!(g, vec![2.0, 3.0, 31.5]);
        assert_eq!(system.dimension(), 3);
    }

    #[test]
    fn first_order_companion_is_the_rhs_itself() {
        let system = CompanionSystem::new(|u: &[f64], _t: f64| 2.0 * u[0], vec![1.0])
            .expect("system");
        assert_eq!(system.derivative(&[4.0], 0.0), Ok(vec![8.0]));
    }

    #[test]
    fn derivative_rejects_wrong_state_length() {
        let system = oscillator();
        assert_eq!(
            system.derivative(&[], 0.0),
            Err(SolveError::DimensionMismatch {
                expected: 2,
                got: 0
            })
        );
        assert_eq!(
            system.derivative(&[1.0, 2.0, 3.0], 0.0),
            Err(SolveError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
    }

    #[test]
    fn construction_rejects_rhs_of_another_order() {
        let rhs = ExpressionRhs::compile("-u", &state_names(3), &[], vec![]).expect("rhs");
        let result = CompanionSystem::new(rhs, vec![1.0, 0.0]);
        assert!(matches!(
            result,
            Err(SolveError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));

        let rhs = ExpressionRhs::compile("-u", &state_names(2), &[], vec![]).expect("rhs");
        let system = CompanionSystem::new(rhs, vec![1.0, 0.0]).expect("system");
        assert_eq!(system.derivative(&[1.0, 0.5], 0.0), Ok(vec![0.5, -1.0]));
    }

    #[test]
    fn construction_rejects_bad_initials() {
        let empty = CompanionSystem::new(|_: &[f64], _t: f64| 0.0, Vec::new());
        assert!(matches!(empty.err(), Some(SolveError::InvalidInitialState(_))));

        let nan = CompanionSystem::new(|_: &[f64], _t: f64| 0.0, vec![1.0, f64::INFINITY]);
        let message = nan.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("order 1"), "got \"{message}\"");
    }

    #[test]
    fn one_step_first_row_is_a_forward_step() {
        let system = oscillator();
        let mut solution = system.solve_one_step(20.0, 20).expect("solution");
        let mut cursor = solution.cursor();
        let row = solution.produce_next(&mut cursor).expect("row");
        assert_eq!(row, &[A, -A]);
    }

    #[test]
    fn same_resolution_seed_is_one_forward_step() {
        let system = oscillator();
        let solution = system
            .solve_two_step(20.0, 40, SecondSeed::SameResolution)
            .expect("solution");
        assert_eq!(solution.sequence().state(1), Some(&[A, -0.5 * A][..]));
    }

    #[test]
    fn finer_resolution_seed_samples_after_m_fine_steps() {
        let system = oscillator();
        let mut fine = system.solve_one_step(20.0, 80).expect("fine");
        let expected = fine.fill_to(2).expect("row").to_vec();

        let solution = system.solve_two_step(20.0, 40, multiplier(2)).expect("solution");
        assert_eq!(solution.sequence().state(1), Some(expected.as_slice()));
        // two quarter steps: [A, -A/4] then [A - A/16, -A/2]
        assert!((expected[0] - (A - A / 16.0)).abs() < 1e-12);
        assert!((expected[1] + A / 2.0).abs() < 1e-12);
    }

    #[test]
    fn multiplier_one_matches_same_resolution() {
        let system = oscillator();
        let mut a = system.solve_two_step(20.0, 40, multiplier(1)).expect("a");
        let mut b = system
            .solve_two_step(20.0, 40, SecondSeed::SameResolution)
            .expect("b");
        assert_eq!(a.array(), b.array());
    }

    #[test]
    fn explicit_seed_is_used_verbatim() {
        let system = oscillator();
        let seed = vec![1.0, 2.0];
        let solution = system
            .solve_two_step(20.0, 40, SecondSeed::Explicit(seed.clone()))
            .expect("solution");
        assert_eq!(solution.sequence().state(1), Some(seed.as_slice()));
    }

    #[test]
    fn explicit_seed_must_match_order() {
        let system = oscillator();
        let result = system.solve_two_step(20.0, 40, SecondSeed::Explicit(vec![1.0]));
        assert_eq!(
            result.err(),
            Some(SolveError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );

        let result = system.solve_two_step(20.0, 40, SecondSeed::Explicit(vec![1.0, f64::NAN]));
        assert!(matches!(result.err(), Some(SolveError::InvalidInitialState(_))));
    }

    #[test]
    fn two_step_needs_two_rows() {
        let system = oscillator();
        for seed in [SecondSeed::SameResolution, multiplier(3)] {
            assert_eq!(
                system.solve_two_step(20.0, 1, seed).err(),
                Some(SolveError::InvalidStepCount {
                    steps: 1,
                    minimum: 2
                })
            );
        }
    }

    #[test]
    fn oversized_multiplier_is_rejected() {
        let system = oscillator();
        let result = system.solve_two_step(20.0, 4, multiplier(usize::MAX));
        assert!(matches!(result.err(), Some(SolveError::UnsupportedSeed(_))));
    }

    #[test]
    fn leapfrog_converges_at_second_order() {
        let system = oscillator();
        let coarse = system
            .solve_two_step(20.0, 80, SecondSeed::SameResolution)
            .expect("coarse")
            .result();
        let fine = system
            .solve_two_step(20.0, 160, SecondSeed::SameResolution)
            .expect("fine")
            .result();

        let coarse_error = max_error(&coarse, 0.25);
        let fine_error = max_error(&fine, 0.125);
        let ratio = coarse_error / fine_error;
        assert!(coarse_error < 1.0, "coarse error {coarse_error}");
        assert!(ratio > 3.5 && ratio < 4.5, "ratio {ratio}");
    }

    #[test]
    fn forward_euler_converges_at_first_order() {
        let system = oscillator();
        let coarse = system.solve_one_step(20.0, 2000).expect("coarse").result();
        let fine = system.solve_one_step(20.0, 4000).expect("fine").result();

        let ratio = max_error(&coarse, 0.01) / max_error(&fine, 0.005);
        assert!(ratio > 1.8 && ratio < 2.3, "ratio {ratio}");
    }

    #[test]
    fn leapfrog_beats_forward_at_equal_cost() {
        let system = oscillator();
        let leapfrog = system
            .solve_two_step(20.0, 100, SecondSeed::SameResolution)
            .expect("leapfrog")
            .result();
        let forward = system.solve_one_step(20.0, 100).expect("forward").result();
        assert!(max_error(&leapfrog, 0.2) < max_error(&forward, 0.2));
    }

    #[test]
    fn stability_boundary_run_stays_finite_and_bounded() {
        // dt = 1 puts the leapfrog oscillator exactly on its stability
        // boundary: the amplitude drifts linearly instead of blowing up.
        let system = oscillator();
        let values = system
            .solve_two_step(20.0, 20, SecondSeed::SameResolution)
            .expect("solution")
            .result();
        assert_eq!(values.len(), 20);
        assert!(values.iter().all(|v| v.is_finite()));
        assert!(values.iter().all(|v| v.abs() < 25.0 * A));
    }

    #[test]
    fn solves_do_not_share_tables() {
        let calls = Cell::new(0usize);
        let system = CompanionSystem::new(
            |u: &[f64], _t: f64| {
                calls.set(calls.get() + 1);
                -u[0]
            },
            vec![1.0, 0.0],
        )
        .expect("system");

        let mut first = system.solve_one_step(1.0, 10).expect("first");
        first.array();
        assert_eq!(calls.get(), 9);

        let mut second = system.solve_one_step(1.0, 10).expect("second");
        assert_eq!(second.sequence().computed_len(), 1);
        second.array();
        assert_eq!(calls.get(), 18);
        assert_eq!(first.array(), second.array());
        assert_eq!(calls.get(), 18);
    }

    #[test]
    fn rhs_is_never_called_twice_for_a_row() {
        let calls = Cell::new(0usize);
        let system = CompanionSystem::new(
            |u: &[f64], _t: f64| {
                calls.set(calls.get() + 1);
                -u[0]
            },
            vec![A, 0.0],
        )
        .expect("system");

        let mut solution = system
            .solve_two_step(5.0, 50, SecondSeed::SameResolution)
            .expect("solution");
        // resolving the seed took one forward step
        assert_eq!(calls.get(), 1);

        let partial: Vec<Vec<f64>> = solution.steps().take(10).collect();
        assert_eq!(partial.len(), 10);
        assert_eq!(calls.get(), 11);

        let all: Vec<Vec<f64>> = solution.steps().collect();
        assert_eq!(all.len(), 48);
        assert_eq!(calls.get(), 49);

        solution.array();
        solution.array();
        assert_eq!(calls.get(), 49);
    }

    #[test]
    fn complex_valued_odes_are_supported() {
        // u' = i u, u(0) = 1 -> u(t) = exp(i t)
        let system = CompanionSystem::new(
            |u: &[Complex<f64>], _t: f64| Complex::new(0.0, 1.0) * u[0],
            vec![Complex::new(1.0, 0.0)],
        )
        .expect("system");
        let values = system
            .solve_two_step(1.0, 1000, SecondSeed::SameResolution)
            .expect("solution")
            .result();
        let last = values[values.len() - 1];
        let t: f64 = 999.0 / 1000.0;
        assert!((last - Complex::new(t.cos(), t.sin())).norm() < 1e-4);
    }

    #[test]
    fn solve_dispatches_on_method() {
        let system = oscillator();
        let settings = SolveSettings::new(20.0, 40);

        let table = system
            .solve(Method::Leapfrog, &settings, SecondSeed::default())
            .expect("table");
        assert_eq!(table.method, Method::Leapfrog);
        assert_eq!(table.len(), 40);
        assert_eq!(table.components.len(), 2);
        assert_eq!(table.dt, 0.5);

        let table = system
            .solve(Method::Forward, &settings, SecondSeed::default())
            .expect("table");
        assert_eq!(table.method, Method::Forward);
        assert_eq!(table.times[1], 0.5);

        let bad = system.solve(Method::Forward, &SolveSettings::new(-1.0, 4), SecondSeed::default());
        assert_eq!(bad.err(), Some(SolveError::InvalidDuration(-1.0)));
    }
}
