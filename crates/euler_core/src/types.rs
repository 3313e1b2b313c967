//! Settings and result types shared by the engine and its bindings.

use crate::error::SolveError;
use serde::{Deserialize, Serialize};

/// Which explicit scheme produced (or should produce) a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Forward,
    Leapfrog,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Forward => "forward",
            Method::Leapfrog => "leapfrog",
        }
    }
}

/// Total duration and step count of a solve. `dt = duration / steps`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveSettings {
    pub duration: f64,
    pub steps: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            duration: 10.0,
            steps: 1000,
        }
    }
}

impl SolveSettings {
    pub fn new(duration: f64, steps: usize) -> Self {
        Self { duration, steps }
    }

    pub fn dt(&self) -> f64 {
        self.duration / self.steps as f64
    }

    pub fn validate(&self) -> Result<(), SolveError> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(SolveError::InvalidDuration(self.duration));
        }
        if self.steps == 0 {
            return Err(SolveError::InvalidStepCount {
                steps: self.steps,
                minimum: 1,
            });
        }
        Ok(())
    }
}

/// A fully materialized solution, one series per state component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionTable<T> {
    pub method: Method,
    pub dt: f64,
    /// Time coordinate of every sample, `i * dt`.
    pub times: Vec<f64>,
    /// `components[j][i]` is the j-th derivative order at time index i.
    pub components: Vec<Vec<T>>,
}

impl<T: Copy> SolutionTable<T> {
    /// The quantity of interest `u(t)`.
    pub fn result(&self) -> &[T] {
        self.components.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Method, SolutionTable, SolveSettings};
    use crate::error::SolveError;

    #[test]
    fn settings_validation_rejects_bad_inputs() {
        assert_eq!(
            SolveSettings::new(0.0, 10).validate(),
            Err(SolveError::InvalidDuration(0.0))
        );
        assert!(SolveSettings::new(f64::NAN, 10).validate().is_err());
        assert_eq!(
            SolveSettings::new(1.0, 0).validate(),
            Err(SolveError::InvalidStepCount {
                steps: 0,
                minimum: 1
            })
        );
        assert!(SolveSettings::new(20.0, 20).validate().is_ok());
    }

    #[test]
    fn settings_dt_divides_duration() {
        assert_eq!(SolveSettings::new(20.0, 40).dt(), 0.5);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings: SolveSettings =
            serde_json::from_str(r#"{"duration": 2.5, "steps": 5}"#).expect("settings");
        assert_eq!(settings, SolveSettings::new(2.5, 5));
    }

    #[test]
    fn method_serializes_lowercase() {
        let json = serde_json::to_string(&Method::Leapfrog).expect("serialize");
        assert_eq!(json, "\"leapfrog\"");
        let method: Method = serde_json::from_str("\"forward\"").expect("deserialize");
        assert_eq!(method, Method::Forward);
    }

    #[test]
    fn table_result_is_first_component() {
        let table = SolutionTable {
            method: Method::Forward,
            dt: 1.0,
            times: vec![0.0, 1.0],
            components: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        };
        assert_eq!(table.result(), &[1.0, 2.0]);
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }
}
