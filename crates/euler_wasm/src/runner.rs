//! Stepped solve runner.
//!
//! Lets the front-end pull a solution in batches (for progress reporting or
//! live plotting) instead of materializing it in one call.

use crate::system::{build_system, parse_method, parse_seed, parse_settings};
use euler_core::companion::{ForwardSolution, LeapfrogSolution};
use euler_core::expression::ExpressionRhs;
use euler_core::{Cursor, Method, SolutionTable};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

enum RunnerSolution {
    Forward(ForwardSolution<f64, ExpressionRhs>),
    Leapfrog(LeapfrogSolution<f64, ExpressionRhs>),
}

impl RunnerSolution {
    fn cursor(&self) -> Cursor {
        match self {
            RunnerSolution::Forward(s) => s.cursor(),
            RunnerSolution::Leapfrog(s) => s.cursor(),
        }
    }

    fn produce_next(&mut self, cursor: &mut Cursor) -> bool {
        match self {
            RunnerSolution::Forward(s) => s.produce_next(cursor).is_some(),
            RunnerSolution::Leapfrog(s) => s.produce_next(cursor).is_some(),
        }
    }

    fn state(&self, index: usize) -> Vec<f64> {
        let state = match self {
            RunnerSolution::Forward(s) => s.sequence().state(index),
            RunnerSolution::Leapfrog(s) => s.sequence().state(index),
        };
        state.map(<[f64]>::to_vec).unwrap_or_default()
    }

    fn len(&self) -> usize {
        match self {
            RunnerSolution::Forward(s) => s.sequence().len(),
            RunnerSolution::Leapfrog(s) => s.sequence().len(),
        }
    }

    fn time(&self, index: usize) -> f64 {
        match self {
            RunnerSolution::Forward(s) => s.sequence().time(index),
            RunnerSolution::Leapfrog(s) => s.sequence().time(index),
        }
    }

    fn table(&mut self) -> SolutionTable<f64> {
        match self {
            RunnerSolution::Forward(s) => s.table(),
            RunnerSolution::Leapfrog(s) => s.table(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct StepProgress {
    /// Rows delivered through the cursor so far, seeds included.
    computed: usize,
    total: usize,
    done: bool,
    time: f64,
    state: Vec<f64>,
}

/// WASM-exported runner for incremental solves.
#[wasm_bindgen]
pub struct WasmStepRunner {
    solution: Option<RunnerSolution>,
    cursor: Cursor,
}

#[wasm_bindgen]
impl WasmStepRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: &str,
        var_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        initials: Vec<f64>,
        method: &str,
        settings_val: JsValue,
        seed: JsValue,
    ) -> Result<WasmStepRunner, JsValue> {
        console_error_panic_hook::set_once();

        let system = build_system(expression, &var_names, &param_names, params, initials)
            .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        let method = parse_method(method)?;
        let settings = parse_settings(settings_val)?;

        let solution = match method {
            Method::Forward => system
                .solve_one_step(settings.duration, settings.steps)
                .map(RunnerSolution::Forward),
            Method::Leapfrog => {
                let seed = parse_seed(&seed).map_err(|e| JsValue::from_str(&e.to_string()))?;
                system
                    .solve_two_step(settings.duration, settings.steps, seed)
                    .map(RunnerSolution::Leapfrog)
            }
        }
        .map_err(|e| JsValue::from_str(&format!("Runner init failed: {}", e)))?;

        let cursor = solution.cursor();
        Ok(WasmStepRunner {
            solution: Some(solution),
            cursor,
        })
    }

    pub fn is_done(&self) -> bool {
        self.solution
            .as_ref()
            .map_or(true, |solution| self.cursor.position() + 1 >= solution.len())
    }

    /// Pulls up to `batch_size` more rows and reports progress.
    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let solution = self
            .solution
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        for _ in 0..batch_size {
            if !solution.produce_next(&mut self.cursor) {
                break;
            }
        }

        self.get_progress()
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let solution = self
            .solution
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let position = self.cursor.position();
        let progress = StepProgress {
            computed: position + 1,
            total: solution.len(),
            done: position + 1 >= solution.len(),
            time: solution.time(position),
            state: solution.state(position),
        };

        to_value(&progress).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Rewinds to the first row. Rows already computed are served from cache.
    pub fn restart(&mut self) -> Result<(), JsValue> {
        let solution = self
            .solution
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        self.cursor = solution.cursor();
        Ok(())
    }

    /// Finishes the solve and returns the full table. Consumes the runner.
    pub fn get_result(&mut self) -> Result<JsValue, JsValue> {
        let mut solution = self
            .solution
            .take()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let table = solution.table();

        to_value(&table).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}
