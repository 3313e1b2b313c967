//! ODE definition and eager solves exposed to JavaScript.

use anyhow::{bail, Context};
use euler_core::expression::{state_names, ExpressionRhs};
use euler_core::{CompanionSystem, Method, SecondSeed, SolveError, SolveSettings};
use js_sys::{Array, Float64Array};
use serde_wasm_bindgen::{from_value, to_value};
use std::num::NonZeroUsize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

pub(crate) type ExpressionSystem = CompanionSystem<f64, ExpressionRhs>;

/// Compiles `expression` as the highest derivative of an ODE whose order is
/// the number of initial values. Empty `var_names` selects `u, u1, u2, ...`.
pub(crate) fn build_system(
    expression: &str,
    var_names: &[String],
    param_names: &[String],
    params: Vec<f64>,
    initials: Vec<f64>,
) -> anyhow::Result<ExpressionSystem> {
    let names = if var_names.is_empty() {
        state_names(initials.len())
    } else {
        var_names.to_vec()
    };
    if names.len() != initials.len() {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            names.len(),
            initials.len()
        );
    }
    let rhs = ExpressionRhs::compile(expression, &names, param_names, params)
        .context("Invalid right-hand side")?;
    let system = CompanionSystem::new(rhs, initials)?;
    Ok(system)
}

pub(crate) fn parse_method(name: &str) -> Result<Method, JsValue> {
    match name {
        "forward" | "euler" => Ok(Method::Forward),
        "leapfrog" => Ok(Method::Leapfrog),
        _ => Err(JsValue::from_str(&format!("Unknown method: {}", name))),
    }
}

pub(crate) fn parse_settings(settings_val: JsValue) -> Result<SolveSettings, JsValue> {
    let settings: SolveSettings = from_value(settings_val)
        .map_err(|e| JsValue::from_str(&format!("Invalid solve settings: {}", e)))?;
    settings
        .validate()
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(settings)
}

/// Interprets the dynamic second-seed argument of the leapfrog method:
/// `undefined`/`null`, a positive integer multiplier, or a numeric array.
pub(crate) fn parse_seed(value: &JsValue) -> Result<SecondSeed<f64>, SolveError> {
    if value.is_undefined() || value.is_null() {
        return Ok(SecondSeed::SameResolution);
    }

    if let Some(number) = value.as_f64() {
        if number.fract() != 0.0 || number < 1.0 || number > u32::MAX as f64 {
            return Err(SolveError::UnsupportedSeed(format!(
                "resolution multiplier must be a positive integer, got {}",
                number
            )));
        }
        return NonZeroUsize::new(number as usize)
            .map(SecondSeed::FinerResolution)
            .ok_or_else(|| SolveError::UnsupportedSeed("resolution multiplier is zero".to_string()));
    }

    if let Some(typed) = value.dyn_ref::<Float64Array>() {
        return Ok(SecondSeed::Explicit(typed.to_vec()));
    }

    if Array::is_array(value) {
        let array = Array::from(value);
        let mut state = Vec::with_capacity(array.length() as usize);
        for (i, entry) in array.iter().enumerate() {
            let component = entry.as_f64().ok_or_else(|| {
                SolveError::UnsupportedSeed(format!("seed component {} is not a number", i))
            })?;
            state.push(component);
        }
        return Ok(SecondSeed::Explicit(state));
    }

    Err(SolveError::UnsupportedSeed(
        "expected undefined, a positive integer multiplier, or a numeric array".to_string(),
    ))
}

#[wasm_bindgen]
pub struct WasmOde {
    pub(crate) system: ExpressionSystem,
}

#[wasm_bindgen]
impl WasmOde {
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: &str,
        var_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        initials: Vec<f64>,
    ) -> Result<WasmOde, JsValue> {
        console_error_panic_hook::set_once();

        let system = build_system(expression, &var_names, &param_names, params, initials)
            .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        Ok(WasmOde { system })
    }

    pub fn order(&self) -> usize {
        self.system.order()
    }

    pub fn initials(&self) -> Vec<f64> {
        self.system.initials().to_vec()
    }

    /// Evaluates the companion vector field at `(state, t)`.
    pub fn derivative(&self, state: Vec<f64>, t: f64) -> Result<Float64Array, JsValue> {
        let out = self
            .system
            .derivative(&state, t)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Float64Array::from(out.as_slice()))
    }

    /// Solves eagerly and returns `{ method, dt, times, components }`.
    pub fn solve(
        &self,
        method: &str,
        settings_val: JsValue,
        seed: JsValue,
    ) -> Result<JsValue, JsValue> {
        let method = parse_method(method)?;
        let settings = parse_settings(settings_val)?;
        let seed = parse_seed(&seed).map_err(|e| JsValue::from_str(&e.to_string()))?;

        let table = self
            .system
            .solve(method, &settings, seed)
            .map_err(|e| JsValue::from_str(&format!("Solve failed: {}", e)))?;

        to_value(&table).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Solves eagerly and returns `u(t)` only.
    pub fn solve_result(
        &self,
        method: &str,
        settings_val: JsValue,
        seed: JsValue,
    ) -> Result<Float64Array, JsValue> {
        let method = parse_method(method)?;
        let settings = parse_settings(settings_val)?;
        let seed = parse_seed(&seed).map_err(|e| JsValue::from_str(&e.to_string()))?;

        let table = self
            .system
            .solve(method, &settings, seed)
            .map_err(|e| JsValue::from_str(&format!("Solve failed: {}", e)))?;

        Ok(Float64Array::from(table.result()))
    }
}
