//! WASM bindings for `euler_core`.
//!
//! `WasmOde` defines an ODE from an expression string and solves it in one
//! call; `WasmStepRunner` pulls the same solve in batches.

mod runner;
mod system;

pub use runner::WasmStepRunner;
pub use system::WasmOde;

