//! Browser bindings for dashc
//!
//! Thin wrapper around `dashc-core` compiled to WebAssembly for the editor.
//! ZERO logic here; all behavior comes from the core crate.

use dashc_core::InputState;
use wasm_bindgen::prelude::*;

fn to_json(value: &impl serde::Serialize) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Compile a dashboard document.
///
/// Never throws for author mistakes: rejected documents come back with
/// `success: false` and the violations in `error`.
///
/// @param source - document text
/// @param filename - logical filename, e.g. "Dashboard.dash"
/// @returns JSON string: { success, code, warnings, error, errorCategory? }
#[wasm_bindgen]
pub fn compile(source: &str, filename: &str) -> Result<String, JsError> {
    to_json(&dashc_core::compile(source, filename))
}

/// Classify a document for the authoring UI.
///
/// @param source - document text
/// @returns JSON string: { inputComponents, displayComponents, inputState, errors, warnings }
#[wasm_bindgen]
pub fn analyze(source: &str) -> Result<String, JsError> {
    to_json(&dashc_core::analyze(source))
}

/// Substitute `{inputs.name}` placeholders in an attribute value.
///
/// @param value - attribute value
/// @param inputs - JSON object of current input values
/// @returns the resolved string
/// @throws Error if `inputs` is not a JSON object
#[wasm_bindgen]
pub fn resolve(value: &str, inputs: &str) -> Result<String, JsError> {
    let state: InputState =
        serde_json::from_str(inputs).map_err(|e| JsError::new(&format!("Invalid inputs: {}", e)))?;
    Ok(dashc_core::resolve(value, &state))
}

/// Compile a document and render it against the given inputs.
///
/// @param source - document text
/// @param inputs - JSON object of input overrides, or "" for initial values
/// @returns JSON string of the render tree
/// @throws Error if the document is rejected or `inputs` is not a JSON object
#[wasm_bindgen]
pub fn render(source: &str, inputs: &str) -> Result<String, JsError> {
    let artifact = dashc_core::compile(source, "Dashboard.dash");
    let Some(component) = artifact.component else {
        return Err(JsError::new(&artifact.error.unwrap_or_default()));
    };
    let mut state = component.initial_state();
    if !inputs.trim().is_empty() {
        let overrides: InputState =
            serde_json::from_str(inputs).map_err(|e| JsError::new(&format!("Invalid inputs: {}", e)))?;
        for (name, value) in overrides.iter() {
            state.set(name.clone(), value.clone());
        }
    }
    to_json(&component.render(&state))
}
