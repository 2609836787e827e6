pub mod ast;
pub mod builder;
pub mod graph;
pub mod lexer;
pub mod measure;
pub mod obda;
pub mod options;
pub mod parser;
pub mod resolve;
pub mod sql;
pub mod strategy;
pub mod tracker;
pub mod transform;

use wasm_bindgen::prelude::*;

use options::Options;
use transform::{transform_source, Transformation};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn run(source: &str, options_json: Option<String>) -> Result<Transformation, String> {
    let options = match options_json.as_deref() {
        Some(json) if !json.trim().is_empty() => Options::from_json(json).map_err(|e| e.to_string())?,
        _ => Options::default(),
    };
    transform_source(source, &options).map_err(|e| e.to_string())
}

/// Compile ontology source to DDL
#[wasm_bindgen(js_name = "ontoToDdl")]
pub fn onto_to_ddl(source: &str, options: Option<String>) -> Result<String, String> {
    let transformation = run(source, options)?;
    Ok(sql::render_ddl(&transformation))
}

/// Compile ontology source to an OBDA mapping
#[wasm_bindgen(js_name = "ontoToObda")]
pub fn onto_to_obda(source: &str, options: Option<String>) -> Result<String, String> {
    let transformation = run(source, options)?;
    Ok(obda::render_obda(&transformation))
}

/// Trace of every class to the tables that store it, as JSON
#[wasm_bindgen(js_name = "ontoToTrace")]
pub fn onto_to_trace(source: &str, options: Option<String>) -> Result<String, String> {
    let transformation = run(source, options)?;
    transformation.to_json().map_err(|e| e.to_string())
}
