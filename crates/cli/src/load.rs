//! File loading for the `run` and `validate` subcommands.
//!
//! Definitions and mock files may be JSON or YAML (chosen by extension),
//! engine configuration is TOML. Errors are plain messages ready for
//! `report_error`.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use stepsim_eval::{ConfigMockEngine, EngineConfig, MockConfig, MockEngine, NoMocks};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Read a JSON or YAML document into a JSON value.
pub(crate) fn read_document(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    if is_yaml(path) {
        serde_yaml::from_str(&text)
            .map_err(|e| format!("error parsing YAML in '{}': {}", path.display(), e))
    } else {
        serde_json::from_str(&text)
            .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e))
    }
}

/// `--input`: inline JSON, or `@path` to read it from a file. Defaults to `{}`.
pub(crate) fn parse_input(arg: Option<&str>) -> Result<Value, String> {
    match arg {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => match raw.strip_prefix('@') {
            Some(path) => read_document(Path::new(path)),
            None => serde_json::from_str(raw).map_err(|e| format!("invalid --input JSON: {}", e)),
        },
    }
}

pub(crate) fn load_mock(path: Option<&Path>) -> Result<Arc<dyn MockEngine>, String> {
    let Some(path) = path else {
        return Ok(Arc::new(NoMocks));
    };
    let doc = read_document(path)?;
    let config: MockConfig = serde_json::from_value(doc)
        .map_err(|e| format!("invalid mock configuration in '{}': {}", path.display(), e))?;
    Ok(Arc::new(ConfigMockEngine::new(config)))
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("invalid engine configuration in '{}': {}", path.display(), e))
}
