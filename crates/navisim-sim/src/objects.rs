//! Scene-object files.
//!
//! An objects file is a JSON object mapping primitive keys to
//! [`PrimitiveSpec`] descriptions, i.e. the same shape that
//! [`RaycastEngine::dump_primitives`] produces:
//!
//! ```json
//! {
//!   "ground": {"type": "plane", "point": {"x": 0, "y": 0, "z": 0}, "normal": {"x": 0, "y": 0, "z": 1}},
//!   "crate":  {"type": "box", "depth": 1.0, "width": 1.0, "height": 1.0,
//!              "pose": {"position": {"x": 4, "y": 0, "z": 0.5},
//!                       "orientation": {"x": 0, "y": 0, "z": 0, "w": 1}}}
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use navisim_perception::raycast::{PrimitiveSpec, RaycastEngine};
use navisim_types::SimError;
use tracing::info;

/// Parse an objects document.
///
/// # Errors
///
/// [`SimError::Serialization`] when `json` is not a valid objects document.
pub fn parse_objects(json: &str) -> Result<BTreeMap<String, PrimitiveSpec>, SimError> {
    serde_json::from_str(json).map_err(|e| SimError::Serialization(e.to_string()))
}

/// Read `path` and register every entry with `engine`.  Returns the number
/// of primitives added.
///
/// Entries are registered in key order; on error the ones before the
/// failing key stay registered.
///
/// # Errors
///
/// * [`SimError::Config`] when the file cannot be read.
/// * [`SimError::Serialization`] when it cannot be parsed.
/// * [`SimError::AlreadyExists`] when a key is already registered.
pub fn load_objects(engine: &mut RaycastEngine, path: &Path) -> Result<usize, SimError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SimError::Config(format!("cannot read {}: {e}", path.display())))?;
    let objects = parse_objects(&raw)?;
    let count = objects.len();
    for (key, spec) in objects {
        engine.add_primitive(key, spec.into_primitive())?;
    }
    info!(path = %path.display(), count, "scene objects loaded");
    Ok(count)
}
