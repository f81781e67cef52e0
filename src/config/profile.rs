use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use super::paths::expand_home;

/// Load the preferences file into an opaque JSON object.
///
/// Keys carry no server-side meaning; the whole tree is forwarded to the
/// browser in the init frame. A missing file at the default location
/// yields an empty map; a missing explicitly-configured file is an error.
pub fn load_profile(path: &str, explicit: bool) -> Result<Value> {
    let path = expand_home(path);
    if !Path::new(&path).exists() {
        if explicit {
            bail!("Profile file not found: {}", path);
        }
        return Ok(Value::Object(serde_json::Map::new()));
    }

    tracing::info!(path = %path, "Loading profile file");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path))?;
    parse_profile(&content)
}

fn parse_profile(content: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(content).context("Failed to parse profile file")?;
    serde_json::to_value(table).context("Failed to convert profile to JSON")
}
