//! Identity map sheets (CSV): `source, name, canonical_id`.
//!
//! A blank `source` makes the entry apply to every source.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use cleanslate_core::{ItemKey, SourceName};
use cleanslate_inventory::IdentityMap;

use crate::config::ConfigError;

#[derive(Debug, Deserialize)]
struct IdentityRow {
    #[serde(default)]
    source: Option<String>,
    name: String,
    canonical_id: String,
}

pub fn read_identity_map<R: Read>(reader: R) -> Result<IdentityMap, ConfigError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut map = IdentityMap::new();
    for (idx, result) in rdr.deserialize::<IdentityRow>().enumerate() {
        let line = idx + 2;
        let row = result.map_err(|e| ConfigError::invalid(format!("identity map line {line}: {e}")))?;
        let source = match row.source.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                SourceName::parse(s)
                    .map_err(|e| ConfigError::invalid(format!("identity map line {line}: {e}")))?,
            ),
            None => None,
        };
        let canonical = ItemKey::parse(&row.canonical_id)
            .map_err(|e| ConfigError::invalid(format!("identity map line {line}: {e}")))?;
        map.insert(source, &row.name, canonical)
            .map_err(|e| ConfigError::invalid(format!("identity map line {line}: {e}")))?;
    }
    Ok(map)
}

/// Load the identity map; any problem is a configuration error.
pub fn load_identity_map(path: &Path) -> Result<IdentityMap, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let map = read_identity_map(file)?;
    info!(path = %path.display(), entries = map.len(), "loaded identity map");
    Ok(map)
}
