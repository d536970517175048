use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::types::chain::LogFilter;

/// Log filters either listed inline or loaded from a JSON file or a directory
/// of JSON files (relative to the config file).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FiltersOrPath {
    Inline(Vec<LogFilter>),
    Path(String),
}

impl Default for FiltersOrPath {
    fn default() -> Self {
        FiltersOrPath::Inline(Vec::new())
    }
}

pub fn resolve_filters(raw: FiltersOrPath, base_dir: &Path) -> anyhow::Result<Vec<LogFilter>> {
    let filters = match raw {
        FiltersOrPath::Inline(filters) => filters,
        FiltersOrPath::Path(p) => load_filters_from_path(&base_dir.join(p))?,
    };

    let mut seen = HashSet::new();
    for filter in &filters {
        if !seen.insert(filter.name.as_str()) {
            bail!("Duplicate log filter name '{}'", filter.name);
        }
    }

    Ok(filters)
}

fn load_filters_from_path(path: &Path) -> anyhow::Result<Vec<LogFilter>> {
    if !path.is_dir() {
        return load_filters_from_file(path);
    }

    let mut entries: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read filters directory at {}", path.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "json")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut merged = Vec::new();
    for entry in entries {
        merged.extend(load_filters_from_file(&entry.path())?);
    }
    Ok(merged)
}

fn load_filters_from_file(path: &Path) -> anyhow::Result<Vec<LogFilter>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to load filters file at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse filters file at {}", path.display()))
}
