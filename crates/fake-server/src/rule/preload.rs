//! Startup loading of rule files.
//!
//! Every `*.json` file in the routes directory holds `{ "routes": [...] }`.
//! Files are loaded in name order. A file that fails to parse stops the
//! preload; rules added before the failure stay registered.

use super::builder::ResponseRuleBuilder;
use super::store::RuleStore;
use super::types::{PreloadError, RouteFile, RuleSnapshot};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Load all route files in `dir` into `store` and return the resulting rule set.
pub fn preload(store: &RuleStore, dir: &Path) -> Result<Vec<RuleSnapshot>, PreloadError> {
    info!("Loading routes from {}", dir.display());

    for path in collect_route_files(dir)? {
        let loaded = load_route_file(store, &path).inspect_err(|e| {
            error!("Wrong configuration format: {}", e);
        })?;
        debug!("Loaded {} route(s) from {}", loaded, path.display());
    }

    let rules = store.get_all();
    info!("Rule store holds {} rule(s) after preload", rules.len());
    Ok(rules)
}

/// Parse one route file and add its rules; returns how many were added.
pub fn load_route_file(store: &RuleStore, path: &Path) -> Result<usize, PreloadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PreloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: RouteFile = serde_json::from_str(&contents).map_err(|source| PreloadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut added = 0;
    for record in file.routes {
        let rule = ResponseRuleBuilder::from_record(record)
            .build()
            .map_err(|source| PreloadError::Rule {
                path: path.to_path_buf(),
                source,
            })?;
        store.add(rule);
        added += 1;
    }
    Ok(added)
}

fn collect_route_files(dir: &Path) -> Result<Vec<PathBuf>, PreloadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| PreloadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}
